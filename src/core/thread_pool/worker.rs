//=========================================================================
// Worker Thread
//=========================================================================
//
// Persistent execution context backed by a private bounded task ring.
//
// Architecture:
//   Loop thread (sole producer)             Worker thread (sole consumer)
//   ┌───────────────────────────┐           ┌───────────────────────────┐
//   │ submit(job)               │           │ run_next()                │
//   │  1. active = true         │           │  1. pending > 0 ?         │
//   │  2. spin while full       │  ──────>  │  2. take slots[head]      │
//   │  3. slots[tail] = job     │           │  3. head += 1             │
//   │  4. tail += 1             │           │  4. run job               │
//   │  5. pending += 1          │           │  5. pending -= 1          │
//   └───────────────────────────┘           │  6. pending == 0 ?        │
//                                           │       active = false      │
//                                           │  7. batch.complete()      │
//                                           └───────────────────────────┘
//
// Ordering rules:
// - active is set before the job is published; the worker clears it only
//   after pending reaches zero, then re-checks pending. A worker can look
//   idle for an instant while a submission is in flight, but never stays
//   active with an empty ring.
// - A running job still counts as pending, so the producer never writes a
//   slot the consumer might be reading.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::UnsafeCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info};

//=== Internal Dependencies ===============================================

use super::spin::SpinWait;
use crate::error::{CoreError, CoreResult};

//=== Task ================================================================

/// A unit of work handed to a worker.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

//=== BatchCounter ========================================================

/// Counts outstanding sub-tasks of one dispatch burst.
#[derive(Debug, Default)]
pub(crate) struct BatchCounter {
    outstanding: AtomicUsize,
}

impl BatchCounter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn add(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    fn complete(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of sub-tasks not yet finished.
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Spins until every sub-task of the batch has finished.
    pub(crate) fn wait(&self) {
        let mut wait = SpinWait::new();
        while self.outstanding() != 0 {
            wait.spin();
        }
    }
}

//=== Job =================================================================

/// A task paired with the batch it belongs to.
struct Job {
    task: Task,
    batch: Arc<BatchCounter>,
}

//=== TaskRing ============================================================

/// Bounded single-producer / single-consumer ring.
struct TaskRing {
    slots: Box<[UnsafeCell<Option<Job>>]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    pending: AtomicUsize,
}

// SAFETY: a slot is written only by the producer while `pending` is below
// capacity (so the consumer is not reading it), and read only by the
// consumer after observing `pending > 0` with the producer's write
// published by the `pending` increment.
unsafe impl Sync for TaskRing {}

impl TaskRing {
    fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity).map(|_| UnsafeCell::new(None)).collect();
        Self {
            slots,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Producer side. Returns how many wait steps were needed for a slot.
    fn push(&self, job: Job) -> u32 {
        let mut wait = SpinWait::new();
        while self.pending() >= self.capacity() {
            wait.spin();
        }

        let tail = self.tail.load(Ordering::Relaxed);
        // SAFETY: see the `Sync` impl; the slot at `tail` is free.
        unsafe {
            *self.slots[tail].get() = Some(job);
        }
        self.tail.store((tail + 1) % self.capacity(), Ordering::Relaxed);
        self.pending.fetch_add(1, Ordering::SeqCst);

        wait.steps()
    }

    /// Consumer side. Only valid after observing `pending() > 0`.
    fn take(&self) -> Option<Job> {
        let head = self.head.load(Ordering::Relaxed);
        // SAFETY: see the `Sync` impl; the slot at `head` holds a published job.
        let job = unsafe { (*self.slots[head].get()).take() };
        self.head.store((head + 1) % self.capacity(), Ordering::Relaxed);
        job
    }

    /// Consumer side. Returns the number of jobs still pending.
    fn finish(&self) -> usize {
        self.pending.fetch_sub(1, Ordering::SeqCst) - 1
    }
}

//=== WorkerShared ========================================================

/// State shared between the pool handle and the worker's own thread.
struct WorkerShared {
    name: String,
    ring: TaskRing,
    active: AtomicBool,
    running: AtomicBool,
}

impl WorkerShared {
    /// Runs one queued job if there is one.
    fn run_next(&self) -> bool {
        if self.ring.pending() == 0 {
            return false;
        }
        self.active.store(true, Ordering::SeqCst);

        let Some(job) = self.ring.take() else {
            // Unreachable with a single producer; keep the counters honest.
            error!("Worker '{}' found an empty slot at its queue head", self.name);
            self.settle_after_job();
            return true;
        };

        let Job { task, batch } = job;
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("Task panicked on worker '{}'", self.name);
        }

        self.settle_after_job();
        batch.complete();
        true
    }

    fn settle_after_job(&self) {
        if self.ring.finish() == 0 {
            self.active.store(false, Ordering::SeqCst);
            if self.ring.pending() > 0 {
                self.active.store(true, Ordering::SeqCst);
            }
        }
    }

    fn run(&self) {
        info!("Worker '{}' started", self.name);

        let mut wait = SpinWait::new();
        loop {
            if self.run_next() {
                wait.reset();
                continue;
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            wait.idle();
        }

        info!("Worker '{}' shutting down", self.name);
    }
}

//=== WorkerThread ========================================================

/// Handle to one persistent pool thread.
pub(crate) struct WorkerThread {
    shared: Arc<WorkerShared>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Spawns a named worker whose ring holds `queue_capacity` tasks.
    pub(crate) fn spawn(name: impl Into<String>, queue_capacity: usize) -> CoreResult<Self> {
        let name = name.into();
        let shared = Arc::new(WorkerShared {
            name: name.clone(),
            ring: TaskRing::with_capacity(queue_capacity),
            active: AtomicBool::new(false),
            running: AtomicBool::new(true),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || thread_shared.run())
            .map_err(|e| CoreError::ThreadSpawn {
                name,
                reason: e.to_string(),
            })?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether the worker has queued or running work.
    pub(crate) fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Jobs queued or running.
    pub(crate) fn pending(&self) -> usize {
        self.shared.ring.pending()
    }

    /// Queues `task` as part of `batch`, spinning while the ring is full.
    ///
    /// Must only be called from the single producer thread.
    pub(crate) fn submit(&self, task: Task, batch: &Arc<BatchCounter>) {
        batch.add();
        self.shared.active.store(true, Ordering::SeqCst);
        let waited = self.shared.ring.push(Job {
            task,
            batch: Arc::clone(batch),
        });
        if waited > 0 {
            debug!(
                "Worker '{}' queue was full; waited {} steps",
                self.shared.name, waited
            );
        }
    }

    /// Asks the worker to stop once its queue has drained.
    pub(crate) fn shut_down(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }

    /// Waits for the worker thread to exit.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Worker '{}' terminated abnormally", self.shared.name);
            }
        }
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.shut_down();
        self.join();
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
