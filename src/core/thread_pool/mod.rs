//=========================================================================
// Thread Pool
//=========================================================================
//
// Fixed set of persistent spinning workers plus one reserved render thread.
//
// Architecture:
//   ThreadPool
//     ├─ render_thread: WorkerThread       (Render-pinned states only)
//     ├─ workers: Vec<WorkerThread>        (events, All chunks, Worker pins)
//     ├─ thread_types: StateId → ThreadType
//     └─ reservations: StateId → Reservation (sticky affinity)
//
// Dispatch by ThreadType:
//   All     → chunk across idle workers + caller, spin on batch counter,
//             then threadsafe_update serially on the caller
//   Render  → one packaged task to the render thread (not awaited)
//   Worker  → one packaged task to the reserved worker (not awaited)
//   Main    → everything inline on the caller
//
// Every submitting method takes `&mut self`: the pool has exactly one
// producer, and the borrow checker is what guarantees it.
//
//=========================================================================

//=== Module Declarations =================================================

mod spin;
mod worker;

//=== External Dependencies ===============================================

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;

use log::{debug, info, warn};

//=== Internal Dependencies ===============================================

use crate::core::state::{ComponentRef, StateId, StateRef, ThreadType};
use crate::error::{CoreError, CoreResult};
use spin::SpinWait;
use worker::{BatchCounter, WorkerThread};

//=== Public API ==========================================================

pub use worker::Task;

/// Default number of slots in each worker's task ring.
pub const DEFAULT_TASK_QUEUE_CAPACITY: usize = 10;

//=== Reservation =========================================================

/// The thread a pinned state is stuck to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reservation {
    Render,
    Worker(usize),
}

//=== ThreadPool ==========================================================

/// Hand-built pool executing event notifications and state updates.
///
/// Sized as "hardware concurrency minus one" pool threads: one render
/// thread and the rest generic workers, with a floor of one generic worker.
pub struct ThreadPool {
    render_thread: WorkerThread,
    workers: Vec<WorkerThread>,
    thread_types: HashMap<StateId, ThreadType>,
    reservations: HashMap<StateId, Reservation>,
    next_reserved: usize,
    is_shut_down: bool,
}

impl ThreadPool {
    //--- Construction -----------------------------------------------------

    /// Creates a pool sized from the machine's hardware concurrency.
    pub fn new(queue_capacity: usize) -> CoreResult<Self> {
        let hardware = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self::with_workers(default_worker_count(hardware), queue_capacity)
    }

    /// Creates a pool with exactly `worker_count` generic workers plus the
    /// render thread.
    ///
    /// # Panics
    ///
    /// Panics if `worker_count == 0` or `queue_capacity == 0`.
    pub fn with_workers(worker_count: usize, queue_capacity: usize) -> CoreResult<Self> {
        assert!(worker_count > 0, "Thread pool needs at least one worker");
        assert!(queue_capacity > 0, "Task queue capacity must be positive");

        let render_thread = WorkerThread::spawn("Render Thread", queue_capacity)?;
        let workers = (0..worker_count)
            .map(|i| WorkerThread::spawn(format!("Worker {}", i + 1), queue_capacity))
            .collect::<CoreResult<Vec<_>>>()?;

        info!(
            "Thread pool started: {} workers + render thread (queue capacity {})",
            worker_count, queue_capacity
        );

        Ok(Self {
            render_thread,
            workers,
            thread_types: HashMap::new(),
            reservations: HashMap::new(),
            next_reserved: 0,
            is_shut_down: false,
        })
    }

    //--- Registration -----------------------------------------------------

    /// Assigns `state` its thread policy, reserving a thread when pinned.
    ///
    /// `Worker` states are reserved round-robin by registration count, not
    /// by current load.
    pub fn register_state(&mut self, state: &StateRef, thread_type: ThreadType) -> CoreResult<()> {
        let id = StateId::of(state);
        if self.thread_types.contains_key(&id) {
            return Err(CoreError::StateAlreadyRegistered(id));
        }
        self.thread_types.insert(id, thread_type);

        match thread_type {
            ThreadType::Render => {
                self.reservations.insert(id, Reservation::Render);
            }
            ThreadType::Worker => {
                let index = self.next_reserved;
                self.reservations.insert(id, Reservation::Worker(index));
                self.next_reserved = (self.next_reserved + 1) % self.workers.len();
            }
            ThreadType::Main | ThreadType::All => {}
        }

        debug!("Registered {:?} on the thread pool as {:?}", id, thread_type);
        Ok(())
    }

    /// Removes the thread policy and reservation of `state`.
    pub fn unregister_state(&mut self, state: &StateRef) -> CoreResult<()> {
        let id = StateId::of(state);
        if self.thread_types.remove(&id).is_none() {
            return Err(CoreError::StateNotRegistered(id));
        }
        self.reservations.remove(&id);
        debug!("Unregistered {:?} from the thread pool", id);
        Ok(())
    }

    /// Thread policy of `state`, if registered.
    pub fn thread_type(&self, state: &StateRef) -> Option<ThreadType> {
        self.thread_types.get(&StateId::of(state)).copied()
    }

    /// Name of the thread `state` is pinned to, if it is pinned.
    pub fn reserved_thread_name(&self, state: &StateRef) -> Option<&str> {
        self.reservations
            .get(&StateId::of(state))
            .map(|&r| self.reserved_thread(r).name())
    }

    //--- Queries ----------------------------------------------------------

    /// Number of generic workers (the render thread is not counted).
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Generic workers with no queued or running work.
    ///
    /// A snapshot. A worker can briefly report idle between finishing one
    /// job and picking up the next, so the count may overstate what is
    /// free while earlier submissions are still draining.
    pub fn available_threads(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_active()).count()
    }

    /// Spins until every pool thread, render thread included, has drained.
    pub fn wait_idle(&self) {
        let mut wait = SpinWait::new();
        let threads = || std::iter::once(&self.render_thread).chain(self.workers.iter());
        while threads().any(|w| w.is_active() || w.pending() > 0) {
            wait.idle();
        }
    }

    //--- Dispatch ---------------------------------------------------------

    /// Spreads event notification tasks over `num_threads` idle workers.
    ///
    /// Tasks are cut into contiguous chunks, the remainder going to the
    /// first chunk. Completion is not awaited. With `num_threads == 0` the
    /// tasks run inline so notifications are never starved.
    pub fn execute_event_tasks(&mut self, tasks: Vec<Task>, num_threads: usize) -> CoreResult<()> {
        self.ensure_running()?;
        self.ensure_available(num_threads)?;
        if tasks.is_empty() {
            return Ok(());
        }

        if num_threads == 0 {
            tasks.into_iter().for_each(|task| task());
            return Ok(());
        }

        let sizes = split_counts(tasks.len(), num_threads);
        let batch = BatchCounter::new();
        let mut tasks = tasks.into_iter();
        let mut idle = self.workers.iter().filter(|w| !w.is_active());

        for size in sizes.into_iter().filter(|&s| s > 0) {
            let chunk: Vec<Task> = tasks.by_ref().take(size).collect();
            let job: Task = Box::new(move || chunk.into_iter().for_each(|task| task()));
            match idle.next() {
                Some(worker) => worker.submit(job, &batch),
                None => job(),
            }
        }

        Ok(())
    }

    /// Runs one phase of `state` according to its registered thread policy.
    ///
    /// Unregistered states run as `Main`.
    pub fn execute_update_tasks(
        &mut self,
        state: &StateRef,
        components: Arc<[ComponentRef]>,
        num_threads: usize,
    ) -> CoreResult<()> {
        let id = StateId::of(state);
        match self.thread_types.get(&id).copied() {
            Some(ThreadType::All) => self.run_data_parallel(state, components, num_threads),
            Some(ThreadType::Render) | Some(ThreadType::Worker) => {
                self.ensure_running()?;
                let reservation = self
                    .reservations
                    .get(&id)
                    .copied()
                    .ok_or(CoreError::StateNotRegistered(id))?;
                self.run_pinned(reservation, state, components);
                Ok(())
            }
            Some(ThreadType::Main) | None => {
                run_inline(state, &components);
                Ok(())
            }
        }
    }

    fn run_data_parallel(
        &mut self,
        state: &StateRef,
        components: Arc<[ComponentRef]>,
        num_threads: usize,
    ) -> CoreResult<()> {
        self.ensure_running()?;
        self.ensure_available(num_threads)?;

        state.update_prep();

        // Chunk 0 belongs to the calling thread and absorbs the remainder.
        let sizes = split_counts(components.len(), num_threads + 1);
        let caller_len = sizes[0];
        let batch = BatchCounter::new();
        let mut idle = self.workers.iter().filter(|w| !w.is_active());
        let mut start = caller_len;

        for &size in &sizes[1..] {
            if size == 0 {
                continue;
            }
            let range = start..start + size;
            start += size;

            let chunk = Arc::clone(&components);
            let job: Task = Box::new(move || chunk[range].iter().for_each(|c| c.update()));
            match idle.next() {
                Some(worker) => worker.submit(job, &batch),
                None => job(),
            }
        }

        components[..caller_len].iter().for_each(|c| c.update());
        batch.wait();

        for component in components.iter() {
            component.threadsafe_update();
        }
        state.update();
        Ok(())
    }

    fn run_pinned(&self, reservation: Reservation, state: &StateRef, components: Arc<[ComponentRef]>) {
        let state = Arc::clone(state);
        let task: Task = Box::new(move || {
            state.update_prep();
            components.iter().for_each(|c| c.update());
            state.update();
        });
        // Fire-and-forget: the counter exists only to satisfy the ring.
        self.reserved_thread(reservation).submit(task, &BatchCounter::new());
    }

    //--- Shutdown ---------------------------------------------------------

    /// Stops every thread once its queue has drained and joins them.
    ///
    /// Running tasks are never interrupted.
    pub fn shut_down(&mut self) {
        if self.is_shut_down {
            return;
        }
        self.is_shut_down = true;

        self.render_thread.shut_down();
        self.workers.iter().for_each(WorkerThread::shut_down);

        self.render_thread.join();
        self.workers.iter_mut().for_each(WorkerThread::join);

        self.next_reserved = 0;
        info!("Thread pool shut down");
    }

    /// Whether [`ThreadPool::shut_down`] has been called.
    pub fn is_shut_down(&self) -> bool {
        self.is_shut_down
    }

    //--- Internal Helpers -------------------------------------------------

    fn reserved_thread(&self, reservation: Reservation) -> &WorkerThread {
        match reservation {
            Reservation::Render => &self.render_thread,
            Reservation::Worker(index) => &self.workers[index],
        }
    }

    fn ensure_available(&self, requested: usize) -> CoreResult<()> {
        let available = self.available_threads();
        if requested > available {
            return Err(CoreError::InsufficientThreads {
                requested,
                available,
            });
        }
        Ok(())
    }

    fn ensure_running(&self) -> CoreResult<()> {
        if self.is_shut_down {
            return Err(CoreError::PoolShutDown);
        }
        Ok(())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shut_down();
    }
}

//=== Sizing & Splitting ==================================================

/// Generic worker count for a machine with `hardware` logical cores.
///
/// The loop thread takes one core and the render thread another; when that
/// leaves nothing, the pool still gets one generic worker.
fn default_worker_count(hardware: usize) -> usize {
    let max_threads = hardware.saturating_sub(1);
    let workers = max_threads.saturating_sub(1);
    if workers == 0 {
        warn!(
            "{} hardware threads available; thread pool defaults to two threads",
            hardware
        );
        1
    } else {
        workers
    }
}

/// Splits `len` items into `parts` contiguous chunk sizes, folding the
/// remainder into the first chunk.
fn split_counts(len: usize, parts: usize) -> Vec<usize> {
    if parts == 0 {
        return Vec::new();
    }
    let base = len / parts;
    let excess = len % parts;
    let mut sizes = vec![base; parts];
    sizes[0] += excess;
    sizes
}

/// `update_prep` → every component → `update`, on the calling thread.
fn run_inline(state: &StateRef, components: &[ComponentRef]) {
    state.update_prep();
    components.iter().for_each(|c| c.update());
    state.update();
}

//=========================================================================
// Unit Tests
//=========================================================================
