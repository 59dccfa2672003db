//=========================================================================
// Spin Wait
//=========================================================================
//
// Backoff helper shared by producers waiting on a full ring, the loop
// thread waiting on a batch counter, and idle workers polling for work.
//
// Waits escalate: busy spin → yield → (idle only) short sleep. Nothing in
// the pool parks on a condition variable.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::hint;
use std::thread;
use std::time::Duration;

//=== SpinWait ============================================================

const SPIN_LIMIT: u32 = 64;
const YIELD_LIMIT: u32 = 256;
const IDLE_SLEEP: Duration = Duration::from_micros(50);

/// Escalating busy-wait.
#[derive(Debug, Default)]
pub(crate) struct SpinWait {
    step: u32,
}

impl SpinWait {
    pub(crate) fn new() -> Self {
        Self { step: 0 }
    }

    /// One wait step for a waiter that expects progress soon.
    ///
    /// Never sleeps: used on the tick's critical path.
    pub(crate) fn spin(&mut self) {
        if self.step < SPIN_LIMIT {
            hint::spin_loop();
        } else {
            thread::yield_now();
        }
        self.step = self.step.saturating_add(1);
    }

    /// One wait step for an idle worker polling its queue.
    pub(crate) fn idle(&mut self) {
        if self.step < SPIN_LIMIT {
            hint::spin_loop();
        } else if self.step < YIELD_LIMIT {
            thread::yield_now();
        } else {
            thread::sleep(IDLE_SLEEP);
        }
        self.step = self.step.saturating_add(1);
    }

    /// Restarts the escalation after work was found.
    pub(crate) fn reset(&mut self) {
        self.step = 0;
    }

    /// Number of steps taken since the last reset.
    pub(crate) fn steps(&self) -> u32 {
        self.step
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
