//=========================================================================
// Engine Loop
//=========================================================================
//
// Fixed-timestep accumulator loop dispatching each phase's states and
// events through the thread pool.
//
// Architecture:
//   iteration:
//     signals → lag += elapsed → Input → Update × ⌊lag / interval⌋ → Render
//
//   phase (scene stack size S > 0):
//     scene 0 ─┬─ events ‖ first state   (threads split by calc_alloc)
//              └─ remaining states       (sequential)
//     scene 1..S-1 → every state         (sequential)
//     module states                      (sequential)
//
// Update never runs events; Input and Render drain the event queue.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use log::{debug, info, warn};

//=== Internal Dependencies ===============================================

use crate::core::event_queue::{EventKind, EventQueue};
use crate::core::loop_control::{LoopSignal, SignalCollector, TickControl};
use crate::core::scene::ConcurrentStateManager;
use crate::core::state::{Phase, StateRef};
use crate::core::thread_pool::ThreadPool;
use crate::error::{CoreError, CoreResult};

//=== LoopStats ===========================================================

/// Counters accumulated over the lifetime of an [`EngineLoop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Loop iterations started.
    pub iterations: u64,
    /// Update phases run.
    pub update_steps: u64,
    /// Lag thrown away by the catch-up guard.
    pub dropped_lag: Duration,
}

impl fmt::Display for LoopStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} iterations, {} update steps, {:?} lag dropped",
            self.iterations, self.update_steps, self.dropped_lag
        )
    }
}

//=== EngineLoop ==========================================================

/// Owns the scheduler's three subsystems and drives them once per tick.
pub struct EngineLoop<K: EventKind> {
    pool: ThreadPool,
    events: EventQueue<K>,
    states: ConcurrentStateManager,
    signals: SignalCollector<K>,
    interval: Duration,
    lag: Duration,
    max_updates_per_tick: u32,
    running: bool,
    stats: LoopStats,
}

impl<K: EventKind> EngineLoop<K> {
    //--- Construction -----------------------------------------------------

    pub(crate) fn new(
        pool: ThreadPool,
        events: EventQueue<K>,
        states: ConcurrentStateManager,
        signals: Receiver<LoopSignal<K>>,
        target_ups: u32,
        max_updates_per_tick: u32,
    ) -> Self {
        assert!(target_ups > 0, "Target UPS must be positive, got {}", target_ups);

        Self {
            pool,
            events,
            states,
            signals: SignalCollector::new(signals),
            interval: Duration::from_secs_f64(1.0 / f64::from(target_ups)),
            lag: Duration::ZERO,
            max_updates_per_tick,
            running: false,
            stats: LoopStats::default(),
        }
    }

    //--- Execution --------------------------------------------------------

    /// Runs iterations back to back until [`EngineLoop::stop`] is called or
    /// a stop signal arrives.
    pub fn run(&mut self) -> CoreResult<()> {
        self.running = true;
        info!("Engine loop running (interval: {:?})", self.interval);

        let mut previous = Instant::now();
        while self.running {
            let now = Instant::now();
            let elapsed = now - previous;
            previous = now;

            if let Err(e) = self.tick(elapsed) {
                self.running = false;
                return Err(e);
            }
        }

        info!("Engine loop stopped: {}", self.stats);
        Ok(())
    }

    /// Runs one iteration as if `elapsed` wall time had passed.
    ///
    /// A stop signal found before Input ends the iteration immediately and
    /// clears the running flag.
    pub fn tick(&mut self, elapsed: Duration) -> CoreResult<()> {
        self.stats.iterations += 1;

        if self.signals.collect_frame(&mut self.events) == TickControl::Exit {
            self.stop();
            return Ok(());
        }

        self.lag += elapsed;
        self.run_phase(Phase::Input)?;

        let mut steps = 0;
        while self.lag >= self.interval {
            if steps == self.max_updates_per_tick {
                warn!(
                    "Loop fell behind by {:?}; dropping lag after {} updates",
                    self.lag, steps
                );
                self.stats.dropped_lag += self.lag;
                self.lag = Duration::ZERO;
                break;
            }
            self.run_phase(Phase::Update)?;
            self.lag -= self.interval;
            steps += 1;
        }
        self.stats.update_steps += u64::from(steps);

        self.run_phase(Phase::Render)
    }

    /// Leaves the loop after the current iteration.
    pub fn stop(&mut self) {
        if self.running {
            debug!("Engine loop stop requested");
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    //--- Accessors --------------------------------------------------------

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Fixed update interval derived from the target UPS.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn thread_pool(&self) -> &ThreadPool {
        &self.pool
    }

    pub fn thread_pool_mut(&mut self) -> &mut ThreadPool {
        &mut self.pool
    }

    pub fn event_queue(&self) -> &EventQueue<K> {
        &self.events
    }

    pub fn event_queue_mut(&mut self) -> &mut EventQueue<K> {
        &mut self.events
    }

    pub fn state_manager(&self) -> &ConcurrentStateManager {
        &self.states
    }

    pub fn state_manager_mut(&mut self) -> &mut ConcurrentStateManager {
        &mut self.states
    }

    //--- Phase Dispatch ---------------------------------------------------

    fn run_phase(&mut self, phase: Phase) -> CoreResult<()> {
        let num_scenes = self.states.num_scenes();
        if num_scenes == 0 {
            return Ok(());
        }

        for scene in 0..num_scenes {
            let states = self.states.states(scene, phase).to_vec();
            if scene == 0 && phase.drains_events() {
                self.dispatch_with_events(&states)?;
            } else {
                self.dispatch_all(&states)?;
            }
        }

        let module_states = self.states.module_states(phase).to_vec();
        self.dispatch_all(&module_states)
    }

    /// Runs scene 0's first state alongside the drained event batch, then
    /// the rest of the scene.
    fn dispatch_with_events(&mut self, states: &[StateRef]) -> CoreResult<()> {
        let tasks = self.events.event_receivers();

        let Some((first, rest)) = states.split_first() else {
            let available = self.pool.available_threads();
            let threads = available.min(tasks.len());
            return self.pool.execute_event_tasks(tasks, threads);
        };

        let components = first.components();
        let available = self.pool.available_threads();
        let event_threads = if tasks.is_empty() {
            0
        } else if components.is_empty() {
            available
        } else {
            calc_alloc(tasks.len(), components.len(), available)?
        };

        self.pool.execute_event_tasks(tasks, event_threads)?;
        self.pool
            .execute_update_tasks(first, components, available - event_threads)?;

        self.dispatch_all(rest)
    }

    /// Runs each state in order with whatever threads are idle at the time.
    fn dispatch_all(&mut self, states: &[StateRef]) -> CoreResult<()> {
        for state in states {
            let available = self.pool.available_threads();
            self.pool
                .execute_update_tasks(state, state.components(), available)?;
        }
        Ok(())
    }
}

//=== Thread Allocation ===================================================

/// Splits `total_threads` between `set1` event tasks and `set2` component
/// updates, returning the threads given to the events.
///
/// Events get a share proportional to `set1 / (set1 + set2)`, at least one
/// thread, and never every thread once there are components to update.
///
/// # Errors
///
/// [`CoreError::InvalidAllocation`] when there are events but no
/// components to weigh them against.
pub fn calc_alloc(set1: usize, set2: usize, total_threads: usize) -> CoreResult<usize> {
    if set1 == 0 {
        return Ok(set2.min(total_threads));
    }
    if set2 == 0 {
        return Err(CoreError::InvalidAllocation { set1 });
    }

    let total = total_threads.min(set1 + set2);
    let set1_threads = total / (set2 / set1 + 1);
    Ok(set1_threads.max(1).min(total.saturating_sub(1)))
}

//=========================================================================
// Unit Tests
//=========================================================================
