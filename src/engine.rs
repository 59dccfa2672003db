//=========================================================================
// Phase Engine
//
// Composition root wiring the thread pool, event queue and state manager
// into one fixed-timestep loop.
//
// Architecture:
// ```text
//     EngineBuilder  ──build()──>  Engine  ──run()──>  [Loop]
//         │                          │
//         ├─ with_target_ups()       ├─ init / start modules
//         ├─ with_worker_threads()   ├─ EngineLoop until stopped
//         └─ with_*_capacity()       └─ shutdown modules, join pool
// ```
//
//=========================================================================

//=== External Dependencies ===============================================

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;
use log::{error, info, warn};

//=== Internal Dependencies ===============================================

use crate::core::engine_loop::{EngineLoop, LoopStats};
use crate::core::event_queue::{Event, EventKind, EventQueue, DEFAULT_EVENT_QUEUE_CAPACITY};
use crate::core::loop_control::LoopHandle;
use crate::core::module::{Module, ModuleId};
use crate::core::scene::{ConcurrentStateManager, Scene};
use crate::core::state::{Phase, StateRef, ThreadType};
use crate::core::thread_pool::{ThreadPool, DEFAULT_TASK_QUEUE_CAPACITY};
use crate::error::CoreResult;

//=== EngineBuilder =======================================================

/// Builder for configuring and constructing an [`Engine`].
///
/// # Default Values
///
/// - **Target UPS**: 50 fixed updates per second
/// - **Worker threads**: hardware concurrency minus two (at least one)
/// - **Task queue capacity**: 10 slots per worker
/// - **Event queue capacity**: 10 slots (grows on demand)
/// - **Channel capacity**: 128 loop signals
/// - **Max updates per tick**: 8
///
/// # Examples
///
/// ```no_run
/// use phase_engine::EngineBuilder;
/// use phase_engine::core::event_queue::EventKind;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum GameEvent { Quit }
/// impl EventKind for GameEvent {}
///
/// let engine = EngineBuilder::<GameEvent>::new()
///     .with_target_ups(60)
///     .with_worker_threads(4)
///     .build()
///     .expect("thread pool failed to start");
/// engine.run().expect("engine loop failed");
/// ```
pub struct EngineBuilder<K: EventKind> {
    target_ups: u32,
    worker_threads: Option<usize>,
    task_queue_capacity: usize,
    event_queue_capacity: usize,
    channel_capacity: usize,
    max_updates_per_tick: u32,
    _phantom: PhantomData<K>,
}

impl<K: EventKind> EngineBuilder<K> {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            target_ups: 50,
            worker_threads: None,
            task_queue_capacity: DEFAULT_TASK_QUEUE_CAPACITY,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            channel_capacity: 128,
            max_updates_per_tick: 8,
            _phantom: PhantomData,
        }
    }

    /// Sets how many Update phases run per second of wall time.
    ///
    /// Default: 50
    ///
    /// # Panics
    ///
    /// Panics if `ups == 0`.
    pub fn with_target_ups(mut self, ups: u32) -> Self {
        assert!(ups > 0, "Target UPS must be positive, got {}", ups);
        self.target_ups = ups;
        self
    }

    /// Overrides the number of generic worker threads.
    ///
    /// The render thread is always added on top of this count.
    ///
    /// # Panics
    ///
    /// Panics if `count == 0`.
    pub fn with_worker_threads(mut self, count: usize) -> Self {
        assert!(count > 0, "Worker thread count must be positive");
        self.worker_threads = Some(count);
        self
    }

    /// Sets the per-thread task ring size. A full ring makes the loop spin.
    ///
    /// Default: 10
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn with_task_queue_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "Task queue capacity must be positive");
        self.task_queue_capacity = capacity;
        self
    }

    /// Sets the initial event ring size.
    ///
    /// Default: 10
    ///
    /// # Panics
    ///
    /// Panics if `capacity < 2`.
    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity >= 2, "Event queue capacity must be at least 2, got {}", capacity);
        self.event_queue_capacity = capacity;
        self
    }

    /// Sets how many [`LoopHandle`] signals may wait for the loop thread.
    ///
    /// Default: 128
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "Channel capacity must be positive");
        self.channel_capacity = capacity;
        self
    }

    /// Caps the Update phases run in one iteration; lag beyond the cap is
    /// dropped.
    ///
    /// Default: 8
    ///
    /// # Panics
    ///
    /// Panics if `max == 0`.
    pub fn with_max_updates_per_tick(mut self, max: u32) -> Self {
        assert!(max > 0, "Max updates per tick must be positive");
        self.max_updates_per_tick = max;
        self
    }

    /// Starts the thread pool and assembles the engine.
    ///
    /// # Errors
    ///
    /// Fails if a pool thread cannot be spawned.
    pub fn build(self) -> CoreResult<Engine<K>> {
        let pool = match self.worker_threads {
            Some(count) => ThreadPool::with_workers(count, self.task_queue_capacity)?,
            None => ThreadPool::new(self.task_queue_capacity)?,
        };

        info!(
            "Building engine (UPS: {}, workers: {}, channel: {})",
            self.target_ups,
            pool.worker_count(),
            self.channel_capacity
        );

        let (tx, rx) = bounded(self.channel_capacity);
        let engine_loop = EngineLoop::new(
            pool,
            EventQueue::with_capacity(self.event_queue_capacity),
            ConcurrentStateManager::new(),
            rx,
            self.target_ups,
            self.max_updates_per_tick,
        );

        Ok(Engine {
            engine_loop,
            handle: LoopHandle::new(tx),
            modules: Vec::new(),
        })
    }
}

impl<K: EventKind> Default for EngineBuilder<K> {
    fn default() -> Self {
        Self::new()
    }
}

//=== Engine ==============================================================

/// Phase Engine runtime.
///
/// Every method takes `&mut self` and must be called from the thread that
/// owns the engine; other threads talk to it through [`Engine::handle`].
///
/// # Architecture
///
/// ```text
/// Engine (loop thread)
///   ├─► EngineLoop
///   │     ├─► ThreadPool  (render thread + workers)
///   │     ├─► EventQueue
///   │     └─► ConcurrentStateManager
///   └─► Modules (init → start → … → shutdown)
/// ```
pub struct Engine<K: EventKind> {
    engine_loop: EngineLoop<K>,
    handle: LoopHandle<K>,
    modules: Vec<Box<dyn Module<K>>>,
}

impl<K: EventKind> Engine<K> {
    //--- Modules ----------------------------------------------------------

    /// Hosts `module`; its hooks run during [`Engine::run`] in add order.
    pub fn add_module(&mut self, module: Box<dyn Module<K>>) {
        info!("Adding module '{}'", module.id());
        self.modules.push(module);
    }

    //--- States -----------------------------------------------------------

    /// Registers `state` for `phase` with thread policy `thread_type`.
    ///
    /// Nothing is registered if either half fails.
    pub fn register_state(
        &mut self,
        state: &StateRef,
        phase: Phase,
        thread_type: ThreadType,
    ) -> CoreResult<()> {
        self.engine_loop.state_manager_mut().register_state(state, phase)?;
        if let Err(e) = self.engine_loop.thread_pool_mut().register_state(state, thread_type) {
            // Only fails when the pool already knows the state; undo ours.
            if let Err(rollback) = self.engine_loop.state_manager_mut().unregister_state(state) {
                error!("Failed to roll back state registration: {}", rollback);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Forgets `state` in both the state manager and the thread pool.
    pub fn unregister_state(&mut self, state: &StateRef) -> CoreResult<()> {
        self.engine_loop.state_manager_mut().unregister_state(state)?;
        self.engine_loop.thread_pool_mut().unregister_state(state)
    }

    /// Adds a registered state that ticks regardless of the scene stack.
    pub fn add_module_state(&mut self, state: &StateRef) -> CoreResult<()> {
        self.engine_loop.state_manager_mut().add_module_state(state)
    }

    pub fn remove_module_state(&mut self, state: &StateRef) {
        self.engine_loop.state_manager_mut().remove_module_state(state);
    }

    //--- Scenes -----------------------------------------------------------

    pub fn push_scene(&mut self, scene: Arc<dyn Scene>) -> CoreResult<()> {
        self.engine_loop.state_manager_mut().push_scene(scene)
    }

    pub fn pop_scene(&mut self) -> Option<Arc<dyn Scene>> {
        self.engine_loop.state_manager_mut().pop_scene()
    }

    pub fn clear_scene_stack(&mut self) {
        self.engine_loop.state_manager_mut().clear_scene_stack();
    }

    pub fn num_scenes(&self) -> usize {
        self.engine_loop.state_manager().num_scenes()
    }

    //--- Events -----------------------------------------------------------

    /// Calls `receiver` on a pool thread for every event of `kind`.
    pub fn register_event_receiver<F>(&mut self, kind: K, module: ModuleId, receiver: F) -> CoreResult<()>
    where
        F: Fn(&dyn Event<K>) + Send + Sync + 'static,
    {
        self.engine_loop
            .event_queue_mut()
            .register_event_receiver(kind, module, Arc::new(receiver))
    }

    /// Removes the receiver `module` registered for `kind`.
    pub fn unregister_event_receiver(&mut self, kind: K, module: &ModuleId) -> CoreResult<()> {
        self.engine_loop.event_queue_mut().unregister_module(kind, module)
    }

    /// Queues `event` for the next Input or Render phase.
    pub fn post_event<E: Event<K>>(&mut self, event: E) {
        self.engine_loop.event_queue_mut().post_event(event);
    }

    //--- Execution --------------------------------------------------------

    /// Cloneable handle for stopping the loop or posting from other threads.
    pub fn handle(&self) -> LoopHandle<K> {
        self.handle.clone()
    }

    /// Runs one loop iteration as if `elapsed` had passed, without any
    /// module lifecycle.
    pub fn tick(&mut self, elapsed: Duration) -> CoreResult<()> {
        self.engine_loop.tick(elapsed)
    }

    /// Initializes and starts every module, runs the loop until stopped,
    /// then shuts modules down in reverse order and joins the pool.
    ///
    /// # Errors
    ///
    /// The first module `init` error aborts startup after the modules
    /// already initialized have been shut down. Loop errors are returned
    /// after the normal shutdown sequence.
    pub fn run(mut self) -> CoreResult<LoopStats> {
        info!("Starting engine runtime");

        let mut modules = std::mem::take(&mut self.modules);

        //--- 1. Initialize modules -----------------------------------------
        for index in 0..modules.len() {
            if let Err(e) = modules[index].init(&mut self) {
                error!("Module '{}' failed to initialize: {}", modules[index].id(), e);
                for module in modules[..index].iter_mut().rev() {
                    module.shutdown(&mut self);
                }
                self.engine_loop.thread_pool_mut().shut_down();
                return Err(e);
            }
        }

        //--- 2. Start modules -----------------------------------------------
        for module in modules.iter_mut() {
            module.start(&mut self);
        }
        if !self.modules.is_empty() {
            warn!(
                "{} modules added during startup will not be run",
                self.modules.len()
            );
        }

        //--- 3. Run the loop -------------------------------------------------
        let result = self.engine_loop.run();
        if let Err(e) = &result {
            error!("Engine loop failed: {}", e);
        }

        //--- 4. Shutdown -----------------------------------------------------
        for module in modules.iter_mut().rev() {
            module.shutdown(&mut self);
        }
        self.engine_loop.thread_pool_mut().shut_down();

        let stats = self.engine_loop.stats();
        info!("Engine shutdown complete ({})", stats);
        result.map(|()| stats)
    }

    //--- Accessors --------------------------------------------------------

    pub fn thread_pool(&self) -> &ThreadPool {
        self.engine_loop.thread_pool()
    }

    pub fn event_queue(&self) -> &EventQueue<K> {
        self.engine_loop.event_queue()
    }

    pub fn state_manager(&self) -> &ConcurrentStateManager {
        self.engine_loop.state_manager()
    }

    pub fn stats(&self) -> LoopStats {
        self.engine_loop.stats()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scene::BasicScene;
    use crate::core::test_support::RecordingState;
    use crate::error::CoreError;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestEvent {
        Quit,
    }

    impl EventKind for TestEvent {}

    fn builder() -> EngineBuilder<TestEvent> {
        let _ = env_logger::builder().is_test(true).try_init();
        EngineBuilder::new().with_worker_threads(2)
    }

    //=====================================================================
    // EngineBuilder Tests
    //=====================================================================

    #[test]
    fn builder_defaults() {
        let builder = EngineBuilder::<TestEvent>::new();
        assert_eq!(builder.target_ups, 50);
        assert_eq!(builder.worker_threads, None);
        assert_eq!(builder.task_queue_capacity, 10);
        assert_eq!(builder.event_queue_capacity, 10);
        assert_eq!(builder.channel_capacity, 128);
        assert_eq!(builder.max_updates_per_tick, 8);
    }

    #[test]
    fn builder_with_target_ups() {
        let builder = EngineBuilder::<TestEvent>::new().with_target_ups(120);
        assert_eq!(builder.target_ups, 120);
    }

    #[test]
    #[should_panic(expected = "Target UPS must be positive")]
    fn builder_with_target_ups_panics_on_zero() {
        EngineBuilder::<TestEvent>::new().with_target_ups(0);
    }

    #[test]
    #[should_panic(expected = "Worker thread count must be positive")]
    fn builder_with_worker_threads_panics_on_zero() {
        EngineBuilder::<TestEvent>::new().with_worker_threads(0);
    }

    #[test]
    #[should_panic(expected = "Channel capacity must be positive")]
    fn builder_with_channel_capacity_panics_on_zero() {
        EngineBuilder::<TestEvent>::new().with_channel_capacity(0);
    }

    #[test]
    #[should_panic(expected = "Event queue capacity must be at least 2")]
    fn builder_with_event_queue_capacity_panics_on_one() {
        EngineBuilder::<TestEvent>::new().with_event_queue_capacity(1);
    }

    #[test]
    fn builder_fluent_api_chaining() {
        let engine = builder()
            .with_target_ups(100)
            .with_worker_threads(3)
            .with_task_queue_capacity(4)
            .with_event_queue_capacity(16)
            .with_channel_capacity(8)
            .with_max_updates_per_tick(2)
            .build()
            .unwrap();

        assert_eq!(engine.thread_pool().worker_count(), 3);
        assert_eq!(engine.event_queue().capacity(), 16);
        assert_eq!(engine.engine_loop.interval(), Duration::from_millis(10));
    }

    //=====================================================================
    // Engine Tests
    //=====================================================================

    #[test]
    fn register_state_reaches_both_subsystems() {
        let mut engine = builder().build().unwrap();
        let state = RecordingState::new("s").into_state();

        engine.register_state(&state, Phase::Render, ThreadType::Render).unwrap();

        assert_eq!(engine.state_manager().phase_of(&state), Some(Phase::Render));
        assert_eq!(engine.thread_pool().thread_type(&state), Some(ThreadType::Render));
    }

    #[test]
    fn double_state_registration_fails() {
        let mut engine = builder().build().unwrap();
        let state = RecordingState::new("s").into_state();

        engine.register_state(&state, Phase::Input, ThreadType::Worker).unwrap();
        let err = engine
            .register_state(&state, Phase::Input, ThreadType::Worker)
            .unwrap_err();

        assert!(matches!(err, CoreError::StateAlreadyRegistered(_)));
    }

    #[test]
    fn pool_rejection_rolls_back_state_manager() {
        let mut engine = builder().build().unwrap();
        let state = RecordingState::new("s").into_state();
        engine
            .engine_loop
            .thread_pool_mut()
            .register_state(&state, ThreadType::Main)
            .unwrap();

        let err = engine
            .register_state(&state, Phase::Update, ThreadType::Worker)
            .unwrap_err();

        assert!(matches!(err, CoreError::StateAlreadyRegistered(_)));
        assert_eq!(engine.state_manager().phase_of(&state), None);
        assert_eq!(engine.thread_pool().thread_type(&state), Some(ThreadType::Main));
    }

    #[test]
    fn unregister_state_clears_both_subsystems() {
        let mut engine = builder().build().unwrap();
        let state = RecordingState::new("s").into_state();
        engine.register_state(&state, Phase::Update, ThreadType::All).unwrap();

        engine.unregister_state(&state).unwrap();

        assert_eq!(engine.state_manager().phase_of(&state), None);
        assert_eq!(engine.thread_pool().thread_type(&state), None);
        assert!(engine.unregister_state(&state).is_err());
    }

    #[test]
    fn scene_stack_round_trip() {
        let mut engine = builder().build().unwrap();
        let state = RecordingState::new("s").into_state();
        engine.register_state(&state, Phase::Update, ThreadType::Main).unwrap();

        engine
            .push_scene(Arc::new(BasicScene::new("level").with_state(state)))
            .unwrap();
        assert_eq!(engine.num_scenes(), 1);

        let popped = engine.pop_scene().unwrap();
        assert_eq!(popped.name(), "level");
        assert_eq!(engine.num_scenes(), 0);
        assert!(engine.pop_scene().is_none());
    }

    #[test]
    fn tick_drives_registered_states() {
        let mut engine = builder().build().unwrap();
        let state = RecordingState::new("s");
        let handle = state.clone().into_state();
        engine.register_state(&handle, Phase::Update, ThreadType::Main).unwrap();
        engine
            .push_scene(Arc::new(BasicScene::new("level").with_state(handle)))
            .unwrap();

        engine.tick(Duration::from_millis(40)).unwrap();

        assert_eq!(state.updates.load(Ordering::SeqCst), 2);
        assert_eq!(engine.stats().update_steps, 2);
    }

    //--- Module Lifecycle -------------------------------------------------

    struct JournalModule {
        name: &'static str,
        journal: Arc<Mutex<Vec<String>>>,
        fail_init: bool,
    }

    impl JournalModule {
        fn boxed(name: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> Box<dyn Module<TestEvent>> {
            Box::new(Self {
                name,
                journal: Arc::clone(journal),
                fail_init: false,
            })
        }

        fn record(&self, hook: &str) {
            self.journal.lock().unwrap().push(format!("{}:{}", self.name, hook));
        }
    }

    impl Module<TestEvent> for JournalModule {
        fn id(&self) -> ModuleId {
            ModuleId::new(self.name)
        }

        fn init(&mut self, engine: &mut Engine<TestEvent>) -> CoreResult<()> {
            self.record("init");
            if self.fail_init {
                return Err(CoreError::ModuleInit {
                    module: self.id(),
                    reason: "refused".to_string(),
                });
            }
            engine.register_event_receiver(TestEvent::Quit, self.id(), |_| {})
        }

        fn start(&mut self, engine: &mut Engine<TestEvent>) {
            self.record("start");
            engine.handle().stop();
        }

        fn shutdown(&mut self, engine: &mut Engine<TestEvent>) {
            self.record("shutdown");
            let _ = engine.unregister_event_receiver(TestEvent::Quit, &self.id());
        }
    }

    #[test]
    fn run_drives_module_lifecycle_in_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut engine = builder().build().unwrap();
        engine.add_module(JournalModule::boxed("a", &journal));
        engine.add_module(JournalModule::boxed("b", &journal));

        let stats = engine.run().unwrap();

        assert_eq!(stats.iterations, 1);
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["a:init", "b:init", "a:start", "b:start", "b:shutdown", "a:shutdown"]
        );
    }

    #[test]
    fn failed_init_shuts_down_earlier_modules() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut engine = builder().build().unwrap();
        engine.add_module(JournalModule::boxed("a", &journal));
        engine.add_module(Box::new(JournalModule {
            name: "b",
            journal: Arc::clone(&journal),
            fail_init: true,
        }));
        engine.add_module(JournalModule::boxed("c", &journal));

        let err = engine.run().unwrap_err();

        assert!(matches!(err, CoreError::ModuleInit { .. }));
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["a:init", "b:init", "a:shutdown"]
        );
    }

    #[test]
    fn handle_stop_before_run_exits_on_first_iteration() {
        let engine = builder().build().unwrap();
        assert!(engine.handle().stop());

        let stats = engine.run().unwrap();
        assert_eq!(stats.iterations, 1);
        assert_eq!(stats.update_steps, 0);
    }
}
