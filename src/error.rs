//=========================================================================
// Core Errors
//=========================================================================
//
// Contract violations surfaced by the scheduler.
//
// Every variant is fatal from the caller's point of view: the operation
// that produced it has not mutated any state and there is no retry path.
// Advisory conditions (duplicate module states, events nobody listens
// to) are logged instead and never reach this type.
//
//=========================================================================

//=== External Dependencies ===============================================

use thiserror::Error;

//=== Internal Dependencies ===============================================

use crate::core::module::ModuleId;
use crate::core::state::StateId;

//=== CoreError ===========================================================

/// Fatal contract violations reported by the engine core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A state was registered twice with the same subsystem.
    #[error("state {0:?} has already been registered")]
    StateAlreadyRegistered(StateId),

    /// A state was unregistered (or used) without ever being registered.
    #[error("state {0:?} is not registered")]
    StateNotRegistered(StateId),

    /// A module registered a second receiver for the same event kind.
    #[error("module '{module}' is already registered to receive {kind}")]
    ReceiverAlreadyRegistered { module: ModuleId, kind: String },

    /// A module that never registered for any event tried to unregister.
    #[error("module '{module}' has not registered to receive {kind}")]
    ModuleNotRegistered { module: ModuleId, kind: String },

    /// A dispatch asked for more worker threads than are currently idle.
    #[error("requested {requested} threads but only {available} are available")]
    InsufficientThreads { requested: usize, available: usize },

    /// Thread allocation was asked to split threads for a population
    /// that has no tasks to run.
    #[error("cannot allocate threads: {set1} tasks against an empty population")]
    InvalidAllocation { set1: usize },

    /// A scene was pushed while containing a state with no registered phase.
    #[error("scene '{scene}' contains unregistered state {state:?}")]
    UnregisteredSceneState { scene: String, state: StateId },

    /// Work was submitted after the thread pool shut down.
    #[error("the thread pool has been shut down")]
    PoolShutDown,

    /// The OS refused to start a pool thread.
    #[error("failed to spawn thread '{name}': {reason}")]
    ThreadSpawn { name: String, reason: String },

    /// A module failed during initialization.
    #[error("module '{module}' failed to initialize: {reason}")]
    ModuleInit { module: ModuleId, reason: String },
}

/// Result alias used throughout the engine core.
pub type CoreResult<T> = Result<T, CoreError>;

//=========================================================================
// Unit Tests
//=========================================================================
