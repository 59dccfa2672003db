//=========================================================================
// Prelude
//=========================================================================
//
// Convenience module that re-exports commonly used types and traits.
//
// Usage:
//   use phase_engine::prelude::*;
//
//=========================================================================

//=== Public API ==========================================================

// Engine core
pub use crate::engine::{Engine, EngineBuilder};
pub use crate::error::{CoreError, CoreResult};

// Loop
pub use crate::core::engine_loop::LoopStats;
pub use crate::core::loop_control::LoopHandle;

// Modules and events
pub use crate::core::event_queue::{Event, EventKind, EventReceiver};
pub use crate::core::module::{Module, ModuleId};

// Scenes and states
pub use crate::core::scene::{BasicScene, Scene};
pub use crate::core::state::{
    Component, ComponentList, ComponentRef, Phase, State, StateRef, ThreadType,
};
