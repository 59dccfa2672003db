//=========================================================================
// Modules
//=========================================================================
//
// External owners of states, scenes and event registrations.
//
// The engine hosts modules but never inspects them: it only drives the
// three lifecycle hooks and uses `ModuleId` to key event registrations.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::borrow::Cow;
use std::fmt;

//=== Internal Dependencies ===============================================

use crate::core::event_queue::EventKind;
use crate::engine::Engine;
use crate::error::CoreResult;

//=== ModuleId ============================================================

/// Name-based identity of a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(Cow<'static, str>);

impl ModuleId {
    /// Creates an id from a module name.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Returns the module name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//=== Module Trait ========================================================

/// An application subsystem hosted by the [`Engine`].
///
/// Modules own their states and scenes. During `init` they register those
/// with the engine; during `shutdown` they should unregister them before
/// dropping them.
///
/// # Example
///
/// ```rust
/// # use phase_engine::prelude::*;
/// # #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// # enum GameEvent { Quit }
/// # impl EventKind for GameEvent {}
/// struct Audio;
///
/// impl Module<GameEvent> for Audio {
///     fn id(&self) -> ModuleId {
///         ModuleId::new("audio")
///     }
///
///     fn init(&mut self, engine: &mut Engine<GameEvent>) -> CoreResult<()> {
///         engine.register_event_receiver(GameEvent::Quit, self.id(), |_event| {})
///     }
/// }
/// ```
pub trait Module<K: EventKind>: Send {
    /// Identity used for event registration bookkeeping.
    fn id(&self) -> ModuleId;

    /// Registers states, scenes and receivers. Errors abort engine startup.
    fn init(&mut self, engine: &mut Engine<K>) -> CoreResult<()>;

    /// Called once every module has initialized, right before the loop runs.
    fn start(&mut self, _engine: &mut Engine<K>) {}

    /// Called after the loop stops, in reverse registration order.
    fn shutdown(&mut self, _engine: &mut Engine<K>) {}
}

//=========================================================================
// Unit Tests
//=========================================================================
