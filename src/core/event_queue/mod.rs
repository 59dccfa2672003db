//=========================================================================
// Event System
//=========================================================================
//
// Kind-keyed event delivery batched at Input and Render phase boundaries.
//
// Architecture:
//   Modules → post_event() → ring buffer (FIFO, grows by doubling)
//                                  ↓
//   EngineLoop ← event_receivers() → one notification task per event
//                                  ↓
//   ThreadPool runs tasks → Event::notify_modules(receivers)
//
// Pattern: register → post (N) → drain once per Input/Render → repeat
//
//=========================================================================

//=== Module Declarations =================================================

mod event_queue;

//=== External Dependencies ===============================================

use std::any::Any;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

//=== Public API ==========================================================

pub use event_queue::{EventQueue, DEFAULT_EVENT_QUEUE_CAPACITY};

//=== EventKind ===========================================================

/// Marker trait for event discriminants.
///
/// Typically implemented by an application-wide enum, so kinds declared by
/// different modules can never collide.
pub trait EventKind: Clone + Copy + Eq + Hash + Debug + Send + Sync + 'static {}

//=== Event ===============================================================

/// Callback a module registers to be told about events of one kind.
pub type EventReceiver<K> = Arc<dyn Fn(&dyn Event<K>) + Send + Sync>;

/// Upcasting helpers, implemented automatically for every [`Event`].
pub trait AsEvent<K: EventKind> {
    /// Views the event as a trait object.
    fn as_event(&self) -> &dyn Event<K>;

    /// Views the event as [`Any`] for payload downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<K: EventKind, T: Event<K>> AsEvent<K> for T {
    fn as_event(&self) -> &dyn Event<K> {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A posted occurrence: a kind plus whatever payload the type carries.
///
/// ```rust
/// # use phase_engine::prelude::*;
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum GameEvent { Explosion }
/// impl EventKind for GameEvent {}
///
/// struct Explosion { radius: f32 }
///
/// impl Event<GameEvent> for Explosion {
///     fn kind(&self) -> GameEvent {
///         GameEvent::Explosion
///     }
/// }
///
/// let receiver = |event: &dyn Event<GameEvent>| {
///     if let Some(explosion) = event.downcast_ref::<Explosion>() {
///         assert!(explosion.radius > 0.0);
///     }
/// };
/// receiver(&Explosion { radius: 2.0 });
/// ```
pub trait Event<K: EventKind>: AsEvent<K> + Any + Send + Sync + 'static {
    /// Discriminant used to find interested receivers.
    fn kind(&self) -> K;

    /// Hands the event to every registered receiver.
    ///
    /// Runs on a pool thread. Override to filter or reorder receivers.
    fn notify_modules(&self, receivers: &[EventReceiver<K>]) {
        for receiver in receivers {
            receiver(self.as_event());
        }
    }
}

impl<K: EventKind> dyn Event<K> {
    /// Returns the concrete event if it is a `T`.
    pub fn downcast_ref<T: Event<K>>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}
