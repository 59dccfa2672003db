//=========================================================================
// States & Components
//=========================================================================
//
// The units of work the scheduler dispatches every tick.
//
// Architecture:
//   Scene ──holds──> State ──holds──> Component
//                      │
//                      ├─ Phase       (Input / Update / Render)
//                      └─ ThreadType  (Main / Render / Worker / All)
//
// States and components are shared with worker threads, so every
// capability method takes `&self`; implementations keep their mutable
// data behind atomics or locks of their choosing.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

//=== Phase ===============================================================

/// The stage of a tick during which a state receives updates.
///
/// Order within a tick: `Input` → `Update` (zero or more) → `Render`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Input,
    Update,
    Render,
}

impl Phase {
    /// Every phase in tick order.
    pub const ALL: [Phase; 3] = [Phase::Input, Phase::Update, Phase::Render];

    /// Dense index for phase-keyed arrays.
    pub(crate) const fn index(self) -> usize {
        match self {
            Phase::Input => 0,
            Phase::Update => 1,
            Phase::Render => 2,
        }
    }

    /// Whether pending events are dispatched alongside this phase.
    pub(crate) const fn drains_events(self) -> bool {
        matches!(self, Phase::Input | Phase::Render)
    }
}

//=== ThreadType ==========================================================

/// Which thread(s) a state's updates are pinned to.
///
/// `Main`, `Render` and `Worker` are inherently thread-safe: the whole
/// state runs on one thread. `All` spreads component updates across every
/// available worker and only `threadsafe_update` is serialized.
///
/// The loop thread does **not** wait for `Render` or `Worker` states to
/// finish. Register under `Main` when completion must be observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadType {
    Main,
    Render,
    Worker,
    All,
}

//=== Component ===========================================================

/// Smallest unit of update work.
pub trait Component: Send + Sync {
    /// Called every phase the owning state runs. For `All` states this may
    /// run concurrently with sibling components on other threads.
    fn update(&self);

    /// Called after every sibling `update` has finished, always on the
    /// loop thread and one component at a time. Mutations of state shared
    /// between components belong here.
    fn threadsafe_update(&self) {}
}

/// Shared handle to a component.
pub type ComponentRef = Arc<dyn Component>;

//=== State ===============================================================

/// An ordered collection of components updated as one unit.
///
/// A state is registered with a [`Phase`] and a [`ThreadType`] which stay
/// fixed until it is unregistered.
///
/// # Minimal Implementation
///
/// ```rust
/// # use phase_engine::prelude::*;
/// # use std::sync::Arc;
/// struct HudState {
///     components: ComponentList,
/// }
///
/// impl State for HudState {
///     fn add_component(&self, component: ComponentRef) {
///         self.components.push(component);
///     }
///
///     fn remove_component(&self, component: &ComponentRef) {
///         self.components.remove(component);
///     }
///
///     fn components(&self) -> Arc<[ComponentRef]> {
///         self.components.snapshot()
///     }
///
///     fn update(&self) {}
/// }
/// ```
pub trait State: Send + Sync {
    /// Called when the owning module activates the state.
    fn enter(&self) {}

    /// Appends a component; update order follows insertion order.
    fn add_component(&self, component: ComponentRef);

    /// Removes a previously added component.
    fn remove_component(&self, component: &ComponentRef);

    /// Snapshot of the components to update this phase.
    fn components(&self) -> Arc<[ComponentRef]>;

    /// Runs before any component update of the phase.
    fn update_prep(&self) {}

    /// Runs after every component update of the phase.
    fn update(&self);

    /// Called when the owning module deactivates the state.
    fn exit(&self) {}

    /// Releases resources held by the state.
    fn delete(&self) {}
}

/// Shared handle to a state.
pub type StateRef = Arc<dyn State>;

//=== StateId =============================================================

/// Opaque identity of a registered state.
///
/// Derived from the address of the state's shared allocation, so two
/// clones of the same [`StateRef`] map to the same id. Ids are only
/// meaningful while the state is alive, which is why a state must be
/// unregistered before its owner drops it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(usize);

impl StateId {
    /// Returns the identity of `state`.
    pub fn of(state: &StateRef) -> Self {
        Self(Arc::as_ptr(state) as *const () as usize)
    }
}

impl fmt::Debug for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateId({:#x})", self.0)
    }
}

//=== ComponentList =======================================================

/// Copy-on-write component storage for [`State`] implementations.
///
/// `snapshot()` is a reference-count bump, so handing the list to worker
/// threads every phase costs no allocation. Mutation rebuilds the slice.
pub struct ComponentList {
    items: Mutex<Arc<[ComponentRef]>>,
}

impl ComponentList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Arc::from(Vec::new())),
        }
    }

    /// Appends `component`.
    pub fn push(&self, component: ComponentRef) {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next: Vec<ComponentRef> = items.iter().cloned().collect();
        next.push(component);
        *items = Arc::from(next);
    }

    /// Removes every occurrence of `component` (by identity).
    pub fn remove(&self, component: &ComponentRef) {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let next: Vec<ComponentRef> = items
            .iter()
            .filter(|c| !Arc::ptr_eq(*c, component))
            .cloned()
            .collect();
        *items = Arc::from(next);
    }

    /// Returns the current components.
    pub fn snapshot(&self) -> Arc<[ComponentRef]> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*items)
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if there are no components.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ComponentList {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
