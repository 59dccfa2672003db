//=========================================================================
// Scene System
//=========================================================================
//
// Scenes group states; the scene stack decides which states tick.
//
// Architecture:
//   ConcurrentStateManager
//     ├─ state_phases: HashMap<StateId, Phase>
//     ├─ scene_stack: Vec<Arc<dyn Scene>>        (bottom = index 0)
//     ├─ scene_states: [Phase][scene][state]     (add order per phase)
//     └─ module_states: [Phase][state]           (not owned by any scene)
//
// Flow:
//   push_scene() → partition states by Phase → EngineLoop reads per tick
//
//=========================================================================

//=== Module Declarations =================================================

mod state_manager;

//=== Public API ==========================================================

pub use state_manager::ConcurrentStateManager;

//=== Internal Dependencies ===============================================

use crate::core::state::StateRef;

//=== Scene Trait =========================================================

/// An ordered collection of states activated together.
///
/// Scenes are owned by modules. Pushing a scene copies its state list into
/// the state manager, so states added afterwards only take effect on the
/// next push.
pub trait Scene: Send + Sync {
    /// Human-readable scene name, used in logs and errors.
    fn name(&self) -> &str;

    /// Appends a state; states keep their add order within each phase.
    fn add_state(&mut self, state: StateRef);

    /// States in add order.
    fn states(&self) -> &[StateRef];
}

//=== BasicScene ==========================================================

/// Minimal [`Scene`] holding a name and a list of states.
///
/// ```rust
/// # use phase_engine::prelude::*;
/// # use std::sync::Arc;
/// # struct Menu;
/// # impl State for Menu {
/// #     fn add_component(&self, _c: ComponentRef) {}
/// #     fn remove_component(&self, _c: &ComponentRef) {}
/// #     fn components(&self) -> Arc<[ComponentRef]> { Arc::from(Vec::new()) }
/// #     fn update(&self) {}
/// # }
/// let menu: StateRef = Arc::new(Menu);
/// let scene = BasicScene::new("main-menu").with_state(menu);
/// assert_eq!(scene.states().len(), 1);
/// ```
pub struct BasicScene {
    name: String,
    states: Vec<StateRef>,
}

impl BasicScene {
    /// Creates an empty scene.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
        }
    }

    /// Builder-style [`Scene::add_state`].
    pub fn with_state(mut self, state: StateRef) -> Self {
        self.states.push(state);
        self
    }
}

impl Scene for BasicScene {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_state(&mut self, state: StateRef) {
        self.states.push(state);
    }

    fn states(&self) -> &[StateRef] {
        &self.states
    }
}
