//=========================================================================
// Concurrent State Manager
//=========================================================================
//
// Tracks registered state phases, the scene stack, and module states.
//
// States are partitioned by phase once, at push time, so the engine loop
// only ever reads ready-made slices. Phase arrays for scenes and for
// module states are independent collections.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

//=== Internal Dependencies ===============================================

use super::Scene;
use crate::core::state::{Phase, StateId, StateRef};
use crate::error::{CoreError, CoreResult};

//=== ConcurrentStateManager ==============================================

/// Phase bookkeeping for every registered state and the scene stack.
///
/// Written only by the loop thread; the engine loop reads
/// [`states`](Self::states) and [`module_states`](Self::module_states)
/// once per phase.
pub struct ConcurrentStateManager {
    state_phases: HashMap<StateId, Phase>,
    scene_stack: Vec<Arc<dyn Scene>>,
    scene_states: [Vec<Vec<StateRef>>; 3],
    module_states: [Vec<StateRef>; 3],
}

impl ConcurrentStateManager {
    //--- Construction -----------------------------------------------------

    /// Creates a manager with no states and an empty scene stack.
    pub fn new() -> Self {
        Self {
            state_phases: HashMap::new(),
            scene_stack: Vec::new(),
            scene_states: Default::default(),
            module_states: Default::default(),
        }
    }

    //--- Registration -----------------------------------------------------

    /// Records the phase `state` is updated in.
    pub fn register_state(&mut self, state: &StateRef, phase: Phase) -> CoreResult<()> {
        let id = StateId::of(state);
        if self.state_phases.contains_key(&id) {
            return Err(CoreError::StateAlreadyRegistered(id));
        }
        self.state_phases.insert(id, phase);
        debug!("Registered {:?} for the {:?} phase", id, phase);
        Ok(())
    }

    /// Forgets `state` and drops it from the module-state lists.
    ///
    /// Scenes already on the stack keep their copy until popped.
    pub fn unregister_state(&mut self, state: &StateRef) -> CoreResult<()> {
        let id = StateId::of(state);
        let Some(phase) = self.state_phases.remove(&id) else {
            return Err(CoreError::StateNotRegistered(id));
        };
        self.module_states[phase.index()].retain(|s| StateId::of(s) != id);
        debug!("Unregistered {:?}", id);
        Ok(())
    }

    /// Phase of `state`, if registered.
    pub fn phase_of(&self, state: &StateRef) -> Option<Phase> {
        self.state_phases.get(&StateId::of(state)).copied()
    }

    //--- Scene Stack ------------------------------------------------------

    /// Pushes `scene` on top of the stack.
    ///
    /// Every state in the scene must already be registered; otherwise the
    /// stack is left untouched.
    pub fn push_scene(&mut self, scene: Arc<dyn Scene>) -> CoreResult<()> {
        let mut partition: [Vec<StateRef>; 3] = Default::default();

        for state in scene.states() {
            let phase = self.phase_of(state).ok_or_else(|| CoreError::UnregisteredSceneState {
                scene: scene.name().to_string(),
                state: StateId::of(state),
            })?;
            partition[phase.index()].push(Arc::clone(state));
        }

        for (slot, states) in self.scene_states.iter_mut().zip(partition) {
            slot.push(states);
        }
        debug!(
            "Pushed scene '{}' at stack position {}",
            scene.name(),
            self.scene_stack.len()
        );
        self.scene_stack.push(scene);
        Ok(())
    }

    /// Pops the top scene; its states stop receiving updates.
    pub fn pop_scene(&mut self) -> Option<Arc<dyn Scene>> {
        let Some(scene) = self.scene_stack.pop() else {
            warn!("Attempted to pop from an empty scene stack");
            return None;
        };
        for slot in &mut self.scene_states {
            slot.pop();
        }
        debug!("Popped scene '{}'", scene.name());
        Some(scene)
    }

    /// Removes every scene from the stack.
    pub fn clear_scene_stack(&mut self) {
        debug!("Clearing {} scenes from the stack", self.scene_stack.len());
        self.scene_stack.clear();
        for slot in &mut self.scene_states {
            slot.clear();
        }
    }

    /// Number of scenes on the stack.
    pub fn num_scenes(&self) -> usize {
        self.scene_stack.len()
    }

    /// Scene at stack position `index` (0 = bottom).
    pub fn scene(&self, index: usize) -> Option<&Arc<dyn Scene>> {
        self.scene_stack.get(index)
    }

    /// States of the scene at `scene_index` registered for `phase`, in add
    /// order. Empty when the index is out of range.
    pub fn states(&self, scene_index: usize, phase: Phase) -> &[StateRef] {
        self.scene_states[phase.index()]
            .get(scene_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    //--- Module States ----------------------------------------------------

    /// Adds a registered state that is updated every tick regardless of the
    /// scene stack. Adding it twice is a logged no-op.
    pub fn add_module_state(&mut self, state: &StateRef) -> CoreResult<()> {
        let id = StateId::of(state);
        let phase = self
            .state_phases
            .get(&id)
            .copied()
            .ok_or(CoreError::StateNotRegistered(id))?;

        let states = &mut self.module_states[phase.index()];
        if states.iter().any(|s| StateId::of(s) == id) {
            warn!("Module state {:?} has already been added, skipping", id);
            return Ok(());
        }
        states.push(Arc::clone(state));
        debug!("Added module state {:?} to the {:?} phase", id, phase);
        Ok(())
    }

    /// Removes a module state. Removing an absent state is a logged no-op.
    pub fn remove_module_state(&mut self, state: &StateRef) {
        let id = StateId::of(state);
        for states in &mut self.module_states {
            if let Some(pos) = states.iter().position(|s| StateId::of(s) == id) {
                states.remove(pos);
                debug!("Removed module state {:?}", id);
                return;
            }
        }
        warn!("Module state {:?} not found, skipping removal", id);
    }

    /// Module states registered for `phase`, in add order.
    pub fn module_states(&self, phase: Phase) -> &[StateRef] {
        &self.module_states[phase.index()]
    }
}

impl Default for ConcurrentStateManager {
    fn default() -> Self {
        Self::new()
    }
}

//=== Tests ===============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scene::BasicScene;
    use crate::core::test_support::RecordingState;

    fn registered(csm: &mut ConcurrentStateManager, name: &'static str, phase: Phase) -> StateRef {
        let state = RecordingState::new(name).into_state();
        csm.register_state(&state, phase).unwrap();
        state
    }

    fn ids(states: &[StateRef]) -> Vec<StateId> {
        states.iter().map(StateId::of).collect()
    }

    //--- Registration -----------------------------------------------------

    #[test]
    fn double_registration_fails() {
        let mut csm = ConcurrentStateManager::new();
        let state = registered(&mut csm, "s", Phase::Update);

        let err = csm.register_state(&state, Phase::Render).unwrap_err();
        assert_eq!(err, CoreError::StateAlreadyRegistered(StateId::of(&state)));
        assert_eq!(csm.phase_of(&state), Some(Phase::Update));
    }

    #[test]
    fn unregistering_unknown_state_fails() {
        let mut csm = ConcurrentStateManager::new();
        let state = RecordingState::new("s").into_state();

        let err = csm.unregister_state(&state).unwrap_err();
        assert_eq!(err, CoreError::StateNotRegistered(StateId::of(&state)));
    }

    //--- Scene Stack ------------------------------------------------------

    #[test]
    fn push_partitions_states_by_phase_in_add_order() {
        let mut csm = ConcurrentStateManager::new();
        let input = registered(&mut csm, "input", Phase::Input);
        let update_a = registered(&mut csm, "update-a", Phase::Update);
        let render = registered(&mut csm, "render", Phase::Render);
        let update_b = registered(&mut csm, "update-b", Phase::Update);

        let scene = BasicScene::new("level")
            .with_state(Arc::clone(&input))
            .with_state(Arc::clone(&update_a))
            .with_state(Arc::clone(&render))
            .with_state(Arc::clone(&update_b));
        csm.push_scene(Arc::new(scene)).unwrap();

        assert_eq!(csm.num_scenes(), 1);
        assert_eq!(ids(csm.states(0, Phase::Input)), ids(&[input]));
        assert_eq!(ids(csm.states(0, Phase::Update)), ids(&[update_a, update_b]));
        assert_eq!(ids(csm.states(0, Phase::Render)), ids(&[render]));
    }

    #[test]
    fn push_with_unregistered_state_fails_without_mutation() {
        let mut csm = ConcurrentStateManager::new();
        let known = registered(&mut csm, "known", Phase::Input);
        let stranger = RecordingState::new("stranger").into_state();

        let scene = BasicScene::new("broken")
            .with_state(known)
            .with_state(Arc::clone(&stranger));
        let err = csm.push_scene(Arc::new(scene)).unwrap_err();

        assert_eq!(
            err,
            CoreError::UnregisteredSceneState {
                scene: "broken".to_string(),
                state: StateId::of(&stranger),
            }
        );
        assert_eq!(csm.num_scenes(), 0);
        assert!(csm.states(0, Phase::Input).is_empty());
    }

    #[test]
    fn push_then_pop_restores_previous_layout() {
        let mut csm = ConcurrentStateManager::new();
        let base = registered(&mut csm, "base", Phase::Update);
        let overlay = registered(&mut csm, "overlay", Phase::Render);

        csm.push_scene(Arc::new(BasicScene::new("base").with_state(Arc::clone(&base))))
            .unwrap();
        let before: Vec<Vec<StateId>> = Phase::ALL.iter().map(|&p| ids(csm.states(0, p))).collect();

        csm.push_scene(Arc::new(BasicScene::new("overlay").with_state(overlay)))
            .unwrap();
        assert_eq!(csm.num_scenes(), 2);

        let popped = csm.pop_scene().unwrap();
        assert_eq!(popped.name(), "overlay");
        assert_eq!(csm.num_scenes(), 1);

        let after: Vec<Vec<StateId>> = Phase::ALL.iter().map(|&p| ids(csm.states(0, p))).collect();
        assert_eq!(before, after);
        assert!(csm.states(1, Phase::Render).is_empty());
    }

    #[test]
    fn pop_on_empty_stack_returns_none() {
        let mut csm = ConcurrentStateManager::new();
        assert!(csm.pop_scene().is_none());
        assert_eq!(csm.num_scenes(), 0);
    }

    #[test]
    fn stack_bottom_is_index_zero() {
        let mut csm = ConcurrentStateManager::new();
        csm.push_scene(Arc::new(BasicScene::new("first"))).unwrap();
        csm.push_scene(Arc::new(BasicScene::new("second"))).unwrap();

        assert_eq!(csm.scene(0).map(|s| s.name()), Some("first"));
        assert_eq!(csm.scene(1).map(|s| s.name()), Some("second"));
    }

    #[test]
    fn clear_scene_stack_empties_everything() {
        let mut csm = ConcurrentStateManager::new();
        let state = registered(&mut csm, "s", Phase::Input);
        csm.push_scene(Arc::new(BasicScene::new("a").with_state(Arc::clone(&state))))
            .unwrap();
        csm.push_scene(Arc::new(BasicScene::new("b").with_state(state)))
            .unwrap();

        csm.clear_scene_stack();

        assert_eq!(csm.num_scenes(), 0);
        assert!(csm.states(0, Phase::Input).is_empty());
    }

    //--- Module States ----------------------------------------------------

    #[test]
    fn module_states_are_independent_of_scenes() {
        let mut csm = ConcurrentStateManager::new();
        let state = registered(&mut csm, "hud", Phase::Render);

        csm.add_module_state(&state).unwrap();

        assert_eq!(ids(csm.module_states(Phase::Render)), ids(&[Arc::clone(&state)]));
        assert!(csm.module_states(Phase::Input).is_empty());
        assert_eq!(csm.num_scenes(), 0);
    }

    #[test]
    fn adding_module_state_twice_is_a_no_op() {
        let mut csm = ConcurrentStateManager::new();
        let state = registered(&mut csm, "hud", Phase::Render);

        csm.add_module_state(&state).unwrap();
        csm.add_module_state(&state).unwrap();

        assert_eq!(csm.module_states(Phase::Render).len(), 1);
    }

    #[test]
    fn adding_unregistered_module_state_fails() {
        let mut csm = ConcurrentStateManager::new();
        let state = RecordingState::new("s").into_state();

        let err = csm.add_module_state(&state).unwrap_err();
        assert_eq!(err, CoreError::StateNotRegistered(StateId::of(&state)));
    }

    #[test]
    fn remove_module_state_and_unregister_both_clear_lists() {
        let mut csm = ConcurrentStateManager::new();
        let a = registered(&mut csm, "a", Phase::Update);
        let b = registered(&mut csm, "b", Phase::Update);
        csm.add_module_state(&a).unwrap();
        csm.add_module_state(&b).unwrap();

        csm.remove_module_state(&a);
        assert_eq!(ids(csm.module_states(Phase::Update)), ids(&[Arc::clone(&b)]));

        csm.unregister_state(&b).unwrap();
        assert!(csm.module_states(Phase::Update).is_empty());

        // Absent state: logged, nothing happens.
        csm.remove_module_state(&a);
    }
}
