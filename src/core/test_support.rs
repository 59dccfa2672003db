//=========================================================================
// Test Support
//=========================================================================
//
// Recording states and components shared by the unit tests.
//
//=========================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crossbeam_channel::{Receiver, Sender};

use crate::core::state::{Component, ComponentList, ComponentRef, State, StateRef};

//=== CountingComponent ===================================================

/// Counts its updates and remembers which threads ran them.
#[derive(Default)]
pub(crate) struct CountingComponent {
    pub updates: AtomicUsize,
    pub threadsafe_updates: AtomicUsize,
    update_threads: Mutex<Vec<ThreadId>>,
    threadsafe_threads: Mutex<Vec<ThreadId>>,
}

impl CountingComponent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn update_threads(&self) -> Vec<ThreadId> {
        self.update_threads.lock().unwrap().clone()
    }

    pub fn threadsafe_threads(&self) -> Vec<ThreadId> {
        self.threadsafe_threads.lock().unwrap().clone()
    }
}

impl Component for CountingComponent {
    fn update(&self) {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.update_threads.lock().unwrap().push(thread::current().id());
    }

    fn threadsafe_update(&self) {
        self.threadsafe_updates.fetch_add(1, Ordering::SeqCst);
        self.threadsafe_threads.lock().unwrap().push(thread::current().id());
    }
}

//=== RecordingState ======================================================

/// State that counts its hooks, optionally journals them, and can block
/// inside `update` until released.
pub(crate) struct RecordingState {
    pub name: &'static str,
    components: ComponentList,
    pub preps: AtomicUsize,
    pub updates: AtomicUsize,
    update_threads: Mutex<Vec<ThreadId>>,
    journal: Option<Sender<String>>,
    gate: Option<Receiver<()>>,
}

impl RecordingState {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self::bare(name))
    }

    fn bare(name: &'static str) -> Self {
        Self {
            name,
            components: ComponentList::new(),
            preps: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            update_threads: Mutex::new(Vec::new()),
            journal: None,
            gate: None,
        }
    }

    /// Sends `"<name>"` to `journal` every time `update` runs.
    pub fn journaled(name: &'static str, journal: Sender<String>) -> Arc<Self> {
        Arc::new(Self {
            journal: Some(journal),
            ..Self::bare(name)
        })
    }

    /// Makes every `update` wait for one message on `gate`.
    pub fn with_gate(self: Arc<Self>, gate: Receiver<()>) -> Arc<Self> {
        let inner = Arc::try_unwrap(self).unwrap_or_else(|_| panic!("state already shared"));
        Arc::new(Self {
            gate: Some(gate),
            ..inner
        })
    }

    pub fn add_counters(&self, counters: &[Arc<CountingComponent>]) {
        for counter in counters {
            self.components.push(Arc::clone(counter) as ComponentRef);
        }
    }

    pub fn update_threads(&self) -> Vec<ThreadId> {
        self.update_threads.lock().unwrap().clone()
    }

    pub fn into_state(self: Arc<Self>) -> StateRef {
        self
    }
}

impl State for RecordingState {
    fn add_component(&self, component: ComponentRef) {
        self.components.push(component);
    }

    fn remove_component(&self, component: &ComponentRef) {
        self.components.remove(component);
    }

    fn components(&self) -> Arc<[ComponentRef]> {
        self.components.snapshot()
    }

    fn update_prep(&self) {
        self.preps.fetch_add(1, Ordering::SeqCst);
    }

    fn update(&self) {
        if let Some(gate) = &self.gate {
            gate.recv().unwrap();
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.update_threads.lock().unwrap().push(thread::current().id());
        if let Some(journal) = &self.journal {
            journal.send(self.name.to_string()).unwrap();
        }
    }
}

//=== Helpers =============================================================

pub(crate) fn components_of(components: &[ComponentRef]) -> Arc<[ComponentRef]> {
    Arc::from(components.to_vec())
}
