//=========================================================================
// Event Queue
//=========================================================================
//
// Receiver registry plus a growable FIFO ring of posted events.
//
// Architecture:
//   module_kinds: HashMap<ModuleId, Vec<K>>          (bookkeeping)
//   receivers:    HashMap<K, Vec<(ModuleId, Receiver)>>
//   buffer:       [Option<Event>; capacity]  head → … → tail
//
// Invariants:
//   - head == tail means empty; the ring never stays full (posting the
//     last free slot doubles the buffer immediately)
//   - Events with no receivers are never queued
//   - Only the loop thread posts or drains (enforced by &mut self)
//
//=========================================================================

//=== External Dependencies ===============================================

use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::sync::Arc;

//=== Internal Dependencies ===============================================

use super::{Event, EventKind, EventReceiver};
use crate::core::module::ModuleId;
use crate::core::thread_pool::Task;
use crate::error::{CoreError, CoreResult};

//=== Constants ===========================================================

/// Initial ring capacity; grows by doubling.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 10;

type SharedEvent<K> = Arc<dyn Event<K>>;

//=== EventQueue ==========================================================

/// Posted events waiting for the next Input or Render drain.
pub struct EventQueue<K: EventKind> {
    module_kinds: HashMap<ModuleId, Vec<K>>,
    receivers: HashMap<K, Vec<(ModuleId, EventReceiver<K>)>>,
    buffer: Vec<Option<SharedEvent<K>>>,
    head: usize,
    tail: usize,
}

impl<K: EventKind> EventQueue<K> {
    //--- Construction ----------------------------------------------------

    /// Creates a queue with [`DEFAULT_EVENT_QUEUE_CAPACITY`] slots.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_QUEUE_CAPACITY)
    }

    /// Creates a queue with `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is less than 2.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity >= 2,
            "Event queue capacity must be at least 2, got {}",
            capacity
        );

        Self {
            module_kinds: HashMap::new(),
            receivers: HashMap::new(),
            buffer: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
        }
    }

    //--- Registration ----------------------------------------------------

    /// Registers `receiver` to be notified of every event of `kind`.
    ///
    /// # Errors
    ///
    /// [`CoreError::ReceiverAlreadyRegistered`] if `module` already has a
    /// receiver for `kind`.
    pub fn register_event_receiver(
        &mut self,
        kind: K,
        module: ModuleId,
        receiver: EventReceiver<K>,
    ) -> CoreResult<()> {
        let kinds = self.module_kinds.entry(module.clone()).or_default();
        if kinds.contains(&kind) {
            return Err(CoreError::ReceiverAlreadyRegistered {
                module,
                kind: format!("{:?}", kind),
            });
        }
        kinds.push(kind);

        debug!("Module '{}' registered for {:?}", module, kind);
        self.receivers.entry(kind).or_default().push((module, receiver));
        Ok(())
    }

    /// Removes the receiver `module` registered for `kind`.
    ///
    /// # Errors
    ///
    /// [`CoreError::ModuleNotRegistered`] if `module` never registered for
    /// any kind. A module that registered for other kinds only gets a
    /// warning.
    pub fn unregister_module(&mut self, kind: K, module: &ModuleId) -> CoreResult<()> {
        let Some(kinds) = self.module_kinds.get_mut(module) else {
            return Err(CoreError::ModuleNotRegistered {
                module: module.clone(),
                kind: format!("{:?}", kind),
            });
        };
        kinds.retain(|k| *k != kind);

        let removed = match self.receivers.get_mut(&kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|(owner, _)| owner != module);
                let removed = list.len() < before;
                if list.is_empty() {
                    self.receivers.remove(&kind);
                }
                removed
            }
            None => false,
        };

        if removed {
            debug!("Module '{}' unregistered from {:?}", module, kind);
        } else {
            warn!(
                "Module '{}' had no receiver for {:?}; nothing to unregister",
                module, kind
            );
        }
        Ok(())
    }

    /// Returns `true` if anything is registered for `kind`.
    pub fn has_receivers(&self, kind: K) -> bool {
        self.receivers.get(&kind).is_some_and(|list| !list.is_empty())
    }

    //--- Posting ---------------------------------------------------------

    /// Queues `event` for the next drain.
    ///
    /// Events of a kind nobody listens to are dropped.
    pub fn post_event<E: Event<K>>(&mut self, event: E) {
        self.post_shared_event(Arc::new(event));
    }

    /// Queues an already-shared event.
    pub fn post_shared_event(&mut self, event: SharedEvent<K>) {
        let kind = event.kind();
        if !self.has_receivers(kind) {
            trace!("Dropping {:?}: no receivers registered", kind);
            return;
        }

        let capacity = self.buffer.len();
        self.buffer[self.tail] = Some(event);
        self.tail = (self.tail + 1) % capacity;

        if self.tail == self.head {
            self.grow();
        }
    }

    /// Doubles the ring, unrolling it so the oldest event lands at index 0.
    fn grow(&mut self) {
        let old_capacity = self.buffer.len();
        let new_capacity = old_capacity * 2;

        let mut buffer: Vec<Option<SharedEvent<K>>> = Vec::with_capacity(new_capacity);
        buffer.extend(self.buffer.drain(self.head..));
        buffer.extend(self.buffer.drain(..));
        buffer.resize_with(new_capacity, || None);

        self.buffer = buffer;
        self.head = 0;
        self.tail = old_capacity;

        info!(
            "Event queue grew from {} to {} slots",
            old_capacity, new_capacity
        );
    }

    //--- Draining --------------------------------------------------------

    /// Converts every queued event into a notification task, oldest first,
    /// and clears the queue.
    ///
    /// Receiver lists are captured now; registrations made after the drain
    /// do not see these events.
    pub fn event_receivers(&mut self) -> Vec<Task> {
        let capacity = self.buffer.len();
        let mut tasks: Vec<Task> = Vec::with_capacity(self.len());

        let mut index = self.head;
        while index != self.tail {
            if let Some(event) = self.buffer[index].take() {
                let receivers: Vec<EventReceiver<K>> = self
                    .receivers
                    .get(&event.kind())
                    .map(|list| list.iter().map(|(_, r)| Arc::clone(r)).collect())
                    .unwrap_or_default();

                tasks.push(Box::new(move || event.notify_modules(&receivers)));
            }
            index = (index + 1) % capacity;
        }

        self.head = 0;
        self.tail = 0;

        if !tasks.is_empty() {
            trace!("Drained {} events", tasks.len());
        }
        tasks
    }

    //--- Queries ---------------------------------------------------------

    /// Number of queued events.
    pub fn len(&self) -> usize {
        if self.tail >= self.head {
            self.tail - self.head
        } else {
            self.buffer.len() - self.head + self.tail
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Current ring size in slots.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

impl<K: EventKind> Default for EventQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
