//=========================================================================
// Loop Control
//=========================================================================
//
// Cross-thread control of a running engine loop.
//
// Architecture:
//   LoopHandle (any thread) → bounded channel → SignalCollector (loop thread)
//                                                  ├─ Stop → TickControl::Exit
//                                                  └─ Post → EventQueue
//
// Components:
// - `LoopHandle`: cloneable sender side handed to other threads
// - `signal_collector`: bounded per-tick polling on the loop thread
//
//=========================================================================

//=== Module Declarations =================================================

mod signal_collector;

//=== External Dependencies ===============================================

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};
use log::warn;

//=== Internal Dependencies ===============================================

use crate::core::event_queue::{Event, EventKind};

//=== Internal API ========================================================

pub(crate) use signal_collector::{SignalCollector, TickControl};

//=== LoopSignal ==========================================================

/// Request delivered to the loop thread before its next Input phase.
pub enum LoopSignal<K: EventKind> {
    /// Leave the loop before the next Input phase.
    Stop,
    /// Post an event as if the loop thread had posted it.
    Post(Arc<dyn Event<K>>),
}

impl<K: EventKind> fmt::Debug for LoopSignal<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopSignal::Stop => f.write_str("Stop"),
            LoopSignal::Post(event) => f.debug_tuple("Post").field(&event.kind()).finish(),
        }
    }
}

//=== LoopHandle ==========================================================

/// Thread-safe handle for stopping the loop or posting events into it.
///
/// Obtained from [`Engine::handle`](crate::Engine::handle). Sends never
/// block: when the channel is full the signal is dropped with a warning
/// and `false` is returned.
pub struct LoopHandle<K: EventKind> {
    sender: Sender<LoopSignal<K>>,
}

impl<K: EventKind> LoopHandle<K> {
    pub(crate) fn new(sender: Sender<LoopSignal<K>>) -> Self {
        Self { sender }
    }

    /// Asks the loop to stop before its next Input phase.
    pub fn stop(&self) -> bool {
        self.send(LoopSignal::Stop)
    }

    /// Posts `event` from outside the loop thread.
    pub fn post_event<E: Event<K>>(&self, event: E) -> bool {
        self.send(LoopSignal::Post(Arc::new(event)))
    }

    fn send(&self, signal: LoopSignal<K>) -> bool {
        match self.sender.try_send(signal) {
            Ok(()) => true,
            Err(TrySendError::Full(signal)) => {
                warn!("Loop control channel full; dropping {:?}", signal);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

impl<K: EventKind> Clone for LoopHandle<K> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestKind {
        Tick,
    }

    impl EventKind for TestKind {}

    struct Tick;

    impl Event<TestKind> for Tick {
        fn kind(&self) -> TestKind {
            TestKind::Tick
        }
    }

    #[test]
    fn handle_sends_stop_and_post() {
        let (tx, rx) = bounded(4);
        let handle = LoopHandle::<TestKind>::new(tx);

        assert!(handle.post_event(Tick));
        assert!(handle.clone().stop());

        assert!(matches!(rx.try_recv().unwrap(), LoopSignal::Post(_)));
        assert!(matches!(rx.try_recv().unwrap(), LoopSignal::Stop));
    }

    #[test]
    fn full_channel_drops_signal() {
        let (tx, _rx) = bounded(1);
        let handle = LoopHandle::<TestKind>::new(tx);

        assert!(handle.stop());
        assert!(!handle.stop());
    }

    #[test]
    fn disconnected_channel_reports_failure() {
        let (tx, rx) = bounded(1);
        let handle = LoopHandle::<TestKind>::new(tx);
        drop(rx);

        assert!(!handle.post_event(Tick));
    }

    #[test]
    fn signal_debug_shows_event_kind() {
        let signal = LoopSignal::<TestKind>::Post(Arc::new(Tick));
        assert_eq!(format!("{:?}", signal), "Post(Tick)");
    }
}
