//=========================================================================
// Signal Collector
//=========================================================================
//
// Loop-side drain of the control channel with bounded polling.
//
// Architecture:
//   Receiver<LoopSignal> → collect_frame() → EventQueue / TickControl
//
// Bounded polling keeps a flooded channel from starving the tick.
//
//=========================================================================

//=== External Dependencies ===============================================

use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, warn};

//=== Internal Dependencies ===============================================

use super::LoopSignal;
use crate::core::event_queue::{EventKind, EventQueue};

//=== TickControl =========================================================

/// Loop control signal for the current iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickControl {
    Continue,
    Exit,
}

//=== SignalCollector =====================================================

/// Applies queued [`LoopSignal`]s on the loop thread.
pub(crate) struct SignalCollector<K: EventKind> {
    receiver: Receiver<LoopSignal<K>>,
}

impl<K: EventKind> SignalCollector<K> {
    const MAX_SIGNALS_PER_FRAME: usize = 100;

    pub(crate) fn new(receiver: Receiver<LoopSignal<K>>) -> Self {
        Self { receiver }
    }

    /// Drains pending signals, forwarding posts into `events`.
    ///
    /// Returns [`TickControl::Exit`] as soon as a stop is seen or every
    /// sender is gone; signals behind a stop stay queued.
    pub(crate) fn collect_frame(&mut self, events: &mut EventQueue<K>) -> TickControl {
        let mut drained = 0;

        while drained < Self::MAX_SIGNALS_PER_FRAME {
            match self.receiver.try_recv() {
                Ok(LoopSignal::Stop) => {
                    debug!("Stop requested through loop handle");
                    return TickControl::Exit;
                }
                Ok(LoopSignal::Post(event)) => {
                    events.post_shared_event(event);
                    drained += 1;
                }
                Err(TryRecvError::Disconnected) => return TickControl::Exit,
                Err(TryRecvError::Empty) => break,
            }
        }

        if drained >= Self::MAX_SIGNALS_PER_FRAME {
            warn!("Loop control backlog: drained {} signals this frame", drained);
        }

        TickControl::Continue
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
