//! Collapses N per-socket outcomes into one terminal event.
//!
//! The counter starts at the socket count. A success takes one off; the
//! success that reaches zero fires `connected`. The first failure takes off
//! the socket count plus one, which leaves the counter negative for good, so
//! no sequence of later completions can ever reach zero again. Anything that
//! arrives once the counter is at or below zero is bookkeeping only.
//!
//! All outcomes of one logical connection are applied from a single task,
//! so the counter needs no synchronisation.

use tracing::{debug, info, warn};

use crate::connection::{LogicalConnection, SlotState};
use crate::error::HandshakeError;
use crate::protocol::ValidatedResponse;
use crate::transport::BoxedStream;

/// Effect of recording one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A success, with more sockets still outstanding
    Pending,
    /// The last success; fire `connected`
    Connected,
    /// The first failure; fire `failed`
    Failed,
    /// A terminal event already fired; nothing to report
    Absorbed,
}

/// Signed completion counter of one logical connection.
#[derive(Debug, Clone)]
pub struct CompletionCounter {
    socket_count: i64,
    remaining: i64,
}

impl CompletionCounter {
    pub fn new(socket_count: usize) -> Self {
        let socket_count = socket_count as i64;
        Self {
            socket_count,
            remaining: socket_count,
        }
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    /// True until the first completion of any kind is recorded.
    pub fn is_untouched(&self) -> bool {
        self.remaining == self.socket_count
    }

    pub fn record_success(&mut self) -> Transition {
        let open = self.remaining >= 1;
        self.remaining -= 1;
        match (open, self.remaining) {
            (true, 0) => Transition::Connected,
            (true, _) => Transition::Pending,
            (false, _) => Transition::Absorbed,
        }
    }

    pub fn record_failure(&mut self) -> Transition {
        if self.remaining >= 1 {
            self.remaining -= self.socket_count;
            self.remaining -= 1;
            Transition::Failed
        } else {
            self.remaining -= 1;
            Transition::Absorbed
        }
    }
}

/// Result of establishing one socket slot.
pub(crate) enum SlotOutcome {
    Ready {
        slot: usize,
        response: ValidatedResponse,
        stream: BoxedStream,
    },
    Failed {
        slot: usize,
        error: HandshakeError,
    },
}

/// Applies slot outcomes to a live connection.
#[derive(Debug)]
pub(crate) struct Coordinator {
    counter: CompletionCounter,
}

impl Coordinator {
    pub(crate) fn new(socket_count: usize) -> Self {
        Self {
            counter: CompletionCounter::new(socket_count),
        }
    }

    pub(crate) fn apply(&mut self, connection: &LogicalConnection, outcome: SlotOutcome) {
        match outcome {
            SlotOutcome::Ready {
                slot,
                response,
                stream,
            } => {
                if self.counter.is_untouched() {
                    connection.record_reference_header(response.received());
                }
                connection.set_slot_state(slot, SlotState::Ready);

                let transition = self.counter.record_success();
                if transition == Transition::Absorbed {
                    debug!(slot, "Socket validated after connection already failed");
                    return;
                }

                let (_, leftover) = response.into_parts();
                debug!(slot, leftover = leftover.len(), "Socket handshake validated");
                connection.attach_slot(slot, stream, leftover);

                if transition == Transition::Connected {
                    info!(
                        token = %connection.token(),
                        sockets = connection.socket_count(),
                        "Logical connection established"
                    );
                    connection.notify_connected();
                }
            }
            SlotOutcome::Failed { slot, error } => {
                connection.set_slot_state(slot, SlotState::Failed);
                match self.counter.record_failure() {
                    Transition::Failed => {
                        warn!(slot, error = %error, "Logical connection failed");
                        connection.notify_failed(slot, error);
                    }
                    _ => debug!(slot, error = %error, "Additional socket failure absorbed"),
                }
            }
        }
    }
}
