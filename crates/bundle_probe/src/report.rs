//! The JSON report printed once the probe finishes.

use serde::Serialize;
use socket_bundle::{ConnectionEvent, LogicalConnection};
use std::time::Duration;

/// How the attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Connected,
    Failed { slot: usize, reason: String },
    /// No terminal event before the deadline
    TimedOut,
    /// A termination signal arrived first
    Interrupted,
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Connected)
    }
}

impl From<ConnectionEvent> for ProbeOutcome {
    fn from(event: ConnectionEvent) -> Self {
        match event {
            ConnectionEvent::Connected => ProbeOutcome::Connected,
            ConnectionEvent::Failed { slot, reason } => ProbeOutcome::Failed {
                slot,
                reason: reason.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub outcome: ProbeOutcome,
    pub token: String,
    pub peer: String,
    pub socket_count: usize,
    pub ready_slots: Vec<usize>,
    pub elapsed_ms: u64,
    /// First validated response header, lossily decoded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_header: Option<String>,
}

impl ProbeReport {
    /// Captures the connection's state at the moment the outcome is known.
    pub fn capture(
        connection: &LogicalConnection,
        peer: String,
        outcome: ProbeOutcome,
        elapsed: Duration,
    ) -> Self {
        Self {
            outcome,
            token: connection.token().to_string(),
            peer,
            socket_count: connection.socket_count(),
            ready_slots: connection.ready_slots(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            reference_header: connection
                .reference_header()
                .map(|header| String::from_utf8_lossy(header).into_owned()),
        }
    }
}
