//! Error types for connection establishment.
//!
//! Every per-socket failure is reported to the completion coordinator as a
//! [`HandshakeError`]. Only the first one ever reaches the caller; the rest
//! are absorbed as bookkeeping.

use std::io;
use thiserror::Error;

use crate::protocol::STATUS_LINE;

/// Failure of one socket slot (or of the whole logical connection, when it
/// is the first one observed).
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The peer name could not be resolved, or resolved to nothing.
    #[error("Address resolution failed for {host}:{service}: {reason}")]
    AddressResolution {
        host: String,
        service: String,
        reason: String,
    },

    /// Every resolved candidate refused the transport connection.
    #[error("Unable to connect to any of {attempted} candidate address(es): {source}")]
    Connect {
        attempted: usize,
        #[source]
        source: io::Error,
    },

    /// The peer answered with something other than the upgrade status line.
    #[error(
        "Bad header comparison {:?} does not match {:?}",
        String::from_utf8_lossy(.received),
        String::from_utf8_lossy(STATUS_LINE)
    )]
    HandshakeMismatch { received: Vec<u8> },

    /// A continuation fired after its logical connection was dropped.
    #[error("Logical connection was torn down before the operation completed")]
    PrematureTeardown,

    /// Writing the request or reading the response failed.
    #[error("I/O error during handshake: {0}")]
    Io(#[from] io::Error),

    /// An inbound upgrade request could not be parsed.
    #[error("Malformed upgrade request: {0}")]
    MalformedRequest(String),

    /// The slot has not completed its handshake (or failed it).
    #[error("Socket slot {0} is not ready")]
    SlotNotReady(usize),
}

impl HandshakeError {
    /// Raw bytes received from the peer, when the error carries them.
    pub fn received_bytes(&self) -> Option<&[u8]> {
        match self {
            HandshakeError::HandshakeMismatch { received } => Some(received),
            _ => None,
        }
    }
}

/// Invalid [`BundleConfig`](crate::BundleConfig) values or option strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown stream option: {0}")]
    UnknownOption(String),

    #[error("Invalid value {value:?} for stream option {option}")]
    InvalidValue { option: String, value: String },

    #[error("Socket count must be at least 1")]
    NoSockets,

    #[error("Maximum header size {actual} is below the minimum of {minimum} bytes")]
    HeaderBufferTooSmall { actual: usize, minimum: usize },

    #[error("Maximum header size {actual} exceeds the limit of {maximum} bytes")]
    HeaderBufferTooLarge { actual: usize, maximum: usize },
}
