//! # Socket Bundle - Multi-Socket Logical Connections
//!
//! A logical connection to a remote peer is made of N independent transport
//! sockets. This crate resolves the peer, connects every socket (falling back
//! across resolved candidates per socket), performs an HTTP-upgrade style
//! handshake on each, and reports exactly one aggregate event for the whole
//! logical connection: `connected` once all N sockets validated, or
//! `failed(slot, reason)` on the first failure.
//!
//! ## Components
//!
//! * **Resolver** ([`resolver`]) - host/service to an ordered candidate list
//!   shared read-only by all sockets
//! * **Connector / Sender / Validator** ([`handshake`]) - per-socket connect
//!   loop, upgrade request, bounded response read and validation
//! * **Coordinator** ([`coordinator`]) - signed completion counter turning N
//!   outcomes into one terminal event
//! * **Wire format** ([`protocol`]) - request/response encoding for the
//!   versioned and legacy variants
//!
//! ## Usage
//!
//! ```rust,no_run
//! use socket_bundle::{
//!     BundleConfig, ChannelHandler, ConnectAndHandshake, ConnectionEvent, LogicalConnection,
//!     TcpTransport,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (handler, mut events) = ChannelHandler::new();
//! let config = BundleConfig { socket_count: 4, ..Default::default() };
//! let (connection, mut inbound) = LogicalConnection::new(config, handler)?;
//!
//! ConnectAndHandshake::start(&connection, Arc::new(TcpTransport), "sim.example.org", "7777");
//!
//! match events.recv().await {
//!     Some(ConnectionEvent::Connected) => {
//!         while let Some(chunk) = inbound.recv().await {
//!             println!("slot {} sent {} bytes", chunk.slot, chunk.data.len());
//!         }
//!     }
//!     Some(ConnectionEvent::Failed { slot, reason }) => eprintln!("slot {slot} failed: {reason}"),
//!     None => {}
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! All sockets of one logical connection are driven from a single task, so
//! the completion counter is only ever touched by one step at a time.
//! Separate logical connections run on separate tasks and share nothing.
//!
//! Dropping the last `Arc<LogicalConnection>` cancels the attempt: completions
//! arriving afterwards are ignored and no event fires. There is no built-in
//! timeout; callers bound the attempt themselves.

pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod resolver;
pub mod transport;

pub use config::BundleConfig;
pub use connection::{
    ChannelHandler, ConnectionEvent, ConnectionHandler, InboundChunk, InboundReceiver,
    LogicalConnection, SlotState,
};
pub use coordinator::{CompletionCounter, Transition};
pub use error::{ConfigError, HandshakeError};
pub use handshake::ConnectAndHandshake;
pub use protocol::{
    accept_response, find_terminator, validate_response, ProtocolHeader, ProtocolVariant,
    SessionToken, ValidatedResponse, STATUS_LINE,
};
pub use resolver::{CandidateCursor, CandidateSequence};
pub use transport::{AsyncStream, BoxedStream, TcpTransport, Transport};
