//! Connect-and-handshake driver for one logical connection.
//!
//! [`ConnectAndHandshake::start`] resolves the peer once, then drives all N
//! socket slots concurrently inside a single task. Each slot walks its own
//! cursor over the shared candidates until a transport connect succeeds,
//! writes its upgrade request, reads and validates the response, and yields
//! an outcome. The coordinator applies outcomes in the order they complete.
//!
//! The driver owns the per-attempt [`HandshakeTask`] through an `Arc` that
//! lives exactly as long as some slot future is outstanding, and reaches the
//! connection only through a `Weak`. Every completion re-resolves that weak
//! reference first; once the caller has dropped the connection, completions
//! touch nothing and report nothing. Dropping the connection also signals
//! the driver, which cancels whatever is still outstanding.

use futures::stream::{FuturesUnordered, StreamExt};
use std::io;
use std::sync::{Arc, Weak};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::BundleConfig;
use crate::connection::{LogicalConnection, SlotState};
use crate::coordinator::{Coordinator, SlotOutcome};
use crate::error::HandshakeError;
use crate::protocol::{
    response_complete, validate_response, ProtocolHeader, SessionToken, ValidatedResponse,
};
use crate::resolver::{resolve, CandidateCursor};
use crate::transport::{BoxedStream, Transport};

const RESPONSE_CHUNK_SIZE: usize = 1024;

/// Entry point for establishing a [`LogicalConnection`].
#[derive(Debug, Clone, Copy)]
pub struct ConnectAndHandshake;

impl ConnectAndHandshake {
    /// Starts connecting every socket of `connection` to `host:service`.
    ///
    /// Returns immediately. The outcome is reported once through the
    /// connection's handler. The returned handle completes when no work for
    /// this attempt remains; awaiting it is optional.
    ///
    /// No timeout is applied here. A peer that never answers stalls the
    /// attempt until the caller drops the connection.
    pub fn start(
        connection: &Arc<LogicalConnection>,
        transport: Arc<dyn Transport>,
        host: impl Into<String>,
        service: impl Into<String>,
    ) -> JoinHandle<()> {
        let task = Arc::new(HandshakeTask {
            connection: Arc::downgrade(connection),
            transport,
            host: host.into(),
            service: service.into(),
            token: connection.token(),
            config: connection.config().clone(),
        });
        debug!(
            token = %task.token,
            host = %task.host,
            service = %task.service,
            sockets = task.config.socket_count,
            "Starting connect and handshake"
        );
        tokio::spawn(task.run(connection.teardown_signal()))
    }
}

/// State of one connection attempt, shared by its slot futures.
struct HandshakeTask {
    connection: Weak<LogicalConnection>,
    transport: Arc<dyn Transport>,
    host: String,
    service: String,
    token: SessionToken,
    config: BundleConfig,
}

impl HandshakeTask {
    /// Upgrades the weak reference, or reports that the connection is gone.
    fn connection(&self) -> Result<Arc<LogicalConnection>, HandshakeError> {
        self.connection
            .upgrade()
            .ok_or(HandshakeError::PrematureTeardown)
    }

    async fn run(self: Arc<Self>, mut teardown: watch::Receiver<()>) {
        let mut coordinator = Coordinator::new(self.config.socket_count);

        let resolved = tokio::select! {
            resolved = resolve(
                self.transport.as_ref(),
                &self.host,
                &self.service,
                &self.config,
            ) => resolved,
            _ = teardown.changed() => {
                trace!(token = %self.token, "Connection dropped during resolution");
                return;
            }
        };
        let Ok(connection) = self.connection() else {
            trace!(token = %self.token, "Connection dropped during resolution");
            return;
        };

        let candidates = match resolved {
            Ok(candidates) => candidates,
            Err(error) => {
                // Same path as a connect failure on every slot; slot 0 reports first.
                let reason = error.to_string();
                coordinator.apply(&connection, SlotOutcome::Failed { slot: 0, error });
                for slot in 1..self.config.socket_count {
                    let error = HandshakeError::AddressResolution {
                        host: self.host.clone(),
                        service: self.service.clone(),
                        reason: reason.clone(),
                    };
                    coordinator.apply(&connection, SlotOutcome::Failed { slot, error });
                }
                return;
            }
        };
        drop(connection);

        let mut slots: FuturesUnordered<_> = (0..self.config.socket_count)
            .map(|slot| self.clone().establish_slot(slot, candidates.cursor()))
            .collect();

        loop {
            let outcome = tokio::select! {
                outcome = slots.next() => outcome,
                _ = teardown.changed() => {
                    trace!(token = %self.token, "Connection dropped; cancelling outstanding slots");
                    break;
                }
            };
            let Some(outcome) = outcome else {
                break;
            };
            let Some(outcome) = outcome else {
                continue;
            };
            let Ok(connection) = self.connection() else {
                trace!(token = %self.token, "Connection dropped; discarding remaining slots");
                break;
            };
            coordinator.apply(&connection, outcome);
        }
    }

    /// Runs one slot to completion. `None` means the connection went away.
    async fn establish_slot(
        self: Arc<Self>,
        slot: usize,
        cursor: CandidateCursor,
    ) -> Option<SlotOutcome> {
        match self.try_establish(slot, cursor).await {
            Ok((response, stream)) => Some(SlotOutcome::Ready {
                slot,
                response,
                stream,
            }),
            Err(HandshakeError::PrematureTeardown) => {
                trace!(slot, "Slot completion ignored after teardown");
                None
            }
            Err(error) => Some(SlotOutcome::Failed { slot, error }),
        }
    }

    async fn try_establish(
        &self,
        slot: usize,
        mut cursor: CandidateCursor,
    ) -> Result<(ValidatedResponse, BoxedStream), HandshakeError> {
        let mut stream = self.connect_slot(slot, &mut cursor).await?;
        self.connection()?.set_slot_state(slot, SlotState::Handshaking);

        let request = ProtocolHeader {
            token: self.token,
            host: self.host.clone(),
            service: self.service.clone(),
            socket_index: slot,
            socket_count: self.config.socket_count,
            variant: self.config.variant,
        }
        .encode();
        stream.write_all(&request).await?;
        stream.flush().await?;
        self.connection()?;

        let received = self.read_response(&mut stream).await?;
        let response = validate_response(received, self.config.variant)?;
        Ok((response, stream))
    }

    /// Tries candidates in order until one accepts the transport connection.
    async fn connect_slot(
        &self,
        slot: usize,
        cursor: &mut CandidateCursor,
    ) -> Result<BoxedStream, HandshakeError> {
        let mut last_error = None;
        while let Some(candidate) = cursor.next() {
            let result = self.transport.connect(candidate, &self.config).await;
            self.connection()?;
            match result {
                Ok(stream) => {
                    debug!(slot, %candidate, "Socket connected");
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(slot, %candidate, error = %e, "Connect attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(HandshakeError::Connect {
            attempted: cursor.attempted(),
            source: last_error.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "no candidate addresses")
            }),
        })
    }

    /// Reads until the header block is complete, `max_header_size` bytes
    /// have arrived, or EOF.
    ///
    /// Reads shorter than the terminator simply continue the loop. The
    /// buffer grows with what arrives rather than with the bound.
    async fn read_response(&self, stream: &mut BoxedStream) -> Result<Vec<u8>, HandshakeError> {
        let limit = self.config.max_header_size;
        let mut received = Vec::with_capacity(limit.min(RESPONSE_CHUNK_SIZE));
        let mut chunk = [0u8; RESPONSE_CHUNK_SIZE];
        while received.len() < limit {
            let want = (limit - received.len()).min(chunk.len());
            let n = stream.read(&mut chunk[..want]).await?;
            self.connection()?;
            if n == 0 {
                if received.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed the socket before responding",
                    )
                    .into());
                }
                break;
            }
            received.extend_from_slice(&chunk[..n]);
            if response_complete(&received, self.config.variant) {
                break;
            }
        }
        Ok(received)
    }
}
