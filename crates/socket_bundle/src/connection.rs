//! The logical connection: N physical sockets acting as one.
//!
//! A [`LogicalConnection`] is created by the caller, handed to
//! [`ConnectAndHandshake::start`](crate::ConnectAndHandshake::start) and kept
//! alive for as long as the caller wants it. In-flight handshake work only
//! holds a weak reference, so dropping the last `Arc` tears everything down:
//! pending completions become no-ops and the per-slot readers are aborted.

use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::BundleConfig;
use crate::error::{ConfigError, HandshakeError};
use crate::protocol::{ProtocolVariant, SessionToken};
use crate::transport::BoxedStream;

const READ_CHUNK_SIZE: usize = 8192;

/// Progress of one physical socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Walking the candidate addresses
    Connecting,
    /// Transport connected, request sent, waiting for the response
    Handshaking,
    /// Response validated; see [`LogicalConnection::slot_state`]
    Ready,
    /// Connect or handshake failed
    Failed,
}

/// Receives the single terminal event of a logical connection.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Every socket validated successfully.
    fn connected(&self);

    /// The first socket failure; no other event follows.
    fn connection_failed(&self, slot: usize, reason: HandshakeError);
}

/// Terminal event as a value, for channel-based consumers.
#[derive(Debug)]
pub enum ConnectionEvent {
    Connected,
    Failed { slot: usize, reason: HandshakeError },
}

/// [`ConnectionHandler`] that forwards events into an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    sender: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), receiver)
    }
}

impl ConnectionHandler for ChannelHandler {
    fn connected(&self) {
        let _ = self.sender.send(ConnectionEvent::Connected);
    }

    fn connection_failed(&self, slot: usize, reason: HandshakeError) {
        let _ = self.sender.send(ConnectionEvent::Failed { slot, reason });
    }
}

/// Application bytes read from one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundChunk {
    pub slot: usize,
    pub data: Vec<u8>,
}

pub type InboundReceiver = mpsc::UnboundedReceiver<InboundChunk>;

type SlotWriter = Arc<Mutex<WriteHalf<BoxedStream>>>;

/// One application-level connection made of `socket_count` sockets.
pub struct LogicalConnection {
    config: BundleConfig,
    token: SessionToken,
    handler: Arc<dyn ConnectionHandler>,
    slots: DashMap<usize, SlotState>,
    writers: DashMap<usize, SlotWriter>,
    readers: DashMap<usize, JoinHandle<()>>,
    inbound: mpsc::UnboundedSender<InboundChunk>,
    reference_header: OnceLock<Vec<u8>>,
    teardown: watch::Sender<()>,
}

impl LogicalConnection {
    /// Creates a connection with a fresh session token.
    ///
    /// The returned receiver yields every slot's application data, starting
    /// with the bytes that arrived alongside that slot's handshake response.
    pub fn new(
        config: BundleConfig,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<(Arc<Self>, InboundReceiver), ConfigError> {
        Self::with_token(config, SessionToken::new(), handler)
    }

    /// Creates a connection that identifies itself with `token`.
    pub fn with_token(
        config: BundleConfig,
        token: SessionToken,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<(Arc<Self>, InboundReceiver), ConfigError> {
        config.validate()?;
        let (inbound, receiver) = mpsc::unbounded_channel();
        let (teardown, _) = watch::channel(());
        let slots = (0..config.socket_count)
            .map(|slot| (slot, SlotState::Connecting))
            .collect();
        let connection = Arc::new(Self {
            config,
            token,
            handler,
            slots,
            writers: DashMap::new(),
            readers: DashMap::new(),
            inbound,
            reference_header: OnceLock::new(),
            teardown,
        });
        Ok((connection, receiver))
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn socket_count(&self) -> usize {
        self.config.socket_count
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.config.variant
    }

    /// Handshake progress of one slot.
    ///
    /// `Ready` means the slot's response validated. It does not imply a live
    /// pipeline: a slot that validates after another slot already failed the
    /// connection is `Ready` here but absent from [`ready_slots`](Self::ready_slots),
    /// and [`send`](Self::send) on it returns `SlotNotReady`.
    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(&slot).map(|state| *state)
    }

    /// Slots with a live read/write pipeline, in index order.
    ///
    /// Only validations counted towards `connected` get a pipeline.
    pub fn ready_slots(&self) -> Vec<usize> {
        let mut ready: Vec<usize> = self.writers.iter().map(|entry| *entry.key()).collect();
        ready.sort_unstable();
        ready
    }

    /// Raw bytes of the first handshake response validated on this connection.
    ///
    /// Diagnostic only; nothing in the handshake depends on it.
    pub fn reference_header(&self) -> Option<&[u8]> {
        self.reference_header.get().map(Vec::as_slice)
    }

    /// Writes raw bytes on a ready slot.
    pub async fn send(&self, slot: usize, data: &[u8]) -> Result<(), HandshakeError> {
        let writer = self
            .writers
            .get(&slot)
            .map(|entry| entry.value().clone())
            .ok_or(HandshakeError::SlotNotReady(slot))?;
        let mut writer = writer.lock().await;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Resolves with an error once this connection has been dropped.
    pub(crate) fn teardown_signal(&self) -> watch::Receiver<()> {
        self.teardown.subscribe()
    }

    pub(crate) fn set_slot_state(&self, slot: usize, state: SlotState) {
        self.slots.insert(slot, state);
    }

    pub(crate) fn record_reference_header(&self, header: &[u8]) {
        let _ = self.reference_header.set(header.to_vec());
    }

    pub(crate) fn notify_connected(&self) {
        self.handler.connected();
    }

    pub(crate) fn notify_failed(&self, slot: usize, reason: HandshakeError) {
        self.handler.connection_failed(slot, reason);
    }

    /// Hands a validated socket to its read pipeline.
    ///
    /// `leftover` is delivered first, then everything the reader task pulls
    /// off the socket.
    pub(crate) fn attach_slot(&self, slot: usize, stream: BoxedStream, leftover: Vec<u8>) {
        let (reader, writer) = tokio::io::split(stream);
        self.writers.insert(slot, Arc::new(Mutex::new(writer)));

        if !leftover.is_empty() {
            let _ = self.inbound.send(InboundChunk {
                slot,
                data: leftover,
            });
        }

        let handle = tokio::spawn(read_slot(slot, reader, self.inbound.clone()));
        self.readers.insert(slot, handle);
    }
}

async fn read_slot(
    slot: usize,
    mut reader: ReadHalf<BoxedStream>,
    inbound: mpsc::UnboundedSender<InboundChunk>,
) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!(slot, "Peer closed socket");
                break;
            }
            Ok(n) => {
                let chunk = InboundChunk {
                    slot,
                    data: buf[..n].to_vec(),
                };
                if inbound.send(chunk).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(slot, error = %e, "Read failed on socket");
                break;
            }
        }
    }
}

impl Drop for LogicalConnection {
    fn drop(&mut self) {
        for reader in self.readers.iter() {
            reader.value().abort();
        }
    }
}

impl fmt::Debug for LogicalConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalConnection")
            .field("token", &self.token)
            .field("socket_count", &self.config.socket_count)
            .field("variant", &self.config.variant)
            .field("ready_slots", &self.ready_slots())
            .finish()
    }
}
