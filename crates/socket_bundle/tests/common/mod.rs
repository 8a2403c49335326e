//! Scripted in-memory transport for driving handshakes deterministically.
//!
//! Each candidate address either refuses the connection or accepts it with
//! an in-memory duplex pipe. Accepted pipes are served by a fake peer that
//! reads the upgrade request, records it, and answers according to the
//! reply configured for that socket index.

#![allow(dead_code)]

use async_trait::async_trait;
use socket_bundle::{
    find_terminator, BundleConfig, BoxedStream, ConnectionEvent, ProtocolHeader, Transport,
};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, Notify};

/// How the fake peer answers one socket.
#[derive(Clone)]
pub enum Reply {
    /// Write the bytes in one go
    Immediate(Vec<u8>),
    /// Write the bytes one at a time
    Trickle(Vec<u8>),
    /// Wait for the gate, then write the bytes
    Gated(Arc<Notify>, Vec<u8>),
    /// Never answer
    Silent,
    /// Close without answering
    Close,
}

#[derive(Clone)]
enum Candidate {
    Refuse,
    Accept,
}

#[derive(Default)]
struct Shared {
    attempts: Vec<SocketAddr>,
    requests: Vec<ProtocolHeader>,
}

pub struct ScriptedTransport {
    resolution: Vec<SocketAddr>,
    candidates: HashMap<SocketAddr, Candidate>,
    replies: HashMap<usize, Reply>,
    default_reply: Reply,
    shared: Arc<Mutex<Shared>>,
}

pub fn addr(last_octet: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, last_octet], 7777))
}

impl ScriptedTransport {
    /// A transport resolving to the given addresses, all accepting.
    pub fn new(resolution: Vec<SocketAddr>, default_reply: Reply) -> Self {
        let candidates = resolution
            .iter()
            .map(|addr| (*addr, Candidate::Accept))
            .collect();
        Self {
            resolution,
            candidates,
            replies: HashMap::new(),
            default_reply,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    pub fn refuse(mut self, candidate: SocketAddr) -> Self {
        self.candidates.insert(candidate, Candidate::Refuse);
        self
    }

    pub fn reply_for(mut self, socket_index: usize, reply: Reply) -> Self {
        self.replies.insert(socket_index, reply);
        self
    }

    pub fn attempts(&self) -> Vec<SocketAddr> {
        self.shared.lock().unwrap().attempts.clone()
    }

    pub fn requests(&self) -> Vec<ProtocolHeader> {
        let mut requests = self.shared.lock().unwrap().requests.clone();
        requests.sort_by_key(|request| request.socket_index);
        requests
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn resolve(&self, _host: &str, _service: &str) -> io::Result<Vec<SocketAddr>> {
        tokio::task::yield_now().await;
        Ok(self.resolution.clone())
    }

    async fn connect(
        &self,
        candidate: SocketAddr,
        _config: &BundleConfig,
    ) -> io::Result<BoxedStream> {
        tokio::task::yield_now().await;
        self.shared.lock().unwrap().attempts.push(candidate);
        match self.candidates.get(&candidate) {
            Some(Candidate::Accept) => {
                let (local, remote) = tokio::io::duplex(4096);
                tokio::spawn(serve_peer(
                    remote,
                    self.replies.clone(),
                    self.default_reply.clone(),
                    self.shared.clone(),
                ));
                Ok(Box::new(local))
            }
            _ => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{candidate} refused"),
            )),
        }
    }
}

async fn serve_peer(
    mut remote: DuplexStream,
    replies: HashMap<usize, Reply>,
    default_reply: Reply,
    shared: Arc<Mutex<Shared>>,
) {
    let mut request = Vec::new();
    let mut buf = [0u8; 512];
    while find_terminator(&request).is_none() {
        match remote.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    let header = ProtocolHeader::parse(&request).expect("client sent a malformed request");
    let socket_index = header.socket_index;
    shared.lock().unwrap().requests.push(header);

    match replies.get(&socket_index).unwrap_or(&default_reply).clone() {
        Reply::Immediate(bytes) => {
            let _ = remote.write_all(&bytes).await;
        }
        Reply::Trickle(bytes) => {
            for byte in bytes {
                if remote.write_all(&[byte]).await.is_err() {
                    return;
                }
                tokio::task::yield_now().await;
            }
        }
        Reply::Gated(gate, bytes) => {
            gate.notified().await;
            let _ = remote.write_all(&bytes).await;
        }
        Reply::Silent => {}
        Reply::Close => return,
    }

    // Hold the pipe open until the client side goes away.
    while let Ok(n) = remote.read(&mut buf).await {
        if n == 0 {
            break;
        }
    }
}

/// Drains every event already queued on the handler channel.
pub fn drain(events: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);
