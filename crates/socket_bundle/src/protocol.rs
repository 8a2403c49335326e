//! Wire format of the per-socket upgrade handshake.
//!
//! Each physical socket of a logical connection opens with an HTTP/1.1
//! upgrade request carrying the shared session token, the socket's index
//! and the total socket count. The peer answers with a fixed status line,
//! arbitrary header lines and a blank line. Two binary-compatible variants
//! exist:
//!
//! * [`ProtocolVariant::Versioned`] - payload begins right after the blank line.
//! * [`ProtocolVariant::Legacy`] - a 16 byte challenge response follows the
//!   blank line and is skipped without being checked.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::HandshakeError;

/// Status line every accepted socket must begin its response with.
pub const STATUS_LINE: &[u8] = b"HTTP/1.1 101 Web Socket Protocol Handshake\r\n";

/// Blank line ending the header block.
pub const TERMINATOR: &[u8] = b"\r\n\r\n";

/// Bytes of challenge response following the terminator in legacy mode.
pub const LEGACY_CHALLENGE_LEN: usize = 16;

/// Default bound on the handshake response buffer.
pub const DEFAULT_MAX_HEADER_SIZE: usize = 1024;

const SOCKET_INDEX_HEADER: &str = "X-Bundle-Socket";
const SOCKET_COUNT_HEADER: &str = "X-Bundle-Sockets";

/// Opaque identifier shared by every socket of one logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub [u8; 16]);

impl SessionToken {
    /// Creates a new random token.
    pub fn new() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0).simple())
    }
}

impl FromStr for SessionToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(*Uuid::parse_str(s)?.as_bytes()))
    }
}

/// Which flavour of the upgrade handshake the peer speaks.
///
/// Selected once per logical connection before any socket connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// Payload starts immediately after the terminator.
    #[default]
    Versioned,
    /// Payload starts [`LEGACY_CHALLENGE_LEN`] bytes after the terminator.
    Legacy,
}

impl ProtocolVariant {
    /// Offset of the first payload byte, clamped to the bytes received.
    pub fn payload_start(&self, terminator_end: usize, received: usize) -> usize {
        let start = match self {
            ProtocolVariant::Versioned => terminator_end,
            ProtocolVariant::Legacy => terminator_end + LEGACY_CHALLENGE_LEN,
        };
        start.min(received)
    }

    /// Bytes that must follow the terminator before the header read is complete.
    pub fn trailer_len(&self) -> usize {
        match self {
            ProtocolVariant::Versioned => 0,
            ProtocolVariant::Legacy => LEGACY_CHALLENGE_LEN,
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVariant::Versioned => write!(f, "versioned"),
            ProtocolVariant::Legacy => write!(f, "legacy"),
        }
    }
}

/// Upgrade request sent on each socket right after the transport connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolHeader {
    pub token: SessionToken,
    pub host: String,
    pub service: String,
    pub socket_index: usize,
    pub socket_count: usize,
    pub variant: ProtocolVariant,
}

impl ProtocolHeader {
    /// Serializes the request. Sockets of one logical connection produce
    /// identical bytes apart from the socket index line.
    pub fn encode(&self) -> Vec<u8> {
        let mut request = format!(
            "GET /{} HTTP/1.1\r\n\
             Upgrade: WebSocket\r\n\
             Connection: Upgrade\r\n\
             Host: {}:{}\r\n\
             {}: {}\r\n\
             {}: {}\r\n",
            self.token,
            self.host,
            self.service,
            SOCKET_INDEX_HEADER,
            self.socket_index,
            SOCKET_COUNT_HEADER,
            self.socket_count,
        );
        if self.variant == ProtocolVariant::Versioned {
            request.push_str("Sec-WebSocket-Version: 13\r\n");
        }
        request.push_str("\r\n");
        request.into_bytes()
    }

    /// Parses a request as written by [`ProtocolHeader::encode`].
    ///
    /// Used by the accepting side to group incoming sockets by token.
    /// `bytes` must contain the complete header block.
    pub fn parse(bytes: &[u8]) -> Result<Self, HandshakeError> {
        let end = find_terminator(bytes)
            .ok_or_else(|| HandshakeError::MalformedRequest("missing header terminator".into()))?;
        let text = std::str::from_utf8(&bytes[..end])
            .map_err(|_| HandshakeError::MalformedRequest("header is not valid UTF-8".into()))?;

        let mut lines = text.split("\r\n");
        let request_line = lines.next().unwrap_or_default();
        let token = request_line
            .strip_prefix("GET /")
            .and_then(|rest| rest.strip_suffix(" HTTP/1.1"))
            .ok_or_else(|| {
                HandshakeError::MalformedRequest(format!("bad request line {request_line:?}"))
            })?;
        let token = token
            .parse::<SessionToken>()
            .map_err(|e| HandshakeError::MalformedRequest(format!("bad session token: {e}")))?;

        let mut host = None;
        let mut socket_index = None;
        let mut socket_count = None;
        let mut variant = ProtocolVariant::Legacy;

        for line in lines.filter(|line| !line.is_empty()) {
            let Some((name, value)) = line.split_once(':') else {
                return Err(HandshakeError::MalformedRequest(format!(
                    "bad header line {line:?}"
                )));
            };
            let value = value.trim();
            if name.eq_ignore_ascii_case("Host") {
                host = Some(value.to_string());
            } else if name.eq_ignore_ascii_case(SOCKET_INDEX_HEADER) {
                socket_index = Some(parse_number(SOCKET_INDEX_HEADER, value)?);
            } else if name.eq_ignore_ascii_case(SOCKET_COUNT_HEADER) {
                socket_count = Some(parse_number(SOCKET_COUNT_HEADER, value)?);
            } else if name.eq_ignore_ascii_case("Sec-WebSocket-Version") {
                variant = ProtocolVariant::Versioned;
            }
        }

        let socket_index = socket_index.ok_or_else(|| {
            HandshakeError::MalformedRequest(format!("missing {SOCKET_INDEX_HEADER} header"))
        })?;
        let socket_count = socket_count.ok_or_else(|| {
            HandshakeError::MalformedRequest(format!("missing {SOCKET_COUNT_HEADER} header"))
        })?;
        if socket_count == 0 || socket_index >= socket_count {
            return Err(HandshakeError::MalformedRequest(format!(
                "socket index {socket_index} out of range for {socket_count} socket(s)"
            )));
        }

        let host = host.unwrap_or_default();
        let (host, service) = match host.rsplit_once(':') {
            Some((host, service)) => (host.to_string(), service.to_string()),
            None => (host, String::new()),
        };

        Ok(Self {
            token,
            host,
            service,
            socket_index,
            socket_count,
            variant,
        })
    }
}

fn parse_number(header: &str, value: &str) -> Result<usize, HandshakeError> {
    value
        .parse()
        .map_err(|_| HandshakeError::MalformedRequest(format!("bad {header} value {value:?}")))
}

/// Response an accepting peer writes to complete one socket's handshake.
pub fn accept_response(variant: ProtocolVariant) -> Vec<u8> {
    let mut response = STATUS_LINE.to_vec();
    response.extend_from_slice(b"Upgrade: WebSocket\r\nConnection: Upgrade\r\n");
    response.extend_from_slice(TERMINATOR);
    response.resize(response.len() + variant.trailer_len(), 0);
    response
}

/// Returns the offset one past the first `\r\n\r\n` in `buf`.
///
/// Fewer than four bytes can never hold the terminator, so they yield
/// `None` just like a buffer that does not contain it yet.
pub fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len())
        .position(|window| window == TERMINATOR)
        .map(|position| position + TERMINATOR.len())
}

/// Outcome of a successful [`validate_response`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedResponse {
    received: Vec<u8>,
    header_end: usize,
    payload_start: usize,
}

impl ValidatedResponse {
    /// Every byte read from the socket during the handshake.
    pub fn received(&self) -> &[u8] {
        &self.received
    }

    /// Offset one past the terminator, or the received length if absent.
    pub fn header_end(&self) -> usize {
        self.header_end
    }

    /// Application bytes that arrived together with the header.
    pub fn leftover(&self) -> &[u8] {
        &self.received[self.payload_start..]
    }

    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        let leftover = self.received[self.payload_start..].to_vec();
        (self.received, leftover)
    }
}

/// Checks a peer's handshake response and locates the payload.
pub fn validate_response(
    received: Vec<u8>,
    variant: ProtocolVariant,
) -> Result<ValidatedResponse, HandshakeError> {
    if !received.starts_with(STATUS_LINE) {
        return Err(HandshakeError::HandshakeMismatch { received });
    }
    let header_end = find_terminator(&received).unwrap_or(received.len());
    let payload_start = variant.payload_start(header_end, received.len());
    Ok(ValidatedResponse {
        received,
        header_end,
        payload_start,
    })
}

/// Whether enough of the response has arrived to stop reading.
pub(crate) fn response_complete(buf: &[u8], variant: ProtocolVariant) -> bool {
    match find_terminator(buf) {
        Some(end) => buf.len() >= end + variant.trailer_len(),
        None => false,
    }
}
