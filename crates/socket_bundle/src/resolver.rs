//! Candidate address resolution.
//!
//! A host/service pair resolves once per logical connection. The resulting
//! [`CandidateSequence`] is shared read-only by every socket slot; each slot
//! walks it with its own [`CandidateCursor`], so different slots may settle
//! on different candidates.

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

use crate::config::BundleConfig;
use crate::error::HandshakeError;
use crate::transport::Transport;

/// Ordered, immutable list of resolved addresses.
#[derive(Debug, Clone)]
pub struct CandidateSequence {
    candidates: Arc<[SocketAddr]>,
}

impl CandidateSequence {
    pub fn new(candidates: Vec<SocketAddr>) -> Self {
        Self {
            candidates: candidates.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<SocketAddr> {
        self.candidates.get(position).copied()
    }

    /// Starts a fresh cursor at the first candidate.
    pub fn cursor(&self) -> CandidateCursor {
        CandidateCursor {
            sequence: self.clone(),
            position: 0,
        }
    }
}

/// One slot's private position in a [`CandidateSequence`].
#[derive(Debug, Clone)]
pub struct CandidateCursor {
    sequence: CandidateSequence,
    position: usize,
}

impl CandidateCursor {
    /// Number of candidates handed out so far.
    pub fn attempted(&self) -> usize {
        self.position
    }
}

impl Iterator for CandidateCursor {
    type Item = SocketAddr;

    fn next(&mut self) -> Option<SocketAddr> {
        let candidate = self.sequence.get(self.position)?;
        self.position += 1;
        Some(candidate)
    }
}

/// Resolves `host:service` through `transport`.
///
/// Transport errors and empty answers both map to
/// [`HandshakeError::AddressResolution`].
pub async fn resolve(
    transport: &dyn Transport,
    host: &str,
    service: &str,
    config: &BundleConfig,
) -> Result<CandidateSequence, HandshakeError> {
    let failure = |reason: String| HandshakeError::AddressResolution {
        host: host.to_string(),
        service: service.to_string(),
        reason,
    };

    let mut candidates = transport
        .resolve(host, service)
        .await
        .map_err(|e| failure(e.to_string()))?;
    if config.ipv4_only {
        candidates.retain(SocketAddr::is_ipv4);
    }
    if candidates.is_empty() {
        return Err(failure("no candidate addresses".to_string()));
    }

    debug!(host, service, count = candidates.len(), "Resolved candidate addresses");
    Ok(CandidateSequence::new(candidates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BoxedStream;
    use async_trait::async_trait;
    use std::io;

    struct FixedResolver(io::Result<Vec<SocketAddr>>);

    #[async_trait]
    impl Transport for FixedResolver {
        async fn resolve(&self, _host: &str, _service: &str) -> io::Result<Vec<SocketAddr>> {
            match &self.0 {
                Ok(addrs) => Ok(addrs.clone()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            }
        }

        async fn connect(
            &self,
            _candidate: SocketAddr,
            _config: &BundleConfig,
        ) -> io::Result<BoxedStream> {
            Err(io::ErrorKind::ConnectionRefused.into())
        }
    }

    fn addrs() -> Vec<SocketAddr> {
        vec![
            "[::1]:9000".parse().unwrap(),
            "127.0.0.1:9000".parse().unwrap(),
            "10.0.0.1:9000".parse().unwrap(),
        ]
    }

    #[test]
    fn test_cursors_are_independent() {
        let sequence = CandidateSequence::new(addrs());
        let mut first = sequence.cursor();
        let mut second = sequence.cursor();

        assert_eq!(first.next(), Some(addrs()[0]));
        assert_eq!(first.next(), Some(addrs()[1]));
        assert_eq!(second.next(), Some(addrs()[0]));
        assert_eq!(first.attempted(), 2);
        assert_eq!(second.attempted(), 1);

        assert_eq!(first.next(), Some(addrs()[2]));
        assert_eq!(first.next(), None);
        assert_eq!(first.attempted(), 3);
    }

    #[tokio::test]
    async fn test_resolve_keeps_order() {
        let transport = FixedResolver(Ok(addrs()));
        let sequence = resolve(&transport, "peer", "9000", &BundleConfig::default())
            .await
            .unwrap();
        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.get(0), Some(addrs()[0]));
    }

    #[tokio::test]
    async fn test_resolve_ipv4_only() {
        let transport = FixedResolver(Ok(addrs()));
        let config = BundleConfig {
            ipv4_only: true,
            ..Default::default()
        };
        let sequence = resolve(&transport, "peer", "9000", &config).await.unwrap();
        assert_eq!(sequence.len(), 2);
        assert!(sequence.cursor().all(|addr| addr.is_ipv4()));
    }

    #[tokio::test]
    async fn test_empty_resolution_is_failure() {
        let transport = FixedResolver(Ok(Vec::new()));
        let err = resolve(&transport, "peer", "9000", &BundleConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::AddressResolution { .. }));
    }

    #[tokio::test]
    async fn test_resolver_error_is_failure() {
        let transport = FixedResolver(Err(io::Error::new(io::ErrorKind::NotFound, "nxdomain")));
        let err = resolve(&transport, "peer", "9000", &BundleConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nxdomain"));
    }
}
