//! Transport seam used by the connector.
//!
//! The handshake logic only needs name resolution, a connect primitive and a
//! byte stream. [`TcpTransport`] provides them over tokio TCP; tests plug in
//! scripted in-memory transports through the same trait.

use async_trait::async_trait;
use socket2::SockRef;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::BundleConfig;

/// Byte stream produced by a successful connect.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Resolution and connection primitives for one kind of network.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Resolves a host/service pair into candidate addresses, in preference order.
    ///
    /// An empty list is a valid answer and is treated as a resolution failure.
    async fn resolve(&self, host: &str, service: &str) -> io::Result<Vec<SocketAddr>>;

    /// Opens one transport connection to `candidate`.
    async fn connect(&self, candidate: SocketAddr, config: &BundleConfig)
        -> io::Result<BoxedStream>;
}

/// Plain TCP transport on the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    async fn resolve(&self, host: &str, service: &str) -> io::Result<Vec<SocketAddr>> {
        let port: u16 = service.parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("service {service:?} is not a port number"),
            )
        })?;
        Ok(tokio::net::lookup_host((host, port)).await?.collect())
    }

    async fn connect(
        &self,
        candidate: SocketAddr,
        config: &BundleConfig,
    ) -> io::Result<BoxedStream> {
        let stream = TcpStream::connect(candidate).await?;
        stream.set_nodelay(config.no_delay)?;
        if config.send_buffer_size > 0 {
            SockRef::from(&stream).set_send_buffer_size(config.send_buffer_size)?;
        }
        debug!(%candidate, no_delay = config.no_delay, "TCP connection established");
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_resolve_numeric_host() {
        let addrs = TcpTransport.resolve("127.0.0.1", "4000").await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:4000".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_resolve_rejects_named_service() {
        let err = TcpTransport.resolve("127.0.0.1", "http").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let mut stream = TcpTransport
            .connect(addr, &BundleConfig::default())
            .await
            .unwrap();
        stream.write_all(b"ping").await.unwrap();
        let mut echoed = [0u8; 4];
        stream.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"ping");
        server.await.unwrap();
    }
}
