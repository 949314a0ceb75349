//! Stream types for IMAP connections.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::transport::Endpoint;
use crate::{Error, Result};

/// What [`super::FramedStream`] needs from a stream beyond reading and
/// writing. The defaults suit in-memory streams.
#[async_trait]
pub trait NetStream: Send {
    /// Upgrades the stream to TLS in place.
    async fn start_tls(&mut self, host: &str) -> Result<()> {
        let _ = host;
        Err(Error::InvalidState(
            "stream does not support STARTTLS".to_string(),
        ))
    }

    /// Connection endpoints.
    fn endpoint(&self) -> Endpoint {
        Endpoint::default()
    }
}

impl NetStream for DuplexStream {}

/// A stream that can be either plaintext or TLS.
pub enum ImapStream {
    /// Plaintext TCP stream.
    Plain(TcpStream, Endpoint),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>, Endpoint),
    /// Left behind by a failed upgrade.
    Closed,
}

impl ImapStream {
    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(..))
    }
}

#[async_trait]
impl NetStream for ImapStream {
    async fn start_tls(&mut self, host: &str) -> Result<()> {
        match std::mem::replace(self, Self::Closed) {
            Self::Plain(tcp, endpoint) => {
                let connector = create_tls_connector();
                let server_name = ServerName::try_from(host.to_string())?;
                let tls = connector.connect(server_name, tcp).await?;
                *self = Self::Tls(Box::new(tls), endpoint);
                tracing::debug!(host, "STARTTLS negotiated");
                Ok(())
            }
            other => {
                *self = other;
                Err(Error::InvalidState("stream is not plaintext".to_string()))
            }
        }
    }

    fn endpoint(&self) -> Endpoint {
        match self {
            Self::Plain(_, e) | Self::Tls(_, e) => e.clone(),
            Self::Closed => Endpoint::default(),
        }
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "stream closed")
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream, _) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream, _) => Pin::new(stream).poll_read(cx, buf),
            Self::Closed => Poll::Ready(Err(closed())),
        }
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream, _) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream, _) => Pin::new(stream).poll_write(cx, buf),
            Self::Closed => Poll::Ready(Err(closed())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream, _) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream, _) => Pin::new(stream).poll_flush(cx),
            Self::Closed => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream, _) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream, _) => Pin::new(stream).poll_shutdown(cx),
            Self::Closed => Poll::Ready(Ok(())),
        }
    }
}

/// Creates a TLS connector with the webpki root certificates.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

async fn dial(host: &str, port: u16, timeout: Duration) -> Result<(TcpStream, Endpoint)> {
    let addr = format!("{host}:{port}");
    let tcp = tokio::time::timeout(timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| Error::Timeout(timeout))??;
    let endpoint = Endpoint {
        peer_host: host.to_string(),
        peer_port: port,
        local_host: tcp
            .local_addr()
            .map(|a| a.ip().to_string())
            .unwrap_or_default(),
    };
    tracing::info!(host, port, "connected");
    Ok((tcp, endpoint))
}

/// Connects with TLS from the start.
///
/// # Errors
///
/// Connect, timeout, or TLS handshake failure.
pub async fn connect_tls(host: &str, port: u16, timeout: Duration) -> Result<ImapStream> {
    let (tcp, endpoint) = dial(host, port, timeout).await?;
    let connector = create_tls_connector();
    let server_name = ServerName::try_from(host.to_string())?;
    let tls = tokio::time::timeout(timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| Error::Timeout(timeout))??;
    Ok(ImapStream::Tls(Box::new(tls), endpoint))
}

/// Connects without TLS (plaintext, or before STARTTLS).
///
/// # Errors
///
/// Connect failure or timeout.
pub async fn connect_plain(host: &str, port: u16, timeout: Duration) -> Result<ImapStream> {
    let (tcp, endpoint) = dial(host, port, timeout).await?;
    Ok(ImapStream::Plain(tcp, endpoint))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tls_connector() {
        let _connector = create_tls_connector();
    }

    #[tokio::test]
    async fn test_closed_stream_refuses_upgrade() {
        let mut stream = ImapStream::Closed;
        assert!(stream.start_tls("imap.example.com").await.is_err());
        assert!(matches!(stream, ImapStream::Closed));
        assert_eq!(stream.endpoint(), Endpoint::default());
    }

    #[tokio::test]
    async fn test_duplex_has_default_endpoint() {
        let (a, _b) = tokio::io::duplex(64);
        assert_eq!(a.endpoint(), Endpoint::default());
    }
}
