//! Framed I/O over a tokio stream.
//!
//! IMAP uses CRLF-terminated lines with literals in between. This is the
//! [`Transport`] the engine uses for real sockets: buffered line reads,
//! exact-count literal reads, and flushed writes.

use std::io;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::stream::NetStream;
use super::transport::{Endpoint, MAX_LITERAL_SIZE, Transport};
use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Buffered line/literal framing over a byte stream.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    async fn next_line(&mut self) -> Result<Bytes> {
        let mut line = Vec::new();
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }
            if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                line.extend_from_slice(&buf[..pos]);
                self.reader.consume(pos + 1);
                break;
            }
            let len = buf.len();
            line.extend_from_slice(buf);
            self.reader.consume(len);
            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Bytes::from(line))
    }

    /// Gets a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Gets a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        self.reader.get_mut()
    }
}

#[async_trait]
impl<S> Transport for FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + NetStream,
{
    async fn read_line(&mut self) -> Result<Bytes> {
        self.next_line().await
    }

    async fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        if n > MAX_LITERAL_SIZE {
            return Err(Error::Protocol(format!(
                "literal too large: {n} bytes (max {MAX_LITERAL_SIZE})"
            )));
        }
        let mut buf = vec![0u8; n];
        self.reader.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);
        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.reader.get_mut().shutdown().await?;
        Ok(())
    }

    fn endpoint(&self) -> Endpoint {
        self.reader.get_ref().endpoint()
    }

    async fn start_tls(&mut self, host: &str) -> Result<()> {
        if !self.reader.buffer().is_empty() {
            return Err(Error::Protocol(
                "server sent data after STARTTLS completion".to_string(),
            ));
        }
        self.reader.get_mut().start_tls(host).await
    }
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
    use tokio_test::io::Builder;

    use super::*;
    use crate::connection::transport::read_response;

    impl NetStream for tokio_test::io::Mock {}

    #[tokio::test]
    async fn test_framed_read_simple_line() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);

        let response = read_response(&mut framed).await.unwrap();
        assert_eq!(&response[..], b"* OK ready");
    }

    #[tokio::test]
    async fn test_framed_read_with_literal() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {5}\r\n")
            .read(b"he\r\no)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = read_response(&mut framed).await.unwrap();
        assert_eq!(&response[..], b"* 1 FETCH (BODY[] {5}\r\nhe\r\no)");
    }

    #[tokio::test]
    async fn test_bare_lf_tolerated() {
        let mock = Builder::new().read(b"* OK a\n* OK b\r\n").build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(&framed.read_line().await.unwrap()[..], b"* OK a");
        assert_eq!(&framed.read_line().await.unwrap()[..], b"* OK b");
    }

    #[tokio::test]
    async fn test_framed_write() {
        let mock = Builder::new().write(b"A0001 NOOP\r\n").build();
        let mut framed = FramedStream::new(mock);
        framed.write_all(b"A0001 NOOP\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_literal_size_validation() {
        let literal_size = MAX_LITERAL_SIZE + 1;
        let header = format!("* 1 FETCH (BODY[] {{{literal_size}}}\r\n");

        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = read_response(&mut framed).await;
        assert!(result.unwrap_err().to_string().contains("literal too large"));
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_line().await;
        assert!(result.unwrap_err().to_string().contains("line too long"));
    }

    #[tokio::test]
    async fn test_eof() {
        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock);
        assert!(matches!(framed.read_line().await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_start_tls_unsupported_on_mock() {
        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock);
        assert!(matches!(
            framed.start_tls("imap.example.com").await,
            Err(Error::InvalidState(_))
        ));
    }
}
