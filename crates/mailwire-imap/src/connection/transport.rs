//! The byte-stream contract the command driver runs on.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::{Error, Result};

/// Largest literal accepted from a server.
pub const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Where a transport is connected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    /// Remote host as dialed.
    pub peer_host: String,
    /// Remote port.
    pub peer_port: u16,
    /// Local host address.
    pub local_host: String,
}

/// A connected byte stream.
///
/// Any `Err` means the connection is gone; the driver never retries.
#[async_trait]
pub trait Transport: Send {
    /// Reads one line, without its CRLF.
    async fn read_line(&mut self) -> Result<Bytes>;

    /// Reads exactly `n` bytes.
    async fn read_exact(&mut self, n: usize) -> Result<Bytes>;

    /// Writes and flushes `data`.
    async fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Closes the stream.
    async fn close(&mut self) -> Result<()>;

    /// Connection endpoints, for canonical mailbox names.
    fn endpoint(&self) -> Endpoint;

    /// Switches the stream to TLS after a successful STARTTLS.
    async fn start_tls(&mut self, host: &str) -> Result<()> {
        let _ = host;
        Err(Error::InvalidState(
            "transport does not support STARTTLS".to_string(),
        ))
    }
}

/// Reads one complete response: a line, and whenever it ends in a `{n}`
/// marker, the `n` literal bytes and the line that continues after them.
///
/// The result keeps each marker's CRLF before the literal bytes and drops
/// the final CRLF, so a [`crate::parser::Cursor`] can read it in one pass.
///
/// # Errors
///
/// Transport errors, or `Error::Protocol` for a literal over
/// [`MAX_LITERAL_SIZE`].
pub async fn read_response<T: Transport + ?Sized>(transport: &mut T) -> Result<Bytes> {
    let mut response = BytesMut::new();
    loop {
        let line = transport.read_line().await?;
        response.extend_from_slice(&line);
        let Some(len) = literal_length(&line) else {
            break;
        };
        if len > MAX_LITERAL_SIZE {
            return Err(Error::Protocol(format!(
                "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
            )));
        }
        response.extend_from_slice(b"\r\n");
        let literal = transport.read_exact(len).await?;
        response.extend_from_slice(&literal);
    }
    Ok(response.freeze())
}

/// Parses a trailing `{n}` or `{n+}` literal marker. Braces inside a
/// quoted string are text, not a marker.
pub(crate) fn literal_length(line: &[u8]) -> Option<usize> {
    let body = line.strip_suffix(b"}")?;
    let mut quoted = false;
    let mut escaped = false;
    let mut open = None;
    for (i, &b) in body.iter().enumerate() {
        match b {
            _ if escaped => escaped = false,
            b'\\' if quoted => escaped = true,
            b'"' => quoted = !quoted,
            b'{' if !quoted => open = Some(i),
            _ => {}
        }
    }
    if quoted {
        return None;
    }
    let digits = &body[open? + 1..];
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
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
    use std::collections::VecDeque;

    use super::*;

    struct Script {
        lines: VecDeque<&'static [u8]>,
        pending: Vec<u8>,
    }

    #[async_trait]
    impl Transport for Script {
        async fn read_line(&mut self) -> Result<Bytes> {
            self.lines
                .pop_front()
                .map(Bytes::from_static)
                .ok_or_else(|| Error::ConnectionBroken("eof".into()))
        }

        async fn read_exact(&mut self, n: usize) -> Result<Bytes> {
            if self.pending.is_empty() {
                self.pending = self.lines.pop_front().unwrap_or_default().to_vec();
            }
            let rest = self.pending.split_off(n.min(self.pending.len()));
            Ok(Bytes::from(std::mem::replace(&mut self.pending, rest)))
        }

        async fn write_all(&mut self, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn endpoint(&self) -> Endpoint {
            Endpoint::default()
        }
    }

    #[test]
    fn test_literal_length() {
        assert_eq!(literal_length(b"BODY {123}"), Some(123));
        assert_eq!(literal_length(b"BODY {123+}"), Some(123));
        assert_eq!(literal_length(b"{0}"), Some(0));
        assert_eq!(literal_length(b"no literal"), None);
        assert_eq!(literal_length(b"incomplete {123"), None);
        assert_eq!(literal_length(b"wrong {abc}"), None);
        assert_eq!(literal_length(b"empty {}"), None);
    }

    #[test]
    fn braces_in_quoted_text_are_not_a_literal() {
        assert_eq!(literal_length(b"* OK \"odd {3}"), None);
        assert_eq!(literal_length(b"* LIST () \"/\" \"a\\\"{3}"), None);
        assert_eq!(literal_length(b"* LIST () \"/\" \"{9}\" {3}"), Some(3));
    }

    #[tokio::test]
    async fn splices_literal_into_response() {
        let mut t = Script {
            lines: VecDeque::from([
                &b"* 1 FETCH (BODY[] {7}"[..],
                &b"a\r\nb\0cd"[..],
                &b")"[..],
            ]),
            pending: Vec::new(),
        };
        let response = read_response(&mut t).await.unwrap();
        assert_eq!(&response[..], b"* 1 FETCH (BODY[] {7}\r\na\r\nb\0cd)");
    }

    #[tokio::test]
    async fn eof_is_an_error() {
        let mut t = Script {
            lines: VecDeque::new(),
            pending: Vec::new(),
        };
        assert!(read_response(&mut t).await.is_err());
    }
}
