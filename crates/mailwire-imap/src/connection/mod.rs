//! IMAP connection management.
//!
//! This module provides connection handling for IMAP servers, including:
//! - Configuration (ports, timeouts, lookahead, cache mode)
//! - TLS/plaintext stream abstraction with in-place STARTTLS
//! - The [`Transport`] contract and framed I/O over tokio streams
//! - The command driver: tags, literals, continuations, reply routing

mod config;
mod driver;
mod framed;
mod stream;
mod transport;

pub use config::{Config, ConfigBuilder, UidAnomalyPolicy};
pub use driver::{Connection, Phase};
pub use framed::FramedStream;
pub use stream::{ImapStream, NetStream, connect_plain, connect_tls, create_tls_connector};
pub use transport::{Endpoint, MAX_LITERAL_SIZE, Transport, read_response};
