//! # mailwire-imap
//!
//! An IMAP client protocol engine covering every server generation from
//! IMAP2 through `IMAP4rev1`, with the capability-driven fallbacks older
//! servers need.
//!
//! ## Features
//!
//! - **Wire encoding**: atoms, quoted strings and literals chosen per
//!   argument, with the `+` continuation handshake before each literal
//! - **Tolerant parsing**: envelopes and body structures from real-world
//!   servers, recovering from malformed input with diagnostics instead of
//!   failures
//! - **Unsolicited data**: EXISTS, EXPUNGE, FETCH, FLAGS and response codes
//!   applied to the session and message cache as they arrive
//! - **Fallbacks**: STATUS, LIST, SORT and THREAD emulated when a server
//!   lacks or rejects them, with one-way capability downgrades
//! - **TLS via rustls**: implicit TLS and in-place STARTTLS
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use mailwire_imap::{Config, ImapMailbox, TracingNotifier};
//!
//! #[tokio::main]
//! async fn main() -> mailwire_imap::Result<()> {
//!     let mailbox = ImapMailbox::open(
//!         "{imap.example.com/ssl/user=fred}INBOX",
//!         Config::default(),
//!         Arc::new(TracingNotifier),
//!     )
//!     .await?;
//!
//!     let (envelope, _) = mailbox.fetch_structure(1, false).await?;
//!     if let Some(subject) = envelope.and_then(|e| e.subject) {
//!         println!("first message: {subject}");
//!     }
//!     mailbox.close(false).await
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! NotAuthenticated ── login ──→ Authenticated ── select ──→ Selected
//!        │                            ▲                        │
//!        └──── PREAUTH greeting ──────┘◀──── failed select ────┘
//! ```
//!
//! A transport failure or BYE moves any state to `Logout`; every later
//! command then gets a synthetic `NO [CLOSED]` reply.
//!
//! ## Modules
//!
//! - [`command`]: command model and wire encoder
//! - [`parser`]: reply, untagged-data and structure parsers
//! - [`connection`]: transports and the command driver
//! - [`mailbox`]: the mailbox operations and their fallbacks
//! - [`types`]: flags, capabilities, envelopes, bodies, sequences

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod cache;
pub mod command;
pub mod connection;
pub mod dispatch;
pub mod driver;
mod error;
pub mod handler;
pub mod mailbox;
pub mod parser;
pub mod sort;
pub mod state;
pub mod types;

pub use auth::{Authenticator, LoginAuth, PlainAuth, XOAuth2Auth};
pub use cache::{CacheEntry, GcFlags, MessageCache};
pub use command::{
    Command, FetchAttribute, FetchItems, SearchFlags, SearchProgram, SortKey, SortProgram,
    StatusAttribute, StoreMode, ThreadAlgorithm,
};
pub use connection::{Config, ConfigBuilder, Connection, Transport, UidAnomalyPolicy};
pub use driver::MailDriver;
pub use error::{Error, Result};
pub use handler::{Credentials, LoginContext, Notifier, NullNotifier, Severity, TracingNotifier};
pub use mailbox::{ImapMailbox, NetMailbox};
pub use parser::Reply;
pub use state::{ProtocolState, SessionState};
pub use types::{
    Body, CapFlags, Envelope, Flag, Flags, ListEntry, MailboxSpec, ProtocolLevel, ResponseCode,
    Section, SequenceSet, Status, StatusRecord, ThreadNode,
};

/// Highest protocol revision spoken.
pub const IMAP_VERSION: &str = "IMAP4rev1";
