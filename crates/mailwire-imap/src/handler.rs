//! Upward notifications.
//!
//! IMAP servers send some data whenever they like: EXISTS, EXPUNGE, FETCH
//! flag updates, alerts, BYE. The engine applies that data to its own
//! state and then tells a [`Notifier`], which is how the mailbox layer
//! above learns about it. All callbacks are fire-and-forget except
//! [`Notifier::login`], which supplies credentials.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use mailwire_imap::handler::Notifier;
//!
//! #[derive(Default)]
//! struct Counter {
//!     exists: AtomicU32,
//! }
//!
//! impl Notifier for Counter {
//!     fn exists(&self, count: u32) {
//!         self.exists.store(count, Ordering::Relaxed);
//!     }
//! }
//! ```

use std::fmt;

use crate::types::{ListEntry, StatusRecord};

/// Severity of a log notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational.
    Info,
    /// A transient problem.
    Warn,
    /// An operation failed.
    Error,
    /// The connection is ending.
    Bye,
}

/// What a credential request is for.
#[derive(Debug, Clone, Copy)]
pub struct LoginContext<'a> {
    /// Server host name.
    pub host: &'a str,
    /// User name from the mailbox spec, if one was given.
    pub user: Option<&'a str>,
    /// 1-based attempt number.
    pub trial: u32,
}

/// Credentials for one login attempt. Dropped right after the attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password or token. Empty aborts the login.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Receiver of engine notifications.
///
/// Every method has a no-op default, so implementors override only what
/// they care about.
pub trait Notifier: Send + Sync {
    /// Mailbox size changed.
    fn exists(&self, count: u32) {
        let _ = count;
    }

    /// Recent count changed.
    fn recent(&self, count: u32) {
        let _ = count;
    }

    /// Message `seq` was expunged; later messages have moved down by one.
    fn expunged(&self, seq: u32) {
        let _ = seq;
    }

    /// Flags of message `seq` changed.
    fn flags(&self, seq: u32) {
        let _ = seq;
    }

    /// A human-readable log line.
    fn log(&self, severity: Severity, text: &str) {
        let _ = (severity, text);
    }

    /// A raw protocol line, only when the connection's debug flag is set.
    fn debug_line(&self, line: &str) {
        let _ = line;
    }

    /// A mailbox reported by LIST (or FIND/SCAN).
    fn list(&self, entry: &ListEntry) {
        let _ = entry;
    }

    /// A mailbox reported by LSUB.
    fn lsub(&self, entry: &ListEntry) {
        let _ = entry;
    }

    /// STATUS data.
    fn status(&self, record: &StatusRecord) {
        let _ = record;
    }

    /// A search hit: a sequence number, or a UID for UID searches.
    fn searched(&self, number: u32) {
        let _ = number;
    }

    /// Supplies credentials for a login attempt. `None` aborts.
    fn login(&self, context: &LoginContext<'_>) -> Option<Credentials> {
        let _ = context;
        None
    }
}

/// Drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {}

/// Routes notifications into `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn exists(&self, count: u32) {
        tracing::debug!(count, "EXISTS");
    }

    fn recent(&self, count: u32) {
        tracing::debug!(count, "RECENT");
    }

    fn expunged(&self, seq: u32) {
        tracing::debug!(seq, "EXPUNGE");
    }

    fn flags(&self, seq: u32) {
        tracing::trace!(seq, "flags changed");
    }

    fn log(&self, severity: Severity, text: &str) {
        match severity {
            Severity::Info => tracing::info!("{text}"),
            Severity::Warn => tracing::warn!("{text}"),
            Severity::Error => tracing::error!("{text}"),
            Severity::Bye => tracing::info!(bye = true, "{text}"),
        }
    }

    fn debug_line(&self, line: &str) {
        tracing::trace!("{line}");
    }

    fn list(&self, entry: &ListEntry) {
        tracing::debug!(name = %entry.name, delimiter = ?entry.delimiter, "LIST");
    }

    fn lsub(&self, entry: &ListEntry) {
        tracing::debug!(name = %entry.name, delimiter = ?entry.delimiter, "LSUB");
    }

    fn status(&self, record: &StatusRecord) {
        tracing::debug!(?record, "STATUS");
    }

    fn searched(&self, number: u32) {
        tracing::trace!(number, "search hit");
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
    use super::*;

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("fred", "hunter2");
        let shown = format!("{creds:?}");
        assert!(shown.contains("fred"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn null_notifier_declines_login() {
        let ctx = LoginContext {
            host: "imap.example.com",
            user: None,
            trial: 1,
        };
        assert!(NullNotifier.login(&ctx).is_none());
    }
}
