//! The command driver: one command in flight, replies read until its tag.
//!
//! ```text
//! Idle -> Sending -> AwaitingReply -> Idle
//!            |  ^
//!            v  |
//!     AwaitingContinuation
//! ```
//!
//! Untagged replies met on the way are applied through the dispatcher in
//! arrival order. Any transport failure tears the connection down; from
//! then on every command gets the synthetic `NO [CLOSED]` reply without
//! touching the transport.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::config::Config;
use super::transport::{Endpoint, Transport, read_response};
use crate::auth::Authenticator;
use crate::cache::MessageCache;
use crate::command::{Command, EncodedCommand, Fragment};
use crate::dispatch::Dispatcher;
use crate::handler::{Notifier, Severity};
use crate::parser::{Reply, ReplyTag};
use crate::state::{ProtocolState, SessionState};
use crate::types::{ResponseCode, Status};
use crate::{Error, Result};

/// Where the driver is in the current command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No command in flight.
    #[default]
    Idle,
    /// Writing command text.
    Sending,
    /// Waiting for `+` before a literal or SASL response.
    AwaitingContinuation,
    /// Waiting for the tagged reply.
    AwaitingReply,
}

/// One IMAP connection and everything known about it.
pub struct Connection<T> {
    transport: T,
    state: SessionState,
    cache: MessageCache,
    notifier: Arc<dyn Notifier>,
    debug: bool,
    max_sequence_len: usize,
    phase: Phase,
}

impl<T> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Connection<T> {
    /// Wraps a connected transport.
    pub fn new(transport: T, config: &Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            transport,
            state: SessionState::new(config.tag_prefix, config.user_flag_slots),
            cache: MessageCache::new(config.short_cache),
            notifier,
            debug: config.debug,
            max_sequence_len: config.max_sequence_len,
            phase: Phase::Idle,
        }
    }

    /// Session state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Mutable session state.
    pub const fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    /// Message cache.
    #[must_use]
    pub const fn cache(&self) -> &MessageCache {
        &self.cache
    }

    /// Mutable message cache.
    pub const fn cache_mut(&mut self) -> &mut MessageCache {
        &mut self.cache
    }

    /// Notification sink.
    #[must_use]
    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Transport endpoints.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.transport.endpoint()
    }

    /// Returns true once the connection is gone.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.state.dead
    }

    fn dispatcher(&mut self) -> Dispatcher<'_> {
        Dispatcher {
            state: &mut self.state,
            cache: &mut self.cache,
            notifier: self.notifier.as_ref(),
        }
    }

    /// Reads and applies the server greeting.
    ///
    /// # Errors
    ///
    /// `Bye` if the server refuses the connection, `ConnectionBroken` if
    /// nothing arrives, `Protocol` for anything that isn't a greeting.
    pub async fn read_greeting(&mut self) -> Result<Status> {
        let raw = match read_response(&mut self.transport).await {
            Ok(raw) => raw,
            Err(e) => {
                self.broken("*", &e).await;
                return Err(Error::ConnectionBroken(e.to_string()));
            }
        };
        self.telemetry(&String::from_utf8_lossy(&raw));
        let reply = Reply::parse(raw)?;
        let status = match (&reply.tag, reply.status()) {
            (ReplyTag::Untagged, Some(status @ (Status::Ok | Status::PreAuth | Status::Bye))) => status,
            _ => {
                return Err(Error::Protocol(format!(
                    "unexpected greeting: {}",
                    reply.text_str()
                )));
            }
        };
        self.dispatcher().dispatch(&reply);
        match status {
            Status::Bye => {
                self.shutdown().await;
                Err(Error::Bye(reply.human_text()))
            }
            Status::PreAuth => {
                self.state.protocol = ProtocolState::Authenticated;
                tracing::info!("preauthenticated session");
                Ok(status)
            }
            _ => Ok(status),
        }
    }

    /// Runs a command and returns its tagged reply, whatever it says.
    ///
    /// Sequence sets longer than the configured budget are split and the
    /// command repeated per chunk; the last chunk's reply is returned.
    pub async fn execute(&mut self, command: &Command) -> Reply {
        self.state.clear_results();
        let mut last = None;
        for part in command.split_sequence(self.max_sequence_len) {
            let tag = self.state.tags.next_tag();
            if self.state.dead {
                return Reply::closed(&tag);
            }
            let reply = self.send(part.encode(&tag)).await;
            let dead = self.state.dead;
            last = Some(reply);
            if dead {
                break;
            }
        }
        last.unwrap_or_else(|| Reply::closed("*"))
    }

    /// Runs a command and classifies its reply.
    ///
    /// # Errors
    ///
    /// The server's NO/BAD/BYE, or `ConnectionBroken`.
    pub async fn run(&mut self, command: &Command) -> Result<Reply> {
        self.execute(command).await.into_result()
    }

    async fn send(&mut self, encoded: EncodedCommand) -> Reply {
        let tag = encoded.tag;
        self.phase = Phase::Sending;
        self.telemetry(&encoded.display);
        tracing::trace!(command = %encoded.display, "sending");

        let mut fragments = encoded.fragments.into_iter().peekable();
        while let Some(fragment) = fragments.next() {
            let bytes = match fragment {
                Fragment::Line(b) | Fragment::Literal(b) => b,
            };
            if let Err(e) = self.transport.write_all(&bytes).await {
                return self.broken(&tag, &e).await;
            }
            if matches!(fragments.peek(), Some(Fragment::Literal(_))) {
                self.phase = Phase::AwaitingContinuation;
                let reply = self.next_reply(&tag, true).await;
                if reply.tag != ReplyTag::Continuation {
                    tracing::debug!(tag, "literal refused");
                    self.phase = Phase::Idle;
                    return reply;
                }
                self.phase = Phase::Sending;
            }
        }

        self.phase = Phase::AwaitingReply;
        let reply = self.next_reply(&tag, false).await;
        self.phase = Phase::Idle;
        reply
    }

    /// Runs AUTHENTICATE, feeding challenges to `authenticator`.
    ///
    /// Returns the tagged reply. An authenticator that gives up makes the
    /// driver send `*`, which the server answers with a failure.
    pub async fn authenticate(&mut self, authenticator: &mut dyn Authenticator) -> Reply {
        let tag = self.state.tags.next_tag();
        if self.state.dead {
            return Reply::closed(&tag);
        }
        let command = Command::Authenticate {
            mechanism: authenticator.mechanism().to_string(),
        };
        let encoded = command.encode(&tag);
        self.telemetry(&encoded.display);
        if let Err(e) = self.transport.write_all(&encoded.to_bytes()).await {
            return self.broken(&tag, &e).await;
        }
        loop {
            self.phase = Phase::AwaitingContinuation;
            let reply = self.next_reply(&tag, true).await;
            if reply.tag != ReplyTag::Continuation {
                self.phase = Phase::Idle;
                return reply;
            }
            let challenge = match BASE64.decode(reply.text.trim_ascii()) {
                Ok(c) => Some(c),
                Err(e) => {
                    tracing::warn!(error = %e, "undecodable SASL challenge");
                    None
                }
            };
            let response = challenge.and_then(|c| authenticator.step(&c));
            let line = match response {
                Some(bytes) => {
                    self.telemetry("<SASL response suppressed>");
                    format!("{}\r\n", BASE64.encode(bytes))
                }
                None => {
                    self.telemetry("*");
                    "*\r\n".to_string()
                }
            };
            self.phase = Phase::Sending;
            if let Err(e) = self.transport.write_all(line.as_bytes()).await {
                return self.broken(&tag, &e).await;
            }
        }
    }

    /// Switches the transport to TLS after STARTTLS succeeded.
    ///
    /// # Errors
    ///
    /// Handshake failure; the connection is dead afterwards.
    pub async fn start_tls(&mut self, host: &str) -> Result<()> {
        if let Err(e) = self.transport.start_tls(host).await {
            self.broken("*", &e).await;
            return Err(e);
        }
        Ok(())
    }

    /// Reads until the reply for `tag` (or a continuation, if wanted).
    async fn next_reply(&mut self, tag: &str, want_continuation: bool) -> Reply {
        loop {
            let raw = match read_response(&mut self.transport).await {
                Ok(raw) => raw,
                Err(e) => return self.broken(tag, &e).await,
            };
            self.telemetry(&String::from_utf8_lossy(&raw));
            let reply = match Reply::parse(raw) {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!(error = %e, "discarding unparseable reply");
                    self.notifier.log(Severity::Warn, &e.to_string());
                    continue;
                }
            };
            match &reply.tag {
                ReplyTag::Untagged => self.dispatcher().dispatch(&reply),
                ReplyTag::Continuation if want_continuation => return reply,
                ReplyTag::Continuation => {
                    tracing::warn!(tag, "unexpected continuation");
                    self.notifier
                        .log(Severity::Warn, "Unexpected continuation from server");
                }
                ReplyTag::Tagged(t) if t == tag => {
                    self.apply_tagged(&reply);
                    return reply;
                }
                ReplyTag::Tagged(t) => {
                    tracing::warn!(expected = tag, got = %t, "tag mismatch");
                    self.notifier.log(
                        Severity::Warn,
                        &format!("Unexpected tagged response: {t} {}", reply.keyword),
                    );
                }
            }
        }
    }

    fn apply_tagged(&mut self, reply: &Reply) {
        if let Some(code) = reply.code() {
            if code == ResponseCode::Alert {
                tracing::warn!(text = %reply.human_text(), "server alert");
                self.notifier.log(Severity::Warn, &reply.human_text());
            }
            self.dispatcher().apply_code(code);
        }
        self.state.last_reply = Some(reply.clone());
    }

    async fn broken(&mut self, tag: &str, error: &Error) -> Reply {
        tracing::error!(%error, "IMAP connection broken");
        if !self.state.dead {
            self.notifier
                .log(Severity::Error, &format!("IMAP connection broken: {error}"));
        }
        self.state.mark_dead();
        self.phase = Phase::Idle;
        if let Err(e) = self.transport.close().await {
            tracing::debug!(error = %e, "close after failure");
        }
        let reply = Reply::closed(tag);
        self.state.last_reply = Some(reply.clone());
        reply
    }

    /// Closes the transport without treating it as a failure.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.transport.close().await {
            tracing::debug!(error = %e, "close");
        }
        self.state.dead = true;
        self.state.protocol = ProtocolState::Logout;
        self.phase = Phase::Idle;
        tracing::info!("connection closed");
    }

    fn telemetry(&self, line: &str) {
        if self.debug {
            self.notifier.debug_line(line);
        }
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
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::handler::NullNotifier;

    #[derive(Default)]
    struct Wire {
        server: VecDeque<Vec<u8>>,
        written: Arc<Mutex<Vec<u8>>>,
        closed: bool,
    }

    impl Wire {
        fn new(lines: &[&str]) -> Self {
            Self {
                server: lines.iter().map(|l| l.as_bytes().to_vec()).collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Transport for Wire {
        async fn read_line(&mut self) -> Result<Bytes> {
            self.server
                .pop_front()
                .map(Bytes::from)
                .ok_or_else(|| Error::ConnectionBroken("eof".into()))
        }

        async fn read_exact(&mut self, n: usize) -> Result<Bytes> {
            let mut line = self.server.pop_front().unwrap_or_default();
            let rest = line.split_off(n.min(line.len()));
            if !rest.is_empty() {
                self.server.push_front(rest);
            }
            Ok(Bytes::from(line))
        }

        async fn write_all(&mut self, data: &[u8]) -> Result<()> {
            if self.closed {
                return Err(Error::ConnectionBroken("closed".into()));
            }
            self.written.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }

        fn endpoint(&self) -> Endpoint {
            Endpoint::default()
        }
    }

    fn connection_with(
        lines: &[&str],
        config: &Config,
    ) -> (Connection<Wire>, Arc<Mutex<Vec<u8>>>) {
        let wire = Wire::new(lines);
        let written = Arc::clone(&wire.written);
        let conn = Connection::new(wire, config, Arc::new(NullNotifier));
        (conn, written)
    }

    fn connection(lines: &[&str]) -> (Connection<Wire>, Arc<Mutex<Vec<u8>>>) {
        connection_with(lines, &Config::default())
    }

    fn sent(written: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(written.lock().unwrap().clone()).unwrap()
    }

    #[tokio::test]
    async fn greeting_preauth() {
        let (mut conn, _) = connection(&["* PREAUTH [CAPABILITY IMAP4rev1] welcome"]);
        assert_eq!(conn.read_greeting().await.unwrap(), Status::PreAuth);
        assert!(conn.state().protocol.is_authenticated());
        assert!(conn.state().caps.has(crate::types::CapFlags::IMAP4REV1));
    }

    #[tokio::test]
    async fn greeting_bye() {
        let (mut conn, _) = connection(&["* BYE go away"]);
        assert!(matches!(conn.read_greeting().await, Err(Error::Bye(t)) if t == "go away"));
        assert!(conn.is_dead());
    }

    #[tokio::test]
    async fn tag_mismatch_is_skipped() {
        let (mut conn, _) = connection(&["A9999 OK stray", "* 4 EXISTS", "A0000 OK done"]);
        let reply = conn.execute(&Command::Noop).await;
        assert!(reply.has_tag("A0000"));
        assert_eq!(conn.state().exists, 4);
    }

    #[tokio::test]
    async fn literal_waits_for_continuation() {
        let (mut conn, written) = connection(&["+ go ahead", "A0000 OK LOGIN done"]);
        let cmd = Command::Login {
            username: "fred".into(),
            password: "a\"b".into(),
        };
        let reply = conn.run(&cmd).await.unwrap();
        assert_eq!(reply.keyword, "OK");
        assert_eq!(sent(&written), "A0000 LOGIN fred {3}\r\na\"b\r\n");
    }

    #[tokio::test]
    async fn refused_literal_aborts() {
        let (mut conn, written) = connection(&["A0000 NO [TRYCREATE] no such mailbox"]);
        let cmd = Command::Append {
            mailbox: "Nowhere".into(),
            flags: None,
            date: None,
            message: Bytes::from_static(b"Subject: x\r\n\r\nhi"),
        };
        let err = conn.run(&cmd).await.unwrap_err();
        assert!(matches!(err, Error::No(_)));
        assert_eq!(sent(&written), "A0000 APPEND Nowhere {16}\r\n");
        assert_eq!(conn.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn dead_connection_short_circuits() {
        let (mut conn, written) = connection(&[]);
        let first = conn.execute(&Command::Noop).await;
        assert!(first.is_closed());
        assert!(conn.is_dead());
        let before = sent(&written);
        let second = conn.run(&Command::Noop).await;
        assert!(matches!(second, Err(Error::ConnectionBroken(_))));
        assert_eq!(sent(&written), before);
    }

    #[tokio::test]
    async fn split_sequence_runs_every_chunk() {
        let config = Config::builder().max_sequence_len(700).build();
        let (mut conn, written) =
            connection_with(&["A0000 OK", "A0001 NO last one wins"], &config);
        let numbers: Vec<u32> = (1..=400).step_by(2).collect();
        let cmd = Command::Fetch {
            sequence: crate::types::SequenceSet::from_numbers(&numbers).unwrap(),
            items: crate::command::FetchItems::Fast,
            uid: false,
        };
        let reply = conn.execute(&cmd).await;
        assert!(reply.has_tag("A0001"));
        assert_eq!(reply.keyword, "NO");
        assert_eq!(sent(&written).matches(" FETCH ").count(), 2);
    }

    struct Plain(u8);

    impl Authenticator for Plain {
        fn mechanism(&self) -> &'static str {
            "PLAIN"
        }

        fn step(&mut self, _challenge: &[u8]) -> Option<Vec<u8>> {
            self.0 += 1;
            (self.0 == 1).then(|| b"\0fred\0pw".to_vec())
        }
    }

    #[tokio::test]
    async fn sasl_exchange() {
        let (mut conn, written) = connection(&["+ ", "A0000 OK authenticated"]);
        let reply = conn.authenticate(&mut Plain(0)).await;
        assert_eq!(reply.keyword, "OK");
        assert_eq!(
            sent(&written),
            format!("A0000 AUTHENTICATE PLAIN\r\n{}\r\n", BASE64.encode(b"\0fred\0pw"))
        );
    }

    #[tokio::test]
    async fn sasl_cancel() {
        let (mut conn, written) = connection(&["+ ", "+ more?", "A0000 BAD cancelled"]);
        let reply = conn.authenticate(&mut Plain(0)).await;
        assert_eq!(reply.keyword, "BAD");
        assert!(sent(&written).ends_with("*\r\n"));
    }
}
