//! The mailbox-driver surface: one open IMAP mailbox.
//!
//! [`ImapMailbox`] wraps a [`Connection`] in an async mutex, so at most one
//! command is in flight per connection; the guard is dropped on every exit
//! path, including errors and cancellation of the calling future.
//!
//! Operations choose the newest command form the server supports and fall
//! back to older forms when the server answers BAD, downgrading the
//! capability so later calls go straight to the fallback:
//!
//! | Operation | Preferred | Fallback |
//! |---|---|---|
//! | status | `STATUS` | cached counts or `EXAMINE` + `SEARCH UNSEEN` |
//! | list | `RLIST` / `LIST` | `FIND ALL.MAILBOXES`, `FIND MAILBOXES` |
//! | sort | `SORT` | fetch envelopes and sort locally |
//! | thread | `THREAD alg` | local ORDEREDSUBJECT |
//! | structure | `ENVELOPE BODYSTRUCTURE` | `ENVELOPE BODY`, `ENVELOPE` |

#![allow(clippy::missing_errors_doc)]

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::auth::{self, XOAuth2Auth};
use crate::cache::GcFlags;
use crate::command::{
    Command, FetchAttribute, FetchItems, FindKind, SearchFlags, SearchProgram, SortKey,
    SortProgram, StatusAttribute, StoreMode, ThreadAlgorithm,
};
use crate::connection::{
    Config, Connection, FramedStream, ImapStream, Transport, UidAnomalyPolicy, connect_plain,
    connect_tls,
};
use crate::handler::{Notifier, Severity};
use crate::parser::Reply;
use crate::sort::{SortInput, sort_messages, thread_ordered_subject};
use crate::state::{ProtocolState, SelectedState};
use crate::types::{
    Body, CapFlags, Envelope, Flags, ListEntry, MailboxSpec, Namespaces, ProtocolLevel,
    ResponseCode, Section, SectionPart, Security, SequenceSet, Service, Status, StatusRecord,
    ThreadNode,
};
use crate::{Error, Result};

/// Header lines fetched to fill the news fields of an envelope.
const NEWS_FIELDS: [&str; 3] = ["NEWSGROUPS", "FOLLOWUP-TO", "REFERENCES"];

/// A network mailbox on the tokio/rustls transport.
pub type NetMailbox = ImapMailbox<FramedStream<ImapStream>>;

/// An open IMAP mailbox.
pub struct ImapMailbox<T> {
    conn: Arc<Mutex<Connection<T>>>,
    config: Config,
    spec: MailboxSpec,
    name: String,
}

impl<T> std::fmt::Debug for ImapMailbox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapMailbox")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Logs a failed reply and classifies it.
fn check<T: Transport>(conn: &Connection<T>, reply: Reply) -> Result<Reply> {
    if !reply.is_closed() && !reply.status().is_some_and(Status::is_ok) {
        conn.notifier().log(Severity::Error, &reply.human_text());
    }
    reply.into_result()
}

fn level<T: Transport>(conn: &Connection<T>) -> ProtocolLevel {
    conn.state().caps.level()
}

fn single(n: u32) -> Result<SequenceSet> {
    SequenceSet::single(n).ok_or_else(|| Error::InvalidState("message number 0".to_string()))
}

impl NetMailbox {
    /// Connects, authenticates and (if the spec names one) selects a
    /// mailbox.
    ///
    /// `/ssl` connects with implicit TLS, `/tls` upgrades with STARTTLS.
    pub async fn open(spec: &str, config: Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let spec = MailboxSpec::parse(spec)?;
        let port = spec.effective_port(config.default_port, config.tls_port);
        let stream = match spec.security {
            Security::Ssl => connect_tls(&spec.host, port, config.connect_timeout).await?,
            Security::None | Security::StartTls => {
                connect_plain(&spec.host, port, config.connect_timeout).await?
            }
        };
        tracing::debug!(host = %spec.host, port, tls = stream.is_tls(), "connected");
        Self::open_with_transport(FramedStream::new(stream), spec, config, notifier, None).await
    }
}

impl<T: Transport> ImapMailbox<T> {
    /// Runs the open sequence over an already connected transport.
    ///
    /// Greeting, capability query, optional STARTTLS, login (skipped after
    /// PREAUTH), then SELECT/EXAMINE of the spec's mailbox if it has one.
    /// With `token` set, XOAUTH2 is used instead of asking for a password.
    pub async fn open_with_transport(
        transport: T,
        spec: MailboxSpec,
        config: Config,
        notifier: Arc<dyn Notifier>,
        token: Option<XOAuth2Auth>,
    ) -> Result<Self> {
        let mut conn = Connection::new(transport, &config, notifier);
        let greeting = conn.read_greeting().await?;

        if let Err(e) = open_session(&mut conn, &spec, &config, greeting, token).await {
            tracing::warn!(error = %e, host = %spec.host, "open failed");
            if !e.is_fatal() && !conn.is_dead() && !conn.state().bye_seen {
                conn.execute(&Command::Logout).await;
            }
            conn.shutdown().await;
            return Err(e);
        }

        let endpoint = conn.endpoint();
        let (host, port) = if endpoint.peer_host.is_empty() {
            (
                spec.host.clone(),
                spec.effective_port(config.default_port, config.tls_port),
            )
        } else {
            (endpoint.peer_host, endpoint.peer_port)
        };
        let name = spec.canonical_name(&host, port, config.default_port);
        tracing::info!(mailbox = %name, "mailbox open");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
            spec,
            name,
        })
    }

    /// Canonical `{host[:port]/service[/user=name]}mailbox` name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The spec the mailbox was opened with.
    #[must_use]
    pub const fn spec(&self) -> &MailboxSpec {
        &self.spec
    }

    /// Runs `f` with the connection locked.
    pub async fn with_connection<R>(&self, f: impl FnOnce(&mut Connection<T>) -> R) -> R {
        let mut conn = self.conn.lock().await;
        f(&mut conn)
    }

    /// Current message count.
    pub async fn exists(&self) -> u32 {
        self.conn.lock().await.state().exists
    }

    /// Sets the prefix prepended to names reported by list operations.
    pub async fn set_list_prefix(&self, prefix: Option<String>) {
        self.conn.lock().await.state_mut().list_prefix = prefix;
    }

    /// Selects (or, read-only, examines) another mailbox on this connection.
    pub async fn select(&self, mailbox: &str, read_only: bool) -> Result<()> {
        let mut conn = self.conn.lock().await;
        select_locked(&mut conn, mailbox, read_only).await
    }

    /// Closes the mailbox: optional expunge, then LOGOUT unless the server
    /// already said BYE.
    pub async fn close(&self, expunge: bool) -> Result<()> {
        let mut conn = self.conn.lock().await;
        if conn.is_dead() {
            return Ok(());
        }
        let writable =
            conn.state().protocol.is_selected() && !conn.state().protocol.is_read_only();
        if expunge && writable {
            let command = if level(&conn) >= ProtocolLevel::Imap4 {
                Command::Close
            } else {
                Command::Expunge
            };
            let reply = conn.execute(&command).await;
            if let Err(e) = check(&conn, reply) {
                tracing::warn!(error = %e, "expunge on close failed");
            }
        }
        if !conn.state().bye_seen && !conn.is_dead() {
            let reply = conn.execute(&Command::Logout).await;
            tracing::debug!(keyword = %reply.keyword, "logout");
        }
        conn.shutdown().await;
        Ok(())
    }

    /// Sends NOOP; returns false once the connection is gone.
    pub async fn ping(&self) -> bool {
        let mut conn = self.conn.lock().await;
        let reply = conn.execute(&Command::Noop).await;
        !conn.is_dead() && reply.status() == Some(Status::Ok)
    }

    /// Sends CHECK.
    pub async fn check(&self) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let reply = conn.execute(&Command::Check).await;
        check(&conn, reply).map(drop)
    }

    /// Sends EXPUNGE; the EXPUNGE replies renumber the cache as they arrive.
    pub async fn expunge(&self) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let reply = conn.execute(&Command::Expunge).await;
        check(&conn, reply).map(drop)
    }

    /// Fetches flags, internal date and size.
    pub async fn fetch_fast(&self, sequence: &SequenceSet, uid: bool) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let uid = uid && uid_capable(&conn);
        let command = Command::Fetch {
            sequence: sequence.clone(),
            items: FetchItems::Fast,
            uid,
        };
        let reply = conn.execute(&command).await;
        check(&conn, reply).map(drop)
    }

    /// Fetches flags.
    pub async fn fetch_flags(&self, sequence: &SequenceSet, uid: bool) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let uid = uid && uid_capable(&conn);
        let command = Command::Fetch {
            sequence: sequence.clone(),
            items: FetchItems::Items(vec![FetchAttribute::Flags]),
            uid,
        };
        let reply = conn.execute(&command).await;
        check(&conn, reply).map(drop)
    }

    /// Envelope and (if `want_body`) body structure of a message.
    ///
    /// Uncached envelopes of up to `envelope_lookahead` following messages
    /// ride along in the same FETCH.
    pub async fn fetch_structure(
        &self,
        msgno: u32,
        want_body: bool,
    ) -> Result<(Option<Envelope>, Option<Body>)> {
        let mut conn = self.conn.lock().await;
        let cached = |conn: &Connection<T>| {
            let cache = conn.cache();
            let envelope = cache.envelope(msgno).cloned();
            let body = cache.body(msgno).cloned();
            (envelope, body)
        };
        let (envelope, body) = cached(&conn);
        let level = level(&conn);
        let body_possible = level >= ProtocolLevel::Imap2Bis;
        if envelope.is_some() && (!want_body || body.is_some() || !body_possible) {
            return Ok((envelope, body.filter(|_| want_body)));
        }
        if msgno == 0 || msgno > conn.state().exists {
            return Err(Error::InvalidState(format!("no message {msgno}")));
        }

        let mut numbers = vec![msgno];
        if !conn.cache().is_short() {
            let exists = conn.state().exists;
            let limit = self.config.envelope_lookahead as usize;
            numbers.extend(
                (msgno + 1..=exists)
                    .filter(|&n| conn.cache().envelope(n).is_none())
                    .take(limit),
            );
        }
        let sequence = SequenceSet::from_numbers(&numbers).map_or_else(|| single(msgno), Ok)?;

        let mut items = vec![
            FetchAttribute::Flags,
            FetchAttribute::InternalDate,
            FetchAttribute::Rfc822Size,
            FetchAttribute::Envelope,
        ];
        if level >= ProtocolLevel::Imap4 {
            items.push(FetchAttribute::Uid);
        }
        if want_body {
            match level {
                ProtocolLevel::Imap4Rev1 | ProtocolLevel::Imap4 => {
                    items.push(FetchAttribute::BodyStructure);
                }
                ProtocolLevel::Imap2Bis => items.push(FetchAttribute::BodyShort),
                ProtocolLevel::Imap2 => {}
            }
        }
        if level == ProtocolLevel::Imap4Rev1 {
            items.push(FetchAttribute::Body {
                section: Section::header_fields(NEWS_FIELDS),
                peek: true,
                partial: None,
            });
        }

        let command = Command::Fetch {
            sequence,
            items: FetchItems::Items(items),
            uid: false,
        };
        let reply = conn.execute(&command).await;
        check(&conn, reply)?;
        let (envelope, body) = cached(&conn);
        Ok((envelope, body.filter(|_| want_body)))
    }

    /// Full header of a message.
    pub async fn fetch_header(&self, msgno: u32) -> Result<Bytes> {
        let mut conn = self.conn.lock().await;
        if let Some(header) = conn.cache().get(msgno).and_then(|e| e.header.clone()) {
            return Ok(header);
        }
        let attribute = if level(&conn) == ProtocolLevel::Imap4Rev1 {
            FetchAttribute::Body {
                section: Section::header(),
                peek: true,
                partial: None,
            }
        } else {
            FetchAttribute::Rfc822Header
        };
        fetch_one(&mut conn, msgno, attribute).await?;
        Ok(conn
            .cache()
            .get(msgno)
            .and_then(|e| e.header.clone())
            .unwrap_or_default())
    }

    /// Body text of a message. `peek` leaves `\Seen` alone where the
    /// server can do that.
    pub async fn fetch_text(&self, msgno: u32, peek: bool) -> Result<Bytes> {
        let mut conn = self.conn.lock().await;
        if let Some(text) = conn.cache().get(msgno).and_then(|e| e.text.clone()) {
            return Ok(text);
        }
        let attribute = if level(&conn) == ProtocolLevel::Imap4Rev1 {
            FetchAttribute::Body {
                section: Section::text(),
                peek,
                partial: None,
            }
        } else {
            FetchAttribute::Rfc822Text
        };
        fetch_one(&mut conn, msgno, attribute).await?;
        Ok(conn
            .cache()
            .get(msgno)
            .and_then(|e| e.text.clone())
            .unwrap_or_default())
    }

    /// Contents of a body section such as `2.1`, `2.0`, `1.MIME`.
    ///
    /// `partial` is `(origin, length)`. Returns `None` when the section
    /// does not exist in the message's cached structure or the server
    /// returned NIL. An empty section comes back as `Some` with no bytes.
    pub async fn fetch_section(
        &self,
        msgno: u32,
        section: &str,
        peek: bool,
        partial: Option<(u32, u32)>,
    ) -> Result<Option<Bytes>> {
        let section: Section = section.parse()?;
        let mut conn = self.conn.lock().await;

        if !section.path.is_empty()
            && let Some(body) = conn.cache().body(msgno)
            && body.resolve(&section).is_none()
        {
            tracing::debug!(msgno, section = %section, "no such section");
            return Ok(None);
        }

        let level = level(&conn);
        let attribute = match level {
            ProtocolLevel::Imap4Rev1 | ProtocolLevel::Imap4 | ProtocolLevel::Imap2Bis => {
                FetchAttribute::Body {
                    section: section.clone(),
                    peek: peek && level == ProtocolLevel::Imap4Rev1,
                    partial,
                }
            }
            ProtocolLevel::Imap2 if section == Section::whole() => FetchAttribute::Rfc822,
            ProtocolLevel::Imap2 => {
                return Err(Error::InvalidState(
                    "server does not support body sections".to_string(),
                ));
            }
        };
        fetch_one(&mut conn, msgno, attribute).await?;

        let Some(entry) = conn.cache().get(msgno) else {
            return Ok(None);
        };
        let whole = match (&section.part, section.path.is_empty(), partial) {
            (SectionPart::Header, true, None) => entry.header.clone(),
            (SectionPart::Text, true, None) => entry.text.clone(),
            _ => None,
        };
        if whole.is_some() {
            return Ok(whole);
        }
        let mut key = section.to_wire();
        if let Some((origin, _)) = partial {
            key.push_str(&format!("<{origin}>"));
        }
        Ok(entry.sections.get(&key).cloned().flatten())
    }

    /// Adds flags.
    pub async fn set_flag(&self, sequence: &SequenceSet, flags: &Flags, uid: bool) -> Result<()> {
        self.store(sequence, flags, uid, StoreMode::Add).await
    }

    /// Removes flags.
    pub async fn clear_flag(
        &self,
        sequence: &SequenceSet,
        flags: &Flags,
        uid: bool,
    ) -> Result<()> {
        self.store(sequence, flags, uid, StoreMode::Remove).await
    }

    async fn store(
        &self,
        sequence: &SequenceSet,
        flags: &Flags,
        uid: bool,
        mode: StoreMode,
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        store_locked(&mut conn, sequence, flags, uid, mode).await
    }

    /// Searches; returns sequence numbers, or UIDs when `uid` is set.
    pub async fn search(
        &self,
        charset: Option<&str>,
        program: &SearchProgram,
        uid: bool,
    ) -> Result<Vec<u32>> {
        let mut conn = self.conn.lock().await;
        search_locked(&mut conn, charset, program, uid).await
    }

    /// Sorts the messages matching `search`.
    pub async fn sort(
        &self,
        charset: &str,
        search: &SearchProgram,
        program: &SortProgram,
        uid: bool,
    ) -> Result<Vec<u32>> {
        let mut conn = self.conn.lock().await;
        if conn.state().caps.has(CapFlags::SORT) {
            let command = Command::Sort {
                program: program.clone(),
                charset: charset.to_string(),
                search: search.clone(),
                uid,
            };
            let reply = conn.execute(&command).await;
            match reply.status() {
                Some(Status::Ok) => return Ok(conn.state().sort_results.clone()),
                Some(Status::Bad) => {
                    tracing::info!("server rejected SORT, sorting locally");
                    conn.state_mut().caps.downgrade(CapFlags::SORT);
                }
                _ => {
                    check(&conn, reply)?;
                }
            }
        }
        let needs_envelope = program
            .criteria
            .iter()
            .any(|c| !matches!(c.key, SortKey::Arrival | SortKey::Size));
        let inputs = local_inputs(&mut conn, charset, search, uid, needs_envelope).await?;
        Ok(sort_messages(&inputs, program))
    }

    /// Threads the messages matching `search`.
    ///
    /// Without server support every algorithm is computed locally as
    /// ORDEREDSUBJECT.
    pub async fn thread(
        &self,
        algorithm: &ThreadAlgorithm,
        charset: &str,
        search: &SearchProgram,
        uid: bool,
    ) -> Result<Vec<ThreadNode>> {
        let mut conn = self.conn.lock().await;
        if conn.state().caps.has_thread(algorithm.as_str()) {
            let command = Command::Thread {
                algorithm: algorithm.clone(),
                charset: charset.to_string(),
                search: search.clone(),
                uid,
            };
            let reply = conn.execute(&command).await;
            match reply.status() {
                Some(Status::Ok) => return Ok(conn.state().thread_results.clone()),
                Some(Status::Bad) => {
                    tracing::info!("server rejected THREAD, threading locally");
                    conn.state_mut().caps.downgrade_thread(algorithm.as_str());
                }
                _ => {
                    check(&conn, reply)?;
                }
            }
        }
        if *algorithm != ThreadAlgorithm::OrderedSubject {
            tracing::debug!(algorithm = algorithm.as_str(), "threading by ORDEREDSUBJECT");
        }
        let inputs = local_inputs(&mut conn, charset, search, uid, true).await?;
        Ok(thread_ordered_subject(&inputs))
    }

    /// Copies messages to another mailbox.
    pub async fn copy(&self, sequence: &SequenceSet, mailbox: &str, uid: bool) -> Result<()> {
        let mut conn = self.conn.lock().await;
        copy_locked(&mut conn, sequence, mailbox, uid).await
    }

    /// Copies messages, then marks the originals `\Deleted`.
    pub async fn move_messages(
        &self,
        sequence: &SequenceSet,
        mailbox: &str,
        uid: bool,
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        copy_locked(&mut conn, sequence, mailbox, uid).await?;
        let deleted = Flags::from_vec(vec![crate::types::Flag::Deleted]);
        store_locked(&mut conn, sequence, &deleted, uid, StoreMode::Add).await
    }

    /// Appends a message to a mailbox.
    pub async fn append(
        &self,
        mailbox: &str,
        message: Bytes,
        flags: Option<Flags>,
        date: Option<String>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let command = Command::Append {
            mailbox: mailbox.to_string(),
            flags,
            date,
            message,
        };
        let reply = conn.execute(&command).await;
        if reply.code() == Some(ResponseCode::TryCreate) {
            conn.notifier()
                .log(Severity::Warn, &format!("Mailbox {mailbox} does not exist"));
        }
        check(&conn, reply).map(drop)
    }

    /// Discards cached data.
    pub async fn gc(&self, what: GcFlags) {
        self.conn.lock().await.cache_mut().gc(what);
    }

    /// Creates a mailbox.
    pub async fn create(&self, mailbox: &str) -> Result<()> {
        self.simple(Command::Create {
            mailbox: mailbox.to_string(),
        })
        .await
    }

    /// Deletes a mailbox.
    pub async fn delete(&self, mailbox: &str) -> Result<()> {
        self.simple(Command::Delete {
            mailbox: mailbox.to_string(),
        })
        .await
    }

    /// Renames a mailbox.
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.simple(Command::Rename {
            from: from.to_string(),
            to: to.to_string(),
        })
        .await
    }

    /// Subscribes to a mailbox.
    pub async fn subscribe(&self, mailbox: &str) -> Result<()> {
        self.simple(Command::Subscribe {
            mailbox: mailbox.to_string(),
        })
        .await
    }

    /// Unsubscribes from a mailbox.
    pub async fn unsubscribe(&self, mailbox: &str) -> Result<()> {
        self.simple(Command::Unsubscribe {
            mailbox: mailbox.to_string(),
        })
        .await
    }

    async fn simple(&self, command: Command) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let reply = conn.execute(&command).await;
        check(&conn, reply).map(drop)
    }

    /// Lists mailboxes.
    pub async fn list(&self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        let mut conn = self.conn.lock().await;
        list_locked(&mut conn, reference, pattern, false).await
    }

    /// Lists subscribed mailboxes.
    pub async fn lsub(&self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        let mut conn = self.conn.lock().await;
        list_locked(&mut conn, reference, pattern, true).await
    }

    /// Lists mailboxes containing `contents`.
    pub async fn scan(
        &self,
        reference: &str,
        pattern: &str,
        contents: &str,
    ) -> Result<Vec<ListEntry>> {
        let mut conn = self.conn.lock().await;
        if !conn.state().caps.has(CapFlags::SCAN) {
            return Err(Error::InvalidState("server does not support SCAN".to_string()));
        }
        let command = Command::Scan {
            reference: reference.to_string(),
            pattern: pattern.to_string(),
            contents: contents.to_string(),
        };
        let reply = conn.execute(&command).await;
        check(&conn, reply)?;
        Ok(std::mem::take(&mut conn.state_mut().listed))
    }

    /// Namespaces, fetched once per connection.
    pub async fn namespace(&self) -> Result<Option<Namespaces>> {
        let mut conn = self.conn.lock().await;
        if conn.state().namespaces.is_none() && conn.state().caps.has(CapFlags::NAMESPACE) {
            let reply = conn.execute(&Command::Namespace).await;
            check(&conn, reply)?;
        }
        Ok(conn.state().namespaces.clone())
    }

    /// STATUS of a mailbox.
    ///
    /// Once the server has answered STATUS with BAD, the fallback is used
    /// for the rest of the connection.
    pub async fn status(&self, mailbox: &str, items: &[StatusAttribute]) -> Result<StatusRecord> {
        let mut conn = self.conn.lock().await;
        if conn.state().caps.has(CapFlags::STATUS) {
            let command = Command::Status {
                mailbox: mailbox.to_string(),
                items: items.to_vec(),
            };
            let reply = conn.execute(&command).await;
            match reply.status() {
                Some(Status::Ok) => {
                    let record = conn.state().statuses.last().cloned();
                    return Ok(record.unwrap_or_else(|| StatusRecord {
                        mailbox: mailbox.to_string(),
                        ..StatusRecord::default()
                    }));
                }
                Some(Status::Bad) => {
                    tracing::info!("server rejected STATUS, falling back");
                    conn.state_mut().caps.downgrade(CapFlags::STATUS);
                }
                _ => {
                    check(&conn, reply)?;
                }
            }
        }

        let previous = match &conn.state().protocol {
            ProtocolState::Selected(s) => Some(s.clone()),
            _ => None,
        };
        let current = previous.as_ref().is_some_and(|s| s.mailbox == mailbox);
        if !current {
            select_locked(&mut conn, mailbox, true).await?;
        }
        let record = status_from_state(&mut conn, mailbox, items).await;
        if !current {
            match &previous {
                Some(prev) => select_locked(&mut conn, &prev.mailbox, prev.read_only).await?,
                None => {
                    if level(&conn) >= ProtocolLevel::Imap4 {
                        let reply = conn.execute(&Command::Close).await;
                        check(&conn, reply)?;
                    }
                    conn.cache_mut().clear();
                    conn.state_mut().reset_mailbox();
                    conn.state_mut().protocol = ProtocolState::Authenticated;
                }
            }
        }
        let record = record?;
        conn.notifier().status(&record);
        Ok(record)
    }

    /// UID of a message.
    ///
    /// Fetches UIDs for up to `uid_lookahead` messages at once. Pre-IMAP4
    /// servers have no UIDs; the sequence number stands in.
    pub async fn uid(&self, msgno: u32) -> Result<u32> {
        let mut conn = self.conn.lock().await;
        if !uid_capable(&conn) {
            return Ok(msgno);
        }
        if let Some(uid) = conn.cache().get(msgno).and_then(|e| e.uid) {
            return Ok(uid);
        }
        if msgno == 0 || msgno > conn.state().exists {
            return Err(Error::InvalidState(format!("no message {msgno}")));
        }
        let exists = conn.state().exists;
        let limit = self.config.uid_lookahead.max(1) as usize;
        let mut numbers = vec![msgno];
        numbers.extend(
            (msgno + 1..=exists)
                .filter(|&n| conn.cache().get(n).and_then(|e| e.uid).is_none())
                .take(limit - 1),
        );
        let sequence = SequenceSet::from_numbers(&numbers).map_or_else(|| single(msgno), Ok)?;
        let command = Command::Fetch {
            sequence,
            items: FetchItems::Items(vec![FetchAttribute::Uid]),
            uid: false,
        };
        let reply = conn.execute(&command).await;
        check(&conn, reply)?;

        if !uids_ascending(&conn) {
            match self.config.uid_anomaly {
                UidAnomalyPolicy::Invalidate => {
                    tracing::warn!(msgno, "UIDs not ascending, discarding cached UIDs");
                    conn.notifier()
                        .log(Severity::Warn, "Non-ascending UIDs, UID cache reset");
                    let fresh: Vec<(u32, u32)> = numbers
                        .iter()
                        .filter_map(|&n| conn.cache().get(n).and_then(|e| e.uid).map(|u| (n, u)))
                        .collect();
                    conn.cache_mut().invalidate_uids();
                    for (n, u) in fresh {
                        if let Some(entry) = conn.cache_mut().entry(n) {
                            entry.uid = Some(u);
                        }
                    }
                }
                UidAnomalyPolicy::TrustServer => {
                    tracing::debug!(msgno, "UIDs not ascending, keeping them");
                }
            }
        }
        conn.cache()
            .get(msgno)
            .and_then(|e| e.uid)
            .ok_or_else(|| Error::Protocol(format!("server sent no UID for message {msgno}")))
    }

    /// Sequence number of the message with `uid`, if it exists.
    pub async fn msgno(&self, uid: u32) -> Result<Option<u32>> {
        let mut conn = self.conn.lock().await;
        if !uid_capable(&conn) {
            return Ok((uid > 0 && uid <= conn.state().exists).then_some(uid));
        }
        if let Some(n) = conn.cache().find_uid(uid) {
            return Ok(Some(n));
        }
        let command = Command::Fetch {
            sequence: single(uid)?,
            items: FetchItems::Items(vec![FetchAttribute::Uid]),
            uid: true,
        };
        let reply = conn.execute(&command).await;
        check(&conn, reply)?;
        Ok(conn.cache().find_uid(uid))
    }
}

fn uid_capable<T: Transport>(conn: &Connection<T>) -> bool {
    level(conn) >= ProtocolLevel::Imap4
}

fn uids_ascending<T: Transport>(conn: &Connection<T>) -> bool {
    let cache = conn.cache();
    let mut last = 0;
    for uid in (1..=cache.len()).filter_map(|n| cache.get(n).and_then(|e| e.uid)) {
        if uid <= last {
            return false;
        }
        last = uid;
    }
    true
}

async fn open_session<T: Transport>(
    conn: &mut Connection<T>,
    spec: &MailboxSpec,
    config: &Config,
    greeting: Status,
    mut token: Option<XOAuth2Auth>,
) -> Result<()> {
    if spec.service == Service::Imap2 {
        tracing::debug!("IMAP2 forced, skipping CAPABILITY");
    } else if conn.state().caps.raw().is_empty() {
        query_capabilities(conn).await?;
    }

    if spec.security == Security::StartTls {
        if greeting == Status::PreAuth {
            return Err(Error::InvalidState(
                "STARTTLS requested on a preauthenticated session".to_string(),
            ));
        }
        if !conn.state().caps.has(CapFlags::STARTTLS) {
            return Err(Error::Protocol("server does not offer STARTTLS".to_string()));
        }
        let reply = conn.execute(&Command::StartTls).await;
        check(conn, reply)?;
        conn.start_tls(&spec.host).await?;
        // capabilities from before TLS are not to be trusted
        query_capabilities(conn).await?;
    }

    let wanted = match spec.service {
        Service::Imap4Rev1 => Some(ProtocolLevel::Imap4Rev1),
        Service::Imap4 => Some(ProtocolLevel::Imap4),
        Service::Imap | Service::Imap2 => None,
    };
    if let Some(wanted) = wanted
        && level(conn) < wanted
    {
        conn.notifier().log(
            Severity::Warn,
            &format!("Server is not {}", spec.service.as_str().to_ascii_uppercase()),
        );
    }

    if greeting != Status::PreAuth {
        auth::authenticate(
            conn,
            &spec.host,
            spec.user.as_deref(),
            config.max_login_trials,
            token.as_mut(),
        )
        .await?;
    }

    if spec.has_mailbox() {
        select_locked(conn, &spec.mailbox, spec.read_only).await?;
    }
    Ok(())
}

/// Sends CAPABILITY; a BAD reply means an IMAP2-era server.
async fn query_capabilities<T: Transport>(conn: &mut Connection<T>) -> Result<()> {
    let reply = conn.execute(&Command::Capability).await;
    match reply.status() {
        Some(Status::Ok) => Ok(()),
        Some(Status::Bad) => {
            tracing::info!("CAPABILITY rejected, assuming IMAP2bis");
            conn.state_mut().caps.assume_legacy();
            Ok(())
        }
        _ => reply.into_result().map(drop),
    }
}

async fn select_locked<T: Transport>(
    conn: &mut Connection<T>,
    mailbox: &str,
    read_only: bool,
) -> Result<()> {
    let command = if read_only {
        Command::Examine {
            mailbox: mailbox.to_string(),
        }
    } else {
        Command::Select {
            mailbox: mailbox.to_string(),
        }
    };
    conn.state_mut().reset_mailbox();
    conn.cache_mut().clear();
    conn.state_mut().protocol = ProtocolState::Selected(SelectedState {
        mailbox: mailbox.to_string(),
        read_only,
    });
    let reply = conn.execute(&command).await;
    if let Err(e) = check(conn, reply) {
        if !conn.is_dead() {
            conn.state_mut().protocol = ProtocolState::Authenticated;
        }
        return Err(e);
    }
    tracing::info!(
        mailbox,
        exists = conn.state().exists,
        read_only = conn.state().protocol.is_read_only(),
        "selected"
    );
    Ok(())
}

async fn fetch_one<T: Transport>(
    conn: &mut Connection<T>,
    msgno: u32,
    attribute: FetchAttribute,
) -> Result<()> {
    if msgno == 0 || msgno > conn.state().exists {
        return Err(Error::InvalidState(format!("no message {msgno}")));
    }
    let command = Command::Fetch {
        sequence: single(msgno)?,
        items: FetchItems::Items(vec![attribute]),
        uid: false,
    };
    let reply = conn.execute(&command).await;
    check(conn, reply).map(drop)
}

async fn search_locked<T: Transport>(
    conn: &mut Connection<T>,
    charset: Option<&str>,
    program: &SearchProgram,
    uid: bool,
) -> Result<Vec<u32>> {
    // before IMAP4 a UID is the sequence number
    let uid = uid && uid_capable(conn);
    if !uid {
        conn.cache_mut().clear_searched();
    }
    conn.state_mut().uid_search = uid;
    let command = Command::Search {
        charset: charset.map(str::to_string),
        program: program.clone(),
        uid,
    };
    let reply = conn.execute(&command).await;
    conn.state_mut().uid_search = false;
    check(conn, reply)?;
    Ok(conn.state().search_results.clone())
}

/// Collects sort records for the messages matching `search`, fetching
/// whatever the cache lacks in one command.
async fn local_inputs<T: Transport>(
    conn: &mut Connection<T>,
    charset: &str,
    search: &SearchProgram,
    uid: bool,
    needs_envelope: bool,
) -> Result<Vec<SortInput>> {
    let charset = (!charset.eq_ignore_ascii_case("US-ASCII")).then_some(charset);
    let hits = search_locked(conn, charset, search, false).await?;
    let missing: Vec<u32> = hits
        .iter()
        .copied()
        .filter(|&n| {
            let entry = conn.cache().get(n);
            entry.and_then(|e| e.internal_date.as_ref()).is_none()
                || (needs_envelope && conn.cache().envelope(n).is_none())
                || (uid && entry.and_then(|e| e.uid).is_none())
        })
        .collect();
    if let Some(sequence) = SequenceSet::from_numbers(&missing) {
        let mut items = vec![FetchAttribute::InternalDate, FetchAttribute::Rfc822Size];
        if needs_envelope {
            items.push(FetchAttribute::Envelope);
        }
        if uid && uid_capable(conn) {
            items.push(FetchAttribute::Uid);
        }
        let command = Command::Fetch {
            sequence,
            items: FetchItems::Items(items),
            uid: false,
        };
        let reply = conn.execute(&command).await;
        check(conn, reply)?;
    }
    let capable = uid_capable(conn);
    Ok(hits
        .into_iter()
        .map(|n| {
            let cache = conn.cache();
            let entry = cache.get(n);
            let number = if uid && capable {
                entry.and_then(|e| e.uid).unwrap_or(n)
            } else {
                n
            };
            SortInput::from_cache(
                number,
                cache.envelope(n),
                entry.and_then(|e| e.internal_date.as_deref()),
                entry.and_then(|e| e.size),
            )
        })
        .collect())
}

async fn store_locked<T: Transport>(
    conn: &mut Connection<T>,
    sequence: &SequenceSet,
    flags: &Flags,
    uid: bool,
    mode: StoreMode,
) -> Result<()> {
    let uid = uid && uid_capable(conn);
    // older servers have no .SILENT and echo FETCH FLAGS instead
    let silent = level(conn) >= ProtocolLevel::Imap4;
    let command = Command::Store {
        sequence: sequence.clone(),
        mode,
        flags: flags.clone(),
        silent,
        uid,
    };
    let reply = conn.execute(&command).await;
    check(conn, reply)?;
    if silent {
        apply_flags_locally(conn, sequence, flags, uid, mode);
    }
    Ok(())
}

async fn copy_locked<T: Transport>(
    conn: &mut Connection<T>,
    sequence: &SequenceSet,
    mailbox: &str,
    uid: bool,
) -> Result<()> {
    let command = Command::Copy {
        sequence: sequence.clone(),
        mailbox: mailbox.to_string(),
        uid: uid && uid_capable(conn),
    };
    let reply = conn.execute(&command).await;
    if reply.code() == Some(ResponseCode::TryCreate) {
        conn.notifier()
            .log(Severity::Warn, &format!("Mailbox {mailbox} does not exist"));
    }
    check(conn, reply).map(drop)
}

async fn list_locked<T: Transport>(
    conn: &mut Connection<T>,
    reference: &str,
    pattern: &str,
    subscribed: bool,
) -> Result<Vec<ListEntry>> {
    if conn.state().caps.has(CapFlags::MAILBOX_REFERRALS) {
        let command = Command::List {
            reference: reference.to_string(),
            pattern: pattern.to_string(),
            subscribed,
            remote: true,
        };
        let reply = conn.execute(&command).await;
        match reply.status() {
            Some(Status::Ok) => return Ok(std::mem::take(&mut conn.state_mut().listed)),
            Some(Status::Bad) => conn.state_mut().caps.downgrade(CapFlags::MAILBOX_REFERRALS),
            _ => {
                check(conn, reply)?;
            }
        }
    }

    if level(conn) >= ProtocolLevel::Imap4 {
        let command = Command::List {
            reference: reference.to_string(),
            pattern: pattern.to_string(),
            subscribed,
            remote: false,
        };
        let reply = conn.execute(&command).await;
        check(conn, reply)?;
        return Ok(std::mem::take(&mut conn.state_mut().listed));
    }

    // IMAP2bis has no reference argument
    let full = format!("{reference}{pattern}");
    let mut attempts = Vec::new();
    if !subscribed && conn.state().caps.has(CapFlags::IMAP2BIS) {
        attempts.push((FindKind::AllMailboxes, CapFlags::IMAP2BIS));
    }
    if conn.state().caps.has(CapFlags::RFC1176) {
        attempts.push((FindKind::Mailboxes, CapFlags::RFC1176));
    }
    for (kind, flag) in attempts {
        let command = Command::Find {
            kind,
            pattern: full.clone(),
        };
        let reply = conn.execute(&command).await;
        match reply.status() {
            Some(Status::Ok) => return Ok(std::mem::take(&mut conn.state_mut().listed)),
            Some(Status::Bad) => {
                tracing::info!(?flag, "FIND rejected");
                conn.state_mut().caps.downgrade(flag);
            }
            _ => {
                check(conn, reply)?;
            }
        }
    }
    Err(Error::InvalidState(
        "server offers no way to list mailboxes".to_string(),
    ))
}

async fn status_from_state<T: Transport>(
    conn: &mut Connection<T>,
    mailbox: &str,
    items: &[StatusAttribute],
) -> Result<StatusRecord> {
    let state = conn.state();
    let mut record = StatusRecord {
        mailbox: mailbox.to_string(),
        ..StatusRecord::default()
    };
    for item in items {
        match item {
            StatusAttribute::Messages => record.messages = Some(state.exists),
            StatusAttribute::Recent => record.recent = Some(state.recent),
            StatusAttribute::UidNext => record.uid_next = state.uid_next,
            StatusAttribute::UidValidity => record.uid_validity = state.uid_validity,
            StatusAttribute::Unseen => {}
        }
    }
    if items.contains(&StatusAttribute::Unseen) {
        let unseen = SearchProgram::all().with_flags(SearchFlags::UNSEEN);
        let hits = search_locked(conn, None, &unseen, false).await?;
        record.unseen = Some(u32::try_from(hits.len()).unwrap_or(u32::MAX));
    }
    Ok(record)
}

fn apply_flags_locally<T: Transport>(
    conn: &mut Connection<T>,
    sequence: &SequenceSet,
    flags: &Flags,
    uid: bool,
    mode: StoreMode,
) {
    let system = flags.system();
    let user = conn.state().keywords.mask_for(flags);
    let exists = conn.state().exists;
    let targets: Vec<u32> = if uid {
        let cache = conn.cache();
        let last = (1..=cache.len())
            .filter_map(|n| cache.get(n).and_then(|e| e.uid))
            .max()
            .unwrap_or_default();
        (1..=cache.len())
            .filter(|&n| {
                cache
                    .get(n)
                    .and_then(|e| e.uid)
                    .is_some_and(|u| sequence.contains(u, last))
            })
            .collect()
    } else {
        (1..=exists).filter(|&n| sequence.contains(n, exists)).collect()
    };
    for n in targets {
        if let Some(entry) = conn.cache_mut().entry(n) {
            match mode {
                StoreMode::Add => {
                    entry.flags |= system;
                    entry.user_flags |= user;
                }
                StoreMode::Remove => {
                    entry.flags &= !system;
                    entry.user_flags &= !user;
                }
                StoreMode::Replace => {
                    entry.flags = system;
                    entry.user_flags = user;
                }
            }
        }
        conn.notifier().flags(n);
    }
}
