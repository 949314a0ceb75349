//! Applies untagged replies to session state and the message cache.
//!
//! Replies are applied one at a time in arrival order, so an EXPUNGE has
//! already renumbered the cache when a FETCH that follows it in the same
//! burst is applied.

use crate::cache::MessageCache;
use crate::handler::{Notifier, Severity};
use crate::parser::{FetchItem, Reply, Untagged};
use crate::state::SessionState;
use crate::types::{ResponseCode, SectionPart, Status};

/// Mutable view of everything an untagged reply can change.
pub struct Dispatcher<'a> {
    /// Session state.
    pub state: &'a mut SessionState,
    /// Message cache.
    pub cache: &'a mut MessageCache,
    /// Where notifications go.
    pub notifier: &'a dyn Notifier,
}

impl Dispatcher<'_> {
    /// Classifies and applies one untagged reply.
    pub fn dispatch(&mut self, reply: &Reply) {
        let (data, diagnostics) = Untagged::from_reply(reply);
        for diag in diagnostics {
            self.notifier.log(Severity::Warn, &diag.to_string());
        }
        self.apply(data);
    }

    /// Applies already-classified data.
    pub fn apply(&mut self, data: Untagged) {
        match data {
            Untagged::Exists(n) => {
                self.state.exists = n;
                self.cache.resize(n);
                self.notifier.exists(n);
            }
            Untagged::Recent(n) => {
                self.state.recent = n;
                self.notifier.recent(n);
            }
            Untagged::Expunge(n) => {
                if self.cache.expunge(n) {
                    self.state.exists = self.state.exists.saturating_sub(1);
                } else {
                    tracing::warn!(seq = n, "EXPUNGE of unknown message");
                }
                self.notifier.expunged(n);
            }
            Untagged::Fetch { seq, items } => self.apply_fetch(seq, items),
            Untagged::Flags(flags) => self.state.keywords.replace(&flags),
            Untagged::Search(numbers) => {
                for n in numbers {
                    if !self.state.uid_search
                        && let Some(entry) = self.cache.entry(n)
                    {
                        entry.searched = true;
                    }
                    self.state.search_results.push(n);
                    self.notifier.searched(n);
                }
            }
            Untagged::Sort(numbers) => self.state.sort_results = numbers,
            Untagged::Thread(threads) => self.state.thread_results = threads,
            Untagged::Status(record) => {
                self.notifier.status(&record);
                self.state.statuses.push(record);
            }
            Untagged::List(mut entry) | Untagged::Mailbox(mut entry) => {
                self.prefix(&mut entry.name);
                self.notifier.list(&entry);
                self.state.listed.push(entry);
            }
            Untagged::Lsub(mut entry) => {
                self.prefix(&mut entry.name);
                self.notifier.lsub(&entry);
                self.state.listed.push(entry);
            }
            Untagged::Namespace(ns) => self.state.namespaces = Some(ns),
            Untagged::Capability(caps) => self.state.caps.apply(&caps),
            Untagged::Condition { status, code, text } => self.apply_condition(status, code, &text),
            Untagged::Ignored(what) => tracing::trace!(what, "ignored untagged data"),
            Untagged::Unknown(keyword) => {
                tracing::warn!(keyword, "unexpected untagged reply");
                self.notifier
                    .log(Severity::Warn, &format!("Unexpected unsolicited message: {keyword}"));
            }
        }
    }

    fn prefix(&self, name: &mut String) {
        if let Some(prefix) = &self.state.list_prefix {
            name.insert_str(0, prefix);
        }
    }

    fn apply_condition(&mut self, status: Status, code: Option<ResponseCode>, text: &str) {
        if status == Status::Bye {
            self.state.bye_seen = true;
            self.notifier.log(Severity::Bye, text);
            return;
        }
        let silent = code.as_ref().is_some_and(ResponseCode::is_select_data);
        let alert = code == Some(ResponseCode::Alert);
        if let Some(code) = code {
            self.apply_code(code);
        }
        if silent || text.is_empty() {
            return;
        }
        if alert {
            tracing::warn!(text, "server alert");
        }
        let severity = match status {
            Status::Ok | Status::PreAuth => Severity::Info,
            Status::No => Severity::Warn,
            Status::Bad | Status::Bye => Severity::Error,
        };
        let severity = if alert { Severity::Warn } else { severity };
        self.notifier.log(severity, text);
    }

    /// Applies a response code from a tagged or untagged status reply.
    pub fn apply_code(&mut self, code: ResponseCode) {
        match code {
            ResponseCode::UidValidity(v) => {
                if self.state.uid_validity.is_some_and(|old| old != v) {
                    tracing::info!(old = ?self.state.uid_validity, new = v, "UIDVALIDITY changed");
                    self.cache.invalidate_uids();
                }
                self.state.uid_validity = Some(v);
            }
            ResponseCode::UidNext(n) => self.state.uid_next = Some(n),
            ResponseCode::Unseen(n) => self.state.first_unseen = Some(n),
            ResponseCode::PermanentFlags(flags) => self.state.permanent_flags = Some(flags),
            ResponseCode::ReadOnly => self.set_read_only(true),
            ResponseCode::ReadWrite => self.set_read_only(false),
            ResponseCode::Referral(url) => {
                tracing::debug!(url, "referral");
                self.state.referral = Some(url);
            }
            ResponseCode::Capability(caps) => self.state.caps.apply(&caps),
            ResponseCode::UidNotSticky => tracing::debug!("UIDs are not sticky"),
            ResponseCode::NewName { old, new } => tracing::debug!(old, new, "NEWNAME"),
            ResponseCode::Alert
            | ResponseCode::Parse
            | ResponseCode::TryCreate
            | ResponseCode::Closed
            | ResponseCode::Unknown(_) => {}
        }
    }

    fn set_read_only(&mut self, read_only: bool) {
        if let crate::state::ProtocolState::Selected(selected) = &mut self.state.protocol {
            selected.read_only = read_only;
        }
    }

    fn apply_fetch(&mut self, seq: u32, items: Vec<FetchItem>) {
        if seq > self.cache.len() {
            tracing::warn!(seq, exists = self.cache.len(), "FETCH for unknown message");
            self.notifier
                .log(Severity::Warn, &format!("Unknown message in FETCH: {seq}"));
            return;
        }
        let mut flags_changed = false;
        for item in items {
            match item {
                FetchItem::Envelope(env) => self.cache.set_envelope(seq, *env),
                FetchItem::Body(body) => self.cache.set_body(seq, *body),
                FetchItem::BodySection {
                    section,
                    origin,
                    data,
                } => {
                    if section.path.is_empty()
                        && matches!(section.part, SectionPart::HeaderFields(_))
                        && let Some(data) = &data
                        && let Some(env) = self.cache.envelope_mut(seq)
                    {
                        env.apply_news_headers(data);
                    }
                    let Some(entry) = self.cache.entry(seq) else {
                        continue;
                    };
                    match (section.path.is_empty(), &section.part, origin, data) {
                        (true, SectionPart::Header, None, Some(data)) => entry.header = Some(data),
                        (true, SectionPart::Text, None, Some(data)) => entry.text = Some(data),
                        (_, _, _, data) => {
                            let mut key = section.to_wire();
                            if let Some(origin) = origin {
                                key.push_str(&format!("<{origin}>"));
                            }
                            entry.sections.insert(key, data);
                        }
                    }
                }
                other => {
                    let keywords = &self.state.keywords;
                    let Some(entry) = self.cache.entry(seq) else {
                        continue;
                    };
                    match other {
                        FetchItem::Flags(flags) => {
                            entry.flags = flags.system();
                            entry.user_flags = keywords.mask_for(&flags);
                            entry.valid = true;
                            flags_changed = true;
                        }
                        FetchItem::Uid(uid) => entry.uid = Some(uid),
                        FetchItem::InternalDate(date) => entry.internal_date = Some(date),
                        FetchItem::Rfc822Size(size) => entry.size = Some(size),
                        FetchItem::Rfc822Header(data) => entry.header = Some(data.unwrap_or_default()),
                        FetchItem::Rfc822Text(data) => entry.text = Some(data.unwrap_or_default()),
                        FetchItem::Rfc822(data) => {
                            entry.sections.insert(String::new(), data);
                        }
                        FetchItem::Envelope(_) | FetchItem::Body(_) | FetchItem::BodySection { .. } => {}
                    }
                }
            }
        }
        if flags_changed {
            self.notifier.flags(seq);
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
    use std::sync::Mutex;

    use bytes::Bytes;

    use super::*;
    use crate::state::SelectedState;
    use crate::types::{ListEntry, SystemFlags};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Notifier for Recorder {
        fn exists(&self, count: u32) {
            self.events.lock().unwrap().push(format!("exists {count}"));
        }
        fn expunged(&self, seq: u32) {
            self.events.lock().unwrap().push(format!("expunged {seq}"));
        }
        fn flags(&self, seq: u32) {
            self.events.lock().unwrap().push(format!("flags {seq}"));
        }
        fn log(&self, severity: Severity, text: &str) {
            self.events.lock().unwrap().push(format!("{severity:?} {text}"));
        }
        fn list(&self, entry: &ListEntry) {
            self.events.lock().unwrap().push(format!("list {}", entry.name));
        }
        fn searched(&self, number: u32) {
            self.events.lock().unwrap().push(format!("searched {number}"));
        }
    }

    fn feed(lines: &[&str], state: &mut SessionState, cache: &mut MessageCache, rec: &Recorder) {
        let mut d = Dispatcher {
            state,
            cache,
            notifier: rec,
        };
        for line in lines {
            let reply = Reply::parse(Bytes::copy_from_slice(line.as_bytes())).unwrap();
            d.dispatch(&reply);
        }
    }

    fn setup(n: u32) -> (SessionState, MessageCache) {
        let state = SessionState::new('A', 30);
        let mut cache = MessageCache::new(false);
        cache.resize(n);
        for seq in 1..=n {
            cache.entry(seq).unwrap().uid = Some(100 + seq);
        }
        (state, cache)
    }

    #[test]
    fn expunge_then_fetch_hits_renumbered_message() {
        let (mut state, mut cache) = setup(5);
        state.exists = 5;
        let rec = Recorder::default();
        feed(
            &["* 3 EXPUNGE", "* 3 FETCH (FLAGS (\\Seen))"],
            &mut state,
            &mut cache,
            &rec,
        );
        assert_eq!(state.exists, 4);
        let entry = cache.get(3).unwrap();
        assert_eq!(entry.uid, Some(104));
        assert_eq!(entry.flags, SystemFlags::SEEN);
        assert!(entry.valid);
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec!["expunged 3".to_string(), "flags 3".to_string()]
        );
    }

    #[test]
    fn select_codes_are_silent() {
        let (mut state, mut cache) = setup(0);
        state.protocol = crate::state::ProtocolState::Selected(SelectedState {
            mailbox: "INBOX".into(),
            read_only: false,
        });
        let rec = Recorder::default();
        feed(
            &[
                "* OK [UIDVALIDITY 3857529045] UIDs valid",
                "* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited",
                "* OK [READ-ONLY] hmm",
                "* OK [ALERT] System shutdown in 10 minutes",
                "* NO [UNKNOWN-CODE] something odd",
            ],
            &mut state,
            &mut cache,
            &rec,
        );
        assert_eq!(state.uid_validity, Some(3857529045));
        assert!(state.permanent_flags.is_some());
        assert!(state.protocol.is_read_only());
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec![
                "Warn System shutdown in 10 minutes".to_string(),
                "Warn something odd".to_string()
            ]
        );
    }

    #[test]
    fn bye_is_recorded() {
        let (mut state, mut cache) = setup(0);
        let rec = Recorder::default();
        feed(&["* BYE Autologout"], &mut state, &mut cache, &rec);
        assert!(state.bye_seen);
        assert_eq!(*rec.events.lock().unwrap(), vec!["Bye Autologout".to_string()]);
    }

    #[test]
    fn search_marks_or_passes_uids() {
        let (mut state, mut cache) = setup(4);
        let rec = Recorder::default();
        feed(&["* SEARCH 2 4"], &mut state, &mut cache, &rec);
        assert_eq!(cache.searched(), vec![2, 4]);

        cache.clear_searched();
        state.uid_search = true;
        state.search_results.clear();
        feed(&["* SEARCH 104"], &mut state, &mut cache, &rec);
        assert!(cache.searched().is_empty());
        assert_eq!(state.search_results, vec![104]);
    }

    #[test]
    fn list_prefix_and_unknown() {
        let (mut state, mut cache) = setup(0);
        state.list_prefix = Some("{imap.example.com}".into());
        let rec = Recorder::default();
        feed(
            &["* LIST () \"/\" INBOX", "* FROBNICATE now"],
            &mut state,
            &mut cache,
            &rec,
        );
        assert_eq!(state.listed[0].name, "{imap.example.com}INBOX");
        let events = rec.events.lock().unwrap();
        assert_eq!(events[0], "list {imap.example.com}INBOX");
        assert!(events[1].starts_with("Warn Unexpected"));
    }

    #[test]
    fn uidvalidity_change_drops_uids() {
        let (mut state, mut cache) = setup(2);
        state.uid_validity = Some(1);
        let rec = Recorder::default();
        feed(&["* OK [UIDVALIDITY 2] new epoch"], &mut state, &mut cache, &rec);
        assert_eq!(cache.get(1).unwrap().uid, None);
    }

    #[test]
    fn news_headers_fill_envelope() {
        let (mut state, mut cache) = setup(1);
        let rec = Recorder::default();
        feed(
            &[
                "* 1 FETCH (ENVELOPE (NIL \"s\" NIL NIL NIL NIL NIL NIL NIL NIL) BODY[HEADER.FIELDS (NEWSGROUPS)] {25}\r\nNewsgroups: comp.mail\r\n\r\n)",
            ],
            &mut state,
            &mut cache,
            &rec,
        );
        let env = cache.envelope(1).unwrap();
        assert_eq!(env.newsgroups.as_deref(), Some("comp.mail"));
    }

    #[test]
    fn empty_section_differs_from_nil() {
        let (mut state, mut cache) = setup(1);
        let rec = Recorder::default();
        feed(
            &["* 1 FETCH (BODY[1] \"\" BODY[2] NIL BODY[TEXT] NIL)"],
            &mut state,
            &mut cache,
            &rec,
        );
        let entry = cache.get(1).unwrap();
        assert_eq!(entry.sections.get("1"), Some(&Some(Bytes::new())));
        assert_eq!(entry.sections.get("2"), Some(&None));
        assert_eq!(entry.sections.get("TEXT"), Some(&None));
        assert!(entry.text.is_none());
    }
}
