//! IMAP commands and their wire encoding.
//!
//! A [`Command`] lowers to a verb plus typed [`Arg`]s; the [`Encoder`]
//! decides atom/quoted/literal form per argument.

mod encoder;
mod search;
mod tag_generator;
mod types;

use bytes::Bytes;

use crate::types::{Flags, SequenceSet};

pub use encoder::{Arg, EncodedCommand, Encoder, Fragment, StringForm, string_form};
pub use search::{
    SearchFlags, SearchProgram, SortCriterion, SortKey, SortProgram, ThreadAlgorithm,
};
pub use tag_generator::TagGenerator;
pub use types::{FetchAttribute, FetchItems, FindKind, StatusAttribute, StoreMode};

/// IMAP command, covering IMAP2 through IMAP4rev1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // Any state
    /// CAPABILITY command.
    Capability,
    /// NOOP command.
    Noop,
    /// LOGOUT command.
    Logout,

    // Not authenticated
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password; masked in debug telemetry.
        password: String,
    },
    /// AUTHENTICATE command; the exchange follows as continuations.
    Authenticate {
        /// SASL mechanism name.
        mechanism: String,
    },

    // Authenticated
    /// SELECT command.
    Select {
        /// Mailbox to select.
        mailbox: String,
    },
    /// EXAMINE command (read-only SELECT).
    Examine {
        /// Mailbox to examine.
        mailbox: String,
    },
    /// CREATE command.
    Create {
        /// Mailbox to create.
        mailbox: String,
    },
    /// DELETE command.
    Delete {
        /// Mailbox to delete.
        mailbox: String,
    },
    /// RENAME command.
    Rename {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// SUBSCRIBE command.
    Subscribe {
        /// Mailbox.
        mailbox: String,
    },
    /// UNSUBSCRIBE command.
    Unsubscribe {
        /// Mailbox.
        mailbox: String,
    },
    /// LIST, LSUB, RLIST or RLSUB.
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
        /// LSUB/RLSUB instead of LIST/RLIST.
        subscribed: bool,
        /// RLIST/RLSUB (mailbox referrals).
        remote: bool,
    },
    /// IMAP2bis FIND.
    Find {
        /// What to find.
        kind: FindKind,
        /// Pattern.
        pattern: String,
    },
    /// SCAN: LIST restricted to mailboxes containing text.
    Scan {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
        /// Text to look for.
        contents: String,
    },
    /// NAMESPACE command.
    Namespace,
    /// STATUS command.
    Status {
        /// Mailbox name.
        mailbox: String,
        /// Items to request.
        items: Vec<StatusAttribute>,
    },
    /// APPEND command; the message always goes as a literal.
    Append {
        /// Target mailbox.
        mailbox: String,
        /// Flags to set.
        flags: Option<Flags>,
        /// Internal date, `dd-Mon-yyyy hh:mm:ss +zzzz`.
        date: Option<String>,
        /// Message data.
        message: Bytes,
    },

    // Selected
    /// CHECK command.
    Check,
    /// CLOSE command.
    Close,
    /// EXPUNGE command.
    Expunge,
    /// SEARCH / UID SEARCH.
    Search {
        /// Optional CHARSET.
        charset: Option<String>,
        /// Criteria.
        program: SearchProgram,
        /// Return UIDs.
        uid: bool,
    },
    /// SORT / UID SORT.
    Sort {
        /// Sort keys.
        program: SortProgram,
        /// Charset (required by the command).
        charset: String,
        /// Criteria selecting the messages to sort.
        search: SearchProgram,
        /// Return UIDs.
        uid: bool,
    },
    /// THREAD / UID THREAD.
    Thread {
        /// Algorithm.
        algorithm: ThreadAlgorithm,
        /// Charset (required by the command).
        charset: String,
        /// Criteria selecting the messages to thread.
        search: SearchProgram,
        /// Return UIDs.
        uid: bool,
    },
    /// FETCH / UID FETCH.
    Fetch {
        /// Messages.
        sequence: SequenceSet,
        /// Items to fetch.
        items: FetchItems,
        /// Sequence holds UIDs.
        uid: bool,
    },
    /// STORE / UID STORE.
    Store {
        /// Messages.
        sequence: SequenceSet,
        /// How to combine flags.
        mode: StoreMode,
        /// Flags.
        flags: Flags,
        /// Suppress the FETCH echo (`.SILENT`).
        silent: bool,
        /// Sequence holds UIDs.
        uid: bool,
    },
    /// COPY / UID COPY.
    Copy {
        /// Messages.
        sequence: SequenceSet,
        /// Target mailbox.
        mailbox: String,
        /// Sequence holds UIDs.
        uid: bool,
    },
}

impl Command {
    /// Command verb, including the `UID` prefix where applicable.
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::Select { .. } => "SELECT",
            Self::Examine { .. } => "EXAMINE",
            Self::Create { .. } => "CREATE",
            Self::Delete { .. } => "DELETE",
            Self::Rename { .. } => "RENAME",
            Self::Subscribe { .. } => "SUBSCRIBE",
            Self::Unsubscribe { .. } => "UNSUBSCRIBE",
            Self::List {
                subscribed, remote, ..
            } => match (remote, subscribed) {
                (false, false) => "LIST",
                (false, true) => "LSUB",
                (true, false) => "RLIST",
                (true, true) => "RLSUB",
            },
            Self::Find { .. } => "FIND",
            Self::Scan { .. } => "SCAN",
            Self::Namespace => "NAMESPACE",
            Self::Status { .. } => "STATUS",
            Self::Append { .. } => "APPEND",
            Self::Check => "CHECK",
            Self::Close => "CLOSE",
            Self::Expunge => "EXPUNGE",
            Self::Search { uid, .. } => pick(*uid, "UID SEARCH", "SEARCH"),
            Self::Sort { uid, .. } => pick(*uid, "UID SORT", "SORT"),
            Self::Thread { uid, .. } => pick(*uid, "UID THREAD", "THREAD"),
            Self::Fetch { uid, .. } => pick(*uid, "UID FETCH", "FETCH"),
            Self::Store { uid, .. } => pick(*uid, "UID STORE", "STORE"),
            Self::Copy { uid, .. } => pick(*uid, "UID COPY", "COPY"),
        }
    }

    /// Lowers the command to typed arguments.
    #[must_use]
    pub fn args(&self) -> Vec<Arg> {
        let astr = |s: &str| Arg::AString(s.to_string());
        match self {
            Self::Capability
            | Self::Noop
            | Self::Logout
            | Self::StartTls
            | Self::Namespace
            | Self::Check
            | Self::Close
            | Self::Expunge => Vec::new(),
            Self::Login { username, password } => {
                vec![astr(username), Arg::Secret(password.clone())]
            }
            Self::Authenticate { mechanism } => vec![Arg::Atom(mechanism.clone())],
            Self::Select { mailbox }
            | Self::Examine { mailbox }
            | Self::Create { mailbox }
            | Self::Delete { mailbox }
            | Self::Subscribe { mailbox }
            | Self::Unsubscribe { mailbox } => vec![astr(mailbox)],
            Self::Rename { from, to } => vec![astr(from), astr(to)],
            Self::List {
                reference, pattern, ..
            } => vec![astr(reference), Arg::ListPattern(pattern.clone())],
            Self::Find { kind, pattern } => vec![
                Arg::Atom(kind.as_str().to_string()),
                Arg::ListPattern(pattern.clone()),
            ],
            Self::Scan {
                reference,
                pattern,
                contents,
            } => vec![
                astr(reference),
                Arg::ListPattern(pattern.clone()),
                astr(contents),
            ],
            Self::Status { mailbox, items } => {
                let names: Vec<&str> = items.iter().map(|i| i.as_str()).collect();
                vec![astr(mailbox), Arg::Atom(format!("({})", names.join(" ")))]
            }
            Self::Append {
                mailbox,
                flags,
                date,
                message,
            } => {
                let mut args = vec![astr(mailbox)];
                if let Some(flags) = flags {
                    args.push(Arg::FlagList(flags.clone()));
                }
                if let Some(date) = date {
                    args.push(astr(date));
                }
                args.push(Arg::Literal(message.clone()));
                args
            }
            Self::Search {
                charset, program, ..
            } => {
                let mut args = Vec::new();
                if let Some(charset) = charset {
                    args.push(Arg::Atom("CHARSET".to_string()));
                    args.push(astr(charset));
                }
                args.push(Arg::Search(program.clone()));
                args
            }
            Self::Sort {
                program,
                charset,
                search,
                ..
            } => vec![
                Arg::Sort(program.clone()),
                astr(charset),
                Arg::Search(search.clone()),
            ],
            Self::Thread {
                algorithm,
                charset,
                search,
                ..
            } => vec![
                Arg::Atom(algorithm.as_str().to_string()),
                astr(charset),
                Arg::Search(search.clone()),
            ],
            Self::Fetch {
                sequence, items, ..
            } => vec![Arg::Sequence(sequence.clone()), Arg::Fetch(items.clone())],
            Self::Store {
                sequence,
                mode,
                flags,
                silent,
                ..
            } => {
                let mut item = mode.as_str().to_string();
                if *silent {
                    item.push_str(".SILENT");
                }
                vec![
                    Arg::Sequence(sequence.clone()),
                    Arg::Atom(item),
                    Arg::FlagList(flags.clone()),
                ]
            }
            Self::Copy {
                sequence, mailbox, ..
            } => vec![Arg::Sequence(sequence.clone()), astr(mailbox)],
        }
    }

    /// Encodes the command with the given tag.
    #[must_use]
    pub fn encode(&self, tag: &str) -> EncodedCommand {
        let mut enc = Encoder::new(tag, self.verb());
        for arg in self.args() {
            enc.arg(&arg);
        }
        enc.finish()
    }

    /// The message set, for commands that carry one.
    #[must_use]
    pub const fn sequence(&self) -> Option<&SequenceSet> {
        match self {
            Self::Fetch { sequence, .. }
            | Self::Store { sequence, .. }
            | Self::Copy { sequence, .. } => Some(sequence),
            _ => None,
        }
    }

    /// Splits a command whose message set renders longer than `max_len`
    /// into one command per chunk. Other commands come back unchanged.
    #[must_use]
    pub fn split_sequence(&self, max_len: usize) -> Vec<Self> {
        let Some(set) = self.sequence() else {
            return vec![self.clone()];
        };
        let chunks = set.chunks(max_len);
        if chunks.len() <= 1 {
            return vec![self.clone()];
        }
        chunks
            .into_iter()
            .map(|chunk| {
                let mut cmd = self.clone();
                match &mut cmd {
                    Self::Fetch { sequence, .. }
                    | Self::Store { sequence, .. }
                    | Self::Copy { sequence, .. } => *sequence = chunk,
                    _ => {}
                }
                cmd
            })
            .collect()
    }
}

const fn pick(uid: bool, with_uid: &'static str, plain: &'static str) -> &'static str {
    if uid { with_uid } else { plain }
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
    use crate::types::{Flag, Section};

    fn wire(cmd: &Command) -> String {
        String::from_utf8(cmd.encode("A001").to_bytes()).unwrap()
    }

    #[test]
    fn test_capability_command() {
        assert_eq!(wire(&Command::Capability), "A001 CAPABILITY\r\n");
    }

    #[test]
    fn test_login_quoted() {
        let cmd = Command::Login {
            username: "user@example.com".to_string(),
            password: "pass word".to_string(),
        };
        assert_eq!(wire(&cmd), "A001 LOGIN user@example.com \"pass word\"\r\n");
        assert_eq!(
            cmd.encode("A001").display,
            "A001 LOGIN user@example.com <password suppressed>"
        );
    }

    #[test]
    fn test_login_password_with_quote_is_literal() {
        let cmd = Command::Login {
            username: "u".to_string(),
            password: "p\"w".to_string(),
        };
        let enc = cmd.encode("A001");
        assert!(enc.has_literal());
        assert_eq!(enc.to_bytes(), b"A001 LOGIN u {3}\r\np\"w\r\n");
    }

    #[test]
    fn test_list_family() {
        let list = |subscribed, remote| Command::List {
            reference: String::new(),
            pattern: "*".to_string(),
            subscribed,
            remote,
        };
        assert_eq!(wire(&list(false, false)), "A001 LIST \"\" *\r\n");
        assert_eq!(wire(&list(true, false)), "A001 LSUB \"\" *\r\n");
        assert_eq!(wire(&list(false, true)), "A001 RLIST \"\" *\r\n");
        assert_eq!(wire(&list(true, true)), "A001 RLSUB \"\" *\r\n");
    }

    #[test]
    fn test_find_and_scan() {
        let find = Command::Find {
            kind: FindKind::AllMailboxes,
            pattern: "*".to_string(),
        };
        assert_eq!(wire(&find), "A001 FIND ALL.MAILBOXES *\r\n");
        let scan = Command::Scan {
            reference: String::new(),
            pattern: "%".to_string(),
            contents: "urgent".to_string(),
        };
        assert_eq!(wire(&scan), "A001 SCAN \"\" % urgent\r\n");
    }

    #[test]
    fn test_status_command() {
        let cmd = Command::Status {
            mailbox: "INBOX".to_string(),
            items: vec![StatusAttribute::Messages, StatusAttribute::Unseen],
        };
        assert_eq!(wire(&cmd), "A001 STATUS INBOX (MESSAGES UNSEEN)\r\n");
    }

    #[test]
    fn test_append_sends_message_as_literal() {
        let cmd = Command::Append {
            mailbox: "Sent".to_string(),
            flags: Some(Flags::from_vec(vec![Flag::Seen])),
            date: Some("1-Feb-1994 21:52:25 -0800".to_string()),
            message: Bytes::from_static(b"Subject: hi\r\n\r\nbody"),
        };
        let enc = cmd.encode("A001");
        assert_eq!(
            enc.fragments[0],
            Fragment::Line(Bytes::from_static(
                b"A001 APPEND Sent (\\Seen) \"1-Feb-1994 21:52:25 -0800\" {19}\r\n"
            ))
        );
        assert_eq!(
            enc.fragments[1],
            Fragment::Literal(Bytes::from_static(b"Subject: hi\r\n\r\nbody"))
        );
        assert_eq!(enc.fragments[2], Fragment::Line(Bytes::from_static(b"\r\n")));
    }

    #[test]
    fn test_uid_fetch_section() {
        let cmd = Command::Fetch {
            sequence: SequenceSet::single(7).unwrap(),
            items: FetchItems::Items(vec![FetchAttribute::Body {
                section: Section::text(),
                peek: false,
                partial: None,
            }]),
            uid: true,
        };
        assert_eq!(wire(&cmd), "A001 UID FETCH 7 BODY[TEXT]\r\n");
    }

    #[test]
    fn test_store_silent() {
        let cmd = Command::Store {
            sequence: SequenceSet::single(1).unwrap(),
            mode: StoreMode::Add,
            flags: Flags::from_vec(vec![Flag::Seen]),
            silent: true,
            uid: false,
        };
        assert_eq!(wire(&cmd), "A001 STORE 1 +FLAGS.SILENT (\\Seen)\r\n");
    }

    #[test]
    fn test_search_with_charset() {
        let cmd = Command::Search {
            charset: Some("UTF-8".to_string()),
            program: SearchProgram::all().with_flags(SearchFlags::UNSEEN),
            uid: true,
        };
        assert_eq!(wire(&cmd), "A001 UID SEARCH CHARSET UTF-8 UNSEEN\r\n");
    }

    #[test]
    fn test_sort_and_thread() {
        let sort = Command::Sort {
            program: SortProgram::by(SortKey::Arrival),
            charset: "US-ASCII".to_string(),
            search: SearchProgram::all(),
            uid: false,
        };
        assert_eq!(wire(&sort), "A001 SORT (ARRIVAL) US-ASCII ALL\r\n");
        let thread = Command::Thread {
            algorithm: ThreadAlgorithm::References,
            charset: "US-ASCII".to_string(),
            search: SearchProgram::all(),
            uid: true,
        };
        assert_eq!(wire(&thread), "A001 UID THREAD REFERENCES US-ASCII ALL\r\n");
    }

    #[test]
    fn test_split_sequence() {
        let numbers: Vec<u32> = (1..=400).map(|n| n * 3).collect();
        let cmd = Command::Copy {
            sequence: SequenceSet::from_numbers(&numbers).unwrap(),
            mailbox: "Archive".to_string(),
            uid: false,
        };
        let parts = cmd.split_sequence(200);
        assert!(parts.len() > 1);
        for part in &parts {
            assert!(part.sequence().unwrap().to_string().len() <= 200);
            assert_eq!(part.verb(), "COPY");
        }
        assert_eq!(Command::Noop.split_sequence(10), vec![Command::Noop]);
    }
}
