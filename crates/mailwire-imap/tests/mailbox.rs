//! End-to-end tests of the mailbox operations.
//!
//! Each test runs a scripted server on one end of an in-memory duplex
//! stream and the engine on the other. The server checks every command it
//! receives and answers with canned lines; `$` in a reply stands for the
//! command's tag.

#![allow(clippy::unwrap_used, clippy::similar_names)]

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::io::{
    AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
};
use tokio::task::JoinHandle;

use mailwire_imap::connection::FramedStream;
use mailwire_imap::handler::{Credentials, LoginContext, Notifier, Severity};
use mailwire_imap::types::SystemFlags;
use mailwire_imap::{
    CapFlags, Config, Error, Flag, Flags, ImapMailbox, MailDriver, MailboxSpec, SearchProgram,
    SequenceSet, SortKey, SortProgram, StatusAttribute, ThreadAlgorithm, UidAnomalyPolicy,
};

type TestMailbox = ImapMailbox<FramedStream<DuplexStream>>;

enum Step {
    /// A tagged command; literals are acknowledged with `+` and inlined.
    /// An expected text ending in `...` matches as a prefix.
    Command(&'static str, &'static [&'static str]),
    /// An untagged client line such as a SASL response.
    Line(&'static str, &'static [&'static str]),
}

use Step::{Command, Line};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    password: Option<&'static str>,
}

impl Recorder {
    fn with_password(password: &'static str) -> Self {
        Self {
            password: Some(password),
            ..Self::default()
        }
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl Notifier for Recorder {
    fn exists(&self, count: u32) {
        self.push(format!("exists {count}"));
    }

    fn expunged(&self, seq: u32) {
        self.push(format!("expunged {seq}"));
    }

    fn flags(&self, seq: u32) {
        self.push(format!("flags {seq}"));
    }

    fn log(&self, severity: Severity, text: &str) {
        self.push(format!("{severity:?} {text}"));
    }

    fn login(&self, context: &LoginContext<'_>) -> Option<Credentials> {
        self.push(format!("login {} #{}", context.host, context.trial));
        self.password.map(|p| Credentials::new("fred", p))
    }
}

async fn read_line(reader: &mut BufReader<ReadHalf<DuplexStream>>) -> Option<String> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.unwrap() == 0 {
        return None;
    }
    Some(line.trim_end_matches(['\r', '\n']).to_string())
}

fn literal_length(line: &str) -> Option<usize> {
    let open = line.strip_suffix('}')?.rfind('{')?;
    line[open + 1..line.len() - 1].parse().ok()
}

async fn reply(write: &mut WriteHalf<DuplexStream>, tag: &str, lines: &[&str]) {
    for line in lines {
        let line = line.replace('$', tag);
        write.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
    }
}

async fn serve(stream: DuplexStream, greeting: &'static str, steps: Vec<Step>) -> Vec<String> {
    let (read, mut write) = tokio::io::split(stream);
    let mut reader = BufReader::new(read);
    reply(&mut write, "", &[greeting]).await;

    let mut tag = String::new();
    let mut seen = Vec::new();
    for step in steps {
        match step {
            Command(expected, replies) => {
                let mut text = read_line(&mut reader).await.unwrap();
                while let Some(n) = literal_length(&text) {
                    write.write_all(b"+ Ready\r\n").await.unwrap();
                    let mut payload = vec![0; n];
                    reader.read_exact(&mut payload).await.unwrap();
                    text.push_str("\r\n");
                    text.push_str(&String::from_utf8_lossy(&payload));
                    text.push_str(&read_line(&mut reader).await.unwrap());
                }
                let (t, rest) = text.split_once(' ').unwrap();
                tag = t.to_string();
                match expected.strip_suffix("...") {
                    Some(prefix) => assert!(rest.starts_with(prefix), "got {rest:?}"),
                    None => assert_eq!(rest, expected),
                }
                seen.push(rest.to_string());
                reply(&mut write, &tag, replies).await;
            }
            Line(expected, replies) => {
                let text = read_line(&mut reader).await.unwrap();
                assert_eq!(text, expected);
                reply(&mut write, &tag, replies).await;
            }
        }
    }
    seen
}

async fn open_with(
    spec: &str,
    config: Config,
    greeting: &'static str,
    steps: Vec<Step>,
    notifier: Arc<Recorder>,
) -> (mailwire_imap::Result<TestMailbox>, JoinHandle<Vec<String>>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let (client, server) = tokio::io::duplex(64 * 1024);
    let script = tokio::spawn(serve(server, greeting, steps));
    let mailbox = ImapMailbox::open_with_transport(
        FramedStream::new(client),
        MailboxSpec::parse(spec).unwrap(),
        config,
        notifier,
        None,
    )
    .await;
    (mailbox, script)
}

async fn open(
    spec: &str,
    greeting: &'static str,
    steps: Vec<Step>,
) -> (TestMailbox, JoinHandle<Vec<String>>, Arc<Recorder>) {
    let notifier = Arc::new(Recorder::with_password("secret"));
    let (mailbox, script) = open_with(
        spec,
        Config::default(),
        greeting,
        steps,
        Arc::clone(&notifier),
    )
    .await;
    (mailbox.unwrap(), script, notifier)
}

const PREAUTH: &str = "* PREAUTH [CAPABILITY IMAP4rev1] ready";

fn select(exists: &'static str) -> Step {
    let replies: &'static [&'static str] = match exists {
        "1" => &["* 1 EXISTS", "* 0 RECENT", "$ OK [READ-WRITE] done"],
        "2" => &["* 2 EXISTS", "* 0 RECENT", "$ OK [READ-WRITE] done"],
        "3" => &["* 3 EXISTS", "* 0 RECENT", "$ OK [READ-WRITE] done"],
        _ => &[
            "* 5 EXISTS",
            "* 0 RECENT",
            "* OK [UIDVALIDITY 42] ok",
            "$ OK [READ-WRITE] done",
        ],
    };
    Command("SELECT INBOX", replies)
}

#[tokio::test]
async fn preauth_open_selects_mailbox() {
    let (mailbox, script, notifier) =
        open("{imap.example.com}INBOX", PREAUTH, vec![select("3")]).await;
    assert_eq!(mailbox.name(), "{imap.example.com/imap}INBOX");
    assert_eq!(mailbox.exists().await, 3);
    assert_eq!(script.await.unwrap(), vec!["SELECT INBOX"]);
    assert!(notifier.events().contains(&"exists 3".to_string()));
    assert!(!notifier.events().iter().any(|e| e.starts_with("login")));
}

#[tokio::test]
async fn greeting_bye_fails_open() {
    let notifier = Arc::new(Recorder::default());
    let (mailbox, _script) = open_with(
        "{imap.example.com}INBOX",
        Config::default(),
        "* BYE too busy",
        vec![],
        notifier,
    )
    .await;
    assert!(matches!(mailbox, Err(Error::Bye(text)) if text == "too busy"));
}

#[tokio::test]
async fn login_retries_until_accepted() {
    let (mailbox, script, notifier) = open(
        "{imap.example.com/user=fred}INBOX",
        "* OK [CAPABILITY IMAP4rev1] hello",
        vec![
            Command("LOGIN fred secret", &["$ NO wrong password"]),
            Command(
                "LOGIN fred secret",
                &["$ OK [CAPABILITY IMAP4rev1 SORT] logged in"],
            ),
            select("1"),
        ],
    )
    .await;
    assert_eq!(mailbox.name(), "{imap.example.com/imap/user=fred}INBOX");
    assert_eq!(script.await.unwrap().len(), 3);
    let events = notifier.events();
    assert!(events.contains(&"login imap.example.com #2".to_string()));
    assert!(events.iter().any(|e| e.starts_with("Warn Retrying login")));
    mailbox
        .with_connection(|conn| assert!(conn.state().caps.has(CapFlags::SORT)))
        .await;
}

#[tokio::test]
async fn login_gives_up_after_max_trials() {
    let notifier = Arc::new(Recorder::with_password("nope"));
    let config = Config::builder().max_login_trials(2).build();
    let (mailbox, script) = open_with(
        "{imap.example.com}INBOX",
        config,
        "* OK [CAPABILITY IMAP4rev1] hello",
        vec![
            Command("LOGIN fred nope", &["$ NO wrong password"]),
            Command("LOGIN fred nope", &["$ NO wrong password"]),
            Command("LOGOUT", &["* BYE bye", "$ OK done"]),
        ],
        Arc::clone(&notifier),
    )
    .await;
    assert!(matches!(mailbox, Err(Error::Auth(_))));
    assert_eq!(script.await.unwrap().len(), 3);
    assert!(
        notifier
            .events()
            .contains(&"Error Too many login failures".to_string())
    );
}

#[tokio::test]
async fn sasl_plain_exchange() {
    let (_mailbox, script, _) = open(
        "{imap.example.com}",
        "* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] hello",
        vec![
            Command("AUTHENTICATE PLAIN", &["+ "]),
            Line("AGZyZWQAc2VjcmV0", &["$ OK done"]),
            Command(
                "CAPABILITY",
                &["* CAPABILITY IMAP4rev1 AUTH=PLAIN UIDPLUS", "$ OK"],
            ),
        ],
    )
    .await;
    assert_eq!(
        script.await.unwrap(),
        vec!["AUTHENTICATE PLAIN", "CAPABILITY"]
    );
}

#[tokio::test]
async fn starttls_without_capability_fails() {
    let notifier = Arc::new(Recorder::with_password("secret"));
    let (mailbox, script) = open_with(
        "{imap.example.com/tls}INBOX",
        Config::default(),
        "* OK [CAPABILITY IMAP4rev1] hello",
        vec![Command("LOGOUT", &["* BYE bye", "$ OK done"])],
        notifier,
    )
    .await;
    assert!(matches!(mailbox, Err(Error::Protocol(_))));
    assert_eq!(script.await.unwrap(), vec!["LOGOUT"]);
}

#[tokio::test]
async fn status_rejected_once_is_never_retried() {
    let (mailbox, script, _) = open(
        "{imap.example.com}",
        PREAUTH,
        vec![
            Command("STATUS Archive (MESSAGES UNSEEN)", &["$ BAD unknown command"]),
            Command(
                "EXAMINE Archive",
                &["* 4 EXISTS", "* 1 RECENT", "$ OK [READ-ONLY] done"],
            ),
            Command("SEARCH UNSEEN", &["* SEARCH 2 3", "$ OK"]),
            Command("CLOSE", &["$ OK"]),
            Command("EXAMINE Archive", &["* 6 EXISTS", "$ OK [READ-ONLY] done"]),
            Command("SEARCH UNSEEN", &["* SEARCH", "$ OK"]),
            Command("CLOSE", &["$ OK"]),
        ],
    )
    .await;
    let items = [StatusAttribute::Messages, StatusAttribute::Unseen];

    let first = mailbox.status("Archive", &items).await.unwrap();
    assert_eq!(first.messages, Some(4));
    assert_eq!(first.unseen, Some(2));

    let second = mailbox.status("Archive", &items).await.unwrap();
    assert_eq!(second.messages, Some(6));
    assert_eq!(second.unseen, Some(0));

    let commands = script.await.unwrap();
    assert_eq!(commands.iter().filter(|c| c.starts_with("STATUS")).count(), 1);
    mailbox
        .with_connection(|conn| {
            assert!(conn.state().caps.is_downgraded(CapFlags::STATUS));
            assert!(conn.state().protocol.is_authenticated());
            assert!(!conn.state().protocol.is_selected());
        })
        .await;
}

#[tokio::test]
async fn native_status() {
    let (mailbox, script, _) = open(
        "{imap.example.com}",
        PREAUTH,
        vec![Command(
            "STATUS Archive (UIDNEXT)",
            &["* STATUS Archive (UIDNEXT 17)", "$ OK"],
        )],
    )
    .await;
    let record = mailbox
        .status("Archive", &[StatusAttribute::UidNext])
        .await
        .unwrap();
    assert_eq!(record.mailbox, "Archive");
    assert_eq!(record.uid_next, Some(17));
    script.await.unwrap();
}

#[tokio::test]
async fn legacy_server_lists_with_find() {
    let (mailbox, script, _) = open(
        "{imap.example.com}",
        "* OK old server",
        vec![
            Command("CAPABILITY", &["$ BAD unknown command"]),
            Command("LOGIN fred secret", &["$ OK"]),
            Command(
                "FIND ALL.MAILBOXES *",
                &["* MAILBOX INBOX", "* MAILBOX Drafts", "$ OK"],
            ),
            Command("FIND MAILBOXES *", &["$ BAD unknown command"]),
        ],
    )
    .await;

    let names: Vec<String> = mailbox
        .list("", "*")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["INBOX", "Drafts"]);

    assert!(matches!(
        mailbox.lsub("", "*").await,
        Err(Error::InvalidState(_))
    ));
    script.await.unwrap();
    mailbox
        .with_connection(|conn| assert!(conn.state().caps.is_downgraded(CapFlags::RFC1176)))
        .await;
}

#[tokio::test]
async fn list_prefix_is_prepended() {
    let (mailbox, script, _) = open(
        "{imap.example.com}",
        PREAUTH,
        vec![Command(
            "LIST \"\" %",
            &["* LIST (\\Noselect) \"/\" Work", "$ OK"],
        )],
    )
    .await;
    mailbox
        .set_list_prefix(Some("{imap.example.com}".to_string()))
        .await;
    let entries = mailbox.list("", "%").await.unwrap();
    assert_eq!(entries[0].name, "{imap.example.com}Work");
    assert_eq!(entries[0].delimiter, Some('/'));
    script.await.unwrap();
}

#[tokio::test]
async fn untagged_data_is_applied_before_the_result() {
    let (mailbox, script, notifier) = open(
        "{imap.example.com}INBOX",
        PREAUTH,
        vec![
            select("3"),
            Command("NOOP", &["* 4 EXISTS", "* 1 RECENT", "$ OK done"]),
            Command("CHECK", &["* 5 EXISTS", "$ OK done"]),
        ],
    )
    .await;
    let mailbox = Arc::new(mailbox);
    assert!(mailbox.ping().await);
    assert_eq!(mailbox.exists().await, 4);
    mailbox.check().await.unwrap();
    assert_eq!(mailbox.exists().await, 5);

    let counts: Vec<String> = notifier
        .events()
        .into_iter()
        .filter(|e| e.starts_with("exists"))
        .collect();
    assert_eq!(counts, vec!["exists 3", "exists 4", "exists 5"]);
    script.await.unwrap();
}

#[tokio::test]
async fn concurrent_callers_are_serialized() {
    let (mailbox, script, _) = open(
        "{imap.example.com}INBOX",
        PREAUTH,
        vec![
            select("1"),
            Command("NOOP", &["* 2 EXISTS", "$ OK done"]),
            Command("NOOP", &["$ OK done"]),
        ],
    )
    .await;
    let mailbox = Arc::new(mailbox);
    let (a, b) = tokio::join!(mailbox.ping(), mailbox.ping());
    assert!(a && b);
    assert_eq!(mailbox.exists().await, 2);
    assert_eq!(script.await.unwrap().len(), 3);
}

#[tokio::test]
async fn move_keeps_copy_and_delete_together() {
    let (mailbox, script, _) = open(
        "{imap.example.com}INBOX",
        PREAUTH,
        vec![
            select("2"),
            Command("COPY 1:2 Archive", &["$ OK copied"]),
            Command("STORE 1:2 +FLAGS.SILENT (\\Deleted)", &["$ OK"]),
            Command("STORE 2 +FLAGS.SILENT (\\Seen)", &["$ OK"]),
        ],
    )
    .await;
    let both = SequenceSet::range(1, 2).unwrap();
    let second = SequenceSet::single(2).unwrap();
    let seen = Flags::from_vec(vec![Flag::Seen]);
    let (moved, flagged) = tokio::join!(
        mailbox.move_messages(&both, "Archive", false),
        mailbox.set_flag(&second, &seen, false)
    );
    moved.unwrap();
    flagged.unwrap();
    let sent = script.await.unwrap();
    assert_eq!(sent[1], "COPY 1:2 Archive");
    assert!(sent[2].contains("Deleted"));
    assert!(sent[3].contains("Seen"));
}

#[tokio::test]
async fn expunge_renumbers_before_following_fetch() {
    let (mailbox, script, notifier) = open(
        "{imap.example.com}INBOX",
        PREAUTH,
        vec![
            select("5"),
            Command(
                "FETCH 1:5 FLAGS",
                &[
                    "* 1 FETCH (UID 101 FLAGS ())",
                    "* 2 FETCH (UID 102 FLAGS ())",
                    "* 3 FETCH (UID 103 FLAGS ())",
                    "* 4 FETCH (UID 104 FLAGS ())",
                    "* 5 FETCH (UID 105 FLAGS ())",
                    "$ OK",
                ],
            ),
            Command(
                "NOOP",
                &["* 3 EXPUNGE", "* 3 FETCH (FLAGS (\\Seen))", "$ OK done"],
            ),
        ],
    )
    .await;
    mailbox
        .fetch_flags(&SequenceSet::range(1, 5).unwrap(), false)
        .await
        .unwrap();
    assert!(mailbox.ping().await);
    assert_eq!(mailbox.exists().await, 4);

    mailbox
        .with_connection(|conn| {
            let cache = conn.cache();
            assert_eq!(cache.len(), 4);
            let uids: Vec<u32> = (1..=4).filter_map(|n| cache.get(n)?.uid).collect();
            assert_eq!(uids, vec![101, 102, 104, 105]);
            assert_eq!(cache.get(3).unwrap().flags, SystemFlags::SEEN);
            assert!(cache.get(2).unwrap().flags.is_empty());
        })
        .await;
    assert!(notifier.events().contains(&"expunged 3".to_string()));
    script.await.unwrap();
}

#[tokio::test]
async fn nonmonotonic_uids_are_invalidated() {
    let (mailbox, script, notifier) = open(
        "{imap.example.com}INBOX",
        PREAUTH,
        vec![
            select("3"),
            Command("FETCH 3 UID", &["* 3 FETCH (UID 30)", "$ OK"]),
            Command(
                "FETCH 1:2 UID",
                &["* 1 FETCH (UID 40)", "* 2 FETCH (UID 41)", "$ OK"],
            ),
        ],
    )
    .await;
    assert_eq!(mailbox.uid(3).await.unwrap(), 30);
    assert_eq!(mailbox.uid(1).await.unwrap(), 40);
    mailbox
        .with_connection(|conn| {
            assert_eq!(conn.cache().get(2).unwrap().uid, Some(41));
            assert_eq!(conn.cache().get(3).unwrap().uid, None);
        })
        .await;
    assert!(notifier.events().iter().any(|e| e.contains("Non-ascending")));
    script.await.unwrap();
}

#[tokio::test]
async fn nonmonotonic_uids_kept_when_trusted() {
    let notifier = Arc::new(Recorder::default());
    let config = Config::builder()
        .uid_anomaly(UidAnomalyPolicy::TrustServer)
        .build();
    let (mailbox, script) = open_with(
        "{imap.example.com}INBOX",
        config,
        PREAUTH,
        vec![
            select("3"),
            Command("FETCH 3 UID", &["* 3 FETCH (UID 30)", "$ OK"]),
            Command(
                "FETCH 1:2 UID",
                &["* 1 FETCH (UID 40)", "* 2 FETCH (UID 41)", "$ OK"],
            ),
        ],
        notifier,
    )
    .await;
    let mailbox = mailbox.unwrap();
    mailbox.uid(3).await.unwrap();
    mailbox.uid(1).await.unwrap();
    mailbox
        .with_connection(|conn| assert_eq!(conn.cache().get(3).unwrap().uid, Some(30)))
        .await;
    script.await.unwrap();
}

#[tokio::test]
async fn msgno_falls_back_to_uid_fetch() {
    let (mailbox, script, _) = open(
        "{imap.example.com}INBOX",
        PREAUTH,
        vec![
            select("2"),
            Command("UID FETCH 77 UID", &["* 2 FETCH (UID 77)", "$ OK"]),
        ],
    )
    .await;
    assert_eq!(mailbox.msgno(77).await.unwrap(), Some(2));
    // answered from the cache
    assert_eq!(mailbox.msgno(77).await.unwrap(), Some(2));
    script.await.unwrap();
}

#[tokio::test]
async fn structure_fetch_prefetches_following_envelopes() {
    let (mailbox, script, _) = open(
        "{imap.example.com}INBOX",
        PREAUTH,
        vec![
            select("2"),
            Command(
                "FETCH 1:2 (FLAGS INTERNALDATE RFC822.SIZE ENVELOPE UID ...",
                &[
                    "* 1 FETCH (UID 5 FLAGS () ENVELOPE (\"Mon, 7 Feb 1994 21:52:25 -0800\" \"Lunch\" ((\"Fred\" NIL \"fred\" \"example.com\")) NIL NIL NIL NIL NIL NIL \"<1@example.com>\"))",
                    "* 2 FETCH (UID 6 FLAGS () ENVELOPE (NIL \"Re: Lunch\" NIL NIL NIL NIL NIL NIL NIL NIL))",
                    "$ OK",
                ],
            ),
        ],
    )
    .await;
    let (envelope, body) = mailbox.fetch_structure(1, false).await.unwrap();
    let envelope = envelope.unwrap();
    assert_eq!(envelope.subject.as_deref(), Some("Lunch"));
    assert_eq!(envelope.from[0].mailbox.as_deref(), Some("fred"));
    assert!(body.is_none());

    // already prefetched
    let (second, _) = mailbox.fetch_structure(2, false).await.unwrap();
    assert_eq!(second.unwrap().subject.as_deref(), Some("Re: Lunch"));
    assert_eq!(script.await.unwrap().len(), 2);
}

#[tokio::test]
async fn header_text_and_section_fetches() {
    let (mailbox, script, _) = open(
        "{imap.example.com}INBOX",
        PREAUTH,
        vec![
            select("1"),
            Command(
                "FETCH 1 BODY.PEEK[HEADER]",
                &["* 1 FETCH (BODY[HEADER] {13}\r\nSubject: hi\r\n)", "$ OK"],
            ),
            Command(
                "FETCH 1 BODY.PEEK[TEXT]",
                &["* 1 FETCH (BODY[TEXT] {5}\r\nhello)", "$ OK"],
            ),
            Command(
                "FETCH 1 BODY[1]<0.3>",
                &["* 1 FETCH (BODY[1]<0> {3}\r\nabc)", "$ OK"],
            ),
        ],
    )
    .await;
    assert_eq!(
        mailbox.fetch_header(1).await.unwrap(),
        Bytes::from_static(b"Subject: hi\r\n")
    );
    assert_eq!(
        mailbox.fetch_text(1, true).await.unwrap(),
        Bytes::from_static(b"hello")
    );
    // cached
    assert_eq!(
        mailbox.fetch_text(1, false).await.unwrap(),
        Bytes::from_static(b"hello")
    );
    assert_eq!(
        mailbox
            .fetch_section(1, "1", false, Some((0, 3)))
            .await
            .unwrap(),
        Some(Bytes::from_static(b"abc"))
    );
    assert_eq!(script.await.unwrap().len(), 4);
}

#[tokio::test]
async fn empty_section_is_not_nil() {
    let (mailbox, script, _) = open(
        "{imap.example.com}INBOX",
        PREAUTH,
        vec![
            select("1"),
            Command("FETCH 1 BODY[2]", &["* 1 FETCH (BODY[2] \"\")", "$ OK"]),
            Command("FETCH 1 BODY[3]", &["* 1 FETCH (BODY[3] NIL)", "$ OK"]),
        ],
    )
    .await;
    assert_eq!(
        mailbox.fetch_section(1, "2", false, None).await.unwrap(),
        Some(Bytes::new())
    );
    assert_eq!(mailbox.fetch_section(1, "3", false, None).await.unwrap(), None);
    script.await.unwrap();
}

#[tokio::test]
async fn silent_store_updates_cache_locally() {
    let (mailbox, script, notifier) = open(
        "{imap.example.com}INBOX",
        PREAUTH,
        vec![
            select("2"),
            Command("STORE 1:2 +FLAGS.SILENT (\\Seen \\Flagged)", &["$ OK"]),
            Command("STORE 2 -FLAGS.SILENT (\\Flagged)", &["$ OK"]),
        ],
    )
    .await;
    let flags = Flags::from_vec(vec![Flag::Seen, Flag::Flagged]);
    mailbox
        .set_flag(&SequenceSet::range(1, 2).unwrap(), &flags, false)
        .await
        .unwrap();
    let flagged = Flags::from_vec(vec![Flag::Flagged]);
    mailbox
        .clear_flag(&SequenceSet::single(2).unwrap(), &flagged, false)
        .await
        .unwrap();
    mailbox
        .with_connection(|conn| {
            let cache = conn.cache();
            assert_eq!(
                cache.get(1).unwrap().flags,
                SystemFlags::SEEN | SystemFlags::FLAGGED
            );
            assert_eq!(cache.get(2).unwrap().flags, SystemFlags::SEEN);
        })
        .await;
    let flag_events = notifier
        .events()
        .into_iter()
        .filter(|e| e.starts_with("flags"))
        .count();
    assert_eq!(flag_events, 3);
    script.await.unwrap();
}

#[tokio::test]
async fn append_sends_message_as_literal() {
    let (mailbox, script, _) = open(
        "{imap.example.com}",
        PREAUTH,
        vec![Command(
            "APPEND Drafts (\\Seen) {16}\r\nSubject: x\r\n\r\nhi",
            &["$ OK APPEND completed"],
        )],
    )
    .await;
    mailbox
        .append(
            "Drafts",
            Bytes::from_static(b"Subject: x\r\n\r\nhi"),
            Some(Flags::from_vec(vec![Flag::Seen])),
            None,
        )
        .await
        .unwrap();
    script.await.unwrap();
}

#[tokio::test]
async fn copy_to_missing_mailbox_reports_trycreate() {
    let (mailbox, script, notifier) = open(
        "{imap.example.com}INBOX",
        PREAUTH,
        vec![
            select("1"),
            Command("COPY 1 Nowhere", &["$ NO [TRYCREATE] no such mailbox"]),
        ],
    )
    .await;
    let err = mailbox
        .copy(&SequenceSet::single(1).unwrap(), "Nowhere", false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::No(_)));
    assert!(
        notifier
            .events()
            .contains(&"Warn Mailbox Nowhere does not exist".to_string())
    );
    script.await.unwrap();
}

#[tokio::test]
async fn sort_falls_back_to_client_side() {
    let (mailbox, script, _) = open(
        "{imap.example.com}INBOX",
        "* PREAUTH [CAPABILITY IMAP4rev1 SORT] ready",
        vec![
            select("3"),
            Command("SORT (SIZE) US-ASCII ALL", &["$ BAD not today"]),
            Command("SEARCH ALL", &["* SEARCH 1 2 3", "$ OK"]),
            Command(
                "FETCH 1:3 (INTERNALDATE RFC822.SIZE)",
                &[
                    "* 1 FETCH (INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" RFC822.SIZE 900)",
                    "* 2 FETCH (INTERNALDATE \"17-Jul-1996 02:44:26 -0700\" RFC822.SIZE 100)",
                    "* 3 FETCH (INTERNALDATE \"17-Jul-1996 02:44:27 -0700\" RFC822.SIZE 500)",
                    "$ OK",
                ],
            ),
            Command("SEARCH ALL", &["* SEARCH 1 2 3", "$ OK"]),
        ],
    )
    .await;
    let order = mailbox
        .sort(
            "US-ASCII",
            &SearchProgram::all(),
            &SortProgram::by(SortKey::Size),
            false,
        )
        .await
        .unwrap();
    assert_eq!(order, vec![2, 3, 1]);

    // SORT stays off; data comes from the cache
    let reversed = mailbox
        .sort(
            "US-ASCII",
            &SearchProgram::all(),
            &SortProgram::default().then(SortKey::Arrival, true),
            false,
        )
        .await
        .unwrap();
    assert_eq!(reversed, vec![3, 2, 1]);
    assert_eq!(script.await.unwrap().len(), 5);
}

#[tokio::test]
async fn threads_by_subject_without_server_support() {
    let (mailbox, script, _) = open(
        "{imap.example.com}INBOX",
        PREAUTH,
        vec![
            select("3"),
            Command("SEARCH ALL", &["* SEARCH 1 2 3", "$ OK"]),
            Command(
                "FETCH 1:3 (INTERNALDATE RFC822.SIZE ENVELOPE)",
                &[
                    "* 1 FETCH (INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" RFC822.SIZE 1 ENVELOPE (\"Mon, 7 Feb 1994 21:52:25 -0800\" \"Lunch\" NIL NIL NIL NIL NIL NIL NIL NIL))",
                    "* 2 FETCH (INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" RFC822.SIZE 1 ENVELOPE (\"Mon, 7 Feb 1994 20:00:00 -0800\" \"Meeting\" NIL NIL NIL NIL NIL NIL NIL NIL))",
                    "* 3 FETCH (INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" RFC822.SIZE 1 ENVELOPE (\"Tue, 8 Feb 1994 09:00:00 -0800\" \"Re: Lunch\" NIL NIL NIL NIL NIL NIL NIL NIL))",
                    "$ OK",
                ],
            ),
        ],
    )
    .await;
    let threads = mailbox
        .thread(
            &ThreadAlgorithm::References,
            "US-ASCII",
            &SearchProgram::all(),
            false,
        )
        .await
        .unwrap();
    let shapes: Vec<Vec<u32>> = threads.iter().map(mailwire_imap::ThreadNode::messages).collect();
    assert_eq!(shapes, vec![vec![2], vec![1, 3]]);
    script.await.unwrap();
}

#[tokio::test]
async fn rejected_thread_is_never_retried() {
    let (mailbox, script, _) = open(
        "{imap.example.com}INBOX",
        "* PREAUTH [CAPABILITY IMAP4rev1 THREAD=ORDEREDSUBJECT] ready",
        vec![
            select("3"),
            Command("THREAD ORDEREDSUBJECT US-ASCII ALL", &["$ BAD not today"]),
            Command("SEARCH ALL", &["* SEARCH 1 2 3", "$ OK"]),
            Command(
                "FETCH 1:3 (INTERNALDATE RFC822.SIZE ENVELOPE)",
                &[
                    "* 1 FETCH (INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" RFC822.SIZE 1 ENVELOPE (\"Mon, 7 Feb 1994 21:52:25 -0800\" \"Lunch\" NIL NIL NIL NIL NIL NIL NIL NIL))",
                    "* 2 FETCH (INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" RFC822.SIZE 1 ENVELOPE (\"Mon, 7 Feb 1994 20:00:00 -0800\" \"Meeting\" NIL NIL NIL NIL NIL NIL NIL NIL))",
                    "* 3 FETCH (INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" RFC822.SIZE 1 ENVELOPE (\"Tue, 8 Feb 1994 09:00:00 -0800\" \"Re: Lunch\" NIL NIL NIL NIL NIL NIL NIL NIL))",
                    "$ OK",
                ],
            ),
            Command("SEARCH ALL", &["* SEARCH 1 2 3", "$ OK"]),
        ],
    )
    .await;
    for _ in 0..2 {
        let threads = mailbox
            .thread(
                &ThreadAlgorithm::OrderedSubject,
                "US-ASCII",
                &SearchProgram::all(),
                false,
            )
            .await
            .unwrap();
        let shapes: Vec<Vec<u32>> =
            threads.iter().map(mailwire_imap::ThreadNode::messages).collect();
        assert_eq!(shapes, vec![vec![2], vec![1, 3]]);
    }
    let sent = script.await.unwrap();
    assert_eq!(sent.iter().filter(|c| c.starts_with("THREAD")).count(), 1);
}

#[tokio::test]
async fn dropped_connection_poisons_session() {
    let (mailbox, script, notifier) = open(
        "{imap.example.com}INBOX",
        PREAUTH,
        vec![select("1"), Command("NOOP", &[])],
    )
    .await;

    assert!(!mailbox.ping().await);
    script.await.unwrap();
    assert!(matches!(
        mailbox.check().await,
        Err(Error::ConnectionBroken(_))
    ));
    assert!(
        notifier
            .events()
            .iter()
            .any(|e| e.starts_with("Error IMAP connection broken"))
    );
    // close after death is quiet
    mailbox.close(false).await.unwrap();
}

#[tokio::test]
async fn close_expunges_and_logs_out() {
    let (mailbox, script, _) = open(
        "{imap.example.com}INBOX",
        PREAUTH,
        vec![
            select("1"),
            Command("CLOSE", &["$ OK"]),
            Command("LOGOUT", &["* BYE see you", "$ OK"]),
        ],
    )
    .await;
    let driver: Box<dyn MailDriver> = Box::new(mailbox);
    assert_eq!(driver.driver_name(), "imap");
    driver.close(true).await.unwrap();
    assert_eq!(script.await.unwrap(), vec!["SELECT INBOX", "CLOSE", "LOGOUT"]);
}
