//! Integration tests for the public parsing and encoding API.

#![allow(clippy::unwrap_used)]

use bytes::Bytes;

use mailwire_imap::command::Fragment;
use mailwire_imap::parser::{FetchItem, ReplyTag, Untagged};
use mailwire_imap::types::{Capability, CapabilitySet, ListAttributes, Security};
use mailwire_imap::{
    CapFlags, Command, FetchAttribute, FetchItems, Flag, Flags, MailboxSpec, ProtocolLevel, Reply,
    ResponseCode, SequenceSet, Status, StoreMode,
};

fn reply(line: &'static str) -> Reply {
    Reply::parse(Bytes::from_static(line.as_bytes())).unwrap()
}

fn untagged(line: &'static str) -> Untagged {
    let (data, diagnostics) = Untagged::from_reply(&reply(line));
    assert!(diagnostics.is_empty(), "diagnostics for {line}: {diagnostics:?}");
    data
}

#[test]
fn tagged_reply_splits_code_from_text() {
    let r = reply("A0001 OK [READ-WRITE] SELECT completed");
    assert_eq!(r.tag, ReplyTag::Tagged("A0001".into()));
    assert!(r.has_tag("A0001"));
    assert_eq!(r.status(), Some(Status::Ok));
    assert_eq!(r.code(), Some(ResponseCode::ReadWrite));
    assert_eq!(r.human_text(), "SELECT completed");
}

#[test]
fn keyword_is_case_folded() {
    let r = reply("a7 no Mailbox in use");
    assert_eq!(r.status(), Some(Status::No));
    assert!(r.into_result().is_err());
}

#[test]
fn continuation_keeps_its_text() {
    let r = reply("+ Ready for literal");
    assert_eq!(r.tag, ReplyTag::Continuation);
    assert_eq!(&r.text[..], b"Ready for literal");
}

#[test]
fn closed_reply_is_recognized() {
    let r = Reply::closed("A0042");
    assert!(r.is_closed());
    assert!(r.has_tag("A0042"));
    assert_eq!(r.code(), Some(ResponseCode::Closed));
    assert!(r.into_result().is_err());
}

#[test]
fn empty_line_is_a_protocol_error() {
    assert!(Reply::parse(Bytes::new()).is_err());
}

#[test]
fn message_data_is_classified() {
    assert_eq!(untagged("* 23 EXISTS"), Untagged::Exists(23));
    assert_eq!(untagged("* 2 RECENT"), Untagged::Recent(2));
    assert_eq!(untagged("* 5 EXPUNGE"), Untagged::Expunge(5));
    assert_eq!(untagged("* SEARCH 2 3 5"), Untagged::Search(vec![2, 3, 5]));
}

#[test]
fn fetch_items_keep_wire_order() {
    let Untagged::Fetch { seq, items } = untagged("* 12 FETCH (FLAGS (\\Seen) UID 100)") else {
        panic!("expected FETCH");
    };
    assert_eq!(seq, 12);
    assert_eq!(items.len(), 2);
    let FetchItem::Flags(flags) = &items[0] else {
        panic!("expected FLAGS first");
    };
    assert!(flags.contains(&Flag::Seen));
    assert_eq!(items[1], FetchItem::Uid(100));
}

#[test]
fn old_store_echo_is_treated_as_fetch() {
    assert!(matches!(
        untagged("* 4 STORE (FLAGS (\\Deleted))"),
        Untagged::Fetch { seq: 4, .. }
    ));
}

#[test]
fn zero_message_number_is_diagnosed() {
    let (data, diagnostics) = Untagged::from_reply(&reply("* 0 EXPUNGE"));
    assert!(matches!(data, Untagged::Unknown(_)));
    assert!(!diagnostics.is_empty());
}

#[test]
fn list_entry_parses_attributes_and_delimiter() {
    let Untagged::List(entry) = untagged("* LIST (\\Noselect \\HasChildren) \"/\" \"Archive\"")
    else {
        panic!("expected LIST");
    };
    assert!(entry.attributes.contains(ListAttributes::NOSELECT));
    assert!(entry.attributes.contains(ListAttributes::HAS_CHILDREN));
    assert_eq!(entry.delimiter, Some('/'));
    assert_eq!(entry.name, "Archive");
}

#[test]
fn flat_namespace_has_no_delimiter() {
    let Untagged::Lsub(entry) = untagged("* LSUB () NIL INBOX") else {
        panic!("expected LSUB");
    };
    assert_eq!(entry.delimiter, None);
    assert_eq!(entry.name, "INBOX");
}

#[test]
fn find_mailbox_reply_becomes_entry() {
    let Untagged::Mailbox(entry) = untagged("* MAILBOX lists/rust") else {
        panic!("expected MAILBOX");
    };
    assert_eq!(entry.name, "lists/rust");
    assert!(entry.attributes.is_empty());
}

#[test]
fn status_record_leaves_unrequested_fields_empty() {
    let Untagged::Status(record) = untagged("* STATUS INBOX (MESSAGES 17 UNSEEN 3)") else {
        panic!("expected STATUS");
    };
    assert_eq!(record.mailbox, "INBOX");
    assert_eq!(record.messages, Some(17));
    assert_eq!(record.unseen, Some(3));
    assert_eq!(record.recent, None);
    assert_eq!(record.uid_next, None);
}

#[test]
fn untagged_condition_carries_its_code() {
    let Untagged::Condition { status, code, text } = untagged("* OK [UIDVALIDITY 3857529045] UIDs valid")
    else {
        panic!("expected condition");
    };
    assert_eq!(status, Status::Ok);
    assert_eq!(code, Some(ResponseCode::UidValidity(3_857_529_045)));
    assert_eq!(text, "UIDs valid");
}

#[test]
fn capability_reply_drives_protocol_level() {
    let Untagged::Capability(caps) = untagged("* CAPABILITY IMAP4rev1 SORT THREAD=REFERENCES AUTH=PLAIN")
    else {
        panic!("expected CAPABILITY");
    };
    assert!(caps.contains(&Capability::Imap4Rev1));
    assert!(caps.contains(&Capability::Auth("PLAIN".into())));

    let mut set = CapabilitySet::new();
    set.apply(&caps);
    assert_eq!(set.level(), ProtocolLevel::Imap4Rev1);
    assert!(set.has(CapFlags::STATUS));
    assert!(set.has(CapFlags::IMAP2BIS));
    assert!(set.has_thread("references"));
    assert!(!set.has_thread("ORDEREDSUBJECT"));
}

#[test]
fn downgrade_survives_a_fresh_capability_list() {
    let mut set = CapabilitySet::new();
    set.apply(&[Capability::Imap4Rev1, Capability::Sort]);
    set.downgrade(CapFlags::SORT);
    set.apply(&[Capability::Imap4Rev1, Capability::Sort]);
    assert!(!set.has(CapFlags::SORT));
    assert!(set.is_downgraded(CapFlags::SORT));
}

#[test]
fn rejected_capability_means_legacy_server() {
    let mut set = CapabilitySet::new();
    set.assume_legacy();
    assert_eq!(set.level(), ProtocolLevel::Imap2Bis);
    assert!(set.has(CapFlags::RFC1176));
    assert!(set.raw().is_empty());
}

#[test]
fn mailbox_spec_parses_switches() {
    let spec = MailboxSpec::parse("{mail.example.org:1143/imap4/user=fred/tls/readonly}lists/rust")
        .unwrap();
    assert_eq!(spec.host, "mail.example.org");
    assert_eq!(spec.port, Some(1143));
    assert_eq!(spec.user.as_deref(), Some("fred"));
    assert_eq!(spec.security, Security::StartTls);
    assert!(spec.read_only);
    assert_eq!(spec.mailbox, "lists/rust");
    assert_eq!(
        spec.canonical_name("mail.example.org", 1143, 143),
        "{mail.example.org:1143/imap4/user=fred}lists/rust"
    );
}

#[test]
fn mailbox_spec_rejects_garbage() {
    assert!(MailboxSpec::parse("INBOX").is_err());
    assert!(MailboxSpec::parse("{}INBOX").is_err());
    assert!(MailboxSpec::parse("{host/bogus}INBOX").is_err());
    assert!(MailboxSpec::parse("{host:port}INBOX").is_err());
}

#[test]
fn ssl_switch_picks_tls_port() {
    let spec = MailboxSpec::parse("{imap.example.com/ssl}").unwrap();
    assert_eq!(spec.effective_port(143, 993), 993);
    assert!(!spec.has_mailbox());
}

#[test]
fn sequence_set_compacts_runs() {
    let set = SequenceSet::from_numbers(&[7, 1, 2, 3, 0, 9, 8, 3]).unwrap();
    assert_eq!(set.to_string(), "1:3,7:9");
    assert!(set.contains(8, 9));
    assert!(!set.contains(5, 9));
    assert!(SequenceSet::from_numbers(&[0]).is_none());
}

#[test]
fn long_fetch_is_split_into_valid_commands() {
    let numbers: Vec<u32> = (1..=400).map(|n| n * 2).collect();
    let cmd = Command::Fetch {
        sequence: SequenceSet::from_numbers(&numbers).unwrap(),
        items: FetchItems::Items(vec![FetchAttribute::Flags]),
        uid: false,
    };
    let parts = cmd.split_sequence(100);
    assert!(parts.len() > 1);
    let mut seen = Vec::new();
    for part in &parts {
        let Command::Fetch { sequence, .. } = part else {
            panic!("split changed the command");
        };
        assert!(sequence.to_string().len() <= 100);
        seen.extend(numbers.iter().copied().filter(|&n| sequence.contains(n, 800)));
    }
    assert_eq!(seen, numbers);
}

#[test]
fn login_password_is_masked_in_display() {
    let cmd = Command::Login {
        username: "fred".into(),
        password: "hunter2".into(),
    }
    .encode("A0001");
    assert!(!cmd.display.contains("hunter2"));
    assert!(String::from_utf8(cmd.to_bytes()).unwrap().contains("hunter2"));
}

#[test]
fn uid_store_encodes_silent_form() {
    let cmd = Command::Store {
        sequence: SequenceSet::range(1, 4).unwrap(),
        mode: StoreMode::Add,
        flags: Flags::from_vec(vec![Flag::Deleted]),
        silent: true,
        uid: true,
    }
    .encode("A0003");
    assert_eq!(
        cmd.to_bytes(),
        b"A0003 UID STORE 1:4 +FLAGS.SILENT (\\Deleted)\r\n".to_vec()
    );
}

#[test]
fn append_sends_message_after_literal_header() {
    let cmd = Command::Append {
        mailbox: "Sent".into(),
        flags: None,
        date: None,
        message: Bytes::from_static(b"Subject: hi\r\n\r\nbody"),
    }
    .encode("A0009");
    assert!(cmd.has_literal());
    let Fragment::Line(first) = &cmd.fragments[0] else {
        panic!("command must open with a line");
    };
    assert!(first.ends_with(b"{19}\r\n"));
    assert!(matches!(cmd.fragments[1], Fragment::Literal(_)));
}
