//! Classification of untagged replies into typed values.

use bytes::Bytes;

use super::cursor::{Cursor, Diagnostic, is_atom_char};
use super::reply::{Reply, split_code};
use super::structure::{parse_body, parse_envelope, parse_namespaces, parse_threads, skip_extension};
use crate::types::{
    Body, Capability, Envelope, Flag, Flags, ListAttributes, ListEntry, Namespaces, ResponseCode,
    Section, StatusRecord, Status, ThreadNode,
};

/// One FETCH property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// FLAGS.
    Flags(Flags),
    /// INTERNALDATE, as sent.
    InternalDate(String),
    /// RFC822.SIZE.
    Rfc822Size(u32),
    /// UID.
    Uid(u32),
    /// ENVELOPE.
    Envelope(Box<Envelope>),
    /// BODY or BODYSTRUCTURE (structure form).
    Body(Box<Body>),
    /// RFC822 (the whole message).
    Rfc822(Option<Bytes>),
    /// RFC822.HEADER.
    Rfc822Header(Option<Bytes>),
    /// RFC822.TEXT.
    Rfc822Text(Option<Bytes>),
    /// BODY[section]<origin>.
    BodySection {
        /// The section fetched.
        section: Section,
        /// Partial-fetch origin, if any.
        origin: Option<u32>,
        /// Contents; `None` for NIL.
        data: Option<Bytes>,
    },
}

/// A typed untagged reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Untagged {
    /// `n EXISTS`.
    Exists(u32),
    /// `n RECENT`.
    Recent(u32),
    /// `n EXPUNGE`.
    Expunge(u32),
    /// `n FETCH (...)` or the old `n STORE (...)`.
    Fetch {
        /// Message sequence number.
        seq: u32,
        /// Properties, in wire order.
        items: Vec<FetchItem>,
    },
    /// `FLAGS (...)`: the mailbox's defined flags.
    Flags(Flags),
    /// `SEARCH n n ...`.
    Search(Vec<u32>),
    /// `SORT n n ...`.
    Sort(Vec<u32>),
    /// `THREAD (...)(...)`.
    Thread(Vec<ThreadNode>),
    /// `STATUS mailbox (...)`.
    Status(StatusRecord),
    /// `LIST`.
    List(ListEntry),
    /// `LSUB`.
    Lsub(ListEntry),
    /// `MAILBOX name` from an IMAP2bis FIND.
    Mailbox(ListEntry),
    /// `NAMESPACE`.
    Namespace(Namespaces),
    /// `CAPABILITY`.
    Capability(Vec<Capability>),
    /// `OK`/`NO`/`BAD`/`BYE`/`PREAUTH` with optional code.
    Condition {
        /// Status keyword.
        status: Status,
        /// Bracketed code, if any.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Message data the engine has no use for (`n COPY` and the like).
    Ignored(String),
    /// Anything unrecognized.
    Unknown(String),
}

impl Untagged {
    /// Classifies an untagged reply. Diagnostics from structure parsing
    /// are returned alongside; they never prevent a result.
    #[must_use]
    pub fn from_reply(reply: &Reply) -> (Self, Vec<Diagnostic>) {
        let mut c = Cursor::new(reply.text.clone());
        let parsed = if let Ok(n) = reply.keyword.parse::<u32>() {
            message_data(n, &mut c)
        } else {
            mailbox_data(&reply.keyword, &reply.text, &mut c)
        };
        (parsed, c.take_diagnostics())
    }
}

fn message_data(n: u32, c: &mut Cursor) -> Untagged {
    let keyword = c
        .take_while(|b| b != b' ')
        .to_ascii_uppercase();
    c.skip_spaces();
    match keyword.as_slice() {
        b"EXISTS" => Untagged::Exists(n),
        b"RECENT" => Untagged::Recent(n),
        b"EXPUNGE" if n > 0 => Untagged::Expunge(n),
        b"FETCH" | b"STORE" if n > 0 => Untagged::Fetch {
            seq: n,
            items: parse_fetch(c),
        },
        b"COPY" => Untagged::Ignored("COPY".into()),
        b"EXPUNGE" | b"FETCH" | b"STORE" => {
            c.diagnose("message number zero");
            Untagged::Unknown(String::from_utf8_lossy(&keyword).into_owned())
        }
        other => Untagged::Unknown(format!("{n} {}", String::from_utf8_lossy(other))),
    }
}

fn mailbox_data(keyword: &str, text: &Bytes, c: &mut Cursor) -> Untagged {
    if let Some(status) = Status::from_keyword(keyword) {
        let (code, text) = split_code(text);
        return Untagged::Condition {
            status,
            code: code.map(|s| ResponseCode::parse(&s)),
            text,
        };
    }
    match keyword {
        "CAPABILITY" => Untagged::Capability(
            String::from_utf8_lossy(text)
                .split_whitespace()
                .map(Capability::parse)
                .collect(),
        ),
        "FLAGS" => Untagged::Flags(parse_flag_list(c)),
        "SEARCH" => Untagged::Search(parse_numbers(c)),
        "SORT" => Untagged::Sort(parse_numbers(c)),
        "THREAD" => Untagged::Thread(parse_threads(c)),
        "STATUS" => Untagged::Status(parse_status(c)),
        "LIST" => Untagged::List(parse_list_entry(c)),
        "LSUB" => Untagged::Lsub(parse_list_entry(c)),
        "MAILBOX" => Untagged::Mailbox(ListEntry {
            attributes: ListAttributes::empty(),
            delimiter: None,
            name: c.read_astring_text().unwrap_or_default(),
        }),
        "NAMESPACE" => Untagged::Namespace(parse_namespaces(c)),
        other => Untagged::Unknown(other.to_string()),
    }
}

/// Parses a parenthesized flag list.
pub fn parse_flag_list(c: &mut Cursor) -> Flags {
    c.skip_spaces();
    let mut flags = Flags::new();
    if !c.expect(b'(') {
        c.skip_token();
        return flags;
    }
    loop {
        c.skip_spaces();
        match c.peek() {
            Some(b')') => {
                c.advance();
                break;
            }
            None => {
                c.diagnose("unterminated flag list");
                break;
            }
            Some(_) => {
                if let Some(atom) = c.read_atom() {
                    flags.insert(Flag::parse(&atom));
                }
            }
        }
    }
    flags
}

fn parse_numbers(c: &mut Cursor) -> Vec<u32> {
    let mut out = Vec::new();
    loop {
        c.skip_spaces();
        match c.peek() {
            None => break,
            Some(b) if b.is_ascii_digit() => out.extend(c.read_number()),
            Some(_) => {
                c.diagnose("not a message number");
                c.advance();
                c.skip_token();
            }
        }
    }
    out
}

fn parse_status(c: &mut Cursor) -> StatusRecord {
    let mut record = StatusRecord {
        mailbox: c.read_astring_text().unwrap_or_default(),
        ..StatusRecord::default()
    };
    c.skip_spaces();
    if !c.expect(b'(') {
        return record;
    }
    loop {
        c.skip_spaces();
        match c.peek() {
            Some(b')') | None => break,
            Some(_) => {}
        }
        let Some(name) = c.read_atom() else {
            continue;
        };
        c.skip_spaces();
        let Some(value) = c.read_number() else {
            continue;
        };
        let slot = match name.to_ascii_uppercase().as_str() {
            "MESSAGES" => &mut record.messages,
            "RECENT" => &mut record.recent,
            "UNSEEN" => &mut record.unseen,
            "UIDNEXT" => &mut record.uid_next,
            "UIDVALIDITY" => &mut record.uid_validity,
            _ => {
                c.diagnose("unknown status attribute");
                continue;
            }
        };
        *slot = Some(value);
    }
    c.expect(b')');
    record
}

fn parse_list_entry(c: &mut Cursor) -> ListEntry {
    let mut attributes = ListAttributes::empty();
    if c.expect(b'(') {
        loop {
            c.skip_spaces();
            match c.peek() {
                Some(b')') => {
                    c.advance();
                    break;
                }
                None => break,
                Some(_) => {
                    if let Some(atom) = c.read_atom() {
                        attributes |= ListAttributes::from_atom(&atom);
                    }
                }
            }
        }
    }
    c.skip_spaces();
    let delimiter = c.read_nstring_text().and_then(|d| d.chars().next());
    c.skip_spaces();
    let name = c.read_astring_text().unwrap_or_default();
    ListEntry {
        attributes,
        delimiter,
        name,
    }
}

/// Parses a FETCH property list `(NAME value NAME value ...)`.
///
/// Unknown properties are diagnosed and their values skipped; the rest of
/// the list is still read.
pub fn parse_fetch(c: &mut Cursor) -> Vec<FetchItem> {
    let mut items = Vec::new();
    c.skip_spaces();
    if !c.expect(b'(') {
        return items;
    }
    loop {
        c.skip_spaces();
        match c.peek() {
            Some(b')') => {
                c.advance();
                break;
            }
            None => {
                c.diagnose("unterminated FETCH list");
                break;
            }
            Some(_) => {}
        }
        let name = c.take_while(is_atom_char).to_ascii_uppercase();
        if name.is_empty() {
            c.diagnose("expected FETCH property name");
            c.advance();
            c.skip_token();
            continue;
        }
        let section = if c.eat(b'[') {
            let spec = c.take_while(|b| b != b']');
            c.expect(b']');
            Some(String::from_utf8_lossy(&spec).into_owned())
        } else {
            None
        };
        let origin = if c.eat(b'<') {
            let n = c.read_number();
            c.expect(b'>');
            n
        } else {
            None
        };
        c.skip_spaces();
        if let Some(item) = fetch_value(&name, section, origin, c) {
            items.push(item);
        }
    }
    items
}

fn fetch_value(
    name: &[u8],
    section: Option<String>,
    origin: Option<u32>,
    c: &mut Cursor,
) -> Option<FetchItem> {
    match (name, section) {
        (b"BODY", Some(spec)) => {
            let data = c.read_nstring();
            match spec.parse::<Section>() {
                Ok(section) => Some(FetchItem::BodySection {
                    section,
                    origin,
                    data,
                }),
                Err(_) => {
                    c.diagnose("unusable body section");
                    None
                }
            }
        }
        (b"FLAGS", None) => Some(FetchItem::Flags(parse_flag_list(c))),
        (b"UID", None) => c.read_number().map(FetchItem::Uid),
        (b"RFC822.SIZE", None) => c.read_number().map(FetchItem::Rfc822Size),
        (b"INTERNALDATE", None) => c.read_nstring_text().map(FetchItem::InternalDate),
        (b"ENVELOPE", None) => parse_envelope(c).map(|e| FetchItem::Envelope(Box::new(e))),
        (b"BODY" | b"BODYSTRUCTURE", None) => parse_body(c).map(|b| FetchItem::Body(Box::new(b))),
        (b"RFC822", None) => Some(FetchItem::Rfc822(c.read_nstring())),
        (b"RFC822.HEADER", None) => Some(FetchItem::Rfc822Header(c.read_nstring())),
        (b"RFC822.TEXT", None) => Some(FetchItem::Rfc822Text(c.read_nstring())),
        _ => {
            c.diagnose(&format!(
                "unknown FETCH property {}",
                String::from_utf8_lossy(name)
            ));
            skip_extension(c);
            None
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
    use super::*;
    use crate::types::{CapFlags, SectionPart, SystemFlags};

    fn classify(line: &str) -> (Untagged, Vec<Diagnostic>) {
        let reply = Reply::parse(Bytes::copy_from_slice(line.as_bytes())).unwrap();
        Untagged::from_reply(&reply)
    }

    #[test]
    fn message_counts() {
        assert_eq!(classify("* 23 EXISTS").0, Untagged::Exists(23));
        assert_eq!(classify("* 1 recent").0, Untagged::Recent(1));
        assert_eq!(classify("* 3 EXPUNGE").0, Untagged::Expunge(3));
        assert!(matches!(classify("* 0 EXPUNGE").0, Untagged::Unknown(_)));
    }

    #[test]
    fn fetch_properties() {
        let (u, diags) = classify(
            "* 12 FETCH (FLAGS (\\Seen $Work) UID 4827 RFC822.SIZE 44827 INTERNALDATE \"17-Jul-1996 02:44:25 -0700\")",
        );
        assert!(diags.is_empty());
        let Untagged::Fetch { seq, items } = u else {
            panic!("not a fetch");
        };
        assert_eq!(seq, 12);
        let FetchItem::Flags(flags) = &items[0] else {
            panic!("flags first");
        };
        assert_eq!(flags.system(), SystemFlags::SEEN);
        assert_eq!(flags.keywords().collect::<Vec<_>>(), vec!["$Work"]);
        assert_eq!(items[1], FetchItem::Uid(4827));
        assert_eq!(items[2], FetchItem::Rfc822Size(44827));
        assert!(matches!(&items[3], FetchItem::InternalDate(d) if d.starts_with("17-Jul")));
    }

    #[test]
    fn unknown_fetch_property_is_skipped() {
        let (u, diags) = classify("* 1 FETCH (X-GM-LABELS (\"a\" \"b\") UID 9)");
        assert_eq!(diags.len(), 1);
        assert_eq!(
            u,
            Untagged::Fetch {
                seq: 1,
                items: vec![FetchItem::Uid(9)]
            }
        );
    }

    #[test]
    fn body_section_with_literal_and_origin() {
        let (u, _) = classify("* 2 FETCH (BODY[1.2.MIME]<0> {4}\r\nab\r\n UID 5)");
        let Untagged::Fetch { items, .. } = u else {
            panic!("not a fetch");
        };
        let FetchItem::BodySection {
            section,
            origin,
            data,
        } = &items[0]
        else {
            panic!("not a section");
        };
        assert_eq!(section.path, vec![1, 2]);
        assert_eq!(section.part, SectionPart::Mime);
        assert_eq!(*origin, Some(0));
        assert_eq!(data.as_deref(), Some(&b"ab\r\n"[..]));
        assert_eq!(items[1], FetchItem::Uid(5));
    }

    #[test]
    fn header_fields_section() {
        let (u, _) = classify(
            "* 2 FETCH (BODY[HEADER.FIELDS (NEWSGROUPS REFERENCES)] {2}\r\n\r\n)",
        );
        let Untagged::Fetch { items, .. } = u else {
            panic!("not a fetch");
        };
        assert!(matches!(
            &items[0],
            FetchItem::BodySection { section, .. }
                if section.part == SectionPart::HeaderFields(vec!["NEWSGROUPS".into(), "REFERENCES".into()])
        ));
    }

    #[test]
    fn status_and_list() {
        let (u, _) = classify("* STATUS \"Sent Items\" (MESSAGES 231 UIDNEXT 44292)");
        let Untagged::Status(record) = u else {
            panic!("not status");
        };
        assert_eq!(record.mailbox, "Sent Items");
        assert_eq!(record.messages, Some(231));
        assert_eq!(record.uid_next, Some(44292));
        assert_eq!(record.unseen, None);

        let (u, _) = classify("* LIST (\\Noselect \\HasChildren) \"/\" {4}\r\nfoo ");
        let Untagged::List(entry) = u else {
            panic!("not list");
        };
        assert!(entry.attributes.contains(ListAttributes::NOSELECT));
        assert_eq!(entry.delimiter, Some('/'));
        assert_eq!(entry.name, "foo ");

        let (u, _) = classify("* LSUB () NIL INBOX");
        assert!(matches!(u, Untagged::Lsub(ListEntry { delimiter: None, .. })));
    }

    #[test]
    fn conditions_and_capabilities() {
        let (u, _) = classify("* OK [UIDVALIDITY 3857529045] UIDs valid");
        assert_eq!(
            u,
            Untagged::Condition {
                status: Status::Ok,
                code: Some(ResponseCode::UidValidity(3857529045)),
                text: "UIDs valid".into(),
            }
        );
        let (u, _) = classify("* CAPABILITY IMAP4rev1 SORT THREAD=REFERENCES AUTH=PLAIN");
        let Untagged::Capability(caps) = u else {
            panic!("not capability");
        };
        let mut set = crate::types::CapabilitySet::new();
        set.apply(&caps);
        assert!(set.has(CapFlags::SORT));
        assert!(set.has_thread("REFERENCES"));
    }

    #[test]
    fn search_and_unknown() {
        assert_eq!(classify("* SEARCH 2 84 882").0, Untagged::Search(vec![2, 84, 882]));
        assert_eq!(classify("* SEARCH").0, Untagged::Search(vec![]));
        assert_eq!(classify("* XYZZY foo").0, Untagged::Unknown("XYZZY".into()));
    }
}
