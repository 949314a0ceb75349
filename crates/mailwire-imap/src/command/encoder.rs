//! Wire encoding of typed command arguments.
//!
//! A command is rendered into a list of fragments. Plain text accumulates
//! into a line fragment; a literal closes the current line after its
//! `{n}` marker and becomes a fragment of its own, so the driver can wait
//! for the server's `+` before sending the payload.

use bytes::{BufMut, Bytes, BytesMut};

use super::search::{SearchProgram, SortProgram};
use super::types::{FetchAttribute, FetchItems};
use crate::types::{Flags, Section, SequenceSet};

/// One typed command argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Sent verbatim.
    Atom(String),
    /// Decimal number.
    Number(u64),
    /// Parenthesized flag list.
    FlagList(Flags),
    /// Atom, quoted string, or literal, whichever is safe.
    AString(String),
    /// Like `AString` but hidden from debug telemetry.
    Secret(String),
    /// Always a literal.
    Literal(Bytes),
    /// Parenthesized list of astrings.
    StringList(Vec<String>),
    /// Search criteria.
    Search(SearchProgram),
    /// Sort criteria list.
    Sort(SortProgram),
    /// `BODY[...]` or `BODY.PEEK[...]` with optional partial range.
    BodySection {
        /// Section to fetch.
        section: Section,
        /// Don't set `\Seen`.
        peek: bool,
        /// `<origin.length>`.
        partial: Option<(u32, u32)>,
    },
    /// Sequence or UID set.
    Sequence(SequenceSet),
    /// Mailbox pattern; `*` and `%` pass unquoted.
    ListPattern(String),
    /// FETCH attribute list.
    Fetch(FetchItems),
}

/// A piece of an encoded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Command text ending in CRLF; if followed by a literal, it ends in `{n}` CRLF.
    Line(Bytes),
    /// Literal payload, sent only after a continuation.
    Literal(Bytes),
}

/// A command rendered for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCommand {
    /// The tag the command was encoded with.
    pub tag: String,
    /// Fragments in send order.
    pub fragments: Vec<Fragment>,
    /// Human-readable rendering with secrets masked and literals elided.
    pub display: String,
}

impl EncodedCommand {
    /// Returns true if the command carries at least one literal.
    #[must_use]
    pub fn has_literal(&self) -> bool {
        self.fragments.iter().any(|f| matches!(f, Fragment::Literal(_)))
    }

    /// The exact byte stream, all fragments concatenated.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Line(b) | Fragment::Literal(b) => out.extend_from_slice(b),
            }
        }
        out
    }
}

/// How a string will be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringForm {
    /// Bare atom.
    Atom,
    /// `"..."`.
    Quoted,
    /// `{n}` CRLF payload.
    Literal,
}

/// Chooses the wire form for a string.
///
/// CR, LF, NUL, `"`, `\` and 8-bit bytes force a literal; the quoted form
/// never escapes anything. Empty strings and strings with quoted-specials
/// are quoted. `wildcards` allows `*` and `%` in an atom.
#[must_use]
pub fn string_form(s: &[u8], wildcards: bool) -> StringForm {
    if s.iter()
        .any(|&b| matches!(b, b'\r' | b'\n' | 0 | b'"' | b'\\') || b >= 0x80)
    {
        return StringForm::Literal;
    }
    if s.is_empty() {
        return StringForm::Quoted;
    }
    let special = |b: u8| {
        matches!(b, b'(' | b')' | b'{' | b' ') || b < 0x20 || b == 0x7f
            || (!wildcards && matches!(b, b'*' | b'%'))
    };
    if s.iter().copied().any(special) {
        StringForm::Quoted
    } else {
        StringForm::Atom
    }
}

/// Incremental command encoder.
#[derive(Debug)]
pub struct Encoder {
    tag: String,
    line: BytesMut,
    display: String,
    fragments: Vec<Fragment>,
}

impl Encoder {
    /// Starts a command: `tag verb`.
    #[must_use]
    pub fn new(tag: &str, verb: &str) -> Self {
        let mut enc = Self {
            tag: tag.to_string(),
            line: BytesMut::with_capacity(64),
            display: String::new(),
            fragments: Vec::new(),
        };
        enc.push_raw(tag);
        enc.push_raw(" ");
        enc.push_raw(verb);
        enc
    }

    /// Appends one argument, preceded by a space.
    pub fn arg(&mut self, arg: &Arg) {
        self.push_raw(" ");
        self.write_arg(arg);
    }

    /// Closes the command and returns its fragments.
    #[must_use]
    pub fn finish(mut self) -> EncodedCommand {
        self.line.put_slice(b"\r\n");
        self.fragments.push(Fragment::Line(self.line.freeze()));
        EncodedCommand {
            tag: self.tag,
            fragments: self.fragments,
            display: self.display,
        }
    }

    fn write_arg(&mut self, arg: &Arg) {
        match arg {
            Arg::Atom(s) => self.push_raw(s),
            Arg::Number(n) => self.push_raw(&n.to_string()),
            Arg::FlagList(flags) => {
                self.push_raw("(");
                for (i, flag) in flags.iter().enumerate() {
                    if i > 0 {
                        self.push_raw(" ");
                    }
                    self.push_raw(flag.as_str());
                }
                self.push_raw(")");
            }
            Arg::AString(s) => self.push_astring(s.as_bytes(), false),
            Arg::Secret(s) => {
                let before = self.display.len();
                self.push_astring(s.as_bytes(), false);
                self.display.truncate(before);
                self.display.push_str("<password suppressed>");
            }
            Arg::Literal(payload) => self.push_literal(payload.clone()),
            Arg::StringList(items) => {
                self.push_raw("(");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.push_raw(" ");
                    }
                    self.push_astring(item.as_bytes(), false);
                }
                self.push_raw(")");
            }
            Arg::Search(program) => program.encode(self),
            Arg::Sort(program) => self.push_raw(&program.to_string()),
            Arg::BodySection {
                section,
                peek,
                partial,
            } => self.push_body_section(section, *peek, *partial),
            Arg::Sequence(set) => self.push_raw(&set.to_string()),
            Arg::ListPattern(p) => self.push_astring(p.as_bytes(), true),
            Arg::Fetch(items) => self.push_fetch_items(items),
        }
    }

    pub(crate) fn push_raw(&mut self, s: &str) {
        self.line.put_slice(s.as_bytes());
        self.display.push_str(s);
    }

    pub(crate) fn push_astring(&mut self, s: &[u8], wildcards: bool) {
        match string_form(s, wildcards) {
            StringForm::Atom => {
                self.line.put_slice(s);
                self.display.push_str(&String::from_utf8_lossy(s));
            }
            StringForm::Quoted => {
                self.line.put_u8(b'"');
                self.line.put_slice(s);
                self.line.put_u8(b'"');
                self.display.push('"');
                self.display.push_str(&String::from_utf8_lossy(s));
                self.display.push('"');
            }
            StringForm::Literal => self.push_literal(Bytes::copy_from_slice(s)),
        }
    }

    pub(crate) fn push_literal(&mut self, payload: Bytes) {
        let marker = format!("{{{}}}", payload.len());
        self.push_raw(&marker);
        self.line.put_slice(b"\r\n");
        let line = std::mem::take(&mut self.line).freeze();
        self.fragments.push(Fragment::Line(line));
        self.fragments.push(Fragment::Literal(payload));
    }

    fn push_body_section(&mut self, section: &Section, peek: bool, partial: Option<(u32, u32)>) {
        self.push_raw(if peek { "BODY.PEEK[" } else { "BODY[" });
        self.push_raw(&section.to_wire());
        self.push_raw("]");
        if let Some((origin, len)) = partial {
            self.push_raw(&format!("<{origin}.{len}>"));
        }
    }

    fn push_fetch_items(&mut self, items: &FetchItems) {
        match items {
            FetchItems::All => self.push_raw("ALL"),
            FetchItems::Full => self.push_raw("FULL"),
            FetchItems::Fast => self.push_raw("FAST"),
            FetchItems::Items(attrs) if attrs.len() == 1 => self.push_fetch_attribute(&attrs[0]),
            FetchItems::Items(attrs) => {
                self.push_raw("(");
                for (i, attr) in attrs.iter().enumerate() {
                    if i > 0 {
                        self.push_raw(" ");
                    }
                    self.push_fetch_attribute(attr);
                }
                self.push_raw(")");
            }
        }
    }

    fn push_fetch_attribute(&mut self, attr: &FetchAttribute) {
        match attr {
            FetchAttribute::Flags => self.push_raw("FLAGS"),
            FetchAttribute::InternalDate => self.push_raw("INTERNALDATE"),
            FetchAttribute::Rfc822Size => self.push_raw("RFC822.SIZE"),
            FetchAttribute::Envelope => self.push_raw("ENVELOPE"),
            FetchAttribute::BodyStructure => self.push_raw("BODYSTRUCTURE"),
            FetchAttribute::BodyShort => self.push_raw("BODY"),
            FetchAttribute::Uid => self.push_raw("UID"),
            FetchAttribute::Rfc822 => self.push_raw("RFC822"),
            FetchAttribute::Rfc822Header => self.push_raw("RFC822.HEADER"),
            FetchAttribute::Rfc822Text => self.push_raw("RFC822.TEXT"),
            FetchAttribute::Body {
                section,
                peek,
                partial,
            } => self.push_body_section(section, *peek, *partial),
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
    use crate::types::Flag;

    fn encode(args: &[Arg]) -> EncodedCommand {
        let mut enc = Encoder::new("A0001", "TEST");
        for arg in args {
            enc.arg(arg);
        }
        enc.finish()
    }

    fn wire(args: &[Arg]) -> String {
        String::from_utf8(encode(args).to_bytes()).unwrap()
    }

    mod string_form_tests {
        use super::*;

        #[test]
        fn atoms() {
            assert_eq!(string_form(b"INBOX", false), StringForm::Atom);
            assert_eq!(string_form(b"a.b-c_d", false), StringForm::Atom);
        }

        #[test]
        fn quoted_for_specials_and_empty() {
            assert_eq!(string_form(b"", false), StringForm::Quoted);
            assert_eq!(string_form(b"Sent Items", false), StringForm::Quoted);
            assert_eq!(string_form(b"a(b", false), StringForm::Quoted);
            assert_eq!(string_form(b"tab\there", false), StringForm::Quoted);
            assert_eq!(string_form(b"50%", false), StringForm::Quoted);
        }

        #[test]
        fn wildcards_allowed_in_patterns() {
            assert_eq!(string_form(b"INBOX.*", true), StringForm::Atom);
            assert_eq!(string_form(b"%", true), StringForm::Atom);
        }

        #[test]
        fn literal_for_unquotable_bytes() {
            assert_eq!(string_form(b"a\"b", false), StringForm::Literal);
            assert_eq!(string_form(b"a\\b", false), StringForm::Literal);
            assert_eq!(string_form(b"a\r\nb", false), StringForm::Literal);
            assert_eq!(string_form(b"a\0b", false), StringForm::Literal);
            assert_eq!(string_form("caf\u{e9}".as_bytes(), false), StringForm::Literal);
        }
    }

    #[test]
    fn plain_command_is_one_line() {
        let cmd = encode(&[Arg::AString("INBOX".into()), Arg::Number(5)]);
        assert_eq!(cmd.fragments.len(), 1);
        assert!(!cmd.has_literal());
        assert_eq!(cmd.to_bytes(), b"A0001 TEST INBOX 5\r\n");
    }

    #[test]
    fn literal_splits_fragments() {
        let cmd = encode(&[
            Arg::AString("a\"b".into()),
            Arg::AString("next".into()),
        ]);
        assert_eq!(
            cmd.fragments,
            vec![
                Fragment::Line(Bytes::from_static(b"A0001 TEST {3}\r\n")),
                Fragment::Literal(Bytes::from_static(b"a\"b")),
                Fragment::Line(Bytes::from_static(b" next\r\n")),
            ]
        );
    }

    #[test]
    fn secrets_are_masked_in_display() {
        let cmd = encode(&[Arg::AString("fred".into()), Arg::Secret("hunter2".into())]);
        assert_eq!(cmd.to_bytes(), b"A0001 TEST fred hunter2\r\n");
        assert_eq!(cmd.display, "A0001 TEST fred <password suppressed>");
    }

    #[test]
    fn flag_and_string_lists() {
        assert_eq!(
            wire(&[Arg::FlagList(Flags::from_vec(vec![Flag::Seen, Flag::Deleted]))]),
            "A0001 TEST (\\Seen \\Deleted)\r\n"
        );
        assert_eq!(
            wire(&[Arg::StringList(vec!["a".into(), "b c".into()])]),
            "A0001 TEST (a \"b c\")\r\n"
        );
    }

    #[test]
    fn body_sections() {
        assert_eq!(
            wire(&[Arg::BodySection {
                section: "2.0".parse().unwrap(),
                peek: true,
                partial: Some((0, 1024)),
            }]),
            "A0001 TEST BODY.PEEK[2.HEADER]<0.1024>\r\n"
        );
    }

    #[test]
    fn fetch_items() {
        assert_eq!(
            wire(&[Arg::Fetch(FetchItems::Items(vec![
                FetchAttribute::Uid,
                FetchAttribute::Envelope,
            ]))]),
            "A0001 TEST (UID ENVELOPE)\r\n"
        );
        assert_eq!(
            wire(&[Arg::Fetch(FetchItems::Items(vec![FetchAttribute::Flags]))]),
            "A0001 TEST FLAGS\r\n"
        );
    }

    #[test]
    fn list_pattern_keeps_wildcards() {
        assert_eq!(
            wire(&[Arg::AString(String::new()), Arg::ListPattern("*".into())]),
            "A0001 TEST \"\" *\r\n"
        );
    }
}
