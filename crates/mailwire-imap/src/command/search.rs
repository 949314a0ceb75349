//! Search, sort and thread programs.

use bitflags::bitflags;
use chrono::NaiveDate;

use super::encoder::Encoder;
use crate::types::SequenceSet;

bitflags! {
    /// Flag criteria of a search program.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SearchFlags: u16 {
        /// `ANSWERED`
        const ANSWERED = 1 << 0;
        /// `UNANSWERED`
        const UNANSWERED = 1 << 1;
        /// `DELETED`
        const DELETED = 1 << 2;
        /// `UNDELETED`
        const UNDELETED = 1 << 3;
        /// `DRAFT`
        const DRAFT = 1 << 4;
        /// `UNDRAFT`
        const UNDRAFT = 1 << 5;
        /// `FLAGGED`
        const FLAGGED = 1 << 6;
        /// `UNFLAGGED`
        const UNFLAGGED = 1 << 7;
        /// `RECENT`
        const RECENT = 1 << 8;
        /// `OLD`
        const OLD = 1 << 9;
        /// `SEEN`
        const SEEN = 1 << 10;
        /// `UNSEEN`
        const UNSEEN = 1 << 11;
        /// `NEW`
        const NEW = 1 << 12;
    }
}

const FLAG_KEYS: [(SearchFlags, &str); 13] = [
    (SearchFlags::ANSWERED, "ANSWERED"),
    (SearchFlags::UNANSWERED, "UNANSWERED"),
    (SearchFlags::DELETED, "DELETED"),
    (SearchFlags::UNDELETED, "UNDELETED"),
    (SearchFlags::DRAFT, "DRAFT"),
    (SearchFlags::UNDRAFT, "UNDRAFT"),
    (SearchFlags::FLAGGED, "FLAGGED"),
    (SearchFlags::UNFLAGGED, "UNFLAGGED"),
    (SearchFlags::RECENT, "RECENT"),
    (SearchFlags::OLD, "OLD"),
    (SearchFlags::SEEN, "SEEN"),
    (SearchFlags::UNSEEN, "UNSEEN"),
    (SearchFlags::NEW, "NEW"),
];

/// A conjunction of search criteria.
///
/// Rendering is deterministic: message set, UID set, flags, keywords, size
/// bounds, date bounds, text criteria, then HEADER, OR and NOT clauses.
/// An empty program renders as `ALL`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchProgram {
    /// Sequence-number restriction.
    pub msgno: Option<SequenceSet>,
    /// UID restriction.
    pub uid: Option<SequenceSet>,
    /// Flag criteria.
    pub flags: SearchFlags,
    /// Keywords that must be set.
    pub keyword: Vec<String>,
    /// Keywords that must be clear.
    pub unkeyword: Vec<String>,
    /// `LARGER n`
    pub larger: Option<u32>,
    /// `SMALLER n`
    pub smaller: Option<u32>,
    /// `SENTBEFORE`
    pub sent_before: Option<NaiveDate>,
    /// `SENTON`
    pub sent_on: Option<NaiveDate>,
    /// `SENTSINCE`
    pub sent_since: Option<NaiveDate>,
    /// `BEFORE` (internal date)
    pub before: Option<NaiveDate>,
    /// `ON` (internal date)
    pub on: Option<NaiveDate>,
    /// `SINCE` (internal date)
    pub since: Option<NaiveDate>,
    /// `BCC` substrings.
    pub bcc: Vec<String>,
    /// `BODY` substrings.
    pub body: Vec<String>,
    /// `CC` substrings.
    pub cc: Vec<String>,
    /// `FROM` substrings.
    pub from: Vec<String>,
    /// `SUBJECT` substrings.
    pub subject: Vec<String>,
    /// `TEXT` substrings.
    pub text: Vec<String>,
    /// `TO` substrings.
    pub to: Vec<String>,
    /// `HEADER name value` pairs.
    pub header: Vec<(String, String)>,
    /// `OR (a) (b)` clauses.
    pub or: Vec<(Self, Self)>,
    /// `NOT (p)` clauses.
    pub not: Vec<Self>,
}

impl SearchProgram {
    /// A program that matches every message.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds flag criteria.
    #[must_use]
    pub fn with_flags(mut self, flags: SearchFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Adds a SUBJECT criterion.
    #[must_use]
    pub fn subject(mut self, s: impl Into<String>) -> Self {
        self.subject.push(s.into());
        self
    }

    /// Adds a FROM criterion.
    #[must_use]
    pub fn from(mut self, s: impl Into<String>) -> Self {
        self.from.push(s.into());
        self
    }

    /// Adds a TEXT criterion.
    #[must_use]
    pub fn text(mut self, s: impl Into<String>) -> Self {
        self.text.push(s.into());
        self
    }

    /// Restricts to a sequence set.
    #[must_use]
    pub fn messages(mut self, set: SequenceSet) -> Self {
        self.msgno = Some(set);
        self
    }

    /// Adds `SINCE date`.
    #[must_use]
    pub const fn since(mut self, date: NaiveDate) -> Self {
        self.since = Some(date);
        self
    }

    /// Adds an `OR` clause.
    #[must_use]
    pub fn or(mut self, a: Self, b: Self) -> Self {
        self.or.push((a, b));
        self
    }

    /// Adds a `NOT` clause.
    #[must_use]
    pub fn not(mut self, p: Self) -> Self {
        self.not.push(p);
        self
    }

    /// Returns true if the program carries no criteria.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Writes the program's keys into an encoder.
    pub(crate) fn encode(&self, enc: &mut Encoder) {
        let mut first = true;
        let mut sep = |enc: &mut Encoder| {
            if !first {
                enc.push_raw(" ");
            }
            first = false;
        };

        if let Some(set) = &self.msgno {
            sep(enc);
            enc.push_raw(&set.to_string());
        }
        if let Some(set) = &self.uid {
            sep(enc);
            enc.push_raw("UID ");
            enc.push_raw(&set.to_string());
        }
        for (bit, key) in FLAG_KEYS {
            if self.flags.contains(bit) {
                sep(enc);
                enc.push_raw(key);
            }
        }
        for (key, words) in [("KEYWORD", &self.keyword), ("UNKEYWORD", &self.unkeyword)] {
            for word in words {
                sep(enc);
                enc.push_raw(key);
                enc.push_raw(" ");
                enc.push_astring(word.as_bytes(), false);
            }
        }
        for (key, size) in [("LARGER", self.larger), ("SMALLER", self.smaller)] {
            if let Some(n) = size {
                sep(enc);
                enc.push_raw(&format!("{key} {n}"));
            }
        }
        let dates = [
            ("SENTBEFORE", self.sent_before),
            ("SENTON", self.sent_on),
            ("SENTSINCE", self.sent_since),
            ("BEFORE", self.before),
            ("ON", self.on),
            ("SINCE", self.since),
        ];
        for (key, date) in dates {
            if let Some(d) = date {
                sep(enc);
                enc.push_raw(&format!("{key} {}", d.format("%-d-%b-%Y")));
            }
        }
        let texts = [
            ("BCC", &self.bcc),
            ("BODY", &self.body),
            ("CC", &self.cc),
            ("FROM", &self.from),
            ("SUBJECT", &self.subject),
            ("TEXT", &self.text),
            ("TO", &self.to),
        ];
        for (key, values) in texts {
            for value in values {
                sep(enc);
                enc.push_raw(key);
                enc.push_raw(" ");
                enc.push_astring(value.as_bytes(), false);
            }
        }
        for (name, value) in &self.header {
            sep(enc);
            enc.push_raw("HEADER ");
            enc.push_astring(name.as_bytes(), false);
            enc.push_raw(" ");
            enc.push_astring(value.as_bytes(), false);
        }
        for (a, b) in &self.or {
            sep(enc);
            enc.push_raw("OR (");
            a.encode(enc);
            enc.push_raw(") (");
            b.encode(enc);
            enc.push_raw(")");
        }
        for p in &self.not {
            sep(enc);
            enc.push_raw("NOT (");
            p.encode(enc);
            enc.push_raw(")");
        }
        if first {
            enc.push_raw("ALL");
        }
    }
}

/// A sort key (RFC 5256).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Internal date.
    Arrival,
    /// Date header.
    Date,
    /// First From address mailbox.
    From,
    /// Base subject.
    Subject,
    /// RFC822 size.
    Size,
    /// First To address mailbox.
    To,
    /// First Cc address mailbox.
    Cc,
}

impl SortKey {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Arrival => "ARRIVAL",
            Self::Date => "DATE",
            Self::From => "FROM",
            Self::Subject => "SUBJECT",
            Self::Size => "SIZE",
            Self::To => "TO",
            Self::Cc => "CC",
        }
    }
}

/// One sort criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortCriterion {
    /// Key.
    pub key: SortKey,
    /// Descending when true.
    pub reverse: bool,
}

/// Ordered list of sort criteria; later keys break ties of earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortProgram {
    /// Criteria, most significant first.
    pub criteria: Vec<SortCriterion>,
}

impl SortProgram {
    /// Creates a program from one ascending key.
    #[must_use]
    pub fn by(key: SortKey) -> Self {
        Self {
            criteria: vec![SortCriterion {
                key,
                reverse: false,
            }],
        }
    }

    /// Appends a key.
    #[must_use]
    pub fn then(mut self, key: SortKey, reverse: bool) -> Self {
        self.criteria.push(SortCriterion { key, reverse });
        self
    }
}

impl std::fmt::Display for SortProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("(")?;
        for (i, c) in self.criteria.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if c.reverse {
                f.write_str("REVERSE ")?;
            }
            f.write_str(c.key.as_str())?;
        }
        f.write_str(")")
    }
}

/// THREAD algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadAlgorithm {
    /// `ORDEREDSUBJECT`
    OrderedSubject,
    /// `REFERENCES`
    References,
    /// Any other advertised algorithm.
    Other(String),
}

impl ThreadAlgorithm {
    /// Algorithm name on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::OrderedSubject => "ORDEREDSUBJECT",
            Self::References => "REFERENCES",
            Self::Other(s) => s,
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
    use crate::command::encoder::Arg;

    fn render(program: SearchProgram) -> String {
        let mut enc = Encoder::new("T", "SEARCH");
        enc.arg(&Arg::Search(program));
        let bytes = enc.finish().to_bytes();
        let s = String::from_utf8(bytes).unwrap();
        s.trim_start_matches("T SEARCH ").trim_end().to_string()
    }

    #[test]
    fn empty_is_all() {
        assert_eq!(render(SearchProgram::all()), "ALL");
    }

    #[test]
    fn field_order_is_stable() {
        let program = SearchProgram::all()
            .subject("hello world")
            .with_flags(SearchFlags::UNSEEN | SearchFlags::DELETED)
            .messages(SequenceSet::range(1, 10).unwrap())
            .since(NaiveDate::from_ymd_opt(1994, 2, 1).unwrap());
        assert_eq!(
            render(program),
            "1:10 DELETED UNSEEN SINCE 1-Feb-1994 SUBJECT \"hello world\""
        );
    }

    #[test]
    fn nested_or_and_not() {
        let program = SearchProgram::all()
            .or(
                SearchProgram::all().from("alice"),
                SearchProgram::all().not(SearchProgram::all().from("bob")),
            );
        assert_eq!(render(program), "OR (FROM alice) (NOT (FROM bob))");
    }

    #[test]
    fn header_and_sizes() {
        let mut program = SearchProgram::all();
        program.larger = Some(100);
        program.header.push(("X-Spam".into(), "yes".into()));
        program.keyword.push("$Work".into());
        assert_eq!(render(program), "KEYWORD $Work LARGER 100 HEADER X-Spam yes");
    }

    #[test]
    fn text_with_quote_becomes_literal() {
        let rendered = render(SearchProgram::all().text("say \"hi\""));
        assert_eq!(rendered, "TEXT {8}\r\nsay \"hi\"");
    }

    #[test]
    fn sort_program_display() {
        let program = SortProgram::by(SortKey::Date).then(SortKey::Subject, true);
        assert_eq!(program.to_string(), "(DATE REVERSE SUBJECT)");
    }
}
