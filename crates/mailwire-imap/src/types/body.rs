//! MIME body structure and section addressing.

use std::str::FromStr;

use super::Envelope;
use crate::error::{Error, Result};

/// Primary MIME type of a body part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyType {
    /// `TEXT/*`
    Text,
    /// `MULTIPART/*`
    Multipart,
    /// `MESSAGE/*`
    Message,
    /// `APPLICATION/*`
    Application,
    /// `AUDIO/*`
    Audio,
    /// `IMAGE/*`
    Image,
    /// `VIDEO/*`
    Video,
    /// Anything else, with the name as sent.
    Other(String),
}

impl BodyType {
    /// Maps a type name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "TEXT" => Self::Text,
            "MULTIPART" => Self::Multipart,
            "MESSAGE" => Self::Message,
            "APPLICATION" => Self::Application,
            "AUDIO" => Self::Audio,
            "IMAGE" => Self::Image,
            "VIDEO" => Self::Video,
            _ => Self::Other(s.to_string()),
        }
    }

    /// Type name as it appears on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "TEXT",
            Self::Multipart => "MULTIPART",
            Self::Message => "MESSAGE",
            Self::Application => "APPLICATION",
            Self::Audio => "AUDIO",
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
            Self::Other(s) => s,
        }
    }
}

/// Content-Transfer-Encoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Encoding {
    /// `7BIT`
    #[default]
    SevenBit,
    /// `8BIT`
    EightBit,
    /// `BINARY`
    Binary,
    /// `BASE64`
    Base64,
    /// `QUOTED-PRINTABLE`
    QuotedPrintable,
    /// Anything else.
    Other(String),
}

impl Encoding {
    /// Maps an encoding name; absent means 7BIT.
    #[must_use]
    pub fn parse(s: Option<&str>) -> Self {
        let Some(s) = s else {
            return Self::SevenBit;
        };
        match s.to_ascii_uppercase().as_str() {
            "7BIT" => Self::SevenBit,
            "8BIT" => Self::EightBit,
            "BINARY" => Self::Binary,
            "BASE64" => Self::Base64,
            "QUOTED-PRINTABLE" => Self::QuotedPrintable,
            _ => Self::Other(s.to_string()),
        }
    }

    /// Encoding name as it appears on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SevenBit => "7BIT",
            Self::EightBit => "8BIT",
            Self::Binary => "BINARY",
            Self::Base64 => "BASE64",
            Self::QuotedPrintable => "QUOTED-PRINTABLE",
            Self::Other(s) => s,
        }
    }
}

/// Attribute/value pair from a parameter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Attribute name.
    pub attribute: String,
    /// Value.
    pub value: String,
}

/// Content-Disposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposition {
    /// Disposition type, e.g. `attachment`.
    pub kind: String,
    /// Disposition parameters.
    pub params: Vec<Param>,
}

/// Part size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BodySize {
    /// Octets.
    pub bytes: u32,
    /// Lines, for TEXT and MESSAGE/RFC822 parts.
    pub lines: Option<u32>,
}

/// An encapsulated MESSAGE/RFC822.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedMessage {
    /// The inner message's envelope.
    pub envelope: Envelope,
    /// The inner message's body.
    pub body: Body,
}

/// What a part holds, by type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BodyContents {
    /// A leaf with fetchable content.
    #[default]
    Single,
    /// Child parts, in order. Never fetchable as text itself.
    Multipart(Vec<Body>),
    /// An encapsulated message.
    Message(Box<EmbeddedMessage>),
}

/// One node of a body structure tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    /// Primary type.
    pub kind: BodyType,
    /// Subtype, uppercase.
    pub subtype: String,
    /// Content-Type parameters.
    pub params: Vec<Param>,
    /// Content-ID.
    pub id: Option<String>,
    /// Content-Description.
    pub description: Option<String>,
    /// Content-MD5.
    pub md5: Option<String>,
    /// Transfer encoding.
    pub encoding: Encoding,
    /// Size.
    pub size: BodySize,
    /// Content-Disposition.
    pub disposition: Option<Disposition>,
    /// Content-Language.
    pub language: Option<Vec<String>>,
    /// Type-dependent contents.
    pub contents: BodyContents,
}

impl Default for Body {
    fn default() -> Self {
        Self {
            kind: BodyType::Text,
            subtype: "PLAIN".to_string(),
            params: Vec::new(),
            id: None,
            description: None,
            md5: None,
            encoding: Encoding::SevenBit,
            size: BodySize::default(),
            disposition: None,
            language: None,
            contents: BodyContents::Single,
        }
    }
}

impl Body {
    /// Looks up a Content-Type parameter, case-insensitively.
    #[must_use]
    pub fn param(&self, attribute: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.attribute.eq_ignore_ascii_case(attribute))
            .map(|p| p.value.as_str())
    }

    /// Child parts of a multipart, empty otherwise.
    #[must_use]
    pub fn parts(&self) -> &[Self] {
        match &self.contents {
            BodyContents::Multipart(parts) => parts,
            _ => &[],
        }
    }

    /// The encapsulated message of a MESSAGE/RFC822 part.
    #[must_use]
    pub fn message(&self) -> Option<&EmbeddedMessage> {
        match &self.contents {
            BodyContents::Message(m) => Some(m),
            _ => None,
        }
    }

    /// Resolves a section against this top-level body.
    ///
    /// Returns `None` when the path names a part that doesn't exist or asks
    /// for a header/text sub-object of something that is not a message.
    #[must_use]
    pub fn resolve(&self, section: &Section) -> Option<Resolved<'_>> {
        let mut body = self;
        // Header/text of the top level are those of the fetched message itself
        let mut is_message = true;
        for (i, &n) in section.path.iter().enumerate() {
            if i > 0 {
                // further components descend through an encapsulated message
                if let Some(inner) = body.message() {
                    body = &inner.body;
                }
            }
            body = match &body.contents {
                BodyContents::Multipart(parts) => parts.get(usize::try_from(n).ok()?.checked_sub(1)?)?,
                _ if n == 1 => body,
                _ => return None,
            };
            is_message = body.message().is_some();
        }
        match section.part {
            SectionPart::Whole => {}
            SectionPart::Mime if section.path.is_empty() => return None,
            SectionPart::Mime => {}
            SectionPart::Header | SectionPart::Text | SectionPart::HeaderFields(_)
                if !is_message =>
            {
                return None;
            }
            SectionPart::Header | SectionPart::Text | SectionPart::HeaderFields(_) => {}
        }
        Some(Resolved {
            body,
            part: section.part.clone(),
        })
    }
}

/// The sub-object a section names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionPart {
    /// The part (or whole message) itself.
    Whole,
    /// The message header; `.0` is the same thing.
    Header,
    /// Selected header lines.
    HeaderFields(Vec<String>),
    /// The message body without its header.
    Text,
    /// The MIME header of a part.
    Mime,
}

/// Parsed dotted section specifier such as `2.1`, `2.0`, or `1.TEXT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Part numbers, outermost first.
    pub path: Vec<u32>,
    /// Sub-object selected after the path.
    pub part: SectionPart,
}

impl Section {
    /// The whole message.
    #[must_use]
    pub const fn whole() -> Self {
        Self {
            path: Vec::new(),
            part: SectionPart::Whole,
        }
    }

    /// The top-level header.
    #[must_use]
    pub const fn header() -> Self {
        Self {
            path: Vec::new(),
            part: SectionPart::Header,
        }
    }

    /// The top-level text.
    #[must_use]
    pub const fn text() -> Self {
        Self {
            path: Vec::new(),
            part: SectionPart::Text,
        }
    }

    /// Selected top-level header fields.
    #[must_use]
    pub fn header_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: Vec::new(),
            part: SectionPart::HeaderFields(fields.into_iter().map(Into::into).collect()),
        }
    }

    /// Section text for the wire, with `.0` spelled `.HEADER`.
    #[must_use]
    pub fn to_wire(&self) -> String {
        let mut out = self
            .path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        let suffix = match &self.part {
            SectionPart::Whole => return out,
            SectionPart::Header => "HEADER".to_string(),
            SectionPart::Text => "TEXT".to_string(),
            SectionPart::Mime => "MIME".to_string(),
            SectionPart::HeaderFields(fields) => {
                format!("HEADER.FIELDS ({})", fields.join(" "))
            }
        };
        if !out.is_empty() {
            out.push('.');
        }
        out.push_str(&suffix);
        out
    }
}

impl FromStr for Section {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::Protocol(format!("invalid section specifier: {s}"));
        let mut path = Vec::new();
        let mut part = SectionPart::Whole;
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::whole());
        }
        let mut components = trimmed.split('.').peekable();
        while let Some(c) = components.next() {
            if part != SectionPart::Whole {
                return Err(bad());
            }
            if let Ok(n) = c.parse::<u32>() {
                match n {
                    0 if !path.is_empty() && components.peek().is_none() => {
                        part = SectionPart::Header;
                    }
                    0 => return Err(bad()),
                    n => path.push(n),
                }
                continue;
            }
            part = match c.to_ascii_uppercase().as_str() {
                "HEADER" if components.peek().is_none() => SectionPart::Header,
                "HEADER" => {
                    let rest: Vec<_> = components.by_ref().collect();
                    let rest = rest.join(".");
                    let fields = rest
                        .strip_prefix("FIELDS")
                        .or_else(|| rest.strip_prefix("fields"))
                        .ok_or_else(bad)?
                        .trim()
                        .trim_start_matches('(')
                        .trim_end_matches(')');
                    SectionPart::HeaderFields(
                        fields.split_whitespace().map(str::to_string).collect(),
                    )
                }
                "TEXT" => SectionPart::Text,
                "MIME" if !path.is_empty() => SectionPart::Mime,
                _ => return Err(bad()),
            };
        }
        Ok(Self { path, part })
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// Result of resolving a section against a body tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<'a> {
    /// The part the path lands on.
    pub body: &'a Body,
    /// Which sub-object of it is addressed.
    pub part: SectionPart,
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

    fn text(subtype: &str, bytes: u32) -> Body {
        Body {
            subtype: subtype.to_string(),
            size: BodySize {
                bytes,
                lines: Some(1),
            },
            ..Body::default()
        }
    }

    fn multipart(parts: Vec<Body>) -> Body {
        Body {
            kind: BodyType::Multipart,
            subtype: "MIXED".to_string(),
            contents: BodyContents::Multipart(parts),
            ..Body::default()
        }
    }

    fn rfc822(inner: Body) -> Body {
        Body {
            kind: BodyType::Message,
            subtype: "RFC822".to_string(),
            contents: BodyContents::Message(Box::new(EmbeddedMessage {
                envelope: Envelope::default(),
                body: inner,
            })),
            ..Body::default()
        }
    }

    fn sample() -> Body {
        multipart(vec![
            text("PLAIN", 10),
            rfc822(multipart(vec![text("PLAIN", 20), text("HTML", 30)])),
        ])
    }

    mod section_parse_tests {
        use super::*;

        #[test]
        fn numeric_paths() {
            let s: Section = "2.1".parse().unwrap();
            assert_eq!(s.path, vec![2, 1]);
            assert_eq!(s.part, SectionPart::Whole);
        }

        #[test]
        fn zero_means_header() {
            let s: Section = "2.0".parse().unwrap();
            assert_eq!(s.path, vec![2]);
            assert_eq!(s.part, SectionPart::Header);
            assert_eq!(s.to_wire(), "2.HEADER");
        }

        #[test]
        fn named_parts() {
            assert_eq!("2.TEXT".parse::<Section>().unwrap().part, SectionPart::Text);
            assert_eq!("1.mime".parse::<Section>().unwrap().part, SectionPart::Mime);
            assert_eq!("HEADER".parse::<Section>().unwrap(), Section::header());
            assert_eq!("".parse::<Section>().unwrap(), Section::whole());
        }

        #[test]
        fn header_fields() {
            let s: Section = "HEADER.FIELDS (NEWSGROUPS REFERENCES)".parse().unwrap();
            assert_eq!(
                s.part,
                SectionPart::HeaderFields(vec!["NEWSGROUPS".into(), "REFERENCES".into()])
            );
            assert_eq!(s.to_wire(), "HEADER.FIELDS (NEWSGROUPS REFERENCES)");
        }

        #[test]
        fn rejects_malformed() {
            assert!("0".parse::<Section>().is_err());
            assert!("MIME".parse::<Section>().is_err());
            assert!("1.TEXT.2".parse::<Section>().is_err());
            assert!("x".parse::<Section>().is_err());
        }
    }

    mod resolve_tests {
        use super::*;

        #[test]
        fn descends_into_embedded_message() {
            let body = sample();
            let r = body.resolve(&"2.1".parse().unwrap()).unwrap();
            assert_eq!(r.body.size.bytes, 20);
            assert_eq!(r.part, SectionPart::Whole);
        }

        #[test]
        fn header_text_and_whole_are_distinct() {
            let body = sample();
            let whole = body.resolve(&"2".parse().unwrap()).unwrap();
            let header = body.resolve(&"2.0".parse().unwrap()).unwrap();
            let text = body.resolve(&"2.TEXT".parse().unwrap()).unwrap();
            assert_eq!(whole.body.subtype, "RFC822");
            assert!(std::ptr::eq(whole.body, header.body));
            assert_eq!(whole.part, SectionPart::Whole);
            assert_eq!(header.part, SectionPart::Header);
            assert_eq!(text.part, SectionPart::Text);
        }

        #[test]
        fn out_of_range_is_none() {
            let body = sample();
            assert!(body.resolve(&"3".parse().unwrap()).is_none());
            assert!(body.resolve(&"2.3".parse().unwrap()).is_none());
            assert!(body.resolve(&"1.2".parse().unwrap()).is_none());
        }

        #[test]
        fn header_of_leaf_is_none() {
            let body = sample();
            assert!(body.resolve(&"1.HEADER".parse().unwrap()).is_none());
            assert!(body.resolve(&"1.MIME".parse().unwrap()).is_some());
        }

        #[test]
        fn single_part_message() {
            let body = text("PLAIN", 5);
            assert_eq!(body.resolve(&"1".parse().unwrap()).unwrap().body.size.bytes, 5);
            assert!(body.resolve(&"2".parse().unwrap()).is_none());
            assert!(body.resolve(&Section::header()).is_some());
        }
    }

    #[test]
    fn param_lookup() {
        let mut body = text("PLAIN", 1);
        body.params.push(Param {
            attribute: "CHARSET".into(),
            value: "utf-8".into(),
        });
        assert_eq!(body.param("charset"), Some("utf-8"));
        assert_eq!(body.param("name"), None);
    }
}
