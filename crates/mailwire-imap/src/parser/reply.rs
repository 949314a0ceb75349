//! Reply tokenizing: `{tag, keyword, text}`.

use bytes::Bytes;

use crate::types::{ResponseCode, Status};
use crate::{Error, Result};

/// Diagnostic text of the synthetic reply fabricated on connection loss.
pub const CLOSED_TEXT: &str = "[CLOSED] IMAP connection broken (server response)";

/// Who a reply is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyTag {
    /// `+`: the server wants more data.
    Continuation,
    /// `*`: unsolicited or multi-line command data.
    Untagged,
    /// The echo of a command tag.
    Tagged(String),
}

/// One server response, tokenized.
///
/// For untagged message data (`* 3 EXPUNGE`) the keyword is the number and
/// the real data keyword starts the text; [`crate::parser::untagged`] sorts
/// that out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Tag class.
    pub tag: ReplyTag,
    /// Second token, uppercased. Empty for continuations.
    pub keyword: String,
    /// Everything after the keyword, verbatim, literals included.
    pub text: Bytes,
}

impl Reply {
    /// Tokenizes one assembled response (without its final CRLF).
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` for an empty line or a non-continuation line
    /// with no keyword.
    pub fn parse(line: Bytes) -> Result<Self> {
        let tag_end = line.iter().position(|&b| b == b' ').unwrap_or(line.len());
        let tag = match &line[..tag_end] {
            b"+" => ReplyTag::Continuation,
            b"*" => ReplyTag::Untagged,
            b"" => {
                return Err(Error::Parse {
                    position: 0,
                    message: "empty reply line".into(),
                });
            }
            other => ReplyTag::Tagged(String::from_utf8_lossy(other).into_owned()),
        };
        let rest = if tag_end < line.len() {
            line.slice(tag_end + 1..)
        } else {
            Bytes::new()
        };

        if tag == ReplyTag::Continuation {
            return Ok(Self {
                tag,
                keyword: String::new(),
                text: rest,
            });
        }

        let key_end = rest.iter().position(|&b| b == b' ').unwrap_or(rest.len());
        if key_end == 0 {
            return Err(Error::Parse {
                position: tag_end + 1,
                message: format!("missing reply keyword: {}", truncate(&line)),
            });
        }
        let keyword = String::from_utf8_lossy(&rest[..key_end]).to_ascii_uppercase();
        let text = if key_end < rest.len() {
            rest.slice(key_end + 1..)
        } else {
            Bytes::new()
        };
        Ok(Self { tag, keyword, text })
    }

    /// The synthetic reply every caller sees once the connection is gone.
    #[must_use]
    pub fn closed(tag: &str) -> Self {
        Self {
            tag: ReplyTag::Tagged(tag.to_string()),
            keyword: "NO".to_string(),
            text: Bytes::from_static(CLOSED_TEXT.as_bytes()),
        }
    }

    /// Returns true for the synthetic connection-broken reply.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.keyword == "NO" && self.text.starts_with(b"[CLOSED]")
    }

    /// Status keyword, if the keyword is one.
    #[must_use]
    pub fn status(&self) -> Option<Status> {
        Status::from_keyword(&self.keyword)
    }

    /// Returns true if this reply carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        matches!(&self.tag, ReplyTag::Tagged(t) if t == tag)
    }

    /// Text as a string.
    #[must_use]
    pub fn text_str(&self) -> String {
        String::from_utf8_lossy(&self.text).into_owned()
    }

    /// Bracketed response code at the start of the text, if any.
    #[must_use]
    pub fn code(&self) -> Option<ResponseCode> {
        split_code(&self.text).0.map(|c| ResponseCode::parse(&c))
    }

    /// Human-readable text after any response code.
    #[must_use]
    pub fn human_text(&self) -> String {
        split_code(&self.text).1
    }

    /// Classifies the reply as a command outcome.
    ///
    /// # Errors
    ///
    /// `No`, `Bad` or `Bye` with the server's text, or `ConnectionBroken`
    /// for the synthetic CLOSED reply. Unknown keywords are logged and
    /// treated as success.
    pub fn into_result(self) -> Result<Self> {
        if self.is_closed() {
            return Err(Error::ConnectionBroken(self.human_text()));
        }
        match self.status() {
            Some(Status::Ok | Status::PreAuth) => Ok(self),
            Some(Status::No) => Err(Error::No(self.human_text())),
            Some(Status::Bad) => Err(Error::Bad(self.human_text())),
            Some(Status::Bye) => Err(Error::Bye(self.human_text())),
            None => {
                tracing::warn!(keyword = %self.keyword, "unexpected completion keyword");
                Ok(self)
            }
        }
    }
}

/// Splits `[CODE ...] text` into the code body and the remaining text.
pub(crate) fn split_code(text: &[u8]) -> (Option<String>, String) {
    let s = String::from_utf8_lossy(text);
    if let Some(inner) = s.strip_prefix('[')
        && let Some(end) = inner.find(']')
    {
        let code = inner[..end].to_string();
        let rest = inner[end + 1..].trim_start().to_string();
        return (Some(code), rest);
    }
    (None, s.into_owned())
}

fn truncate(line: &[u8]) -> String {
    let end = line.len().min(super::cursor::FRAGMENT_LIMIT);
    String::from_utf8_lossy(&line[..end]).into_owned()
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

    fn parse(s: &str) -> Reply {
        Reply::parse(Bytes::copy_from_slice(s.as_bytes())).unwrap()
    }

    #[test]
    fn tagged_reply() {
        let r = parse("A0001 ok [READ-WRITE] SELECT completed");
        assert!(r.has_tag("A0001"));
        assert_eq!(r.keyword, "OK");
        assert_eq!(r.code(), Some(ResponseCode::ReadWrite));
        assert_eq!(r.human_text(), "SELECT completed");
        assert!(r.into_result().is_ok());
    }

    #[test]
    fn untagged_numeric_keyword() {
        let r = parse("* 3 EXPUNGE");
        assert_eq!(r.tag, ReplyTag::Untagged);
        assert_eq!(r.keyword, "3");
        assert_eq!(&r.text[..], b"EXPUNGE");
    }

    #[test]
    fn continuation_without_text() {
        let r = parse("+");
        assert_eq!(r.tag, ReplyTag::Continuation);
        assert!(r.text.is_empty());
        let r = parse("+ VXNlcm5hbWU6");
        assert_eq!(&r.text[..], b"VXNlcm5hbWU6");
    }

    #[test]
    fn missing_keyword_is_parse_error() {
        assert!(matches!(
            Reply::parse(Bytes::from_static(b"A0001")),
            Err(Error::Parse { position: 6, .. })
        ));
        assert!(Reply::parse(Bytes::from_static(b"* ")).is_err());
    }

    #[test]
    fn verdicts() {
        assert!(matches!(parse("A1 NO nope").into_result(), Err(Error::No(t)) if t == "nope"));
        assert!(matches!(parse("A1 BAD huh").into_result(), Err(Error::Bad(_))));
        assert!(matches!(
            Reply::closed("A1").into_result(),
            Err(Error::ConnectionBroken(_))
        ));
    }
}
