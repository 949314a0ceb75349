//! Cursor over one assembled server response.
//!
//! The transport splices literal payloads into the response, so a `{n}`
//! marker is always followed in the buffer by CRLF and exactly `n` bytes,
//! then by the rest of the next line. Reading a literal is therefore a
//! plain cursor move.
//!
//! Malformed input never aborts a parse. Each reader records a
//! [`Diagnostic`] (with the offending fragment truncated to
//! [`FRAGMENT_LIMIT`] bytes), logs it, skips the bad token, and returns
//! `None` so the caller can carry on with the next field.

use bytes::Bytes;

/// Longest fragment quoted in a diagnostic.
pub const FRAGMENT_LIMIT: usize = 64;

/// A recoverable parse problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Byte offset in the response.
    pub position: usize,
    /// What was expected.
    pub message: String,
    /// Input at the failure point, truncated.
    pub fragment: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}: {}", self.message, self.position, self.fragment)
    }
}

/// Parsing cursor.
#[derive(Debug, Clone)]
pub struct Cursor {
    input: Bytes,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Cursor {
    /// Creates a cursor at the start of `input`.
    #[must_use]
    pub const fn new(input: Bytes) -> Self {
        Self {
            input,
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Creates a cursor over a copy of `input`.
    #[must_use]
    pub fn from_slice(input: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(input))
    }

    /// Current byte offset.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Unconsumed input.
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.input[self.pos..]
    }

    /// Returns true if everything was consumed.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Peeks at the current byte.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Consumes and returns one byte.
    pub fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Skips any run of spaces.
    pub fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    /// Consumes `b` if it is next; records a diagnostic otherwise.
    pub fn expect(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            self.diagnose(&format!("expected '{}'", char::from(b)));
            false
        }
    }

    /// Consumes `b` if it is next.
    pub fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Returns true if the next token is `NIL`.
    #[must_use]
    pub fn at_nil(&self) -> bool {
        let rest = self.remaining();
        rest.len() >= 3
            && rest[..3].eq_ignore_ascii_case(b"NIL")
            && rest.get(3).is_none_or(|&b| !is_atom_char(b))
    }

    /// Consumes a `NIL` if it is next.
    pub fn eat_nil(&mut self) -> bool {
        if self.at_nil() {
            self.pos += 3;
            true
        } else {
            false
        }
    }

    /// Consumes bytes while `pred` holds.
    pub fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> Bytes {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        self.input.slice(start..self.pos)
    }

    /// Reads an atom: everything up to a space, paren, brace, quote,
    /// close bracket or control byte.
    pub fn read_atom(&mut self) -> Option<String> {
        let atom = self.take_while(is_atom_char);
        if atom.is_empty() {
            self.diagnose("expected atom");
            self.skip_token();
            return None;
        }
        Some(String::from_utf8_lossy(&atom).into_owned())
    }

    /// Reads an unsigned decimal number.
    pub fn read_number(&mut self) -> Option<u32> {
        let digits = self.take_while(|b| b.is_ascii_digit());
        let parsed = std::str::from_utf8(&digits)
            .ok()
            .and_then(|s| s.parse::<u32>().ok());
        if parsed.is_none() {
            self.diagnose("expected number");
            self.skip_token();
        }
        parsed
    }

    /// Reads a quoted string, un-escaping `\X` to `X`.
    pub fn read_quoted(&mut self) -> Option<Bytes> {
        if !self.expect(b'"') {
            self.skip_token();
            return None;
        }
        let mut out = Vec::new();
        loop {
            match self.advance() {
                Some(b'"') => return Some(Bytes::from(out)),
                Some(b'\\') => match self.advance() {
                    Some(b) => out.push(b),
                    None => break,
                },
                Some(b) => out.push(b),
                None => break,
            }
        }
        self.diagnose("unterminated quoted string");
        Some(Bytes::from(out))
    }

    /// Reads a `{n}` literal and its payload.
    pub fn read_literal(&mut self) -> Option<Bytes> {
        let start = self.pos;
        if !self.expect(b'{') {
            self.skip_token();
            return None;
        }
        let digits = self.take_while(|b| b.is_ascii_digit());
        // LITERAL+ style markers are tolerated
        self.eat(b'+');
        let len = std::str::from_utf8(&digits)
            .ok()
            .and_then(|s| s.parse::<usize>().ok());
        let Some(len) = len.filter(|_| self.eat(b'}')) else {
            self.pos = start;
            self.diagnose("bad literal count");
            self.skip_token();
            return None;
        };
        self.eat(b'\r');
        if !self.eat(b'\n') {
            self.diagnose("literal count not followed by CRLF");
        }
        let end = self.pos + len;
        if end > self.input.len() {
            self.diagnose("literal runs past end of response");
            let data = self.input.slice(self.pos..);
            self.pos = self.input.len();
            return Some(data);
        }
        let data = self.input.slice(self.pos..end);
        self.pos = end;
        Some(data)
    }

    /// Reads a quoted string or literal.
    pub fn read_string(&mut self) -> Option<Bytes> {
        match self.peek() {
            Some(b'"') => self.read_quoted(),
            Some(b'{') => self.read_literal(),
            _ => {
                self.diagnose("expected string");
                self.skip_token();
                None
            }
        }
    }

    /// Reads a string or `NIL`. `NIL` is `None`; `""` is an empty `Some`.
    pub fn read_nstring(&mut self) -> Option<Bytes> {
        if self.eat_nil() {
            return None;
        }
        self.read_string()
    }

    /// `read_nstring` decoded as text.
    pub fn read_nstring_text(&mut self) -> Option<String> {
        self.read_nstring()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    /// Reads an atom, quoted string, or literal.
    pub fn read_astring(&mut self) -> Option<Bytes> {
        match self.peek() {
            Some(b'"' | b'{') => self.read_string(),
            _ => {
                let atom = self.take_while(|b| is_atom_char(b) || b == b']');
                if atom.is_empty() {
                    self.diagnose("expected astring");
                    self.skip_token();
                    return None;
                }
                Some(atom)
            }
        }
    }

    /// `read_astring` decoded as text.
    pub fn read_astring_text(&mut self) -> Option<String> {
        self.read_astring()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    /// Skips one malformed token, stopping before the next space or `)`.
    pub fn skip_token(&mut self) {
        while let Some(b) = self.peek() {
            if b == b' ' || b == b')' {
                break;
            }
            self.pos += 1;
        }
    }

    /// Records a diagnostic at the current position.
    pub fn diagnose(&mut self, message: &str) {
        let end = (self.pos + FRAGMENT_LIMIT).min(self.input.len());
        let fragment = String::from_utf8_lossy(&self.input[self.pos.min(end)..end]).into_owned();
        tracing::warn!(position = self.pos, %fragment, "{message}");
        self.diagnostics.push(Diagnostic {
            position: self.pos,
            message: message.to_string(),
            fragment,
        });
    }

    /// Diagnostics recorded so far.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Takes the recorded diagnostics.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

/// Returns true for bytes allowed in an atom as this parser reads them.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    !matches!(b, b' ' | b'(' | b')' | b'{' | b'"' | b']' | b'[') && b > 0x1f && b != 0x7f
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

    #[test]
    fn nil_versus_empty_string() {
        let mut c = Cursor::from_slice(b"NIL \"\" nil");
        assert_eq!(c.read_nstring(), None);
        c.skip_spaces();
        assert_eq!(c.read_nstring(), Some(Bytes::new()));
        c.skip_spaces();
        assert_eq!(c.read_nstring(), None);
        assert!(c.diagnostics().is_empty());
    }

    #[test]
    fn nil_prefix_is_not_nil() {
        let c = Cursor::from_slice(b"NILS");
        assert!(!c.at_nil());
    }

    #[test]
    fn quoted_unescapes() {
        let mut c = Cursor::from_slice(br#""a\"b\\c" rest"#);
        assert_eq!(c.read_quoted().unwrap(), Bytes::from_static(b"a\"b\\c"));
        assert_eq!(c.remaining(), b" rest");
    }

    #[test]
    fn literal_reads_exact_bytes() {
        let mut c = Cursor::from_slice(b"{5}\r\na\r\n\0b ok");
        assert_eq!(c.read_literal().unwrap(), Bytes::from_static(b"a\r\n\0b"));
        assert_eq!(c.remaining(), b" ok");
    }

    #[test]
    fn short_literal_is_diagnosed() {
        let mut c = Cursor::from_slice(b"{10}\r\nabc");
        assert_eq!(c.read_literal().unwrap(), Bytes::from_static(b"abc"));
        assert_eq!(c.diagnostics().len(), 1);
        assert!(c.is_eof());
    }

    #[test]
    fn bad_number_is_skipped() {
        let mut c = Cursor::from_slice(b"x12 7");
        assert_eq!(c.read_number(), None);
        assert_eq!(c.diagnostics().len(), 1);
        c.skip_spaces();
        assert_eq!(c.read_number(), Some(7));
    }

    #[test]
    fn diagnostic_fragment_is_truncated() {
        let long = vec![b'x'; 300];
        let mut c = Cursor::from_slice(&long);
        c.diagnose("bad");
        assert_eq!(c.diagnostics()[0].fragment.len(), FRAGMENT_LIMIT);
    }

    #[test]
    fn astring_forms() {
        let mut c = Cursor::from_slice(b"INBOX \"Sent Items\" {3}\r\nabc");
        assert_eq!(c.read_astring_text().unwrap(), "INBOX");
        c.skip_spaces();
        assert_eq!(c.read_astring_text().unwrap(), "Sent Items");
        c.skip_spaces();
        assert_eq!(c.read_astring_text().unwrap(), "abc");
    }
}
