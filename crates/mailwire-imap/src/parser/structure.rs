//! Recursive-descent parsing of envelopes, body structures, namespaces
//! and thread trees.
//!
//! Every structure is a parenthesized list or `NIL`. A parser that meets
//! something it cannot use records a diagnostic on the cursor, skips the
//! token, and returns what it has; nothing here fails the whole reply.

use crate::parser::cursor::Cursor;
use crate::types::{
    Address, Body, BodyContents, BodySize, BodyType, Disposition, EmbeddedMessage, Encoding,
    Envelope, MISSING_MAILBOX, Namespace, Namespaces, Param, ThreadNode,
};

/// Deepest nesting the parsers follow before skipping.
pub const MAX_NESTING: usize = 64;

/// Skips spaces and reports whether another field precedes the closing paren.
fn more(c: &mut Cursor) -> bool {
    c.skip_spaces();
    !matches!(c.peek(), Some(b')') | None)
}

/// Skips whatever is left up to and including the closing paren.
fn finish_list(c: &mut Cursor, depth: usize) {
    while more(c) {
        skip_extension_at(c, depth);
    }
    c.expect(b')');
}

fn nstring(c: &mut Cursor) -> Option<String> {
    c.skip_spaces();
    c.read_nstring_text()
}

/// Parses an address list. `NIL` gives an empty list.
pub fn parse_address_list(c: &mut Cursor) -> Vec<Address> {
    c.skip_spaces();
    let mut list = Vec::new();
    if c.eat_nil() {
        return list;
    }
    if !c.expect(b'(') {
        c.skip_token();
        return list;
    }
    loop {
        c.skip_spaces();
        match c.peek() {
            Some(b')') => {
                c.advance();
                break;
            }
            Some(b'(') => list.push(parse_address(c)),
            None => {
                c.diagnose("unterminated address list");
                break;
            }
            Some(_) => {
                c.diagnose("junk in address list");
                c.skip_token();
            }
        }
    }
    list
}

fn parse_address(c: &mut Cursor) -> Address {
    c.advance();
    let name = nstring(c);
    let adl = nstring(c);
    let mut mailbox = nstring(c);
    let host = nstring(c);
    finish_list(c, 0);
    if mailbox.is_none() && host.is_some() {
        c.diagnose("address has a host but no mailbox");
        mailbox = Some(MISSING_MAILBOX.to_string());
    }
    Address {
        name,
        adl,
        mailbox,
        host,
    }
}

/// Parses an ENVELOPE tuple. `NIL` gives `None`.
pub fn parse_envelope(c: &mut Cursor) -> Option<Envelope> {
    c.skip_spaces();
    if c.eat_nil() {
        return None;
    }
    if !c.expect(b'(') {
        c.skip_token();
        return None;
    }
    let env = Envelope {
        date: nstring(c),
        subject: nstring(c),
        from: parse_address_list(c),
        sender: parse_address_list(c),
        reply_to: parse_address_list(c),
        to: parse_address_list(c),
        cc: parse_address_list(c),
        bcc: parse_address_list(c),
        in_reply_to: nstring(c),
        message_id: nstring(c),
        ..Envelope::default()
    };
    finish_list(c, 0);
    Some(env)
}

/// Parses a BODY or BODYSTRUCTURE value. `NIL` gives `None`.
pub fn parse_body(c: &mut Cursor) -> Option<Body> {
    parse_body_at(c, 0)
}

fn parse_body_at(c: &mut Cursor, depth: usize) -> Option<Body> {
    c.skip_spaces();
    if c.eat_nil() {
        return None;
    }
    if depth >= MAX_NESTING {
        c.diagnose("body structure nested too deeply");
        skip_extension_at(c, depth);
        return None;
    }
    if !c.expect(b'(') {
        c.skip_token();
        return None;
    }
    c.skip_spaces();
    let body = if c.peek() == Some(b'(') {
        parse_multipart(c, depth)
    } else {
        parse_leaf(c, depth)
    };
    finish_list(c, depth);
    Some(body)
}

fn parse_multipart(c: &mut Cursor, depth: usize) -> Body {
    let mut parts = Vec::new();
    loop {
        c.skip_spaces();
        if c.peek() != Some(b'(') {
            break;
        }
        if let Some(part) = parse_body_at(c, depth + 1) {
            parts.push(part);
        }
    }
    c.skip_spaces();
    let subtype = c
        .read_astring_text()
        .map_or_else(|| "MIXED".to_string(), |s| s.to_ascii_uppercase());
    let mut body = Body {
        kind: BodyType::Multipart,
        subtype,
        encoding: Encoding::SevenBit,
        contents: BodyContents::Multipart(parts),
        ..Body::default()
    };
    if more(c) {
        body.params = parse_params(c);
    }
    if more(c) {
        body.disposition = parse_disposition(c, depth);
    }
    if more(c) {
        body.language = parse_language(c);
    }
    body
}

fn parse_leaf(c: &mut Cursor, depth: usize) -> Body {
    let kind = c
        .read_astring_text()
        .map_or(BodyType::Other(String::new()), |s| BodyType::parse(&s));
    c.skip_spaces();
    let subtype = c
        .read_astring_text()
        .map(|s| s.to_ascii_uppercase())
        .unwrap_or_default();
    c.skip_spaces();
    let params = parse_params(c);
    let id = nstring(c);
    let description = nstring(c);
    let encoding = Encoding::parse(nstring(c).as_deref());
    c.skip_spaces();
    let bytes = c.read_number().unwrap_or(0);
    let mut body = Body {
        kind,
        subtype,
        params,
        id,
        description,
        encoding,
        size: BodySize { bytes, lines: None },
        ..Body::default()
    };

    if body.kind == BodyType::Message && body.subtype == "RFC822" && more(c) {
        let envelope = parse_envelope(c).unwrap_or_default();
        let inner = parse_body_at(c, depth + 1).unwrap_or_default();
        body.contents = BodyContents::Message(Box::new(EmbeddedMessage {
            envelope,
            body: inner,
        }));
        if more(c) {
            body.size.lines = c.read_number();
        }
    } else if body.kind == BodyType::Text && more(c) {
        body.size.lines = c.read_number();
    }

    if more(c) {
        body.md5 = nstring(c);
    }
    if more(c) {
        body.disposition = parse_disposition(c, depth);
    }
    if more(c) {
        body.language = parse_language(c);
    }
    body
}

/// Parses a parameter list. `NIL` gives an empty list.
pub fn parse_params(c: &mut Cursor) -> Vec<Param> {
    c.skip_spaces();
    let mut params = Vec::new();
    if c.eat_nil() {
        return params;
    }
    if !c.expect(b'(') {
        c.skip_token();
        return params;
    }
    while more(c) {
        let Some(attribute) = c.read_astring_text() else {
            continue;
        };
        c.skip_spaces();
        let Some(value) = c.read_nstring_text() else {
            c.diagnose("missing parameter value");
            continue;
        };
        params.push(Param {
            attribute: attribute.to_ascii_uppercase(),
            value,
        });
    }
    c.expect(b')');
    params
}

fn parse_disposition(c: &mut Cursor, depth: usize) -> Option<Disposition> {
    c.skip_spaces();
    if c.eat_nil() {
        return None;
    }
    if c.peek() != Some(b'(') {
        c.diagnose("expected disposition");
        skip_extension_at(c, depth);
        return None;
    }
    c.advance();
    c.skip_spaces();
    let kind = c.read_astring_text()?.to_ascii_uppercase();
    let params = if more(c) { parse_params(c) } else { Vec::new() };
    finish_list(c, depth);
    Some(Disposition { kind, params })
}

fn parse_language(c: &mut Cursor) -> Option<Vec<String>> {
    c.skip_spaces();
    if c.eat_nil() {
        return None;
    }
    if c.peek() != Some(b'(') {
        return c.read_astring_text().map(|s| vec![s]);
    }
    c.advance();
    let mut langs = Vec::new();
    while more(c) {
        langs.extend(c.read_astring_text());
    }
    c.expect(b')');
    Some(langs)
}

/// Skips one extension value of any shape.
pub fn skip_extension(c: &mut Cursor) {
    skip_extension_at(c, 0);
}

fn skip_extension_at(c: &mut Cursor, depth: usize) {
    c.skip_spaces();
    match c.peek() {
        Some(b'(') if depth < MAX_NESTING => {
            c.advance();
            while more(c) {
                skip_extension_at(c, depth + 1);
            }
            if !c.eat(b')') {
                c.diagnose("unterminated extension list");
            }
        }
        Some(b'"') => {
            c.read_quoted();
        }
        Some(b'{') => {
            c.read_literal();
        }
        Some(b) if b.is_ascii_digit() => {
            c.read_number();
        }
        _ if c.at_nil() => {
            c.eat_nil();
        }
        None => {}
        Some(_) => {
            c.diagnose("unknown extension data");
            c.skip_token();
        }
    }
}

/// Parses the three NAMESPACE classes.
pub fn parse_namespaces(c: &mut Cursor) -> Namespaces {
    Namespaces {
        personal: parse_namespace_class(c),
        other_users: parse_namespace_class(c),
        shared: parse_namespace_class(c),
    }
}

fn parse_namespace_class(c: &mut Cursor) -> Option<Vec<Namespace>> {
    c.skip_spaces();
    if c.eat_nil() {
        return None;
    }
    if !c.expect(b'(') {
        c.skip_token();
        return None;
    }
    let mut out = Vec::new();
    while more(c) {
        if !c.expect(b'(') {
            c.skip_token();
            continue;
        }
        c.skip_spaces();
        let prefix = c.read_astring_text().unwrap_or_default();
        c.skip_spaces();
        let delimiter = c.read_nstring_text().and_then(|d| d.chars().next());
        let mut extensions = Vec::new();
        while more(c) {
            let Some(name) = c.read_astring_text() else {
                continue;
            };
            c.skip_spaces();
            let mut values = Vec::new();
            if c.eat(b'(') {
                while more(c) {
                    values.extend(c.read_astring_text());
                }
                c.expect(b')');
            }
            extensions.push((name, values));
        }
        c.expect(b')');
        out.push(Namespace {
            prefix,
            delimiter,
            extensions,
        });
    }
    c.expect(b')');
    Some(out)
}

/// Parses THREAD data: a run of parenthesized threads, one root each.
pub fn parse_threads(c: &mut Cursor) -> Vec<ThreadNode> {
    let mut roots = Vec::new();
    loop {
        c.skip_spaces();
        match c.peek() {
            Some(b'(') => {
                c.advance();
                roots.push(parse_thread_group(c, 0));
            }
            None => break,
            Some(_) => {
                c.diagnose("junk in thread data");
                c.skip_token();
            }
        }
    }
    roots
}

/// Parses the inside of one `( ... )` group, consuming its close paren.
///
/// Leading numbers form a reply chain; trailing groups are sibling
/// branches under the last number, or under a placeholder if the group
/// opens with a branch.
fn parse_thread_group(c: &mut Cursor, depth: usize) -> ThreadNode {
    let mut chain = Vec::new();
    let mut branches = Vec::new();
    loop {
        c.skip_spaces();
        match c.peek() {
            Some(b')') => {
                c.advance();
                break;
            }
            Some(b'(') if depth < MAX_NESTING => {
                c.advance();
                branches.push(parse_thread_group(c, depth + 1));
            }
            Some(b) if b.is_ascii_digit() && branches.is_empty() => {
                chain.extend(c.read_number());
            }
            None => {
                c.diagnose("unterminated thread");
                break;
            }
            Some(_) => {
                c.diagnose("junk in thread");
                c.skip_token();
            }
        }
    }
    let mut node = ThreadNode {
        message: chain.pop(),
        children: branches,
    };
    while let Some(parent) = chain.pop() {
        node = ThreadNode {
            message: Some(parent),
            children: vec![node],
        };
    }
    node
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
    use crate::types::{AddressKind, Section, recipients, render_address_list};

    fn cursor(s: &str) -> Cursor {
        Cursor::from_slice(s.as_bytes())
    }

    #[test]
    fn undisclosed_recipients_group() {
        let mut c = cursor(r#"(("" NIL "undisclosed-recipients" NIL)("" NIL NIL NIL))"#);
        let list = parse_address_list(&mut c);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].kind(), AddressKind::GroupStart);
        assert_eq!(list[1].kind(), AddressKind::GroupEnd);
        assert_eq!(recipients(&list).count(), 0);
        let rendered = render_address_list(&list);
        assert!(!rendered.contains('@'));
        assert!(rendered.starts_with("undisclosed-recipients:"));
        assert!(c.diagnostics().is_empty());
    }

    #[test]
    fn host_without_mailbox_gets_placeholder() {
        let mut c = cursor(r#"((NIL NIL NIL "example.com"))"#);
        let list = parse_address_list(&mut c);
        assert_eq!(list[0].mailbox.as_deref(), Some(MISSING_MAILBOX));
        assert_eq!(list[0].kind(), AddressKind::Mailbox);
        assert_eq!(c.diagnostics().len(), 1);
    }

    #[test]
    fn envelope_nil_and_empty_fields() {
        let mut c = cursor(
            r#"("Mon, 7 Feb 1994 21:52:25 -0800" "" (("Fred" NIL "fred" "example.com")) NIL NIL NIL NIL NIL NIL "<1@example.com>")"#,
        );
        let env = parse_envelope(&mut c).unwrap();
        assert_eq!(env.subject.as_deref(), Some(""));
        assert_eq!(env.in_reply_to, None);
        assert_eq!(env.from[0].email().unwrap(), "fred@example.com");
        assert!(env.sender.is_empty());
        assert_eq!(env.message_id.as_deref(), Some("<1@example.com>"));
        assert!(c.is_eof());
    }

    #[test]
    fn literal_subject() {
        let mut c = cursor("(NIL {5}\r\nhi\r\n! NIL NIL NIL NIL NIL NIL NIL NIL)");
        let env = parse_envelope(&mut c).unwrap();
        assert_eq!(env.subject.as_deref(), Some("hi\r\n!"));
    }

    #[test]
    fn text_leaf_with_extensions() {
        let mut c = cursor(
            r#"("TEXT" "PLAIN" ("CHARSET" "US-ASCII") NIL NIL "7BIT" 3028 92 NIL ("INLINE" NIL) ("EN" "FR") "loc" (1 "x" {2}
ab (NIL)))"#
                .replace('\n', "\r\n")
                .as_str(),
        );
        let body = parse_body(&mut c).unwrap();
        assert_eq!(body.kind, BodyType::Text);
        assert_eq!(body.param("charset"), Some("US-ASCII"));
        assert_eq!(body.size, BodySize { bytes: 3028, lines: Some(92) });
        assert_eq!(body.disposition.as_ref().unwrap().kind, "INLINE");
        assert_eq!(body.language.as_deref().unwrap(), ["EN", "FR"]);
        assert!(c.is_eof());
        assert!(c.diagnostics().is_empty());
    }

    #[test]
    fn multipart_with_embedded_message() {
        let text = r#"(("TEXT" "PLAIN" NIL NIL NIL "7BIT" 10 1)("MESSAGE" "RFC822" NIL NIL NIL "7BIT" 500 (NIL "inner" NIL NIL NIL NIL NIL NIL NIL NIL) (("TEXT" "PLAIN" NIL NIL NIL "7BIT" 20 2)("TEXT" "HTML" NIL NIL NIL "QUOTED-PRINTABLE" 30 3) "ALTERNATIVE") 25) "MIXED" ("BOUNDARY" "xyz"))"#;
        let mut c = cursor(text);
        let body = parse_body(&mut c).unwrap();
        assert_eq!(body.kind, BodyType::Multipart);
        assert_eq!(body.subtype, "MIXED");
        assert_eq!(body.param("boundary"), Some("xyz"));
        assert_eq!(body.parts().len(), 2);
        let msg = body.parts()[1].message().unwrap();
        assert_eq!(msg.envelope.subject.as_deref(), Some("inner"));
        assert_eq!(msg.body.subtype, "ALTERNATIVE");
        assert_eq!(body.parts()[1].size.lines, Some(25));

        let resolved = body.resolve(&"2.2".parse::<Section>().unwrap()).unwrap();
        assert_eq!(resolved.body.subtype, "HTML");
        assert_eq!(resolved.body.encoding, Encoding::QuotedPrintable);
        assert!(c.diagnostics().is_empty());
    }

    #[test]
    fn unknown_extension_is_skipped() {
        let mut c = cursor(r#"("TEXT" "PLAIN" NIL NIL NIL "7BIT" 1 1 NIL NIL NIL NIL (weird junk)) rest"#);
        let body = parse_body(&mut c).unwrap();
        assert_eq!(body.size.bytes, 1);
        assert_eq!(c.remaining(), b" rest");
        assert_eq!(c.diagnostics().len(), 2);
    }

    #[test]
    fn namespaces() {
        let mut c = cursor(r##"(("" "/")) NIL (("#shared/" "/" "X-PARAM" ("a" "b")))"##);
        let ns = parse_namespaces(&mut c);
        assert_eq!(ns.personal_prefix(), Some(""));
        assert!(ns.other_users.is_none());
        let shared = ns.shared.unwrap();
        assert_eq!(shared[0].prefix, "#shared/");
        assert_eq!(shared[0].delimiter, Some('/'));
        assert_eq!(shared[0].extensions[0].1, vec!["a", "b"]);
    }

    #[test]
    fn threads() {
        let mut c = cursor("(2)(3 6 (4 23)(44 7 96))((5)(8))");
        let roots = parse_threads(&mut c);
        assert_eq!(roots.len(), 3);
        assert_eq!(roots[0].to_wire(), "2");
        assert_eq!(roots[1].to_wire(), "3 6 (4 23)(44 7 96)");
        assert_eq!(roots[2].message, None);
        assert_eq!(roots[2].messages(), vec![5, 8]);
    }
}
