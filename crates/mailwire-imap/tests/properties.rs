//! Property tests for the wire encoder and the structure parser.

#![allow(clippy::unwrap_used)]

use bytes::Bytes;
use proptest::prelude::*;

use mailwire_imap::command::{Arg, Encoder, StringForm, string_form};
use mailwire_imap::parser::{Cursor, parse_body, parse_envelope};
use mailwire_imap::types::{Body, BodyContents, BodyType, Param};

/// Encodes one astring argument and returns the bytes after the verb,
/// without the final CRLF, in the shape a reply would carry them.
fn encode_astring(s: &str) -> (Vec<u8>, bool) {
    let mut enc = Encoder::new("A0001", "X");
    enc.arg(&Arg::AString(s.to_string()));
    let cmd = enc.finish();
    let literal = cmd.has_literal();
    let mut bytes = cmd.to_bytes();
    bytes.drain(..b"A0001 X ".len());
    bytes.truncate(bytes.len() - 2);
    (bytes, literal)
}

fn decode_astring(wire: &[u8]) -> Vec<u8> {
    let mut c = Cursor::from_slice(wire);
    let out = c.read_astring().unwrap();
    assert!(c.is_eof(), "trailing bytes after {wire:?}");
    out.to_vec()
}

fn nstring(value: Option<&String>) -> String {
    value.map_or_else(|| "NIL".to_string(), |s| format!("\"{s}\""))
}

proptest! {
    #[test]
    fn unsafe_strings_round_trip_as_literals(
        head in "[a-z]{0,5}",
        bad in prop::sample::select(vec!["\r", "\n", "\0", "\"", "\\", "\r\n"]),
        tail in "[ -~]{0,10}",
    ) {
        let s = format!("{head}{bad}{tail}");
        prop_assert_eq!(string_form(s.as_bytes(), false), StringForm::Literal);
        let (wire, literal) = encode_astring(&s);
        prop_assert!(literal);
        prop_assert!(wire.starts_with(b"{"), "wire should start with a literal prefix");
        prop_assert_eq!(decode_astring(&wire), s.into_bytes());
    }

    #[test]
    fn plain_strings_go_bare(s in "[A-Za-z0-9._+-]{1,20}") {
        let (wire, literal) = encode_astring(&s);
        prop_assert!(!literal);
        prop_assert_eq!(&wire, &s.as_bytes().to_vec());
    }

    #[test]
    fn strings_with_specials_are_quoted(
        head in "[A-Za-z0-9]{1,8}",
        tail in "[A-Za-z0-9 (){]{0,8}",
    ) {
        let s = format!("{head} {tail}");
        let (wire, literal) = encode_astring(&s);
        prop_assert!(!literal);
        prop_assert_eq!(wire.first(), Some(&b'"'));
        prop_assert_eq!(decode_astring(&wire), s.into_bytes());
    }

    #[test]
    fn nil_and_empty_stay_distinct(
        date in prop::option::of("[A-Za-z0-9 ,:+-]{0,12}"),
        subject in prop::option::of("[A-Za-z0-9 ]{0,12}"),
        name in prop::option::of("[A-Za-z ]{0,8}"),
        message_id in prop::option::of("[a-z0-9@.<>]{0,12}"),
    ) {
        let wire = format!(
            "({} {} (({} NIL \"fred\" \"example.com\")) NIL NIL NIL NIL NIL NIL {})",
            nstring(date.as_ref()),
            nstring(subject.as_ref()),
            nstring(name.as_ref()),
            nstring(message_id.as_ref()),
        );
        let mut c = Cursor::from_slice(wire.as_bytes());
        let env = parse_envelope(&mut c).unwrap();
        prop_assert!(c.diagnostics().is_empty());
        prop_assert_eq!(env.date, date);
        prop_assert_eq!(env.subject, subject);
        prop_assert_eq!(&env.from[0].name, &name);
        prop_assert_eq!(env.message_id, message_id);
        prop_assert_eq!(env.in_reply_to, None);
    }
}

/// Shape of a synthetic body structure.
#[derive(Debug, Clone)]
enum Shape {
    Leaf {
        subtype: &'static str,
        charset: Option<&'static str>,
    },
    Multi {
        subtype: &'static str,
        parts: Vec<Shape>,
    },
}

fn shape() -> impl Strategy<Value = Shape> {
    let leaf = (
        prop::sample::select(vec!["PLAIN", "HTML", "ENRICHED"]),
        prop::option::of(prop::sample::select(vec!["US-ASCII", "UTF-8"])),
    )
        .prop_map(|(subtype, charset)| Shape::Leaf { subtype, charset });
    leaf.prop_recursive(3, 24, 4, |inner| {
        (
            prop::sample::select(vec!["MIXED", "ALTERNATIVE", "RELATED"]),
            prop::collection::vec(inner, 1..4),
        )
            .prop_map(|(subtype, parts)| Shape::Multi { subtype, parts })
    })
}

/// Renders a shape the way a server writes BODYSTRUCTURE.
fn to_wire(shape: &Shape) -> String {
    match shape {
        Shape::Leaf { subtype, charset } => {
            let params = charset.map_or_else(
                || "NIL".to_string(),
                |c| format!("(\"CHARSET\" \"{c}\")"),
            );
            format!("(\"TEXT\" \"{subtype}\" {params} NIL NIL \"7BIT\" 42 3 NIL NIL NIL)")
        }
        Shape::Multi { subtype, parts } => {
            let children: String = parts.iter().map(to_wire).collect();
            format!("({children} \"{subtype}\" (\"BOUNDARY\" \"xyz\") NIL NIL)")
        }
    }
}

fn assert_same_shape(body: &Body, shape: &Shape) {
    match shape {
        Shape::Leaf { subtype, charset } => {
            assert_eq!(body.kind, BodyType::Text);
            assert_eq!(body.subtype, *subtype);
            let expected: Vec<Param> = charset
                .iter()
                .map(|c| Param {
                    attribute: "CHARSET".to_string(),
                    value: (*c).to_string(),
                })
                .collect();
            assert_eq!(body.params, expected);
            assert_eq!(body.size.bytes, 42);
            assert_eq!(body.size.lines, Some(3));
            assert!(matches!(body.contents, BodyContents::Single));
        }
        Shape::Multi { subtype, parts } => {
            assert_eq!(body.kind, BodyType::Multipart);
            assert_eq!(body.subtype, *subtype);
            assert_eq!(body.param("BOUNDARY"), Some("xyz"));
            assert_eq!(body.parts().len(), parts.len());
            for (child, part) in body.parts().iter().zip(parts) {
                assert_same_shape(child, part);
            }
        }
    }
}

proptest! {
    #[test]
    fn body_structure_survives_the_wire(shape in shape()) {
        let wire = to_wire(&shape);
        let mut c = Cursor::new(Bytes::from(wire.clone()));
        let body = parse_body(&mut c).unwrap();
        prop_assert!(c.diagnostics().is_empty(), "diagnostics for {}", wire);
        assert_same_shape(&body, &shape);
    }
}

#[test]
fn three_level_nesting_parses() {
    let shape = Shape::Multi {
        subtype: "MIXED",
        parts: vec![
            Shape::Leaf {
                subtype: "PLAIN",
                charset: Some("UTF-8"),
            },
            Shape::Multi {
                subtype: "ALTERNATIVE",
                parts: vec![
                    Shape::Leaf {
                        subtype: "PLAIN",
                        charset: None,
                    },
                    Shape::Multi {
                        subtype: "RELATED",
                        parts: vec![Shape::Leaf {
                            subtype: "HTML",
                            charset: Some("US-ASCII"),
                        }],
                    },
                ],
            },
        ],
    };
    let mut c = Cursor::from_slice(to_wire(&shape).as_bytes());
    let body = parse_body(&mut c).unwrap();
    assert_same_shape(&body, &shape);
    assert_eq!(body.parts()[1].parts()[1].parts()[0].subtype, "HTML");
}
