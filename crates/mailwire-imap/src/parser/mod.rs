//! IMAP response parser.
//!
//! Sans-I/O: the transport hands over one assembled response (a line with
//! any literals spliced in) and everything here works on that buffer.
//!
//! # Architecture
//!
//! - **Cursor**: byte-level reading of atoms, numbers, strings and literals,
//!   with recoverable diagnostics
//! - **Reply**: the `{tag, keyword, text}` split every response gets
//! - **Structure**: envelopes, body structures, namespaces, thread trees
//! - **Untagged**: typed classification of untagged data
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use mailwire_imap::parser::{Reply, Untagged};
//!
//! let reply = Reply::parse(Bytes::from_static(b"* 3 EXPUNGE")).unwrap();
//! let (data, diagnostics) = Untagged::from_reply(&reply);
//! assert_eq!(data, Untagged::Expunge(3));
//! assert!(diagnostics.is_empty());
//! ```

pub mod cursor;
pub mod reply;
pub mod structure;
pub mod untagged;

pub use cursor::{Cursor, Diagnostic, FRAGMENT_LIMIT};
pub use reply::{CLOSED_TEXT, Reply, ReplyTag};
pub use structure::{
    parse_address_list, parse_body, parse_envelope, parse_namespaces, parse_params, parse_threads,
    skip_extension,
};
pub use untagged::{FetchItem, Untagged, parse_fetch, parse_flag_list};
