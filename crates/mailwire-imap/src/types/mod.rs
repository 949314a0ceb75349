//! Core IMAP types.
//!
//! Identifiers, flags, capabilities, mailbox specifications, and the
//! structured message data (envelopes, bodies, threads) the parser builds.

#![allow(clippy::missing_const_for_fn)]

mod body;
mod capability;
mod envelope;
mod flags;
mod identifiers;
mod mailbox;
mod namespace;
mod response_code;
mod sequence;
mod thread;

pub use body::{
    Body, BodyContents, BodySize, BodyType, Disposition, EmbeddedMessage, Encoding, Param,
    Resolved, Section, SectionPart,
};
pub use capability::{AuthMechanisms, CapFlags, Capability, CapabilitySet, ProtocolLevel, Status};
pub use envelope::{
    Address, AddressKind, Envelope, MISSING_MAILBOX, recipients, render_address_list,
};
pub use flags::{Flag, Flags, KeywordTable, SystemFlags};
pub use identifiers::SeqNum;
pub use mailbox::{ListAttributes, ListEntry, MailboxSpec, Security, Service, StatusRecord};
pub use namespace::{Namespace, Namespaces};
pub use response_code::ResponseCode;
pub use sequence::SequenceSet;
pub use thread::ThreadNode;
