//! Command-related type definitions.

use crate::types::Section;

/// STATUS attributes to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAttribute {
    /// Number of messages.
    Messages,
    /// Number of recent messages.
    Recent,
    /// Next UID.
    UidNext,
    /// UIDVALIDITY.
    UidValidity,
    /// Number of unseen messages.
    Unseen,
}

impl StatusAttribute {
    /// Every attribute, in wire order.
    pub const ALL: [Self; 5] = [
        Self::Messages,
        Self::Recent,
        Self::Unseen,
        Self::UidNext,
        Self::UidValidity,
    ];

    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::Recent => "RECENT",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
        }
    }
}

/// FETCH items to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItems {
    /// FLAGS INTERNALDATE RFC822.SIZE ENVELOPE.
    All,
    /// FLAGS INTERNALDATE RFC822.SIZE ENVELOPE BODY.
    Full,
    /// FLAGS INTERNALDATE RFC822.SIZE.
    Fast,
    /// Explicit attribute list.
    Items(Vec<FetchAttribute>),
}

/// Individual FETCH attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// Message flags.
    Flags,
    /// Internal date.
    InternalDate,
    /// RFC822 size.
    Rfc822Size,
    /// Envelope structure.
    Envelope,
    /// Extended body structure (IMAP4).
    BodyStructure,
    /// Non-extensible body structure (IMAP2bis `BODY`).
    BodyShort,
    /// UID.
    Uid,
    /// Body section.
    Body {
        /// Section to fetch.
        section: Section,
        /// Don't set `\Seen`.
        peek: bool,
        /// Partial fetch as (origin, length).
        partial: Option<(u32, u32)>,
    },
    /// Whole message, pre-IMAP4rev1 form.
    Rfc822,
    /// Message header, pre-IMAP4rev1 form.
    Rfc822Header,
    /// Message text, pre-IMAP4rev1 form.
    Rfc822Text,
}

/// How STORE combines the given flags with the existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Replace (`FLAGS`).
    Replace,
    /// Add (`+FLAGS`).
    Add,
    /// Remove (`-FLAGS`).
    Remove,
}

impl StoreMode {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "FLAGS",
            Self::Add => "+FLAGS",
            Self::Remove => "-FLAGS",
        }
    }
}

/// IMAP2bis FIND variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindKind {
    /// `FIND ALL.MAILBOXES`
    AllMailboxes,
    /// `FIND MAILBOXES` (subscribed)
    Mailboxes,
}

impl FindKind {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::AllMailboxes => "ALL.MAILBOXES",
            Self::Mailboxes => "MAILBOXES",
        }
    }
}
