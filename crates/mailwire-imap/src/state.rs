//! Per-connection session state.
//!
//! Everything the engine learns about a connection lives here: protocol
//! state, capabilities, selected-mailbox data from SELECT response codes,
//! the user-flag table, and scratch space for the results of the command
//! in flight. Only the command driver and the dispatcher mutate it.

use crate::command::TagGenerator;
use crate::parser::Reply;
use crate::types::{
    CapabilitySet, Flags, KeywordTable, ListEntry, Namespaces, StatusRecord, ThreadNode,
};

/// Protocol state, following RFC 3501 section 3.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProtocolState {
    /// Waiting for credentials.
    #[default]
    NotAuthenticated,
    /// Logged in, nothing selected.
    Authenticated,
    /// A mailbox is open.
    Selected(SelectedState),
    /// LOGOUT sent or BYE received.
    Logout,
}

impl ProtocolState {
    /// Returns `true` if we're authenticated (authenticated or selected).
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Selected(_))
    }

    /// Returns `true` if a mailbox is selected.
    #[must_use]
    pub const fn is_selected(&self) -> bool {
        matches!(self, Self::Selected(_))
    }

    /// Returns the selected mailbox name, if any.
    #[must_use]
    pub fn selected_mailbox(&self) -> Option<&str> {
        match self {
            Self::Selected(state) => Some(&state.mailbox),
            _ => None,
        }
    }

    /// Returns `true` if the selected mailbox is read-only.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        match self {
            Self::Selected(state) => state.read_only,
            _ => false,
        }
    }
}

/// State information when a mailbox is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedState {
    /// Name of the selected mailbox.
    pub mailbox: String,
    /// Whether the mailbox is read-only (EXAMINE, or READ-ONLY code).
    pub read_only: bool,
}

/// Session state of one connection.
#[derive(Debug)]
pub struct SessionState {
    /// Protocol state.
    pub protocol: ProtocolState,
    /// Advertised capabilities minus downgrades.
    pub caps: CapabilitySet,
    /// Tag counter.
    pub tags: TagGenerator,
    /// Most recent tagged reply.
    pub last_reply: Option<Reply>,
    /// Last REFERRAL code seen.
    pub referral: Option<String>,
    /// NAMESPACE data, once fetched.
    pub namespaces: Option<Namespaces>,
    /// Results of the last SORT.
    pub sort_results: Vec<u32>,
    /// Results of the last THREAD.
    pub thread_results: Vec<ThreadNode>,
    /// Results of the last SEARCH, in arrival order.
    pub search_results: Vec<u32>,
    /// LIST/LSUB/MAILBOX entries collected during the current command.
    pub listed: Vec<ListEntry>,
    /// STATUS records collected during the current command.
    pub statuses: Vec<StatusRecord>,
    /// User keywords defined by the last FLAGS reply.
    pub keywords: KeywordTable,
    /// PERMANENTFLAGS of the selected mailbox.
    pub permanent_flags: Option<Flags>,
    /// UIDVALIDITY of the selected mailbox.
    pub uid_validity: Option<u32>,
    /// UIDNEXT of the selected mailbox.
    pub uid_next: Option<u32>,
    /// First unseen message, from the UNSEEN code.
    pub first_unseen: Option<u32>,
    /// Message count.
    pub exists: u32,
    /// Recent count.
    pub recent: u32,
    /// The server said BYE; don't send LOGOUT.
    pub bye_seen: bool,
    /// The transport failed; every command short-circuits.
    pub dead: bool,
    /// Prefix prepended to names reported by the current list operation.
    pub list_prefix: Option<String>,
    /// SEARCH replies carry UIDs rather than sequence numbers.
    pub uid_search: bool,
}

impl SessionState {
    /// Fresh state for a new connection.
    #[must_use]
    pub fn new(tag_prefix: char, user_flag_slots: usize) -> Self {
        Self {
            protocol: ProtocolState::NotAuthenticated,
            caps: CapabilitySet::new(),
            tags: TagGenerator::new(tag_prefix),
            last_reply: None,
            referral: None,
            namespaces: None,
            sort_results: Vec::new(),
            thread_results: Vec::new(),
            search_results: Vec::new(),
            listed: Vec::new(),
            statuses: Vec::new(),
            keywords: KeywordTable::new(user_flag_slots),
            permanent_flags: None,
            uid_validity: None,
            uid_next: None,
            first_unseen: None,
            exists: 0,
            recent: 0,
            bye_seen: false,
            dead: false,
            list_prefix: None,
            uid_search: false,
        }
    }

    /// Clears selected-mailbox data ahead of a SELECT or EXAMINE.
    pub fn reset_mailbox(&mut self) {
        self.permanent_flags = None;
        self.uid_validity = None;
        self.uid_next = None;
        self.first_unseen = None;
        self.exists = 0;
        self.recent = 0;
        self.keywords = KeywordTable::new(self.keywords.slots());
    }

    /// Clears per-command result buffers.
    pub fn clear_results(&mut self) {
        self.search_results.clear();
        self.sort_results.clear();
        self.thread_results.clear();
        self.listed.clear();
        self.statuses.clear();
    }

    /// Marks the session dead after a transport failure.
    pub fn mark_dead(&mut self) {
        if !self.dead {
            tracing::error!("connection marked dead");
        }
        self.dead = true;
        self.protocol = ProtocolState::Logout;
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

    #[test]
    fn test_protocol_state_default() {
        assert_eq!(ProtocolState::default(), ProtocolState::NotAuthenticated);
    }

    #[test]
    fn test_is_authenticated() {
        assert!(!ProtocolState::NotAuthenticated.is_authenticated());
        assert!(ProtocolState::Authenticated.is_authenticated());
        assert!(
            ProtocolState::Selected(SelectedState {
                mailbox: "INBOX".to_string(),
                read_only: false,
            })
            .is_authenticated()
        );
        assert!(!ProtocolState::Logout.is_authenticated());
    }

    #[test]
    fn test_selected_mailbox_and_read_only() {
        let state = ProtocolState::Selected(SelectedState {
            mailbox: "Drafts".to_string(),
            read_only: true,
        });
        assert_eq!(state.selected_mailbox(), Some("Drafts"));
        assert!(state.is_read_only());
        assert_eq!(ProtocolState::Authenticated.selected_mailbox(), None);
    }

    #[test]
    fn reset_keeps_capabilities() {
        let mut s = SessionState::new('A', 30);
        s.caps.assume_legacy();
        s.exists = 10;
        s.uid_validity = Some(7);
        s.reset_mailbox();
        assert_eq!(s.exists, 0);
        assert_eq!(s.uid_validity, None);
        assert!(s.caps.has(crate::types::CapFlags::IMAP2BIS));
        assert_eq!(s.keywords.slots(), 30);
    }

    #[test]
    fn mark_dead_ends_protocol() {
        let mut s = SessionState::new('A', 30);
        s.protocol = ProtocolState::Authenticated;
        s.mark_dead();
        assert!(s.dead);
        assert_eq!(s.protocol, ProtocolState::Logout);
    }
}
