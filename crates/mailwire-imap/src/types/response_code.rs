//! Bracketed response codes.

use super::{Capability, Flags};

/// Response code carried in `[...]` after a status keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: text that must be shown to the user.
    Alert,
    /// CAPABILITY list piggybacked on a status reply.
    Capability(Vec<Capability>),
    /// PARSE: the server failed to parse a message.
    Parse,
    /// PERMANENTFLAGS: flags that can be changed permanently.
    PermanentFlags(Flags),
    /// READ-ONLY: mailbox selected as read-only.
    ReadOnly,
    /// READ-WRITE: mailbox selected as read-write.
    ReadWrite,
    /// TRYCREATE: target mailbox doesn't exist but could be created.
    TryCreate,
    /// UIDNEXT: next UID to be assigned.
    UidNext(u32),
    /// UIDVALIDITY: validity epoch of the mailbox's UIDs.
    UidValidity(u32),
    /// UNSEEN: first unseen message.
    Unseen(u32),
    /// REFERRAL: URL of a server holding the object.
    Referral(String),
    /// UIDNOTSTICKY: UIDs are not persistent across sessions.
    UidNotSticky,
    /// NEWNAME: the mailbox was renamed.
    NewName {
        /// Old name.
        old: String,
        /// New name.
        new: String,
    },
    /// CLOSED: the connection is gone. Used by synthetic replies.
    Closed,
    /// Anything else, kept as the raw bracket contents.
    Unknown(String),
}

impl ResponseCode {
    /// Parses the text between `[` and `]`.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let (name, arg) = text
            .split_once(' ')
            .map_or((text, ""), |(n, a)| (n, a.trim()));
        let number = || arg.parse::<u32>().ok();
        let code = match name.to_ascii_uppercase().as_str() {
            "ALERT" => Some(Self::Alert),
            "PARSE" => Some(Self::Parse),
            "READ-ONLY" => Some(Self::ReadOnly),
            "READ-WRITE" => Some(Self::ReadWrite),
            "TRYCREATE" => Some(Self::TryCreate),
            "UIDNOTSTICKY" => Some(Self::UidNotSticky),
            "CLOSED" => Some(Self::Closed),
            "UIDNEXT" => number().map(Self::UidNext),
            "UIDVALIDITY" => number().map(Self::UidValidity),
            "UNSEEN" => number().map(Self::Unseen),
            "REFERRAL" if !arg.is_empty() => Some(Self::Referral(arg.to_string())),
            "CAPABILITY" => Some(Self::Capability(
                arg.split_whitespace().map(Capability::parse).collect(),
            )),
            "PERMANENTFLAGS" => Some(Self::PermanentFlags(Flags::parse_list(
                arg.trim_start_matches('(').trim_end_matches(')'),
            ))),
            "NEWNAME" => arg.split_once(' ').map(|(old, new)| Self::NewName {
                old: old.to_string(),
                new: new.trim().to_string(),
            }),
            _ => None,
        };
        code.unwrap_or_else(|| Self::Unknown(text.to_string()))
    }

    /// Returns true for the codes that are ordinary SELECT/EXAMINE data.
    ///
    /// Those update session state without a user-visible notification.
    #[must_use]
    pub const fn is_select_data(&self) -> bool {
        matches!(
            self,
            Self::UidValidity(_)
                | Self::UidNext(_)
                | Self::PermanentFlags(_)
                | Self::ReadOnly
                | Self::ReadWrite
                | Self::Unseen(_)
                | Self::UidNotSticky
                | Self::Referral(_)
                | Self::Capability(_)
        )
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
    use crate::types::Flag;

    #[test]
    fn simple_codes() {
        assert_eq!(ResponseCode::parse("ALERT"), ResponseCode::Alert);
        assert_eq!(ResponseCode::parse("read-only"), ResponseCode::ReadOnly);
        assert_eq!(ResponseCode::parse("CLOSED"), ResponseCode::Closed);
    }

    #[test]
    fn numeric_codes() {
        assert_eq!(
            ResponseCode::parse("UIDVALIDITY 3857529045"),
            ResponseCode::UidValidity(3857529045)
        );
        assert_eq!(ResponseCode::parse("UIDNEXT 4392"), ResponseCode::UidNext(4392));
        assert_eq!(ResponseCode::parse("UNSEEN 12"), ResponseCode::Unseen(12));
    }

    #[test]
    fn malformed_numeric_is_unknown() {
        assert_eq!(
            ResponseCode::parse("UIDNEXT abc"),
            ResponseCode::Unknown("UIDNEXT abc".to_string())
        );
    }

    #[test]
    fn permanent_flags() {
        let ResponseCode::PermanentFlags(flags) =
            ResponseCode::parse("PERMANENTFLAGS (\\Deleted \\Seen \\*)")
        else {
            panic!("expected PERMANENTFLAGS");
        };
        assert!(flags.contains(&Flag::Deleted));
        assert!(flags.contains(&Flag::Seen));
        assert_eq!(flags.len(), 3);
    }

    #[test]
    fn referral_and_newname() {
        assert_eq!(
            ResponseCode::parse("REFERRAL imap://other/INBOX"),
            ResponseCode::Referral("imap://other/INBOX".to_string())
        );
        assert_eq!(
            ResponseCode::parse("NEWNAME old new"),
            ResponseCode::NewName {
                old: "old".to_string(),
                new: "new".to_string()
            }
        );
    }

    #[test]
    fn capability_code() {
        let ResponseCode::Capability(caps) = ResponseCode::parse("CAPABILITY IMAP4rev1 SORT")
        else {
            panic!("expected CAPABILITY");
        };
        assert_eq!(caps, vec![Capability::Imap4Rev1, Capability::Sort]);
    }

    #[test]
    fn select_data_classification() {
        assert!(ResponseCode::UidNext(1).is_select_data());
        assert!(ResponseCode::ReadOnly.is_select_data());
        assert!(!ResponseCode::Alert.is_select_data());
        assert!(!ResponseCode::TryCreate.is_select_data());
        assert!(!ResponseCode::Unknown("X".into()).is_select_data());
    }
}
