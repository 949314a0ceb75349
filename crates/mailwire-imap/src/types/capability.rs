//! Server capabilities and reply status.

use bitflags::bitflags;

/// Status keyword of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
    /// Server greeting (pre-authenticated).
    PreAuth,
    /// Server is closing connection.
    Bye,
}

impl Status {
    /// Parses an uppercase reply keyword.
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }

    /// Returns true if this is a successful status.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }
}

/// One atom from a CAPABILITY list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4` (RFC 1730)
    Imap4,
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// `IMAP2bis` (draft, FIND/BODY era)
    Imap2Bis,
    /// RFC 1176 IMAP2 semantics
    Rfc1176,
    /// STATUS command outside IMAP4rev1
    Status,
    /// SCAN command
    Scan,
    /// SORT command (RFC 5256)
    Sort,
    /// THREAD command with the named algorithm
    Thread(String),
    /// NAMESPACE command (RFC 2342)
    Namespace,
    /// RLIST/RLSUB (RFC 2193)
    MailboxReferrals,
    /// Login referrals (RFC 2221)
    LoginReferrals,
    /// STARTTLS support
    StartTls,
    /// LOGIN disabled
    LoginDisabled,
    /// UIDPLUS extension (RFC 4315)
    UidPlus,
    /// AUTH mechanism, from `AUTH=x` or the old `AUTH-x` form
    Auth(String),
    /// Anything else, kept verbatim
    Unknown(String),
}

impl Capability {
    /// Parses a capability atom.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4" => Self::Imap4,
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP2BIS" => Self::Imap2Bis,
            "RFC-1176" | "RFC1176" => Self::Rfc1176,
            "STATUS" => Self::Status,
            "SCAN" => Self::Scan,
            "NAMESPACE" => Self::Namespace,
            "MAILBOX-REFERRALS" => Self::MailboxReferrals,
            "LOGIN-REFERRALS" => Self::LoginReferrals,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "UIDPLUS" => Self::UidPlus,
            _ if upper.starts_with("SORT") => Self::Sort,
            _ if upper.starts_with("THREAD=") => Self::Thread(upper[7..].to_string()),
            _ if upper.starts_with("AUTH=") || upper.starts_with("AUTH-") => {
                Self::Auth(upper[5..].to_string())
            }
            _ => Self::Unknown(s.to_string()),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4 => write!(f, "IMAP4"),
            Self::Imap4Rev1 => write!(f, "IMAP4rev1"),
            Self::Imap2Bis => write!(f, "IMAP2bis"),
            Self::Rfc1176 => write!(f, "RFC-1176"),
            Self::Status => write!(f, "STATUS"),
            Self::Scan => write!(f, "SCAN"),
            Self::Sort => write!(f, "SORT"),
            Self::Thread(alg) => write!(f, "THREAD={alg}"),
            Self::Namespace => write!(f, "NAMESPACE"),
            Self::MailboxReferrals => write!(f, "MAILBOX-REFERRALS"),
            Self::LoginReferrals => write!(f, "LOGIN-REFERRALS"),
            Self::StartTls => write!(f, "STARTTLS"),
            Self::LoginDisabled => write!(f, "LOGINDISABLED"),
            Self::UidPlus => write!(f, "UIDPLUS"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

bitflags! {
    /// Protocol features that gate command selection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CapFlags: u32 {
        /// IMAP4 (RFC 1730)
        const IMAP4 = 1 << 0;
        /// IMAP4rev1
        const IMAP4REV1 = 1 << 1;
        /// IMAP2bis
        const IMAP2BIS = 1 << 2;
        /// RFC 1176
        const RFC1176 = 1 << 3;
        /// STATUS usable
        const STATUS = 1 << 4;
        /// SCAN usable
        const SCAN = 1 << 5;
        /// SORT usable
        const SORT = 1 << 6;
        /// NAMESPACE usable
        const NAMESPACE = 1 << 7;
        /// RLIST/RLSUB usable
        const MAILBOX_REFERRALS = 1 << 8;
        /// Login referrals
        const LOGIN_REFERRALS = 1 << 9;
        /// STARTTLS advertised
        const STARTTLS = 1 << 10;
        /// LOGIN forbidden
        const LOGIN_DISABLED = 1 << 11;
        /// UIDPLUS
        const UIDPLUS = 1 << 12;
    }
}

bitflags! {
    /// SASL mechanisms the server advertises and this engine can drive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AuthMechanisms: u8 {
        /// AUTHENTICATE LOGIN
        const LOGIN = 1 << 0;
        /// AUTHENTICATE PLAIN
        const PLAIN = 1 << 1;
        /// AUTHENTICATE XOAUTH2
        const XOAUTH2 = 1 << 2;
    }
}

impl AuthMechanisms {
    /// Maps a mechanism name to its bit.
    #[must_use]
    pub fn from_mechanism(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "LOGIN" => Self::LOGIN,
            "PLAIN" => Self::PLAIN,
            "XOAUTH2" => Self::XOAUTH2,
            _ => Self::empty(),
        }
    }
}

/// Coarse protocol generation of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolLevel {
    /// Plain IMAP2: ENVELOPE only, no UIDs.
    Imap2,
    /// IMAP2bis: FIND, BODY structures.
    Imap2Bis,
    /// IMAP4: UID commands, BODYSTRUCTURE.
    Imap4,
    /// IMAP4rev1: sections, HEADER.FIELDS, STATUS.
    Imap4Rev1,
}

/// The session's capability bits.
///
/// The effective set is what the server advertised minus what a BAD reply
/// has since disabled. Disabling is permanent for the connection: a later
/// CAPABILITY response replaces the advertised bits but cannot clear a
/// downgrade.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    advertised: CapFlags,
    disabled: CapFlags,
    auth: AuthMechanisms,
    threaders: Vec<String>,
    disabled_threaders: Vec<String>,
    raw: Vec<Capability>,
}

impl CapabilitySet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the advertised capabilities with a fresh CAPABILITY list.
    pub fn apply(&mut self, caps: &[Capability]) {
        self.advertised = CapFlags::empty();
        self.auth = AuthMechanisms::empty();
        self.threaders.clear();
        for cap in caps {
            match cap {
                Capability::Imap4 => self.advertised |= CapFlags::IMAP4,
                // rev1 implies everything IMAP4 and IMAP2bis had, plus STATUS
                Capability::Imap4Rev1 => {
                    self.advertised |= CapFlags::IMAP4REV1
                        | CapFlags::IMAP4
                        | CapFlags::IMAP2BIS
                        | CapFlags::STATUS;
                }
                Capability::Imap2Bis => self.advertised |= CapFlags::IMAP2BIS,
                Capability::Rfc1176 => self.advertised |= CapFlags::RFC1176,
                Capability::Status => self.advertised |= CapFlags::STATUS,
                Capability::Scan => self.advertised |= CapFlags::SCAN,
                Capability::Sort => self.advertised |= CapFlags::SORT,
                Capability::Thread(alg) => {
                    if !self.threaders.contains(alg) {
                        self.threaders.push(alg.clone());
                    }
                }
                Capability::Namespace => self.advertised |= CapFlags::NAMESPACE,
                Capability::MailboxReferrals => self.advertised |= CapFlags::MAILBOX_REFERRALS,
                Capability::LoginReferrals => self.advertised |= CapFlags::LOGIN_REFERRALS,
                Capability::StartTls => self.advertised |= CapFlags::STARTTLS,
                Capability::LoginDisabled => self.advertised |= CapFlags::LOGIN_DISABLED,
                Capability::UidPlus => self.advertised |= CapFlags::UIDPLUS,
                Capability::Auth(mech) => self.auth |= AuthMechanisms::from_mechanism(mech),
                Capability::Unknown(_) => {}
            }
        }
        self.raw = caps.to_vec();
    }

    /// Marks the server as IMAP2-era after CAPABILITY was rejected.
    pub fn assume_legacy(&mut self) {
        self.advertised |= CapFlags::IMAP2BIS | CapFlags::RFC1176;
    }

    /// Returns true if the feature is advertised and not downgraded.
    #[must_use]
    pub const fn has(&self, flag: CapFlags) -> bool {
        self.advertised.contains(flag) && !self.disabled.intersects(flag)
    }

    /// Permanently disables a feature for this connection.
    pub fn downgrade(&mut self, flag: CapFlags) {
        if !self.disabled.contains(flag) {
            tracing::debug!(?flag, "Capability downgraded");
        }
        self.disabled |= flag;
    }

    /// Permanently disables one THREAD algorithm for this connection.
    pub fn downgrade_thread(&mut self, algorithm: &str) {
        let algorithm = algorithm.to_ascii_uppercase();
        if !self.disabled_threaders.contains(&algorithm) {
            tracing::debug!(%algorithm, "THREAD algorithm downgraded");
            self.disabled_threaders.push(algorithm);
        }
    }

    /// Returns true if the feature was downgraded.
    #[must_use]
    pub const fn is_downgraded(&self, flag: CapFlags) -> bool {
        self.disabled.intersects(flag)
    }

    /// SASL mechanisms on offer.
    #[must_use]
    pub const fn auth_mechanisms(&self) -> AuthMechanisms {
        self.auth
    }

    /// Returns true if the server threads with the named algorithm.
    #[must_use]
    pub fn has_thread(&self, algorithm: &str) -> bool {
        self.threaders.iter().any(|t| t.eq_ignore_ascii_case(algorithm))
            && !self
                .disabled_threaders
                .iter()
                .any(|t| t.eq_ignore_ascii_case(algorithm))
    }

    /// Advertised thread algorithms.
    #[must_use]
    pub fn thread_algorithms(&self) -> &[String] {
        &self.threaders
    }

    /// The capability atoms as last received.
    #[must_use]
    pub fn raw(&self) -> &[Capability] {
        &self.raw
    }

    /// Protocol generation implied by the effective bits.
    #[must_use]
    pub const fn level(&self) -> ProtocolLevel {
        if self.has(CapFlags::IMAP4REV1) {
            ProtocolLevel::Imap4Rev1
        } else if self.has(CapFlags::IMAP4) {
            ProtocolLevel::Imap4
        } else if self.has(CapFlags::IMAP2BIS) {
            ProtocolLevel::Imap2Bis
        } else {
            ProtocolLevel::Imap2
        }
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

    fn parse_all(line: &str) -> Vec<Capability> {
        line.split_whitespace().map(Capability::parse).collect()
    }

    mod status_tests {
        use super::*;

        #[test]
        fn keywords() {
            assert_eq!(Status::from_keyword("OK"), Some(Status::Ok));
            assert_eq!(Status::from_keyword("PREAUTH"), Some(Status::PreAuth));
            assert_eq!(Status::from_keyword("EXISTS"), None);
        }

        #[test]
        fn is_ok() {
            assert!(Status::Ok.is_ok());
            assert!(Status::PreAuth.is_ok());
            assert!(!Status::No.is_ok());
            assert!(!Status::Bad.is_ok());
            assert!(!Status::Bye.is_ok());
        }
    }

    mod capability_parse_tests {
        use super::*;

        #[test]
        fn parse_levels() {
            assert_eq!(Capability::parse("imap4rev1"), Capability::Imap4Rev1);
            assert_eq!(Capability::parse("IMAP4"), Capability::Imap4);
            assert_eq!(Capability::parse("IMAP2bis"), Capability::Imap2Bis);
        }

        #[test]
        fn parse_auth_both_spellings() {
            assert_eq!(
                Capability::parse("AUTH=PLAIN"),
                Capability::Auth("PLAIN".to_string())
            );
            assert_eq!(
                Capability::parse("AUTH-LOGIN"),
                Capability::Auth("LOGIN".to_string())
            );
        }

        #[test]
        fn parse_sort_variants() {
            assert_eq!(Capability::parse("SORT"), Capability::Sort);
            assert_eq!(Capability::parse("SORT=DISPLAY"), Capability::Sort);
        }

        #[test]
        fn parse_thread() {
            assert_eq!(
                Capability::parse("THREAD=references"),
                Capability::Thread("REFERENCES".to_string())
            );
        }

        #[test]
        fn parse_unknown_kept() {
            assert_eq!(
                Capability::parse("XSOMETHING"),
                Capability::Unknown("XSOMETHING".to_string())
            );
        }

        #[test]
        fn display_round_trip() {
            assert_eq!(Capability::Imap4Rev1.to_string(), "IMAP4rev1");
            assert_eq!(Capability::Auth("PLAIN".into()).to_string(), "AUTH=PLAIN");
        }
    }

    mod set_tests {
        use super::*;

        #[test]
        fn rev1_implies_older_levels() {
            let mut set = CapabilitySet::new();
            set.apply(&parse_all("IMAP4rev1 AUTH=PLAIN SORT THREAD=ORDEREDSUBJECT"));
            assert!(set.has(CapFlags::IMAP4));
            assert!(set.has(CapFlags::STATUS));
            assert!(set.has(CapFlags::SORT));
            assert!(set.has_thread("orderedsubject"));
            assert!(!set.has_thread("REFERENCES"));
            assert_eq!(set.thread_algorithms(), ["ORDEREDSUBJECT".to_string()]);
            assert_eq!(set.auth_mechanisms(), AuthMechanisms::PLAIN);
            assert_eq!(set.level(), ProtocolLevel::Imap4Rev1);
        }

        #[test]
        fn downgrade_survives_new_capability_list() {
            let mut set = CapabilitySet::new();
            set.apply(&parse_all("IMAP4rev1"));
            set.downgrade(CapFlags::STATUS);
            assert!(!set.has(CapFlags::STATUS));
            set.apply(&parse_all("IMAP4rev1 STATUS"));
            assert!(!set.has(CapFlags::STATUS));
            assert!(set.is_downgraded(CapFlags::STATUS));
        }

        #[test]
        fn thread_downgrade_is_per_algorithm() {
            let mut set = CapabilitySet::new();
            set.apply(&parse_all("IMAP4rev1 THREAD=ORDEREDSUBJECT THREAD=REFERENCES"));
            set.downgrade_thread("orderedsubject");
            assert!(!set.has_thread("ORDEREDSUBJECT"));
            assert!(set.has_thread("REFERENCES"));
            set.apply(&parse_all("IMAP4rev1 THREAD=ORDEREDSUBJECT"));
            assert!(!set.has_thread("ORDEREDSUBJECT"));
        }

        #[test]
        fn legacy_assumption() {
            let mut set = CapabilitySet::new();
            set.assume_legacy();
            assert_eq!(set.level(), ProtocolLevel::Imap2Bis);
            set.downgrade(CapFlags::IMAP2BIS);
            assert_eq!(set.level(), ProtocolLevel::Imap2);
        }

        #[test]
        fn unknown_atoms_ignored() {
            let mut set = CapabilitySet::new();
            set.apply(&parse_all("XFOO IMAP4 XBAR"));
            assert_eq!(set.level(), ProtocolLevel::Imap4);
            assert_eq!(set.raw().len(), 3);
        }
    }
}
