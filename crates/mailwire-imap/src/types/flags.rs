//! Message flags and the per-session keyword table.

use bitflags::bitflags;

/// A single message flag as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read.
    Seen,
    /// Message has been answered.
    Answered,
    /// Message is flagged for special attention.
    Flagged,
    /// Message is marked for deletion.
    Deleted,
    /// Message is a draft.
    Draft,
    /// Message is recent (first session to see it).
    Recent,
    /// User keyword.
    Keyword(String),
}

impl Flag {
    /// Parses a flag atom.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "\\SEEN" => Self::Seen,
            "\\ANSWERED" => Self::Answered,
            "\\FLAGGED" => Self::Flagged,
            "\\DELETED" => Self::Deleted,
            "\\DRAFT" => Self::Draft,
            "\\RECENT" => Self::Recent,
            _ => Self::Keyword(s.to_string()),
        }
    }

    /// Returns the flag as an IMAP atom.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(s) => s,
        }
    }

    /// The system-flag bit for this flag, empty for keywords.
    #[must_use]
    pub const fn system_bit(&self) -> SystemFlags {
        match self {
            Self::Seen => SystemFlags::SEEN,
            Self::Answered => SystemFlags::ANSWERED,
            Self::Flagged => SystemFlags::FLAGGED,
            Self::Deleted => SystemFlags::DELETED,
            Self::Draft => SystemFlags::DRAFT,
            Self::Recent => SystemFlags::RECENT,
            Self::Keyword(_) => SystemFlags::empty(),
        }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

bitflags! {
    /// System flags held in a cache entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct SystemFlags: u8 {
        /// `\Seen`
        const SEEN = 1 << 0;
        /// `\Deleted`
        const DELETED = 1 << 1;
        /// `\Flagged`
        const FLAGGED = 1 << 2;
        /// `\Answered`
        const ANSWERED = 1 << 3;
        /// `\Draft`
        const DRAFT = 1 << 4;
        /// `\Recent`
        const RECENT = 1 << 5;
    }
}

/// Ordered, duplicate-free list of flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    flags: Vec<Flag>,
}

impl Flags {
    /// Creates an empty flag list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates flags from a vector, dropping duplicates.
    #[must_use]
    pub fn from_vec(flags: Vec<Flag>) -> Self {
        let mut out = Self::new();
        for flag in flags {
            out.insert(flag);
        }
        out
    }

    /// Parses a space-separated flag string such as `"\\Seen $Work"`.
    #[must_use]
    pub fn parse_list(s: &str) -> Self {
        Self::from_vec(s.split_whitespace().map(Flag::parse).collect())
    }

    /// Adds a flag.
    pub fn insert(&mut self, flag: Flag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }

    /// Removes a flag.
    pub fn remove(&mut self, flag: &Flag) {
        self.flags.retain(|f| f != flag);
    }

    /// Returns true if the flag is present.
    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    /// System-flag bits of this list.
    #[must_use]
    pub fn system(&self) -> SystemFlags {
        self.flags
            .iter()
            .fold(SystemFlags::empty(), |acc, f| acc | f.system_bit())
    }

    /// Keyword names of this list, in order.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().filter_map(|f| match f {
            Flag::Keyword(k) => Some(k.as_str()),
            _ => None,
        })
    }

    /// Returns an iterator over the flags.
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }

    /// Returns the number of flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns true if there are no flags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl IntoIterator for Flags {
    type Item = Flag;
    type IntoIter = std::vec::IntoIter<Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.flags.into_iter()
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

/// Per-session table mapping user keywords to bit positions.
///
/// Filled from the mailbox's `FLAGS (...)` reply. Keywords beyond the slot
/// limit stay uncataloged: they are still reported by name, but have no bit
/// in a cache entry's keyword mask.
#[derive(Debug, Clone)]
pub struct KeywordTable {
    names: Vec<String>,
    slots: usize,
}

impl KeywordTable {
    /// Creates an empty table with `slots` positions (at most 32).
    #[must_use]
    pub fn new(slots: usize) -> Self {
        Self {
            names: Vec::new(),
            slots: slots.min(32),
        }
    }

    /// Replaces the table with the keywords of a FLAGS reply.
    pub fn replace(&mut self, flags: &Flags) {
        self.names.clear();
        for keyword in flags.keywords() {
            if self.names.len() >= self.slots {
                break;
            }
            self.names.push(keyword.to_string());
        }
    }

    /// Bit mask for a keyword, case-insensitive.
    #[must_use]
    pub fn mask_of(&self, keyword: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(keyword))
            .map(|i| 1u32 << i)
    }

    /// Mask covering every cataloged keyword in `flags`.
    #[must_use]
    pub fn mask_for(&self, flags: &Flags) -> u32 {
        flags
            .keywords()
            .filter_map(|k| self.mask_of(k))
            .fold(0, |acc, m| acc | m)
    }

    /// Keyword names selected by a mask, in table order.
    #[must_use]
    pub fn names_for(&self, mask: u32) -> Vec<&str> {
        self.names
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1u32 << i) != 0)
            .map(|(_, n)| n.as_str())
            .collect()
    }

    /// Number of cataloged keywords.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no keyword is cataloged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Slot limit.
    #[must_use]
    pub const fn slots(&self) -> usize {
        self.slots
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

    mod flag_tests {
        use super::*;

        #[test]
        fn parse_system_flags_case_insensitively() {
            assert_eq!(Flag::parse("\\Seen"), Flag::Seen);
            assert_eq!(Flag::parse("\\SEEN"), Flag::Seen);
            assert_eq!(Flag::parse("\\deleted"), Flag::Deleted);
        }

        #[test]
        fn parse_keyword() {
            assert_eq!(
                Flag::parse("$Important"),
                Flag::Keyword("$Important".to_string())
            );
        }

        #[test]
        fn system_bits() {
            assert_eq!(Flag::Draft.system_bit(), SystemFlags::DRAFT);
            assert!(Flag::Keyword("x".into()).system_bit().is_empty());
        }
    }

    mod flags_tests {
        use super::*;

        #[test]
        fn from_vec_dedups() {
            let flags = Flags::from_vec(vec![Flag::Seen, Flag::Seen, Flag::Answered]);
            assert_eq!(flags.len(), 2);
        }

        #[test]
        fn system_mask() {
            let flags = Flags::parse_list("\\Seen \\Flagged $Work");
            assert_eq!(flags.system(), SystemFlags::SEEN | SystemFlags::FLAGGED);
            assert_eq!(flags.keywords().collect::<Vec<_>>(), vec!["$Work"]);
        }

        #[test]
        fn remove() {
            let mut flags = Flags::parse_list("\\Seen \\Answered");
            flags.remove(&Flag::Seen);
            assert!(!flags.contains(&Flag::Seen));
            assert!(flags.contains(&Flag::Answered));
        }
    }

    mod keyword_table_tests {
        use super::*;

        #[test]
        fn masks_follow_table_order() {
            let mut table = KeywordTable::new(30);
            table.replace(&Flags::parse_list("\\Seen Work Home"));
            assert_eq!(table.len(), 2);
            assert_eq!(table.mask_of("work"), Some(1));
            assert_eq!(table.mask_of("Home"), Some(2));
            assert_eq!(table.mask_of("Other"), None);
            assert_eq!(table.names_for(3), vec!["Work", "Home"]);
        }

        #[test]
        fn excess_keywords_are_uncataloged() {
            let mut table = KeywordTable::new(2);
            table.replace(&Flags::parse_list("a b c"));
            assert_eq!(table.len(), 2);
            assert_eq!(table.mask_of("c"), None);
            assert_eq!(table.mask_for(&Flags::parse_list("a c")), 1);
        }

        #[test]
        fn replace_clears_previous() {
            let mut table = KeywordTable::new(30);
            table.replace(&Flags::parse_list("old"));
            table.replace(&Flags::parse_list("new"));
            assert_eq!(table.mask_of("old"), None);
            assert_eq!(table.mask_of("new"), Some(1));
        }
    }
}
