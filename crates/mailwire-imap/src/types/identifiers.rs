//! Message sequence numbers.

use std::num::NonZeroU32;

/// Message sequence number.
///
/// Sequence numbers are 1-based positions in the open mailbox. They shift
/// down by one for every message expunged in front of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(pub NonZeroU32);

impl SeqNum {
    /// Creates a new sequence number.
    ///
    /// Returns `None` if the value is 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for SeqNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
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
    fn zero_is_not_a_message_number() {
        assert!(SeqNum::new(0).is_none());
    }

    #[test]
    fn ordering_follows_value() {
        assert!(SeqNum::new(1).unwrap() < SeqNum::new(2).unwrap());
        assert_eq!(SeqNum::new(u32::MAX).unwrap().get(), u32::MAX);
        assert_eq!(SeqNum::new(987654321).unwrap().to_string(), "987654321");
    }
}
