//! Command tag generator.
//!
//! Tags match commands with their completion replies.

/// Per-connection tag generator.
///
/// Generates sequential tags in the format "A0000", "A0001", etc. The
/// counter is 64 bits wide, so tags never repeat within a connection.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    counter: u64,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { counter: 0, prefix }
    }

    /// Generates the next tag.
    pub fn next_tag(&mut self) -> String {
        let n = self.counter;
        self.counter += 1;
        format!("{}{:04}", self.prefix, n)
    }

    /// Number of tags handed out so far.
    #[must_use]
    pub const fn issued(&self) -> u64 {
        self.counter
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
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
    fn test_tag_generation() {
        let mut generator = TagGenerator::default();
        assert_eq!(generator.next_tag(), "A0000");
        assert_eq!(generator.next_tag(), "A0001");
        assert_eq!(generator.issued(), 2);
    }

    #[test]
    fn test_custom_prefix() {
        let mut generator = TagGenerator::new('T');
        assert_eq!(generator.next_tag(), "T0000");
    }

    #[test]
    fn test_uniqueness_past_padding() {
        let mut generator = TagGenerator::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..12000 {
            assert!(seen.insert(generator.next_tag()), "duplicate tag generated");
        }
        assert_eq!(generator.next_tag(), "A12000");
    }
}
