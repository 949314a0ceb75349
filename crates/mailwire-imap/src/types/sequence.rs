//! Sequence sets for message ranges.
//!
//! The same type carries sequence numbers and UIDs; whether a set is read
//! as one or the other is decided by the command that uses it.

use super::SeqNum;

/// Sequence set for specifying message ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceSet {
    /// Single number.
    Single(SeqNum),
    /// Inclusive range.
    Range(SeqNum, SeqNum),
    /// Range from start to the end of the mailbox.
    RangeFrom(SeqNum),
    /// The last message (`*`).
    All,
    /// Comma-joined list of specifications.
    Set(Vec<Self>),
}

impl SequenceSet {
    /// Creates a sequence set from a single number.
    #[must_use]
    pub fn single(n: u32) -> Option<Self> {
        SeqNum::new(n).map(Self::Single)
    }

    /// Creates a range sequence set.
    #[must_use]
    pub fn range(start: u32, end: u32) -> Option<Self> {
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
        if lo == hi {
            return Self::single(lo);
        }
        Some(Self::Range(SeqNum::new(lo)?, SeqNum::new(hi)?))
    }

    /// Builds a compact set from arbitrary numbers, merging consecutive runs.
    ///
    /// Zeros are dropped; returns `None` if nothing remains.
    #[must_use]
    pub fn from_numbers(numbers: &[u32]) -> Option<Self> {
        let mut sorted: Vec<u32> = numbers.iter().copied().filter(|&n| n > 0).collect();
        sorted.sort_unstable();
        sorted.dedup();
        let mut items = Vec::new();
        let mut iter = sorted.into_iter();
        let mut start = iter.next()?;
        let mut end = start;
        for n in iter {
            if n == end + 1 {
                end = n;
            } else {
                items.extend(Self::range(start, end));
                start = n;
                end = n;
            }
        }
        items.extend(Self::range(start, end));
        Some(Self::from_items(items))
    }

    /// Flattened top-level items of the set.
    #[must_use]
    pub fn items(&self) -> Vec<&Self> {
        match self {
            Self::Set(items) => items.iter().flat_map(Self::items).collect(),
            other => vec![other],
        }
    }

    /// Returns true if `n` falls in the set; `*` is resolved against `last`.
    /// Ranges are inclusive in either order, so `5:2` covers 2 through 5.
    #[must_use]
    pub fn contains(&self, n: u32, last: u32) -> bool {
        let between = |a: u32, b: u32| (a.min(b)..=a.max(b)).contains(&n);
        match self {
            Self::Single(s) => s.get() == n,
            Self::Range(a, b) => between(a.get(), b.get()),
            Self::RangeFrom(a) => between(a.get(), last),
            Self::All => n == last,
            Self::Set(items) => items.iter().any(|i| i.contains(n, last)),
        }
    }

    /// Splits the set into pieces whose rendering fits in `max_len`.
    ///
    /// A set that fits comes back whole. Splits happen only on item
    /// boundaries, so each piece is itself a valid sequence set.
    #[must_use]
    pub fn chunks(&self, max_len: usize) -> Vec<Self> {
        let mut out = Vec::new();
        let mut current: Vec<Self> = Vec::new();
        let mut len = 0usize;
        for item in self.items() {
            let piece = item.to_string().len();
            if !current.is_empty() && len + 1 + piece > max_len {
                out.push(Self::from_items(std::mem::take(&mut current)));
                len = 0;
            }
            if !current.is_empty() {
                len += 1;
            }
            len += piece;
            current.push(item.clone());
        }
        if !current.is_empty() {
            out.push(Self::from_items(current));
        }
        out
    }

    fn from_items(mut items: Vec<Self>) -> Self {
        if items.len() == 1 {
            items.remove(0)
        } else {
            Self::Set(items)
        }
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::RangeFrom(start) => write!(f, "{start}:*"),
            Self::All => write!(f, "*"),
            Self::Set(items) => {
                let s: Vec<_> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", s.join(","))
            }
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

    #[test]
    fn display_forms() {
        assert_eq!(SequenceSet::single(1).unwrap().to_string(), "1");
        assert_eq!(SequenceSet::range(1, 10).unwrap().to_string(), "1:10");
        assert_eq!(SequenceSet::range(10, 1).unwrap().to_string(), "1:10");
        assert_eq!(SequenceSet::All.to_string(), "*");
        assert_eq!(
            SequenceSet::RangeFrom(SeqNum::new(5).unwrap()).to_string(),
            "5:*"
        );
    }

    #[test]
    fn zero_rejected() {
        assert!(SequenceSet::single(0).is_none());
        assert!(SequenceSet::range(0, 4).is_none());
        assert!(SequenceSet::from_numbers(&[0]).is_none());
    }

    #[test]
    fn from_numbers_merges_runs() {
        let set = SequenceSet::from_numbers(&[7, 1, 2, 3, 5, 6, 10, 2]).unwrap();
        assert_eq!(set.to_string(), "1:3,5:7,10");
        assert_eq!(SequenceSet::from_numbers(&[4]).unwrap().to_string(), "4");
    }

    #[test]
    fn contains_resolves_star() {
        let set = SequenceSet::from_numbers(&[1, 2, 9]).unwrap();
        assert!(set.contains(2, 20));
        assert!(!set.contains(3, 20));
        assert!(SequenceSet::All.contains(20, 20));
        assert!(!SequenceSet::All.contains(19, 20));
    }

    #[test]
    fn reversed_range_is_normalized() {
        let set = SequenceSet::Range(SeqNum::new(5).unwrap(), SeqNum::new(2).unwrap());
        assert!(set.contains(2, 10));
        assert!(set.contains(4, 10));
        assert!(set.contains(5, 10));
        assert!(!set.contains(6, 10));
        assert!(!set.contains(1, 10));
        let tail = SequenceSet::RangeFrom(SeqNum::new(7).unwrap());
        assert!(tail.contains(5, 5));
        assert!(!tail.contains(4, 5));
    }

    #[test]
    fn short_set_is_one_chunk() {
        let set = SequenceSet::from_numbers(&[1, 3, 5]).unwrap();
        assert_eq!(set.chunks(1000), vec![set.clone()]);
    }

    #[test]
    fn long_set_splits_on_item_boundaries() {
        let numbers: Vec<u32> = (1..=600).map(|n| n * 2).collect();
        let set = SequenceSet::from_numbers(&numbers).unwrap();
        let chunks: Vec<String> = set.chunks(100).iter().map(ToString::to_string).collect();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 100));
        assert!(chunks.iter().all(|c| !c.starts_with(',') && !c.ends_with(',')));
        let rejoined = chunks.join(",");
        assert_eq!(rejoined, set.to_string());
    }
}
