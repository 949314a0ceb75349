//! Per-message cache.
//!
//! One slot per message of the selected mailbox, indexed by sequence
//! number and filled lazily. EXPUNGE removes a slot and shifts every later
//! slot down by one; that is the only operation that renumbers.
//!
//! In short-cache mode envelopes and bodies are not kept per message: a
//! single scratch slot holds the most recently parsed pair, and fetching
//! another message's structure replaces it.

use std::collections::HashMap;

use bitflags::bitflags;
use bytes::Bytes;

use crate::types::{Body, Envelope, SystemFlags};

bitflags! {
    /// What [`MessageCache::gc`] discards.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GcFlags: u8 {
        /// Envelopes and body structures.
        const ENVELOPES = 1 << 0;
        /// Fetched header, text and section contents.
        const TEXTS = 1 << 1;
        /// Entire entries, so they are refetched on next use.
        const ENTRIES = 1 << 2;
    }
}

/// Cached knowledge about one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    /// System flags.
    pub flags: SystemFlags,
    /// Cataloged user keywords, as a mask over the session keyword table.
    pub user_flags: u32,
    /// UID.
    pub uid: Option<u32>,
    /// INTERNALDATE as sent by the server.
    pub internal_date: Option<String>,
    /// RFC822.SIZE.
    pub size: Option<u32>,
    /// Flags have been fetched at least once.
    pub valid: bool,
    /// Hit by the last sequence-number SEARCH.
    pub searched: bool,
    /// Envelope (unused in short-cache mode).
    pub envelope: Option<Envelope>,
    /// Body structure (unused in short-cache mode).
    pub body: Option<Body>,
    /// Full header.
    pub header: Option<Bytes>,
    /// Body text.
    pub text: Option<Bytes>,
    /// Other fetched sections, keyed by wire section text. `None` records
    /// a NIL answer, which is distinct from an empty string.
    pub sections: HashMap<String, Option<Bytes>>,
}

/// The short-cache scratch slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scratch {
    /// Message the slot describes; 0 when empty.
    pub seq: u32,
    /// Its envelope.
    pub envelope: Option<Envelope>,
    /// Its body structure.
    pub body: Option<Body>,
}

/// Lazily filled per-message cache.
#[derive(Debug, Clone, Default)]
pub struct MessageCache {
    entries: Vec<Option<CacheEntry>>,
    short: bool,
    scratch: Scratch,
}

impl MessageCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(short_cache: bool) -> Self {
        Self {
            entries: Vec::new(),
            short: short_cache,
            scratch: Scratch::default(),
        }
    }

    /// Number of messages the cache covers.
    #[must_use]
    pub fn len(&self) -> u32 {
        u32::try_from(self.entries.len()).unwrap_or(u32::MAX)
    }

    /// Returns true for an empty mailbox.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true in short-cache mode.
    #[must_use]
    pub const fn is_short(&self) -> bool {
        self.short
    }

    /// Sets the message count, dropping entries past the new end.
    pub fn resize(&mut self, count: u32) {
        self.entries.resize_with(count as usize, || None);
        if self.scratch.seq > count {
            self.scratch = Scratch::default();
        }
    }

    /// Drops everything, as when a new mailbox is selected.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.scratch = Scratch::default();
    }

    fn index(&self, seq: u32) -> Option<usize> {
        let i = usize::try_from(seq).ok()?.checked_sub(1)?;
        (i < self.entries.len()).then_some(i)
    }

    /// Entry for `seq` if it has been created.
    #[must_use]
    pub fn get(&self, seq: u32) -> Option<&CacheEntry> {
        self.index(seq).and_then(|i| self.entries[i].as_ref())
    }

    /// Entry for `seq`, created on first access. `None` when `seq` is out
    /// of range.
    pub fn entry(&mut self, seq: u32) -> Option<&mut CacheEntry> {
        let i = self.index(seq)?;
        Some(self.entries[i].get_or_insert_with(CacheEntry::default))
    }

    /// Removes message `seq`; later messages move down by one.
    pub fn expunge(&mut self, seq: u32) -> bool {
        let Some(i) = self.index(seq) else {
            return false;
        };
        self.entries.remove(i);
        if self.scratch.seq == seq {
            self.scratch = Scratch::default();
        } else if self.scratch.seq > seq {
            self.scratch.seq -= 1;
        }
        true
    }

    /// Sequence number of the message with `uid`, if cached.
    #[must_use]
    pub fn find_uid(&self, uid: u32) -> Option<u32> {
        self.entries
            .iter()
            .position(|e| e.as_ref().and_then(|e| e.uid) == Some(uid))
            .and_then(|i| u32::try_from(i + 1).ok())
    }

    /// Forgets every cached UID.
    pub fn invalidate_uids(&mut self) {
        for entry in self.entries.iter_mut().flatten() {
            entry.uid = None;
        }
    }

    /// Clears every `searched` mark.
    pub fn clear_searched(&mut self) {
        for entry in self.entries.iter_mut().flatten() {
            entry.searched = false;
        }
    }

    /// Sequence numbers marked by the last search.
    #[must_use]
    pub fn searched(&self) -> Vec<u32> {
        (1..=self.len())
            .filter(|&seq| self.get(seq).is_some_and(|e| e.searched))
            .collect()
    }

    /// Envelope of `seq`, from the entry or the scratch slot.
    #[must_use]
    pub fn envelope(&self, seq: u32) -> Option<&Envelope> {
        if self.short {
            return (self.scratch.seq == seq)
                .then_some(self.scratch.envelope.as_ref())
                .flatten();
        }
        self.get(seq).and_then(|e| e.envelope.as_ref())
    }

    /// Body structure of `seq`, from the entry or the scratch slot.
    #[must_use]
    pub fn body(&self, seq: u32) -> Option<&Body> {
        if self.short {
            return (self.scratch.seq == seq)
                .then_some(self.scratch.body.as_ref())
                .flatten();
        }
        self.get(seq).and_then(|e| e.body.as_ref())
    }

    fn scratch_for(&mut self, seq: u32) -> &mut Scratch {
        if self.scratch.seq != seq {
            self.scratch = Scratch {
                seq,
                ..Scratch::default()
            };
        }
        &mut self.scratch
    }

    /// Stores an envelope, replacing any previous one for `seq`.
    pub fn set_envelope(&mut self, seq: u32, envelope: Envelope) {
        if self.short {
            if self.index(seq).is_some() {
                self.scratch_for(seq).envelope = Some(envelope);
            }
        } else if let Some(entry) = self.entry(seq) {
            entry.envelope = Some(envelope);
        }
    }

    /// Stores a body structure, replacing any previous one for `seq`.
    pub fn set_body(&mut self, seq: u32, body: Body) {
        if self.short {
            if self.index(seq).is_some() {
                self.scratch_for(seq).body = Some(body);
            }
        } else if let Some(entry) = self.entry(seq) {
            entry.body = Some(body);
        }
    }

    /// Mutable envelope of `seq`, for filling in news fields.
    pub fn envelope_mut(&mut self, seq: u32) -> Option<&mut Envelope> {
        if self.short {
            return if self.scratch.seq == seq {
                self.scratch.envelope.as_mut()
            } else {
                None
            };
        }
        self.index(seq)
            .and_then(|i| self.entries[i].as_mut())
            .and_then(|e| e.envelope.as_mut())
    }

    /// Discards cached data.
    pub fn gc(&mut self, what: GcFlags) {
        if what.contains(GcFlags::ENTRIES) {
            for slot in &mut self.entries {
                *slot = None;
            }
            self.scratch = Scratch::default();
            return;
        }
        if what.contains(GcFlags::ENVELOPES) {
            self.scratch = Scratch::default();
        }
        for entry in self.entries.iter_mut().flatten() {
            if what.contains(GcFlags::ENVELOPES) {
                entry.envelope = None;
                entry.body = None;
            }
            if what.contains(GcFlags::TEXTS) {
                entry.header = None;
                entry.text = None;
                entry.sections.clear();
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

    fn with_uids(n: u32) -> MessageCache {
        let mut cache = MessageCache::new(false);
        cache.resize(n);
        for seq in 1..=n {
            cache.entry(seq).unwrap().uid = Some(seq * 10);
        }
        cache
    }

    #[test]
    fn expunge_shifts_later_entries() {
        let mut cache = with_uids(5);
        assert!(cache.expunge(3));
        assert_eq!(cache.len(), 4);
        let uids: Vec<_> = (1..=4).map(|s| cache.get(s).unwrap().uid.unwrap()).collect();
        assert_eq!(uids, vec![10, 20, 40, 50]);
        assert_eq!(cache.find_uid(40), Some(3));
        assert_eq!(cache.find_uid(30), None);
    }

    #[test]
    fn expunge_out_of_range() {
        let mut cache = with_uids(2);
        assert!(!cache.expunge(3));
        assert!(!cache.expunge(0));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn entries_are_lazy() {
        let mut cache = MessageCache::new(false);
        cache.resize(3);
        assert!(cache.get(2).is_none());
        cache.entry(2).unwrap().valid = true;
        assert!(cache.get(2).unwrap().valid);
        assert!(cache.entry(4).is_none());
    }

    #[test]
    fn short_cache_keeps_one_structure() {
        let mut cache = MessageCache::new(true);
        cache.resize(3);
        cache.set_envelope(1, Envelope::default());
        assert!(cache.envelope(1).is_some());
        cache.set_envelope(2, Envelope::default());
        assert!(cache.envelope(1).is_none());
        assert!(cache.envelope(2).is_some());
        assert!(cache.get(2).is_none_or(|e| e.envelope.is_none()));
        cache.expunge(1);
        assert!(cache.envelope(1).is_some());
    }

    #[test]
    fn gc_drops_requested_data() {
        let mut cache = with_uids(2);
        cache.set_envelope(1, Envelope::default());
        cache.entry(1).unwrap().text = Some(Bytes::from_static(b"hi"));
        cache.gc(GcFlags::TEXTS);
        assert!(cache.get(1).unwrap().text.is_none());
        assert!(cache.envelope(1).is_some());
        cache.gc(GcFlags::ENVELOPES);
        assert!(cache.envelope(1).is_none());
        assert_eq!(cache.get(1).unwrap().uid, Some(10));
        cache.gc(GcFlags::ENTRIES);
        assert!(cache.get(1).is_none());
    }
}
