//! Client-side SORT and THREAD for servers that lack them.
//!
//! Both follow RFC 5256: subjects compare by their base subject, a
//! message without a usable Date header sorts by its internal date, and
//! ties fall back to sequence order.

use std::cmp::Ordering;

use chrono::DateTime;

use crate::command::{SortKey, SortProgram};
use crate::types::{Envelope, ThreadNode, recipients};

/// What the client-side sorter knows about one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortInput {
    /// Number reported back (sequence number or UID).
    pub number: u32,
    /// Sent date, seconds since the epoch.
    pub date: Option<i64>,
    /// Internal date, seconds since the epoch.
    pub arrival: Option<i64>,
    /// Lowercased mailbox of the first From address.
    pub from: String,
    /// Lowercased mailbox of the first To address.
    pub to: String,
    /// Lowercased mailbox of the first Cc address.
    pub cc: String,
    /// Base subject.
    pub subject: String,
    /// RFC822 size.
    pub size: u32,
}

impl SortInput {
    /// Builds the sort record from cached message data.
    #[must_use]
    pub fn from_cache(
        number: u32,
        envelope: Option<&Envelope>,
        internal_date: Option<&str>,
        size: Option<u32>,
    ) -> Self {
        let first = |list: &[crate::types::Address]| {
            recipients(list)
                .next()
                .and_then(|a| a.mailbox.as_deref())
                .unwrap_or_default()
                .to_ascii_lowercase()
        };
        let arrival = internal_date.and_then(parse_internal_date);
        Self {
            number,
            date: envelope
                .and_then(|e| e.date.as_deref())
                .and_then(parse_header_date)
                .or(arrival),
            arrival,
            from: envelope.map(|e| first(&e.from)).unwrap_or_default(),
            to: envelope.map(|e| first(&e.to)).unwrap_or_default(),
            cc: envelope.map(|e| first(&e.cc)).unwrap_or_default(),
            subject: envelope
                .and_then(|e| e.subject.as_deref())
                .map(base_subject)
                .unwrap_or_default(),
            size: size.unwrap_or_default(),
        }
    }
}

/// Parses an RFC 822 Date header.
#[must_use]
pub fn parse_header_date(s: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(s.trim())
        .ok()
        .map(|d| d.timestamp())
}

/// Parses an INTERNALDATE (`dd-Mon-yyyy hh:mm:ss +zzzz`).
#[must_use]
pub fn parse_internal_date(s: &str) -> Option<i64> {
    DateTime::parse_from_str(s.trim(), "%d-%b-%Y %H:%M:%S %z")
        .ok()
        .map(|d| d.timestamp())
}

/// Reduces a subject to its base subject: reply and forward markers,
/// leading `[tags]` and trailing `(fwd)` removed, whitespace collapsed,
/// uppercased for comparison.
#[must_use]
pub fn base_subject(subject: &str) -> String {
    let mut s = subject.split_whitespace().collect::<Vec<_>>().join(" ");
    loop {
        let before = s.len();
        while let Some(rest) = strip_suffix_ci(&s, "(fwd)") {
            s = rest.trim_end().to_string();
        }
        loop {
            let trimmed = s.trim_start();
            if let Some(rest) = strip_reply_marker(trimmed) {
                s = rest.to_string();
            } else if let Some(rest) = strip_blob(trimmed).filter(|r| !r.trim().is_empty()) {
                s = rest.to_string();
            } else {
                s = trimmed.to_string();
                break;
            }
        }
        if let Some(inner) = s
            .strip_prefix("[fwd:")
            .or_else(|| s.strip_prefix("[FWD:"))
            .or_else(|| s.strip_prefix("[Fwd:"))
            .and_then(|r| r.strip_suffix(']'))
        {
            s = inner.to_string();
        }
        if s.len() == before {
            break;
        }
    }
    s.trim().to_uppercase()
}

fn strip_suffix_ci<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let cut = s.len().checked_sub(suffix.len())?;
    let tail = s.get(cut..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &s[..cut])
}

/// Strips `re:`, `fw:`, `fwd:`, each optionally followed by `[blob]`.
fn strip_reply_marker(s: &str) -> Option<&str> {
    let lower = s.get(..4).unwrap_or(s).to_ascii_lowercase();
    let len = ["fwd", "re", "fw"]
        .into_iter()
        .find(|m| lower.starts_with(m))
        .map(str::len)?;
    let mut rest = s[len..].trim_start();
    if let Some(after) = strip_blob(rest) {
        rest = after;
    }
    rest.strip_prefix(':')
}

fn strip_blob(s: &str) -> Option<&str> {
    let inner = s.strip_prefix('[')?;
    let close = inner.find(']')?;
    if inner[..close].contains('[') {
        return None;
    }
    Some(inner[close + 1..].trim_start())
}

fn compare(a: &SortInput, b: &SortInput, key: SortKey) -> Ordering {
    match key {
        SortKey::Arrival => a.arrival.unwrap_or_default().cmp(&b.arrival.unwrap_or_default()),
        SortKey::Date => a.date.unwrap_or_default().cmp(&b.date.unwrap_or_default()),
        SortKey::From => a.from.cmp(&b.from),
        SortKey::To => a.to.cmp(&b.to),
        SortKey::Cc => a.cc.cmp(&b.cc),
        SortKey::Subject => a.subject.cmp(&b.subject),
        SortKey::Size => a.size.cmp(&b.size),
    }
}

/// Sorts messages by `program`, returning their numbers.
#[must_use]
pub fn sort_messages(inputs: &[SortInput], program: &SortProgram) -> Vec<u32> {
    let mut order: Vec<&SortInput> = inputs.iter().collect();
    order.sort_by(|a, b| {
        program
            .criteria
            .iter()
            .map(|c| {
                let o = compare(a, b, c.key);
                if c.reverse { o.reverse() } else { o }
            })
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.number.cmp(&b.number))
    });
    order.into_iter().map(|i| i.number).collect()
}

/// ORDEREDSUBJECT threading.
///
/// Messages sharing a base subject form one thread: the earliest is the
/// root and the rest are its children in date order. Threads are ordered
/// by their root's date.
#[must_use]
pub fn thread_ordered_subject(inputs: &[SortInput]) -> Vec<ThreadNode> {
    let mut order: Vec<&SortInput> = inputs.iter().collect();
    order.sort_by(|a, b| {
        a.subject
            .cmp(&b.subject)
            .then(a.date.unwrap_or_default().cmp(&b.date.unwrap_or_default()))
            .then(a.number.cmp(&b.number))
    });

    let mut threads: Vec<(i64, u32, ThreadNode)> = Vec::new();
    let mut current: Option<&str> = None;
    for input in order {
        if current == Some(input.subject.as_str())
            && let Some((_, _, root)) = threads.last_mut()
        {
            root.children.push(ThreadNode::leaf(input.number));
            continue;
        }
        threads.push((
            input.date.unwrap_or_default(),
            input.number,
            ThreadNode::leaf(input.number),
        ));
        current = Some(&input.subject);
    }
    threads.sort_by_key(|(date, number, _)| (*date, *number));
    threads.into_iter().map(|(_, _, node)| node).collect()
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

    fn input(number: u32, subject: &str, date: i64, size: u32) -> SortInput {
        SortInput {
            number,
            date: Some(date),
            arrival: Some(date),
            subject: base_subject(subject),
            size,
            ..SortInput::default()
        }
    }

    #[test]
    fn test_base_subject() {
        assert_eq!(base_subject("Hello"), "HELLO");
        assert_eq!(base_subject("Re: Hello"), "HELLO");
        assert_eq!(base_subject("RE: re: Fwd: Hello"), "HELLO");
        assert_eq!(base_subject("Re[2]: Hello"), "HELLO");
        assert_eq!(base_subject("[list] Re: Hello  world (fwd)"), "HELLO WORLD");
        assert_eq!(base_subject("[Fwd: Hello]"), "HELLO");
        assert_eq!(base_subject("[only]"), "[ONLY]");
        assert_eq!(base_subject("Reply needed"), "REPLY NEEDED");
        assert_eq!(base_subject(""), "");
    }

    #[test]
    fn test_dates() {
        assert_eq!(
            parse_header_date("Mon, 7 Feb 1994 21:52:25 -0800"),
            Some(760_686_745)
        );
        assert_eq!(
            parse_internal_date("17-Jul-1996 02:44:25 -0700"),
            Some(837_596_665)
        );
        assert!(parse_internal_date(" 7-Jul-1996 02:44:25 -0700").is_some());
        assert_eq!(parse_header_date("garbage"), None);
    }

    #[test]
    fn test_sort_by_size_then_number() {
        let inputs = [input(1, "a", 30, 500), input(2, "b", 20, 100), input(3, "c", 10, 100)];
        assert_eq!(
            sort_messages(&inputs, &SortProgram::by(SortKey::Size)),
            vec![2, 3, 1]
        );
        assert_eq!(
            sort_messages(&inputs, &SortProgram::by(SortKey::Size).then(SortKey::Date, true)),
            vec![2, 3, 1]
        );
        assert_eq!(
            sort_messages(&inputs, &SortProgram::by(SortKey::Date)),
            vec![3, 2, 1]
        );
    }

    #[test]
    fn test_missing_date_uses_arrival() {
        let env = Envelope {
            date: Some("not a date".into()),
            ..Envelope::default()
        };
        let rec = SortInput::from_cache(4, Some(&env), Some("17-Jul-1996 02:44:25 -0700"), None);
        assert_eq!(rec.date, Some(837_596_665));
    }

    #[test]
    fn test_ordered_subject() {
        let inputs = [
            input(1, "Lunch", 100, 0),
            input(2, "Meeting", 50, 0),
            input(3, "Re: Lunch", 200, 0),
            input(4, "Re: Meeting", 300, 0),
            input(5, "re: lunch", 150, 0),
        ];
        let threads = thread_ordered_subject(&inputs);
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].messages(), vec![2, 4]);
        assert_eq!(threads[1].messages(), vec![1, 5, 3]);
        assert_eq!(threads[1].to_wire(), "1 (5)(3)");
    }
}
