//! Message envelope and address lists.
//!
//! Address lists are flat: RFC 822 groups are marked by a start entry
//! (mailbox set, host absent) and an end entry (both absent), never by
//! nesting.

/// Placeholder mailbox for an address that names a host but no mailbox.
pub const MISSING_MAILBOX: &str = "MISSING_MAILBOX";

/// What an address-list entry stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// A real recipient.
    Mailbox,
    /// Opens a group; the mailbox field holds the group name.
    GroupStart,
    /// Closes the innermost open group.
    GroupEnd,
}

/// One entry of an envelope address list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    /// Display name.
    pub name: Option<String>,
    /// Source route (obsolete).
    pub adl: Option<String>,
    /// Local part, or the group name for a group start.
    pub mailbox: Option<String>,
    /// Domain; absent only on group markers.
    pub host: Option<String>,
}

impl Address {
    /// Classifies the entry.
    #[must_use]
    pub fn kind(&self) -> AddressKind {
        match (&self.mailbox, &self.host) {
            (_, Some(_)) => AddressKind::Mailbox,
            (Some(_), None) => AddressKind::GroupStart,
            (None, None) => AddressKind::GroupEnd,
        }
    }

    /// Returns `mailbox@host` for a real address.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(m), Some(h)) => Some(format!("{m}@{h}")),
            _ => None,
        }
    }

    fn render_mailbox(&self, out: &mut String) {
        let addr_spec = {
            let mut s = String::new();
            if let Some(adl) = self.adl.as_deref().filter(|a| !a.is_empty()) {
                s.push_str(adl);
                s.push(':');
            }
            s.push_str(self.mailbox.as_deref().unwrap_or(MISSING_MAILBOX));
            if let Some(host) = &self.host {
                s.push('@');
                s.push_str(host);
            }
            s
        };
        match self.name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => {
                push_phrase(out, name);
                out.push_str(" <");
                out.push_str(&addr_spec);
                out.push('>');
            }
            None if self.adl.as_deref().is_some_and(|a| !a.is_empty()) => {
                out.push('<');
                out.push_str(&addr_spec);
                out.push('>');
            }
            None => out.push_str(&addr_spec),
        }
    }
}

/// Real recipients of a list, skipping group markers.
pub fn recipients(list: &[Address]) -> impl Iterator<Item = &Address> {
    list.iter().filter(|a| a.kind() == AddressKind::Mailbox)
}

/// Renders an address list as RFC 822 header text.
///
/// Groups render as `name: member, member;` and an empty group as
/// `name: ;`. Markers never appear as recipients.
#[must_use]
pub fn render_address_list(list: &[Address]) -> String {
    let mut out = String::new();
    let mut depth = 0usize;
    // true when the next item starts fresh inside the current group
    let mut group_fresh = false;
    for addr in list {
        match addr.kind() {
            AddressKind::GroupStart => {
                if !out.is_empty() && !group_fresh {
                    out.push_str(", ");
                }
                push_phrase(&mut out, addr.mailbox.as_deref().unwrap_or_default());
                out.push(':');
                depth += 1;
                group_fresh = true;
            }
            AddressKind::GroupEnd => {
                if depth == 0 {
                    continue;
                }
                if group_fresh {
                    out.push(' ');
                }
                out.push(';');
                depth -= 1;
                group_fresh = false;
            }
            AddressKind::Mailbox => {
                if group_fresh {
                    out.push(' ');
                } else if !out.is_empty() {
                    out.push_str(", ");
                }
                addr.render_mailbox(&mut out);
                group_fresh = false;
            }
        }
    }
    for _ in 0..depth {
        out.push(';');
    }
    out
}

fn push_phrase(out: &mut String, phrase: &str) {
    const SPECIALS: &[char] = &['(', ')', '<', '>', '@', ',', ';', ':', '\\', '"', '.', '[', ']'];
    if phrase.is_empty() || phrase.contains(SPECIALS) {
        out.push('"');
        for c in phrase.chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
    } else {
        out.push_str(phrase);
    }
}

/// Message envelope.
///
/// The first ten fields come from the ENVELOPE tuple; the news fields are
/// filled separately from header lines on servers that can fetch them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    /// Date header.
    pub date: Option<String>,
    /// Subject header.
    pub subject: Option<String>,
    /// From addresses.
    pub from: Vec<Address>,
    /// Sender addresses.
    pub sender: Vec<Address>,
    /// Reply-To addresses.
    pub reply_to: Vec<Address>,
    /// To addresses.
    pub to: Vec<Address>,
    /// Cc addresses.
    pub cc: Vec<Address>,
    /// Bcc addresses.
    pub bcc: Vec<Address>,
    /// In-Reply-To header.
    pub in_reply_to: Option<String>,
    /// Message-ID header.
    pub message_id: Option<String>,
    /// Newsgroups header.
    pub newsgroups: Option<String>,
    /// Followup-To header.
    pub followup_to: Option<String>,
    /// References header.
    pub references: Option<String>,
}

impl Envelope {
    /// Fills the news fields from raw `HEADER.FIELDS` text.
    ///
    /// Folded continuation lines are unfolded; absent headers leave the
    /// field untouched.
    pub fn apply_news_headers(&mut self, header: &[u8]) {
        let text = String::from_utf8_lossy(header);
        let mut current: Option<(String, String)> = None;
        let mut fields = Vec::new();
        for line in text.split("\r\n").flat_map(|l| l.split('\n')) {
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some(done) = current.take() {
                fields.push(done);
            }
            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
        }
        fields.extend(current);
        for (name, value) in fields {
            let slot = match name.as_str() {
                "newsgroups" => &mut self.newsgroups,
                "followup-to" => &mut self.followup_to,
                "references" => &mut self.references,
                _ => continue,
            };
            *slot = Some(value);
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

    fn addr(name: Option<&str>, mailbox: Option<&str>, host: Option<&str>) -> Address {
        Address {
            name: name.map(String::from),
            adl: None,
            mailbox: mailbox.map(String::from),
            host: host.map(String::from),
        }
    }

    #[test]
    fn kinds() {
        assert_eq!(addr(None, Some("a"), Some("b")).kind(), AddressKind::Mailbox);
        assert_eq!(addr(None, Some("grp"), None).kind(), AddressKind::GroupStart);
        assert_eq!(addr(None, None, None).kind(), AddressKind::GroupEnd);
    }

    #[test]
    fn plain_list() {
        let list = vec![
            addr(Some("Fred Foo"), Some("fred"), Some("example.com")),
            addr(None, Some("joe"), Some("example.org")),
        ];
        assert_eq!(
            render_address_list(&list),
            "Fred Foo <fred@example.com>, joe@example.org"
        );
    }

    #[test]
    fn empty_group_is_not_a_recipient() {
        let list = vec![
            addr(Some(""), Some("undisclosed-recipients"), None),
            addr(Some(""), None, None),
        ];
        assert_eq!(recipients(&list).count(), 0);
        assert_eq!(render_address_list(&list), "undisclosed-recipients: ;");
    }

    #[test]
    fn group_with_members_then_plain() {
        let list = vec![
            addr(None, Some("team"), None),
            addr(None, Some("a"), Some("x.org")),
            addr(None, Some("b"), Some("x.org")),
            addr(None, None, None),
            addr(None, Some("c"), Some("y.org")),
        ];
        assert_eq!(
            render_address_list(&list),
            "team: a@x.org, b@x.org;, c@y.org"
        );
        assert_eq!(recipients(&list).count(), 3);
    }

    #[test]
    fn names_with_specials_are_quoted() {
        let list = vec![addr(Some("Doe, John"), Some("jd"), Some("h"))];
        assert_eq!(render_address_list(&list), "\"Doe, John\" <jd@h>");
    }

    #[test]
    fn unterminated_group_is_closed() {
        let list = vec![addr(None, Some("g"), None), addr(None, Some("a"), Some("h"))];
        assert_eq!(render_address_list(&list), "g: a@h;");
    }

    #[test]
    fn news_headers_unfold() {
        let mut env = Envelope::default();
        env.apply_news_headers(
            b"Newsgroups: comp.mail.imap\r\nReferences: <a@b>\r\n <c@d>\r\n\r\n",
        );
        assert_eq!(env.newsgroups.as_deref(), Some("comp.mail.imap"));
        assert_eq!(env.references.as_deref(), Some("<a@b> <c@d>"));
        assert_eq!(env.followup_to, None);
    }
}
