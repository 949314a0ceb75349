//! Mailbox names, remote mailbox specifications, and LIST/STATUS data.

use bitflags::bitflags;

use crate::error::{Error, Result};

/// Protocol service named in a mailbox specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Service {
    /// Let the server decide (`imap`).
    #[default]
    Imap,
    /// Force IMAP2 behaviour.
    Imap2,
    /// Expect IMAP4.
    Imap4,
    /// Expect IMAP4rev1.
    Imap4Rev1,
}

impl Service {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "imap" => Some(Self::Imap),
            "imap2" => Some(Self::Imap2),
            "imap4" => Some(Self::Imap4),
            "imap4rev1" => Some(Self::Imap4Rev1),
            _ => None,
        }
    }

    /// The service keyword used in canonical names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Imap => "imap",
            Self::Imap2 => "imap2",
            Self::Imap4 => "imap4",
            Self::Imap4Rev1 => "imap4rev1",
        }
    }
}

/// Transport security requested by a mailbox specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Plaintext.
    #[default]
    None,
    /// Implicit TLS (`/ssl`).
    Ssl,
    /// STARTTLS upgrade (`/tls`).
    StartTls,
}

/// A parsed `{host[:port][/flags]}mailbox` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxSpec {
    /// Server host name or bracketed address literal.
    pub host: String,
    /// Explicit port, if given.
    pub port: Option<u16>,
    /// Requested service.
    pub service: Service,
    /// Login user from `/user=name`.
    pub user: Option<String>,
    /// Transport security.
    pub security: Security,
    /// Open read-only (EXAMINE).
    pub read_only: bool,
    /// Mailbox path after the closing brace; empty means "connection only".
    pub mailbox: String,
}

impl MailboxSpec {
    /// Parses a remote mailbox specification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMailbox`] if the string has no `{...}` prefix,
    /// an empty host, a malformed port, or an unknown switch.
    pub fn parse(s: &str) -> Result<Self> {
        let bad = |why: &str| Error::InvalidMailbox(format!("{s}: {why}"));
        let rest = s.strip_prefix('{').ok_or_else(|| bad("missing '{'"))?;
        let close = rest.find('}').ok_or_else(|| bad("missing '}'"))?;
        let (server, mailbox) = (&rest[..close], &rest[close + 1..]);

        let mut parts = server.split('/');
        let host_port = parts.next().unwrap_or_default();
        let (host, port) = split_host_port(host_port).ok_or_else(|| bad("bad port"))?;
        if host.is_empty() {
            return Err(bad("empty host"));
        }

        let mut spec = Self {
            host: host.to_string(),
            port,
            service: Service::Imap,
            user: None,
            security: Security::None,
            read_only: false,
            mailbox: mailbox.to_string(),
        };

        for switch in parts {
            let (name, value) = switch
                .split_once('=')
                .map_or((switch, None), |(n, v)| (n, Some(v)));
            match (name.to_ascii_lowercase().as_str(), value) {
                ("user", Some(user)) if !user.is_empty() => spec.user = Some(user.to_string()),
                ("service", Some(svc)) => {
                    spec.service = Service::parse(svc).ok_or_else(|| bad("unknown service"))?;
                }
                ("ssl", None) => spec.security = Security::Ssl,
                ("tls", None) => spec.security = Security::StartTls,
                ("notls", None) => spec.security = Security::None,
                ("readonly", None) => spec.read_only = true,
                (other, None) => {
                    spec.service = Service::parse(other).ok_or_else(|| bad("unknown switch"))?;
                }
                _ => return Err(bad("unknown switch")),
            }
        }
        Ok(spec)
    }

    /// Port to connect to given the configured defaults.
    #[must_use]
    pub fn effective_port(&self, default_port: u16, tls_port: u16) -> u16 {
        self.port.unwrap_or(match self.security {
            Security::Ssl => tls_port,
            Security::None | Security::StartTls => default_port,
        })
    }

    /// Canonical name `{host[:port]/service[/user=name]}mailbox`.
    ///
    /// `host` and `port` come from the live connection; the port is shown
    /// only when it differs from `default_port`.
    #[must_use]
    pub fn canonical_name(&self, host: &str, port: u16, default_port: u16) -> String {
        let mut out = format!("{{{host}");
        if port != default_port {
            out.push_str(&format!(":{port}"));
        }
        out.push('/');
        out.push_str(self.service.as_str());
        if let Some(user) = &self.user {
            out.push_str("/user=");
            out.push_str(user);
        }
        out.push('}');
        out.push_str(&self.mailbox);
        out
    }

    /// Returns true if a mailbox path was given.
    #[must_use]
    pub fn has_mailbox(&self) -> bool {
        !self.mailbox.is_empty()
    }
}

impl std::fmt::Display for MailboxSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        if self.service != Service::Imap {
            write!(f, "/{}", self.service.as_str())?;
        }
        if let Some(user) = &self.user {
            write!(f, "/user={user}")?;
        }
        match self.security {
            Security::Ssl => write!(f, "/ssl")?,
            Security::StartTls => write!(f, "/tls")?,
            Security::None => {}
        }
        if self.read_only {
            write!(f, "/readonly")?;
        }
        write!(f, "}}{}", self.mailbox)
    }
}

fn split_host_port(s: &str) -> Option<(&str, Option<u16>)> {
    // "[addr]" literals may carry colons of their own
    let colon = if s.starts_with('[') {
        s.find(']').and_then(|end| s[end..].find(':').map(|c| c + end))
    } else {
        s.rfind(':')
    };
    match colon {
        Some(i) => s[i + 1..].parse().ok().map(|port| (&s[..i], Some(port))),
        None => Some((s, None)),
    }
}

bitflags! {
    /// Attributes reported by LIST/LSUB.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ListAttributes: u8 {
        /// `\Noinferiors`
        const NOINFERIORS = 1 << 0;
        /// `\Noselect`
        const NOSELECT = 1 << 1;
        /// `\Marked`
        const MARKED = 1 << 2;
        /// `\Unmarked`
        const UNMARKED = 1 << 3;
        /// `\HasChildren`
        const HAS_CHILDREN = 1 << 4;
        /// `\HasNoChildren`
        const HAS_NO_CHILDREN = 1 << 5;
    }
}

impl ListAttributes {
    /// Maps one attribute atom; unknown atoms map to nothing.
    #[must_use]
    pub fn from_atom(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "\\NOINFERIORS" => Self::NOINFERIORS,
            "\\NOSELECT" => Self::NOSELECT,
            "\\MARKED" => Self::MARKED,
            "\\UNMARKED" => Self::UNMARKED,
            "\\HASCHILDREN" => Self::HAS_CHILDREN,
            "\\HASNOCHILDREN" => Self::HAS_NO_CHILDREN,
            _ => Self::empty(),
        }
    }
}

/// One LIST/LSUB/MAILBOX entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Mailbox attributes.
    pub attributes: ListAttributes,
    /// Hierarchy delimiter; `None` for a flat namespace.
    pub delimiter: Option<char>,
    /// Mailbox name, with any list prefix already applied.
    pub name: String,
}

/// STATUS data for one mailbox. Attributes not asked for stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusRecord {
    /// Mailbox the record describes.
    pub mailbox: String,
    /// Total message count.
    pub messages: Option<u32>,
    /// Recent message count.
    pub recent: Option<u32>,
    /// Unseen message count.
    pub unseen: Option<u32>,
    /// Next UID.
    pub uid_next: Option<u32>,
    /// UIDVALIDITY.
    pub uid_validity: Option<u32>,
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

    mod spec_tests {
        use super::*;

        #[test]
        fn parse_full_spec() {
            let spec = MailboxSpec::parse("{imap.example.com:1143/imap4rev1/user=fred/ssl}INBOX")
                .unwrap();
            assert_eq!(spec.host, "imap.example.com");
            assert_eq!(spec.port, Some(1143));
            assert_eq!(spec.service, Service::Imap4Rev1);
            assert_eq!(spec.user.as_deref(), Some("fred"));
            assert_eq!(spec.security, Security::Ssl);
            assert_eq!(spec.mailbox, "INBOX");
        }

        #[test]
        fn parse_minimal_spec() {
            let spec = MailboxSpec::parse("{localhost}").unwrap();
            assert_eq!(spec.host, "localhost");
            assert_eq!(spec.port, None);
            assert!(!spec.has_mailbox());
            assert_eq!(spec.effective_port(143, 993), 143);
        }

        #[test]
        fn ssl_uses_tls_port() {
            let spec = MailboxSpec::parse("{h/ssl/readonly}a/b").unwrap();
            assert!(spec.read_only);
            assert_eq!(spec.effective_port(143, 993), 993);
        }

        #[test]
        fn service_switch_forms() {
            assert_eq!(
                MailboxSpec::parse("{h/service=imap2}x").unwrap().service,
                Service::Imap2
            );
            assert_eq!(
                MailboxSpec::parse("{h/imap4}x").unwrap().service,
                Service::Imap4
            );
        }

        #[test]
        fn bracketed_address_literal() {
            let spec = MailboxSpec::parse("{[::1]:2143}INBOX").unwrap();
            assert_eq!(spec.host, "[::1]");
            assert_eq!(spec.port, Some(2143));
        }

        #[test]
        fn rejects_garbage() {
            assert!(MailboxSpec::parse("INBOX").is_err());
            assert!(MailboxSpec::parse("{host").is_err());
            assert!(MailboxSpec::parse("{}INBOX").is_err());
            assert!(MailboxSpec::parse("{h:port}INBOX").is_err());
            assert!(MailboxSpec::parse("{h/bogus}INBOX").is_err());
        }

        #[test]
        fn display_round_trips() {
            let text = "{h:10/imap4/user=u/tls/readonly}Sent";
            assert_eq!(MailboxSpec::parse(text).unwrap().to_string(), text);
        }

        #[test]
        fn canonical_name_hides_default_port() {
            let spec = MailboxSpec::parse("{h/user=bob}INBOX").unwrap();
            assert_eq!(
                spec.canonical_name("mail.example.org", 143, 143),
                "{mail.example.org/imap/user=bob}INBOX"
            );
            assert_eq!(
                spec.canonical_name("mail.example.org", 2143, 143),
                "{mail.example.org:2143/imap/user=bob}INBOX"
            );
        }
    }

    #[test]
    fn list_attributes() {
        assert_eq!(
            ListAttributes::from_atom("\\NoSelect"),
            ListAttributes::NOSELECT
        );
        assert!(ListAttributes::from_atom("\\Trash").is_empty());
    }
}
