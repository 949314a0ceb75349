//! NAMESPACE data (RFC 2342).

/// One namespace entry: a prefix and its hierarchy delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// Mailbox name prefix, e.g. `INBOX.` or `#shared/`.
    pub prefix: String,
    /// Hierarchy delimiter; `None` when the server sent NIL.
    pub delimiter: Option<char>,
    /// Extension parameters as `name (value ...)`.
    pub extensions: Vec<(String, Vec<String>)>,
}

/// The three namespace classes, in wire order. `None` means NIL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespaces {
    /// Personal namespaces.
    pub personal: Option<Vec<Namespace>>,
    /// Other users' namespaces.
    pub other_users: Option<Vec<Namespace>>,
    /// Shared namespaces.
    pub shared: Option<Vec<Namespace>>,
}

impl Namespaces {
    /// First personal prefix, if any.
    #[must_use]
    pub fn personal_prefix(&self) -> Option<&str> {
        self.personal
            .as_ref()
            .and_then(|v| v.first())
            .map(|n| n.prefix.as_str())
    }
}
