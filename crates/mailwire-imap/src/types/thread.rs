//! Thread trees from THREAD replies and client-side threading.

/// A node in a thread tree.
///
/// `message` is `None` for a placeholder parent that the server or the
/// client-side threader invented to hold sibling threads together.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadNode {
    /// Message number (sequence number or UID, as requested).
    pub message: Option<u32>,
    /// Replies, in order.
    pub children: Vec<Self>,
}

impl ThreadNode {
    /// Creates a leaf for a message.
    #[must_use]
    pub const fn leaf(message: u32) -> Self {
        Self {
            message: Some(message),
            children: Vec::new(),
        }
    }

    /// All message numbers in depth-first order.
    #[must_use]
    pub fn messages(&self) -> Vec<u32> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut Vec<u32>) {
        out.extend(self.message);
        for child in &self.children {
            child.collect(out);
        }
    }

    /// Renders the node in THREAD reply syntax (without the outer parens).
    #[must_use]
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        self.write_chain(&mut out);
        out
    }

    fn write_chain(&self, out: &mut String) {
        if let Some(n) = self.message {
            out.push_str(&n.to_string());
        }
        match self.children.as_slice() {
            [] => {}
            [only] if only.message.is_some() => {
                if self.message.is_some() {
                    out.push(' ');
                }
                only.write_chain(out);
            }
            many => {
                if self.message.is_some() {
                    out.push(' ');
                }
                for child in many {
                    out.push('(');
                    child.write_chain(out);
                    out.push(')');
                }
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
    fn chain_and_branches_render() {
        // 3 -> 6 -> {4 -> 23, 44 -> 7 -> 96}
        let tree = ThreadNode {
            message: Some(3),
            children: vec![ThreadNode {
                message: Some(6),
                children: vec![
                    ThreadNode {
                        message: Some(4),
                        children: vec![ThreadNode::leaf(23)],
                    },
                    ThreadNode {
                        message: Some(44),
                        children: vec![ThreadNode {
                            message: Some(7),
                            children: vec![ThreadNode::leaf(96)],
                        }],
                    },
                ],
            }],
        };
        assert_eq!(tree.to_wire(), "3 6 (4 23)(44 7 96)");
        assert_eq!(tree.messages(), vec![3, 6, 4, 23, 44, 7, 96]);
    }

    #[test]
    fn placeholder_root() {
        let tree = ThreadNode {
            message: None,
            children: vec![ThreadNode::leaf(3), ThreadNode::leaf(5)],
        };
        assert_eq!(tree.to_wire(), "(3)(5)");
        assert_eq!(tree.messages(), vec![3, 5]);
    }
}
