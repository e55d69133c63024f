//! Node identity and source metadata
//!
//! Every IR element carries a [`Meta`]: a unique [`NodeId`], the id of the
//! node that owns it, an optional source position and an optional
//! documentation string.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source location of an IR element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl Span {
    /// Create a new span
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Span covering a single line/column pair with no byte range
    pub fn at(line: u32, column: u32) -> Self {
        Self::new(0, 0, line, column)
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span covers no bytes
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Smallest span covering both
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
            column: self.column.min(other.column),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of an IR node
///
/// Ids come from a process-wide counter so trees built on different threads
/// never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate a fresh id
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Metadata shared by every IR element
#[derive(Debug, Clone)]
pub struct Meta {
    /// Identity of this element
    pub id: NodeId,
    /// Owning element, set when the element is attached
    pub parent: Option<NodeId>,
    /// Source position, absent for most synthesized nodes
    pub position: Option<Span>,
    /// Documentation attached to the element
    pub documentation: Option<String>,
}

impl Meta {
    /// Fresh metadata with no position
    pub fn new() -> Self {
        Self {
            id: NodeId::fresh(),
            parent: None,
            position: None,
            documentation: None,
        }
    }

    /// Fresh metadata at the given position
    pub fn at(position: Span) -> Self {
        Self {
            position: Some(position),
            ..Self::new()
        }
    }

    /// Copy of this metadata with a new identity and no parent
    ///
    /// Used when cloning a subtree: the clone must not alias the original.
    pub fn renewed(&self) -> Self {
        Self {
            id: NodeId::fresh(),
            parent: None,
            position: self.position,
            documentation: self.documentation.clone(),
        }
    }
}

impl Default for Meta {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids_are_unique() {
        let a = NodeId::fresh();
        let b = NodeId::fresh();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_span_merge() {
        let a = Span::new(4, 10, 2, 5);
        let b = Span::new(12, 20, 3, 1);
        let merged = a.merge(&b);
        assert_eq!(merged.start, 4);
        assert_eq!(merged.end, 20);
        assert_eq!(merged.line, 2);
        assert_eq!(merged.len(), 16);
    }

    #[test]
    fn test_renewed_meta_has_new_identity() {
        let mut meta = Meta::at(Span::at(1, 1));
        meta.parent = Some(NodeId::fresh());
        let renewed = meta.renewed();
        assert_ne!(renewed.id, meta.id);
        assert!(renewed.parent.is_none());
        assert_eq!(renewed.position, meta.position);
    }
}
