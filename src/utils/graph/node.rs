//! Node identifier shared by the IR arena and the generic graph algorithms.
//!
//! [`NodeId`] is a strongly-typed index. The IR [`Graph`](crate::ir::Graph) hands them out in
//! allocation order and never reuses one after deletion, so a `NodeId` stays a valid key into
//! per-node side tables (mark bits, block numbers) for the lifetime of a compilation.

use std::fmt;

/// A strongly-typed identifier for a node in a graph.
///
/// `NodeId` wraps a `usize` index so node indices cannot be confused with bytecode indices,
/// block numbers or other integers that flow through the builder.
///
/// Two ids are reserved by every IR graph: [`NodeId::NULL`] (the sentinel standing for an
/// absent edge target) and [`NodeId::ROOT`] (the anchor whose single successor is the start
/// block).
///
/// # Examples
///
/// ```rust,ignore
/// use bcgraph::NodeId;
///
/// let id = NodeId::new(7);
/// assert_eq!(id.index(), 7);
/// assert_eq!(format!("{id}"), "n7");
/// assert!(NodeId::NULL.is_null());
/// ```
///
/// # Thread Safety
///
/// `NodeId` is [`Copy`], [`Send`], and [`Sync`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The sentinel node representing an absent edge target.
    pub const NULL: NodeId = NodeId(0);

    /// The graph anchor; its successor slot 0 is the start block.
    pub const ROOT: NodeId = NodeId(1);

    /// Creates a new `NodeId` from a raw index value.
    ///
    /// # Arguments
    ///
    /// * `index` - The raw node index (0-based)
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index value of this node identifier.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }

    /// Returns `true` for the [`NodeId::NULL`] sentinel.
    #[must_use]
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

impl From<NodeId> for usize {
    fn from(node: NodeId) -> Self {
        node.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_node_id_roundtrip() {
        let node = NodeId::new(42);
        assert_eq!(node.index(), 42);
        assert_eq!(usize::from(node), 42);
        assert_eq!(NodeId::from(42usize), node);
    }

    #[test]
    fn test_node_id_formatting() {
        let node = NodeId::new(3);
        assert_eq!(format!("{node:?}"), "NodeId(3)");
        assert_eq!(format!("{node}"), "n3");
    }

    #[test]
    fn test_reserved_ids() {
        assert!(NodeId::NULL.is_null());
        assert!(!NodeId::ROOT.is_null());
        assert_eq!(NodeId::ROOT.index(), 1);
    }

    #[test]
    fn test_node_id_hash_and_order() {
        let mut set = HashSet::new();
        set.insert(NodeId::new(1));
        set.insert(NodeId::new(1));
        set.insert(NodeId::new(2));
        assert_eq!(set.len(), 2);
        assert!(NodeId::new(1) < NodeId::new(2));
    }
}
