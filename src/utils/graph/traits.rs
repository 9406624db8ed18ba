//! Trait definitions for graph abstractions.
//!
//! The algorithms in [`crate::utils::graph::algorithms`] are written against these traits
//! rather than a concrete graph type. The IR [`Graph`](crate::ir::Graph) implements them over
//! its successor edges, and the block map implements them over bytecode blocks, so the same
//! traversal code serves dead-code marking, depth-first numbering and block ordering.
//!
//! # Architecture
//!
//! - [`GraphBase`] - Core properties: node count and node iteration
//! - [`Successors`] - Forward edge traversal (outgoing edges)

use crate::utils::graph::NodeId;

/// Base trait providing core graph properties.
///
/// Node ids handed to the algorithms must satisfy `id.index() < node_count()`. Graphs with
/// holes in their id space (deleted arena slots) report the id capacity, not the live count.
pub trait GraphBase {
    /// Returns the size of the node id space.
    fn node_count(&self) -> usize;

    /// Returns an iterator over all node identifiers in the graph.
    ///
    /// The iteration order is ascending `NodeId` index.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Trait for graphs that support forward edge traversal.
pub trait Successors: GraphBase {
    /// Returns an iterator over the successor nodes of the given node.
    ///
    /// # Arguments
    ///
    /// * `node` - The node whose successors to iterate
    ///
    /// # Panics
    ///
    /// May panic if `node` is not a valid node in the graph.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestGraph {
        node_count: usize,
        edges: Vec<(NodeId, NodeId)>,
    }

    impl GraphBase for TestGraph {
        fn node_count(&self) -> usize {
            self.node_count
        }

        fn node_ids(&self) -> impl Iterator<Item = NodeId> {
            (0..self.node_count).map(NodeId::new)
        }
    }

    impl Successors for TestGraph {
        fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
            self.edges
                .iter()
                .filter(move |(src, _)| *src == node)
                .map(|(_, dst)| *dst)
        }
    }

    #[test]
    fn test_graph_base() {
        let graph = TestGraph {
            node_count: 5,
            edges: vec![],
        };
        let ids: Vec<NodeId> = graph.node_ids().collect();
        assert_eq!(ids.len(), 5);
        assert_eq!(ids[4], NodeId::new(4));
    }

    #[test]
    fn test_successors() {
        let graph = TestGraph {
            node_count: 4,
            edges: vec![
                (NodeId::new(0), NodeId::new(1)),
                (NodeId::new(0), NodeId::new(2)),
                (NodeId::new(1), NodeId::new(3)),
            ],
        };

        let succ: Vec<NodeId> = graph.successors(NodeId::new(0)).collect();
        assert_eq!(succ, vec![NodeId::new(1), NodeId::new(2)]);
        assert!(graph.successors(NodeId::new(3)).next().is_none());
    }
}
