//! Linear block order.

use crate::{
    ir::Graph,
    utils::graph::{algorithms, GraphBase, NodeId, Successors},
};

/// View of a [`Graph`] whose nodes are blocks and whose edges are block successors, normal
/// and exceptional.
///
/// Non-block ids have no successors, so traversals starting at a block only ever visit
/// blocks.
pub struct BlockGraph<'g>(pub &'g Graph);

impl GraphBase for BlockGraph<'_> {
    fn node_count(&self) -> usize {
        self.0.node_count()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.0.blocks().into_iter()
    }
}

impl Successors for BlockGraph<'_> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        let successors = if self.0.is_block(node) {
            self.0.all_successors(node)
        } else {
            Vec::new()
        };
        successors.into_iter().filter(|s| !s.is_null())
    }
}

/// Reverse postorder of the blocks reachable from `start`.
#[must_use]
pub fn linear_scan_order(graph: &Graph, start: NodeId) -> Vec<NodeId> {
    if !graph.is_block(start) {
        return Vec::new();
    }
    algorithms::reverse_postorder(&BlockGraph(graph), start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{BlockBegin, Node, NodeKind},
        meta::Kind,
    };

    fn goto(graph: &mut Graph, from: NodeId, to: &[NodeId]) {
        let end = graph.add(Node::new(NodeKind::Goto { safepoint: false }, Kind::Void));
        graph.set_successor(from, 0, end);
        graph.block_mut(from).end = end;
        for &target in to {
            graph.add_successor(end, target);
            graph.add_predecessor(target, from);
        }
    }

    #[test]
    fn test_order_follows_exception_edges() {
        let mut graph = Graph::new();
        let a = graph.add_block(BlockBegin::new(0, 0));
        let b = graph.add_block(BlockBegin::new(4, 1));
        let h = graph.add_block(BlockBegin::new(8, 2));
        let dead = graph.add_block(BlockBegin::new(12, 3));
        graph.set_start(a);
        goto(&mut graph, a, &[b]);
        goto(&mut graph, b, &[]);
        goto(&mut graph, h, &[]);
        goto(&mut graph, dead, &[b]);
        graph.add_exception_successor(a, h);
        graph.add_predecessor(h, a);

        let order = linear_scan_order(&graph, a);
        assert_eq!(order[0], a);
        assert_eq!(order.len(), 3);
        assert!(order.contains(&h));
        assert!(!order.contains(&dead));
    }

    #[test]
    fn test_non_block_start_is_empty() {
        let graph = Graph::new();
        assert!(linear_scan_order(&graph, NodeId::ROOT).is_empty());
    }
}
