//! The node arena and its edge operations.
//!
//! [`Graph`] owns every node of one compilation. Nodes are stored in a vector indexed by
//! [`NodeId`]; deleting a node leaves a hole so ids are never reused. Two nodes exist from the
//! start: the `Null` sentinel at [`NodeId::NULL`] and the `Root` anchor at [`NodeId::ROOT`].
//!
//! Edge bookkeeping is explicit: adding a successor does not add a predecessor. Block
//! predecessor lists and phi inputs are kept in lockstep by [`Graph::add_predecessor`] callers
//! and [`Graph::remove_predecessor`]; [`Graph::verify`] checks the result.

use crate::{
    ir::{BlockBegin, BlockFlags, Node, NodeKind},
    meta::Kind,
    utils::graph::{GraphBase, NodeId, Successors},
    Error, Result,
};

/// Arena of IR nodes.
#[derive(Clone, Debug)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Creates a graph holding only the `Null` and `Root` nodes.
    #[must_use]
    pub fn new() -> Self {
        Graph {
            nodes: vec![
                Some(Node::new(NodeKind::Null, Kind::Void)),
                Some(Node::new(NodeKind::Root, Kind::Void)),
            ],
        }
    }

    /// Adds a node and returns its id.
    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Some(node));
        id
    }

    /// Number of live nodes, sentinels included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// `true` if only the sentinels are alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() <= 2
    }

    /// Returns the node, or `None` if the id was deleted or never allocated.
    #[must_use]
    pub fn try_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns `true` if `id` refers to a live node.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.try_node(id).is_some()
    }

    /// Returns the node.
    ///
    /// # Panics
    ///
    /// Panics if the node was deleted.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        match self.try_node(id) {
            Some(node) => node,
            None => internal_error!("access to deleted node {}", id),
        }
    }

    /// Returns the node mutably.
    ///
    /// # Panics
    ///
    /// Panics if the node was deleted.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id.index()).and_then(Option::as_mut) {
            Some(node) => node,
            None => internal_error!("access to deleted node {}", id),
        }
    }

    /// Ids of all live nodes, ascending.
    pub fn live_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| NodeId::new(i))
    }

    /// Makes `block` the start block.
    pub fn set_start(&mut self, block: NodeId) {
        self.node_mut(NodeId::ROOT).successors = vec![block];
    }

    /// The start block, `NULL` before [`Graph::set_start`].
    #[must_use]
    pub fn start(&self) -> NodeId {
        self.node(NodeId::ROOT)
            .successors
            .first()
            .copied()
            .unwrap_or(NodeId::NULL)
    }

    // ============================================================================
    // Edges
    // ============================================================================

    /// Appends an input edge.
    pub fn add_input(&mut self, id: NodeId, input: NodeId) {
        self.node_mut(id).inputs.push(input);
    }

    /// Appends a successor edge.
    pub fn add_successor(&mut self, id: NodeId, successor: NodeId) {
        self.node_mut(id).successors.push(successor);
    }

    /// Overwrites successor slot `slot`, growing the list with `NULL` if needed.
    pub fn set_successor(&mut self, id: NodeId, slot: usize, successor: NodeId) {
        let successors = &mut self.node_mut(id).successors;
        if successors.len() <= slot {
            successors.resize(slot + 1, NodeId::NULL);
        }
        successors[slot] = successor;
    }

    /// Replaces the first occurrence of `old` among the successors of `id`.
    ///
    /// Returns `false` if `old` is not a successor.
    pub fn substitute_successor(&mut self, id: NodeId, old: NodeId, new: NodeId) -> bool {
        Self::substitute_first(&mut self.node_mut(id).successors, old, new)
    }

    /// Replaces the first occurrence of `old` among the inputs of `id`.
    ///
    /// Returns `false` if `old` is not an input.
    pub fn substitute_input(&mut self, id: NodeId, old: NodeId, new: NodeId) -> bool {
        Self::substitute_first(&mut self.node_mut(id).inputs, old, new)
    }

    fn substitute_first(edges: &mut [NodeId], old: NodeId, new: NodeId) -> bool {
        match edges.iter_mut().find(|e| **e == old) {
            Some(slot) => {
                *slot = new;
                true
            }
            None => false,
        }
    }

    /// Removes all inputs and frame state references of `id`.
    pub fn clear_inputs(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        node.inputs.clear();
        node.state_before = NodeId::NULL;
        node.state_after = NodeId::NULL;
    }

    /// Removes all successors of `id`.
    pub fn clear_successors(&mut self, id: NodeId) {
        self.node_mut(id).successors.clear();
    }

    /// Removes every edge of `id`, including its handler list.
    pub fn clear_edges(&mut self, id: NodeId) {
        self.clear_inputs(id);
        self.clear_successors(id);
        self.node_mut(id).exception_handlers.clear();
    }

    /// Deletes a node whose edges have been cleared.
    ///
    /// # Panics
    ///
    /// Panics if the node still has edges or is one of the sentinels.
    pub fn delete(&mut self, id: NodeId) {
        invariant!(
            id != NodeId::NULL && id != NodeId::ROOT,
            "attempt to delete sentinel {}",
            id
        );
        let node = self.node(id);
        invariant!(
            node.inputs.is_empty()
                && node.successors.is_empty()
                && node.state_before.is_null()
                && node.state_after.is_null(),
            "deleting {} ({}) with live edges",
            id,
            node
        );
        self.nodes[id.index()] = None;
    }

    /// Live nodes that use `id` as an input or frame state.
    #[must_use]
    pub fn usages(&self, id: NodeId) -> Vec<NodeId> {
        self.live_ids()
            .filter(|&user| self.node(user).input_edges().any(|e| e == id))
            .collect()
    }

    /// Replaces every use of `old` (inputs and frame state references) by `new`.
    pub fn replace_at_usages(&mut self, old: NodeId, new: NodeId) {
        for node in self.nodes.iter_mut().flatten() {
            for input in &mut node.inputs {
                if *input == old {
                    *input = new;
                }
            }
            if node.state_before == old {
                node.state_before = new;
            }
            if node.state_after == old {
                node.state_after = new;
            }
        }
    }

    // ============================================================================
    // Blocks
    // ============================================================================

    /// Adds a block header and returns its id.
    pub fn add_block(&mut self, block: BlockBegin) -> NodeId {
        let bci = block.bci;
        let mut node = Node::new(NodeKind::BlockBegin(block), Kind::Void);
        node.bci = Some(bci);
        node.successors.push(NodeId::NULL);
        self.add(node)
    }

    /// Returns `true` if `id` is a live block header.
    #[must_use]
    pub fn is_block(&self, id: NodeId) -> bool {
        matches!(
            self.try_node(id).map(|n| &n.kind),
            Some(NodeKind::BlockBegin(_))
        )
    }

    /// The block header data of `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a live block header.
    #[must_use]
    pub fn block(&self, id: NodeId) -> &BlockBegin {
        match &self.node(id).kind {
            NodeKind::BlockBegin(block) => block,
            other => internal_error!("{} is a {}, not a block", id, other.name()),
        }
    }

    /// The block header data of `id`, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a live block header.
    pub fn block_mut(&mut self, id: NodeId) -> &mut BlockBegin {
        match &mut self.node_mut(id).kind {
            NodeKind::BlockBegin(block) => block,
            other => internal_error!("{} is a {}, not a block", id, other.name()),
        }
    }

    /// Sets a block flag.
    pub fn set_block_flag(&mut self, id: NodeId, flag: BlockFlags) {
        self.block_mut(id).flags |= flag;
    }

    /// Live block headers, ascending by id.
    #[must_use]
    pub fn blocks(&self) -> Vec<NodeId> {
        self.live_ids().filter(|&id| self.is_block(id)).collect()
    }

    /// Normal control successors: the successors of the block's end.
    #[must_use]
    pub fn block_successors(&self, block: NodeId) -> Vec<NodeId> {
        let end = self.block(block).end;
        if end.is_null() {
            Vec::new()
        } else {
            self.node(end).successors.clone()
        }
    }

    /// Entry blocks of the handlers covering `block`.
    #[must_use]
    pub fn exception_successors(&self, block: NodeId) -> &[NodeId] {
        let _ = self.block(block);
        self.node(block).successors.get(1..).unwrap_or(&[])
    }

    /// Normal successors followed by exception successors.
    #[must_use]
    pub fn all_successors(&self, block: NodeId) -> Vec<NodeId> {
        let mut successors = self.block_successors(block);
        successors.extend_from_slice(self.exception_successors(block));
        successors
    }

    /// Records `handler` as an exception successor of `block` unless it already is one.
    pub fn add_exception_successor(&mut self, block: NodeId, handler: NodeId) {
        if !self.exception_successors(block).contains(&handler) {
            self.add_successor(block, handler);
        }
    }

    /// Predecessor edges of `block`.
    #[must_use]
    pub fn predecessors(&self, block: NodeId) -> &[NodeId] {
        &self.block(block).predecessors
    }

    /// Appends a predecessor edge.
    pub fn add_predecessor(&mut self, block: NodeId, pred: NodeId) {
        self.block_mut(block).predecessors.push(pred);
    }

    /// Removes every predecessor slot holding `pred`, together with the phi inputs at the
    /// same positions. Returns the number of removed slots.
    pub fn remove_predecessor(&mut self, block: NodeId, pred: NodeId) -> usize {
        let positions: Vec<usize> = self
            .block(block)
            .predecessors
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == pred)
            .map(|(i, _)| i)
            .collect();

        let phis = self.block(block).phis.clone();
        for &pos in positions.iter().rev() {
            self.block_mut(block).predecessors.remove(pos);
            for &phi in &phis {
                let inputs = &mut self.node_mut(phi).inputs;
                if pos < inputs.len() {
                    inputs.remove(pos);
                }
            }
        }
        positions.len()
    }

    /// Removes the last predecessor slot holding `pred` and the phi inputs at that position.
    ///
    /// Block end edges are recorded after the exception edges of the same block, so this
    /// drops a normal edge when both kinds exist. Returns `false` if `pred` is not a
    /// predecessor.
    pub fn remove_last_predecessor(&mut self, block: NodeId, pred: NodeId) -> bool {
        let Some(pos) = self.block(block).predecessors.iter().rposition(|p| *p == pred) else {
            return false;
        };
        self.block_mut(block).predecessors.remove(pos);
        let phis = self.block(block).phis.clone();
        for phi in phis {
            let inputs = &mut self.node_mut(phi).inputs;
            if pos < inputs.len() {
                inputs.remove(pos);
            }
        }
        true
    }

    /// Replaces the first predecessor slot holding `old` by `new`; phi inputs keep their
    /// positions. Returns `false` if `old` is not a predecessor.
    pub fn substitute_predecessor(&mut self, block: NodeId, old: NodeId, new: NodeId) -> bool {
        Self::substitute_first(&mut self.block_mut(block).predecessors, old, new)
    }

    /// The chain of appended instructions of `block`, ending with the block end.
    #[must_use]
    pub fn instructions(&self, block: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.node(block).successors[0];
        while !current.is_null() {
            chain.push(current);
            let node = self.node(current);
            if node.kind.is_block_end() {
                break;
            }
            current = node.successors.first().copied().unwrap_or(NodeId::NULL);
        }
        chain
    }

    /// Adds a phi owned by `block`.
    pub fn add_phi(&mut self, block: NodeId, kind: Kind, inputs: Vec<NodeId>) -> NodeId {
        let mut phi = Node::new(NodeKind::Phi { block }, kind).with_inputs(inputs);
        phi.block = block;
        let id = self.add(phi);
        self.block_mut(block).phis.push(id);
        id
    }

    /// `true` if `id` is a phi owned by `block`.
    #[must_use]
    pub fn is_phi_of(&self, id: NodeId, block: NodeId) -> bool {
        matches!(self.try_node(id).map(|n| &n.kind), Some(NodeKind::Phi { block: b }) if *b == block)
    }

    // ============================================================================
    // Verification
    // ============================================================================

    /// Checks the structural invariants of the graph:
    ///
    /// - every edge of a live node targets `NULL` or a live node
    /// - every successor block lists the block as predecessor and vice versa
    /// - every phi has one input per predecessor of its block
    /// - every frame state has as many inputs as its shape declares
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] describing the first violation.
    pub fn verify(&self) -> Result<()> {
        for id in self.live_ids() {
            let node = self.node(id);
            let edges = node
                .input_edges()
                .chain(node.successors.iter().copied())
                .chain(node.exception_handlers.iter().copied());
            for edge in edges {
                if !edge.is_null() && !self.is_alive(edge) {
                    return Err(Error::GraphError(format!(
                        "{id} ({node}) references deleted node {edge}"
                    )));
                }
            }

            if let NodeKind::FrameState(info) = &node.kind {
                if node.inputs.len() != info.slots() {
                    return Err(Error::GraphError(format!(
                        "frame state {id} has {} inputs, shape declares {}",
                        node.inputs.len(),
                        info.slots()
                    )));
                }
            }
        }

        for block in self.blocks() {
            for succ in self.all_successors(block) {
                if !self.predecessors(succ).contains(&block) {
                    return Err(Error::GraphError(format!(
                        "{block} has successor {succ} which does not list it as predecessor"
                    )));
                }
            }

            for &pred in self.predecessors(block) {
                if !self.is_block(pred) || !self.all_successors(pred).contains(&block) {
                    return Err(Error::GraphError(format!(
                        "{block} has predecessor {pred} which does not list it as successor"
                    )));
                }
            }

            let preds = self.predecessors(block).len();
            for &phi in &self.block(block).phis {
                if !self.is_alive(phi) {
                    return Err(Error::GraphError(format!(
                        "{block} lists deleted phi {phi}"
                    )));
                }
                let inputs = self.node(phi).inputs.len();
                if inputs != preds {
                    return Err(Error::GraphError(format!(
                        "phi {phi} of {block} has {inputs} inputs for {preds} predecessors"
                    )));
                }
            }
        }

        Ok(())
    }
}

impl GraphBase for Graph {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.live_ids()
    }
}

impl Successors for Graph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.try_node(node)
            .into_iter()
            .flat_map(|n| n.successors.iter().copied())
            .filter(|s| !s.is_null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::algorithms;

    fn two_blocks() -> (Graph, NodeId, NodeId) {
        let mut graph = Graph::new();
        let a = graph.add_block(BlockBegin::new(0, 0));
        let b = graph.add_block(BlockBegin::new(4, 1));
        graph.set_start(a);

        let goto = graph.add(Node::new(NodeKind::Goto { safepoint: false }, Kind::Void));
        graph.set_successor(a, 0, goto);
        graph.block_mut(a).end = goto;
        graph.add_successor(goto, b);
        graph.add_predecessor(b, a);

        let ret = graph.add(Node::new(NodeKind::Return { safepoint: true }, Kind::Void));
        graph.set_successor(b, 0, ret);
        graph.block_mut(b).end = ret;
        (graph, a, b)
    }

    #[test]
    fn test_sentinels() {
        let graph = Graph::new();
        assert!(matches!(graph.node(NodeId::NULL).kind, NodeKind::Null));
        assert!(matches!(graph.node(NodeId::ROOT).kind, NodeKind::Root));
        assert!(graph.start().is_null());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_block_accessors() {
        let (graph, a, b) = two_blocks();
        assert_eq!(graph.start(), a);
        assert_eq!(graph.block_successors(a), vec![b]);
        assert!(graph.block_successors(b).is_empty());
        assert_eq!(graph.predecessors(b), &[a]);
        assert_eq!(graph.blocks(), vec![a, b]);
        assert_eq!(graph.instructions(a).len(), 1);
        graph.verify().unwrap();

        let reachable: Vec<_> = algorithms::dfs(&graph, NodeId::ROOT).collect();
        assert_eq!(reachable.len(), 5);
    }

    #[test]
    fn test_remove_predecessor_drops_phi_inputs() {
        let (mut graph, a, b) = two_blocks();
        let c = graph.add_block(BlockBegin::new(8, 2));
        graph.add_predecessor(b, c);
        graph.add_predecessor(b, a);
        let x = graph.add(Node::constant(crate::meta::Constant::Int(1)));
        let y = graph.add(Node::constant(crate::meta::Constant::Int(2)));
        let phi = graph.add_phi(b, Kind::Int, vec![x, y, x]);

        assert_eq!(graph.remove_predecessor(b, a), 2);
        assert_eq!(graph.predecessors(b), &[c]);
        assert_eq!(graph.node(phi).inputs, vec![y]);
    }

    #[test]
    fn test_remove_last_predecessor_keeps_earlier_slots() {
        let (mut graph, a, b) = two_blocks();
        graph.add_predecessor(b, a);
        let x = graph.add(Node::constant(crate::meta::Constant::Int(1)));
        let y = graph.add(Node::constant(crate::meta::Constant::Int(2)));
        let phi = graph.add_phi(b, Kind::Int, vec![x, y]);

        assert!(graph.remove_last_predecessor(b, a));
        assert_eq!(graph.predecessors(b), &[a]);
        assert_eq!(graph.node(phi).inputs, vec![x]);
        assert!(graph.remove_last_predecessor(b, a));
        assert!(!graph.remove_last_predecessor(b, a));
    }

    #[test]
    fn test_substitution_and_usages() {
        let mut graph = Graph::new();
        let x = graph.add(Node::constant(crate::meta::Constant::Int(1)));
        let y = graph.add(Node::constant(crate::meta::Constant::Int(2)));
        let add = graph.add(
            Node::new(
                NodeKind::Arithmetic {
                    opcode: crate::bytecode::opcodes::IADD,
                    strict: false,
                },
                Kind::Int,
            )
            .with_inputs(vec![x, x]),
        );

        assert_eq!(graph.usages(x), vec![add]);
        assert!(graph.substitute_input(add, x, y));
        assert_eq!(graph.node(add).inputs, vec![y, x]);
        graph.replace_at_usages(x, y);
        assert_eq!(graph.node(add).inputs, vec![y, y]);
        assert!(graph.usages(x).is_empty());
        assert!(!graph.substitute_input(add, x, y));
    }

    #[test]
    fn test_delete_requires_cleared_edges() {
        let (mut graph, a, _) = two_blocks();
        let goto = graph.block(a).end;
        let result = std::panic::catch_unwind(move || {
            let mut g = graph;
            g.delete(goto);
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_verify_detects_asymmetry() {
        let (mut graph, a, b) = two_blocks();
        graph.block_mut(b).predecessors.clear();
        assert!(graph.verify().is_err());

        graph.add_predecessor(b, a);
        graph.verify().unwrap();
        graph.add_exception_successor(a, b);
        graph.add_exception_successor(a, b);
        assert_eq!(graph.exception_successors(a), &[b]);
    }
}
