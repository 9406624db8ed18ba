//! Frame state snapshots and merging at block entries.
//!
//! A snapshot is a floating `FrameState` node whose inputs are the locals, then the operand
//! stack, then the held locks of the abstract interpreter at one bci. Bogus slots (the upper
//! half of a wide value, a local whose kind conflicts after a merge) are `NULL` inputs.
//!
//! Block entry states are built by [`Graph::merge_or_clone`]: the first edge into a block
//! clones the incoming state, every later edge merges into it and introduces phis where the
//! incoming values differ.

use crate::{
    ir::{BlockFlags, FrameStateInfo, Graph, Node, NodeKind},
    meta::Kind,
    utils::graph::NodeId,
};

impl Graph {
    /// Adds a frame state snapshot.
    pub fn add_frame_state(
        &mut self,
        bci: i32,
        locals: &[NodeId],
        stack: &[NodeId],
        locks: &[NodeId],
    ) -> NodeId {
        let info = FrameStateInfo {
            bci,
            locals_size: locals.len(),
            stack_size: stack.len(),
            locks_size: locks.len(),
        };
        let mut inputs = Vec::with_capacity(info.slots());
        inputs.extend_from_slice(locals);
        inputs.extend_from_slice(stack);
        inputs.extend_from_slice(locks);
        self.add(Node::new(NodeKind::FrameState(info), Kind::Void).with_inputs(inputs))
    }

    /// Shape of the snapshot `state`.
    ///
    /// # Panics
    ///
    /// Panics if `state` is not a frame state.
    #[must_use]
    pub fn frame_state(&self, state: NodeId) -> FrameStateInfo {
        match &self.node(state).kind {
            NodeKind::FrameState(info) => *info,
            other => internal_error!("{} is a {}, not a frame state", state, other.name()),
        }
    }

    /// Local slots of a snapshot.
    #[must_use]
    pub fn state_locals(&self, state: NodeId) -> &[NodeId] {
        let info = self.frame_state(state);
        &self.node(state).inputs[..info.locals_size]
    }

    /// Stack slots of a snapshot, bottom first.
    #[must_use]
    pub fn state_stack(&self, state: NodeId) -> &[NodeId] {
        let info = self.frame_state(state);
        &self.node(state).inputs[info.locals_size..info.locals_size + info.stack_size]
    }

    /// Held locks of a snapshot, outermost first.
    #[must_use]
    pub fn state_locks(&self, state: NodeId) -> &[NodeId] {
        let info = self.frame_state(state);
        &self.node(state).inputs[info.locals_size + info.stack_size..]
    }

    /// Creates a snapshot at the same bci with the same locals and locks and an empty stack,
    /// the state an exception handler is entered with.
    pub fn duplicate_with_empty_stack(&mut self, state: NodeId) -> NodeId {
        let info = self.frame_state(state);
        let locals = self.state_locals(state).to_vec();
        let locks = self.state_locks(state).to_vec();
        self.add_frame_state(info.bci, &locals, &[], &locks)
    }

    /// Creates an unshared copy of a snapshot.
    pub fn copy_frame_state(&mut self, state: NodeId) -> NodeId {
        let node = self.node(state).clone();
        self.add(Node::new(node.kind, Kind::Void).with_inputs(node.inputs))
    }

    /// Merges `incoming` into the entry state of `block`.
    ///
    /// The caller adds the predecessor edge for this merge before calling, so the block's
    /// predecessor count already includes it.
    ///
    /// - First edge: the block gets a copy of `incoming`. Loop headers and exception entries
    ///   get a phi for every live local and stack slot right away, because values arriving
    ///   over back edges are not known yet.
    /// - Later edges: each slot keeps its value if the incoming value is the same, feeds the
    ///   block's phi if it already has one, and gets a new phi otherwise. Locals that disagree
    ///   in kind or are bogus on either side become bogus.
    ///
    /// Afterwards every phi of the block has one input per predecessor.
    ///
    /// # Panics
    ///
    /// Panics if the two states differ in shape, if stack slots disagree in kind, if a lock
    /// differs, or if a block that has already been parsed is neither a loop header nor an
    /// exception entry.
    pub fn merge_or_clone(&mut self, block: NodeId, incoming: NodeId) {
        let existing = self.node(block).state_before;
        let flags = self.block(block).flags;
        let preds = self.predecessors(block).len();
        let eager_phis =
            flags.intersects(BlockFlags::PARSER_LOOP_HEADER | BlockFlags::EXCEPTION_ENTRY);

        if existing.is_null() {
            let state = self.copy_frame_state(incoming);
            if eager_phis {
                let info = self.frame_state(state);
                for slot in 0..info.locals_size + info.stack_size {
                    let value = self.node(state).inputs[slot];
                    if value.is_null() {
                        continue;
                    }
                    let kind = self.node(value).value_kind;
                    let phi = self.add_phi(block, kind, vec![value; preds]);
                    self.node_mut(state).inputs[slot] = phi;
                }
            }
            self.node_mut(block).state_before = state;
            return;
        }

        let parsed = flags.contains(BlockFlags::WAS_VISITED);
        invariant!(
            !parsed || eager_phis,
            "merge into parsed block {} which is not a loop header",
            block
        );

        let mine = self.frame_state(existing);
        let theirs = self.frame_state(incoming);
        invariant!(
            mine.locals_size == theirs.locals_size
                && mine.stack_size == theirs.stack_size
                && mine.locks_size == theirs.locks_size,
            "frame state shape mismatch at {}: {:?} vs {:?}",
            block,
            mine,
            theirs
        );
        invariant!(
            self.state_locks(existing) == self.state_locks(incoming),
            "lock mismatch at {}",
            block
        );

        for slot in 0..mine.locals_size + mine.stack_size {
            let is_local = slot < mine.locals_size;
            let current = self.node(existing).inputs[slot];
            let value = self.node(incoming).inputs[slot];

            if current.is_null() {
                invariant!(
                    is_local || value.is_null(),
                    "stack slot {} bogus at {} but live in incoming state",
                    slot - mine.locals_size,
                    block
                );
                continue;
            }

            let conflict = value.is_null()
                || self.node(current).value_kind.stack_kind()
                    != self.node(value).value_kind.stack_kind();

            if self.is_phi_of(current, block) {
                if conflict {
                    invariant!(is_local, "stack kind mismatch at {} slot {}", block, slot);
                    self.node_mut(existing).inputs[slot] = NodeId::NULL;
                } else {
                    self.add_input(current, value);
                }
                continue;
            }

            if current == value {
                continue;
            }

            invariant!(
                !parsed,
                "non-phi slot {} of parsed block {} differs ({} vs {})",
                slot,
                block,
                current,
                value
            );

            if conflict {
                invariant!(is_local, "stack kind mismatch at {} slot {}", block, slot);
                self.node_mut(existing).inputs[slot] = NodeId::NULL;
                continue;
            }

            let kind = self.node(current).value_kind;
            let mut inputs = vec![current; preds - 1];
            inputs.push(value);
            let phi = self.add_phi(block, kind, inputs);
            self.node_mut(existing).inputs[slot] = phi;
        }

        // phis dropped from the state above still need an input for this edge
        let phis = self.block(block).phis.clone();
        for phi in phis {
            if self.node(phi).inputs.len() < preds {
                self.add_input(phi, NodeId::NULL);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ir::BlockBegin, meta::Constant};

    fn int(graph: &mut Graph, v: i32) -> NodeId {
        graph.add(Node::constant(Constant::Int(v)))
    }

    fn block(graph: &mut Graph, flags: BlockFlags) -> NodeId {
        let b = graph.add_block(BlockBegin::new(10, 1));
        graph.block_mut(b).flags = flags;
        b
    }

    #[test]
    fn test_first_merge_clones() {
        let mut graph = Graph::new();
        let b = block(&mut graph, BlockFlags::empty());
        let x = int(&mut graph, 1);
        let state = graph.add_frame_state(5, &[x, NodeId::NULL], &[x], &[]);

        graph.add_predecessor(b, NodeId::new(99));
        graph.merge_or_clone(b, state);

        let entry = graph.node(b).state_before;
        assert_ne!(entry, state);
        assert_eq!(graph.state_locals(entry), &[x, NodeId::NULL]);
        assert_eq!(graph.state_stack(entry), &[x]);
        assert!(graph.block(b).phis.is_empty());
    }

    #[test]
    fn test_second_merge_inserts_phi() {
        let mut graph = Graph::new();
        let b = block(&mut graph, BlockFlags::empty());
        let x = int(&mut graph, 1);
        let y = int(&mut graph, 2);
        let s1 = graph.add_frame_state(5, &[x, x], &[], &[]);
        let s2 = graph.add_frame_state(8, &[x, y], &[], &[]);

        graph.add_predecessor(b, NodeId::new(90));
        graph.merge_or_clone(b, s1);
        graph.add_predecessor(b, NodeId::new(91));
        graph.merge_or_clone(b, s2);

        let entry = graph.node(b).state_before;
        let locals = graph.state_locals(entry).to_vec();
        assert_eq!(locals[0], x);
        assert!(graph.is_phi_of(locals[1], b));
        assert_eq!(graph.node(locals[1]).inputs, vec![x, y]);

        // a third edge feeds the existing phi
        let z = int(&mut graph, 3);
        let s3 = graph.add_frame_state(9, &[x, z], &[], &[]);
        graph.add_predecessor(b, NodeId::new(92));
        graph.merge_or_clone(b, s3);
        assert_eq!(graph.node(locals[1]).inputs, vec![x, y, z]);
        assert_eq!(graph.block(b).phis.len(), 1);
    }

    #[test]
    fn test_loop_header_gets_eager_phis() {
        let mut graph = Graph::new();
        let b = block(&mut graph, BlockFlags::PARSER_LOOP_HEADER);
        let x = int(&mut graph, 1);
        let state = graph.add_frame_state(0, &[x, NodeId::NULL], &[], &[]);

        graph.add_predecessor(b, NodeId::new(90));
        graph.merge_or_clone(b, state);
        let entry = graph.node(b).state_before;
        let phi = graph.state_locals(entry)[0];
        assert!(graph.is_phi_of(phi, b));
        assert!(graph.state_locals(entry)[1].is_null());

        graph.set_block_flag(b, BlockFlags::WAS_VISITED);
        let back = graph.add_frame_state(12, &[phi, x], &[], &[]);
        graph.add_predecessor(b, NodeId::new(91));
        graph.merge_or_clone(b, back);
        assert_eq!(graph.node(phi).inputs, vec![x, phi]);
    }

    #[test]
    fn test_kind_conflict_makes_local_bogus() {
        let mut graph = Graph::new();
        let b = block(&mut graph, BlockFlags::empty());
        let x = int(&mut graph, 1);
        let null = graph.add(Node::constant(Constant::Null));
        let s1 = graph.add_frame_state(0, &[x], &[], &[]);
        let s2 = graph.add_frame_state(0, &[null], &[], &[]);

        graph.add_predecessor(b, NodeId::new(90));
        graph.merge_or_clone(b, s1);
        graph.add_predecessor(b, NodeId::new(91));
        graph.merge_or_clone(b, s2);
        assert!(graph.state_locals(graph.node(b).state_before)[0].is_null());
    }

    #[test]
    #[should_panic(expected = "frame state shape mismatch")]
    fn test_shape_mismatch_panics() {
        let mut graph = Graph::new();
        let b = block(&mut graph, BlockFlags::empty());
        let x = int(&mut graph, 1);
        let s1 = graph.add_frame_state(0, &[x], &[x], &[]);
        let s2 = graph.add_frame_state(0, &[x], &[], &[]);
        graph.add_predecessor(b, NodeId::new(90));
        graph.merge_or_clone(b, s1);
        graph.add_predecessor(b, NodeId::new(91));
        graph.merge_or_clone(b, s2);
    }

    #[test]
    #[should_panic(expected = "which is not a loop header")]
    fn test_merge_into_parsed_block_panics() {
        let mut graph = Graph::new();
        let b = block(&mut graph, BlockFlags::empty());
        let x = int(&mut graph, 1);
        let s = graph.add_frame_state(0, &[x], &[], &[]);
        graph.add_predecessor(b, NodeId::new(90));
        graph.merge_or_clone(b, s);
        graph.set_block_flag(b, BlockFlags::WAS_VISITED);
        graph.add_predecessor(b, NodeId::new(91));
        graph.merge_or_clone(b, s);
    }

    #[test]
    fn test_duplicate_with_empty_stack() {
        let mut graph = Graph::new();
        let x = int(&mut graph, 1);
        let lock = int(&mut graph, 2);
        let s = graph.add_frame_state(3, &[x], &[x, x], &[lock]);
        let d = graph.duplicate_with_empty_stack(s);
        let info = graph.frame_state(d);
        assert_eq!(info.bci, 3);
        assert_eq!(info.stack_size, 0);
        assert_eq!(graph.state_locals(d), &[x]);
        assert_eq!(graph.state_locks(d), &[lock]);
    }
}
