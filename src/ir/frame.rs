//! The mutable abstract interpreter state.

use std::fmt::Write;

use crate::{ir::Graph, meta::Kind, utils::graph::NodeId};

/// A live value in a local or stack slot, with its stack kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    /// The value node
    pub value: NodeId,
    /// Stack kind of the value
    pub kind: Kind,
}

/// Locals, operand stack and held locks while a block is being parsed.
///
/// Wide values (`long`, `double`) occupy two slots: the value in the lower slot and `None` in
/// the upper one. `None` in a local marks a bogus slot that must not be read.
#[derive(Clone, Debug, Default)]
pub struct FrameStateBuilder {
    locals: Vec<Option<Slot>>,
    stack: Vec<Option<Slot>>,
    locks: Vec<NodeId>,
}

impl FrameStateBuilder {
    /// Creates a state with `max_locals` bogus locals and an empty stack.
    #[must_use]
    pub fn new(max_locals: usize) -> Self {
        FrameStateBuilder {
            locals: vec![None; max_locals],
            stack: Vec::new(),
            locks: Vec::new(),
        }
    }

    /// Pushes a value; wide kinds push an extra `None` slot.
    pub fn push(&mut self, kind: Kind, value: NodeId) {
        let kind = kind.stack_kind();
        invariant!(
            kind != Kind::Void && kind != Kind::Illegal,
            "push of {} value {}",
            kind,
            value
        );
        self.stack.push(Some(Slot { value, kind }));
        if kind.is_double_word() {
            self.stack.push(None);
        }
    }

    /// Pops a value of the given kind.
    ///
    /// # Panics
    ///
    /// Panics on underflow or if the value on top has a different stack kind.
    pub fn pop(&mut self, kind: Kind) -> NodeId {
        let kind = kind.stack_kind();
        if kind.is_double_word() {
            let upper = self.xpop();
            invariant!(upper.is_none(), "upper half of {} is a value", kind);
        }
        match self.xpop() {
            Some(slot) => {
                invariant!(
                    slot.kind == kind,
                    "pop of {} found {} {}",
                    kind,
                    slot.kind,
                    slot.value
                );
                slot.value
            }
            None => internal_error!("pop of {} found a bogus slot", kind),
        }
    }

    /// Pushes a raw slot, used for stack shuffles.
    pub fn xpush(&mut self, slot: Option<Slot>) {
        self.stack.push(slot);
    }

    /// Pops a raw slot.
    ///
    /// # Panics
    ///
    /// Panics on stack underflow.
    pub fn xpop(&mut self) -> Option<Slot> {
        match self.stack.pop() {
            Some(slot) => slot,
            None => internal_error!("operand stack underflow"),
        }
    }

    /// Pushes an int.
    pub fn ipush(&mut self, value: NodeId) {
        self.push(Kind::Int, value);
    }

    /// Pops an int.
    pub fn ipop(&mut self) -> NodeId {
        self.pop(Kind::Int)
    }

    /// Pushes a long.
    pub fn lpush(&mut self, value: NodeId) {
        self.push(Kind::Long, value);
    }

    /// Pops a long.
    pub fn lpop(&mut self) -> NodeId {
        self.pop(Kind::Long)
    }

    /// Pushes a float.
    pub fn fpush(&mut self, value: NodeId) {
        self.push(Kind::Float, value);
    }

    /// Pops a float.
    pub fn fpop(&mut self) -> NodeId {
        self.pop(Kind::Float)
    }

    /// Pushes a double.
    pub fn dpush(&mut self, value: NodeId) {
        self.push(Kind::Double, value);
    }

    /// Pops a double.
    pub fn dpop(&mut self) -> NodeId {
        self.pop(Kind::Double)
    }

    /// Pushes a reference.
    pub fn apush(&mut self, value: NodeId) {
        self.push(Kind::Object, value);
    }

    /// Pops a reference.
    pub fn apop(&mut self) -> NodeId {
        self.pop(Kind::Object)
    }

    /// Reads a local; `None` if the slot is bogus or out of range.
    #[must_use]
    pub fn load_local(&self, index: usize) -> Option<Slot> {
        self.locals.get(index).copied().flatten()
    }

    /// Writes a local.
    ///
    /// A wide value also invalidates `index + 1`; overwriting the upper half of a wide value
    /// invalidates the wide value in `index - 1`.
    ///
    /// # Panics
    ///
    /// Panics if the slot (or its upper half) lies outside the frame.
    pub fn store_local(&mut self, index: usize, kind: Kind, value: NodeId) {
        let kind = kind.stack_kind();
        let needed = index + kind.slots();
        invariant!(
            needed <= self.locals.len(),
            "store to local {} outside frame of {} locals",
            index,
            self.locals.len()
        );

        if index > 0 {
            if let Some(prev) = self.locals[index - 1] {
                if prev.kind.is_double_word() {
                    self.locals[index - 1] = None;
                }
            }
        }
        self.locals[index] = Some(Slot { value, kind });
        if kind.is_double_word() {
            self.locals[index + 1] = None;
        }
    }

    /// Pushes a lock object.
    pub fn lock(&mut self, object: NodeId) {
        self.locks.push(object);
    }

    /// Pops the innermost lock object, `None` if no lock is held.
    pub fn unlock(&mut self) -> Option<NodeId> {
        self.locks.pop()
    }

    /// Number of held locks.
    #[must_use]
    pub fn locks_size(&self) -> usize {
        self.locks.len()
    }

    /// The innermost lock object.
    #[must_use]
    pub fn top_lock(&self) -> Option<NodeId> {
        self.locks.last().copied()
    }

    /// Number of stack slots in use.
    #[must_use]
    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    /// Number of local slots.
    #[must_use]
    pub fn locals_size(&self) -> usize {
        self.locals.len()
    }

    /// Empties the operand stack.
    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    /// Pops `slots` stack slots and returns the argument values bottom first, skipping the
    /// upper halves of wide values.
    pub fn pop_arguments(&mut self, slots: usize) -> Vec<NodeId> {
        invariant!(
            slots <= self.stack.len(),
            "popping {} argument slots from a stack of {}",
            slots,
            self.stack.len()
        );
        let base = self.stack.len() - slots;
        self.stack
            .drain(base..)
            .flatten()
            .map(|slot| slot.value)
            .collect()
    }

    /// Pushes a call result; nothing is pushed for `Void`.
    pub fn push_return(&mut self, kind: Kind, value: NodeId) {
        if kind != Kind::Void {
            self.push(kind, value);
        }
    }

    /// Replaces the state by the contents of the snapshot `state`.
    pub fn initialize_from(&mut self, graph: &Graph, state: NodeId) {
        let to_slot = |value: &NodeId| {
            (!value.is_null()).then(|| Slot {
                value: *value,
                kind: graph.node(*value).value_kind.stack_kind(),
            })
        };
        self.locals = graph.state_locals(state).iter().map(to_slot).collect();
        self.stack = graph.state_stack(state).iter().map(to_slot).collect();
        self.locks = graph.state_locks(state).to_vec();
    }

    /// Records the current state as a snapshot node at `bci`.
    pub fn create(&self, graph: &mut Graph, bci: i32) -> NodeId {
        let id = |slot: &Option<Slot>| slot.map_or(NodeId::NULL, |s| s.value);
        let locals: Vec<NodeId> = self.locals.iter().map(id).collect();
        let stack: Vec<NodeId> = self.stack.iter().map(id).collect();
        graph.add_frame_state(bci, &locals, &stack, &self.locks)
    }

    /// One line per live slot, used by state tracing.
    #[must_use]
    pub fn dump(&self, graph: &Graph) -> String {
        let mut out = String::new();
        let mut line = |name: &str, i: usize, slot: &Option<Slot>| {
            if let Some(s) = slot {
                let _ = writeln!(out, "| {name}[{i}] = {} : {}", s.kind, graph.node(s.value));
            }
        };
        for (i, slot) in self.locals.iter().enumerate() {
            line("local", i, slot);
        }
        for (i, slot) in self.stack.iter().enumerate() {
            line("stack", i, slot);
        }
        for (i, lock) in self.locks.iter().enumerate() {
            let _ = writeln!(out, "| lock[{i}] = {}", graph.node(*lock));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ir::Node, meta::Constant};

    fn constants(graph: &mut Graph) -> (NodeId, NodeId, NodeId) {
        let i = graph.add(Node::constant(Constant::Int(1)));
        let l = graph.add(Node::constant(Constant::Long(2)));
        let a = graph.add(Node::constant(Constant::Null));
        (i, l, a)
    }

    #[test]
    fn test_wide_values_take_two_slots() {
        let mut graph = Graph::new();
        let (i, l, _) = constants(&mut graph);
        let mut frame = FrameStateBuilder::new(0);
        frame.ipush(i);
        frame.lpush(l);
        assert_eq!(frame.stack_size(), 3);
        assert_eq!(frame.lpop(), l);
        assert_eq!(frame.ipop(), i);
        assert_eq!(frame.stack_size(), 0);
    }

    #[test]
    #[should_panic(expected = "pop of int found object")]
    fn test_pop_kind_mismatch_panics() {
        let mut graph = Graph::new();
        let (_, _, a) = constants(&mut graph);
        let mut frame = FrameStateBuilder::new(0);
        frame.apush(a);
        frame.ipop();
    }

    #[test]
    fn test_store_local_invalidates_neighbours() {
        let mut graph = Graph::new();
        let (i, l, _) = constants(&mut graph);
        let mut frame = FrameStateBuilder::new(4);

        frame.store_local(0, Kind::Long, l);
        assert_eq!(frame.load_local(0).map(|s| s.value), Some(l));
        assert!(frame.load_local(1).is_none());

        frame.store_local(1, Kind::Int, i);
        assert!(frame.load_local(0).is_none());
        assert_eq!(frame.load_local(1).map(|s| s.kind), Some(Kind::Int));
        assert!(frame.load_local(9).is_none());
    }

    #[test]
    fn test_pop_arguments_skips_upper_halves() {
        let mut graph = Graph::new();
        let (i, l, a) = constants(&mut graph);
        let mut frame = FrameStateBuilder::new(0);
        frame.apush(a);
        frame.ipush(i);
        frame.lpush(l);
        assert_eq!(frame.pop_arguments(3), vec![i, l]);
        assert_eq!(frame.stack_size(), 1);
        frame.push_return(Kind::Void, NodeId::NULL);
        assert_eq!(frame.stack_size(), 1);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut graph = Graph::new();
        let (i, l, a) = constants(&mut graph);
        let mut frame = FrameStateBuilder::new(3);
        frame.store_local(0, Kind::Long, l);
        frame.ipush(i);
        frame.lock(a);

        let state = frame.create(&mut graph, 7);
        assert_eq!(graph.state_locals(state), &[l, NodeId::NULL, NodeId::NULL]);
        assert_eq!(graph.state_stack(state), &[i]);
        assert_eq!(graph.state_locks(state), &[a]);

        let mut other = FrameStateBuilder::new(0);
        other.initialize_from(&graph, state);
        assert_eq!(other.locals_size(), 3);
        assert_eq!(other.load_local(0).map(|s| s.kind), Some(Kind::Long));
        assert_eq!(other.ipop(), i);
        assert_eq!(other.top_lock(), Some(a));
        assert!(other.dump(&graph).contains("local[0] = long"));
    }
}
