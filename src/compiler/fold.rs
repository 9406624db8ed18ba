//! Folding of branches whose outcome is known at compile time.

use crate::{
    ir::{Graph, Node, NodeKind},
    meta::{Constant, Kind},
    utils::graph::NodeId,
};

/// Turns decided `If`s and switches into `Goto`s.
///
/// An `If` is decided when it compares two int constants, or one value with itself (any
/// value but a float or double, which may be `NaN`). A switch is decided when its key is an
/// int constant. The abandoned successors lose the predecessor slot of the folded edge and
/// the matching phi inputs; blocks left without predecessors are removed later by dead code
/// elimination.
pub struct BranchFolder;

impl BranchFolder {
    /// Folds every decided branch and returns how many were folded.
    pub fn apply(graph: &mut Graph) -> usize {
        let mut folded = 0;
        for block in graph.blocks() {
            let end = graph.block(block).end;
            if end.is_null() {
                continue;
            }
            if let Some(slot) = Self::decided_slot(graph, end) {
                Self::fold(graph, block, end, slot);
                folded += 1;
            }
        }
        if folded > 0 {
            log::debug!("folded {folded} constant branches");
        }
        folded
    }

    fn int_constant(graph: &Graph, id: NodeId) -> Option<i32> {
        match graph.node(id).as_constant() {
            Some(Constant::Int(value)) => Some(*value),
            _ => None,
        }
    }

    /// The successor slot control always takes at `end`, if known.
    fn decided_slot(graph: &Graph, end: NodeId) -> Option<usize> {
        let node = graph.node(end);
        match &node.kind {
            NodeKind::If { condition, .. } => {
                let (x, y) = (node.inputs[0], node.inputs[1]);
                let taken = if x == y && !graph.node(x).value_kind.is_float_or_double() {
                    condition.fold(0, 0)
                } else {
                    condition.fold(Self::int_constant(graph, x)?, Self::int_constant(graph, y)?)
                };
                Some(if taken { 0 } else { 1 })
            }
            NodeKind::TableSwitch { low_key, .. } => {
                let key = Self::int_constant(graph, node.inputs[0])?;
                let cases = node.successors.len() - 1;
                let index = i64::from(key) - i64::from(*low_key);
                Some(match usize::try_from(index) {
                    Ok(index) if index < cases => index,
                    _ => cases,
                })
            }
            NodeKind::LookupSwitch { keys, .. } => {
                let key = Self::int_constant(graph, node.inputs[0])?;
                Some(keys.iter().position(|&k| k == key).unwrap_or(keys.len()))
            }
            _ => None,
        }
    }

    fn fold(graph: &mut Graph, block: NodeId, end: NodeId, slot: usize) {
        let old = graph.node(end).clone();
        let target = old.successors[slot];

        for (index, &succ) in old.successors.iter().enumerate() {
            if index != slot {
                graph.remove_last_predecessor(succ, block);
            }
        }

        let mut goto = Node::new(
            NodeKind::Goto {
                safepoint: old.kind.is_safepoint(),
            },
            Kind::Void,
        );
        goto.bci = old.bci;
        goto.block = block;
        goto.appended = true;
        goto.state_before = old.state_before;
        goto.state_after = old.state_after;
        goto.successors.push(target);
        let goto = graph.add(goto);

        let chain = graph.instructions(block);
        let previous = match chain.len() {
            0 | 1 => block,
            n => chain[n - 2],
        };
        graph.set_successor(previous, 0, goto);
        graph.block_mut(block).end = goto;

        graph.clear_edges(end);
        graph.delete(end);
        log::trace!("folded {} in {block} to {target}", old);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{opcodes, BytecodeAssembler},
        test::{build, build_raw, static_method},
        Result,
    };

    // return 1 == 0 ? 2 : 3
    fn decided() -> Result<Vec<u8>> {
        let mut asm = BytecodeAssembler::new();
        asm.iconst(1)?
            .ifeq("else")?
            .iconst(3)?
            .goto("join")?
            .label("else")?
            .iconst(2)?
            .label("join")?
            .ireturn()?;
        asm.finish()
    }

    #[test]
    fn test_constant_if_becomes_goto() -> Result<()> {
        let method = static_method("()I", decided()?, 0);
        let mut raw = build_raw(&method);
        let graph = raw.graph_mut();
        let entry = graph.block_successors(graph.start())[0];
        let taken = graph.block_successors(entry)[0];

        assert_eq!(BranchFolder::apply(graph), 1);
        let end = graph.block(entry).end;
        assert!(matches!(graph.node(end).kind, NodeKind::Goto { .. }));
        assert_eq!(graph.block_successors(entry).len(), 1);
        assert!(graph.predecessors(taken).is_empty());
        assert_eq!(graph.instructions(entry).last(), Some(&end));
        graph.verify()?;
        Ok(())
    }

    #[test]
    fn test_folded_branch_leaves_dead_arm_behind() -> Result<()> {
        let method = static_method("()I", decided()?, 0);
        let raw = build_raw(&method);
        let ir = build(&method);
        assert_eq!(ir.stats().folded_branches, 1);
        assert_eq!(ir.graph().blocks().len(), raw.graph().blocks().len() - 1);
        ir.verify()?;
        Ok(())
    }

    #[test]
    fn test_switch_on_constant_takes_default() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iconst(5)?
            .lookupswitch(&[(1, "one"), (2, "two")], "other")?
            .label("one")?
            .iconst(1)?
            .ireturn()?
            .label("two")?
            .iconst(2)?
            .ireturn()?
            .label("other")?
            .iconst(0)?
            .ireturn()?;
        let mut raw = build_raw(&static_method("()I", asm.finish()?, 0));
        let graph = raw.graph_mut();
        let entry = graph.block_successors(graph.start())[0];
        let default = *graph.block_successors(entry).last().expect("default");

        assert_eq!(BranchFolder::apply(graph), 1);
        assert_eq!(graph.block_successors(entry), vec![default]);
        graph.verify()?;
        Ok(())
    }

    #[test]
    fn test_compare_of_a_value_with_itself_is_folded() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iload(0)?
            .iload(0)?
            .branch(opcodes::IF_ICMPNE, "differ")?
            .iconst(1)?
            .ireturn()?
            .label("differ")?
            .iconst(0)?
            .ireturn()?;
        let mut raw = build_raw(&static_method("(I)I", asm.finish()?, 1));
        let graph = raw.graph_mut();
        let entry = graph.block_successors(graph.start())[0];
        let end = graph.block(entry).end;
        assert!(matches!(graph.node(graph.node(end).inputs[0]).kind, NodeKind::Local { .. }));
        let fallthrough = graph.block_successors(entry)[1];

        assert_eq!(BranchFolder::apply(graph), 1);
        assert_eq!(graph.block_successors(entry), vec![fallthrough]);
        graph.verify()?;
        Ok(())
    }

    #[test]
    fn test_unknown_key_is_not_folded() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iload(0)?
            .ifeq("zero")?
            .iconst(1)?
            .ireturn()?
            .label("zero")?
            .iconst(0)?
            .ireturn()?;
        let mut raw = build_raw(&static_method("(I)I", asm.finish()?, 1));
        assert_eq!(BranchFolder::apply(raw.graph_mut()), 0);
        Ok(())
    }
}
