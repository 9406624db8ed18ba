//! Redundant phi removal.

use crate::{ir::Graph, utils::graph::NodeId};

/// Replaces phis that merge a single value.
///
/// A phi is redundant when every input other than the phi itself is the same value. Its
/// uses are redirected to that value and the phi is deleted. Removing one phi can make
/// another redundant, so the pass repeats until nothing changes. Phis with a bogus input
/// are left alone.
pub struct PhiSimplifier;

impl PhiSimplifier {
    /// Runs the simplification and returns the number of removed phis.
    pub fn apply(graph: &mut Graph) -> usize {
        let mut removed = 0;
        loop {
            let mut changed = false;
            for block in graph.blocks() {
                for phi in graph.block(block).phis.clone() {
                    let Some(value) = Self::single_value(graph, phi) else {
                        continue;
                    };
                    graph.replace_at_usages(phi, value);
                    graph.clear_inputs(phi);
                    graph.block_mut(block).phis.retain(|&p| p != phi);
                    graph.delete(phi);
                    removed += 1;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        if removed > 0 {
            log::debug!("removed {removed} redundant phis");
        }
        removed
    }

    fn single_value(graph: &Graph, phi: NodeId) -> Option<NodeId> {
        let mut single = None;
        for &input in &graph.node(phi).inputs {
            if input == phi {
                continue;
            }
            if input.is_null() {
                return None;
            }
            match single {
                None => single = Some(input),
                Some(value) if value == input => {}
                Some(_) => return None,
            }
        }
        single
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::BytecodeAssembler,
        ir::{BlockBegin, Node, NodeKind},
        meta::{Constant, Kind},
        test::{build, build_raw, static_method},
        Result,
    };

    // while (x != 0) {} return x
    fn spin() -> Result<Vec<u8>> {
        let mut asm = BytecodeAssembler::new();
        asm.label("loop")?
            .iload(0)?
            .ifne("loop")?
            .iload(0)?
            .ireturn()?;
        asm.finish()
    }

    fn phi_count(graph: &Graph) -> usize {
        graph
            .live_ids()
            .filter(|&id| matches!(graph.node(id).kind, NodeKind::Phi { .. }))
            .count()
    }

    #[test]
    fn test_loop_invariant_phi_is_removed() -> Result<()> {
        let method = static_method("(I)I", spin()?, 1);
        let mut raw = build_raw(&method);
        assert!(phi_count(raw.graph()) >= 1);

        let graph = raw.graph_mut();
        let removed = PhiSimplifier::apply(graph);
        assert!(removed >= 1);
        assert_eq!(phi_count(graph), 0);
        graph.verify()?;

        let ir = build(&method);
        assert_eq!(ir.stats().phis_removed, removed);
        Ok(())
    }

    #[test]
    fn test_chained_phis_collapse() {
        let mut graph = Graph::new();
        let a = graph.add_block(BlockBegin::new(0, 0));
        let b = graph.add_block(BlockBegin::new(4, 1));
        let x = graph.add(Node::constant(Constant::Int(7)));
        let outer = graph.add_phi(a, Kind::Int, Vec::new());
        let inner = graph.add_phi(b, Kind::Int, vec![x, x]);
        graph.add_input(outer, x);
        graph.add_input(outer, inner);
        let user = graph.add(Node::new(NodeKind::Return { safepoint: false }, Kind::Void));
        graph.add_input(user, inner);
        graph.add_input(user, outer);

        assert_eq!(PhiSimplifier::apply(&mut graph), 2);
        assert_eq!(graph.node(user).inputs, vec![x, x]);
        assert!(graph.block(a).phis.is_empty());
        assert!(graph.block(b).phis.is_empty());
    }

    #[test]
    fn test_real_merge_and_bogus_input_survive() {
        let mut graph = Graph::new();
        let a = graph.add_block(BlockBegin::new(0, 0));
        let x = graph.add(Node::constant(Constant::Int(1)));
        let y = graph.add(Node::constant(Constant::Int(2)));
        graph.add_phi(a, Kind::Int, vec![x, y]);
        graph.add_phi(a, Kind::Int, vec![x, NodeId::NULL]);

        assert_eq!(PhiSimplifier::apply(&mut graph), 0);
        assert_eq!(graph.block(a).phis.len(), 2);
    }
}
