//! Dead code elimination.
//!
//! Two marking phases over the arena:
//!
//! 1. Control: everything reachable from `Root` along successor edges is live. Dead CFG
//!    nodes are disconnected from the live blocks they flow into, which drops their
//!    predecessor slots and the matching phi inputs.
//! 2. Values: everything reachable from a live node along input edges (frame state
//!    references included) is live.
//!
//! Whatever stays unmarked is deleted, CFG nodes first.

use crate::{
    ir::{Graph, NodeKind},
    utils::graph::{algorithms, GraphBase, NodeId},
};

/// Removes unreachable blocks and unused values.
pub struct DeadCodeElimination {
    marked: Vec<bool>,
}

impl DeadCodeElimination {
    /// Runs the elimination and returns the number of deleted nodes.
    pub fn apply(graph: &mut Graph) -> usize {
        let mut pass = DeadCodeElimination {
            marked: vec![false; graph.node_count()],
        };
        pass.mark_control(graph);
        pass.disconnect_dead_control(graph);
        pass.mark_values(graph);
        pass.disconnect_dead_values(graph);
        let deleted = pass.delete_unmarked(graph);
        if deleted > 0 {
            log::debug!("dead code elimination deleted {deleted} nodes");
        }
        deleted
    }

    fn is_marked(&self, id: NodeId) -> bool {
        self.marked.get(id.index()).copied().unwrap_or(false)
    }

    fn mark_control(&mut self, graph: &Graph) {
        self.marked[NodeId::NULL.index()] = true;
        for id in algorithms::dfs(graph, NodeId::ROOT) {
            self.marked[id.index()] = true;
        }
    }

    fn disconnect_dead_control(&self, graph: &mut Graph) {
        let dead: Vec<NodeId> = graph
            .live_ids()
            .filter(|&id| !self.is_marked(id) && graph.node(id).kind.is_cfg())
            .collect();

        for id in dead {
            let node = graph.node(id);
            let block = match node.kind {
                NodeKind::BlockBegin(_) => id,
                _ => node.block,
            };
            let successors = node.successors.clone();
            for succ in successors {
                if self.is_marked(succ) && graph.node(succ).kind.is_control_merge() {
                    let removed = graph.remove_predecessor(succ, block);
                    if removed > 0 {
                        log::trace!("dropped {removed} edges from dead {block} into {succ}");
                    }
                }
            }
            graph.clear_successors(id);
            graph.clear_inputs(id);
        }
    }

    fn mark_values(&mut self, graph: &Graph) {
        let mut stack: Vec<NodeId> = graph.live_ids().filter(|&id| self.is_marked(id)).collect();
        while let Some(id) = stack.pop() {
            for input in graph.node(id).input_edges() {
                if !self.marked[input.index()] {
                    self.marked[input.index()] = true;
                    stack.push(input);
                }
            }
        }
    }

    fn disconnect_dead_values(&self, graph: &mut Graph) {
        let dead: Vec<NodeId> = graph
            .live_ids()
            .filter(|&id| !self.is_marked(id) && !graph.node(id).kind.is_cfg())
            .collect();
        for id in dead {
            graph.clear_inputs(id);
            graph.clear_successors(id);
        }
    }

    fn delete_unmarked(&self, graph: &mut Graph) -> usize {
        let (cfg, values): (Vec<NodeId>, Vec<NodeId>) = graph
            .live_ids()
            .filter(|&id| id != NodeId::ROOT && !self.is_marked(id))
            .partition(|&id| graph.node(id).kind.is_cfg());

        for &id in cfg.iter().chain(&values) {
            graph.node_mut(id).exception_handlers.clear();
            graph.delete(id);
        }

        for block in graph.blocks() {
            let mut slot = 0;
            graph.node_mut(block).successors.retain(|&succ| {
                slot += 1;
                slot == 1 || self.is_marked(succ)
            });
            graph
                .block_mut(block)
                .phis
                .retain(|&phi| self.is_marked(phi));
        }

        let survivors: Vec<NodeId> = graph.live_ids().collect();
        for id in survivors {
            graph
                .node_mut(id)
                .exception_handlers
                .retain(|&handler| self.is_marked(handler));
        }

        cfg.len() + values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::BytecodeAssembler,
        ir::{BlockBegin, Node},
        meta::{Constant, Kind},
        test::{build_raw, static_method},
        Result,
    };

    #[test]
    fn test_unreachable_block_is_deleted() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iconst(1)?
            .ireturn()?
            .iconst(2)?
            .ireturn()?;
        let mut ir = build_raw(&static_method("()I", asm.finish()?, 0));
        let blocks = ir.graph().blocks().len();

        let graph = ir.graph_mut();
        let deleted = DeadCodeElimination::apply(graph);
        assert!(deleted >= 1);
        assert_eq!(graph.blocks().len(), blocks - 1);
        graph.verify()?;
        Ok(())
    }

    #[test]
    fn test_dead_predecessor_drops_phi_input() {
        let mut graph = Graph::new();
        let entry = graph.add_block(BlockBegin::new(0, 0));
        let dead = graph.add_block(BlockBegin::new(4, 1));
        let join = graph.add_block(BlockBegin::new(8, 2));
        graph.set_start(entry);

        for (from, value) in [(entry, 1), (dead, 2)] {
            let constant = graph.add(Node::constant(Constant::Int(value)));
            let goto = graph.add(Node::new(NodeKind::Goto { safepoint: false }, Kind::Void));
            graph.set_successor(from, 0, constant);
            graph.set_successor(constant, 0, goto);
            graph.node_mut(constant).block = from;
            graph.node_mut(goto).block = from;
            graph.block_mut(from).end = goto;
            graph.add_successor(goto, join);
            graph.add_predecessor(join, from);
        }
        let ret = graph.add(Node::new(NodeKind::Return { safepoint: false }, Kind::Void));
        graph.set_successor(join, 0, ret);
        graph.block_mut(join).end = ret;

        let inputs: Vec<NodeId> = [entry, dead]
            .iter()
            .map(|&b| graph.instructions(b)[0])
            .collect();
        let phi = graph.add_phi(join, Kind::Int, inputs.clone());
        graph.add_input(ret, phi);

        let deleted = DeadCodeElimination::apply(&mut graph);
        assert_eq!(deleted, 3);
        assert!(!graph.is_alive(dead));
        assert_eq!(graph.predecessors(join), &[entry]);
        assert_eq!(graph.node(phi).inputs, vec![inputs[0]]);
        graph.verify().unwrap();
    }

    #[test]
    fn test_unused_phi_is_dropped_from_block() {
        let mut graph = Graph::new();
        let entry = graph.add_block(BlockBegin::new(0, 0));
        graph.set_start(entry);
        let ret = graph.add(Node::new(NodeKind::Return { safepoint: false }, Kind::Void));
        graph.set_successor(entry, 0, ret);
        graph.block_mut(entry).end = ret;
        let phi = graph.add_phi(entry, Kind::Int, Vec::new());

        assert_eq!(DeadCodeElimination::apply(&mut graph), 1);
        assert!(!graph.is_alive(phi));
        assert!(graph.block(entry).phis.is_empty());
        graph.verify().unwrap();
    }
}
