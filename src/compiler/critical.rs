//! Critical edge splitting.
//!
//! An edge is critical when its source block has several successors and its target block
//! several predecessors. Splitting puts an empty block holding a single `Goto` on each such
//! edge, so later phases have a place for code that belongs to that edge alone.

use rustc_hash::FxHashSet;

use crate::{
    compiler::{order, IrCounters},
    ir::{BlockBegin, BlockFlags, Graph, Node, NodeKind},
    meta::Kind,
    utils::graph::NodeId,
};

/// Collects the critical edges of the blocks reachable from the start block.
#[derive(Debug, Default)]
pub struct CriticalEdgeFinder {
    edges: Vec<(NodeId, NodeId)>,
    seen: FxHashSet<(NodeId, usize)>,
}

impl CriticalEdgeFinder {
    /// Scans `graph` and returns the finder holding the edges found.
    #[must_use]
    pub fn apply(graph: &Graph) -> Self {
        let mut finder = CriticalEdgeFinder::default();
        for block in order::linear_scan_order(graph, graph.start()) {
            finder.block_do(graph, block);
        }
        finder
    }

    fn block_do(&mut self, graph: &Graph, block: NodeId) {
        let successors = graph.block_successors(block);
        if successors.len() < 2 {
            return;
        }
        for (slot, &succ) in successors.iter().enumerate() {
            if graph.predecessors(succ).len() >= 2 && self.seen.insert((block, slot)) {
                self.edges.push((block, succ));
            }
        }
    }

    /// `(source, target)` pairs in discovery order; a pair appears once per successor slot.
    #[must_use]
    pub fn edges(&self) -> &[(NodeId, NodeId)] {
        &self.edges
    }
}

/// Splits every critical edge of `graph` and returns the number of blocks inserted.
pub fn split_critical_edges(graph: &mut Graph, counters: &mut IrCounters) -> usize {
    let edges = CriticalEdgeFinder::apply(graph).edges;
    for &(source, target) in &edges {
        split_edge(graph, counters, source, target);
    }
    edges.len()
}

fn split_edge(graph: &mut Graph, counters: &mut IrCounters, source: NodeId, target: NodeId) {
    let source_end = graph.block(source).end;
    let end = graph.node(source_end);
    let state = end.state_after;
    let bci = if end.successors.len() == 1 {
        end.bci.unwrap_or(graph.block(target).bci)
    } else {
        graph.block(target).bci
    };

    let mut header = BlockBegin::new(bci, counters.next_block_number());
    header.flags = BlockFlags::CRITICAL_EDGE_SPLIT;
    header.predecessors.push(source);
    let block = graph.add_block(header);
    graph.node_mut(block).state_before = state;

    let mut goto = Node::new(NodeKind::Goto { safepoint: false }, Kind::Void);
    goto.bci = Some(bci);
    goto.block = block;
    goto.appended = true;
    goto.state_after = state;
    goto.successors.push(target);
    let goto = graph.add(goto);
    graph.set_successor(block, 0, goto);
    graph.block_mut(block).end = goto;

    let redirected = graph.substitute_successor(source_end, target, block);
    invariant!(redirected, "{} is not a successor of {}", target, source);
    let rewired = graph.substitute_predecessor(target, source, block);
    invariant!(rewired, "{} is not a predecessor of {}", source, target);
    log::trace!("split critical edge {source} -> {target} with {block}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::BytecodeAssembler,
        test::{build, static_method},
        Result,
    };

    // if (x == 0) goto join; x = 1; join: return x
    fn triangle() -> Result<Vec<u8>> {
        let mut asm = BytecodeAssembler::new();
        asm.iload(0)?
            .ifeq("join")?
            .iconst(1)?
            .istore(0)?
            .label("join")?
            .iload(0)?
            .ireturn()?;
        asm.finish()
    }

    #[test]
    fn test_triangle_has_one_critical_edge() -> Result<()> {
        let ir = build(&static_method("(I)I", triangle()?, 1));
        let finder = CriticalEdgeFinder::apply(ir.graph());
        assert_eq!(finder.edges().len(), 1);
        let (source, target) = finder.edges()[0];
        assert_eq!(ir.graph().block_successors(source).len(), 2);
        assert_eq!(ir.graph().predecessors(target).len(), 2);
        Ok(())
    }

    #[test]
    fn test_split_inserts_goto_block() -> Result<()> {
        let mut ir = build(&static_method("(I)I", triangle()?, 1));
        let before = ir.graph().blocks().len();
        ir.linear_scan_order();
        assert_eq!(ir.stats().critical_edges_split, 1);

        let graph = ir.graph();
        assert_eq!(graph.blocks().len(), before + 1);
        let split = graph
            .blocks()
            .into_iter()
            .find(|&b| graph.block(b).is_set(BlockFlags::CRITICAL_EDGE_SPLIT))
            .expect("split block");
        let chain = graph.instructions(split);
        assert_eq!(chain.len(), 1);
        assert_eq!(
            graph.node(chain[0]).kind,
            NodeKind::Goto { safepoint: false }
        );
        assert_eq!(graph.predecessors(split).len(), 1);
        assert!(graph.node(split).state_before == graph.node(chain[0]).state_after);
        assert!(CriticalEdgeFinder::apply(graph).edges().is_empty());
        ir.verify()?;
        Ok(())
    }

    #[test]
    fn test_switch_slots_to_one_target_are_split_separately() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iload(0)?
            .tableswitch(0, &["join", "join"], "join")?
            .label("join")?
            .iload(0)?
            .ireturn()?;
        let mut ir = build(&static_method("(I)I", asm.finish()?, 1));
        let edges = CriticalEdgeFinder::apply(ir.graph()).edges().len();
        assert_eq!(edges, 3);
        ir.linear_scan_order();
        assert_eq!(ir.stats().critical_edges_split, 3);
        ir.verify()?;
        Ok(())
    }
}
