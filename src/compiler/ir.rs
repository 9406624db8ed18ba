//! The construction orchestrator.
//!
//! [`Ir::build`] runs the graph builder over one method and then the cleanup passes the
//! configuration enables. The result owns the graph; the linear block order is computed
//! lazily on first request, splitting critical edges first.

use crate::{
    builder::GraphBuilder,
    compiler::{
        critical, order, BranchFolder, CompilationStats, CompilerConfig, DeadCodeElimination,
        PhiSimplifier,
    },
    ir::{Graph, NodeKind},
    meta::{MethodInfo, Runtime},
    utils::graph::NodeId,
    Error, Result,
};

/// The inputs of one compilation.
#[derive(Clone, Copy)]
pub struct Compilation<'a> {
    /// The method being compiled
    pub method: &'a MethodInfo,
    /// Runtime queries (method resolution, constant types, lock sizes)
    pub runtime: &'a dyn Runtime,
    /// Options
    pub config: &'a CompilerConfig,
}

/// Counters shared between the builder and the passes of one compilation.
#[derive(Clone, Debug, Default)]
pub struct IrCounters {
    next_block_number: usize,
    node_count: usize,
    max_locks: usize,
}

impl IrCounters {
    /// Hands out the next block number.
    pub fn next_block_number(&mut self) -> usize {
        let number = self.next_block_number;
        self.next_block_number += 1;
        number
    }

    /// Number of block numbers handed out so far.
    #[must_use]
    pub fn block_numbers_used(&self) -> usize {
        self.next_block_number
    }

    /// Counts an appended instruction and returns the new total.
    pub fn count_node(&mut self) -> usize {
        self.node_count += 1;
        self.node_count
    }

    /// Number of appended instructions.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Records a lock depth, keeping the maximum.
    pub fn record_locks(&mut self, depth: usize) {
        self.max_locks = self.max_locks.max(depth);
    }

    /// Deepest lock nesting seen.
    #[must_use]
    pub fn max_locks(&self) -> usize {
        self.max_locks
    }
}

/// The IR of one method.
///
/// # Examples
///
/// ```rust,ignore
/// use bcgraph::{CompilerConfig, DefaultRuntime, Ir};
///
/// let mut ir = Ir::build(&method, &DefaultRuntime, &CompilerConfig::default())?;
/// for &block in ir.linear_scan_order() {
///     println!("{}", block);
/// }
/// ```
#[derive(Debug)]
pub struct Ir {
    graph: Graph,
    start_block: NodeId,
    counters: IrCounters,
    order: Option<Vec<NodeId>>,
    stats: CompilationStats,
    split_critical_edges: bool,
    edges_split: bool,
    dead_code_eliminated: bool,
    max_locals: usize,
    method_name: String,
}

impl Ir {
    /// Builds and cleans the graph of `method`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration, [`Error::Bailout`] if the
    /// method cannot be compiled, and [`Error::Unresolved`] if the constant pool is missing an
    /// entry the bytecode refers to.
    pub fn build(
        method: &MethodInfo,
        runtime: &dyn Runtime,
        config: &CompilerConfig,
    ) -> Result<Ir> {
        config.validate()?;
        let method_name = method.name();
        log::debug!("compiling {method_name}");

        let compilation = Compilation {
            method,
            runtime,
            config,
        };
        let mut graph = Graph::new();
        let mut counters = IrCounters::default();

        let built = GraphBuilder::new(compilation, &mut graph, &mut counters)
            .and_then(GraphBuilder::build);
        if let Err(error) = built {
            match &error {
                Error::Bailout { reason } => log::debug!("bailout in {method_name}: {reason}"),
                other => log::debug!("failed to build {method_name}: {other}"),
            }
            return Err(error);
        }

        let mut stats = CompilationStats::default();
        if config.fold_constant_branches {
            stats.folded_branches = BranchFolder::apply(&mut graph);
        }
        if config.eliminate_dead_code {
            stats.dce_deleted = DeadCodeElimination::apply(&mut graph);
        }
        if config.simplify_phis {
            stats.phis_removed = PhiSimplifier::apply(&mut graph);
        }

        stats.node_count = counters.node_count();
        stats.max_locks = counters.max_locks();
        stats.blocks = graph.blocks().len();
        log::debug!(
            "built {method_name}: {} blocks, {} instructions, {} folded, {} deleted, {} phis removed",
            stats.blocks,
            stats.node_count,
            stats.folded_branches,
            stats.dce_deleted,
            stats.phis_removed
        );

        Ok(Ir {
            start_block: graph.start(),
            graph,
            counters,
            order: None,
            stats,
            split_critical_edges: config.split_critical_edges,
            edges_split: false,
            dead_code_eliminated: config.eliminate_dead_code,
            max_locals: method.max_locals,
            method_name,
        })
    }

    /// The blocks in linear scan order, starting with the start block.
    ///
    /// The first call splits critical edges (when enabled) and computes the order; later
    /// calls return the cached order without touching the graph. After [`Ir::graph_mut`] the
    /// order is recomputed, but edges are never split a second time.
    pub fn linear_scan_order(&mut self) -> &[NodeId] {
        if self.order.is_none() {
            if self.split_critical_edges && !self.edges_split {
                let split = critical::split_critical_edges(&mut self.graph, &mut self.counters);
                self.edges_split = true;
                self.stats.critical_edges_split = split;
                self.stats.blocks = self.graph.blocks().len();
                log::debug!("split {split} critical edges in {}", self.method_name);
            }
            self.order = Some(order::linear_scan_order(&self.graph, self.start_block));
        }
        self.order.as_deref().unwrap_or_default()
    }

    /// The cached block order, `None` before [`Ir::linear_scan_order`] was called.
    #[must_use]
    pub fn cached_order(&self) -> Option<&[NodeId]> {
        self.order.as_deref()
    }

    /// Hands out a fresh block number for blocks created after construction.
    pub fn next_block_number(&mut self) -> usize {
        self.counters.next_block_number()
    }

    /// Deepest lock nesting in the method.
    #[must_use]
    pub fn max_locks(&self) -> usize {
        self.counters.max_locks()
    }

    /// Statistics of this compilation.
    ///
    /// A snapshot taken at build time and refreshed once by the critical edge split; edits
    /// made through [`Ir::graph_mut`] are not reflected.
    #[must_use]
    pub fn stats(&self) -> &CompilationStats {
        &self.stats
    }

    /// The graph.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The graph, mutably; invalidates the cached block order but not the split state.
    pub fn graph_mut(&mut self) -> &mut Graph {
        self.order = None;
        &mut self.graph
    }

    /// The block holding the method prologue.
    #[must_use]
    pub fn start_block(&self) -> NodeId {
        self.start_block
    }

    /// `"holder.name descriptor"` of the compiled method.
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Checks the structural invariants of the IR.
    ///
    /// On top of [`Graph::verify`]: every block is reachable from the start block (once dead
    /// code was eliminated), every frame state spans the method's locals, and a computed order
    /// lists each reachable block once with no critical edge left when splitting is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] describing the first violation.
    pub fn verify(&self) -> Result<()> {
        self.graph.verify()?;

        let reachable = order::linear_scan_order(&self.graph, self.start_block);
        if self.dead_code_eliminated {
            let blocks = self.graph.blocks();
            if let Some(unreachable) = blocks.iter().find(|b| !reachable.contains(b)) {
                return Err(Error::GraphError(format!(
                    "block {unreachable} is not reachable from the start block"
                )));
            }
        }

        for id in self.graph.live_ids() {
            if let NodeKind::FrameState(info) = &self.graph.node(id).kind {
                if info.locals_size != self.max_locals {
                    return Err(Error::GraphError(format!(
                        "frame state {id} has {} locals, the method has {}",
                        info.locals_size, self.max_locals
                    )));
                }
            }
        }

        if let Some(order) = &self.order {
            if order.len() != reachable.len() || order.iter().any(|b| !reachable.contains(b)) {
                return Err(Error::GraphError(
                    "cached block order does not match the reachable blocks".to_string(),
                ));
            }
            if self.split_critical_edges {
                if let Some((from, to)) = critical::CriticalEdgeFinder::apply(&self.graph)
                    .edges()
                    .first()
                {
                    return Err(Error::GraphError(format!(
                        "critical edge {from} -> {to} survived splitting"
                    )));
                }
            }
        }

        Ok(())
    }
}
