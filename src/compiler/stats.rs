//! Per-compilation statistics.

use std::{fmt, ops::AddAssign};

/// Counts collected while building and cleaning one graph.
///
/// These are a snapshot, not live values: they are recorded when [`crate::Ir::build`] returns
/// and `blocks` is refreshed once when critical edges are split.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompilationStats {
    /// Instructions appended by the builder
    pub node_count: usize,
    /// Live blocks after the last pass
    pub blocks: usize,
    /// Deepest lock nesting
    pub max_locks: usize,
    /// Nodes deleted by dead code elimination
    pub dce_deleted: usize,
    /// Blocks inserted on critical edges
    pub critical_edges_split: usize,
    /// `If`s and switches turned into `Goto`s
    pub folded_branches: usize,
    /// Redundant phis removed
    pub phis_removed: usize,
}

impl AddAssign<&CompilationStats> for CompilationStats {
    fn add_assign(&mut self, other: &CompilationStats) {
        self.node_count += other.node_count;
        self.blocks += other.blocks;
        self.max_locks = self.max_locks.max(other.max_locks);
        self.dce_deleted += other.dce_deleted;
        self.critical_edges_split += other.critical_edges_split;
        self.folded_branches += other.folded_branches;
        self.phis_removed += other.phis_removed;
    }
}

impl fmt::Display for CompilationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} instructions in {} blocks, {} locks, {} deleted, {} split, {} folded, {} phis removed",
            self.node_count,
            self.blocks,
            self.max_locks,
            self.dce_deleted,
            self.critical_edges_split,
            self.folded_branches,
            self.phis_removed
        )
    }
}
