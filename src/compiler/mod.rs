//! Construction orchestration and the graph cleanup passes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Ir::build(method, runtime, config)                         │
//! │    1. GraphBuilder          bytecode -> blocks, values, phis │
//! │    2. BranchFolder          If/switch on constants -> Goto   │
//! │    3. DeadCodeElimination   unreachable blocks, unused values│
//! │    4. PhiSimplifier         phis with a single real input    │
//! │                                                             │
//! │  Ir::linear_scan_order()   (first call only)                │
//! │    5. split_critical_edges  one block per critical edge      │
//! │    6. linear_scan_order     reverse postorder of blocks      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every pass is a plain function object over [`crate::ir::Graph`] that returns the number of
//! changes it made; the counts end up in [`CompilationStats`]. [`compile_all`] runs
//! independent compilations in parallel.

mod batch;
mod config;
mod critical;
mod deadcode;
mod fold;
mod ir;
mod order;
mod phi;
mod stats;

pub use batch::{compile_all, total_stats, CompileOutcome};
pub use config::CompilerConfig;
pub use critical::{split_critical_edges, CriticalEdgeFinder};
pub use deadcode::DeadCodeElimination;
pub use fold::BranchFolder;
pub use ir::{Compilation, Ir, IrCounters};
pub use order::{linear_scan_order, BlockGraph};
pub use phi::PhiSimplifier;
pub use stats::CompilationStats;
