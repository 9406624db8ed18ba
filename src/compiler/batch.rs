//! Parallel compilation of independent methods.

use rayon::prelude::*;

use crate::{
    compiler::{CompilationStats, CompilerConfig, Ir},
    meta::{MethodInfo, Runtime},
    Result,
};

/// The result of compiling one method of a batch.
#[derive(Debug)]
pub struct CompileOutcome {
    /// `"holder.name descriptor"` of the method
    pub method_name: String,
    /// The IR, or the reason the method could not be compiled
    pub result: Result<Ir>,
}

impl CompileOutcome {
    /// `true` if the method was compiled.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Statistics of a successful compilation.
    #[must_use]
    pub fn stats(&self) -> Option<&CompilationStats> {
        self.result.as_ref().ok().map(Ir::stats)
    }
}

/// Compiles every method in parallel, one independent graph per method.
///
/// Outcomes are returned in the order of `methods`. A bailout in one method does not affect
/// the others.
pub fn compile_all(
    methods: &[MethodInfo],
    runtime: &dyn Runtime,
    config: &CompilerConfig,
) -> Vec<CompileOutcome> {
    let outcomes: Vec<CompileOutcome> = methods
        .par_iter()
        .map(|method| CompileOutcome {
            method_name: method.name(),
            result: Ir::build(method, runtime, config),
        })
        .collect();

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    log::debug!(
        "compiled {} methods, {} failed",
        outcomes.len() - failed,
        failed
    );
    outcomes
}

/// Sums the statistics of the successful outcomes.
#[must_use]
pub fn total_stats(outcomes: &[CompileOutcome]) -> CompilationStats {
    let mut total = CompilationStats::default();
    for stats in outcomes.iter().filter_map(CompileOutcome::stats) {
        total += stats;
    }
    total
}
