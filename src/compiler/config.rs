//! Configuration for graph construction and cleanup.
//!
//! [`CompilerConfig`] is threaded explicitly into the builder and the orchestrator; there is
//! no global option state, so differently configured compilations can run side by side.

use crate::{Error, Result};

/// Configuration for one compilation.
///
/// Controls the instruction cap, tracing, resolution behaviour, safepoint placement and
/// which cleanup passes run after the graph is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Maximum number of appended instructions before the build bails out (default: 37000).
    pub max_instruction_count: usize,

    /// Trace verbosity: 0 off, 1 one line per bytecode, 2 also frame state dumps (default: 0).
    pub trace_level: u8,

    /// Treat every type, field and method as unresolved (default: false).
    ///
    /// Forces the deferred-resolution paths so they can be exercised with fully resolved
    /// constant pools.
    pub test_patching: bool,

    /// Emit a `ResolveClass` of the holder before `invokestatic` calls into classes that are
    /// not initialized yet (default: true).
    pub resolve_class_before_static_invoke: bool,

    /// Do not place safepoint polls on backward branches and returns (default: false).
    pub no_safepoints: bool,

    /// Fold branches on constant conditions (default: true).
    pub fold_constant_branches: bool,

    /// Remove unreachable blocks and unused values (default: true).
    pub eliminate_dead_code: bool,

    /// Remove redundant phis (default: true).
    pub simplify_phis: bool,

    /// Split critical edges before computing the block order (default: true).
    pub split_critical_edges: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_instruction_count: 37000,
            trace_level: 0,
            test_patching: false,
            resolve_class_before_static_invoke: true,
            no_safepoints: false,
            fold_constant_branches: true,
            eliminate_dead_code: true,
            simplify_phis: true,
            split_critical_edges: true,
        }
    }
}

impl CompilerConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that only builds the graph, with every cleanup pass and
    /// edge splitting disabled.
    #[must_use]
    pub fn build_only() -> Self {
        Self {
            fold_constant_branches: false,
            eliminate_dead_code: false,
            simplify_phis: false,
            split_critical_edges: false,
            ..Self::default()
        }
    }

    /// Sets the instruction cap.
    #[must_use]
    pub fn with_max_instruction_count(mut self, max: usize) -> Self {
        self.max_instruction_count = max;
        self
    }

    /// Sets the trace level.
    #[must_use]
    pub fn with_trace_level(mut self, level: u8) -> Self {
        self.trace_level = level;
        self
    }

    /// Enables or disables forced unresolved lookups.
    #[must_use]
    pub fn with_test_patching(mut self, enabled: bool) -> Self {
        self.test_patching = enabled;
        self
    }

    /// Enables or disables holder resolution before static calls.
    #[must_use]
    pub fn with_resolve_class_before_static_invoke(mut self, enabled: bool) -> Self {
        self.resolve_class_before_static_invoke = enabled;
        self
    }

    /// Enables or disables safepoint suppression.
    #[must_use]
    pub fn with_no_safepoints(mut self, enabled: bool) -> Self {
        self.no_safepoints = enabled;
        self
    }

    /// Enables or disables constant branch folding.
    #[must_use]
    pub fn with_fold_constant_branches(mut self, enabled: bool) -> Self {
        self.fold_constant_branches = enabled;
        self
    }

    /// Enables or disables dead code elimination.
    #[must_use]
    pub fn with_eliminate_dead_code(mut self, enabled: bool) -> Self {
        self.eliminate_dead_code = enabled;
        self
    }

    /// Enables or disables phi simplification.
    #[must_use]
    pub fn with_simplify_phis(mut self, enabled: bool) -> Self {
        self.simplify_phis = enabled;
        self
    }

    /// Enables or disables critical edge splitting.
    #[must_use]
    pub fn with_split_critical_edges(mut self, enabled: bool) -> Self {
        self.split_critical_edges = enabled;
        self
    }

    /// Checks the configuration for unusable values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the instruction cap is zero or the trace level is above 2.
    pub fn validate(&self) -> Result<()> {
        if self.max_instruction_count == 0 {
            return Err(Error::Config(
                "max_instruction_count must be greater than zero".to_string(),
            ));
        }
        if self.trace_level > 2 {
            return Err(Error::Config(format!(
                "trace_level {} out of range 0..=2",
                self.trace_level
            )));
        }
        Ok(())
    }

    /// `true` if per-bytecode tracing is on.
    #[must_use]
    pub fn trace_instructions(&self) -> bool {
        self.trace_level >= 1
    }

    /// `true` if frame state dumps are on.
    #[must_use]
    pub fn trace_states(&self) -> bool {
        self.trace_level >= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.max_instruction_count, 37000);
        assert!(config.resolve_class_before_static_invoke);
        assert!(!config.test_patching);
        assert!(!config.no_safepoints);
        assert!(config.fold_constant_branches && config.eliminate_dead_code);
        assert!(config.simplify_phis && config.split_critical_edges);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = CompilerConfig::new()
            .with_trace_level(2)
            .with_no_safepoints(true)
            .with_max_instruction_count(10);
        assert!(config.trace_instructions() && config.trace_states());
        assert!(config.no_safepoints);
        assert_eq!(config.max_instruction_count, 10);

        let raw = CompilerConfig::build_only();
        assert!(!raw.eliminate_dead_code && !raw.split_critical_edges);
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            CompilerConfig::new().with_max_instruction_count(0).validate(),
            Err(Error::Config(_))
        ));
        assert!(CompilerConfig::new().with_trace_level(3).validate().is_err());
    }
}
