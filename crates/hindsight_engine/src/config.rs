//! Configuration for the explanation engine.

/// Switches for the optional refinements of both analyses.
///
/// The default enables every refinement. [`AnalysisConfig::literal`] turns
/// them all off, which keeps graphs closer to the raw trace at the cost of
/// noisier answers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Add argument producers of opaque calls made inside an invocation as causes.
    pub opaque_call_arguments: bool,

    /// Route loop iterations into one loop block per loop instead of nesting them.
    pub collapse_loops: bool,

    /// Drop call sites whose declared receiver cannot dispatch to the method
    /// for the expected receiver's class.
    pub prune_by_receiver_type: bool,

    /// Drop call sites in instance methods of classes never instantiated in the run.
    pub prune_uninstantiated_callers: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            opaque_call_arguments: true,
            collapse_loops: true,
            prune_by_receiver_type: true,
            prune_uninstantiated_callers: true,
        }
    }
}

impl AnalysisConfig {
    /// Creates a configuration with every refinement enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with every refinement disabled.
    #[must_use]
    pub fn literal() -> Self {
        Self {
            opaque_call_arguments: false,
            collapse_loops: false,
            prune_by_receiver_type: false,
            prune_uninstantiated_callers: false,
        }
    }

    /// Builder method to include opaque call arguments as causes.
    #[must_use]
    pub fn with_opaque_call_arguments(mut self, enabled: bool) -> Self {
        self.opaque_call_arguments = enabled;
        self
    }

    /// Builder method to collapse loop iterations.
    #[must_use]
    pub fn with_collapse_loops(mut self, enabled: bool) -> Self {
        self.collapse_loops = enabled;
        self
    }

    /// Builder method to prune callers by receiver type.
    #[must_use]
    pub fn with_prune_by_receiver_type(mut self, enabled: bool) -> Self {
        self.prune_by_receiver_type = enabled;
        self
    }

    /// Builder method to prune callers in never-instantiated classes.
    #[must_use]
    pub fn with_prune_uninstantiated_callers(mut self, enabled: bool) -> Self {
        self.prune_uninstantiated_callers = enabled;
        self
    }
}
