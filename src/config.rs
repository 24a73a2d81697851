/// Options controlling which phases run when compiling a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Run the unreachable code / constant propagation fixpoint
    pub optimize: bool,
    pub reference_counting: bool,
    /// Check that every non-nullable field is set by every create
    pub verify_fields: bool,
    pub max_fixpoint_iterations: usize,
    /// Compile independent modules on separate threads
    pub parallel: bool,
    /// Count warnings as failures
    pub deny_warnings: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            optimize: true,
            reference_counting: true,
            verify_fields: true,
            max_fixpoint_iterations: 64,
            parallel: false,
            deny_warnings: false,
        }
    }
}

impl Config {
    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_reference_counting(mut self, reference_counting: bool) -> Self {
        self.reference_counting = reference_counting;
        self
    }

    pub fn with_verify_fields(mut self, verify_fields: bool) -> Self {
        self.verify_fields = verify_fields;
        self
    }

    pub fn with_max_fixpoint_iterations(mut self, iterations: usize) -> Self {
        self.max_fixpoint_iterations = iterations;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_deny_warnings(mut self, deny_warnings: bool) -> Self {
        self.deny_warnings = deny_warnings;
        self
    }
}
