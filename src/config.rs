//! Runtime configuration.
//!
//! Settings are thread-local like the rest of the runtime; every thread that
//! builds a graph starts from [`RuntimeConfig::default`].

use std::cell::RefCell;

/// Tunables for the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Maximum nesting of evaluations before a read fails with
    /// `RuleError::DepthExceeded`.
    pub max_evaluation_depth: usize,

    /// Whether a new display controller schedules its first `update` for the
    /// next tick. Turn off to drive updates by hand.
    pub schedule_first_update: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_evaluation_depth: 256,
            schedule_first_update: true,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_evaluation_depth(mut self, depth: usize) -> Self {
        self.max_evaluation_depth = depth;
        self
    }

    #[must_use]
    pub fn with_first_update_scheduled(mut self, scheduled: bool) -> Self {
        self.schedule_first_update = scheduled;
        self
    }
}

thread_local! {
    static CONFIG: RefCell<RuntimeConfig> = RefCell::new(RuntimeConfig::default());
}

/// Replace the configuration for this thread.
pub fn configure(config: RuntimeConfig) {
    CONFIG.with(|current| *current.borrow_mut() = config);
}

/// Current configuration for this thread.
pub fn config() -> RuntimeConfig {
    CONFIG.with(|current| current.borrow().clone())
}

pub(crate) fn max_evaluation_depth() -> usize {
    CONFIG.with(|current| current.borrow().max_evaluation_depth)
}

/// Restore defaults (for testing).
pub fn reset_config() {
    configure(RuntimeConfig::default());
}
