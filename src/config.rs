//! Tunables for a trace run.

use std::time::Duration;

use serde::Deserialize;

/// Configuration shared by every walk in a run.
///
/// Deserializable so callers can load it from a config file; `Default`
/// matches the values the algorithm was calibrated with.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Maximum number of backward steps per seed.
    pub max_depth: usize,
    /// Mapping results below this confidence are routed to the oracle
    /// (or the documented fallback) before the walk continues.
    pub trust_threshold: f32,
    /// Hard timeout for one structural-diff tool invocation, in seconds.
    pub tool_timeout_secs: u64,
    /// Overall deadline for a single oracle consultation.
    pub oracle_deadline: Duration,
    /// How many times a rejected oracle consultation is re-queried with
    /// feedback before giving up on the oracle for that step.
    pub oracle_retry_budget: usize,
    /// Transient blame faults are retried this many times before the seed
    /// is aborted.
    pub blame_retries: usize,
    /// Size of the worker pool for parallel seed walks; 0 uses rayon's
    /// default. Size to the cost of the structural tool invocation, a
    /// blocking subprocess call.
    pub worker_threads: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            max_depth: 30,
            trust_threshold: 0.5,
            tool_timeout_secs: 60,
            oracle_deadline: Duration::from_secs(120),
            oracle_retry_budget: 3,
            blame_retries: 1,
            worker_threads: 0,
        }
    }
}
