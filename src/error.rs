//! Error types for the trace engine.
//!
//! Defines `TraceError` for all failure conditions the core can hit. Most
//! variants are recoverable at a well-defined point in the walk:
//! - `NotFound` / empty blame → walk boundary
//! - `ToolUnavailable` → downgrade to the textual mapper for the run
//! - `ToolTimeout`, `ToolInvocationFailure` → classification `Unknown` for
//!   that step, subject to the oracle/fallback policy
//! - `Oracle*` → fall back to the no-oracle policy
//!
//! Only a persistent blame I/O fault aborts a seed's walk, and no single
//! seed failure aborts a batch.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Path not found: {path} at {revision}")]
    NotFound { path: String, revision: String },

    #[error("Ambiguous revision: {0}")]
    AmbiguousRevision(String),

    #[error("Structural tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Structural tool timed out after {0}s")]
    ToolTimeout(u64),

    #[error("Structural tool invocation failed: {0}")]
    ToolInvocationFailure(String),

    #[error("Cache write conflict: {0}")]
    CacheWriteConflict(String),

    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Oracle returned a malformed response: {0}")]
    OracleMalformedResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TraceError {
    /// True for faults that end a walk at a history boundary rather than
    /// aborting the seed.
    pub fn is_boundary(&self) -> bool {
        matches!(self, TraceError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, TraceError>;
