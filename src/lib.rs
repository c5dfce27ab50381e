//! bictrace - blame-chain tracing for defect provenance.
//!
//! Given a bug-fixing commit and the lines it altered, walk backward
//! through git history to find the commits that first introduced those
//! lines (the SZZ family of algorithms). The crate is the tracing core:
//! per-line blame, two line-mapping strategies (structural-diff tool and
//! textual similarity), a persistent mapping cache, an optional external
//! decision oracle, and a parallel batch runner. Identifying which
//! commits are fixes, and which lines they modified, is the caller's job.
//!
//! ```no_run
//! use bictrace::{
//!     CancelFlag, GitRepository, MapperRegistry, Seed, TraceConfig, TraceRunner,
//! };
//!
//! # fn main() -> Result<(), bictrace::TraceError> {
//! let repo = GitRepository::open("/path/to/repo")?;
//! let mappers = MapperRegistry::new(&repo);
//! let config = TraceConfig::default();
//!
//! let runner = TraceRunner::new(&repo, &mappers, &config);
//! let seeds = vec![Seed::new("src/parser.c", 120)];
//! let result = runner.trace_fix_commit("abc123", &seeds, &CancelFlag::new());
//!
//! for candidate in &result.candidates {
//!     println!("BIC candidate: {}", candidate.revision);
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod git;
pub mod mapper;
pub mod models;
pub mod oracle;
pub mod walker;

pub use batch::TraceRunner;
pub use cache::MappingCache;
pub use config::TraceConfig;
pub use error::{Result, TraceError};
pub use git::{BlameProvider, GitRepository};
pub use mapper::{LineMapper, MapperRegistry, StructuralMapper, StructuralTool, TextualMapper};
pub use models::{
    BicCandidate, BicCandidates, BlameOptions, BlamedLine, ChangeClassification, MappingEvidence,
    MappingResult, Revision, Seed, SeedTrace, TerminalState, TrackingChain, TrackingStep,
};
pub use oracle::{DecisionOracle, NoopOracle, OracleContext, OracleDecision, OracleFeedback};
pub use walker::{CancelFlag, ChainWalker};
