//! Data types produced and consumed by the trace engine.
//!
//! - `blame`: Revision, BlamedLine, BlameOptions for per-line attribution
//! - `mapping`: ChangeClassification, MappingResult, MappingEvidence
//! - `chain`: TrackingStep, TrackingChain, SeedTrace, BicCandidates

pub mod blame;
pub mod chain;
pub mod mapping;

pub use blame::*;
pub use chain::*;
pub use mapping::*;
