//! Tracking chains: the evidence trail from a fix commit back to a
//! bug-introducing commit candidate.

use serde::Serialize;

use super::mapping::ChangeClassification;

/// A single (file, line) pair at the fix commit from which a backward
/// trace begins. Supplied by an external seed provider, typically derived
/// from diffing the fix commit against its parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Seed {
    pub file_path: String,
    /// 1-based line number at the fix commit's parent.
    pub line_number: u32,
}

impl Seed {
    pub fn new(file_path: impl Into<String>, line_number: u32) -> Self {
        Self {
            file_path: file_path.into(),
            line_number,
        }
    }
}

/// One hop of the backward walk. Append-only once created.
#[derive(Debug, Clone, Serialize)]
pub struct TrackingStep {
    /// Commit blamed for the line at this hop.
    pub revision: String,
    pub file_path: String,
    /// 1-based line number at `revision`.
    pub line_number: u32,
    pub line_content: String,
    pub classification: ChangeClassification,
    pub confidence: f32,
    /// Unix timestamp of `revision`.
    pub timestamp: i64,
}

/// Ordered steps, head nearest the fix, tail the BIC candidate or the
/// walk boundary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackingChain {
    pub steps: Vec<TrackingStep>,
}

impl TrackingChain {
    pub fn push(&mut self, step: TrackingStep) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The BIC candidate: the tail step, when it was classified `Insert`.
    pub fn bic(&self) -> Option<&TrackingStep> {
        self.steps
            .last()
            .filter(|s| s.classification == ChangeClassification::Insert)
    }
}

/// Why a walk stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TerminalState {
    /// The line's introduction point was found; the tail step is the BIC.
    Introduced,
    /// History ran out before an introduction point was seen.
    /// `depth_limited` distinguishes the configured depth cap from a true
    /// history boundary (file vanished, no parent line, cancellation).
    Boundary { depth_limited: bool },
    /// A persistent blame fault aborted this seed. The partial chain is
    /// retained.
    Error { message: String },
}

/// Full result of one seed's walk.
#[derive(Debug, Clone, Serialize)]
pub struct SeedTrace {
    pub fix_commit: String,
    pub seed: Seed,
    pub terminal: TerminalState,
    pub chain: TrackingChain,
}

impl SeedTrace {
    pub fn bic(&self) -> Option<&TrackingStep> {
        match self.terminal {
            TerminalState::Introduced => self.chain.bic(),
            _ => None,
        }
    }
}

/// One BIC candidate with the traces that support it.
#[derive(Debug, Clone, Serialize)]
pub struct BicCandidate {
    pub revision: String,
    /// Indices into `BicCandidates::traces` of the supporting walks.
    pub supporting_traces: Vec<usize>,
}

/// Aggregated output for one fix commit: every seed's trace plus the
/// distinct BIC candidates ordered by how many traces support them.
#[derive(Debug, Clone, Serialize)]
pub struct BicCandidates {
    pub fix_commit: String,
    pub traces: Vec<SeedTrace>,
    pub candidates: Vec<BicCandidate>,
}

impl BicCandidates {
    pub fn from_traces(fix_commit: String, traces: Vec<SeedTrace>) -> Self {
        let mut by_revision: Vec<BicCandidate> = Vec::new();

        for (idx, trace) in traces.iter().enumerate() {
            let Some(bic) = trace.bic() else { continue };

            match by_revision.iter_mut().find(|c| c.revision == bic.revision) {
                Some(candidate) => candidate.supporting_traces.push(idx),
                None => by_revision.push(BicCandidate {
                    revision: bic.revision.clone(),
                    supporting_traces: vec![idx],
                }),
            }
        }

        by_revision.sort_by(|a, b| b.supporting_traces.len().cmp(&a.supporting_traces.len()));

        Self {
            fix_commit,
            traces,
            candidates: by_revision,
        }
    }
}
