//! Line-mapping result types.

use serde::{Deserialize, Serialize};

/// What happened to a line relative to the commit's first parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeClassification {
    /// No counterpart in the parent. Always terminal.
    Insert,
    /// The file (or line) is gone at the commit.
    Delete,
    /// A counterpart exists but its content is materially different.
    Update,
    /// Equal content at a different line number.
    Move,
    /// Equal content at the same line number.
    Unchanged,
    /// The mapper could not determine an answer.
    Unknown,
}

impl ChangeClassification {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChangeClassification::Insert)
    }
}

/// How a mapping result was reached, kept for downstream reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingEvidence {
    /// Statement-level correspondence from the structural-diff tool.
    Structural { change_type: String },
    /// Structural tool produced output but no statement for the line.
    StructuralSilent,
    /// Single exact normalized match in the parent.
    ExactMatch,
    /// Several exact matches; the nearest line was picked.
    MultipleExactMatches { candidates: Vec<u32> },
    /// Best character-set similarity against the parent's lines.
    Similarity { score: f32 },
    /// File absent on one side of the commit, or a root commit.
    FilePresence { reason: &'static str },
    /// Empty or comment-only target line, or a tool failure.
    NoEvidence { reason: String },
}

/// Outcome of one `LineMapper::map` call.
#[derive(Debug, Clone, Serialize)]
pub struct MappingResult {
    pub classification: ChangeClassification,
    /// Line number in the first parent, when the line has a counterpart.
    pub parent_line: Option<u32>,
    /// In `[0, 1]`. Ambiguity is expressed here, never hidden.
    pub confidence: f32,
    pub evidence: MappingEvidence,
}

impl MappingResult {
    pub fn new(
        classification: ChangeClassification,
        parent_line: Option<u32>,
        confidence: f32,
        evidence: MappingEvidence,
    ) -> Self {
        Self {
            classification,
            parent_line,
            confidence,
            evidence,
        }
    }

    /// Insert result with no parent counterpart.
    pub fn insert(confidence: f32, evidence: MappingEvidence) -> Self {
        Self::new(ChangeClassification::Insert, None, confidence, evidence)
    }

    /// Unknown result that the walker routes to the oracle or fallback.
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self::new(
            ChangeClassification::Unknown,
            None,
            0.0,
            MappingEvidence::NoEvidence {
                reason: reason.into(),
            },
        )
    }
}
