//! Language-agnostic line mapping by textual similarity.
//!
//! Fallback strategy when no structural tool is registered for a file's
//! language. Matches the target line against the parent revision of the
//! file by whitespace-normalized equality first, then by a cheap
//! character-set similarity. Ambiguity is expressed through confidence,
//! never hidden: a duplicate exact match still returns the nearest-line
//! best guess, at 0.3.

use crate::error::{Result, TraceError};
use crate::git::repository::GitRepository;
use crate::mapper::LineMapper;
use crate::models::{
    is_comment_line, ChangeClassification, MappingEvidence, MappingResult,
};

/// Similarity threshold below which a line is considered novel.
const SIMILARITY_FLOOR: f32 = 0.6;

pub struct TextualMapper<'r> {
    repo: &'r GitRepository,
}

impl<'r> TextualMapper<'r> {
    pub fn new(repo: &'r GitRepository) -> Self {
        Self { repo }
    }
}

impl LineMapper for TextualMapper<'_> {
    fn map(
        &self,
        commit: &str,
        file_path: &str,
        line_number: u32,
        _line_content: &str,
    ) -> Result<MappingResult> {
        let revision = self.repo.revision_info(commit)?;

        let Some(parent) = revision.first_parent() else {
            return Ok(MappingResult::insert(
                0.9,
                MappingEvidence::FilePresence {
                    reason: "root_commit",
                },
            ));
        };

        let parent_content = match self.repo.file_content_at(file_path, parent) {
            Ok(content) => content,
            Err(TraceError::NotFound { .. }) => {
                return Ok(MappingResult::insert(
                    0.9,
                    MappingEvidence::FilePresence {
                        reason: "absent_in_parent",
                    },
                ));
            }
            Err(e) => return Err(e),
        };

        let current_content = match self.repo.file_content_at(file_path, commit) {
            Ok(content) => content,
            Err(TraceError::NotFound { .. }) => {
                return Ok(MappingResult::new(
                    ChangeClassification::Delete,
                    None,
                    0.9,
                    MappingEvidence::FilePresence {
                        reason: "absent_at_commit",
                    },
                ));
            }
            Err(e) => return Err(e),
        };

        Ok(classify_against_parent(
            &parent_content,
            &current_content,
            line_number,
        ))
    }
}

/// The classification core, independent of any repository access.
fn classify_against_parent(
    parent_content: &str,
    current_content: &str,
    line_number: u32,
) -> MappingResult {
    let Some(target) = current_content.lines().nth(line_number as usize - 1) else {
        return MappingResult::unknown("target line out of range");
    };

    if target.trim().is_empty() || is_comment_line(target) {
        return MappingResult::unknown("empty or comment-only line");
    }

    let normalized = normalize(target);
    let parent_lines: Vec<&str> = parent_content.lines().collect();

    let exact: Vec<u32> = parent_lines
        .iter()
        .enumerate()
        .filter(|(_, line)| normalize(line) == normalized)
        .map(|(i, _)| i as u32 + 1)
        .collect();

    match exact.len() {
        1 => {
            let parent_line = exact[0];
            MappingResult::new(
                move_or_unchanged(parent_line, line_number),
                Some(parent_line),
                0.7,
                MappingEvidence::ExactMatch,
            )
        }
        0 => similarity_fallback(&parent_lines, target),
        _ => {
            // Several identical lines: the line is not unique enough for a
            // reliable match. Still answer with the nearest candidate.
            let nearest = exact
                .iter()
                .copied()
                .min_by_key(|&m| (i64::from(m) - i64::from(line_number)).abs())
                .unwrap_or(line_number);
            MappingResult::new(
                move_or_unchanged(nearest, line_number),
                Some(nearest),
                0.3,
                MappingEvidence::MultipleExactMatches { candidates: exact },
            )
        }
    }
}

fn similarity_fallback(parent_lines: &[&str], target: &str) -> MappingResult {
    let target_trimmed = target.trim();

    let mut best_score = 0.0f32;
    let mut best_line: Option<u32> = None;

    for (i, line) in parent_lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let score = char_set_similarity(trimmed, target_trimmed);
        if score > best_score {
            best_score = score;
            best_line = Some(i as u32 + 1);
        }
    }

    match best_line {
        Some(line) if best_score > SIMILARITY_FLOOR => MappingResult::new(
            ChangeClassification::Update,
            Some(line),
            best_score * 0.5,
            MappingEvidence::Similarity { score: best_score },
        ),
        _ => MappingResult::insert(
            0.4,
            MappingEvidence::Similarity { score: best_score },
        ),
    }
}

fn move_or_unchanged(parent_line: u32, line_number: u32) -> ChangeClassification {
    if parent_line == line_number {
        ChangeClassification::Unchanged
    } else {
        ChangeClassification::Move
    }
}

/// Strip all whitespace before comparison.
fn normalize(line: &str) -> String {
    line.chars().filter(|c| !c.is_whitespace()).collect()
}

/// |char-set intersection| / |char-set union|.
///
/// Ignores character order and repetition; a deliberately cheap
/// approximation. Isolated here so a stricter edit-distance ratio could
/// replace it without touching the classification contract.
fn char_set_similarity(a: &str, b: &str) -> f32 {
    use std::collections::HashSet;

    let set_a: HashSet<char> = a.chars().collect();
    let set_b: HashSet<char> = b.chars().collect();

    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    intersection as f32 / union as f32
}
