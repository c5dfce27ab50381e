//! The backward walk: SEEDED → WALKING → terminal.
//!
//! One `ChainWalker` traces one seed at a time, alternating blame lookups
//! with line-mapping classifications until it reaches an introduction
//! point, a history boundary, the depth cap, or a persistent fault. Every
//! outcome keeps the chain built so far.

use tracing::{debug, info, warn};

use crate::config::TraceConfig;
use crate::error::TraceError;
use crate::git::blame::BlameProvider;
use crate::git::repository::GitRepository;
use crate::mapper::LineMapper;
use crate::models::{
    BlameOptions, BlamedLine, ChangeClassification, MappingResult, Seed, SeedTrace,
    TerminalState, TrackingChain, TrackingStep,
};
use crate::oracle::{consult, DecisionOracle};

/// Cooperative cancellation, checked once per loop iteration. Partial
/// chains produced before cancellation remain valid outputs.
#[derive(Clone, Default)]
pub struct CancelFlag(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Relaxed)
    }
}

pub struct ChainWalker<'a> {
    repo: &'a GitRepository,
    mapper: &'a dyn LineMapper,
    oracle: Option<&'a dyn DecisionOracle>,
    config: &'a TraceConfig,
    blame_options: BlameOptions,
}

impl<'a> ChainWalker<'a> {
    pub fn new(repo: &'a GitRepository, mapper: &'a dyn LineMapper, config: &'a TraceConfig) -> Self {
        Self {
            repo,
            mapper,
            oracle: None,
            config,
            blame_options: BlameOptions::default(),
        }
    }

    pub fn with_oracle(mut self, oracle: &'a dyn DecisionOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_blame_options(mut self, options: BlameOptions) -> Self {
        self.blame_options = options;
        self
    }

    /// Walk one seed backward from `fix_commit`.
    pub fn trace(&self, fix_commit: &str, seed: &Seed, cancel: &CancelFlag) -> SeedTrace {
        let mut chain = TrackingChain::default();

        let finish = |terminal: TerminalState, chain: TrackingChain| SeedTrace {
            fix_commit: fix_commit.to_string(),
            seed: seed.clone(),
            terminal,
            chain,
        };

        // The walk starts at the fix commit's first parent: the state of
        // the code the fix changed. A parentless fix commit has no
        // "before" to inspect.
        let mut current_rev = match self.repo.first_parent(fix_commit) {
            Ok(Some(parent)) => parent,
            Ok(None) => {
                return finish(TerminalState::Boundary { depth_limited: false }, chain);
            }
            Err(e) if e.is_boundary() => {
                return finish(TerminalState::Boundary { depth_limited: false }, chain);
            }
            Err(e) => {
                return finish(
                    TerminalState::Error {
                        message: e.to_string(),
                    },
                    chain,
                );
            }
        };
        let mut current_file = seed.file_path.clone();
        let mut current_line = seed.line_number;

        for depth in 0..self.config.max_depth {
            if cancel.is_cancelled() {
                info!(fix = fix_commit, depth, "walk cancelled");
                return finish(TerminalState::Boundary { depth_limited: false }, chain);
            }

            let entry = match self.blame_with_retry(&current_rev, &current_file, current_line) {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    // Line vanished: a true history boundary.
                    return finish(TerminalState::Boundary { depth_limited: false }, chain);
                }
                Err(e) if e.is_boundary() => {
                    return finish(TerminalState::Boundary { depth_limited: false }, chain);
                }
                Err(e) => {
                    warn!(fix = fix_commit, error = %e, "persistent blame fault, aborting seed");
                    return finish(
                        TerminalState::Error {
                            message: e.to_string(),
                        },
                        chain,
                    );
                }
            };

            // Root-commit rule: zero parents forces Insert regardless of
            // any mapper output. Terminal by definition.
            if entry.revision.is_root() {
                chain.push(step_for(&entry, ChangeClassification::Insert, 1.0));
                debug!(bic = %entry.revision.oid, "walk reached root commit");
                return finish(TerminalState::Introduced, chain);
            }

            let mut result = match self.mapper.map(
                &entry.revision.oid,
                &entry.file_path,
                entry.line_number,
                &entry.line_content,
            ) {
                Ok(result) => result,
                Err(e) => {
                    // Mapper faults degrade the step, never the batch.
                    warn!(commit = %entry.revision.oid, error = %e, "mapper failed, step degraded to unknown");
                    MappingResult::unknown(e.to_string())
                }
            };

            if result.classification == ChangeClassification::Unknown
                || result.confidence < self.config.trust_threshold
            {
                self.resolve_ambiguity(fix_commit, &entry, &mut result, &chain);
                if result.classification == ChangeClassification::Unknown {
                    // Documented fallback: with no usable oracle answer,
                    // an unknown step is treated as an update that kept
                    // its line number, and the walk continues.
                    result.classification = ChangeClassification::Update;
                    result.parent_line = Some(entry.line_number);
                }
            }

            chain.push(step_for(&entry, result.classification, result.confidence));

            if result.classification == ChangeClassification::Insert {
                info!(
                    fix = fix_commit,
                    bic = %entry.revision.oid,
                    authored = %entry.revision.authored_at(),
                    depth,
                    "introduction point found"
                );
                return finish(TerminalState::Introduced, chain);
            }

            let Some(parent_line) = result.parent_line else {
                return finish(TerminalState::Boundary { depth_limited: false }, chain);
            };

            // Not a root commit, so a first parent exists.
            let Some(parent) = entry.revision.first_parent() else {
                return finish(TerminalState::Boundary { depth_limited: false }, chain);
            };
            current_rev = parent.to_string();
            current_file = entry.file_path.clone();
            current_line = parent_line;
        }

        finish(TerminalState::Boundary { depth_limited: true }, chain)
    }

    /// Consult the oracle on an ambiguous step; apply its overrides in
    /// place. Without an oracle (or without a usable answer) the result
    /// is left untouched for the caller's fallback.
    fn resolve_ambiguity(
        &self,
        fix_commit: &str,
        entry: &BlamedLine,
        result: &mut MappingResult,
        chain: &TrackingChain,
    ) {
        let Some(oracle) = self.oracle else { return };

        let Some(decision) = consult(
            oracle,
            fix_commit,
            entry,
            result,
            &chain.steps,
            self.config.oracle_deadline,
            self.config.oracle_retry_budget,
        ) else {
            return;
        };

        if let Some(classification) = decision.override_classification {
            debug!(
                commit = %entry.revision.oid,
                from = ?result.classification,
                to = ?classification,
                "oracle overrode classification"
            );
            result.classification = classification;
            result.confidence = decision.confidence;
        }
        if let Some(line) = decision.override_parent_line {
            result.parent_line = Some(line);
        }
        if !decision.continue_tracking && result.classification != ChangeClassification::Insert {
            // Oracle said stop without naming an introduction point:
            // drop the parent line so the walk ends at this step.
            result.parent_line = None;
            if result.classification == ChangeClassification::Unknown {
                result.classification = ChangeClassification::Update;
            }
        }
    }

    /// Transient blame faults get a bounded retry before the seed is
    /// aborted; `NotFound` is never retried, it is a boundary.
    fn blame_with_retry(
        &self,
        revision: &str,
        file_path: &str,
        line: u32,
    ) -> crate::error::Result<Option<BlamedLine>> {
        let provider = BlameProvider::new(self.repo);
        let mut last_err: Option<TraceError> = None;

        for attempt in 0..=self.config.blame_retries {
            match provider.blame(revision, file_path, &[line], &self.blame_options) {
                Ok(mut lines) => {
                    return Ok(if lines.is_empty() {
                        None
                    } else {
                        Some(lines.remove(0))
                    });
                }
                Err(e) if e.is_boundary() => return Err(e),
                Err(e) => {
                    warn!(revision, file = file_path, attempt, error = %e, "blame fault");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| TraceError::Internal("blame retry underflow".into())))
    }
}

fn step_for(entry: &BlamedLine, classification: ChangeClassification, confidence: f32) -> TrackingStep {
    TrackingStep {
        revision: entry.revision.oid.clone(),
        file_path: entry.file_path.clone(),
        line_number: entry.line_number,
        line_content: entry.line_content.clone(),
        classification,
        confidence,
        timestamp: entry.revision.timestamp,
    }
}
