//! Parallel tracing of a fix commit's seeds.
//!
//! Seeds are independent, so each walk runs on rayon's pool. The mapping
//! cache is the only shared mutable resource; no lock is held across a
//! full walk and no cross-seed ordering exists.

use rayon::prelude::*;
use tracing::info;

use crate::config::TraceConfig;
use crate::git::repository::GitRepository;
use crate::mapper::LineMapper;
use crate::models::{BicCandidates, BlameOptions, Seed};
use crate::oracle::DecisionOracle;
use crate::walker::{CancelFlag, ChainWalker};

pub struct TraceRunner<'a> {
    repo: &'a GitRepository,
    mapper: &'a (dyn LineMapper + Sync),
    oracle: Option<&'a dyn DecisionOracle>,
    config: &'a TraceConfig,
    blame_options: BlameOptions,
}

impl<'a> TraceRunner<'a> {
    pub fn new(
        repo: &'a GitRepository,
        mapper: &'a (dyn LineMapper + Sync),
        config: &'a TraceConfig,
    ) -> Self {
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

    /// Trace every seed of one fix commit and aggregate the BIC
    /// candidates. A seed's failure never aborts the batch; its trace
    /// carries the error terminal instead.
    pub fn trace_fix_commit(
        &self,
        fix_commit: &str,
        seeds: &[Seed],
        cancel: &CancelFlag,
    ) -> BicCandidates {
        info!(fix = fix_commit, seeds = seeds.len(), "tracing fix commit");

        let run = || {
            seeds
                .par_iter()
                .map(|seed| {
                    let mut walker = ChainWalker::new(self.repo, self.mapper, self.config)
                        .with_blame_options(self.blame_options.clone());
                    if let Some(oracle) = self.oracle {
                        walker = walker.with_oracle(oracle);
                    }
                    walker.trace(fix_commit, seed, cancel)
                })
                .collect::<Vec<_>>()
        };

        // Bounded pool sized to the cost of the blocking tool invocation;
        // 0 defers to rayon's default.
        let traces = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_threads)
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(_) => run(),
        };

        let result = BicCandidates::from_traces(fix_commit.to_string(), traces);
        info!(
            fix = fix_commit,
            candidates = result.candidates.len(),
            "fix commit traced"
        );
        result
    }
}
