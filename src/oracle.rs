//! Optional external decision assistance for ambiguous steps.
//!
//! The oracle is a late-bound strategy the walker consults when automated
//! mapping is ambiguous or below the trust threshold. It is treated as
//! possibly slow, unavailable, or wrong: errors, deadline expiry, and
//! malformed answers all collapse to "no answer", and the walker falls
//! back to its documented no-oracle policy. Correctness never depends on
//! the oracle being present or right.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::models::{BlamedLine, ChangeClassification, MappingResult, TrackingStep};

/// Everything the oracle may look at for one consultation.
pub struct OracleContext<'a> {
    pub fix_commit: &'a str,
    /// The blamed line under examination.
    pub entry: &'a BlamedLine,
    /// What the mapper concluded.
    pub result: &'a MappingResult,
    /// Chain so far, head nearest the fix.
    pub chain: &'a [TrackingStep],
    /// Present on re-queries after a rejected answer.
    pub feedback: Option<&'a OracleFeedback>,
}

#[derive(Debug, Clone)]
pub struct OracleFeedback {
    pub rejected_revision: String,
    pub reason: String,
}

/// The oracle's answer for one step.
#[derive(Debug, Clone)]
pub struct OracleDecision {
    /// Whether the mapper's classification stands.
    pub accept_classification: bool,
    /// Replacement classification when the oracle disagrees.
    pub override_classification: Option<ChangeClassification>,
    /// Replacement parent line when the oracle disagrees.
    pub override_parent_line: Option<u32>,
    /// Whether the walk should continue past this step.
    pub continue_tracking: bool,
    /// In `[0, 1]`; anything else is a malformed response.
    pub confidence: f32,
}

pub trait DecisionOracle: Send + Sync {
    fn decide(&self, ctx: &OracleContext<'_>) -> anyhow::Result<OracleDecision>;
}

/// Pure-heuristic mode: accepts every mapping at zero added confidence.
pub struct NoopOracle;

impl DecisionOracle for NoopOracle {
    fn decide(&self, _ctx: &OracleContext<'_>) -> anyhow::Result<OracleDecision> {
        Ok(OracleDecision {
            accept_classification: true,
            override_classification: None,
            override_parent_line: None,
            continue_tracking: true,
            confidence: 0.0,
        })
    }
}

/// Consult the oracle with a bounded re-query budget.
///
/// A rejection without an override re-queries with feedback; errors,
/// answers arriving after the deadline, and out-of-range confidences are
/// "no answer" (`None`), which sends the walker to the fallback policy.
pub fn consult(
    oracle: &dyn DecisionOracle,
    fix_commit: &str,
    entry: &BlamedLine,
    result: &MappingResult,
    chain: &[TrackingStep],
    deadline: Duration,
    retry_budget: usize,
) -> Option<OracleDecision> {
    let mut feedback: Option<OracleFeedback> = None;
    // The deadline covers the whole consultation, re-queries included.
    let started = Instant::now();

    for attempt in 0..retry_budget.max(1) {
        let ctx = OracleContext {
            fix_commit,
            entry,
            result,
            chain,
            feedback: feedback.as_ref(),
        };

        let decision = match oracle.decide(&ctx) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "oracle unavailable, using fallback policy");
                return None;
            }
        };

        if started.elapsed() > deadline {
            warn!(elapsed = ?started.elapsed(), "oracle answer arrived after deadline, discarded");
            return None;
        }

        if !decision.confidence.is_finite()
            || !(0.0..=1.0).contains(&decision.confidence)
        {
            warn!(
                confidence = decision.confidence,
                "oracle returned a malformed confidence, using fallback policy"
            );
            return None;
        }

        let rejected_without_guidance = !decision.accept_classification
            && decision.override_classification.is_none()
            && decision.override_parent_line.is_none();

        if rejected_without_guidance {
            debug!(attempt, commit = %entry.revision.oid, "oracle rejected, re-querying with feedback");
            feedback = Some(OracleFeedback {
                rejected_revision: entry.revision.oid.clone(),
                reason: "classification rejected without replacement".to_string(),
            });
            continue;
        }

        return Some(decision);
    }

    debug!("oracle retry budget exhausted, using fallback policy");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Revision;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_entry() -> BlamedLine {
        BlamedLine {
            revision: Revision {
                oid: "a".repeat(40),
                parents: vec!["b".repeat(40)],
                author_name: "dev".into(),
                author_email: "dev@example.com".into(),
                summary: "tweak".into(),
                timestamp: 0,
            },
            file_path: "src/a.c".into(),
            line_number: 3,
            line_content: "x = y;".into(),
            is_comment: false,
        }
    }

    fn sample_result() -> MappingResult {
        MappingResult::unknown("test")
    }

    struct RejectingOracle {
        calls: AtomicUsize,
    }

    impl DecisionOracle for RejectingOracle {
        fn decide(&self, ctx: &OracleContext<'_>) -> anyhow::Result<OracleDecision> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call > 0 {
                assert!(ctx.feedback.is_some(), "re-query must carry feedback");
            }
            Ok(OracleDecision {
                accept_classification: false,
                override_classification: None,
                override_parent_line: None,
                continue_tracking: true,
                confidence: 0.5,
            })
        }
    }

    #[test]
    fn noop_oracle_accepts_everything() {
        let entry = sample_entry();
        let result = sample_result();
        let decision = consult(
            &NoopOracle,
            "fix",
            &entry,
            &result,
            &[],
            Duration::from_secs(1),
            3,
        )
        .expect("decision");
        assert!(decision.accept_classification);
        assert!(decision.continue_tracking);
    }

    #[test]
    fn rejection_without_guidance_is_bounded_then_no_answer() {
        let oracle = RejectingOracle {
            calls: AtomicUsize::new(0),
        };
        let entry = sample_entry();
        let result = sample_result();

        let decision = consult(
            &oracle,
            "fix",
            &entry,
            &result,
            &[],
            Duration::from_secs(1),
            3,
        );

        assert!(decision.is_none());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn deadline_spans_the_whole_consultation_including_requeries() {
        struct SlowRejecting {
            calls: AtomicUsize,
        }
        impl DecisionOracle for SlowRejecting {
            fn decide(&self, _: &OracleContext<'_>) -> anyhow::Result<OracleDecision> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(25));
                Ok(OracleDecision {
                    accept_classification: false,
                    override_classification: None,
                    override_parent_line: None,
                    continue_tracking: true,
                    confidence: 0.5,
                })
            }
        }

        let oracle = SlowRejecting {
            calls: AtomicUsize::new(0),
        };
        let entry = sample_entry();
        let result = sample_result();

        let decision = consult(
            &oracle,
            "fix",
            &entry,
            &result,
            &[],
            Duration::from_millis(40),
            10,
        );

        assert!(decision.is_none());
        // The elapsed-time check cuts the re-query loop well short of the
        // budget of 10.
        assert!(oracle.calls.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn erroring_oracle_is_no_answer() {
        struct Failing;
        impl DecisionOracle for Failing {
            fn decide(&self, _: &OracleContext<'_>) -> anyhow::Result<OracleDecision> {
                anyhow::bail!("connection refused")
            }
        }

        let entry = sample_entry();
        let result = sample_result();
        assert!(consult(&Failing, "fix", &entry, &result, &[], Duration::from_secs(1), 3).is_none());
    }

    #[test]
    fn out_of_range_confidence_is_malformed() {
        struct Overconfident;
        impl DecisionOracle for Overconfident {
            fn decide(&self, _: &OracleContext<'_>) -> anyhow::Result<OracleDecision> {
                Ok(OracleDecision {
                    accept_classification: true,
                    override_classification: None,
                    override_parent_line: None,
                    continue_tracking: true,
                    confidence: 3.0,
                })
            }
        }

        let entry = sample_entry();
        let result = sample_result();
        assert!(
            consult(&Overconfident, "fix", &entry, &result, &[], Duration::from_secs(1), 3)
                .is_none()
        );
    }
}
