//! The quality gate itself.

use std::sync::Arc;
use std::time::Duration;

use sdp_types::QualityGateReview;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::prompt::{build_prompt, ReviewProposal};
use crate::reviewer::ExternalReviewer;
use crate::verdict::{parse_verdict, ReviewVerdict};

/// Quality gate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityGateConfig {
    /// Reviewer program. The gate is disabled when unset.
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments passed to the reviewer program
    #[serde(default)]
    pub args: Vec<String>,

    /// Upper bound on one review, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Pause between reviews in a batch, in milliseconds
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_secs: default_timeout(),
            batch_delay_ms: default_batch_delay(),
        }
    }
}

fn default_timeout() -> u64 {
    120
}

fn default_batch_delay() -> u64 {
    1000
}

/// Aggregate of a batch review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReviewReport {
    pub reviews: Vec<(String, QualityGateReview)>,
    pub approved: usize,
    pub rejected: usize,
    /// Share of approved reviews, 0.0 when the batch was empty.
    pub approval_rate: f64,
}

/// Fail-closed review of proposed code by an external reviewer.
pub struct QualityGate {
    reviewer: Arc<dyn ExternalReviewer>,
    timeout: Duration,
    batch_delay: Duration,
}

impl QualityGate {
    pub fn new(reviewer: Arc<dyn ExternalReviewer>, config: &QualityGateConfig) -> Self {
        Self {
            reviewer,
            timeout: Duration::from_secs(config.timeout_secs),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Review one proposal. Never errors: every failure mode is a rejection.
    #[instrument(skip(self, proposal), fields(artifact = %proposal.artifact))]
    pub async fn review(&self, proposal: &ReviewProposal) -> QualityGateReview {
        let prompt = build_prompt(proposal);

        let response = match tokio::time::timeout(self.timeout, self.reviewer.review(&prompt)).await
        {
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Reviewer timed out");
                return QualityGateReview::rejected(format!(
                    "reviewer timed out after {}ms",
                    self.timeout.as_millis()
                ));
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Reviewer invocation failed");
                return QualityGateReview::rejected(format!("reviewer failed: {}", e));
            }
            Ok(Ok(response)) => response,
        };

        if response.output.trim().is_empty() {
            warn!(exit_code = ?response.exit_code, "Reviewer produced no output");
            return QualityGateReview::rejected(match response.exit_code {
                Some(code) => format!("reviewer produced no output (exit code {})", code),
                None => "reviewer produced no output (terminated by signal)".to_string(),
            });
        }

        match parse_verdict(&response.output) {
            ReviewVerdict::Approved {
                reason,
                changes,
                final_code,
            } => {
                info!(
                    changes = changes.len(),
                    refined = final_code.is_some(),
                    "Quality gate approved"
                );
                QualityGateReview::approved(reason, changes, final_code)
            }
            ReviewVerdict::Rejected { reason } => {
                info!(reason = %reason, "Quality gate rejected");
                QualityGateReview::rejected(reason)
            }
            ReviewVerdict::ParseFailed { raw } => {
                warn!(output_bytes = raw.len(), "Reviewer response did not match schema");
                QualityGateReview::rejected("unparseable reviewer response")
            }
        }
    }

    /// Review several proposals one after another, pausing between calls.
    pub async fn review_batch(&self, proposals: &[ReviewProposal]) -> BatchReviewReport {
        let mut reviews = Vec::with_capacity(proposals.len());
        for (index, proposal) in proposals.iter().enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            let review = self.review(proposal).await;
            reviews.push((proposal.artifact.clone(), review));
        }

        let approved = reviews.iter().filter(|(_, r)| r.approved).count();
        let rejected = reviews.len() - approved;
        let approval_rate = if reviews.is_empty() {
            0.0
        } else {
            approved as f64 / reviews.len() as f64
        };

        info!(
            total = reviews.len(),
            approved,
            rejected,
            "Batch review complete"
        );
        BatchReviewReport {
            reviews,
            approved,
            rejected,
            approval_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReviewerError;
    use crate::reviewer::ScriptedReviewer;
    use sdp_types::RiskLevel;

    fn proposal(name: &str) -> ReviewProposal {
        ReviewProposal {
            artifact: name.into(),
            original_code: "class A { old }".into(),
            proposed_code: "class A { new }".into(),
            improvements: vec![],
            coverage_pct: Some(80.0),
            risk_level: RiskLevel::Low,
        }
    }

    fn gate(reviewer: ScriptedReviewer) -> QualityGate {
        QualityGate::new(
            Arc::new(reviewer),
            &QualityGateConfig {
                batch_delay_ms: 0,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn approval_with_refinement() {
        let gate = gate(ScriptedReviewer::new().respond(
            r#"Sure. {"approved": true, "reason": "fine", "changes": ["added null check"], "final_code": "class A { safer }"}"#,
        ));
        let review = gate.review(&proposal("A.cls")).await;
        assert!(review.approved);
        assert_eq!(review.final_code.as_deref(), Some("class A { safer }"));
        assert_eq!(review.changes, vec!["added null check"]);
    }

    #[tokio::test]
    async fn reviewer_error_rejects() {
        let gate = gate(ScriptedReviewer::new().fail(ReviewerError::Spawn {
            program: "reviewer".into(),
            reason: "not found".into(),
        }));
        let review = gate.review(&proposal("A.cls")).await;
        assert!(!review.approved);
        assert!(review.reason.contains("not found"));
    }

    #[tokio::test]
    async fn empty_output_with_nonzero_exit_rejects() {
        let gate = gate(ScriptedReviewer::new().exit_with("", 2));
        let review = gate.review(&proposal("A.cls")).await;
        assert!(!review.approved);
        assert!(review.reason.contains("exit code 2"));
    }

    #[tokio::test]
    async fn garbage_output_rejects() {
        let gate = gate(ScriptedReviewer::new().respond("LGTM!"));
        let review = gate.review(&proposal("A.cls")).await;
        assert!(!review.approved);
        assert_eq!(review.reason, "unparseable reviewer response");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_rejects() {
        let reviewer = ScriptedReviewer::new()
            .respond(r#"{"approved": true}"#)
            .with_delay(Duration::from_secs(600));
        let gate = gate(reviewer).with_timeout(Duration::from_secs(5));
        let review = gate.review(&proposal("A.cls")).await;
        assert!(!review.approved);
        assert!(review.reason.contains("timed out"));
    }

    #[tokio::test]
    async fn prompt_reaches_reviewer() {
        let reviewer = Arc::new(ScriptedReviewer::new().respond(r#"{"approved": false, "reason": "no"}"#));
        let gate = QualityGate::new(reviewer.clone(), &QualityGateConfig::default());
        gate.review(&proposal("Special.cls")).await;
        let prompts = reviewer.prompts().await;
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Special.cls"));
    }

    #[tokio::test]
    async fn batch_stats() {
        let gate = gate(
            ScriptedReviewer::new()
                .respond(r#"{"approved": true}"#)
                .respond(r#"{"approved": false, "reason": "risky"}"#)
                .respond(r#"{"approved": true, "final_code": "x"}"#)
                .respond("nonsense"),
        );
        let report = gate
            .review_batch(&[
                proposal("A.cls"),
                proposal("B.cls"),
                proposal("C.cls"),
                proposal("D.cls"),
            ])
            .await;
        assert_eq!(report.approved, 2);
        assert_eq!(report.rejected, 2);
        assert!((report.approval_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(report.reviews[1].0, "B.cls");
        assert_eq!(report.reviews[1].1.reason, "risky");
    }

    #[tokio::test]
    async fn empty_batch() {
        let report = gate(ScriptedReviewer::new()).review_batch(&[]).await;
        assert_eq!(report.approval_rate, 0.0);
        assert!(report.reviews.is_empty());
    }
}
