//! Quality-gate review results as recorded on deployments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one external review.
///
/// `final_code` is set only when the reviewer approved and supplied a
/// refinement; it supersedes the proposed code for the rest of the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityGateReview {
    pub approved: bool,
    pub reason: String,
    #[serde(default)]
    pub changes: Vec<String>,
    #[serde(default)]
    pub final_code: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

impl QualityGateReview {
    pub fn approved(
        reason: impl Into<String>,
        changes: Vec<String>,
        final_code: Option<String>,
    ) -> Self {
        Self {
            approved: true,
            reason: reason.into(),
            changes,
            final_code,
            reviewed_at: Utc::now(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
            changes: Vec::new(),
            final_code: None,
            reviewed_at: Utc::now(),
        }
    }
}
