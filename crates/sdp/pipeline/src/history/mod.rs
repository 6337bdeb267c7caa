//! Append-only deployment history.

pub mod file;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdp_types::{DeploymentId, DeploymentOutcome, DeploymentRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file::FileDeploymentHistory;
pub use memory::InMemoryDeploymentHistory;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("History serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Append-only log of deployment records. Appends from concurrent
/// attempts must never be lost.
#[async_trait]
pub trait DeploymentHistory: Send + Sync {
    async fn append(&self, record: &DeploymentRecord) -> Result<(), HistoryError>;

    /// All records, oldest first.
    async fn list(&self) -> Result<Vec<DeploymentRecord>, HistoryError>;

    async fn get(&self, id: &DeploymentId) -> Result<Option<DeploymentRecord>, HistoryError> {
        Ok(self.list().await?.into_iter().find(|r| &r.id == id))
    }

    async fn for_target(&self, target: &str) -> Result<Vec<DeploymentRecord>, HistoryError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.target == target)
            .collect())
    }

    /// Most recent `limit` records, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<DeploymentRecord>, HistoryError> {
        let mut records = self.list().await?;
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }
}

/// Counts per outcome across the history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rolled_back: usize,
    pub rejected: usize,
    /// Failed attempts whose rollback was unavailable or failed.
    pub unrecovered: usize,
    pub by_target: BTreeMap<String, usize>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl HistorySummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a DeploymentRecord>) -> Self {
        let mut summary = HistorySummary::default();
        for record in records {
            summary.total += 1;
            *summary.by_target.entry(record.target.clone()).or_default() += 1;
            let at = record.completed_at.unwrap_or(record.started_at);
            match record.outcome {
                DeploymentOutcome::Succeeded => {
                    summary.succeeded += 1;
                    summary.last_success_at = summary.last_success_at.max(Some(at));
                }
                DeploymentOutcome::Failed => {
                    summary.failed += 1;
                    if record.severity() >= sdp_types::Severity::Critical {
                        summary.unrecovered += 1;
                    }
                    summary.last_failure_at = summary.last_failure_at.max(Some(at));
                }
                DeploymentOutcome::RolledBack => {
                    summary.rolled_back += 1;
                    summary.last_failure_at = summary.last_failure_at.max(Some(at));
                }
                DeploymentOutcome::Rejected => summary.rejected += 1,
                DeploymentOutcome::InProgress => {}
            }
        }
        summary
    }

    /// Fraction of finished attempts that succeeded.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdp_types::{AttemptFailure, FailureKind, PipelineStage, RollbackStatus};

    fn record(target: &str) -> DeploymentRecord {
        DeploymentRecord::new(DeploymentId::generate(), target, vec![], Utc::now())
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut ok = record("dev-1");
        ok.mark_succeeded(Utc::now());

        let mut unrecovered = record("dev-1");
        unrecovered.rollback = RollbackStatus::Unavailable;
        unrecovered.mark_failed(
            AttemptFailure {
                stage: PipelineStage::Verify,
                kind: FailureKind::VerificationFailed,
                message: "2 tests failed".into(),
            },
            Utc::now(),
        );

        let mut early = record("dev-2");
        early.mark_failed(
            AttemptFailure {
                stage: PipelineStage::StaticValidate,
                kind: FailureKind::ValidationFailed,
                message: "dml in loop".into(),
            },
            Utc::now(),
        );

        let summary = HistorySummary::from_records([&ok, &unrecovered, &early]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.unrecovered, 1);
        assert_eq!(summary.by_target["dev-1"], 2);
        assert!(summary.last_success_at.is_some());
        assert!((summary.success_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_summary() {
        let summary = HistorySummary::from_records(std::iter::empty());
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate(), 0.0);
    }
}
