//! Deployment records: the outcome of one executed attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{DeploymentId, ScheduleId, SnapshotId};
use crate::review::QualityGateReview;

// ── Stages ─────────────────────────────────────────────────────────────

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    BreakerCheck,
    WindowCheck,
    TargetValidate,
    Snapshot,
    Package,
    QualityGate,
    StaticValidate,
    Push,
    Verify,
    Rollback,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::BreakerCheck => "breaker-check",
            PipelineStage::WindowCheck => "window-check",
            PipelineStage::TargetValidate => "target-validate",
            PipelineStage::Snapshot => "snapshot",
            PipelineStage::Package => "package",
            PipelineStage::QualityGate => "quality-gate",
            PipelineStage::StaticValidate => "static-validate",
            PipelineStage::Push => "push",
            PipelineStage::Verify => "verify",
            PipelineStage::Rollback => "rollback",
        };
        write!(f, "{}", name)
    }
}

impl PipelineStage {
    /// Whether a failure at this stage may have left the target mutated.
    pub fn is_post_push(&self) -> bool {
        matches!(
            self,
            PipelineStage::Push | PipelineStage::Verify | PipelineStage::Rollback
        )
    }
}

// ── Failures ───────────────────────────────────────────────────────────

/// Why an attempt did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Target matched a production indicator or is not allow-listed.
    BlockedTarget,
    /// Too many recent failures; deployments are paused.
    CircuitOpen,
    /// Target's deployment window is closed.
    OutsideWindow,
    /// The pre-deploy snapshot could not be captured.
    SnapshotFailed,
    /// Blocking risk finding, empty package, or remote validation errors.
    ValidationFailed,
    /// The external reviewer declined the change.
    QualityGateRejected,
    /// The remote push failed or timed out.
    PushFailed,
    /// Post-push verification failed or timed out.
    VerificationFailed,
    /// A rollback was attempted and failed. Needs an operator.
    RollbackFailed,
    /// A collaborator call exceeded its deadline outside push/verify.
    Timeout,
}

impl FailureKind {
    /// Whether a later attempt with the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::CircuitOpen
                | FailureKind::SnapshotFailed
                | FailureKind::PushFailed
                | FailureKind::VerificationFailed
                | FailureKind::Timeout
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::BlockedTarget => "blocked target",
            FailureKind::CircuitOpen => "circuit open",
            FailureKind::OutsideWindow => "outside window",
            FailureKind::SnapshotFailed => "snapshot failed",
            FailureKind::ValidationFailed => "validation failed",
            FailureKind::QualityGateRejected => "quality gate rejected",
            FailureKind::PushFailed => "push failed",
            FailureKind::VerificationFailed => "verification failed",
            FailureKind::RollbackFailed => "rollback failed",
            FailureKind::Timeout => "timeout",
        };
        write!(f, "{}", name)
    }
}

/// Detail of a non-successful attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub stage: PipelineStage,
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.stage, self.message)
    }
}

/// What happened to the target after a post-push failure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RollbackStatus {
    /// Nothing was pushed, or the attempt succeeded.
    #[default]
    NotNeeded,
    /// The snapshot was restored.
    Restored { snapshot_id: SnapshotId },
    /// No snapshot existed; the target may be partially mutated.
    Unavailable,
    /// Restoring the snapshot failed.
    Failed {
        snapshot_id: SnapshotId,
        reason: String,
    },
}

// ── Outcome ────────────────────────────────────────────────────────────

/// Terminal outcome of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentOutcome {
    InProgress,
    Succeeded,
    Failed,
    RolledBack,
    Rejected,
}

impl DeploymentOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeploymentOutcome::InProgress)
    }
}

impl fmt::Display for DeploymentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentOutcome::InProgress => "in-progress",
            DeploymentOutcome::Succeeded => "succeeded",
            DeploymentOutcome::Failed => "failed",
            DeploymentOutcome::RolledBack => "rolled-back",
            DeploymentOutcome::Rejected => "rejected",
        };
        write!(f, "{}", name)
    }
}

/// How loudly an outcome should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
            Severity::Fatal => "fatal",
        };
        write!(f, "{}", name)
    }
}

/// Summary of a post-push verification run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub passed: bool,
    pub tests_run: u32,
    pub failures: u32,
    #[serde(default)]
    pub details: Vec<String>,
}

// ── Record ─────────────────────────────────────────────────────────────

/// One executed deployment attempt.
///
/// A record exists only for attempts whose target passed validation.
/// `snapshot_id`, when set, names the snapshot taken for this attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    pub target: String,
    pub outcome: DeploymentOutcome,
    pub snapshot_id: Option<SnapshotId>,
    pub affected: Vec<String>,
    pub stages_completed: Vec<PipelineStage>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub failure: Option<AttemptFailure>,
    #[serde(default)]
    pub rollback: RollbackStatus,
    #[serde(default)]
    pub verification: Option<VerificationSummary>,
    #[serde(default)]
    pub review: Option<QualityGateReview>,
    /// Raw response from the remote push, kept for diagnostics.
    #[serde(default)]
    pub push_payload: Option<serde_json::Value>,
    #[serde(default)]
    pub schedule_id: Option<ScheduleId>,
    #[serde(default = "default_attempt")]
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn default_attempt() -> u32 {
    1
}

impl DeploymentRecord {
    pub fn new(
        id: DeploymentId,
        target: impl Into<String>,
        affected: Vec<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            target: target.into(),
            outcome: DeploymentOutcome::InProgress,
            snapshot_id: None,
            affected,
            stages_completed: Vec::new(),
            warnings: Vec::new(),
            failure: None,
            rollback: RollbackStatus::NotNeeded,
            verification: None,
            review: None,
            push_payload: None,
            schedule_id: None,
            attempt: 1,
            started_at,
            completed_at: None,
        }
    }

    pub fn complete_stage(&mut self, stage: PipelineStage) {
        self.stages_completed.push(stage);
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn mark_succeeded(&mut self, at: DateTime<Utc>) {
        self.outcome = DeploymentOutcome::Succeeded;
        self.completed_at = Some(at);
    }

    /// Failure with no rollback involved, or with rollback unavailable/failed.
    pub fn mark_failed(&mut self, failure: AttemptFailure, at: DateTime<Utc>) {
        self.outcome = DeploymentOutcome::Failed;
        self.failure = Some(failure);
        self.completed_at = Some(at);
    }

    pub fn mark_rolled_back(
        &mut self,
        failure: AttemptFailure,
        snapshot_id: SnapshotId,
        at: DateTime<Utc>,
    ) {
        self.outcome = DeploymentOutcome::RolledBack;
        self.failure = Some(failure);
        self.rollback = RollbackStatus::Restored { snapshot_id };
        self.completed_at = Some(at);
    }

    pub fn mark_rejected(&mut self, review: QualityGateReview, at: DateTime<Utc>) {
        self.outcome = DeploymentOutcome::Rejected;
        self.failure = Some(AttemptFailure {
            stage: PipelineStage::QualityGate,
            kind: FailureKind::QualityGateRejected,
            message: review.reason.clone(),
        });
        self.review = Some(review);
        self.completed_at = Some(at);
    }

    pub fn is_success(&self) -> bool {
        self.outcome == DeploymentOutcome::Succeeded
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }

    /// Severity of the outcome. A failed rollback is the most severe; a
    /// post-push failure with no snapshot to restore comes next.
    pub fn severity(&self) -> Severity {
        match (&self.outcome, &self.rollback) {
            (_, RollbackStatus::Failed { .. }) => Severity::Fatal,
            (_, RollbackStatus::Unavailable) => Severity::Critical,
            (DeploymentOutcome::Succeeded, _) | (DeploymentOutcome::InProgress, _) => {
                Severity::Info
            }
            (DeploymentOutcome::Rejected, _) | (DeploymentOutcome::RolledBack, _) => {
                Severity::Warning
            }
            (DeploymentOutcome::Failed, _) => Severity::Error,
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

impl fmt::Display for DeploymentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.id, self.target, self.outcome)?;
        if let Some(failure) = &self.failure {
            write!(f, " ({})", failure)?;
        }
        Ok(())
    }
}
