//! Deployment lifecycle events.

use sdp_types::{DeploymentId, DeploymentOutcome, FailureKind, PipelineStage, Severity};
use serde::{Deserialize, Serialize};

/// Broadcast by the pipeline for embedding applications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeploymentEvent {
    /// Refused before any record was created.
    Refused {
        target: String,
        kind: FailureKind,
        reason: String,
    },
    Started {
        deployment_id: DeploymentId,
        target: String,
    },
    StageCompleted {
        deployment_id: DeploymentId,
        stage: PipelineStage,
    },
    Finished {
        deployment_id: DeploymentId,
        target: String,
        outcome: DeploymentOutcome,
        severity: Severity,
    },
}
