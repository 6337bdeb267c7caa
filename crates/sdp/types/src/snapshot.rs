//! Pre-deploy snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactKind;
use crate::ids::{DeploymentId, SnapshotId};

/// Captured state of one artifact on the target.
///
/// `content` is `None` when the artifact did not exist before the
/// deployment; restoring such an entry removes the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedArtifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub content: Option<String>,
}

impl CapturedArtifact {
    pub fn existed(&self) -> bool {
        self.content.is_some()
    }
}

/// State of the affected artifacts captured before a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub deployment_id: DeploymentId,
    pub target: String,
    pub artifacts: Vec<CapturedArtifact>,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(
        deployment_id: DeploymentId,
        target: impl Into<String>,
        artifacts: Vec<CapturedArtifact>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SnapshotId::generate(),
            deployment_id,
            target: target.into(),
            artifacts,
            created_at,
        }
    }

    /// Names of artifacts that did not exist when the snapshot was taken.
    pub fn new_artifacts(&self) -> Vec<&str> {
        self.artifacts
            .iter()
            .filter(|a| !a.existed())
            .map(|a| a.name.as_str())
            .collect()
    }
}
