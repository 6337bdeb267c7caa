//! Snapshot manager - the store the pipeline talks to.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sdp_types::{ArtifactSet, DeploymentId, Snapshot, SnapshotId};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::error::{Result, SnapshotError};
use crate::state::{TargetStateReader, TargetStateWriter};
use crate::storage::SnapshotStorage;

/// What a restore changed on the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub snapshot_id: SnapshotId,
    pub target: String,
    /// Artifacts written back to their captured content.
    pub restored: Vec<String>,
    /// Artifacts removed because they did not exist at capture time.
    pub removed: Vec<String>,
}

/// Capture and restore keyed by snapshot ID.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Capture the current target state of every artifact in `artifacts`.
    async fn capture(
        &self,
        deployment_id: DeploymentId,
        target: &str,
        artifacts: &ArtifactSet,
    ) -> Result<Snapshot>;

    /// Return the snapshot's target to the captured state.
    async fn restore(&self, snapshot_id: &SnapshotId) -> Result<RestoreReport>;

    async fn get(&self, snapshot_id: &SnapshotId) -> Result<Option<Snapshot>>;

    async fn list_for_target(&self, target: &str) -> Result<Vec<Snapshot>>;
}

/// Composes target access and persistence into a [`SnapshotStore`].
pub struct SnapshotManager {
    reader: Arc<dyn TargetStateReader>,
    writer: Arc<dyn TargetStateWriter>,
    storage: Arc<dyn SnapshotStorage>,
}

impl SnapshotManager {
    pub fn new(
        reader: Arc<dyn TargetStateReader>,
        writer: Arc<dyn TargetStateWriter>,
        storage: Arc<dyn SnapshotStorage>,
    ) -> Self {
        Self {
            reader,
            writer,
            storage,
        }
    }
}

#[async_trait]
impl SnapshotStore for SnapshotManager {
    #[instrument(skip(self, artifacts), fields(deployment_id = %deployment_id))]
    async fn capture(
        &self,
        deployment_id: DeploymentId,
        target: &str,
        artifacts: &ArtifactSet,
    ) -> Result<Snapshot> {
        let captured = self.reader.fetch(target, artifacts).await?;
        if captured.len() != artifacts.len() {
            return Err(SnapshotError::Capture {
                target: target.to_string(),
                reason: format!(
                    "reader returned {} entries for {} artifacts",
                    captured.len(),
                    artifacts.len()
                ),
            });
        }

        let snapshot = Snapshot::new(deployment_id, target, captured, Utc::now());
        self.storage.store(&snapshot).await?;

        info!(
            snapshot_id = %snapshot.id,
            target = %target,
            artifacts = snapshot.artifacts.len(),
            new_artifacts = snapshot.new_artifacts().len(),
            "Snapshot captured"
        );
        Ok(snapshot)
    }

    #[instrument(skip(self), fields(snapshot_id = %snapshot_id))]
    async fn restore(&self, snapshot_id: &SnapshotId) -> Result<RestoreReport> {
        let snapshot = self
            .storage
            .load(snapshot_id)
            .await?
            .ok_or(SnapshotError::NotFound(*snapshot_id))?;

        if let Err(e) = self.writer.apply(&snapshot.target, &snapshot.artifacts).await {
            error!(
                snapshot_id = %snapshot_id,
                target = %snapshot.target,
                error = %e,
                "Snapshot restore failed"
            );
            return Err(SnapshotError::Restore {
                snapshot_id: *snapshot_id,
                reason: e.to_string(),
            });
        }

        let (restored, removed): (Vec<_>, Vec<_>) =
            snapshot.artifacts.iter().partition(|a| a.existed());
        let report = RestoreReport {
            snapshot_id: *snapshot_id,
            target: snapshot.target.clone(),
            restored: restored.into_iter().map(|a| a.name.clone()).collect(),
            removed: removed.into_iter().map(|a| a.name.clone()).collect(),
        };

        info!(
            snapshot_id = %snapshot_id,
            target = %report.target,
            restored = report.restored.len(),
            removed = report.removed.len(),
            "Snapshot restored"
        );
        Ok(report)
    }

    async fn get(&self, snapshot_id: &SnapshotId) -> Result<Option<Snapshot>> {
        self.storage.load(snapshot_id).await
    }

    async fn list_for_target(&self, target: &str) -> Result<Vec<Snapshot>> {
        self.storage.list(target).await
    }
}
