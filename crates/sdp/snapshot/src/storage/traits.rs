//! Storage trait definition.

use async_trait::async_trait;
use sdp_types::{Snapshot, SnapshotId};

use crate::error::Result;

/// Persistence for captured snapshots.
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    async fn store(&self, snapshot: &Snapshot) -> Result<()>;

    async fn load(&self, id: &SnapshotId) -> Result<Option<Snapshot>>;

    /// Snapshots for a target, newest first.
    async fn list(&self, target: &str) -> Result<Vec<Snapshot>>;

    async fn delete(&self, id: &SnapshotId) -> Result<()>;

    async fn exists(&self, id: &SnapshotId) -> Result<bool> {
        Ok(self.load(id).await?.is_some())
    }
}
