//! In-memory snapshot storage.

use std::collections::HashMap;

use async_trait::async_trait;
use sdp_types::{Snapshot, SnapshotId};
use tokio::sync::RwLock;

use super::traits::SnapshotStorage;
use crate::error::Result;

/// Keeps snapshots for the life of the process.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStorage {
    snapshots: RwLock<HashMap<SnapshotId, Snapshot>>,
}

impl InMemorySnapshotStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

#[async_trait]
impl SnapshotStorage for InMemorySnapshotStorage {
    async fn store(&self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    async fn load(&self, id: &SnapshotId) -> Result<Option<Snapshot>> {
        Ok(self.snapshots.read().await.get(id).cloned())
    }

    async fn list(&self, target: &str) -> Result<Vec<Snapshot>> {
        let mut found: Vec<Snapshot> = self
            .snapshots
            .read()
            .await
            .values()
            .filter(|s| s.target == target)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn delete(&self, id: &SnapshotId) -> Result<()> {
        self.snapshots.write().await.remove(id);
        Ok(())
    }
}
