//! File-backed snapshot storage.
//!
//! Each snapshot is stored as `{dir}/{uuid}.json`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sdp_types::{Snapshot, SnapshotId};

use super::traits::SnapshotStorage;
use crate::error::{Result, SnapshotError};

pub struct FileSnapshotStorage {
    dir: PathBuf,
}

impl FileSnapshotStorage {
    /// Open (and create if needed) a snapshot directory.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            SnapshotError::Storage(format!("failed to create snapshot dir: {}", e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &SnapshotId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_uuid()))
    }
}

#[async_trait]
impl SnapshotStorage for FileSnapshotStorage {
    async fn store(&self, snapshot: &Snapshot) -> Result<()> {
        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|e| SnapshotError::Storage(format!("failed to serialize snapshot: {}", e)))?;
        tokio::fs::write(self.path_for(&snapshot.id), content)
            .await
            .map_err(|e| SnapshotError::Storage(format!("failed to write snapshot: {}", e)))
    }

    async fn load(&self, id: &SnapshotId) -> Result<Option<Snapshot>> {
        let path = self.path_for(id);
        if tokio::fs::metadata(&path).await.is_err() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SnapshotError::Storage(format!("failed to read snapshot: {}", e)))?;
        let snapshot = serde_json::from_str(&content)
            .map_err(|e| SnapshotError::Storage(format!("failed to parse snapshot: {}", e)))?;
        Ok(Some(snapshot))
    }

    async fn list(&self, target: &str) -> Result<Vec<Snapshot>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| SnapshotError::Storage(format!("failed to read snapshot dir: {}", e)))?;

        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SnapshotError::Storage(format!("failed to read dir entry: {}", e)))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(content) = tokio::fs::read_to_string(&path).await {
                if let Ok(snapshot) = serde_json::from_str::<Snapshot>(&content) {
                    if snapshot.target == target {
                        found.push(snapshot);
                    }
                }
            }
        }
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn delete(&self, id: &SnapshotId) -> Result<()> {
        let path = self.path_for(id);
        if tokio::fs::metadata(&path).await.is_ok() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| SnapshotError::Storage(format!("failed to delete snapshot: {}", e)))?;
        }
        Ok(())
    }
}
