//! Single-document JSON schedule store.
//!
//! The whole collection lives in one JSON file. Every mutation rewrites
//! it to `<path>.tmp` and renames it over the original, so a crash leaves
//! either the old or the new document, never a torn one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sdp_types::{ScheduleId, ScheduledDeployment};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{sort_by_schedule, ScheduleStore, StoreError};

const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ScheduleDocument {
    version: u32,
    deployments: Vec<ScheduledDeployment>,
}

pub struct FileScheduleStore {
    path: PathBuf,
    records: Mutex<BTreeMap<ScheduleId, ScheduledDeployment>>,
}

impl FileScheduleStore {
    /// Open a store, loading the existing document if there is one.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let records = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let document: ScheduleDocument = serde_json::from_str(&content)?;
                document
                    .deployments
                    .into_iter()
                    .map(|d| (d.id, d))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), records = records.len(), "Opened schedule store");

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, records: &BTreeMap<ScheduleId, ScheduledDeployment>) -> Result<(), StoreError> {
        let mut deployments: Vec<_> = records.values().cloned().collect();
        sort_by_schedule(&mut deployments);
        let document = ScheduleDocument {
            version: DOCUMENT_VERSION,
            deployments,
        };
        let content = serde_json::to_vec_pretty(&document)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for FileScheduleStore {
    async fn upsert(&self, scheduled: &ScheduledDeployment) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let previous = records.insert(scheduled.id, scheduled.clone());
        if let Err(e) = self.flush(&records).await {
            // Keep memory consistent with disk.
            match previous {
                Some(previous) => records.insert(scheduled.id, previous),
                None => records.remove(&scheduled.id),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, id: &ScheduleId) -> Result<Option<ScheduledDeployment>, StoreError> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<ScheduledDeployment>, StoreError> {
        let mut records: Vec<_> = self.records.lock().await.values().cloned().collect();
        sort_by_schedule(&mut records);
        Ok(records)
    }

    async fn remove(&self, id: &ScheduleId) -> Result<bool, StoreError> {
        let mut records = self.records.lock().await;
        let removed = match records.remove(id) {
            Some(removed) => removed,
            None => return Ok(false),
        };
        if let Err(e) = self.flush(&records).await {
            records.insert(*id, removed);
            return Err(e);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sdp_types::{
        Artifact, ArtifactSet, DeploymentRequest, NotificationFlags, RetryPolicy, ScheduleStatus,
    };
    use tempfile::TempDir;

    fn scheduled(offset_mins: i64) -> ScheduledDeployment {
        let now = Utc::now();
        ScheduledDeployment::new(
            DeploymentRequest::new(
                ArtifactSet::new().with(Artifact::source("A.cls", "class A {}")),
                "dev-sandbox",
            ),
            now + Duration::minutes(offset_mins),
            RetryPolicy::up_to(2),
            NotificationFlags::default(),
            now,
        )
    }

    #[tokio::test]
    async fn records_round_trip_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state/schedules.json");

        let late = scheduled(90);
        let mut early = scheduled(30);
        {
            let store = FileScheduleStore::open(&path).await.unwrap();
            store.upsert(&late).await.unwrap();
            store.upsert(&early).await.unwrap();
            early.transition(ScheduleStatus::Cancelled, Utc::now()).unwrap();
            store.upsert(&early).await.unwrap();
        }

        let store = FileScheduleStore::open(&path).await.unwrap();
        let records = store.list().await.unwrap();
        assert_eq!(records, vec![early.clone(), late.clone()]);
        assert_eq!(store.get(&late.id).await.unwrap(), Some(late));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn remove_is_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schedules.json");
        let record = scheduled(10);
        {
            let store = FileScheduleStore::open(&path).await.unwrap();
            store.upsert(&record).await.unwrap();
            assert!(store.remove(&record.id).await.unwrap());
            assert!(!store.remove(&record.id).await.unwrap());
        }
        let store = FileScheduleStore::open(&path).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schedules.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();
        assert!(matches!(
            FileScheduleStore::open(&path).await,
            Err(StoreError::Serialization(_))
        ));
    }
}
