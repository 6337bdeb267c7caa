//! In-memory schedule store.

use async_trait::async_trait;
use dashmap::DashMap;
use sdp_types::{ScheduleId, ScheduledDeployment};

use super::{sort_by_schedule, ScheduleStore, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryScheduleStore {
    records: DashMap<ScheduleId, ScheduledDeployment>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn upsert(&self, scheduled: &ScheduledDeployment) -> Result<(), StoreError> {
        self.records.insert(scheduled.id, scheduled.clone());
        Ok(())
    }

    async fn get(&self, id: &ScheduleId) -> Result<Option<ScheduledDeployment>, StoreError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn list(&self) -> Result<Vec<ScheduledDeployment>, StoreError> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        sort_by_schedule(&mut records);
        Ok(records)
    }

    async fn remove(&self, id: &ScheduleId) -> Result<bool, StoreError> {
        Ok(self.records.remove(id).is_some())
    }
}
