//! Durable storage for scheduled deployments.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use sdp_types::{ScheduleId, ScheduledDeployment};
use thiserror::Error;

pub use file::FileScheduleStore;
pub use memory::InMemoryScheduleStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Schedule store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schedule store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Scheduled deployments keyed by ID. `upsert` must be durable when it
/// returns.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn upsert(&self, scheduled: &ScheduledDeployment) -> Result<(), StoreError>;

    async fn get(&self, id: &ScheduleId) -> Result<Option<ScheduledDeployment>, StoreError>;

    /// All records, ordered by scheduled time.
    async fn list(&self) -> Result<Vec<ScheduledDeployment>, StoreError>;

    /// Returns whether a record was removed.
    async fn remove(&self, id: &ScheduleId) -> Result<bool, StoreError>;
}

fn sort_by_schedule(records: &mut [ScheduledDeployment]) {
    records.sort_by(|a, b| {
        a.scheduled_for
            .cmp(&b.scheduled_for)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}
