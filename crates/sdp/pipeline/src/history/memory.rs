//! In-memory deployment history.

use async_trait::async_trait;
use parking_lot::RwLock;
use sdp_types::DeploymentRecord;

use super::{DeploymentHistory, HistoryError};

#[derive(Debug, Default)]
pub struct InMemoryDeploymentHistory {
    records: RwLock<Vec<DeploymentRecord>>,
}

impl InMemoryDeploymentHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl DeploymentHistory for InMemoryDeploymentHistory {
    async fn append(&self, record: &DeploymentRecord) -> Result<(), HistoryError> {
        self.records.write().push(record.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DeploymentRecord>, HistoryError> {
        Ok(self.records.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sdp_types::DeploymentId;
    use std::sync::Arc;

    #[tokio::test]
    async fn concurrent_appends_are_kept() {
        let history = Arc::new(InMemoryDeploymentHistory::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let history = history.clone();
            handles.push(tokio::spawn(async move {
                let record = DeploymentRecord::new(
                    DeploymentId::generate(),
                    format!("dev-{}", i % 4),
                    vec![],
                    Utc::now(),
                );
                history.append(&record).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(history.len(), 16);
        assert_eq!(history.for_target("dev-0").await.unwrap().len(), 4);
        assert_eq!(history.recent(5).await.unwrap().len(), 5);
    }
}
