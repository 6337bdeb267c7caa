//! JSON-lines deployment history.
//!
//! One record per line, appended with `O_APPEND`. Appends are serialized
//! by an async mutex so concurrent attempts never interleave lines.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sdp_types::DeploymentRecord;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use super::{DeploymentHistory, HistoryError};

pub struct FileDeploymentHistory {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl FileDeploymentHistory {
    /// Open (or create) a history log. Parent directories are created.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(Self {
            path,
            append_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DeploymentHistory for FileDeploymentHistory {
    async fn append(&self, record: &DeploymentRecord) -> Result<(), HistoryError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.append_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DeploymentRecord>, HistoryError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping unreadable history line"
                ),
            }
        }
        Ok(records)
    }
}
