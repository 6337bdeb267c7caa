//! Error types for snapshot operations.

use sdp_types::SnapshotId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot not found: {0}")]
    NotFound(SnapshotId),

    #[error("Failed to capture state of '{target}': {reason}")]
    Capture { target: String, reason: String },

    #[error("Failed to restore {snapshot_id}: {reason}")]
    Restore {
        snapshot_id: SnapshotId,
        reason: String,
    },

    #[error("Snapshot storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
