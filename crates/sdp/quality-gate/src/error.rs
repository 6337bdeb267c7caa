//! Error types for reviewer invocation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReviewerError {
    #[error("Failed to start '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("Process I/O failed: {0}")]
    Io(String),

    #[error("Process timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Reviewer unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, ReviewerError>;
