//! Error types for the guard layer.

use thiserror::Error;

/// Errors raised by safeguards.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The target may not be deployed to.
    #[error("Target '{target}' is blocked: {reason}")]
    BlockedTarget { target: String, reason: String },

    /// A safeguard was constructed from an unusable configuration.
    #[error("Invalid guard configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, GuardError>;
