//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, Result};

/// Timeouts and concurrency settings for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bound on the remote collaborator's own validation.
    pub validate_timeout_secs: u64,

    /// Bound on the remote push.
    pub push_timeout_secs: u64,

    /// Bound on post-push verification.
    pub verify_timeout_secs: u64,

    /// Bound on restoring a snapshot.
    pub rollback_timeout_secs: u64,

    /// Hold a per-target lock for the whole attempt.
    pub serialize_per_target: bool,

    /// Capacity of the event broadcast channel.
    pub event_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validate_timeout_secs: 300,
            push_timeout_secs: 600,
            verify_timeout_secs: 900,
            rollback_timeout_secs: 600,
            serialize_per_target: true,
            event_buffer: 256,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("validate_timeout_secs", self.validate_timeout_secs),
            ("push_timeout_secs", self.push_timeout_secs),
            ("verify_timeout_secs", self.verify_timeout_secs),
            ("rollback_timeout_secs", self.rollback_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(DeployError::InvalidConfig(format!("{} must be > 0", name)));
        }
        if self.event_buffer == 0 {
            return Err(DeployError::InvalidConfig(
                "event_buffer must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn validate_timeout(&self) -> Duration {
        Duration::from_secs(self.validate_timeout_secs)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    pub fn rollback_timeout(&self) -> Duration {
        Duration::from_secs(self.rollback_timeout_secs)
    }
}
