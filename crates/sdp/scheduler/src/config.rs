//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Fixed delay before a retry; the retry moves to the next window
    /// opening if this lands outside one.
    pub retry_backoff_secs: u64,

    /// Retry budget for schedules created without an explicit policy.
    pub default_max_retries: u32,

    /// Capacity of the event broadcast channel.
    pub event_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retry_backoff_secs: 300,
            default_max_retries: 3,
            event_buffer: 256,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer == 0 {
            return Err(SchedulerError::InvalidConfig(
                "event_buffer must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.retry_backoff_secs).unwrap_or(i64::MAX / 1000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry_backoff(), chrono::Duration::minutes(5));
    }

    #[test]
    fn zero_event_buffer_rejected() {
        let config = SchedulerConfig {
            event_buffer: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }
}
