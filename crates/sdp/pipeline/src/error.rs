//! Error types for the deployment pipeline.

use chrono::{DateTime, Utc};
use sdp_types::{EnvironmentClass, FailureKind};
use thiserror::Error;

/// Refusals and configuration errors.
///
/// Failures after target validation are recorded on the
/// `DeploymentRecord` instead.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Blocked target '{target}': {reason}")]
    BlockedTarget { target: String, reason: String },

    #[error("Circuit breaker open ({failures} recent failures){}", suffix(", resets at", .resets_at))]
    CircuitOpen {
        failures: u32,
        resets_at: Option<DateTime<Utc>>,
    },

    #[error("Target '{target}' ({class}) is outside its deployment window{}", suffix(", next window opens", .next_window))]
    OutsideWindow {
        target: String,
        class: EnvironmentClass,
        next_window: Option<DateTime<Utc>>,
    },

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] sdp_snapshot::SnapshotError),

    #[error("Code generation failed: {0}")]
    Generation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DeployError {
    /// Failure kind this refusal corresponds to, if any.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            DeployError::BlockedTarget { .. } => Some(FailureKind::BlockedTarget),
            DeployError::CircuitOpen { .. } => Some(FailureKind::CircuitOpen),
            DeployError::OutsideWindow { .. } => Some(FailureKind::OutsideWindow),
            DeployError::Snapshot(_)
            | DeployError::Generation(_)
            | DeployError::InvalidConfig(_) => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().map(|k| k.is_retryable()).unwrap_or(false)
    }
}

impl From<sdp_guard::GuardError> for DeployError {
    fn from(err: sdp_guard::GuardError) -> Self {
        match err {
            sdp_guard::GuardError::BlockedTarget { target, reason } => {
                DeployError::BlockedTarget { target, reason }
            }
            sdp_guard::GuardError::InvalidConfig(msg) => DeployError::InvalidConfig(msg),
        }
    }
}

fn suffix(label: &str, at: &Option<DateTime<Utc>>) -> String {
    at.map(|at| format!("{} {}", label, at)).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, DeployError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn refusal_kinds() {
        let blocked = DeployError::BlockedTarget {
            target: "prod".into(),
            reason: "production indicator".into(),
        };
        assert_eq!(blocked.kind(), Some(FailureKind::BlockedTarget));
        assert!(!blocked.is_retryable());

        let open = DeployError::CircuitOpen {
            failures: 3,
            resets_at: None,
        };
        assert!(open.is_retryable());
        assert_eq!(DeployError::InvalidConfig("x".into()).kind(), None);
    }

    #[test]
    fn messages_mention_next_window() {
        let at = Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap();
        let err = DeployError::OutsideWindow {
            target: "uat-1".into(),
            class: EnvironmentClass::Uat,
            next_window: Some(at),
        };
        let msg = err.to_string();
        assert!(msg.contains("uat-1"));
        assert!(msg.contains("2024-06-10"));
    }
}
