//! Scheduled deployments and their status machine.
//!
//! ```text
//! scheduled ──► executing ──► completed
//!    │              │
//!    │              ├──► failed
//!    │              │
//!    │              └──► retry_scheduled ──► executing
//!    │                         │
//!    ├──► cancelled            └──► missed   (restart, time passed)
//!    └──► missed   (restart, time passed)
//! ```
//!
//! `executing → failed` is also taken on restart for attempts that were
//! interrupted mid-flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::{DeploymentId, ScheduleId};
use crate::request::DeploymentRequest;

/// Lifecycle status of a scheduled deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Scheduled,
    Executing,
    Completed,
    Failed,
    RetryScheduled,
    Cancelled,
    Missed,
}

impl ScheduleStatus {
    pub fn can_transition_to(&self, next: ScheduleStatus) -> bool {
        use ScheduleStatus::*;
        matches!(
            (self, next),
            (Scheduled, Executing)
                | (Scheduled, Cancelled)
                | (Scheduled, Missed)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Executing, RetryScheduled)
                | (RetryScheduled, Executing)
                | (RetryScheduled, Missed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScheduleStatus::Completed
                | ScheduleStatus::Failed
                | ScheduleStatus::Cancelled
                | ScheduleStatus::Missed
        )
    }

    /// Whether a timer should be armed for this status.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ScheduleStatus::Scheduled | ScheduleStatus::RetryScheduled
        )
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScheduleStatus::Scheduled => "scheduled",
            ScheduleStatus::Executing => "executing",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Failed => "failed",
            ScheduleStatus::RetryScheduled => "retry_scheduled",
            ScheduleStatus::Cancelled => "cancelled",
            ScheduleStatus::Missed => "missed",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "scheduled" => Ok(ScheduleStatus::Scheduled),
            "executing" => Ok(ScheduleStatus::Executing),
            "completed" => Ok(ScheduleStatus::Completed),
            "failed" => Ok(ScheduleStatus::Failed),
            "retry_scheduled" => Ok(ScheduleStatus::RetryScheduled),
            "cancelled" => Ok(ScheduleStatus::Cancelled),
            "missed" => Ok(ScheduleStatus::Missed),
            other => Err(format!("unknown schedule status: {}", other)),
        }
    }
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal schedule transition {from} -> {to}")]
pub struct TransitionError {
    pub from: ScheduleStatus,
    pub to: ScheduleStatus,
}

/// Retry settings for one scheduled deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_retries: u32,
    #[serde(default)]
    pub retry_count: u32,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            retry_count: 0,
        }
    }

    pub fn up_to(max_retries: u32) -> Self {
        Self {
            enabled: true,
            max_retries,
            retry_count: 0,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.enabled && self.retry_count < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::up_to(3)
    }
}

/// Which lifecycle events should produce notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFlags {
    pub on_success: bool,
    pub on_failure: bool,
    /// Emit a reminder this many seconds before execution.
    #[serde(default)]
    pub remind_before_secs: Option<u64>,
}

impl Default for NotificationFlags {
    fn default() -> Self {
        Self {
            on_success: true,
            on_failure: true,
            remind_before_secs: None,
        }
    }
}

/// A deployment request deferred to a future time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledDeployment {
    pub id: ScheduleId,
    pub request: DeploymentRequest,
    pub scheduled_for: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub retry: RetryPolicy,
    #[serde(default)]
    pub notifications: NotificationFlags,
    /// When the next retry fires; set while `retry_scheduled`.
    #[serde(default)]
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Most recent executed attempt, if any.
    #[serde(default)]
    pub last_deployment: Option<DeploymentId>,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScheduledDeployment {
    pub fn new(
        request: DeploymentRequest,
        scheduled_for: DateTime<Utc>,
        retry: RetryPolicy,
        notifications: NotificationFlags,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ScheduleId::generate(),
            request,
            scheduled_for,
            status: ScheduleStatus::Scheduled,
            retry,
            notifications,
            next_attempt_at: None,
            last_deployment: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Apply a status change if the machine allows it.
    pub fn transition(
        &mut self,
        next: ScheduleStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        if next != ScheduleStatus::RetryScheduled {
            self.next_attempt_at = None;
        }
        Ok(())
    }

    /// When the armed timer for this deployment should fire.
    pub fn due_at(&self) -> DateTime<Utc> {
        match self.status {
            ScheduleStatus::RetryScheduled => self.next_attempt_at.unwrap_or(self.scheduled_for),
            _ => self.scheduled_for,
        }
    }

    pub fn target(&self) -> &str {
        &self.request.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Artifact, ArtifactSet};
    use chrono::Duration;

    fn scheduled() -> ScheduledDeployment {
        let now = Utc::now();
        ScheduledDeployment::new(
            DeploymentRequest::new(
                ArtifactSet::new().with(Artifact::source("A.cls", "class A {}")),
                "dev-sandbox",
            ),
            now + Duration::hours(1),
            RetryPolicy::default(),
            NotificationFlags::default(),
            now,
        )
    }

    #[test]
    fn legal_path_to_completion() {
        let mut s = scheduled();
        let now = Utc::now();
        s.transition(ScheduleStatus::Executing, now).unwrap();
        s.transition(ScheduleStatus::RetryScheduled, now).unwrap();
        s.transition(ScheduleStatus::Executing, now).unwrap();
        s.transition(ScheduleStatus::Completed, now).unwrap();
        assert_eq!(s.completed_at, Some(now));
    }

    #[test]
    fn cancel_only_from_scheduled() {
        let mut s = scheduled();
        let now = Utc::now();
        s.transition(ScheduleStatus::Cancelled, now).unwrap();
        let err = s.transition(ScheduleStatus::Cancelled, now).unwrap_err();
        assert_eq!(err.from, ScheduleStatus::Cancelled);

        let mut running = scheduled();
        running.transition(ScheduleStatus::Executing, now).unwrap();
        assert!(running.transition(ScheduleStatus::Cancelled, now).is_err());
    }

    #[test]
    fn terminal_states_are_final() {
        use ScheduleStatus::*;
        for terminal in [Completed, Failed, Cancelled, Missed] {
            for next in [
                Scheduled,
                Executing,
                Completed,
                Failed,
                RetryScheduled,
                Cancelled,
                Missed,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn due_at_follows_retry_time() {
        let mut s = scheduled();
        let now = Utc::now();
        s.transition(ScheduleStatus::Executing, now).unwrap();
        s.transition(ScheduleStatus::RetryScheduled, now).unwrap();
        let retry_at = now + Duration::minutes(5);
        s.next_attempt_at = Some(retry_at);
        assert_eq!(s.due_at(), retry_at);

        s.transition(ScheduleStatus::Executing, now).unwrap();
        assert!(s.next_attempt_at.is_none());
    }

    #[test]
    fn retry_budget() {
        let mut policy = RetryPolicy::up_to(2);
        assert!(policy.can_retry());
        policy.retry_count = 2;
        assert!(!policy.can_retry());
        assert!(!RetryPolicy::none().can_retry());
    }

    #[test]
    fn status_parses_its_display_form() {
        for status in [
            ScheduleStatus::Scheduled,
            ScheduleStatus::Executing,
            ScheduleStatus::RetryScheduled,
            ScheduleStatus::Missed,
        ] {
            assert_eq!(status.to_string().parse::<ScheduleStatus>(), Ok(status));
        }
        assert_eq!("retry-scheduled".parse(), Ok(ScheduleStatus::RetryScheduled));
        assert!("pending".parse::<ScheduleStatus>().is_err());
    }
}
