//! Scheduler lifecycle events.

use chrono::{DateTime, Utc};
use sdp_types::{DeploymentId, ScheduleId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScheduleEvent {
    Scheduled {
        id: ScheduleId,
        target: String,
        at: DateTime<Utc>,
    },
    Reminder {
        id: ScheduleId,
        target: String,
        at: DateTime<Utc>,
    },
    Started {
        id: ScheduleId,
        attempt: u32,
    },
    /// Only sent when the schedule asked for success notifications.
    Completed {
        id: ScheduleId,
        deployment_id: DeploymentId,
    },
    /// Only sent when the schedule asked for failure notifications.
    Failed {
        id: ScheduleId,
        reason: String,
    },
    RetryScheduled {
        id: ScheduleId,
        at: DateTime<Utc>,
        retry: u32,
    },
    Cancelled {
        id: ScheduleId,
    },
    Missed {
        id: ScheduleId,
        was_due: DateTime<Utc>,
    },
}
