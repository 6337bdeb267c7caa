//! Error types for the scheduler.

use chrono::{DateTime, Utc};
use sdp_pipeline::DeployError;
use sdp_types::{ScheduleId, ScheduleStatus, TransitionError};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduled time {scheduled_for} is not in the future (now {now})")]
    NotInFuture {
        scheduled_for: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Scheduled time for '{target}' is outside its deployment window{}", next_hint(.next_window))]
    OutsideWindow {
        target: String,
        next_window: Option<DateTime<Utc>>,
    },

    #[error("Scheduled deployment not found: {0}")]
    NotFound(ScheduleId),

    #[error("Scheduled deployment {id} is not in scheduled state (status: {status})")]
    NotCancellable { id: ScheduleId, status: ScheduleStatus },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

fn next_hint(next_window: &Option<DateTime<Utc>>) -> String {
    match next_window {
        Some(at) => format!("; next window opens {}", at),
        None => "; the window never opens".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
