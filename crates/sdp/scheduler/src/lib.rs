//! SDP Scheduler - Deferred deployments
//!
//! The scheduler holds deployment requests for a future time and hands
//! them to the pipeline when they fall due:
//!
//! ```text
//! scheduled -> executing -> completed | failed | retry_scheduled
//! retry_scheduled -> executing
//! scheduled -> cancelled        (explicit cancel only)
//! scheduled -> missed           (due while the process was down)
//! retry_scheduled -> missed     (due while the process was down)
//! executing -> failed           (interrupted by a restart)
//! ```
//!
//! Every status change is written to the [`ScheduleStore`] before the
//! side effect it guards, so [`DeploymentScheduler::recover`] can rebuild
//! pending work after a restart.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod store;

pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use events::ScheduleEvent;
pub use scheduler::{DeploymentScheduler, RecoveryReport};
pub use store::{FileScheduleStore, InMemoryScheduleStore, ScheduleStore, StoreError};
