//! `schedule`, `cancel`, `list` and `run`.

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use sdp_scheduler::{ScheduleEvent, ScheduleStore};
use sdp_types::{NotificationFlags, RetryPolicy, ScheduleId, ScheduleStatus};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::RequestArgs;
use crate::app;
use crate::config::SdpConfig;
use crate::output::{self, OutputFormat, ScheduleRow};

#[derive(Debug, Args)]
pub struct ScheduleArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// When to deploy (RFC 3339, e.g. 2024-06-03T22:00:00Z)
    #[arg(long, conflicts_with = "in_minutes", required_unless_present = "in_minutes")]
    pub at: Option<DateTime<Utc>>,

    /// Deploy this many minutes from now
    #[arg(long = "in", value_name = "MINUTES")]
    pub in_minutes: Option<u32>,

    /// Retry budget (defaults to scheduler.default_max_retries)
    #[arg(long)]
    pub retries: Option<u32>,

    /// Emit a reminder this many seconds before execution
    #[arg(long, value_name = "SECS")]
    pub remind_before: Option<u64>,

    /// Do not notify on completion or failure
    #[arg(long)]
    pub quiet: bool,
}

pub async fn schedule(args: ScheduleArgs, config: &SdpConfig, format: OutputFormat) -> anyhow::Result<()> {
    let when = match (args.at, args.in_minutes) {
        (Some(at), _) => at,
        (None, Some(minutes)) => Utc::now() + Duration::minutes(i64::from(minutes)),
        (None, None) => bail!("either --at or --in is required"),
    };
    let retry = RetryPolicy::up_to(args.retries.unwrap_or(config.scheduler.default_max_retries));
    let notifications = NotificationFlags {
        on_success: !args.quiet,
        on_failure: !args.quiet,
        remind_before_secs: args.remind_before,
    };
    let request = args.request.into_request().await?;

    let scheduler = app::build_scheduler(config).await?;
    let scheduled = scheduler
        .schedule(request, when, retry, notifications)
        .await?;
    // This process does not stay up to fire it; `sdp run` does.
    scheduler.shutdown().await;

    match format {
        OutputFormat::Json => output::print_single(&scheduled)?,
        OutputFormat::Table => {
            output::print_success(&format!(
                "Scheduled {} to {} at {}",
                scheduled.id,
                scheduled.target(),
                scheduled.scheduled_for
            ));
            output::print_info("Run `sdp run` to execute scheduled deployments");
        }
    }
    Ok(())
}

#[derive(Debug, Args)]
pub struct CancelArgs {
    pub id: ScheduleId,
}

pub async fn cancel(args: CancelArgs, config: &SdpConfig, format: OutputFormat) -> anyhow::Result<()> {
    let scheduler = app::build_scheduler(config).await?;
    let cancelled = scheduler.cancel(&args.id).await?;
    match format {
        OutputFormat::Json => output::print_single(&cancelled)?,
        OutputFormat::Table => output::print_success(&format!("Cancelled {}", cancelled.id)),
    }
    Ok(())
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only show records in this status (e.g. scheduled, failed)
    #[arg(long)]
    pub status: Option<ScheduleStatus>,
}

pub async fn list(args: ListArgs, config: &SdpConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = app::open_schedule_store(config).await?;
    let records: Vec<_> = store
        .list()
        .await?
        .into_iter()
        .filter(|r| args.status.map_or(true, |s| r.status == s))
        .collect();
    output::print_output(&records, |r| ScheduleRow::from(r), format)
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Remove finished schedules older than this many days on startup
    #[arg(long, value_name = "DAYS")]
    pub cleanup_after_days: Option<u32>,
}

/// Recover persisted schedules and serve them until Ctrl-C.
pub async fn run(args: RunArgs, config: &SdpConfig) -> anyhow::Result<()> {
    let scheduler = app::build_scheduler(config).await?;
    let mut events = scheduler.subscribe();

    let report = scheduler.recover().await.context("recovery failed")?;
    output::print_info(&format!(
        "Recovered: {} armed, {} missed, {} interrupted",
        report.rearmed.len(),
        report.missed.len(),
        report.interrupted.len()
    ));

    if let Some(days) = args.cleanup_after_days {
        let removed = scheduler.cleanup(Duration::days(i64::from(days))).await?;
        info!(removed, "Removed finished schedules");
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped schedule events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    scheduler.shutdown().await;
    output::print_success("Scheduler stopped; pending deployments stay persisted");
    Ok(())
}

fn print_event(event: &ScheduleEvent) {
    match event {
        ScheduleEvent::Scheduled { id, target, at } => {
            output::print_info(&format!("{} scheduled for {} at {}", id, target, at))
        }
        ScheduleEvent::Reminder { id, target, at } => {
            output::print_info(&format!("{} deploys to {} at {}", id, target, at))
        }
        ScheduleEvent::Started { id, attempt } => {
            output::print_info(&format!("{} started (attempt {})", id, attempt))
        }
        ScheduleEvent::Completed { id, deployment_id } => {
            output::print_success(&format!("{} completed as {}", id, deployment_id))
        }
        ScheduleEvent::Failed { id, reason } => {
            output::print_error(&format!("{} failed: {}", id, reason))
        }
        ScheduleEvent::RetryScheduled { id, at, retry } => {
            output::print_warning(&format!("{} retry {} at {}", id, retry, at))
        }
        ScheduleEvent::Cancelled { id } => output::print_info(&format!("{} cancelled", id)),
        ScheduleEvent::Missed { id, was_due } => {
            output::print_warning(&format!("{} missed (was due {})", id, was_due))
        }
    }
}
