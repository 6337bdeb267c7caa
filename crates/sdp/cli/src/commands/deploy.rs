//! `deploy` and `restore`.

use anyhow::bail;
use clap::Args;
use sdp_types::{DeploymentRecord, RollbackStatus, SnapshotId};

use super::RequestArgs;
use crate::app;
use crate::config::SdpConfig;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub request: RequestArgs,
}

pub async fn deploy(args: DeployArgs, config: &SdpConfig, format: OutputFormat) -> anyhow::Result<()> {
    let request = args.request.into_request().await?;
    let pipeline = app::build_pipeline(config).await?;

    let record = match pipeline.deploy(&request).await {
        Ok(record) => record,
        Err(e) => {
            output::print_error(&format!("Deployment refused: {}", e));
            return Err(e.into());
        }
    };

    match format {
        OutputFormat::Json => output::print_single(&record)?,
        OutputFormat::Table => print_record(&record),
    }
    if record.is_success() {
        Ok(())
    } else {
        bail!("deployment {} {}", record.id, record.outcome)
    }
}

fn print_record(record: &DeploymentRecord) {
    println!(
        "Deployment {} to {}: {} ({})",
        record.id,
        record.target,
        output::outcome_colored(record.outcome),
        output::severity_colored(record.severity())
    );
    if !record.stages_completed.is_empty() {
        let stages: Vec<String> = record.stages_completed.iter().map(|s| s.to_string()).collect();
        println!("  Stages:   {}", stages.join(" → "));
    }
    if let Some(snapshot_id) = record.snapshot_id {
        println!("  Snapshot: {}", snapshot_id);
    }
    for warning in &record.warnings {
        output::print_warning(warning);
    }
    if let Some(review) = &record.review {
        let verdict = if review.approved { "approved" } else { "rejected" };
        println!("  Review:   {} ({})", verdict, review.reason);
    }
    if let Some(verification) = &record.verification {
        println!(
            "  Tests:    {} run, {} failed",
            verification.tests_run, verification.failures
        );
    }
    if let Some(failure) = &record.failure {
        output::print_error(&failure.to_string());
    }
    match &record.rollback {
        RollbackStatus::NotNeeded => {}
        RollbackStatus::Restored { snapshot_id } => {
            output::print_info(&format!("Target restored from snapshot {}", snapshot_id))
        }
        RollbackStatus::Unavailable => output::print_error(
            "Target NOT restored: no snapshot was taken; it may be partially updated",
        ),
        RollbackStatus::Failed {
            snapshot_id,
            reason,
        } => output::print_error(&format!(
            "Target NOT restored from {}: {}; manual intervention required",
            snapshot_id, reason
        )),
    }
}

#[derive(Debug, Args)]
pub struct RestoreArgs {
    /// Snapshot to restore
    pub snapshot: SnapshotId,
}

pub async fn restore(args: RestoreArgs, config: &SdpConfig, format: OutputFormat) -> anyhow::Result<()> {
    let pipeline = app::build_pipeline(config).await?;
    let report = pipeline.restore_snapshot(&args.snapshot).await?;
    match format {
        OutputFormat::Json => output::print_single(&report)?,
        OutputFormat::Table => {
            output::print_success(&format!(
                "Restored {} on {}",
                report.snapshot_id, report.target
            ));
            for name in &report.restored {
                println!("  restored {}", name);
            }
            for name in &report.removed {
                println!("  removed  {}", name);
            }
        }
    }
    Ok(())
}
