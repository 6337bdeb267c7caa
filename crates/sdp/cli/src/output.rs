//! Output formatting utilities

use colored::*;
use sdp_types::{DeploymentOutcome, DeploymentRecord, ScheduleStatus, ScheduledDeployment, Severity};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table format
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows as a table, or the underlying values as JSON.
pub fn print_output<T: Serialize, R: Tabled>(
    data: &[T],
    to_row: impl Fn(&T) -> R,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No results".dimmed());
            } else {
                println!("{}", Table::new(data.iter().map(to_row)));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
    }
    Ok(())
}

/// Print a single item as pretty JSON.
pub fn print_single<T: Serialize>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

fn short_time(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

// ── Rows ──────────────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct RecordRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Target")]
    pub target: String,
    #[tabled(rename = "Outcome")]
    pub outcome: String,
    #[tabled(rename = "Severity")]
    pub severity: String,
    #[tabled(rename = "Attempt")]
    pub attempt: u32,
    #[tabled(rename = "Started")]
    pub started: String,
    #[tabled(rename = "Detail")]
    pub detail: String,
}

impl From<&DeploymentRecord> for RecordRow {
    fn from(record: &DeploymentRecord) -> Self {
        Self {
            id: record.id.to_string(),
            target: record.target.clone(),
            outcome: outcome_colored(record.outcome),
            severity: severity_colored(record.severity()),
            attempt: record.attempt,
            started: short_time(record.started_at),
            detail: record
                .failure
                .as_ref()
                .map(|f| f.to_string())
                .unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
pub struct ScheduleRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Target")]
    pub target: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Due")]
    pub due: String,
    #[tabled(rename = "Retries")]
    pub retries: String,
    #[tabled(rename = "Last error")]
    pub last_error: String,
}

impl From<&ScheduledDeployment> for ScheduleRow {
    fn from(scheduled: &ScheduledDeployment) -> Self {
        Self {
            id: scheduled.id.to_string(),
            target: scheduled.target().to_string(),
            status: status_colored(scheduled.status),
            due: short_time(scheduled.due_at()),
            retries: format!(
                "{}/{}",
                scheduled.retry.retry_count, scheduled.retry.max_retries
            ),
            last_error: scheduled.last_error.clone().unwrap_or_default(),
        }
    }
}

pub fn outcome_colored(outcome: DeploymentOutcome) -> String {
    let text = outcome.to_string();
    match outcome {
        DeploymentOutcome::Succeeded => text.green().to_string(),
        DeploymentOutcome::RolledBack | DeploymentOutcome::Rejected => text.yellow().to_string(),
        DeploymentOutcome::Failed => text.red().to_string(),
        DeploymentOutcome::InProgress => text,
    }
}

pub fn severity_colored(severity: Severity) -> String {
    let text = severity.to_string();
    match severity {
        Severity::Info => text.dimmed().to_string(),
        Severity::Warning => text.yellow().to_string(),
        Severity::Error => text.red().to_string(),
        Severity::Critical | Severity::Fatal => text.red().bold().to_string(),
    }
}

pub fn status_colored(status: ScheduleStatus) -> String {
    let text = status.to_string();
    match status {
        ScheduleStatus::Completed => text.green().to_string(),
        ScheduleStatus::Failed | ScheduleStatus::Missed => text.red().to_string(),
        ScheduleStatus::Executing | ScheduleStatus::RetryScheduled => text.yellow().to_string(),
        ScheduleStatus::Scheduled | ScheduleStatus::Cancelled => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Table);
    }

    #[test]
    fn record_row_shows_failure_detail() {
        use sdp_types::{AttemptFailure, DeploymentId, FailureKind, PipelineStage};

        let now = chrono::Utc::now();
        let mut record = DeploymentRecord::new(DeploymentId::generate(), "dev-sandbox", vec![], now);
        record.mark_failed(
            AttemptFailure {
                stage: PipelineStage::Push,
                kind: FailureKind::PushFailed,
                message: "rejected by platform".into(),
            },
            now,
        );
        let row = RecordRow::from(&record);
        assert_eq!(row.target, "dev-sandbox");
        assert!(row.detail.contains("rejected by platform"));
    }
}
