//! Read-only commands: `check-target`, `scan`, `review`, `history`,
//! `windows` and `breaker`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::Args;
use sdp_guard::{
    CircuitBreakerConfig, DeploymentWindow, FindingSeverity, PatternRiskScanner, RiskScanner,
    TargetValidator,
};
use sdp_pipeline::{DeploymentHistory, HistorySummary, StaticTargetMetadata};
use sdp_quality_gate::{CommandReviewer, QualityGate, ReviewProposal};
use sdp_types::{DeploymentOutcome, DeploymentRecord, EnvironmentClass};
use serde::Serialize;
use tabled::Tabled;

use super::{load_artifacts, read_json};
use crate::app;
use crate::config::SdpConfig;
use crate::output::{self, OutputFormat, RecordRow};

// ── check-target ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CheckTargetArgs {
    pub target: String,
}

#[derive(Debug, Serialize)]
struct TargetReport {
    target: String,
    allowed: bool,
    reason: Option<String>,
    class: EnvironmentClass,
    window_open: bool,
    next_window: Option<DateTime<Utc>>,
}

pub async fn check_target(
    args: CheckTargetArgs,
    config: &SdpConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let validator =
        TargetValidator::new(config.targets.policy()).context("invalid target policy")?;
    let class = StaticTargetMetadata::from_map(config.targets.classes.clone()).class_of(&args.target);
    let now = Utc::now();

    let (allowed, reason) = match validator.validate(&args.target) {
        Ok(clearance) => (true, clearance.warning().map(str::to_string)),
        Err(e) => (false, Some(e.to_string())),
    };
    let report = TargetReport {
        allowed,
        reason,
        class,
        window_open: config.windows.is_within_window(now, class),
        next_window: config.windows.next_window(now, class),
        target: args.target,
    };

    match format {
        OutputFormat::Json => output::print_single(&report)?,
        OutputFormat::Table => {
            if report.allowed {
                output::print_success(&format!("{} may be deployed to", report.target));
            } else {
                output::print_error(&format!("{} is blocked", report.target));
            }
            if let Some(reason) = &report.reason {
                println!("  {}", reason);
            }
            println!("  Class:  {}", report.class);
            match (report.window_open, report.next_window) {
                (true, _) => println!("  Window: open now"),
                (false, Some(next)) => println!("  Window: closed, opens {}", next),
                (false, None) => println!("  Window: never opens"),
            }
        }
    }
    if !report.allowed {
        bail!("target {} is blocked", report.target);
    }
    Ok(())
}

// ── scan ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ScanArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "Artifact")]
    artifact: String,
    #[tabled(rename = "Line")]
    line: usize,
    #[tabled(rename = "Rule")]
    rule: String,
    #[tabled(rename = "Severity")]
    severity: &'static str,
    #[tabled(rename = "Message")]
    message: String,
}

pub async fn scan(args: ScanArgs, config: &SdpConfig, format: OutputFormat) -> anyhow::Result<()> {
    let artifacts = load_artifacts(&args.files, &[]).await?;
    let scanner = PatternRiskScanner::new(config.risk.clone()).context("invalid risk configuration")?;
    let report = scanner.scan(&artifacts);

    output::print_output(
        &report.findings,
        |f| FindingRow {
            artifact: f.artifact.clone(),
            line: f.line,
            rule: f.rule.clone(),
            severity: match f.severity {
                FindingSeverity::Blocking => "blocking",
                FindingSeverity::Advisory => "advisory",
            },
            message: f.message.clone(),
        },
        format,
    )?;
    if report.has_blocking() {
        bail!("{} blocking finding(s)", report.blocking().count());
    }
    Ok(())
}

// ── review ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ReviewArgs {
    /// Review proposal files (JSON object or array of objects)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

pub async fn review(args: ReviewArgs, config: &SdpConfig, format: OutputFormat) -> anyhow::Result<()> {
    let program = config
        .quality_gate
        .command
        .clone()
        .context("quality_gate.command is not configured")?;

    let mut proposals = Vec::new();
    for path in &args.files {
        let value: serde_json::Value = read_json(path).await?;
        match value {
            serde_json::Value::Array(_) => {
                let batch: Vec<ReviewProposal> = serde_json::from_value(value)
                    .with_context(|| format!("invalid proposals in {}", path.display()))?;
                proposals.extend(batch);
            }
            other => proposals.push(
                serde_json::from_value(other)
                    .with_context(|| format!("invalid proposal in {}", path.display()))?,
            ),
        }
    }

    let reviewer = CommandReviewer::new(
        program,
        config.quality_gate.args.clone(),
        Duration::from_secs(config.quality_gate.timeout_secs),
    );
    let gate = QualityGate::new(Arc::new(reviewer), &config.quality_gate);
    let report = gate.review_batch(&proposals).await;

    match format {
        OutputFormat::Json => output::print_single(&report)?,
        OutputFormat::Table => {
            for (artifact, review) in &report.reviews {
                if review.approved {
                    output::print_success(&format!("{}: {}", artifact, review.reason));
                    for change in &review.changes {
                        println!("    - {}", change);
                    }
                } else {
                    output::print_error(&format!("{}: {}", artifact, review.reason));
                }
            }
            println!(
                "{} approved, {} rejected ({:.0}%)",
                report.approved,
                report.rejected,
                report.approval_rate * 100.0
            );
        }
    }
    Ok(())
}

// ── history ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Only this target
    #[arg(short, long)]
    pub target: Option<String>,

    /// Newest N records
    #[arg(short = 'n', long, default_value_t = 20)]
    pub limit: usize,

    /// Show aggregate counts instead of records
    #[arg(long)]
    pub summary: bool,
}

pub async fn history(args: HistoryArgs, config: &SdpConfig, format: OutputFormat) -> anyhow::Result<()> {
    let history = app::open_history(config).await?;
    let mut records = match &args.target {
        Some(target) => history.for_target(target).await?,
        None => history.list().await?,
    };

    if args.summary {
        let summary = HistorySummary::from_records(&records);
        return match format {
            OutputFormat::Json => output::print_single(&summary),
            OutputFormat::Table => {
                println!("Total:        {}", summary.total);
                println!("Succeeded:    {}", summary.succeeded);
                println!("Rolled back:  {}", summary.rolled_back);
                println!("Failed:       {}", summary.failed);
                println!("  unrecovered {}", summary.unrecovered);
                println!("Rejected:     {}", summary.rejected);
                println!("Success rate: {:.1}%", summary.success_rate() * 100.0);
                Ok(())
            }
        };
    }

    records.reverse();
    records.truncate(args.limit);
    output::print_output(&records, |r| RecordRow::from(r), format)
}

// ── windows ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WindowsArgs {
    /// Show the window status of this target
    #[arg(short, long)]
    pub target: Option<String>,
}

#[derive(Clone, Tabled, Serialize)]
struct WindowRow {
    #[tabled(rename = "Class")]
    class: EnvironmentClass,
    #[tabled(rename = "Days")]
    days: String,
    #[tabled(rename = "Hours")]
    hours: String,
    #[tabled(rename = "Open now")]
    open_now: bool,
    #[tabled(rename = "Next opening")]
    next: String,
}

fn describe_window(window: Option<&DeploymentWindow>) -> (String, String) {
    match window {
        None => ("any".to_string(), "any".to_string()),
        Some(w) => (
            w.days
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(","),
            format!("{:02}:00-{:02}:00", w.start_hour, w.end_hour),
        ),
    }
}

pub async fn windows(args: WindowsArgs, config: &SdpConfig, format: OutputFormat) -> anyhow::Result<()> {
    let now = Utc::now();
    let windows = &config.windows;
    let classes = match &args.target {
        Some(target) => vec![StaticTargetMetadata::from_map(config.targets.classes.clone()).class_of(target)],
        None => vec![
            EnvironmentClass::Development,
            EnvironmentClass::Uat,
            EnvironmentClass::Production,
        ],
    };

    let rows: Vec<WindowRow> = classes
        .into_iter()
        .map(|class| {
            let (days, hours) = describe_window(windows.window_for(class));
            WindowRow {
                class,
                days,
                hours,
                open_now: windows.is_within_window(now, class),
                next: windows
                    .next_window(now, class)
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string()),
            }
        })
        .collect();

    if let (Some(target), OutputFormat::Table) = (&args.target, format) {
        output::print_info(&format!(
            "{} (UTC offset {} min)",
            target, windows.utc_offset_minutes
        ));
    }
    output::print_output(&rows, WindowRow::clone, format)
}

// ── breaker ───────────────────────────────────────────────────────────

/// The breaker lives in the serving process; this view replays the
/// history to show where a fresh process would stand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct BreakerView {
    failure_threshold: u32,
    reset_timeout_secs: u64,
    consecutive_failures: u32,
    last_failure_at: Option<DateTime<Utc>>,
    tripped: bool,
    resets_at: Option<DateTime<Utc>>,
}

fn breaker_view(
    records: &[DeploymentRecord],
    config: &CircuitBreakerConfig,
    now: DateTime<Utc>,
) -> BreakerView {
    let mut consecutive = 0u32;
    let mut last_failure_at = None;
    for record in records {
        match record.outcome {
            DeploymentOutcome::Succeeded => {
                consecutive = 0;
                last_failure_at = None;
            }
            DeploymentOutcome::Failed | DeploymentOutcome::RolledBack => {
                consecutive = consecutive.saturating_add(1);
                last_failure_at = Some(record.completed_at.unwrap_or(record.started_at));
            }
            DeploymentOutcome::Rejected | DeploymentOutcome::InProgress => {}
        }
    }

    let reset = chrono::Duration::seconds(config.reset_timeout_secs.min(u64::from(u32::MAX)) as i64);
    let resets_at = if consecutive >= config.failure_threshold {
        last_failure_at.map(|at| at + reset)
    } else {
        None
    };
    BreakerView {
        failure_threshold: config.failure_threshold,
        reset_timeout_secs: config.reset_timeout_secs,
        consecutive_failures: consecutive,
        last_failure_at,
        tripped: resets_at.map_or(false, |at| now < at),
        resets_at,
    }
}

pub async fn breaker(config: &SdpConfig, format: OutputFormat) -> anyhow::Result<()> {
    let history = app::open_history(config).await?;
    let view = breaker_view(&history.list().await?, &config.circuit_breaker, Utc::now());
    match format {
        OutputFormat::Json => output::print_single(&view)?,
        OutputFormat::Table => {
            if view.tripped {
                output::print_error(&format!(
                    "Open: {} consecutive failures, resets at {}",
                    view.consecutive_failures,
                    view.resets_at.map(|at| at.to_rfc3339()).unwrap_or_default()
                ));
            } else {
                output::print_success(&format!(
                    "Closed: {}/{} consecutive failures",
                    view.consecutive_failures, view.failure_threshold
                ));
            }
        }
    }
    Ok(())
}
