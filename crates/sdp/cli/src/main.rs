//! SDP CLI - safe deployments to remote environments
//!
//! This CLI lets operators:
//! - Check whether a target may be deployed to, and when
//! - Scan artifacts for risky patterns before deploying
//! - Deploy with snapshot, verification and automatic rollback
//! - Schedule deployments and serve them with `sdp run`
//! - Inspect deployment history and restore snapshots

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod commands;
mod config;
mod output;
mod remote;

use commands::{deploy, inspect, schedule};
use config::SdpConfig;

/// SDP CLI application
#[derive(Parser)]
#[command(name = "sdp")]
#[command(about = "SDP - Safe Deployment Pipeline", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SDP_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overrides logging.level)
    #[arg(long, env = "SDP_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "SDP_LOG_JSON")]
    json_logs: bool,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    output: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Check a target against the block list, allow-list and windows
    CheckTarget(inspect::CheckTargetArgs),

    /// Run the risk scanner over artifact files
    Scan(inspect::ScanArgs),

    /// Deploy artifacts to a target now
    Deploy(deploy::DeployArgs),

    /// Restore a target from a snapshot
    Restore(deploy::RestoreArgs),

    /// Schedule a deployment for later
    Schedule(schedule::ScheduleArgs),

    /// Cancel a scheduled deployment
    Cancel(schedule::CancelArgs),

    /// List scheduled deployments
    #[command(alias = "ls")]
    List(schedule::ListArgs),

    /// Serve scheduled deployments until interrupted
    Run(schedule::RunArgs),

    /// Show deployment history
    History(inspect::HistoryArgs),

    /// Show deployment windows
    Windows(inspect::WindowsArgs),

    /// Submit change proposals to the quality gate
    Review(inspect::ReviewArgs),

    /// Show circuit breaker status derived from history
    Breaker,

    /// Show effective configuration
    Config,
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_string().into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = SdpConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level, cli.json_logs || config.logging.json);

    let format = cli.output;
    match cli.command {
        Commands::CheckTarget(args) => inspect::check_target(args, &config, format).await,
        Commands::Scan(args) => inspect::scan(args, &config, format).await,
        Commands::Deploy(args) => deploy::deploy(args, &config, format).await,
        Commands::Restore(args) => deploy::restore(args, &config, format).await,
        Commands::Schedule(args) => schedule::schedule(args, &config, format).await,
        Commands::Cancel(args) => schedule::cancel(args, &config, format).await,
        Commands::List(args) => schedule::list(args, &config, format).await,
        Commands::Run(args) => schedule::run(args, &config).await,
        Commands::History(args) => inspect::history(args, &config, format).await,
        Commands::Windows(args) => inspect::windows(args, &config, format).await,
        Commands::Review(args) => inspect::review(args, &config, format).await,
        Commands::Breaker => inspect::breaker(&config, format).await,
        Commands::Config => output::print_single(&config),
    }
}
