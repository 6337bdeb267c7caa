//! Wiring of the pipeline and scheduler from configuration.

use std::sync::Arc;

use anyhow::Context;
use sdp_guard::PatternRiskScanner;
use sdp_pipeline::{
    DeploymentHistory, DeploymentPipeline, FileDeploymentHistory, RemoteDeployer,
    SimulatedRemoteDeployer, StaticTargetMetadata,
};
use sdp_quality_gate::{CommandReviewer, QualityGate};
use sdp_scheduler::{DeploymentScheduler, FileScheduleStore};
use sdp_snapshot::{
    FileSnapshotStorage, InMemoryTargets, SnapshotManager, TargetStateReader, TargetStateWriter,
};
use tracing::{debug, info};

use crate::config::{RemoteMode, SdpConfig};
use crate::remote::{CommandRemoteDeployer, CommandTargetState};

type Collaborators = (
    Arc<dyn RemoteDeployer>,
    Arc<dyn TargetStateReader>,
    Arc<dyn TargetStateWriter>,
);

fn collaborators(config: &SdpConfig) -> anyhow::Result<Collaborators> {
    match config.remote.mode {
        RemoteMode::Simulated => {
            info!("Using simulated targets; nothing leaves this process");
            let targets = Arc::new(InMemoryTargets::new());
            Ok((
                Arc::new(SimulatedRemoteDeployer::healthy(targets.clone())),
                targets.clone(),
                targets,
            ))
        }
        RemoteMode::Command => {
            let deployer = CommandRemoteDeployer::from_config(&config.remote)
                .context("remote.program and remote.push_args must be configured")?;
            let state = Arc::new(
                CommandTargetState::from_config(&config.remote)
                    .context("remote.retrieve_args must be configured to take snapshots")?,
            );
            Ok((Arc::new(deployer), state.clone(), state))
        }
    }
}

/// Open the deployment history under the configured data directory.
pub async fn open_history(config: &SdpConfig) -> anyhow::Result<Arc<FileDeploymentHistory>> {
    let path = config.storage.history_path();
    let history = FileDeploymentHistory::new(&path)
        .await
        .with_context(|| format!("failed to open history at {}", path.display()))?;
    Ok(Arc::new(history))
}

/// Open the schedule store under the configured data directory.
pub async fn open_schedule_store(config: &SdpConfig) -> anyhow::Result<Arc<FileScheduleStore>> {
    let path = config.storage.schedule_path();
    let store = FileScheduleStore::open(&path)
        .await
        .with_context(|| format!("failed to open schedules at {}", path.display()))?;
    Ok(Arc::new(store))
}

pub async fn build_pipeline(config: &SdpConfig) -> anyhow::Result<Arc<DeploymentPipeline>> {
    let (deployer, reader, writer) = collaborators(config)?;

    let snapshot_dir = config.storage.snapshot_dir();
    let snapshot_storage = FileSnapshotStorage::new(&snapshot_dir)
        .await
        .with_context(|| format!("failed to open snapshots at {}", snapshot_dir.display()))?;
    let history: Arc<dyn DeploymentHistory> = open_history(config).await?;

    let mut builder = DeploymentPipeline::builder()
        .config(config.pipeline.clone())
        .target_policy(config.targets.policy())
        .breaker_config(config.circuit_breaker.clone())
        .windows(config.windows.clone())
        .metadata(Arc::new(StaticTargetMetadata::from_map(
            config.targets.classes.clone(),
        )))
        .risk_scanner(Arc::new(
            PatternRiskScanner::new(config.risk.clone()).context("invalid risk configuration")?,
        ))
        .snapshots(Arc::new(SnapshotManager::new(
            reader,
            writer,
            Arc::new(snapshot_storage),
        )))
        .deployer(deployer)
        .history(history);

    if let Some(program) = &config.quality_gate.command {
        debug!(program = %program, "Quality gate enabled");
        let reviewer = CommandReviewer::new(
            program.clone(),
            config.quality_gate.args.clone(),
            std::time::Duration::from_secs(config.quality_gate.timeout_secs),
        );
        builder = builder.quality_gate(Arc::new(QualityGate::new(
            Arc::new(reviewer),
            &config.quality_gate,
        )));
    }

    let pipeline = builder.build().context("invalid pipeline configuration")?;
    Ok(Arc::new(pipeline))
}

pub async fn build_scheduler(config: &SdpConfig) -> anyhow::Result<Arc<DeploymentScheduler>> {
    let pipeline = build_pipeline(config).await?;
    let store = open_schedule_store(config).await?;
    DeploymentScheduler::new(pipeline, store, config.scheduler.clone())
        .context("invalid scheduler configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    fn simulated(dir: &tempfile::TempDir) -> SdpConfig {
        let mut config = SdpConfig::default();
        config.remote.mode = RemoteMode::Simulated;
        config.targets.allowed = vec!["dev-sandbox".to_string()];
        config.storage = StorageConfig {
            data_dir: Some(dir.path().to_path_buf()),
        };
        config
    }

    #[tokio::test]
    async fn command_mode_requires_a_program() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = simulated(&dir);
        config.remote.mode = RemoteMode::Command;
        let Err(err) = build_pipeline(&config).await else {
            panic!("expected build_pipeline to fail");
        };
        assert!(err.to_string().contains("remote.program"));
    }

    #[tokio::test]
    async fn allowlisted_production_name_is_a_configuration_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = simulated(&dir);
        config.targets.allowed.push("prod-eu".to_string());
        assert!(build_pipeline(&config).await.is_err());
    }

    #[tokio::test]
    async fn simulated_pipeline_records_history_on_disk() {
        use sdp_types::{Artifact, ArtifactSet, DeploymentRequest};

        let dir = tempfile::TempDir::new().unwrap();
        let mut config = simulated(&dir);
        config.windows = sdp_guard::DeploymentWindows::always_open();

        let pipeline = build_pipeline(&config).await.unwrap();
        let record = pipeline
            .deploy(&DeploymentRequest::new(
                ArtifactSet::new().with(Artifact::source("A.cls", "class A {}")),
                "dev-sandbox",
            ))
            .await
            .unwrap();
        assert!(record.is_success());

        let history = open_history(&config).await.unwrap();
        assert_eq!(history.list().await.unwrap().len(), 1);
        assert!(config.storage.snapshot_dir().exists());
    }
}
