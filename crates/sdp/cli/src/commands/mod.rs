//! Operator commands.

pub mod deploy;
pub mod inspect;
pub mod schedule;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Args;
use sdp_types::{
    Artifact, ArtifactKind, ArtifactSet, ChangeProposal, DeploymentOptions, DeploymentRequest,
};

/// What to deploy and how; shared by `deploy` and `schedule`.
#[derive(Debug, Args)]
pub struct RequestArgs {
    /// Target environment
    #[arg(short, long)]
    pub target: String,

    /// Source artifacts (one file each; the file name is the artifact name)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Metadata artifacts
    #[arg(long = "metadata", value_name = "FILE")]
    pub metadata: Vec<PathBuf>,

    /// Change proposal (JSON) for reviewed, AI-authored changes
    #[arg(long, value_name = "FILE")]
    pub proposal: Option<PathBuf>,

    /// Deploy without a pre-deploy snapshot (no rollback possible)
    #[arg(long)]
    pub skip_snapshot: bool,

    /// Skip static and remote validation
    #[arg(long)]
    pub skip_validation: bool,

    /// Skip post-push verification
    #[arg(long)]
    pub skip_tests: bool,

    /// Ignore the target's deployment window
    #[arg(long)]
    pub force: bool,

    /// Deploy a proposal without quality-gate review
    #[arg(long)]
    pub bypass_quality_gate: bool,
}

impl RequestArgs {
    pub async fn into_request(self) -> anyhow::Result<DeploymentRequest> {
        let artifacts = load_artifacts(&self.files, &self.metadata).await?;
        let options = DeploymentOptions {
            skip_snapshot: self.skip_snapshot,
            skip_validation: self.skip_validation,
            skip_tests: self.skip_tests,
            force_outside_window: self.force,
            bypass_quality_gate: self.bypass_quality_gate,
        };
        let mut request = DeploymentRequest::new(artifacts, self.target).with_options(options);
        if let Some(path) = &self.proposal {
            let proposal: ChangeProposal = read_json(path).await?;
            if request.artifacts.get(&proposal.artifact).is_none() {
                bail!(
                    "proposal refers to '{}', which is not among the artifacts",
                    proposal.artifact
                );
            }
            request = request.with_proposal(proposal);
        }
        Ok(request)
    }
}

/// Read artifact files; the file name becomes the artifact name.
pub async fn load_artifacts(sources: &[PathBuf], metadata: &[PathBuf]) -> anyhow::Result<ArtifactSet> {
    let mut set = ArtifactSet::new();
    for (paths, kind) in [(sources, ArtifactKind::Source), (metadata, ArtifactKind::Metadata)] {
        for path in paths {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("invalid artifact path {}", path.display()))?;
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            set.insert(Artifact {
                name: name.to_string(),
                kind,
                content,
            });
        }
    }
    Ok(set)
}

pub async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}
