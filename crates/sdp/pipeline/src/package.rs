//! Deployment packages: the exact artifact set pushed to a target.

use sdp_types::{ArtifactKind, ArtifactSet, DeploymentId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackageError {
    #[error("Nothing to deploy: the artifact set is empty")]
    Empty,
}

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub kind: ArtifactKind,
    pub name: String,
    pub bytes: usize,
}

/// Artifacts plus a manifest grouped by kind and a content checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentPackage {
    pub deployment_id: DeploymentId,
    pub artifacts: ArtifactSet,
    pub manifest: Vec<ManifestEntry>,
    /// Hex SHA-256 over every artifact's kind, name and content, in
    /// manifest order.
    pub checksum: String,
}

impl DeploymentPackage {
    pub fn build(deployment_id: DeploymentId, artifacts: ArtifactSet) -> Result<Self, PackageError> {
        if artifacts.is_empty() {
            return Err(PackageError::Empty);
        }

        let mut manifest: Vec<ManifestEntry> = artifacts
            .iter()
            .map(|a| ManifestEntry {
                kind: a.kind,
                name: a.name.clone(),
                bytes: a.content.len(),
            })
            .collect();
        manifest.sort();

        let mut hasher = Sha256::new();
        for entry in &manifest {
            let content = artifacts
                .get(&entry.name)
                .map(|a| a.content.as_str())
                .unwrap_or_default();
            hasher.update(kind_tag(entry.kind));
            hasher.update([0u8]);
            hasher.update(entry.name.as_bytes());
            hasher.update([0u8]);
            hasher.update((content.len() as u64).to_be_bytes());
            hasher.update(content.as_bytes());
        }
        let checksum = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();

        Ok(Self {
            deployment_id,
            artifacts,
            manifest,
            checksum,
        })
    }

    pub fn members(&self, kind: ArtifactKind) -> impl Iterator<Item = &str> {
        self.manifest
            .iter()
            .filter(move |e| e.kind == kind)
            .map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }
}

fn kind_tag(kind: ArtifactKind) -> &'static [u8] {
    match kind {
        ArtifactKind::Source => b"source",
        ArtifactKind::Metadata => b"metadata",
    }
}
