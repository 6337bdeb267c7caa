//! Simulated target environments.
//!
//! `InMemoryTargets` stands in for the remote platform in tests and
//! demos: it implements both state traits, and deployers can write to it
//! directly to emulate a push.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use sdp_types::{Artifact, ArtifactKind, ArtifactSet, CapturedArtifact};

use crate::error::{Result, SnapshotError};
use crate::state::{TargetStateReader, TargetStateWriter};

type TargetContents = BTreeMap<String, (ArtifactKind, String)>;

#[derive(Debug, Default)]
pub struct InMemoryTargets {
    targets: DashMap<String, TargetContents>,
    fail_captures: AtomicBool,
    fail_restores: AtomicBool,
}

impl InMemoryTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put artifacts on a target without going through a deployment.
    pub fn seed(&self, target: &str, artifacts: impl IntoIterator<Item = Artifact>) {
        let mut entry = self.targets.entry(target.to_string()).or_default();
        for artifact in artifacts {
            entry.insert(artifact.name, (artifact.kind, artifact.content));
        }
    }

    /// Overwrite artifacts on a target, as a push would.
    pub fn apply_artifacts(&self, target: &str, artifacts: &ArtifactSet) {
        let mut entry = self.targets.entry(target.to_string()).or_default();
        for artifact in artifacts.iter() {
            entry.insert(
                artifact.name.clone(),
                (artifact.kind, artifact.content.clone()),
            );
        }
    }

    pub fn read(&self, target: &str, name: &str) -> Option<String> {
        self.targets
            .get(target)
            .and_then(|t| t.get(name).map(|(_, content)| content.clone()))
    }

    /// Full contents of a target, name -> content.
    pub fn contents(&self, target: &str) -> BTreeMap<String, String> {
        self.targets
            .get(target)
            .map(|t| {
                t.iter()
                    .map(|(name, (_, content))| (name.clone(), content.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn fail_captures(&self, fail: bool) {
        self.fail_captures.store(fail, Ordering::SeqCst);
    }

    pub fn fail_restores(&self, fail: bool) {
        self.fail_restores.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TargetStateReader for InMemoryTargets {
    async fn fetch(&self, target: &str, artifacts: &ArtifactSet) -> Result<Vec<CapturedArtifact>> {
        if self.fail_captures.load(Ordering::SeqCst) {
            return Err(SnapshotError::Capture {
                target: target.to_string(),
                reason: "simulated retrieve failure".into(),
            });
        }
        let existing = self.targets.get(target);
        Ok(artifacts
            .iter()
            .map(|artifact| CapturedArtifact {
                name: artifact.name.clone(),
                kind: artifact.kind,
                content: existing
                    .as_ref()
                    .and_then(|t| t.get(&artifact.name).map(|(_, c)| c.clone())),
            })
            .collect())
    }
}

#[async_trait]
impl TargetStateWriter for InMemoryTargets {
    async fn apply(&self, target: &str, artifacts: &[CapturedArtifact]) -> Result<()> {
        if self.fail_restores.load(Ordering::SeqCst) {
            return Err(SnapshotError::Storage("simulated restore failure".into()));
        }
        let mut entry = self.targets.entry(target.to_string()).or_default();
        for artifact in artifacts {
            match &artifact.content {
                Some(content) => {
                    entry.insert(artifact.name.clone(), (artifact.kind, content.clone()));
                }
                None => {
                    entry.remove(&artifact.name);
                }
            }
        }
        Ok(())
    }
}
