//! Deployable artifacts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an artifact is executable source or descriptive metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Source,
    Metadata,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Source => write!(f, "source"),
            ArtifactKind::Metadata => write!(f, "metadata"),
        }
    }
}

/// A single named artifact. The content is opaque to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub content: String,
}

impl Artifact {
    pub fn source(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ArtifactKind::Source,
            content: content.into(),
        }
    }

    pub fn metadata(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ArtifactKind::Metadata,
            content: content.into(),
        }
    }
}

/// The artifacts one deployment request carries.
///
/// Names are unique within a set; inserting an artifact with an existing
/// name replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    artifacts: Vec<Artifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact, replacing any existing artifact with the same name.
    pub fn insert(&mut self, artifact: Artifact) {
        match self.artifacts.iter_mut().find(|a| a.name == artifact.name) {
            Some(existing) => *existing = artifact,
            None => self.artifacts.push(artifact),
        }
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with(mut self, artifact: Artifact) -> Self {
        self.insert(artifact);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    /// Replace the content of a named artifact. Returns false if absent.
    pub fn replace_content(&mut self, name: &str, content: impl Into<String>) -> bool {
        match self.artifacts.iter_mut().find(|a| a.name == name) {
            Some(artifact) => {
                artifact.content = content.into();
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }

    pub fn sources(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts
            .iter()
            .filter(|a| a.kind == ArtifactKind::Source)
    }

    pub fn metadata(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts
            .iter()
            .filter(|a| a.kind == ArtifactKind::Metadata)
    }

    /// Names of every artifact, in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.artifacts.iter().map(|a| a.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl FromIterator<Artifact> for ArtifactSet {
    fn from_iter<I: IntoIterator<Item = Artifact>>(iter: I) -> Self {
        let mut set = ArtifactSet::new();
        for artifact in iter {
            set.insert(artifact);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_by_name() {
        let set = ArtifactSet::new()
            .with(Artifact::source("AccountService.cls", "v1"))
            .with(Artifact::source("AccountService.cls", "v2"));

        assert_eq!(set.len(), 1);
        assert_eq!(set.get("AccountService.cls").unwrap().content, "v2");
    }

    #[test]
    fn kinds_are_partitioned() {
        let set: ArtifactSet = vec![
            Artifact::source("A.cls", "class A {}"),
            Artifact::metadata("A.cls-meta.xml", "<ApexClass/>"),
            Artifact::source("B.cls", "class B {}"),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.sources().count(), 2);
        assert_eq!(set.metadata().count(), 1);
        assert_eq!(set.names(), vec!["A.cls", "A.cls-meta.xml", "B.cls"]);
    }

    #[test]
    fn replace_content_reports_missing() {
        let mut set = ArtifactSet::new().with(Artifact::source("A.cls", "old"));
        assert!(set.replace_content("A.cls", "new"));
        assert!(!set.replace_content("Missing.cls", "new"));
        assert_eq!(set.get("A.cls").unwrap().content, "new");
    }
}
