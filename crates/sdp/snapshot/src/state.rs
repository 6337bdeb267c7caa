//! Access to the live state of a target.
//!
//! The reader and writer are implemented by whatever talks to the remote
//! platform; the snapshot manager never knows how.

use async_trait::async_trait;
use sdp_types::{ArtifactSet, CapturedArtifact};

use crate::error::Result;

/// Reads the current content of named artifacts from a target.
#[async_trait]
pub trait TargetStateReader: Send + Sync {
    /// Return one entry per artifact in `artifacts`, in the same order.
    /// Artifacts that do not exist on the target have `content: None`.
    async fn fetch(&self, target: &str, artifacts: &ArtifactSet) -> Result<Vec<CapturedArtifact>>;
}

/// Writes captured state back onto a target.
#[async_trait]
pub trait TargetStateWriter: Send + Sync {
    /// Make every listed artifact match its captured content, deleting
    /// those captured as absent.
    async fn apply(&self, target: &str, artifacts: &[CapturedArtifact]) -> Result<()>;
}
