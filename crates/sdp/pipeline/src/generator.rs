//! The code-generation collaborator.

use async_trait::async_trait;
use sdp_types::{ArtifactSet, ChangeProposal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct GenerationError(pub String);

/// What to generate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTask {
    pub description: String,
    /// Free-form context for the generator (existing code, schema, ...).
    #[serde(default)]
    pub context: serde_json::Value,
}

impl GenerationTask {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            context: serde_json::Value::Null,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

/// Generated artifacts, with a proposal when the change rewrites existing
/// code and should pass the quality gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedChange {
    pub artifacts: ArtifactSet,
    pub proposal: Option<ChangeProposal>,
}

#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, task: &GenerationTask) -> Result<GeneratedChange, GenerationError>;
}
