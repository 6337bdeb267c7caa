//! Deployment requests.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::artifact::ArtifactSet;

/// Per-request switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentOptions {
    /// Do not capture a snapshot. A post-push failure is then unrecoverable.
    pub skip_snapshot: bool,

    /// Skip static validation (risk scan and remote validation).
    pub skip_validation: bool,

    /// Skip post-push verification.
    pub skip_tests: bool,

    /// Deploy even when the target's window is closed.
    pub force_outside_window: bool,

    /// Skip the quality gate even when a proposal is attached.
    pub bypass_quality_gate: bool,
}

/// Risk the author attributes to a proposed change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// An automatically authored change that must pass the quality gate.
///
/// `artifact` names the artifact in the request whose content is the
/// proposed code; `original_code` is what it replaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeProposal {
    pub artifact: String,
    pub original_code: String,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub coverage_pct: Option<f64>,
    #[serde(default)]
    pub risk_level: RiskLevel,
}

/// A request to deploy artifacts to one target.
///
/// Requests are immutable once submitted; the pipeline works on its own
/// copy of the artifacts when a quality-gate refinement replaces code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub artifacts: ArtifactSet,
    pub target: String,
    #[serde(default)]
    pub options: DeploymentOptions,
    #[serde(default)]
    pub proposal: Option<ChangeProposal>,
}

impl DeploymentRequest {
    pub fn new(artifacts: ArtifactSet, target: impl Into<String>) -> Self {
        Self {
            artifacts,
            target: target.into(),
            options: DeploymentOptions::default(),
            proposal: None,
        }
    }

    pub fn with_options(mut self, options: DeploymentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_proposal(mut self, proposal: ChangeProposal) -> Self {
        self.proposal = Some(proposal);
        self
    }
}
