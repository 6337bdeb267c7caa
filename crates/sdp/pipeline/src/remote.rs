//! The remote platform collaborator.
//!
//! A `RemoteDeployer` performs the platform-specific work: validating a
//! package, pushing it to a target, and running the target's tests.

use async_trait::async_trait;
use sdp_types::VerificationSummary;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::package::DeploymentPackage;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote call failed: {0}")]
    Call(String),

    #[error("Malformed remote response: {0}")]
    Malformed(String),
}

/// Result of the remote collaborator's own package validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteValidation {
    pub errors: Vec<String>,
}

impl RemoteValidation {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// What the remote push reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushReceipt {
    pub success: bool,
    /// Platform-side identifier of the push, when one was assigned.
    pub remote_id: Option<String>,
    pub message: String,
    /// Raw collaborator payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Outcome of a post-push test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub passed: bool,
    pub tests_run: u32,
    pub failures: u32,
    #[serde(default)]
    pub details: Vec<String>,
}

impl From<VerificationReport> for VerificationSummary {
    fn from(report: VerificationReport) -> Self {
        VerificationSummary {
            passed: report.passed,
            tests_run: report.tests_run,
            failures: report.failures,
            details: report.details,
        }
    }
}

#[async_trait]
pub trait RemoteDeployer: Send + Sync {
    /// Platform-side syntax/package validation. No mutation.
    async fn validate(
        &self,
        _package: &DeploymentPackage,
        _target: &str,
    ) -> Result<RemoteValidation, RemoteError> {
        Ok(RemoteValidation::ok())
    }

    async fn push(
        &self,
        package: &DeploymentPackage,
        target: &str,
    ) -> Result<PushReceipt, RemoteError>;

    /// Run the target's tests for the affected artifacts.
    async fn run_verification(
        &self,
        target: &str,
        affected: &[String],
    ) -> Result<VerificationReport, RemoteError>;

    fn name(&self) -> &str;
}
