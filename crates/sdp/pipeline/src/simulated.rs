//! Simulated remote deployer for tests and demos.
//!
//! Pushes write straight into an [`InMemoryTargets`], so a snapshot
//! manager over the same targets can observe and undo them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sdp_snapshot::InMemoryTargets;

use crate::package::DeploymentPackage;
use crate::remote::{PushReceipt, RemoteDeployer, RemoteError, RemoteValidation, VerificationReport};

/// How a simulated push behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushBehavior {
    Succeed,
    /// Nothing is written; the push reports failure.
    Reject,
    /// Artifacts are written, then the call errors.
    FailAfterWrite,
    /// Never returns.
    Hang,
}

#[derive(Debug, Clone)]
struct Behavior {
    push: PushBehavior,
    verification_passes: bool,
    validation_errors: Vec<String>,
    delay: Option<Duration>,
}

/// A remote deployer backed by in-memory targets.
pub struct SimulatedRemoteDeployer {
    targets: Arc<InMemoryTargets>,
    behavior: Mutex<Behavior>,
    pushes: AtomicUsize,
    verifications: AtomicUsize,
}

impl SimulatedRemoteDeployer {
    /// Pushes and verifications succeed.
    pub fn healthy(targets: Arc<InMemoryTargets>) -> Self {
        Self {
            targets,
            behavior: Mutex::new(Behavior {
                push: PushBehavior::Succeed,
                verification_passes: true,
                validation_errors: Vec::new(),
                delay: None,
            }),
            pushes: AtomicUsize::new(0),
            verifications: AtomicUsize::new(0),
        }
    }

    /// Pushes succeed, verification fails.
    pub fn failing_verification(targets: Arc<InMemoryTargets>) -> Self {
        let deployer = Self::healthy(targets);
        deployer.set_verification_passes(false);
        deployer
    }

    pub fn with_push(self, push: PushBehavior) -> Self {
        self.set_push(push);
        self
    }

    pub fn with_validation_errors(self, errors: Vec<String>) -> Self {
        self.behavior.lock().validation_errors = errors;
        self
    }

    /// Delay every call, to exercise timeouts and concurrency.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.behavior.lock().delay = Some(delay);
        self
    }

    pub fn set_push(&self, push: PushBehavior) {
        self.behavior.lock().push = push;
    }

    pub fn set_verification_passes(&self, passes: bool) {
        self.behavior.lock().verification_passes = passes;
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    pub fn verification_count(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }

    fn behavior(&self) -> Behavior {
        self.behavior.lock().clone()
    }
}

#[async_trait]
impl RemoteDeployer for SimulatedRemoteDeployer {
    async fn validate(
        &self,
        _package: &DeploymentPackage,
        _target: &str,
    ) -> Result<RemoteValidation, RemoteError> {
        Ok(RemoteValidation {
            errors: self.behavior().validation_errors,
        })
    }

    async fn push(
        &self,
        package: &DeploymentPackage,
        target: &str,
    ) -> Result<PushReceipt, RemoteError> {
        let behavior = self.behavior();
        self.pushes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = behavior.delay {
            tokio::time::sleep(delay).await;
        }

        match behavior.push {
            PushBehavior::Succeed => {
                self.targets.apply_artifacts(target, &package.artifacts);
                Ok(PushReceipt {
                    success: true,
                    remote_id: Some(format!("sim-{}", package.deployment_id)),
                    message: format!("Deployed {} artifacts", package.len()),
                    payload: serde_json::json!({
                        "status": 0,
                        "checksum": package.checksum,
                        "components": package.len(),
                    }),
                })
            }
            PushBehavior::Reject => Ok(PushReceipt {
                success: false,
                remote_id: None,
                message: "Simulated push rejection".into(),
                payload: serde_json::json!({"status": 1}),
            }),
            PushBehavior::FailAfterWrite => {
                self.targets.apply_artifacts(target, &package.artifacts);
                Err(RemoteError::Call("connection reset mid-push".into()))
            }
            PushBehavior::Hang => std::future::pending().await,
        }
    }

    async fn run_verification(
        &self,
        _target: &str,
        affected: &[String],
    ) -> Result<VerificationReport, RemoteError> {
        let behavior = self.behavior();
        self.verifications.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = behavior.delay {
            tokio::time::sleep(delay).await;
        }

        let tests_run = affected.len().max(1) as u32;
        if behavior.verification_passes {
            Ok(VerificationReport {
                passed: true,
                tests_run,
                failures: 0,
                details: Vec::new(),
            })
        } else {
            Ok(VerificationReport {
                passed: false,
                tests_run,
                failures: 1,
                details: vec!["Simulated test failure".into()],
            })
        }
    }

    fn name(&self) -> &str {
        "simulated-remote-deployer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdp_types::{Artifact, ArtifactSet, DeploymentId};

    fn package() -> DeploymentPackage {
        DeploymentPackage::build(
            DeploymentId::generate(),
            ArtifactSet::new().with(Artifact::source("A.cls", "v2")),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn healthy_push_writes_target() {
        let targets = Arc::new(InMemoryTargets::new());
        let deployer = SimulatedRemoteDeployer::healthy(targets.clone());
        let receipt = deployer.push(&package(), "dev-1").await.unwrap();
        assert!(receipt.success);
        assert_eq!(targets.read("dev-1", "A.cls").as_deref(), Some("v2"));
        assert_eq!(deployer.push_count(), 1);
    }

    #[tokio::test]
    async fn rejected_push_writes_nothing() {
        let targets = Arc::new(InMemoryTargets::new());
        let deployer =
            SimulatedRemoteDeployer::healthy(targets.clone()).with_push(PushBehavior::Reject);
        let receipt = deployer.push(&package(), "dev-1").await.unwrap();
        assert!(!receipt.success);
        assert!(targets.contents("dev-1").is_empty());
    }

    #[tokio::test]
    async fn partial_push_writes_then_errors() {
        let targets = Arc::new(InMemoryTargets::new());
        let deployer = SimulatedRemoteDeployer::healthy(targets.clone())
            .with_push(PushBehavior::FailAfterWrite);
        assert!(deployer.push(&package(), "dev-1").await.is_err());
        assert_eq!(targets.read("dev-1", "A.cls").as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn failing_verification() {
        let deployer =
            SimulatedRemoteDeployer::failing_verification(Arc::new(InMemoryTargets::new()));
        let report = deployer
            .run_verification("dev-1", &["A.cls".into()])
            .await
            .unwrap();
        assert!(!report.passed);
        assert_eq!(deployer.verification_count(), 1);
    }
}
