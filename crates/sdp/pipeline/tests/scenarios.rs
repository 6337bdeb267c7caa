//! End-to-end pipeline behaviour against simulated collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeZone;
use sdp_guard::{
    CircuitBreakerConfig, DeploymentWindow, DeploymentWindows, TargetPolicyConfig,
};
use sdp_pipeline::{
    CodeGenerator, DeployError, DeploymentEvent, DeploymentHistory, DeploymentPackage, DeploymentPipeline,
    GeneratedChange, GenerationError, GenerationTask, InMemoryDeploymentHistory, PipelineConfig,
    PushBehavior, PushReceipt, RemoteDeployer, RemoteError, SimulatedRemoteDeployer,
    StaticTargetMetadata, VerificationReport,
};
use sdp_quality_gate::{QualityGate, QualityGateConfig, ScriptedReviewer};
use sdp_snapshot::{InMemorySnapshotStorage, InMemoryTargets, SnapshotManager, SnapshotStorage};
use sdp_types::{
    Artifact, ArtifactSet, ChangeProposal, DeploymentOptions, DeploymentOutcome,
    DeploymentRequest, EnvironmentClass, FailureKind, ManualClock, PipelineStage, RiskLevel,
    RollbackStatus, Severity,
};

const SANDBOX: &str = "dev-sandbox";

struct Harness {
    pipeline: DeploymentPipeline,
    targets: Arc<InMemoryTargets>,
    storage: Arc<InMemorySnapshotStorage>,
    deployer: Arc<SimulatedRemoteDeployer>,
    history: Arc<InMemoryDeploymentHistory>,
    clock: Arc<ManualClock>,
}

fn harness_with(
    deployer: impl FnOnce(Arc<InMemoryTargets>) -> SimulatedRemoteDeployer,
    customize: impl FnOnce(sdp_pipeline::PipelineBuilder) -> sdp_pipeline::PipelineBuilder,
) -> Harness {
    let targets = Arc::new(InMemoryTargets::new());
    targets.seed(SANDBOX, [Artifact::source("AccountService.cls", "class AccountService { /* v1 */ }")]);

    let storage = Arc::new(InMemorySnapshotStorage::new());
    let snapshots = Arc::new(SnapshotManager::new(
        targets.clone(),
        targets.clone(),
        storage.clone(),
    ));
    let deployer = Arc::new(deployer(targets.clone()));
    let history = Arc::new(InMemoryDeploymentHistory::new());
    let clock = Arc::new(ManualClock::default());

    let builder = DeploymentPipeline::builder()
        .target_policy(TargetPolicyConfig::allow([SANDBOX, "uat-sandbox"]))
        .breaker_config(CircuitBreakerConfig {
            failure_threshold: 3,
            reset_timeout_secs: 300,
        })
        .windows(DeploymentWindows::always_open())
        .snapshots(snapshots)
        .deployer(deployer.clone())
        .history(history.clone())
        .clock(clock.clone());

    let pipeline = customize(builder).build().unwrap();
    Harness {
        pipeline,
        targets,
        storage,
        deployer,
        history,
        clock,
    }
}

fn harness(deployer: impl FnOnce(Arc<InMemoryTargets>) -> SimulatedRemoteDeployer) -> Harness {
    harness_with(deployer, |b| b)
}

fn update_request() -> DeploymentRequest {
    DeploymentRequest::new(
        ArtifactSet::new()
            .with(Artifact::source(
                "AccountService.cls",
                "class AccountService { /* v2 */ }",
            ))
            .with(Artifact::source("AccountHelper.cls", "class AccountHelper {}")),
        SANDBOX,
    )
}

// ── Scenario A: production target ─────────────────────────────────────

#[tokio::test]
async fn production_target_is_blocked_before_any_stage() {
    let h = harness(SimulatedRemoteDeployer::healthy);
    let mut request = update_request();
    request.target = "production".into();

    let err = h.pipeline.deploy(&request).await.unwrap_err();
    assert!(matches!(err, DeployError::BlockedTarget { .. }));
    assert_eq!(h.storage.len().await, 0);
    assert_eq!(h.deployer.push_count(), 0);
    assert!(h.history.is_empty());
    assert_eq!(h.pipeline.breaker().state().failure_count, 0);
}

#[tokio::test]
async fn production_target_is_blocked_on_a_weekday_with_default_windows() {
    let h = harness_with(SimulatedRemoteDeployer::healthy, |b| {
        b.windows(DeploymentWindows::default())
    });
    // Monday, outside the default production window
    h.clock
        .set(chrono::Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap());

    let mut request = update_request();
    request.target = "production".into();
    let err = h.pipeline.deploy(&request).await.unwrap_err();
    assert!(matches!(err, DeployError::BlockedTarget { .. }), "{err}");
    assert_eq!(h.storage.len().await, 0);
    assert!(h.history.is_empty());
}

#[tokio::test]
async fn blocked_target_wins_over_open_breaker() {
    let h = harness(SimulatedRemoteDeployer::healthy);
    for _ in 0..3 {
        h.pipeline.breaker().record_failure();
    }
    assert!(h.pipeline.breaker().is_open());

    let mut request = update_request();
    request.target = "prod-eu".into();
    let err = h.pipeline.deploy(&request).await.unwrap_err();
    assert!(matches!(err, DeployError::BlockedTarget { .. }), "{err}");
    assert_eq!(h.pipeline.breaker().state().failure_count, 3);
}

#[tokio::test]
async fn production_indicators_match_case_insensitively() {
    let h = harness(SimulatedRemoteDeployer::healthy);
    for target in ["Prod-Copy", "my-LIVE-org", "main"] {
        let mut request = update_request();
        request.target = target.into();
        request.options.force_outside_window = true;
        let err = h.pipeline.deploy(&request).await.unwrap_err();
        assert!(matches!(err, DeployError::BlockedTarget { .. }), "{}", target);
    }
}

// ── Scenario B: blocking risk finding ─────────────────────────────────

#[tokio::test]
async fn mutation_in_loop_aborts_before_push() {
    let h = harness(SimulatedRemoteDeployer::healthy);
    let before = h.targets.contents(SANDBOX);
    let request = DeploymentRequest::new(
        ArtifactSet::new().with(Artifact::source(
            "AccountService.cls",
            "class AccountService {\n  void touch(List<Account> accounts) {\n    for (Account a : accounts) {\n      update a;\n    }\n  }\n}",
        )),
        SANDBOX,
    );

    let record = h.pipeline.deploy(&request).await.unwrap();
    assert_eq!(record.outcome, DeploymentOutcome::Failed);
    assert_eq!(record.failure_kind(), Some(FailureKind::ValidationFailed));
    assert_eq!(record.failure.as_ref().unwrap().stage, PipelineStage::StaticValidate);
    assert_eq!(record.rollback, RollbackStatus::NotNeeded);
    assert!(!record.stages_completed.contains(&PipelineStage::Push));

    assert_eq!(h.deployer.push_count(), 0);
    assert_eq!(h.targets.contents(SANDBOX), before);
    assert_eq!(h.pipeline.breaker().state().failure_count, 1);
    assert_eq!(record.severity(), Severity::Error);
}

#[tokio::test]
async fn remote_validation_errors_abort_before_push() {
    let h = harness(|t| {
        SimulatedRemoteDeployer::healthy(t)
            .with_validation_errors(vec!["AccountService.cls:3 unexpected token".into()])
    });
    let record = h.pipeline.deploy(&update_request()).await.unwrap();
    assert_eq!(record.failure_kind(), Some(FailureKind::ValidationFailed));
    assert!(record.failure.unwrap().message.contains("unexpected token"));
    assert_eq!(h.deployer.push_count(), 0);
}

// ── Scenario C: verification failure ──────────────────────────────────

#[tokio::test]
async fn verification_failure_rolls_back_to_captured_state() {
    let h = harness(SimulatedRemoteDeployer::failing_verification);
    let s0 = h.targets.contents(SANDBOX);

    let record = h.pipeline.deploy(&update_request()).await.unwrap();

    assert_eq!(record.outcome, DeploymentOutcome::RolledBack);
    assert_eq!(record.failure_kind(), Some(FailureKind::VerificationFailed));
    let snapshot_id = record.snapshot_id.unwrap();
    assert_eq!(record.rollback, RollbackStatus::Restored { snapshot_id });
    assert!(record.stages_completed.contains(&PipelineStage::Push));
    assert!(record.stages_completed.contains(&PipelineStage::Rollback));
    assert!(!record.stages_completed.contains(&PipelineStage::Verify));
    assert_eq!(record.verification.as_ref().map(|v| v.passed), Some(false));
    assert_eq!(record.severity(), Severity::Warning);

    // The helper did not exist before the push and is gone again.
    assert_eq!(h.targets.contents(SANDBOX), s0);
    assert_eq!(h.pipeline.breaker().state().failure_count, 1);
}

#[tokio::test]
async fn partial_push_failure_rolls_back() {
    let h = harness(|t| SimulatedRemoteDeployer::healthy(t).with_push(PushBehavior::FailAfterWrite));
    let s0 = h.targets.contents(SANDBOX);

    let record = h.pipeline.deploy(&update_request()).await.unwrap();
    assert_eq!(record.outcome, DeploymentOutcome::RolledBack);
    assert_eq!(record.failure_kind(), Some(FailureKind::PushFailed));
    assert_eq!(h.targets.contents(SANDBOX), s0);
}

#[tokio::test]
async fn failure_without_snapshot_is_critical() {
    let h = harness(SimulatedRemoteDeployer::failing_verification);
    let request = update_request().with_options(DeploymentOptions {
        skip_snapshot: true,
        ..Default::default()
    });

    let record = h.pipeline.deploy(&request).await.unwrap();
    assert_eq!(record.outcome, DeploymentOutcome::Failed);
    assert_eq!(record.rollback, RollbackStatus::Unavailable);
    assert_eq!(record.severity(), Severity::Critical);
    assert!(record.snapshot_id.is_none());
    assert_eq!(h.storage.len().await, 0);
    // Nothing undid the push.
    assert_eq!(
        h.targets.read(SANDBOX, "AccountHelper.cls").as_deref(),
        Some("class AccountHelper {}")
    );
}

#[tokio::test]
async fn failed_restore_is_fatal() {
    let h = harness(SimulatedRemoteDeployer::failing_verification);
    h.targets.fail_restores(true);

    let record = h.pipeline.deploy(&update_request()).await.unwrap();
    assert_eq!(record.outcome, DeploymentOutcome::Failed);
    assert_eq!(record.failure_kind(), Some(FailureKind::RollbackFailed));
    assert!(matches!(record.rollback, RollbackStatus::Failed { .. }));
    assert_eq!(record.severity(), Severity::Fatal);
    let message = &record.failure.as_ref().unwrap().message;
    assert!(message.contains("verification failed"), "{}", message);
}

#[tokio::test]
async fn snapshot_failure_aborts_before_push() {
    let h = harness(SimulatedRemoteDeployer::healthy);
    h.targets.fail_captures(true);

    let record = h.pipeline.deploy(&update_request()).await.unwrap();
    assert_eq!(record.failure_kind(), Some(FailureKind::SnapshotFailed));
    assert_eq!(h.deployer.push_count(), 0);
    assert_eq!(h.pipeline.breaker().state().failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn hung_push_times_out_and_rolls_back() {
    let h = harness_with(
        |t| SimulatedRemoteDeployer::healthy(t).with_push(PushBehavior::Hang),
        |b| {
            b.config(PipelineConfig {
                push_timeout_secs: 5,
                ..Default::default()
            })
        },
    );

    let record = h.pipeline.deploy(&update_request()).await.unwrap();
    assert_eq!(record.outcome, DeploymentOutcome::RolledBack);
    assert_eq!(record.failure_kind(), Some(FailureKind::PushFailed));
    assert!(record.failure.unwrap().message.contains("timed out"));
}

// ── Success path ──────────────────────────────────────────────────────

#[tokio::test]
async fn successful_deploy_records_snapshot_one_to_one() {
    let h = harness(SimulatedRemoteDeployer::healthy);
    h.pipeline.breaker().record_failure();

    let record = h.pipeline.deploy(&update_request()).await.unwrap();
    assert!(record.is_success());
    assert_eq!(record.severity(), Severity::Info);
    assert_eq!(
        record.stages_completed,
        vec![
            PipelineStage::TargetValidate,
            PipelineStage::BreakerCheck,
            PipelineStage::WindowCheck,
            PipelineStage::Snapshot,
            PipelineStage::Package,
            PipelineStage::StaticValidate,
            PipelineStage::Push,
            PipelineStage::Verify,
        ]
    );
    assert!(record.push_payload.is_some());
    assert_eq!(h.pipeline.breaker().state().failure_count, 0);

    let snapshots = h.storage.list(SANDBOX).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].deployment_id, record.id);
    assert_eq!(Some(snapshots[0].id), record.snapshot_id);

    assert_eq!(
        h.targets.read(SANDBOX, "AccountService.cls").as_deref(),
        Some("class AccountService { /* v2 */ }")
    );
    assert_eq!(h.history.len(), 1);
}

#[tokio::test]
async fn retries_produce_new_records() {
    let h = harness(SimulatedRemoteDeployer::failing_verification);
    let first = h.pipeline.deploy(&update_request()).await.unwrap();
    h.deployer.set_verification_passes(true);
    let second = h.pipeline.deploy(&update_request()).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_ne!(first.snapshot_id, second.snapshot_id);
    let records = h.history.list().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].outcome, DeploymentOutcome::RolledBack);
    assert_eq!(records[1].outcome, DeploymentOutcome::Succeeded);

    let summary = h.pipeline.summary().await.unwrap();
    assert_eq!(summary.rolled_back, 1);
    assert_eq!(summary.succeeded, 1);
}

// ── Circuit breaker ───────────────────────────────────────────────────

#[tokio::test]
async fn breaker_opens_after_threshold_and_resets_after_cooldown() {
    let h = harness(SimulatedRemoteDeployer::failing_verification);
    for _ in 0..3 {
        h.pipeline.deploy(&update_request()).await.unwrap();
    }
    let pushes = h.deployer.push_count();

    let err = h.pipeline.deploy(&update_request()).await.unwrap_err();
    assert!(matches!(err, DeployError::CircuitOpen { failures: 3, .. }));
    assert!(err.is_retryable());
    assert_eq!(h.deployer.push_count(), pushes);
    assert_eq!(h.history.len(), 3);

    h.clock.advance(chrono::Duration::seconds(300));
    h.deployer.set_verification_passes(true);
    let record = h.pipeline.deploy(&update_request()).await.unwrap();
    assert!(record.is_success());
    assert!(!h.pipeline.breaker().is_open());
}

// ── Quality gate ──────────────────────────────────────────────────────

fn proposal() -> ChangeProposal {
    ChangeProposal {
        artifact: "AccountService.cls".into(),
        original_code: "class AccountService { /* v1 */ }".into(),
        improvements: vec!["bulkified account updates".into()],
        coverage_pct: Some(82.0),
        risk_level: RiskLevel::Medium,
    }
}

fn gated(reviewer: ScriptedReviewer) -> Harness {
    harness_with(SimulatedRemoteDeployer::healthy, move |b| {
        b.quality_gate(Arc::new(QualityGate::new(
            Arc::new(reviewer),
            &QualityGateConfig::default(),
        )))
    })
}

#[tokio::test]
async fn quality_gate_rejection_is_terminal_and_spares_the_breaker() {
    let h = gated(ScriptedReviewer::new().respond(
        r#"{"approved": false, "reason": "changes behaviour of touch()", "changes": [], "final_code": null}"#,
    ));
    let before = h.targets.contents(SANDBOX);

    let record = h
        .pipeline
        .deploy(&update_request().with_proposal(proposal()))
        .await
        .unwrap();

    assert_eq!(record.outcome, DeploymentOutcome::Rejected);
    assert_eq!(record.failure_kind(), Some(FailureKind::QualityGateRejected));
    assert_eq!(record.rollback, RollbackStatus::NotNeeded);
    assert_eq!(record.review.as_ref().map(|r| r.approved), Some(false));
    assert_eq!(h.deployer.push_count(), 0);
    assert_eq!(h.targets.contents(SANDBOX), before);
    assert_eq!(h.pipeline.breaker().state().failure_count, 0);
}

#[tokio::test]
async fn approved_refinement_is_what_gets_pushed() {
    let h = gated(ScriptedReviewer::new().respond(
        "Looks good with one fix.\n```json\n{\"approved\": true, \"reason\": \"ok\", \"changes\": [\"added null check\"], \"final_code\": \"class AccountService { /* v3 */ }\"}\n```",
    ));

    let record = h
        .pipeline
        .deploy(&update_request().with_proposal(proposal()))
        .await
        .unwrap();

    assert!(record.is_success());
    assert!(record.stages_completed.contains(&PipelineStage::QualityGate));
    assert_eq!(
        h.targets.read(SANDBOX, "AccountService.cls").as_deref(),
        Some("class AccountService { /* v3 */ }")
    );
}

#[tokio::test]
async fn unparseable_review_fails_closed() {
    let h = gated(ScriptedReviewer::new().respond("I think this is probably fine!"));
    let record = h
        .pipeline
        .deploy(&update_request().with_proposal(proposal()))
        .await
        .unwrap();
    assert_eq!(record.outcome, DeploymentOutcome::Rejected);
    assert_eq!(h.deployer.push_count(), 0);
}

#[tokio::test]
async fn proposal_without_gate_is_rejected_unless_bypassed() {
    let h = harness(SimulatedRemoteDeployer::healthy);
    let record = h
        .pipeline
        .deploy(&update_request().with_proposal(proposal()))
        .await
        .unwrap();
    assert_eq!(record.outcome, DeploymentOutcome::Rejected);

    let mut request = update_request().with_proposal(proposal());
    request.options.bypass_quality_gate = true;
    let record = h.pipeline.deploy(&request).await.unwrap();
    assert!(record.is_success());
    assert!(record.warnings.iter().any(|w| w.contains("bypassed")));
}

// ── Windows and target policy ─────────────────────────────────────────

#[tokio::test]
async fn closed_window_refuses_unless_forced() {
    let h = harness_with(SimulatedRemoteDeployer::healthy, |b| {
        b.windows(
            DeploymentWindows::always_open()
                .with_window(EnvironmentClass::Uat, DeploymentWindow::weekdays(9, 17)),
        )
        .metadata(Arc::new(
            StaticTargetMetadata::new().with_class("uat-sandbox", EnvironmentClass::Uat),
        ))
    });
    // Saturday
    h.clock
        .set(chrono::Utc.with_ymd_and_hms(2024, 6, 8, 12, 0, 0).unwrap());

    let mut request = update_request();
    request.target = "uat-sandbox".into();
    let err = h.pipeline.deploy(&request).await.unwrap_err();
    match err {
        DeployError::OutsideWindow { next_window, .. } => assert_eq!(
            next_window,
            Some(chrono::Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap())
        ),
        other => panic!("unexpected error: {other}"),
    }
    assert!(h.history.is_empty());

    request.options.force_outside_window = true;
    let record = h.pipeline.deploy(&request).await.unwrap();
    assert!(record.is_success());
    assert!(record.warnings.iter().any(|w| w.contains("forced")));
}

#[tokio::test]
async fn relaxed_policy_warns_on_unlisted_target() {
    let h = harness_with(SimulatedRemoteDeployer::healthy, |b| {
        b.target_policy(TargetPolicyConfig::allow([SANDBOX]).relaxed())
    });
    let mut request = update_request();
    request.target = "scratch-42".into();

    let record = h.pipeline.deploy(&request).await.unwrap();
    assert!(record.is_success());
    assert!(!record.warnings.is_empty());
}

// ── Events ────────────────────────────────────────────────────────────

#[tokio::test]
async fn events_follow_the_attempt() {
    let h = harness(SimulatedRemoteDeployer::healthy);
    let mut events = h.pipeline.subscribe();

    let record = h.pipeline.deploy(&update_request()).await.unwrap();

    let first = events.recv().await.unwrap();
    assert_eq!(
        first,
        DeploymentEvent::Started {
            deployment_id: record.id,
            target: SANDBOX.into(),
        }
    );
    let mut stages = Vec::new();
    loop {
        match events.recv().await.unwrap() {
            DeploymentEvent::StageCompleted { stage, .. } => stages.push(stage),
            DeploymentEvent::Finished { outcome, severity, .. } => {
                assert_eq!(outcome, DeploymentOutcome::Succeeded);
                assert_eq!(severity, Severity::Info);
                break;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(stages.first(), Some(&PipelineStage::Snapshot));
    assert_eq!(stages.last(), Some(&PipelineStage::Verify));
}

#[tokio::test]
async fn refusals_are_broadcast() {
    let h = harness(SimulatedRemoteDeployer::healthy);
    let mut events = h.pipeline.subscribe();
    let mut request = update_request();
    request.target = "prod-eu".into();
    let _ = h.pipeline.deploy(&request).await;

    match events.recv().await.unwrap() {
        DeploymentEvent::Refused { kind, target, .. } => {
            assert_eq!(kind, FailureKind::BlockedTarget);
            assert_eq!(target, "prod-eu");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

// ── Per-target serialization ──────────────────────────────────────────

/// Records the highest number of pushes in flight at once.
#[derive(Default)]
struct ConcurrencyProbe {
    in_flight: AtomicUsize,
    max_seen: AtomicUsize,
}

#[async_trait]
impl RemoteDeployer for ConcurrencyProbe {
    async fn push(
        &self,
        _package: &DeploymentPackage,
        _target: &str,
    ) -> Result<PushReceipt, RemoteError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(PushReceipt {
            success: true,
            remote_id: None,
            message: "ok".into(),
            payload: serde_json::Value::Null,
        })
    }

    async fn run_verification(
        &self,
        _target: &str,
        _affected: &[String],
    ) -> Result<VerificationReport, RemoteError> {
        Ok(VerificationReport {
            passed: true,
            tests_run: 1,
            failures: 0,
            details: vec![],
        })
    }

    fn name(&self) -> &str {
        "concurrency-probe"
    }
}

async fn max_concurrent_pushes(serialize: bool) -> usize {
    let targets = Arc::new(InMemoryTargets::new());
    let probe = Arc::new(ConcurrencyProbe::default());
    let pipeline = Arc::new(
        DeploymentPipeline::builder()
            .config(PipelineConfig {
                serialize_per_target: serialize,
                ..Default::default()
            })
            .target_policy(TargetPolicyConfig::allow([SANDBOX]))
            .windows(DeploymentWindows::always_open())
            .snapshots(Arc::new(SnapshotManager::new(
                targets.clone(),
                targets.clone(),
                Arc::new(InMemorySnapshotStorage::new()),
            )))
            .deployer(probe.clone())
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.deploy(&update_request()).await.unwrap() })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }
    probe.max_seen.load(Ordering::SeqCst)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_target_attempts_are_serialized() {
    assert_eq!(max_concurrent_pushes(true).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn serialization_can_be_disabled() {
    assert!(max_concurrent_pushes(false).await >= 1);
}

// ── Generated changes and operator restore ────────────────────────────

struct FixedGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl CodeGenerator for FixedGenerator {
    async fn generate(&self, task: &GenerationTask) -> Result<GeneratedChange, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedChange {
            artifacts: ArtifactSet::new().with(Artifact::source(
                "Generated.cls",
                format!("// {}\nclass Generated {{}}", task.description),
            )),
            proposal: None,
        })
    }
}

#[tokio::test]
async fn generated_changes_are_deployed() {
    let h = harness(SimulatedRemoteDeployer::healthy);
    let generator = FixedGenerator {
        calls: AtomicUsize::new(0),
    };

    let record = h
        .pipeline
        .deploy_generated(
            &generator,
            &GenerationTask::new("trigger handler for Account"),
            SANDBOX,
            DeploymentOptions::default(),
        )
        .await
        .unwrap();
    assert!(record.is_success());
    assert!(h.targets.read(SANDBOX, "Generated.cls").is_some());

    let err = h
        .pipeline
        .deploy_generated(
            &generator,
            &GenerationTask::new("anything"),
            "production",
            DeploymentOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::BlockedTarget { .. }));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn operator_restore_returns_target_to_snapshot() {
    let h = harness(SimulatedRemoteDeployer::healthy);
    let s0 = h.targets.contents(SANDBOX);
    let record = h.pipeline.deploy(&update_request()).await.unwrap();
    assert_ne!(h.targets.contents(SANDBOX), s0);

    let report = h
        .pipeline
        .restore_snapshot(&record.snapshot_id.unwrap())
        .await
        .unwrap();
    assert_eq!(report.removed, vec!["AccountHelper.cls".to_string()]);
    assert_eq!(h.targets.contents(SANDBOX), s0);
}
