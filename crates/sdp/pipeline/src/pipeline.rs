//! The deployment pipeline state machine.
//!
//! One call to [`DeploymentPipeline::deploy`] runs one attempt. Stages run
//! strictly in order:
//!
//! 1. target-validate, breaker-check, window-check: refusals here return
//!    `Err` and leave no record. The three checks have no side effects, so
//!    a production target is always refused as a blocked target whatever
//!    the breaker or window says.
//! 2. snapshot, package, quality-gate, static-validate: a failure here
//!    aborts before anything reaches the target.
//! 3. push, verify: a failure here restores the snapshot when one exists.
//!
//! The circuit breaker is updated exactly once per recorded attempt. A
//! quality-gate rejection is a verdict on the proposal, not a pipeline
//! failure, and leaves the breaker alone.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sdp_guard::{
    CircuitBreaker, CircuitBreakerConfig, DeploymentWindows, PatternRiskScanner, RiskScanConfig,
    RiskScanner, TargetClearance, TargetPolicyConfig, TargetValidator,
};
use sdp_quality_gate::{QualityGate, ReviewProposal};
use sdp_snapshot::{RestoreReport, SnapshotStore};
use sdp_types::{
    AttemptFailure, Clock, DeploymentId, DeploymentOptions, DeploymentRecord, DeploymentRequest,
    EnvironmentClass, FailureKind, PipelineStage, QualityGateReview, RollbackStatus, ScheduleId,
    SnapshotId, SystemClock,
};
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::error::{DeployError, Result};
use crate::events::DeploymentEvent;
use crate::generator::{CodeGenerator, GenerationTask};
use crate::history::{DeploymentHistory, HistorySummary, InMemoryDeploymentHistory};
use crate::metadata::{StaticTargetMetadata, TargetMetadataSource};
use crate::package::DeploymentPackage;
use crate::remote::RemoteDeployer;

// ── Attempt context ────────────────────────────────────────────────────

/// Where an attempt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptContext {
    pub schedule_id: Option<ScheduleId>,
    /// 1 for the first attempt, incremented per retry.
    pub attempt: u32,
}

impl Default for AttemptContext {
    fn default() -> Self {
        Self {
            schedule_id: None,
            attempt: 1,
        }
    }
}

impl AttemptContext {
    pub fn scheduled(schedule_id: ScheduleId, attempt: u32) -> Self {
        Self {
            schedule_id: Some(schedule_id),
            attempt,
        }
    }
}

/// Why the stage sequence stopped early.
enum Halt {
    Rejected(QualityGateReview),
    Failed(AttemptFailure),
}

fn halt(stage: PipelineStage, kind: FailureKind, message: impl Into<String>) -> Halt {
    Halt::Failed(AttemptFailure {
        stage,
        kind,
        message: message.into(),
    })
}

// ── Builder ────────────────────────────────────────────────────────────

/// Assembles a [`DeploymentPipeline`].
///
/// A snapshot store and a remote deployer are required. Everything else
/// has a default: a strict target policy with an empty allow-list, the
/// default breaker, default windows, the built-in risk scanner, in-memory
/// history and the system clock.
pub struct PipelineBuilder {
    config: PipelineConfig,
    target_policy: TargetPolicyConfig,
    breaker_config: CircuitBreakerConfig,
    breaker: Option<Arc<CircuitBreaker>>,
    windows: DeploymentWindows,
    metadata: Arc<dyn TargetMetadataSource>,
    scanner: Option<Arc<dyn RiskScanner>>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    deployer: Option<Arc<dyn RemoteDeployer>>,
    quality_gate: Option<Arc<QualityGate>>,
    history: Arc<dyn DeploymentHistory>,
    clock: Arc<dyn Clock>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            config: PipelineConfig::default(),
            target_policy: TargetPolicyConfig::default(),
            breaker_config: CircuitBreakerConfig::default(),
            breaker: None,
            windows: DeploymentWindows::default(),
            metadata: Arc::new(StaticTargetMetadata::new()),
            scanner: None,
            snapshots: None,
            deployer: None,
            quality_gate: None,
            history: Arc::new(InMemoryDeploymentHistory::new()),
            clock: Arc::new(SystemClock),
        }
    }
}

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn target_policy(mut self, policy: TargetPolicyConfig) -> Self {
        self.target_policy = policy;
        self
    }

    pub fn breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    /// Share an existing breaker instead of building one from config.
    pub fn breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn windows(mut self, windows: DeploymentWindows) -> Self {
        self.windows = windows;
        self
    }

    pub fn metadata(mut self, metadata: Arc<dyn TargetMetadataSource>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn risk_scanner(mut self, scanner: Arc<dyn RiskScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn snapshots(mut self, snapshots: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn deployer(mut self, deployer: Arc<dyn RemoteDeployer>) -> Self {
        self.deployer = Some(deployer);
        self
    }

    pub fn quality_gate(mut self, gate: Arc<QualityGate>) -> Self {
        self.quality_gate = Some(gate);
        self
    }

    pub fn history(mut self, history: Arc<dyn DeploymentHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<DeploymentPipeline> {
        self.config.validate()?;
        self.windows.validate()?;

        let snapshots = self
            .snapshots
            .ok_or_else(|| DeployError::InvalidConfig("no snapshot store configured".into()))?;
        let deployer = self
            .deployer
            .ok_or_else(|| DeployError::InvalidConfig("no remote deployer configured".into()))?;

        let validator = TargetValidator::new(self.target_policy)?;
        let breaker = match self.breaker {
            Some(breaker) => breaker,
            None => Arc::new(CircuitBreaker::with_clock(
                self.breaker_config,
                self.clock.clone(),
            )?),
        };
        let scanner: Arc<dyn RiskScanner> = match self.scanner {
            Some(scanner) => scanner,
            None => Arc::new(PatternRiskScanner::new(RiskScanConfig::default())?),
        };
        let (event_tx, _) = broadcast::channel(self.config.event_buffer);

        Ok(DeploymentPipeline {
            config: self.config,
            validator,
            breaker,
            windows: self.windows,
            metadata: self.metadata,
            scanner,
            snapshots,
            deployer,
            quality_gate: self.quality_gate,
            history: self.history,
            clock: self.clock,
            target_locks: DashMap::new(),
            event_tx,
        })
    }
}

// ── Pipeline ───────────────────────────────────────────────────────────

/// Runs deployment attempts against one set of collaborators.
pub struct DeploymentPipeline {
    config: PipelineConfig,
    validator: TargetValidator,
    breaker: Arc<CircuitBreaker>,
    windows: DeploymentWindows,
    metadata: Arc<dyn TargetMetadataSource>,
    scanner: Arc<dyn RiskScanner>,
    snapshots: Arc<dyn SnapshotStore>,
    deployer: Arc<dyn RemoteDeployer>,
    quality_gate: Option<Arc<QualityGate>>,
    history: Arc<dyn DeploymentHistory>,
    clock: Arc<dyn Clock>,
    target_locks: DashMap<String, Arc<Mutex<()>>>,
    event_tx: broadcast::Sender<DeploymentEvent>,
}

impl DeploymentPipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Run one attempt for an immediate request.
    pub async fn deploy(&self, request: &DeploymentRequest) -> Result<DeploymentRecord> {
        self.deploy_attempt(request, AttemptContext::default()).await
    }

    /// Run one attempt, tagging the record with where it came from.
    #[instrument(
        skip(self, request, context),
        fields(target = %request.target, attempt = context.attempt)
    )]
    pub async fn deploy_attempt(
        &self,
        request: &DeploymentRequest,
        context: AttemptContext,
    ) -> Result<DeploymentRecord> {
        let target = request.target.as_str();

        // target-validate; production targets are refused before any
        // other check can answer for them.
        let clearance = match self.validator.validate(target) {
            Ok(clearance) => clearance,
            Err(e) => return Err(self.refuse(target, e.into())),
        };

        // breaker-check
        if !self.breaker.allow_attempt() {
            let state = self.breaker.state();
            let err = DeployError::CircuitOpen {
                failures: state.failure_count,
                resets_at: state.resets_at,
            };
            return Err(self.refuse(target, err));
        }

        // window-check
        if !request.options.force_outside_window {
            let class = self.metadata.environment_class(target).await;
            let now = self.clock.now();
            if !self.windows.is_within_window(now, class) {
                let err = DeployError::OutsideWindow {
                    target: target.to_string(),
                    class,
                    next_window: self.windows.next_window(now, class),
                };
                return Err(self.refuse(target, err));
            }
        }

        let _target_guard = self.lock_target(target).await;

        let mut record = DeploymentRecord::new(
            DeploymentId::generate(),
            target,
            request.artifacts.names(),
            self.clock.now(),
        );
        record.schedule_id = context.schedule_id;
        record.attempt = context.attempt;
        record.complete_stage(PipelineStage::TargetValidate);
        record.complete_stage(PipelineStage::BreakerCheck);
        record.complete_stage(PipelineStage::WindowCheck);
        if request.options.force_outside_window {
            record.add_warning("deployment window check skipped (forced)");
        }
        if let Some(warning) = clearance.warning() {
            record.add_warning(warning);
        }

        info!(
            deployment_id = %record.id,
            artifacts = request.artifacts.len(),
            "Deployment started"
        );
        self.emit(DeploymentEvent::Started {
            deployment_id: record.id,
            target: target.to_string(),
        });

        match self.run_stages(request, &mut record).await {
            Ok(()) => {
                record.mark_succeeded(self.clock.now());
                self.breaker.record_success();
                info!(
                    deployment_id = %record.id,
                    duration_ms = ?record.duration_ms(),
                    "Deployment succeeded"
                );
            }
            Err(Halt::Rejected(review)) => {
                info!(
                    deployment_id = %record.id,
                    reason = %review.reason,
                    "Deployment rejected by quality gate"
                );
                record.mark_rejected(review, self.clock.now());
            }
            Err(Halt::Failed(failure)) => {
                if failure.stage.is_post_push() {
                    self.roll_back(&mut record, failure).await;
                } else {
                    warn!(
                        deployment_id = %record.id,
                        stage = %failure.stage,
                        kind = %failure.kind,
                        message = %failure.message,
                        "Deployment aborted before push"
                    );
                    record.mark_failed(failure, self.clock.now());
                }
                self.breaker.record_failure();
            }
        }

        self.persist(&record).await;
        self.emit(DeploymentEvent::Finished {
            deployment_id: record.id,
            target: record.target.clone(),
            outcome: record.outcome,
            severity: record.severity(),
        });
        Ok(record)
    }

    async fn run_stages(
        &self,
        request: &DeploymentRequest,
        record: &mut DeploymentRecord,
    ) -> std::result::Result<(), Halt> {
        let target = request.target.as_str();
        let options = &request.options;

        // snapshot
        if options.skip_snapshot {
            record.add_warning("snapshot skipped: a failure after push cannot be rolled back");
        } else {
            let snapshot = self
                .snapshots
                .capture(record.id, target, &request.artifacts)
                .await
                .map_err(|e| halt(PipelineStage::Snapshot, FailureKind::SnapshotFailed, e.to_string()))?;
            info!(
                deployment_id = %record.id,
                snapshot_id = %snapshot.id,
                "Snapshot captured"
            );
            record.snapshot_id = Some(snapshot.id);
            self.stage_done(record, PipelineStage::Snapshot);
        }

        // package
        let mut package = DeploymentPackage::build(record.id, request.artifacts.clone())
            .map_err(|e| halt(PipelineStage::Package, FailureKind::ValidationFailed, e.to_string()))?;
        debug!(deployment_id = %record.id, checksum = %package.checksum, "Package built");
        self.stage_done(record, PipelineStage::Package);

        // quality-gate
        if let Some(proposal) = &request.proposal {
            if options.bypass_quality_gate {
                record.add_warning("quality gate bypassed for an automatically authored change");
            } else {
                let gate = match &self.quality_gate {
                    Some(gate) => gate,
                    None => {
                        return Err(Halt::Rejected(QualityGateReview::rejected(
                            "change requires review but no quality gate is configured",
                        )))
                    }
                };
                let proposed = package
                    .artifacts
                    .get(&proposal.artifact)
                    .map(|a| a.content.clone())
                    .ok_or_else(|| {
                        halt(
                            PipelineStage::QualityGate,
                            FailureKind::ValidationFailed,
                            format!("proposal names unknown artifact '{}'", proposal.artifact),
                        )
                    })?;

                let review = gate
                    .review(&ReviewProposal::from_change(proposal, proposed))
                    .await;
                if !review.approved {
                    return Err(Halt::Rejected(review));
                }
                if let Some(final_code) = &review.final_code {
                    let mut refined = package.artifacts.clone();
                    refined.replace_content(&proposal.artifact, final_code.clone());
                    package = DeploymentPackage::build(record.id, refined).map_err(|e| {
                        halt(PipelineStage::QualityGate, FailureKind::ValidationFailed, e.to_string())
                    })?;
                    info!(
                        deployment_id = %record.id,
                        artifact = %proposal.artifact,
                        "Reviewer refinement replaces proposed code"
                    );
                }
                record.review = Some(review);
                self.stage_done(record, PipelineStage::QualityGate);
            }
        }

        // static-validate
        if options.skip_validation {
            record.add_warning("static validation skipped");
        } else {
            let report = self.scanner.scan(&package.artifacts);
            for finding in report.advisories() {
                warn!(deployment_id = %record.id, finding = %finding, "Advisory finding");
                record.add_warning(finding.to_string());
            }
            if report.has_blocking() {
                return Err(halt(
                    PipelineStage::StaticValidate,
                    FailureKind::ValidationFailed,
                    report.blocking_summary(),
                ));
            }

            let limit = self.config.validate_timeout();
            let validation = match timeout(limit, self.deployer.validate(&package, target)).await {
                Err(_) => {
                    return Err(halt(
                        PipelineStage::StaticValidate,
                        FailureKind::Timeout,
                        format!("remote validation timed out after {}s", limit.as_secs()),
                    ))
                }
                Ok(Err(e)) => {
                    return Err(halt(
                        PipelineStage::StaticValidate,
                        FailureKind::ValidationFailed,
                        e.to_string(),
                    ))
                }
                Ok(Ok(validation)) => validation,
            };
            if !validation.is_ok() {
                return Err(halt(
                    PipelineStage::StaticValidate,
                    FailureKind::ValidationFailed,
                    validation.errors.join("; "),
                ));
            }
            self.stage_done(record, PipelineStage::StaticValidate);
        }

        // push
        let limit = self.config.push_timeout();
        let receipt = match timeout(limit, self.deployer.push(&package, target)).await {
            Err(_) => {
                return Err(halt(
                    PipelineStage::Push,
                    FailureKind::PushFailed,
                    format!("push timed out after {}s", limit.as_secs()),
                ))
            }
            Ok(Err(e)) => {
                return Err(halt(PipelineStage::Push, FailureKind::PushFailed, e.to_string()))
            }
            Ok(Ok(receipt)) => receipt,
        };
        record.push_payload = Some(receipt.payload.clone());
        if !receipt.success {
            return Err(halt(PipelineStage::Push, FailureKind::PushFailed, receipt.message));
        }
        info!(
            deployment_id = %record.id,
            remote_id = ?receipt.remote_id,
            "Push completed"
        );
        self.stage_done(record, PipelineStage::Push);

        // verify
        if options.skip_tests {
            record.add_warning("post-deploy verification skipped");
            return Ok(());
        }
        let limit = self.config.verify_timeout();
        let report = match timeout(
            limit,
            self.deployer.run_verification(target, &record.affected),
        )
        .await
        {
            Err(_) => {
                return Err(halt(
                    PipelineStage::Verify,
                    FailureKind::VerificationFailed,
                    format!("verification timed out after {}s", limit.as_secs()),
                ))
            }
            Ok(Err(e)) => {
                return Err(halt(
                    PipelineStage::Verify,
                    FailureKind::VerificationFailed,
                    e.to_string(),
                ))
            }
            Ok(Ok(report)) => report,
        };
        let passed = report.passed;
        let summary = format!("{} of {} tests failed", report.failures, report.tests_run);
        record.verification = Some(report.into());
        if !passed {
            return Err(halt(PipelineStage::Verify, FailureKind::VerificationFailed, summary));
        }
        self.stage_done(record, PipelineStage::Verify);
        Ok(())
    }

    /// Handle a failure at or after push.
    async fn roll_back(&self, record: &mut DeploymentRecord, failure: AttemptFailure) {
        let snapshot_id = match record.snapshot_id {
            Some(id) => id,
            None => {
                error!(
                    deployment_id = %record.id,
                    stage = %failure.stage,
                    message = %failure.message,
                    "Post-push failure with no snapshot; target may be partially deployed"
                );
                record.rollback = RollbackStatus::Unavailable;
                record.mark_failed(failure, self.clock.now());
                return;
            }
        };

        warn!(
            deployment_id = %record.id,
            snapshot_id = %snapshot_id,
            stage = %failure.stage,
            message = %failure.message,
            "Rolling back"
        );

        let limit = self.config.rollback_timeout();
        let result = match timeout(limit, self.snapshots.restore(&snapshot_id)).await {
            Err(_) => Err(format!("restore timed out after {}s", limit.as_secs())),
            Ok(result) => result.map_err(|e| e.to_string()),
        };

        match result {
            Ok(report) => {
                info!(
                    deployment_id = %record.id,
                    snapshot_id = %snapshot_id,
                    restored = report.restored.len(),
                    removed = report.removed.len(),
                    "Rollback completed"
                );
                self.stage_done(record, PipelineStage::Rollback);
                record.mark_rolled_back(failure, snapshot_id, self.clock.now());
            }
            Err(reason) => {
                error!(
                    deployment_id = %record.id,
                    snapshot_id = %snapshot_id,
                    error = %reason,
                    "Rollback failed; target needs manual recovery"
                );
                record.rollback = RollbackStatus::Failed {
                    snapshot_id,
                    reason: reason.clone(),
                };
                record.mark_failed(
                    AttemptFailure {
                        stage: PipelineStage::Rollback,
                        kind: FailureKind::RollbackFailed,
                        message: format!(
                            "{} (after {} at {}: {})",
                            reason, failure.kind, failure.stage, failure.message
                        ),
                    },
                    self.clock.now(),
                );
            }
        }
    }

    /// Generate artifacts, then deploy them.
    ///
    /// The target is validated before the generator is called.
    #[instrument(skip(self, generator, task, options), fields(target = %target))]
    pub async fn deploy_generated(
        &self,
        generator: &dyn CodeGenerator,
        task: &GenerationTask,
        target: &str,
        options: DeploymentOptions,
    ) -> Result<DeploymentRecord> {
        self.check_target(target)?;
        let change = generator
            .generate(task)
            .await
            .map_err(|e| DeployError::Generation(e.to_string()))?;
        info!(artifacts = change.artifacts.len(), "Generated artifacts");

        let mut request = DeploymentRequest::new(change.artifacts, target).with_options(options);
        request.proposal = change.proposal;
        self.deploy(&request).await
    }

    /// Restore a snapshot on operator request. The snapshot's target goes
    /// through target validation first.
    #[instrument(skip(self), fields(snapshot_id = %snapshot_id))]
    pub async fn restore_snapshot(&self, snapshot_id: &SnapshotId) -> Result<RestoreReport> {
        let snapshot = self
            .snapshots
            .get(snapshot_id)
            .await?
            .ok_or(sdp_snapshot::SnapshotError::NotFound(*snapshot_id))?;
        self.check_target(&snapshot.target)?;

        let _target_guard = self.lock_target(&snapshot.target).await;
        let report = self.snapshots.restore(snapshot_id).await?;
        info!(
            target = %snapshot.target,
            restored = report.restored.len(),
            removed = report.removed.len(),
            "Snapshot restored by operator"
        );
        Ok(report)
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Validate a target without deploying.
    pub fn check_target(&self, target: &str) -> Result<TargetClearance> {
        Ok(self.validator.validate(target)?)
    }

    pub async fn environment_class(&self, target: &str) -> EnvironmentClass {
        self.metadata.environment_class(target).await
    }

    pub async fn is_within_window(&self, target: &str, at: DateTime<Utc>) -> bool {
        let class = self.environment_class(target).await;
        self.windows.is_within_window(at, class)
    }

    pub async fn next_window(&self, target: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let class = self.environment_class(target).await;
        self.windows.next_window(after, class)
    }

    pub async fn summary(&self) -> std::result::Result<HistorySummary, crate::history::HistoryError> {
        let records = self.history.list().await?;
        Ok(HistorySummary::from_records(&records))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeploymentEvent> {
        self.event_tx.subscribe()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn history(&self) -> &Arc<dyn DeploymentHistory> {
        &self.history
    }

    pub fn snapshots(&self) -> &Arc<dyn SnapshotStore> {
        &self.snapshots
    }

    pub fn windows(&self) -> &DeploymentWindows {
        &self.windows
    }

    pub fn validator(&self) -> &TargetValidator {
        &self.validator
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn refuse(&self, target: &str, err: DeployError) -> DeployError {
        warn!(target = %target, error = %err, "Deployment refused");
        if let Some(kind) = err.kind() {
            self.emit(DeploymentEvent::Refused {
                target: target.to_string(),
                kind,
                reason: err.to_string(),
            });
        }
        err
    }

    async fn lock_target(&self, target: &str) -> Option<OwnedMutexGuard<()>> {
        if !self.config.serialize_per_target {
            return None;
        }
        let lock = self
            .target_locks
            .entry(target.to_string())
            .or_default()
            .clone();
        Some(lock.lock_owned().await)
    }

    fn stage_done(&self, record: &mut DeploymentRecord, stage: PipelineStage) {
        record.complete_stage(stage);
        debug!(deployment_id = %record.id, stage = %stage, "Stage completed");
        self.emit(DeploymentEvent::StageCompleted {
            deployment_id: record.id,
            stage,
        });
    }

    async fn persist(&self, record: &DeploymentRecord) {
        if let Err(e) = self.history.append(record).await {
            error!(
                deployment_id = %record.id,
                error = %e,
                "Failed to append deployment record to history"
            );
        }
    }

    fn emit(&self, event: DeploymentEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}
