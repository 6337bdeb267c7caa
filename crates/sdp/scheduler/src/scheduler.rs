//! The deployment scheduler.
//!
//! One tokio task per armed deployment sleeps until it is due and then
//! runs the pipeline; reminders get their own task. Timers hold a weak
//! reference, so dropping the scheduler lets them lapse.
//!
//! `cancel` and the firing path both take the timer-table lock before
//! reading and writing the stored status. Whichever gets it first wins:
//! a cancelled deployment never executes, and an executing one cannot be
//! cancelled.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use sdp_pipeline::{AttemptContext, DeployError, DeploymentPipeline};
use sdp_types::{
    Clock, DeploymentRecord, DeploymentRequest, FailureKind, NotificationFlags, RetryPolicy,
    ScheduleId, ScheduleStatus, ScheduledDeployment,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::events::ScheduleEvent;
use crate::store::ScheduleStore;

/// What `recover` did with each persisted record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Still in the future; timers armed again.
    pub rearmed: Vec<ScheduleId>,
    /// Fell due while the process was down.
    pub missed: Vec<ScheduleId>,
    /// Were executing when the process stopped.
    pub interrupted: Vec<ScheduleId>,
}

struct ArmedTimer {
    fire: JoinHandle<()>,
    reminder: Option<JoinHandle<()>>,
}

impl ArmedTimer {
    fn abort(self) {
        self.fire.abort();
        if let Some(reminder) = self.reminder {
            reminder.abort();
        }
    }
}

pub struct DeploymentScheduler {
    pipeline: Arc<DeploymentPipeline>,
    store: Arc<dyn ScheduleStore>,
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    timers: Mutex<HashMap<ScheduleId, ArmedTimer>>,
    events: broadcast::Sender<ScheduleEvent>,
}

impl DeploymentScheduler {
    /// The scheduler shares the pipeline's clock.
    pub fn new(
        pipeline: Arc<DeploymentPipeline>,
        store: Arc<dyn ScheduleStore>,
        config: SchedulerConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_buffer);
        Ok(Arc::new(Self {
            clock: pipeline.clock().clone(),
            pipeline,
            store,
            config,
            timers: Mutex::new(HashMap::new()),
            events,
        }))
    }

    // ── Scheduling ────────────────────────────────────────────────────

    /// Schedule `request` for `when`.
    ///
    /// Fails without persisting anything if `when` is not strictly in the
    /// future, the target is blocked, or `when` is outside the target's
    /// window and the request does not force it.
    #[instrument(skip(self, request, retry, notifications), fields(target = %request.target, when = %when))]
    pub async fn schedule(
        self: &Arc<Self>,
        request: DeploymentRequest,
        when: DateTime<Utc>,
        retry: RetryPolicy,
        notifications: NotificationFlags,
    ) -> Result<ScheduledDeployment> {
        let now = self.clock.now();
        if when <= now {
            return Err(SchedulerError::NotInFuture {
                scheduled_for: when,
                now,
            });
        }

        if let Some(warning) = self.pipeline.check_target(&request.target)?.warning() {
            warn!(warning = %warning, "Scheduling to an unlisted target");
        }

        if !request.options.force_outside_window
            && !self.pipeline.is_within_window(&request.target, when).await
        {
            return Err(SchedulerError::OutsideWindow {
                next_window: self.pipeline.next_window(&request.target, when).await,
                target: request.target,
            });
        }

        let scheduled = ScheduledDeployment::new(request, when, retry, notifications, now);
        self.store.upsert(&scheduled).await?;
        self.arm(&scheduled).await;

        info!(schedule_id = %scheduled.id, "Deployment scheduled");
        self.emit(ScheduleEvent::Scheduled {
            id: scheduled.id,
            target: scheduled.target().to_string(),
            at: when,
        });
        Ok(scheduled)
    }

    /// Schedule with the configured default retry budget and notifications.
    pub async fn schedule_default(
        self: &Arc<Self>,
        request: DeploymentRequest,
        when: DateTime<Utc>,
    ) -> Result<ScheduledDeployment> {
        let retry = RetryPolicy::up_to(self.config.default_max_retries);
        self.schedule(request, when, retry, NotificationFlags::default())
            .await
    }

    /// Cancel a deployment that has not started. Only legal from
    /// `scheduled`; a second cancel fails with `NotCancellable`.
    #[instrument(skip(self), fields(schedule_id = %id))]
    pub async fn cancel(&self, id: &ScheduleId) -> Result<ScheduledDeployment> {
        let mut timers = self.timers.lock().await;

        let mut scheduled = self
            .store
            .get(id)
            .await?
            .ok_or(SchedulerError::NotFound(*id))?;
        if scheduled.status != ScheduleStatus::Scheduled {
            return Err(SchedulerError::NotCancellable {
                id: *id,
                status: scheduled.status,
            });
        }

        scheduled.transition(ScheduleStatus::Cancelled, self.clock.now())?;
        self.store.upsert(&scheduled).await?;
        if let Some(timer) = timers.remove(id) {
            timer.abort();
        }
        drop(timers);

        info!("Scheduled deployment cancelled");
        self.emit(ScheduleEvent::Cancelled { id: *id });
        Ok(scheduled)
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub async fn get(&self, id: &ScheduleId) -> Result<Option<ScheduledDeployment>> {
        Ok(self.store.get(id).await?)
    }

    /// All records, optionally filtered by status.
    pub async fn list(&self, status: Option<ScheduleStatus>) -> Result<Vec<ScheduledDeployment>> {
        let records = self.store.list().await?;
        Ok(match status {
            Some(status) => records.into_iter().filter(|r| r.status == status).collect(),
            None => records,
        })
    }

    /// Records waiting for a timer (`scheduled` or `retry_scheduled`).
    pub async fn pending(&self) -> Result<Vec<ScheduledDeployment>> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|r| r.status.is_pending())
            .collect())
    }

    /// Number of armed timers.
    pub async fn armed(&self) -> usize {
        self.timers.lock().await.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleEvent> {
        self.events.subscribe()
    }

    pub fn pipeline(&self) -> &Arc<DeploymentPipeline> {
        &self.pipeline
    }

    // ── Lifecycle ─────────────────────────────────────────────────────

    /// Rebuild pending work after a restart.
    ///
    /// Pending records still in the future are re-armed. Pending records
    /// that fell due while the process was down become `missed`; they
    /// are not executed late, and missed retries are not replayed.
    /// Records left `executing` become `failed`.
    #[instrument(skip(self))]
    pub async fn recover(self: &Arc<Self>) -> Result<RecoveryReport> {
        let now = self.clock.now();
        let mut report = RecoveryReport::default();

        for mut scheduled in self.store.list().await? {
            match scheduled.status {
                ScheduleStatus::Scheduled | ScheduleStatus::RetryScheduled => {
                    let due = scheduled.due_at();
                    if due > now {
                        self.arm(&scheduled).await;
                        report.rearmed.push(scheduled.id);
                    } else {
                        scheduled.transition(ScheduleStatus::Missed, now)?;
                        scheduled.last_error =
                            Some(format!("due at {} while the scheduler was not running", due));
                        self.store.upsert(&scheduled).await?;
                        warn!(schedule_id = %scheduled.id, due = %due, "Scheduled deployment missed");
                        self.emit(ScheduleEvent::Missed {
                            id: scheduled.id,
                            was_due: due,
                        });
                        report.missed.push(scheduled.id);
                    }
                }
                ScheduleStatus::Executing => {
                    scheduled.transition(ScheduleStatus::Failed, now)?;
                    scheduled.last_error = Some("interrupted by restart".to_string());
                    self.store.upsert(&scheduled).await?;
                    warn!(schedule_id = %scheduled.id, "Execution interrupted by restart");
                    if scheduled.notifications.on_failure {
                        self.emit(ScheduleEvent::Failed {
                            id: scheduled.id,
                            reason: "interrupted by restart".to_string(),
                        });
                    }
                    report.interrupted.push(scheduled.id);
                }
                _ => {}
            }
        }

        info!(
            rearmed = report.rearmed.len(),
            missed = report.missed.len(),
            interrupted = report.interrupted.len(),
            "Scheduler recovered"
        );
        Ok(report)
    }

    /// Delete terminal records that finished more than `older_than` ago.
    pub async fn cleanup(&self, older_than: Duration) -> Result<usize> {
        let cutoff = self.clock.now() - older_than;
        let mut removed = 0;
        for scheduled in self.store.list().await? {
            let finished = scheduled.completed_at.unwrap_or(scheduled.updated_at);
            if scheduled.status.is_terminal()
                && finished <= cutoff
                && self.store.remove(&scheduled.id).await?
            {
                removed += 1;
            }
        }
        info!(removed, "Cleaned up finished scheduled deployments");
        Ok(removed)
    }

    /// Abort every armed timer. Persisted state is left as it is, so a
    /// later `recover` picks the work up again.
    pub async fn shutdown(&self) {
        let mut timers = self.timers.lock().await;
        let count = timers.len();
        for (_, timer) in timers.drain() {
            timer.abort();
        }
        info!(timers = count, "Scheduler shut down");
    }

    // ── Timers ────────────────────────────────────────────────────────

    async fn arm(self: &Arc<Self>, scheduled: &ScheduledDeployment) {
        let id = scheduled.id;
        let due = scheduled.due_at();
        let now = self.clock.now();

        // Held until the entry is in place, so a timer that fires at once
        // finds (and removes) its own entry.
        let mut timers = self.timers.lock().await;

        let weak: Weak<Self> = Arc::downgrade(self);
        let fire = tokio::spawn(async move {
            tokio::time::sleep(delay_between(now, due)).await;
            if let Some(scheduler) = weak.upgrade() {
                scheduler.fire(id).await;
            }
        });

        let reminder = match scheduled.notifications.remind_before_secs {
            Some(secs) if scheduled.status == ScheduleStatus::Scheduled => {
                let remind_at = due - Duration::seconds(i64::try_from(secs).unwrap_or(0));
                if remind_at > now {
                    let weak = Arc::downgrade(self);
                    let target = scheduled.target().to_string();
                    Some(tokio::spawn(async move {
                        tokio::time::sleep(delay_between(now, remind_at)).await;
                        if let Some(scheduler) = weak.upgrade() {
                            debug!(schedule_id = %id, "Sending reminder");
                            scheduler.emit(ScheduleEvent::Reminder { id, target, at: due });
                        }
                    }))
                } else {
                    None
                }
            }
            _ => None,
        };

        if let Some(previous) = timers.insert(id, ArmedTimer { fire, reminder }) {
            previous.abort();
        }
        debug!(schedule_id = %id, due = %due, "Timer armed");
    }

    /// Timer callback: claim the deployment, run it, settle the outcome.
    ///
    /// Boxed because it re-arms timers that call back into it.
    fn fire(self: Arc<Self>, id: ScheduleId) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let scheduled = {
                let mut timers = self.timers.lock().await;
                timers.remove(&id);

                let mut scheduled = match self.store.get(&id).await {
                    Ok(Some(scheduled)) => scheduled,
                    Ok(None) => {
                        warn!(schedule_id = %id, "Timer fired for unknown deployment");
                        return;
                    }
                    Err(e) => {
                        error!(schedule_id = %id, error = %e, "Failed to load scheduled deployment");
                        return;
                    }
                };
                if !scheduled.status.is_pending() {
                    debug!(schedule_id = %id, status = %scheduled.status, "No longer pending");
                    return;
                }
                if let Err(e) = scheduled.transition(ScheduleStatus::Executing, self.clock.now()) {
                    error!(schedule_id = %id, error = %e, "Cannot start scheduled deployment");
                    return;
                }
                if let Err(e) = self.store.upsert(&scheduled).await {
                    error!(
                        schedule_id = %id,
                        error = %e,
                        "Failed to persist executing state; deployment not started"
                    );
                    return;
                }
                scheduled
            };

            let attempt = scheduled.retry.retry_count + 1;
            info!(schedule_id = %id, attempt, "Executing scheduled deployment");
            self.emit(ScheduleEvent::Started { id, attempt });

            let result = self
                .pipeline
                .deploy_attempt(&scheduled.request, AttemptContext::scheduled(id, attempt))
                .await;
            self.settle(scheduled, result).await;
        })
    }

    async fn settle(
        self: &Arc<Self>,
        mut scheduled: ScheduledDeployment,
        result: std::result::Result<DeploymentRecord, DeployError>,
    ) {
        let id = scheduled.id;
        let now = self.clock.now();

        let (kind, reason, earliest) = match result {
            Ok(record) if record.is_success() => {
                scheduled.last_deployment = Some(record.id);
                scheduled.last_error = None;
                if let Err(e) = scheduled.transition(ScheduleStatus::Completed, now) {
                    error!(schedule_id = %id, error = %e, "Cannot complete scheduled deployment");
                    return;
                }
                self.persist(&scheduled).await;
                info!(schedule_id = %id, deployment_id = %record.id, "Scheduled deployment completed");
                if scheduled.notifications.on_success {
                    self.emit(ScheduleEvent::Completed {
                        id,
                        deployment_id: record.id,
                    });
                }
                return;
            }
            Ok(record) => {
                scheduled.last_deployment = Some(record.id);
                let reason = record
                    .failure
                    .as_ref()
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| record.outcome.to_string());
                (record.failure_kind(), reason, None)
            }
            Err(e) => {
                let earliest = match &e {
                    DeployError::CircuitOpen { resets_at, .. } => *resets_at,
                    DeployError::OutsideWindow { next_window, .. } => *next_window,
                    _ => None,
                };
                (e.kind(), e.to_string(), earliest)
            }
        };

        scheduled.last_error = Some(reason.clone());
        let retryable = kind.map(|k| k.is_retryable()).unwrap_or(false)
            || kind == Some(FailureKind::OutsideWindow);

        if retryable && scheduled.retry.can_retry() {
            if let Some(at) = self.retry_time(&scheduled, now, earliest).await {
                scheduled.retry.retry_count += 1;
                scheduled.next_attempt_at = Some(at);
                if let Err(e) = scheduled.transition(ScheduleStatus::RetryScheduled, now) {
                    error!(schedule_id = %id, error = %e, "Cannot schedule retry");
                    return;
                }
                if !self.persist(&scheduled).await {
                    return;
                }
                self.arm(&scheduled).await;
                warn!(
                    schedule_id = %id,
                    retry = scheduled.retry.retry_count,
                    max_retries = scheduled.retry.max_retries,
                    at = %at,
                    reason = %reason,
                    "Scheduled deployment failed; retry scheduled"
                );
                self.emit(ScheduleEvent::RetryScheduled {
                    id,
                    at,
                    retry: scheduled.retry.retry_count,
                });
                return;
            }
        }

        if let Err(e) = scheduled.transition(ScheduleStatus::Failed, now) {
            error!(schedule_id = %id, error = %e, "Cannot fail scheduled deployment");
            return;
        }
        self.persist(&scheduled).await;
        warn!(schedule_id = %id, reason = %reason, "Scheduled deployment failed");
        if scheduled.notifications.on_failure {
            self.emit(ScheduleEvent::Failed { id, reason });
        }
    }

    /// `now + backoff` (or later if the failure names an earliest time),
    /// pushed to the next window opening. `None` if the window never opens.
    async fn retry_time(
        &self,
        scheduled: &ScheduledDeployment,
        now: DateTime<Utc>,
        earliest: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        let mut at = now + self.config.retry_backoff();
        if let Some(earliest) = earliest {
            at = at.max(earliest);
        }
        if scheduled.request.options.force_outside_window {
            return Some(at);
        }
        let next = self.pipeline.next_window(scheduled.target(), at).await;
        if next.is_none() {
            warn!(schedule_id = %scheduled.id, "No deployment window ahead; not retrying");
        }
        next
    }

    /// Returns whether the write succeeded.
    async fn persist(&self, scheduled: &ScheduledDeployment) -> bool {
        match self.store.upsert(scheduled).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    schedule_id = %scheduled.id,
                    status = %scheduled.status,
                    error = %e,
                    "Failed to persist scheduled deployment"
                );
                false
            }
        }
    }

    fn emit(&self, event: ScheduleEvent) {
        let _ = self.events.send(event);
    }
}

fn delay_between(now: DateTime<Utc>, at: DateTime<Utc>) -> StdDuration {
    (at - now).to_std().unwrap_or(StdDuration::ZERO)
}
