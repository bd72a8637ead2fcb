//! Single-flight sync orchestrator.
//!
//! A sync run snapshots the pending actions present when it starts and
//! dispatches them strictly in queue order, `batch_size` at a time. Each
//! action is claimed (`retrying`) for the duration of the applier call, then
//! committed and removed, parked in backoff and redispatched, or rolled back
//! and removed. Work enqueued during a run is left to a follow-up pass.
//!
//! At most one run exists at a time. The run executes on its own task and is
//! exposed as a shared future: concurrent `run_sync` callers await the same
//! run, and `trigger` calls that land while a run is active coalesce into a
//! single follow-up pass.

use std::sync::Arc;

use checksync_common::error::ErrorClassification;
use checksync_common::time::SharedClock;
use checksync_common::{CommonResult, ExponentialBackoff};
use checksync_domain::constants::{DEFAULT_BATCH_SIZE, MAX_ERROR_MESSAGE_LENGTH};
use checksync_domain::{
    ActionId, ActionStatus, NetworkStatus, QueuedAction, SyncSettings, SyncState,
    SyncStatusRecord, SyncSummary,
};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, instrument, warn};

use super::errors::SyncError;
use super::ports::{FailureKind, RemoteActionApplier, SyncEvent, SyncEventSink};
use crate::network::SyncTrigger;
use crate::optimistic::OptimisticStateManager;
use crate::queue::{ActionQueue, QueueError, QueueStore};

type RunFuture = Shared<BoxFuture<'static, Result<SyncSummary, SyncError>>>;

/// Batch size and retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Actions dispatched between connectivity checks and progress logs
    pub batch_size: usize,
    /// Delay schedule for transient failures
    pub backoff: ExponentialBackoff,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { batch_size: DEFAULT_BATCH_SIZE, backoff: ExponentialBackoff::default() }
    }
}

impl SyncConfig {
    /// Build from the `[sync]` config section.
    pub fn from_settings(settings: &SyncSettings) -> CommonResult<Self> {
        Ok(Self {
            batch_size: settings.batch_size,
            backoff: ExponentialBackoff::new(settings.base_delay, settings.cap_delay)?,
        })
    }
}

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatusView {
    /// `syncing` while a run is active
    pub state: SyncState,
    /// End of the most recent run
    pub last_sync_time: Option<DateTime<Utc>>,
    /// When connectivity last settled to online
    pub last_connected_time: Option<DateTime<Utc>>,
    /// Outcome of the most recent run
    pub last_summary: Option<SyncSummary>,
    /// Terminal failures since the last `clear_errors`
    pub errors: Vec<String>,
}

/// Collaborators of the orchestrator.
pub struct SyncDeps {
    /// Work to drain
    pub queue: Arc<ActionQueue>,
    /// Local view committed or rolled back per outcome
    pub optimistic: Arc<OptimisticStateManager>,
    /// Remote side of each dispatch
    pub applier: Arc<dyn RemoteActionApplier>,
    /// Persistence for the sync status record
    pub store: Arc<dyn QueueStore>,
    /// Receives run and action events
    pub events: Arc<dyn SyncEventSink>,
    /// Timestamps and backoff sleeps
    pub clock: SharedClock,
    /// Settled connectivity, as published by the network monitor
    pub network: watch::Receiver<NetworkStatus>,
}

#[derive(Default)]
struct RunState {
    current: Option<RunFuture>,
    rerun: bool,
    last_summary: Option<SyncSummary>,
    last_sync_time: Option<DateTime<Utc>>,
    last_connected_time: Option<DateTime<Utc>>,
    errors: Vec<String>,
}

enum Dispatch {
    Applied,
    Failed(String),
    Skipped,
    Interrupted,
}

#[derive(Default)]
struct Tally {
    processed: usize,
    failed: usize,
    skipped: usize,
    errors: Vec<String>,
}

struct Inner {
    queue: Arc<ActionQueue>,
    optimistic: Arc<OptimisticStateManager>,
    applier: Arc<dyn RemoteActionApplier>,
    store: Arc<dyn QueueStore>,
    events: Arc<dyn SyncEventSink>,
    clock: SharedClock,
    network: watch::Receiver<NetworkStatus>,
    config: SyncConfig,
    cancel_backoff: Notify,
    state: Mutex<RunState>,
}

/// Drains the action queue against the remote applier.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("config", &self.inner.config)
            .field("state", &self.status().state)
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Create an orchestrator, restoring the persisted sync status.
    ///
    /// A status left `in progress` by a crash is reset; an unreadable status
    /// record is logged and replaced.
    pub async fn open(deps: SyncDeps, config: SyncConfig) -> Self {
        let restored = match deps.store.load_sync_status().await {
            Ok(record) => record.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "Failed to load sync status; starting fresh");
                SyncStatusRecord::default()
            }
        };
        if restored.is_in_progress {
            info!("Previous sync run did not finish; resetting status");
        }

        let state = RunState {
            last_sync_time: restored.last_sync_time,
            last_connected_time: restored.last_connected_time,
            errors: restored.errors,
            ..RunState::default()
        };

        Self {
            inner: Arc::new(Inner {
                queue: deps.queue,
                optimistic: deps.optimistic,
                applier: deps.applier,
                store: deps.store,
                events: deps.events,
                clock: deps.clock,
                network: deps.network,
                config,
                cancel_backoff: Notify::new(),
                state: Mutex::new(state),
            }),
        }
    }

    /// Run a sync pass, or join the one already running.
    ///
    /// Fails with [`SyncError::Offline`] without touching any state when
    /// offline and idle.
    pub async fn run_sync(&self) -> Result<SyncSummary, SyncError> {
        let run = {
            let mut state = self.inner.state.lock();
            if let Some(run) = state.current.clone() {
                debug!("Joining in-flight sync run");
                run
            } else {
                if !self.inner.is_online() {
                    return Err(SyncError::Offline);
                }
                let run = Inner::spawn_run(&self.inner);
                state.current = Some(run.clone());
                run
            }
        };
        run.await
    }

    /// Collapse any backoff wait in progress and run a sync now.
    pub async fn sync_now(&self) -> Result<SyncSummary, SyncError> {
        info!("Manual sync requested");
        self.inner.cancel_backoff.notify_waiters();
        self.run_sync().await
    }

    /// Request a sync without waiting for it.
    ///
    /// While a run is active this only schedules one follow-up pass, however
    /// many times it is called.
    pub fn trigger(&self) {
        let mut state = self.inner.state.lock();
        if state.current.is_some() {
            state.rerun = true;
            return;
        }
        if !self.inner.is_online() {
            debug!("Sync trigger ignored while offline");
            return;
        }
        state.current = Some(Inner::spawn_run(&self.inner));
    }

    /// Whether a run is active.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.inner.state.lock().current.is_some()
    }

    #[must_use]
    pub fn status(&self) -> SyncStatusView {
        let state = self.inner.state.lock();
        SyncStatusView {
            state: if state.current.is_some() { SyncState::Syncing } else { SyncState::Idle },
            last_sync_time: state.last_sync_time,
            last_connected_time: state.last_connected_time,
            last_summary: state.last_summary.clone(),
            errors: state.errors.clone(),
        }
    }

    /// Record that connectivity has settled to online, and persist it.
    pub async fn mark_connected(&self) {
        self.inner.stamp_connected();
        let in_progress = self.is_syncing();
        self.inner.persist_status(in_progress).await;
    }

    /// Forget accumulated failure messages.
    pub async fn clear_errors(&self) {
        self.inner.state.lock().errors.clear();
        let in_progress = self.is_syncing();
        self.inner.persist_status(in_progress).await;
    }
}

impl SyncTrigger for SyncOrchestrator {
    fn trigger(&self) {
        Self::trigger(self);
    }

    fn connected(&self) {
        self.inner.stamp_connected();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let in_progress = inner.state.lock().current.is_some();
            inner.persist_status(in_progress).await;
        });
    }
}

impl Inner {
    fn is_online(&self) -> bool {
        self.network.borrow().is_online
    }

    fn stamp_connected(&self) {
        let now = self.clock.utc_now();
        self.state.lock().last_connected_time = Some(now);
        debug!(at = %now, "Connectivity stamped");
    }

    fn spawn_run(inner: &Arc<Self>) -> RunFuture {
        let task = tokio::spawn(Arc::clone(inner).drive());
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Sync run task failed");
                    Err(SyncError::Aborted(e.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn drive(self: Arc<Self>) -> Result<SyncSummary, SyncError> {
        let mut result = self.execute().await;
        loop {
            let rerun = std::mem::take(&mut self.state.lock().rerun);
            if rerun && self.is_online() && !self.queue.peek_batch(1).await.is_empty() {
                debug!("Running coalesced follow-up sync pass");
                result = self.execute().await;
                continue;
            }

            let mut state = self.state.lock();
            if state.rerun {
                continue;
            }
            state.current = None;
            return result;
        }
    }

    #[instrument(skip(self), fields(batch_size = self.config.batch_size))]
    async fn execute(&self) -> Result<SyncSummary, SyncError> {
        let started_at = self.clock.utc_now();
        self.persist_status(true).await;

        let pending = self.queue.pending_ids().await;
        let total = pending.len();
        info!(total, "Sync started");
        self.events.emit(&SyncEvent::SyncStarted { total });

        let (tally, aborted) = self.drain(&pending).await;

        let finished_at = self.clock.utc_now();
        let summary = SyncSummary {
            started_at,
            finished_at,
            total,
            processed_count: tally.processed,
            failed_count: tally.failed,
            skipped_count: tally.skipped,
            errors: tally.errors,
        };

        {
            let mut state = self.state.lock();
            state.last_sync_time = Some(finished_at);
            state.last_summary = Some(summary.clone());
            state.errors.extend(summary.errors.iter().cloned());
        }
        self.persist_status(false).await;

        if let Some(err) = aborted {
            error!(error = %err, "Sync run aborted");
            let mut errors = summary.errors.clone();
            errors.push(err.to_string());
            self.events.emit(&SyncEvent::SyncFailed { errors, summary });
            return Err(SyncError::Queue(err));
        }

        if summary.is_success() {
            info!(
                processed = summary.processed_count,
                skipped = summary.skipped_count,
                "Sync completed"
            );
            self.events.emit(&SyncEvent::SyncSucceeded(summary.clone()));
        } else {
            warn!(
                processed = summary.processed_count,
                failed = summary.failed_count,
                "Sync completed with failures"
            );
            self.events
                .emit(&SyncEvent::SyncFailed { errors: summary.errors.clone(), summary: summary.clone() });
        }
        Ok(summary)
    }

    async fn drain(&self, pending: &[ActionId]) -> (Tally, Option<QueueError>) {
        let total = pending.len();
        let batch_size = self.config.batch_size.max(1);
        let mut tally = Tally::default();

        for (index, id) in pending.iter().enumerate() {
            if !self.is_online() {
                info!(remaining = total - index, "Network lost; leaving remaining actions queued");
                tally.skipped += total - index;
                break;
            }
            if index % batch_size == 0 {
                debug!(batch = index / batch_size + 1, from = index, total, "Dispatching batch");
            }

            match self.dispatch(*id).await {
                Ok(Dispatch::Applied) => tally.processed += 1,
                Ok(Dispatch::Failed(message)) => {
                    tally.failed += 1;
                    tally.errors.push(message);
                }
                Ok(Dispatch::Skipped) => tally.skipped += 1,
                Ok(Dispatch::Interrupted) => {
                    tally.skipped += total - index;
                    break;
                }
                Err(err) => {
                    tally.skipped += total - index;
                    return (tally, Some(err));
                }
            }

            let done = index + 1;
            self.events.emit(&SyncEvent::SyncProgress {
                processed: done,
                total,
                percent: percent(done, total),
            });
        }

        (tally, None)
    }

    async fn dispatch(&self, id: ActionId) -> Result<Dispatch, QueueError> {
        loop {
            let Some(action) = self.queue.claim(&id).await? else {
                debug!(action_id = %id, "Action no longer pending; skipping");
                return Ok(Dispatch::Skipped);
            };
            debug!(action_id = %id, attempt = action.retry_count + 1, "Dispatching action");

            let err = match self.applier.apply(&id, &action.kind).await {
                Ok(canonical) => {
                    self.optimistic.commit(&id, canonical);
                    self.queue.remove(&id).await?;
                    debug!(action_id = %id, "Action applied");
                    self.events.emit(&SyncEvent::ActionSucceeded { id });
                    return Ok(Dispatch::Applied);
                }
                Err(err) => err,
            };

            let message = truncate(&err.to_string());
            if !err.is_retryable() {
                let summary = format!("Failed to sync {}: {message}", action.action_type());
                return self.fail(&action, FailureKind::Permanent, summary).await;
            }

            let Some(updated) = self.queue.increment_retry(&id, Some(&message)).await? else {
                return Ok(Dispatch::Skipped);
            };
            if updated.retries_exhausted() {
                let summary = format!(
                    "Failed to sync {} after {} attempts: {message}",
                    updated.action_type(),
                    updated.retry_count
                );
                return self.fail(&updated, FailureKind::RetryExhausted, summary).await;
            }

            let delay = err
                .retry_after()
                .map_or_else(|| self.config.backoff.delay(updated.retry_count), |d| {
                    d.min(self.config.backoff.cap())
                });
            self.queue.mark_status(&id, ActionStatus::Failed).await?;
            warn!(
                action_id = %id,
                attempt = updated.retry_count,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %message,
                "Transient failure; retry scheduled"
            );
            self.events.emit(&SyncEvent::ActionRetryScheduled {
                id,
                attempt: updated.retry_count,
                delay,
                error: message,
            });

            self.wait_backoff(delay).await;
            self.queue.mark_status(&id, ActionStatus::Pending).await?;

            if !self.is_online() {
                info!(action_id = %id, "Network lost during backoff; action stays queued");
                return Ok(Dispatch::Interrupted);
            }
        }
    }

    async fn wait_backoff(&self, delay: std::time::Duration) {
        let cancelled = self.cancel_backoff.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        tokio::select! {
            () = self.clock.sleep(delay) => {}
            () = cancelled => debug!("Backoff cancelled by manual sync"),
        }
    }

    async fn fail(
        &self,
        action: &QueuedAction,
        kind: FailureKind,
        message: String,
    ) -> Result<Dispatch, QueueError> {
        self.optimistic.rollback(&action.id);
        self.queue.remove(&action.id).await?;
        warn!(action_id = %action.id, ?kind, error = %message, "Action failed; local change rolled back");
        self.events.emit(&SyncEvent::ActionFailed { id: action.id, kind, message: message.clone() });
        Ok(Dispatch::Failed(message))
    }

    async fn persist_status(&self, in_progress: bool) {
        let pending_count = self.queue.len().await;
        let record = {
            let state = self.state.lock();
            SyncStatusRecord {
                is_in_progress: in_progress,
                pending_count,
                last_sync_time: state.last_sync_time,
                last_connected_time: state.last_connected_time,
                errors: state.errors.clone(),
            }
        };
        if let Err(err) = self.store.save_sync_status(&record).await {
            warn!(error = %err, "Failed to persist sync status");
        }
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from((done * 100 + total / 2) / total).unwrap_or(100)
}

fn truncate(message: &str) -> String {
    if message.len() <= MAX_ERROR_MESSAGE_LENGTH {
        return message.to_owned();
    }
    let mut end = MAX_ERROR_MESSAGE_LENGTH;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &message[..end])
}
