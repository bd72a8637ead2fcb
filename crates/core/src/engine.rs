//! Offline sync engine facade.
//!
//! Wires the queue, optimistic state, orchestrator and network monitor
//! together and is the only entry point callers need:
//!
//! ```text
//! submit ──► ActionQueue::enqueue_with ──► OptimisticStateManager (same lock)
//!                                      └─► SyncOrchestrator::trigger (if online)
//! NetworkMonitor ── became online ─────► SyncOrchestrator::connected, ::trigger
//! ```

use std::sync::Arc;
use std::time::Duration;

use checksync_common::error::CommonError;
use checksync_common::time::SharedClock;
use checksync_domain::{
    ChecksyncError, Config, NetworkStatus, NewAction, QueueStats, SyncSummary,
};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{info, instrument, warn};

use crate::network::{MonitorError, NetworkMonitor, NetworkStatusProvider};
use crate::optimistic::{OptimisticStateManager, ReadModel};
use crate::queue::{ActionQueue, EnqueueOutcome, QueueConfig, QueueError, QueueStore};
use crate::sync::{
    RemoteActionApplier, SyncConfig, SyncDeps, SyncError, SyncEvent, SyncEventSink,
    SyncOrchestrator, SyncStatusView,
};

/// External collaborators of the engine.
pub struct EngineDeps {
    /// Durable home of the queue and sync status
    pub store: Arc<dyn QueueStore>,
    /// Delivers actions to the backend
    pub applier: Arc<dyn RemoteActionApplier>,
    /// Raw connectivity readings, debounced by the engine
    pub network: Arc<dyn NetworkStatusProvider>,
    /// Receives every engine event
    pub events: Arc<dyn SyncEventSink>,
    /// Time source for timestamps, debounce and backoff
    pub clock: SharedClock,
}

/// Errors surfaced by [`OfflineSync`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ChecksyncError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Common(#[from] CommonError),
}

/// Offline-first mutation pipeline.
pub struct OfflineSync {
    queue: Arc<ActionQueue>,
    optimistic: Arc<OptimisticStateManager>,
    orchestrator: SyncOrchestrator,
    monitor: Mutex<NetworkMonitor>,
    events: Arc<dyn SyncEventSink>,
    network: watch::Receiver<NetworkStatus>,
}

impl std::fmt::Debug for OfflineSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineSync")
            .field("queue", &self.queue)
            .field("orchestrator", &self.orchestrator)
            .field("network", &*self.network.borrow())
            .finish_non_exhaustive()
    }
}

impl OfflineSync {
    /// Load the queue and assemble the engine. Background work starts with
    /// [`Self::start`].
    ///
    /// Every action restored from storage gets its optimistic layer back, so
    /// the read model reflects pending work as soon as the engine opens.
    #[instrument(skip_all)]
    pub async fn open(deps: EngineDeps, config: &Config) -> Result<Self, EngineError> {
        config.validate()?;
        let EngineDeps { store, applier, network, events, clock } = deps;

        let queue = Arc::new(
            ActionQueue::open(Arc::clone(&store), Arc::clone(&clock), QueueConfig::from(&config.queue))
                .await?,
        );
        if queue.dropped_on_load() > 0 {
            events.emit(&SyncEvent::QueueCorrupted { dropped: queue.dropped_on_load() });
        }

        let optimistic = Arc::new(OptimisticStateManager::new(Arc::clone(&clock)));
        for action in queue.snapshot().await {
            optimistic.apply_at(action.id, &action.kind, action.created_at);
        }

        let monitor = NetworkMonitor::new(
            network,
            Arc::clone(&clock),
            config.network.stability_window,
            Arc::clone(&events),
        );
        let settled = monitor.subscribe();

        let orchestrator = SyncOrchestrator::open(
            SyncDeps {
                queue: Arc::clone(&queue),
                optimistic: Arc::clone(&optimistic),
                applier,
                store,
                events: Arc::clone(&events),
                clock,
                network: settled.clone(),
            },
            SyncConfig::from_settings(&config.sync)?,
        )
        .await;
        let monitor = monitor.with_trigger(Arc::new(orchestrator.clone()));

        info!(queued = queue.len().await, "Offline sync engine opened");
        Ok(Self {
            queue,
            optimistic,
            orchestrator,
            monitor: Mutex::new(monitor),
            events,
            network: settled,
        })
    }

    /// Start watching connectivity, and drain the queue if already online.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.monitor.lock().await.start()?;
        if self.is_online() {
            self.orchestrator.mark_connected().await;
            if !self.queue.is_empty().await {
                self.orchestrator.trigger();
            }
        }
        Ok(())
    }

    /// Stop watching connectivity. A sync run already in flight finishes on
    /// its own.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        match self.monitor.lock().await.stop().await {
            Ok(()) | Err(MonitorError::NotRunning) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Record a mutation: enqueue it, show its effect locally, and sync if
    /// online.
    ///
    /// The optimistic effect is reconciled with the dedup outcome while the
    /// queue is still locked, so no sync run can observe the action without
    /// its patch. A rejected duplicate changes nothing; a cancelled pair
    /// removes the earlier action's effect.
    #[instrument(skip(self, intent), fields(action_type = %intent.kind.action_type()))]
    pub async fn submit(&self, intent: NewAction) -> Result<EnqueueOutcome, EngineError> {
        let action_type = intent.kind.action_type();
        let optimistic = &self.optimistic;

        let outcome = self
            .queue
            .enqueue_with(intent, |outcome| match outcome {
                EnqueueOutcome::Enqueued(action) | EnqueueOutcome::Superseded(action) => {
                    optimistic.apply(action.id, &action.kind);
                }
                EnqueueOutcome::Cancelled { removed } => {
                    optimistic.rollback(&removed.id);
                }
                EnqueueOutcome::Rejected { .. } => {}
            })
            .await?;

        let event = match &outcome {
            EnqueueOutcome::Enqueued(action) => {
                SyncEvent::ActionEnqueued { id: action.id, action_type }
            }
            EnqueueOutcome::Superseded(action) => {
                SyncEvent::ActionDeduplicated { existing: action.id, action_type }
            }
            EnqueueOutcome::Rejected { existing } => {
                SyncEvent::ActionDeduplicated { existing: *existing, action_type }
            }
            EnqueueOutcome::Cancelled { removed } => {
                SyncEvent::ActionDeduplicated { existing: removed.id, action_type }
            }
        };
        self.events.emit(&event);

        if outcome.has_new_work() && self.is_online() {
            self.orchestrator.trigger();
        }
        Ok(outcome)
    }

    /// Run a sync pass now, collapsing any backoff wait.
    pub async fn sync_now(&self) -> Result<SyncSummary, EngineError> {
        Ok(self.orchestrator.sync_now().await?)
    }

    /// Run a sync pass, or join the one in flight.
    pub async fn run_sync(&self) -> Result<SyncSummary, EngineError> {
        Ok(self.orchestrator.run_sync().await?)
    }

    /// Settled connectivity.
    #[must_use]
    pub fn network_status(&self) -> NetworkStatus {
        *self.network.borrow()
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.network_status().is_online
    }

    #[must_use]
    pub fn sync_status(&self) -> SyncStatusView {
        self.orchestrator.status()
    }

    pub async fn queue_stats(&self) -> QueueStats {
        self.queue.stats().await
    }

    /// Rough time to drain the queue at the current network quality.
    pub async fn estimated_sync_time(&self) -> Duration {
        self.queue.estimated_sync_time(self.network_status().quality).await
    }

    pub async fn clear_errors(&self) {
        self.orchestrator.clear_errors().await;
    }

    /// Drop every queued action and undo its local effect. Returns how many
    /// actions were dropped.
    pub async fn clear_queue(&self) -> Result<usize, EngineError> {
        let removed = self.queue.clear().await?;
        for action in &removed {
            self.optimistic.rollback(&action.id);
        }
        if !removed.is_empty() {
            warn!(dropped = removed.len(), "Queued actions discarded");
        }
        Ok(removed.len())
    }

    /// Read model including every pending optimistic effect.
    #[must_use]
    pub fn read_model(&self) -> ReadModel {
        self.optimistic.snapshot()
    }

    #[must_use]
    pub fn subscribe_read_model(&self) -> watch::Receiver<ReadModel> {
        self.optimistic.subscribe()
    }

    #[must_use]
    pub const fn optimistic(&self) -> &Arc<OptimisticStateManager> {
        &self.optimistic
    }

    #[must_use]
    pub const fn queue(&self) -> &Arc<ActionQueue> {
        &self.queue
    }

    #[must_use]
    pub const fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }
}

