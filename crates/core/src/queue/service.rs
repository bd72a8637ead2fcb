//! Durable, priority-ordered action queue.
//!
//! Every mutation is staged on a copy of the queue state, persisted through
//! the [`QueueStore`], and only then swapped in. The state is built from
//! persistent `im` collections, so staging a copy is O(1) and a failed
//! persist leaves the live queue untouched.
//!
//! The state lock is held across the persist await, which makes each
//! mutation a test-and-set on the ordered structure: concurrent enqueues
//! cannot interleave between the dedup decision and the write.

use std::sync::Arc;
use std::time::Duration;

use checksync_common::time::SharedClock;
use checksync_domain::constants::{DEFAULT_MAX_RETRIES, DEFAULT_QUEUE_CAPACITY};
use checksync_domain::{
    ActionId, ActionStatus, NetworkQuality, NewAction, OrderKey, Priority, QueueStats,
    QueuedAction,
};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::dedup::{merge_kinds, DedupDecision, DeduplicationIndex};
use super::errors::{QueueError, QueueResult};
use super::ports::{LoadedQueue, QueueStore};

/// Queue sizing and retry defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum number of queued actions; enqueue beyond it fails
    pub max_capacity: usize,
    /// Retry budget for actions that do not specify one
    pub default_max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_capacity: DEFAULT_QUEUE_CAPACITY, default_max_retries: DEFAULT_MAX_RETRIES }
    }
}

impl From<&checksync_domain::QueueSettings> for QueueConfig {
    fn from(settings: &checksync_domain::QueueSettings) -> Self {
        Self {
            max_capacity: settings.max_capacity,
            default_max_retries: settings.default_max_retries,
        }
    }
}

/// What `enqueue` did with the caller's intent.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// A new action was added.
    Enqueued(QueuedAction),
    /// The intent was folded into an existing pending action, which keeps its
    /// id and `created_at`.
    Superseded(QueuedAction),
    /// An equivalent action is already pending; nothing changed.
    Rejected { existing: ActionId },
    /// The intent annihilated a pending opposite action, which was removed.
    Cancelled { removed: QueuedAction },
}

impl EnqueueOutcome {
    /// Id of the action now carrying the intent, if any.
    #[must_use]
    pub const fn action_id(&self) -> Option<ActionId> {
        match self {
            Self::Enqueued(action) | Self::Superseded(action) => Some(action.id),
            Self::Rejected { .. } | Self::Cancelled { .. } => None,
        }
    }

    /// Whether the queue gained work to dispatch.
    #[must_use]
    pub const fn has_new_work(&self) -> bool {
        matches!(self, Self::Enqueued(_) | Self::Superseded(_))
    }
}

#[derive(Debug, Clone, Default)]
struct QueueState {
    order: im::OrdMap<OrderKey, ActionId>,
    actions: im::HashMap<ActionId, QueuedAction>,
    dedup: DeduplicationIndex,
    next_sequence: u64,
}

impl QueueState {
    fn ordered(&self) -> Vec<QueuedAction> {
        self.order.values().filter_map(|id| self.actions.get(id).cloned()).collect()
    }

    fn insert(&mut self, action: QueuedAction) {
        if action.is_pending() {
            self.dedup.insert(&action);
        }
        self.next_sequence = self.next_sequence.max(action.sequence.saturating_add(1));
        self.order.insert(action.order_key(), action.id);
        self.actions.insert(action.id, action);
    }

    fn remove(&mut self, id: &ActionId) -> Option<QueuedAction> {
        let action = self.actions.remove(id)?;
        self.order.remove(&action.order_key());
        self.dedup.remove(&action);
        Some(action)
    }

    /// Replace an action in place, keeping the order map and dedup index in
    /// step with any priority or status change.
    fn replace(&mut self, updated: QueuedAction) {
        if let Some(previous) = self.remove(&updated.id) {
            debug_assert_eq!(previous.sequence, updated.sequence);
        }
        self.insert(updated);
    }
}

/// Durable, ordered collection of pending mutations.
pub struct ActionQueue {
    store: Arc<dyn QueueStore>,
    clock: SharedClock,
    config: QueueConfig,
    state: Mutex<QueueState>,
    dropped_on_load: usize,
}

impl std::fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionQueue")
            .field("config", &self.config)
            .field("dropped_on_load", &self.dropped_on_load)
            .finish_non_exhaustive()
    }
}

impl ActionQueue {
    /// Load the persisted queue.
    ///
    /// Records that fail to decode, repeat an id, or carry a retry count above
    /// their budget are dropped and logged, and so are records the store
    /// reports as unreadable. Actions persisted mid-dispatch
    /// (`retrying`) or mid-backoff (`failed`) are reset to `pending`. If
    /// anything was dropped or reset, the cleaned queue is written back.
    #[instrument(skip(store, clock), fields(max_capacity = config.max_capacity))]
    pub async fn open(
        store: Arc<dyn QueueStore>,
        clock: SharedClock,
        config: QueueConfig,
    ) -> QueueResult<Self> {
        let LoadedQueue { records, unreadable } = store.load_queue().await?;
        let (state, malformed, reset) = Self::rebuild(records);
        let dropped = malformed + unreadable;

        if malformed > 0 || reset > 0 {
            store.save_queue(&state.ordered()).await?;
        }

        info!(
            loaded = state.actions.len(),
            dropped_corrupt = dropped,
            reset_to_pending = reset,
            "Action queue opened"
        );

        Ok(Self { store, clock, config, state: Mutex::new(state), dropped_on_load: dropped })
    }

    fn rebuild(records: Vec<Value>) -> (QueueState, usize, usize) {
        let mut state = QueueState::default();
        let mut dropped = 0_usize;
        let mut reset = 0_usize;

        for (position, record) in records.into_iter().enumerate() {
            let mut action = match serde_json::from_value::<QueuedAction>(record) {
                Ok(action) => action,
                Err(err) => {
                    warn!(position, error = %err, "Dropping malformed queued action");
                    dropped += 1;
                    continue;
                }
            };

            if state.actions.contains_key(&action.id) {
                warn!(position, action_id = %action.id, "Dropping duplicate queued action id");
                dropped += 1;
                continue;
            }

            if action.retry_count > action.max_retries {
                warn!(
                    position,
                    action_id = %action.id,
                    retry_count = action.retry_count,
                    max_retries = action.max_retries,
                    "Dropping queued action with retry count above its budget"
                );
                dropped += 1;
                continue;
            }

            if action.status != ActionStatus::Pending {
                action.status = ActionStatus::Pending;
                reset += 1;
            }
            state.insert(action);
        }

        (state, dropped, reset)
    }

    /// Number of persisted records dropped as corrupt by [`Self::open`].
    #[must_use]
    pub const fn dropped_on_load(&self) -> usize {
        self.dropped_on_load
    }

    /// Enqueue a mutation, deduplicating against pending actions.
    pub async fn enqueue(&self, intent: NewAction) -> QueueResult<EnqueueOutcome> {
        self.enqueue_with(intent, |_| {}).await
    }

    /// Enqueue a mutation and run `on_commit` while the queue is still locked.
    ///
    /// `on_commit` runs only after the outcome has been persisted, and before
    /// any other queue operation (including the orchestrator's
    /// [`Self::peek_batch`]) can observe it. The engine uses this to create the
    /// action's optimistic patch atomically with the enqueue.
    #[instrument(skip(self, intent, on_commit), fields(action_type = %intent.kind.action_type()))]
    pub async fn enqueue_with<F>(&self, intent: NewAction, on_commit: F) -> QueueResult<EnqueueOutcome>
    where
        F: FnOnce(&EnqueueOutcome),
    {
        let mut state = self.state.lock().await;
        let mut next = state.clone();

        let NewAction { kind, priority, max_retries } = intent;
        let priority = priority.unwrap_or_else(|| kind.default_priority());
        let decision = next.dedup.decide(&kind, |id| state.actions.get(id));

        let outcome = match decision {
            DedupDecision::Insert => {
                if next.actions.len() >= self.config.max_capacity {
                    warn!(capacity = self.config.max_capacity, "Queue at capacity; rejecting action");
                    return Err(QueueError::CapacityExceeded { capacity: self.config.max_capacity });
                }
                let action = QueuedAction {
                    id: ActionId::new(),
                    target_entity_id: kind.target().clone(),
                    kind,
                    created_at: self.clock.utc_now(),
                    sequence: next.next_sequence,
                    priority,
                    retry_count: 0,
                    max_retries: max_retries.unwrap_or(self.config.default_max_retries),
                    status: ActionStatus::Pending,
                    last_error: None,
                    last_attempt_at: None,
                };
                next.insert(action.clone());
                EnqueueOutcome::Enqueued(action)
            }
            DedupDecision::Supersede(existing_id) => {
                let Some(existing) = next.actions.get(&existing_id).cloned() else {
                    return Err(QueueError::Common(
                        checksync_common::CommonError::internal_with_context(
                            format!("dedup index references missing action {existing_id}"),
                            "ActionQueue::enqueue",
                        ),
                    ));
                };
                let merged = QueuedAction {
                    kind: merge_kinds(&existing.kind, kind),
                    priority: existing.priority.min(priority),
                    ..existing
                };
                next.replace(merged.clone());
                EnqueueOutcome::Superseded(merged)
            }
            DedupDecision::Reject(existing) => {
                debug!(existing = %existing, "Rejected duplicate action");
                let outcome = EnqueueOutcome::Rejected { existing };
                on_commit(&outcome);
                return Ok(outcome);
            }
            DedupDecision::Cancel(existing_id) => match next.remove(&existing_id) {
                Some(removed) => EnqueueOutcome::Cancelled { removed },
                None => {
                    return Err(QueueError::Common(
                        checksync_common::CommonError::internal_with_context(
                            format!("dedup index references missing action {existing_id}"),
                            "ActionQueue::enqueue",
                        ),
                    ))
                }
            },
        };

        self.store.save_queue(&next.ordered()).await?;
        *state = next;
        on_commit(&outcome);

        match &outcome {
            EnqueueOutcome::Enqueued(action) => {
                info!(action_id = %action.id, priority = %action.priority, "Action enqueued");
            }
            EnqueueOutcome::Superseded(action) => {
                info!(action_id = %action.id, "Action superseded pending action");
            }
            EnqueueOutcome::Cancelled { removed } => {
                info!(removed = %removed.id, "Action cancelled out a pending action");
            }
            EnqueueOutcome::Rejected { .. } => {}
        }

        Ok(outcome)
    }

    /// Up to `n` pending actions in queue order.
    pub async fn peek_batch(&self, n: usize) -> Vec<QueuedAction> {
        let state = self.state.lock().await;
        state
            .order
            .values()
            .filter_map(|id| state.actions.get(id))
            .filter(|action| action.is_pending())
            .take(n)
            .cloned()
            .collect()
    }

    /// Ids of every pending action, in dispatch order.
    pub async fn pending_ids(&self) -> Vec<ActionId> {
        let state = self.state.lock().await;
        state
            .order
            .values()
            .filter(|id| state.actions.get(*id).is_some_and(QueuedAction::is_pending))
            .copied()
            .collect()
    }

    /// Current copy of one action.
    pub async fn get(&self, id: &ActionId) -> Option<QueuedAction> {
        self.state.lock().await.actions.get(id).cloned()
    }

    /// Every action in queue order, regardless of status.
    pub async fn snapshot(&self) -> Vec<QueuedAction> {
        self.state.lock().await.ordered()
    }

    /// Set an action's status. Returns the updated action, or `None` if the
    /// id is absent.
    pub async fn mark_status(
        &self,
        id: &ActionId,
        status: ActionStatus,
    ) -> QueueResult<Option<QueuedAction>> {
        let now = self.clock.utc_now();
        self.update(id, |action| {
            if action.status == status {
                return false;
            }
            action.status = status;
            if status == ActionStatus::Retrying {
                action.last_attempt_at = Some(now);
            }
            true
        })
        .await
    }

    /// Move a pending action to `retrying` and return its current record.
    ///
    /// The status check, the transition and the read happen under one lock,
    /// so the returned payload is exactly what a concurrent supersede left
    /// behind. Returns `None` if the action is absent or not pending.
    pub async fn claim(&self, id: &ActionId) -> QueueResult<Option<QueuedAction>> {
        let mut state = self.state.lock().await;
        let Some(current) = state.actions.get(id) else {
            return Ok(None);
        };
        if !current.is_pending() {
            return Ok(None);
        }

        let claimed = QueuedAction {
            status: ActionStatus::Retrying,
            last_attempt_at: Some(self.clock.utc_now()),
            ..current.clone()
        };
        let mut next = state.clone();
        next.replace(claimed.clone());
        self.store.save_queue(&next.ordered()).await?;
        *state = next;
        debug!(action_id = %id, "Action claimed for dispatch");
        Ok(Some(claimed))
    }

    /// Count one more failed attempt, saturating at `max_retries`.
    ///
    /// `error` is kept as the action's `last_error`. Returns the updated
    /// action, or `None` if the id is absent.
    pub async fn increment_retry(
        &self,
        id: &ActionId,
        error: Option<&str>,
    ) -> QueueResult<Option<QueuedAction>> {
        self.update(id, |action| {
            action.retry_count = action.retry_count.saturating_add(1).min(action.max_retries);
            if let Some(error) = error {
                action.last_error = Some(error.to_owned());
            }
            true
        })
        .await
    }

    /// Remove an action. Returns it, or `None` if it was already gone.
    pub async fn remove(&self, id: &ActionId) -> QueueResult<Option<QueuedAction>> {
        let mut state = self.state.lock().await;
        if !state.actions.contains_key(id) {
            return Ok(None);
        }

        let mut next = state.clone();
        let removed = next.remove(id);
        self.store.save_queue(&next.ordered()).await?;
        *state = next;
        debug!(action_id = %id, remaining = state.actions.len(), "Action removed");
        Ok(removed)
    }

    /// Remove every action. Returns what was removed, in queue order.
    pub async fn clear(&self) -> QueueResult<Vec<QueuedAction>> {
        let mut state = self.state.lock().await;
        let removed = state.ordered();
        if removed.is_empty() {
            return Ok(removed);
        }

        let next = QueueState { next_sequence: state.next_sequence, ..QueueState::default() };
        self.store.save_queue(&[]).await?;
        *state = next;
        info!(removed = removed.len(), "Action queue cleared");
        Ok(removed)
    }

    /// Number of queued actions.
    pub async fn len(&self) -> usize {
        self.state.lock().await.actions.len()
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.actions.is_empty()
    }

    /// Counts by status and priority.
    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        state.actions.values().fold(
            QueueStats { total: state.actions.len(), ..QueueStats::default() },
            |mut stats, action| {
                match action.status {
                    ActionStatus::Pending => stats.pending += 1,
                    ActionStatus::Retrying => stats.retrying += 1,
                    ActionStatus::Failed => stats.failed += 1,
                }
                if action.priority == Priority::Critical {
                    stats.critical += 1;
                }
                stats
            },
        )
    }

    /// Whether any action is waiting out a backoff after a failed attempt.
    pub async fn has_failed_actions(&self) -> bool {
        self.state.lock().await.actions.values().any(|a| a.status == ActionStatus::Failed)
    }

    /// Rough time to drain the pending actions at the given quality.
    pub async fn estimated_sync_time(&self, quality: NetworkQuality) -> Duration {
        let pending = self.state.lock().await.actions.values().filter(|a| a.is_pending()).count();
        quality
            .estimated_cost_per_action()
            .saturating_mul(u32::try_from(pending).unwrap_or(u32::MAX))
    }

    async fn update<F>(&self, id: &ActionId, mutate: F) -> QueueResult<Option<QueuedAction>>
    where
        F: FnOnce(&mut QueuedAction) -> bool,
    {
        let mut state = self.state.lock().await;
        let Some(mut action) = state.actions.get(id).cloned() else {
            return Ok(None);
        };

        if !mutate(&mut action) {
            return Ok(Some(action));
        }

        let mut next = state.clone();
        next.replace(action.clone());
        self.store.save_queue(&next.ordered()).await?;
        *state = next;
        Ok(Some(action))
    }
}
