//! Port interfaces for sync operations

use std::time::Duration;

use async_trait::async_trait;
use checksync_domain::{ActionId, ActionKind, ActionType, SyncSummary};
use serde_json::Value;

use super::errors::ApplyError;
use crate::network::NetworkEvent;

/// Delivers one action to the server.
///
/// The action id is stable across attempts and must be forwarded as the
/// idempotency key, so a retried action that already landed is not applied
/// twice.
#[async_trait]
pub trait RemoteActionApplier: Send + Sync {
    /// Apply the action remotely.
    ///
    /// Returns the server's canonical value of the target entity when it sent
    /// one back.
    async fn apply(&self, id: &ActionId, kind: &ActionKind) -> Result<Option<Value>, ApplyError>;
}

/// Why an action left the queue without being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Validation or authorization failure
    Permanent,
    /// Transient failure that used up the retry budget
    RetryExhausted,
}

/// Status notifications for whoever renders sync state.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    ActionEnqueued { id: ActionId, action_type: ActionType },
    /// An intent was merged into, rejected by, or cancelled out a pending
    /// action.
    ActionDeduplicated { existing: ActionId, action_type: ActionType },
    SyncStarted { total: usize },
    SyncProgress { processed: usize, total: usize, percent: u8 },
    ActionSucceeded { id: ActionId },
    ActionRetryScheduled { id: ActionId, attempt: u32, delay: Duration, error: String },
    ActionFailed { id: ActionId, kind: FailureKind, message: String },
    /// Persisted records were dropped as unreadable when the queue was opened.
    QueueCorrupted { dropped: usize },
    SyncSucceeded(SyncSummary),
    SyncFailed { errors: Vec<String>, summary: SyncSummary },
    Network(NetworkEvent),
}

/// Receives [`SyncEvent`]s. Called inline; implementations must not block.
pub trait SyncEventSink: Send + Sync {
    fn emit(&self, event: &SyncEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl SyncEventSink for NoopEventSink {
    fn emit(&self, _event: &SyncEvent) {}
}
