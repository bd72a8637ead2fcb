//! Port interfaces for durable queue storage

use async_trait::async_trait;
use checksync_domain::{QueuedAction, Result, SyncStatusRecord};
use serde_json::Value;

/// Raw queue records as read from storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedQueue {
    /// Records in stored order, not yet validated
    pub records: Vec<Value>,
    /// Records known to exist but lost before they could be returned, e.g.
    /// when the whole file is unreadable
    pub unreadable: usize,
}

impl From<Vec<Value>> for LoadedQueue {
    fn from(records: Vec<Value>) -> Self {
        Self { records, unreadable: 0 }
    }
}

/// Durable key-value storage for the queue and the sync status record.
///
/// `load_queue` returns raw JSON records so that the queue can validate each
/// one independently and drop corrupt entries without losing the rest.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Load the persisted queue records in stored order
    async fn load_queue(&self) -> Result<LoadedQueue>;

    /// Replace the persisted queue with `actions` (already in queue order)
    async fn save_queue(&self, actions: &[QueuedAction]) -> Result<()>;

    /// Load the sync status record, if one was ever saved
    async fn load_sync_status(&self) -> Result<Option<SyncStatusRecord>>;

    /// Persist the sync status record
    async fn save_sync_status(&self, status: &SyncStatusRecord) -> Result<()>;
}
