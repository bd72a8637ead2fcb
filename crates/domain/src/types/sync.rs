//! Sync run results and the persisted sync status record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// Orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
}

impl_domain_status_conversions!(SyncState {
    Idle => "idle",
    Syncing => "syncing",
});

/// Outcome of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Actions in the run's snapshot.
    pub total: usize,
    pub processed_count: usize,
    pub failed_count: usize,
    /// Snapshot entries that were gone (cancelled out) by dispatch time, or
    /// left pending because the network dropped mid-run.
    pub skipped_count: usize,
    pub errors: Vec<String>,
}

impl SyncSummary {
    /// No action failed terminally during the run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Persisted sync status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SyncStatusRecord {
    /// A run was active when this was written
    pub is_in_progress: bool,
    /// Queue length when this was written
    pub pending_count: usize,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// When connectivity last settled to online
    pub last_connected_time: Option<DateTime<Utc>>,
    /// Terminal failure messages not yet cleared
    pub errors: Vec<String>,
}

/// Counts by status over the current queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub retrying: usize,
    pub failed: usize,
    pub critical: usize,
}
