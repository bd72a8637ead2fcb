//! Application constants
//!
//! Centralized location for the domain-level constants used by the queue and
//! orchestrator.

use std::time::Duration;

// Storage keys
pub const QUEUE_STORAGE_KEY: &str = "checklist-sync-queue";
pub const SYNC_STATUS_STORAGE_KEY: &str = "checklist-sync-status";

// Queue defaults
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

// Retry backoff
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_CAP_DELAY: Duration = Duration::from_secs(60);

// Network debouncing
pub const DEFAULT_STABILITY_WINDOW: Duration = Duration::from_millis(500);

// Remote applier
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 512;

// Estimated per-action sync cost by connection quality
pub const SYNC_COST_POOR: Duration = Duration::from_millis(2_000);
pub const SYNC_COST_FAIR: Duration = Duration::from_millis(1_500);
pub const SYNC_COST_GOOD: Duration = Duration::from_millis(1_000);
pub const SYNC_COST_EXCELLENT: Duration = Duration::from_millis(500);
