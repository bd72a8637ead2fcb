//! Durable action queue and deduplication

pub mod dedup;
pub mod errors;
pub mod ports;
pub mod service;

pub use dedup::{merge_kinds, policy_for, DedupDecision, DedupPolicy, DeduplicationIndex};
pub use errors::{QueueError, QueueResult};
pub use ports::{LoadedQueue, QueueStore};
pub use service::{ActionQueue, EnqueueOutcome, QueueConfig};
