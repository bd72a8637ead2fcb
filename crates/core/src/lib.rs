//! # Checksync Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - The durable, priority-ordered [`ActionQueue`] and its deduplication rules
//! - The [`OptimisticStateManager`] that applies and reverses local effects
//! - The single-flight [`SyncOrchestrator`] with retry and backoff
//! - The debounced [`NetworkMonitor`]
//! - The [`OfflineSync`] facade that wires them together
//! - Port interfaces (traits) for storage, the remote applier, connectivity
//!   and event reporting
//!
//! ## Architecture Principles
//! - Only depends on `checksync-common` and `checksync-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod engine;
pub mod network;
pub mod optimistic;
pub mod queue;
pub mod sync;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export specific items to avoid ambiguity
pub use engine::{EngineDeps, EngineError, OfflineSync};
pub use network::ports::{NetworkStatusProvider, SyncTrigger};
pub use network::{Debouncer, MonitorError, NetworkEvent, NetworkMonitor, WatchNetworkProvider};
pub use optimistic::{OptimisticStateManager, ReadModel};
pub use queue::ports::{LoadedQueue, QueueStore};
pub use queue::{ActionQueue, DeduplicationIndex, EnqueueOutcome, QueueConfig, QueueError};
pub use sync::ports::{
    FailureKind, NoopEventSink, RemoteActionApplier, SyncEvent, SyncEventSink,
};
pub use sync::{ApplyError, SyncConfig, SyncDeps, SyncError, SyncOrchestrator, SyncStatusView};
