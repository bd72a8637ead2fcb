//! Queue draining, retry and backoff

pub mod errors;
pub mod orchestrator;
pub mod ports;

pub use errors::{ApplyError, SyncError};
pub use orchestrator::{SyncConfig, SyncDeps, SyncOrchestrator, SyncStatusView};
pub use ports::{
    FailureKind, NoopEventSink, RemoteActionApplier, SyncEvent, SyncEventSink,
};
