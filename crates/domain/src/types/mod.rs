//! Domain types and models

pub mod action;
pub mod network;
pub mod patch;
pub mod sync;

pub use action::{
    ActionId, ActionKind, ActionStatus, ActionType, EntityId, NewAction, OrderKey, Priority,
    QueuedAction,
};
pub use network::{NetworkQuality, NetworkStatus};
pub use patch::OptimisticPatch;
pub use sync::{QueueStats, SyncState, SyncStatusRecord, SyncSummary};
