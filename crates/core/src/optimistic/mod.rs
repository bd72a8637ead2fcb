//! Optimistic local state

pub mod manager;
pub mod predict;

pub use manager::{OptimisticStateManager, ReadModel};
pub use predict::predict;
