//! Synchronization primitives shared by the sync engine.
//!
//! ## Submodules
//!
//! - **`backoff`**: capped exponential backoff used between transient retries

pub mod backoff;

pub use backoff::ExponentialBackoff;
