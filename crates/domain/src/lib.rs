//! # Checksync Domain
//!
//! Business domain types for the offline action queue.
//!
//! This crate contains:
//! - Queued actions and their exhaustive payload type ([`ActionKind`])
//! - Network status, sync status and sync summary records
//! - Configuration structures with validation
//! - Domain error type and `Result` alias
//!
//! ## Architecture
//! - No dependencies on other checksync crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
