//! # Checksync Infrastructure
//!
//! Infrastructure implementations of the core engine ports.
//!
//! This crate contains:
//! - Durable queue stores (versioned JSON files, SQLite)
//! - The HTTP remote action applier
//! - Event sinks (tracing, broadcast, fanout)
//! - Configuration loading and tracing subscriber setup
//!
//! ## Architecture
//! - Implements traits defined in `checksync-core`
//! - Depends on `checksync-domain` and `checksync-core`
//! - Contains all "impure" code (file system, database, network)

pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod events;
pub mod http;
pub mod observability;
pub mod storage;

// Re-export commonly used items
pub use bootstrap::{open_engine, open_engine_with_clock};
pub use errors::InfraError;
pub use events::{BroadcastEventSink, FanoutEventSink, TracingEventSink};
pub use http::{HttpActionApplier, IDEMPOTENCY_HEADER};
pub use observability::init_tracing;
pub use storage::{open_store, JsonFileQueueStore, SqliteQueueStore};
