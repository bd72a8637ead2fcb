//! Durable queue stores
//!
//! - [`JsonFileQueueStore`]: versioned JSON files with atomic replace
//! - [`SqliteQueueStore`]: one SQLite database file

pub mod json_file;
pub mod sqlite;

use std::sync::Arc;

use checksync_core::QueueStore;
use checksync_domain::{Result, StorageBackend, StorageSettings};

pub use json_file::JsonFileQueueStore;
pub use sqlite::SqliteQueueStore;

/// Build the store selected by the `[storage]` config section.
pub fn open_store(settings: &StorageSettings) -> Result<Arc<dyn QueueStore>> {
    Ok(match settings.backend {
        StorageBackend::JsonFile => Arc::new(JsonFileQueueStore::new(&settings.path)),
        StorageBackend::Sqlite => Arc::new(SqliteQueueStore::open(&settings.path)?),
    })
}
