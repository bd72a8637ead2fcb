//! Configuration structures
//!
//! Every section is `#[serde(default)]`, so a config file only needs to name
//! the values it overrides. Durations are written as integer milliseconds.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BASE_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_CAP_DELAY, DEFAULT_MAX_RETRIES,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_REQUEST_TIMEOUT, DEFAULT_STABILITY_WINDOW,
};
use crate::errors::{ChecksyncError, Result};

/// Serde helpers for `Duration` as integer milliseconds.
pub mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a Duration as milliseconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserialize milliseconds (u64) into a Duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub queue: QueueSettings,
    pub sync: SyncSettings,
    pub network: NetworkSettings,
    pub storage: StorageSettings,
    pub remote: RemoteSettings,
    pub logging: LoggingSettings,
}

impl Config {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.queue.max_capacity == 0 {
            return Err(ChecksyncError::Config("queue.max_capacity must be greater than 0".into()));
        }
        if self.sync.batch_size == 0 {
            return Err(ChecksyncError::Config("sync.batch_size must be greater than 0".into()));
        }
        if self.sync.batch_size > self.queue.max_capacity {
            return Err(ChecksyncError::Config(format!(
                "sync.batch_size ({}) cannot exceed queue.max_capacity ({})",
                self.sync.batch_size, self.queue.max_capacity
            )));
        }
        if self.sync.base_delay.is_zero() {
            return Err(ChecksyncError::Config("sync.base_delay must be greater than 0".into()));
        }
        if self.sync.cap_delay < self.sync.base_delay {
            return Err(ChecksyncError::Config(format!(
                "sync.cap_delay ({:?}) cannot be smaller than sync.base_delay ({:?})",
                self.sync.cap_delay, self.sync.base_delay
            )));
        }
        if self.remote.request_timeout.is_zero() {
            return Err(ChecksyncError::Config(
                "remote.request_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Queue sizing and retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub max_capacity: usize,
    pub default_max_retries: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self { max_capacity: DEFAULT_QUEUE_CAPACITY, default_max_retries: DEFAULT_MAX_RETRIES }
    }
}

/// Orchestrator batch size and backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub batch_size: usize,
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    #[serde(with = "duration_millis")]
    pub cap_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            base_delay: DEFAULT_BASE_DELAY,
            cap_delay: DEFAULT_CAP_DELAY,
        }
    }
}

/// Network debounce window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    #[serde(with = "duration_millis")]
    pub stability_window: Duration,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self { stability_window: DEFAULT_STABILITY_WINDOW }
    }
}

/// Which durable store backs the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    JsonFile,
    Sqlite,
}

/// Durable storage location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Directory for the JSON store, or database file for SQLite.
    pub path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { backend: StorageBackend::JsonFile, path: PathBuf::from("checksync-data") }
    }
}

/// Remote applier endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub base_url: String,
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            auth_token: None,
        }
    }
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}
