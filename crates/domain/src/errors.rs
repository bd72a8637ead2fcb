//! Error types used at crate boundaries

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for checksync
///
/// Serialisable so it can cross a process or FFI boundary (for example, be
/// reported to a UI shell) without losing its category.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum ChecksyncError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for checksync operations
pub type Result<T> = std::result::Result<T, ChecksyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_type_tag() {
        let err = ChecksyncError::Queue("queue is at capacity".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!({"type": "Queue", "message": "queue is at capacity"}));
        assert_eq!(err.to_string(), "Queue error: queue is at capacity");
    }
}
