//! Error types for the network monitor

use thiserror::Error;

/// Lifecycle errors of [`super::NetworkMonitor`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("network monitor already running")]
    AlreadyRunning,

    #[error("network monitor not running")]
    NotRunning,

    #[error("network monitor task panicked: {0}")]
    TaskPanicked(String),

    #[error("network monitor task did not stop within {0:?}")]
    JoinTimeout(std::time::Duration),
}
