//! Error types for the action queue

use checksync_common::error::{CommonError, ErrorSeverity};
use checksync_common::impl_error_classification;
use checksync_domain::ChecksyncError;
use thiserror::Error;

/// Result type alias for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors raised by [`super::ActionQueue`].
///
/// A failed mutation never changes the in-memory queue.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("queue is at capacity ({capacity} actions)")]
    CapacityExceeded { capacity: usize },

    #[error("failed to persist queue: {0}")]
    Store(#[from] ChecksyncError),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl_error_classification!(QueueError, Common,
    Self::CapacityExceeded { .. } => {
        retryable: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self::Store(_) => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
);

impl From<QueueError> for ChecksyncError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Store(inner) => inner,
            other => Self::Queue(other.to_string()),
        }
    }
}
