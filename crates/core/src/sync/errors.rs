//! Sync-specific error types
//!
//! [`ApplyError`] is what a remote applier reports for a single action; the
//! orchestrator classifies it to choose between the retry and terminal paths.
//! [`SyncError`] is what a sync run itself can fail with.

use std::time::Duration;

use checksync_common::error::{CommonError, ErrorClassification, ErrorSeverity};
use thiserror::Error;

use crate::queue::QueueError;

/// Failure delivering one action to the server.
#[derive(Debug, Clone, Error)]
pub enum ApplyError {
    /// Network failure, timeout, 5xx, 408 or 429. Retried with backoff.
    #[error("transient failure: {message}")]
    Transient {
        message: String,
        /// Server-requested wait before the next attempt
        retry_after: Option<Duration>,
    },

    /// Validation or authorization failure. Never retried.
    #[error("permanent failure: {message}")]
    Permanent { message: String, status: Option<u16> },

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl ApplyError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into(), retry_after: None }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent { message: message.into(), status: None }
    }
}

impl ErrorClassification for ApplyError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transient { .. } => true,
            Self::Permanent { .. } => false,
            Self::Common(e) => e.is_retryable(),
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Transient { .. } => ErrorSeverity::Warning,
            Self::Permanent { .. } => ErrorSeverity::Error,
            Self::Common(e) => e.severity(),
        }
    }

    fn is_critical(&self) -> bool {
        match self {
            Self::Transient { .. } | Self::Permanent { .. } => false,
            Self::Common(e) => e.is_critical(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            Self::Permanent { .. } => None,
            Self::Common(e) => e.retry_after(),
        }
    }
}

/// Why a sync run could not proceed.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("cannot sync while offline")]
    Offline,

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("sync run aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl ErrorClassification for SyncError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Offline => true,
            Self::Queue(e) => e.is_retryable(),
            Self::Aborted(_) => false,
            Self::Common(e) => e.is_retryable(),
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Offline => ErrorSeverity::Info,
            Self::Queue(e) => e.severity(),
            Self::Aborted(_) => ErrorSeverity::Error,
            Self::Common(e) => e.severity(),
        }
    }

    fn is_critical(&self) -> bool {
        match self {
            Self::Offline | Self::Aborted(_) => false,
            Self::Queue(e) => e.is_critical(),
            Self::Common(e) => e.is_critical(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Common(e) => e.retry_after(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_error_classification() {
        let transient =
            ApplyError::Transient { message: "503".into(), retry_after: Some(Duration::from_secs(2)) };
        assert!(transient.is_retryable());
        assert_eq!(transient.retry_after(), Some(Duration::from_secs(2)));

        let permanent = ApplyError::Permanent { message: "422".into(), status: Some(422) };
        assert!(!permanent.is_retryable());
        assert_eq!(permanent.severity(), ErrorSeverity::Error);

        let internal = ApplyError::from(CommonError::internal_with_context("no client", "apply"));
        assert!(!internal.is_retryable());
        assert!(internal.is_critical());
    }

    #[test]
    fn test_sync_error_display() {
        assert_eq!(SyncError::Offline.to_string(), "cannot sync while offline");
        let queue = SyncError::from(QueueError::CapacityExceeded { capacity: 5 });
        assert!(!queue.is_retryable());
    }
}
