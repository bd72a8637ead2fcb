//! Common error types and utilities for the sync engine
//!
//! The error handling system is built on three pieces:
//!
//! 1. **`CommonError`**: failures that are not specific to one module
//!    (invalid configuration, broken internal invariants).
//!
//! 2. **`ErrorClassification` trait**: a standard interface for classifying
//!    errors by retryability, severity and criticality. The sync orchestrator
//!    uses `is_retryable()` to decide between the transient and permanent
//!    failure paths.
//!
//! 3. **`ErrorSeverity` enum**: a unified severity level used when logging.
//!
//! Module-specific errors **compose** with `CommonError` rather than
//! duplicating its variants:
//!
//! ```rust,ignore
//! #[derive(Debug, thiserror::Error)]
//! pub enum QueueError {
//!     #[error("queue is at capacity ({capacity} actions)")]
//!     CapacityExceeded { capacity: usize },
//!
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//!
//! impl_error_classification!(QueueError, Common,
//!     Self::CapacityExceeded { .. } => {
//!         retryable: false,
//!         severity: ErrorSeverity::Warning,
//!         critical: false,
//!     }
//! );
//! ```
//!
//! | Variant | Raised by | Retryable | Severity |
//! |---------|-----------|-----------|----------|
//! | `Config` | backoff and settings validation | no | error |
//! | `Internal` | queue index consistency checks | no | critical |

use std::fmt;
use std::time::Duration;

/// Standard result type using CommonError
pub type CommonResult<T> = Result<T, CommonError>;

/// Common error variants that appear across multiple modules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Configuration-related errors
    Config { message: String, field: Option<String> },

    /// Internal errors that shouldn't normally occur
    Internal { message: String, context: Option<String> },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message, field } => match field {
                Some(field) => write!(f, "Configuration error in field '{field}': {message}"),
                None => write!(f, "Configuration error: {message}"),
            },
            Self::Internal { message, context } => match context {
                Some(ctx) => write!(f, "Internal error in '{ctx}': {message}"),
                None => write!(f, "Internal error: {message}"),
            },
        }
    }
}

impl std::error::Error for CommonError {}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Config { .. } => ErrorSeverity::Error,
            Self::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl CommonError {
    /// Create a configuration error for a specific field
    pub fn config_field<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    /// Create an internal error with context
    pub fn internal_with_context<S: Into<String>, C: Into<String>>(message: S, context: C) -> Self {
        Self::Internal { message: message.into(), context: Some(context.into()) }
    }
}

/// Error classification trait for consistent error handling across modules
///
/// Every error that can reach the sync orchestrator implements this trait so
/// that retry decisions are made in one place.
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient: network failures, 5xx responses,
    /// rate limiting and timeouts.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    ///
    /// Returns `Some(Duration)` when the remote side told us how long to wait
    /// (e.g. a `Retry-After` header).
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Macro to implement ErrorClassification by delegating to CommonError
///
/// ```rust,ignore
/// impl_error_classification!(MyError, Common,
///     Self::Specific(_) => {
///         retryable: false,
///         severity: ErrorSeverity::Error,
///         critical: false,
///     }
/// );
/// ```
#[macro_export]
macro_rules! impl_error_classification {
    (
        $error_type:ty,
        $common_variant:ident
        $(,
            $variant:pat => {
                retryable: $retryable:expr,
                severity: $severity:expr,
                critical: $critical:expr
                $(, retry_after: $retry_after:expr)?
                $(,)?
            }
        )*
        $(,)?
    ) => {
        impl $crate::error::ErrorClassification for $error_type {
            fn is_retryable(&self) -> bool {
                match self {
                    Self::$common_variant(e) => $crate::error::ErrorClassification::is_retryable(e),
                    $(
                        $variant => $retryable,
                    )*
                }
            }

            fn severity(&self) -> $crate::error::ErrorSeverity {
                match self {
                    Self::$common_variant(e) => $crate::error::ErrorClassification::severity(e),
                    $(
                        $variant => $severity,
                    )*
                }
            }

            fn is_critical(&self) -> bool {
                match self {
                    Self::$common_variant(e) => $crate::error::ErrorClassification::is_critical(e),
                    $(
                        $variant => $critical,
                    )*
                }
            }

            fn retry_after(&self) -> Option<std::time::Duration> {
                match self {
                    Self::$common_variant(e) => $crate::error::ErrorClassification::retry_after(e),
                    $(
                        $(
                            $variant => $retry_after,
                        )?
                    )*
                    #[allow(unreachable_patterns)]
                    _ => None,
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    //! Unit tests for the shared error taxonomy.

    use super::*;

    /// Validates display formatting for both variants.
    ///
    /// Assertions:
    /// - Confirms the config message includes the field name.
    /// - Confirms the internal message includes its context.
    #[test]
    fn test_display_includes_field_and_context() {
        let err = CommonError::config_field("sync.base_delay", "must be positive");
        assert_eq!(
            err.to_string(),
            "Configuration error in field 'sync.base_delay': must be positive"
        );

        let err = CommonError::internal_with_context("order index diverged", "ActionQueue");
        assert_eq!(err.to_string(), "Internal error in 'ActionQueue': order index diverged");
    }

    /// Validates that only internal errors are critical and nothing retries.
    ///
    /// Assertions:
    /// - Ensures `Internal` is critical with `ErrorSeverity::Critical`.
    /// - Ensures `Config` is an ordinary error.
    /// - Ensures neither is retryable or carries a delay.
    #[test]
    fn test_internal_is_critical() {
        let internal = CommonError::internal_with_context("order index diverged", "ActionQueue");
        let config = CommonError::config_field("queue.max_capacity", "must be positive");

        assert!(internal.is_critical());
        assert_eq!(internal.severity(), ErrorSeverity::Critical);
        assert!(!config.is_critical());
        assert_eq!(config.severity(), ErrorSeverity::Error);
        for err in [internal, config] {
            assert!(!err.is_retryable());
            assert_eq!(err.retry_after(), None);
        }
    }

    #[derive(Debug, thiserror::Error)]
    enum SampleError {
        #[error("rejected: {0}")]
        Rejected(String),
        #[error("throttled")]
        Throttled,
        #[error(transparent)]
        Common(#[from] CommonError),
    }

    impl_error_classification!(SampleError, Common,
        Self::Rejected(_) => {
            retryable: false,
            severity: ErrorSeverity::Warning,
            critical: false,
        },
        Self::Throttled => {
            retryable: true,
            severity: ErrorSeverity::Info,
            critical: false,
            retry_after: Some(Duration::from_secs(3)),
        },
    );

    /// Validates the classification macro.
    ///
    /// Assertions:
    /// - Confirms module variants use the declared classification.
    /// - Confirms a declared `retry_after` is returned.
    /// - Confirms embedded common errors delegate to `CommonError`.
    #[test]
    fn test_classification_macro_delegates_to_common() {
        let rejected = SampleError::Rejected("duplicate".into());
        assert!(!rejected.is_retryable());
        assert_eq!(rejected.severity(), ErrorSeverity::Warning);
        assert_eq!(rejected.retry_after(), None);

        assert!(SampleError::Throttled.is_retryable());
        assert_eq!(SampleError::Throttled.retry_after(), Some(Duration::from_secs(3)));

        let wrapped = SampleError::from(CommonError::internal_with_context("boom", "test"));
        assert!(wrapped.is_critical());
        assert_eq!(wrapped.severity(), ErrorSeverity::Critical);
    }
}
