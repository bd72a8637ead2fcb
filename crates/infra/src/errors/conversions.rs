//! Conversions from external infrastructure errors into domain errors.

use checksync_domain::ChecksyncError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub ChecksyncError);

impl std::fmt::Display for InfraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for InfraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<InfraError> for ChecksyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<ChecksyncError> for InfraError {
    fn from(value: ChecksyncError) -> Self {
        Self(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoChecksyncError {
    fn into_checksync(self) -> ChecksyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → ChecksyncError */
/* -------------------------------------------------------------------------- */

impl IntoChecksyncError for SqlError {
    fn into_checksync(self) -> ChecksyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match err.code {
                    ErrorCode::DatabaseBusy => ChecksyncError::Storage("database is busy".into()),
                    ErrorCode::DatabaseLocked => {
                        ChecksyncError::Storage("database is locked".into())
                    }
                    ErrorCode::DiskFull => ChecksyncError::Storage("disk is full".into()),
                    ErrorCode::ReadOnly => ChecksyncError::Storage("database is read-only".into()),
                    ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt => {
                        ChecksyncError::Storage(format!("database file is corrupt: {message}"))
                    }
                    _ => ChecksyncError::Storage(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => ChecksyncError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                ChecksyncError::Storage(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                ChecksyncError::Storage(format!("invalid column type: {ty}"))
            }
            RE::InvalidPath(path) => ChecksyncError::Config(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => ChecksyncError::Storage(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        Self(value.into_checksync())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → ChecksyncError */
/* -------------------------------------------------------------------------- */

impl IntoChecksyncError for HttpError {
    fn into_checksync(self) -> ChecksyncError {
        if self.is_builder() {
            return ChecksyncError::Config(format!("invalid HTTP client setup: {self}"));
        }

        if self.is_timeout() {
            return ChecksyncError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return ChecksyncError::Network("HTTP connection failure".into());
        }

        ChecksyncError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        Self(value.into_checksync())
    }
}

/* -------------------------------------------------------------------------- */
/* std::io / serde_json / task join → ChecksyncError */
/* -------------------------------------------------------------------------- */

impl From<std::io::Error> for InfraError {
    fn from(value: std::io::Error) -> Self {
        Self(ChecksyncError::Storage(format!("I/O error: {value}")))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        Self(ChecksyncError::Storage(format!("serialization error: {value}")))
    }
}

impl From<tokio::task::JoinError> for InfraError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self(ChecksyncError::Internal(format!("blocking storage task failed: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
