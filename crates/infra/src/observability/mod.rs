//! Tracing subscriber setup
//!
//! `RUST_LOG` wins over the configured level when it is set. JSON output is
//! meant for log shippers; the default pretty format is for terminals.

use checksync_domain::{ChecksyncError, LoggingSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::InfraError;

/// Build the filter for `settings`, preferring `RUST_LOG` when present.
///
/// # Errors
/// Returns `ChecksyncError::Config` when the configured directive is invalid.
pub fn env_filter(settings: &LoggingSettings) -> Result<EnvFilter, InfraError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&settings.level).map_err(|e| {
        InfraError(ChecksyncError::Config(format!(
            "Invalid log level directive '{}': {e}",
            settings.level
        )))
    })
}

/// Install the global tracing subscriber.
///
/// # Errors
/// Fails when the level directive is invalid or a global subscriber is
/// already installed.
pub fn init_tracing(settings: &LoggingSettings) -> Result<(), InfraError> {
    let filter = env_filter(settings)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if settings.json {
        registry.with(fmt::layer().json().with_current_span(true).with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| {
        InfraError(ChecksyncError::Internal(format!("Failed to install tracing subscriber: {e}")))
    })?;

    tracing::debug!(level = %settings.level, json = settings.json, "Tracing initialized");
    Ok(())
}
