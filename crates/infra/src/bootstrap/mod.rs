//! Engine assembly from a loaded [`Config`].
//!
//! Picks the configured store, builds the HTTP applier and combines the
//! caller's event sink with structured logging.

use std::sync::Arc;

use checksync_common::time::{SharedClock, SystemClock};
use checksync_core::{EngineDeps, EngineError, NetworkStatusProvider, OfflineSync, SyncEventSink};
use checksync_domain::Config;
use tracing::info;

use crate::events::{FanoutEventSink, TracingEventSink};
use crate::http::HttpActionApplier;
use crate::storage::open_store;

/// Open an engine wired to the production adapters.
///
/// `events` receives every sync event after it has been logged. The engine
/// is returned unstarted; call [`OfflineSync::start`] to begin monitoring.
///
/// # Errors
/// Fails when the config is invalid, the store cannot be opened or the
/// persisted queue cannot be read.
pub async fn open_engine(
    config: &Config,
    network: Arc<dyn NetworkStatusProvider>,
    events: Arc<dyn SyncEventSink>,
) -> Result<OfflineSync, EngineError> {
    open_engine_with_clock(config, network, events, Arc::new(SystemClock)).await
}

/// Same as [`open_engine`] with an explicit clock.
///
/// # Errors
/// See [`open_engine`].
pub async fn open_engine_with_clock(
    config: &Config,
    network: Arc<dyn NetworkStatusProvider>,
    events: Arc<dyn SyncEventSink>,
    clock: SharedClock,
) -> Result<OfflineSync, EngineError> {
    config.validate()?;
    let store = open_store(&config.storage)?;
    let applier = Arc::new(HttpActionApplier::new(&config.remote)?);

    info!(
        backend = ?config.storage.backend,
        path = %config.storage.path.display(),
        endpoint = applier.endpoint(),
        "Opening offline sync engine"
    );

    let sink = FanoutEventSink::default().with(Arc::new(TracingEventSink)).with(events);

    OfflineSync::open(
        EngineDeps { store, applier, network, events: Arc::new(sink), clock },
        config,
    )
    .await
}
