//! Port interfaces for connectivity

use checksync_domain::NetworkStatus;
use tokio::sync::watch;

/// Source of raw connectivity readings from the platform.
///
/// Readings may flap; [`super::NetworkMonitor`] debounces them before anything
/// reacts.
pub trait NetworkStatusProvider: Send + Sync {
    /// Latest raw reading
    fn current(&self) -> NetworkStatus;

    /// Receiver notified on every raw reading change
    fn subscribe(&self) -> watch::Receiver<NetworkStatus>;
}

/// Something that should start draining the queue when connectivity returns.
pub trait SyncTrigger: Send + Sync {
    /// Request a sync without waiting for it
    fn trigger(&self);

    /// Connectivity has settled to online. Called before [`Self::trigger`].
    fn connected(&self) {}
}
