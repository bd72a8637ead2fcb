//! Channel-backed connectivity provider

use checksync_domain::NetworkStatus;
use tokio::sync::watch;
use tracing::trace;

use super::ports::NetworkStatusProvider;

/// [`NetworkStatusProvider`] fed by whoever owns it.
///
/// Platform glue (or a test) pushes readings with [`Self::set_status`].
#[derive(Debug)]
pub struct WatchNetworkProvider {
    tx: watch::Sender<NetworkStatus>,
}

impl WatchNetworkProvider {
    #[must_use]
    pub fn new(initial: NetworkStatus) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Publish a new raw reading.
    pub fn set_status(&self, status: NetworkStatus) {
        trace!(online = status.is_online, quality = %status.quality, "Raw network reading");
        self.tx.send_replace(status);
    }
}

impl Default for WatchNetworkProvider {
    fn default() -> Self {
        Self::new(NetworkStatus::offline())
    }
}

impl NetworkStatusProvider for WatchNetworkProvider {
    fn current(&self) -> NetworkStatus {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }
}
