//! Debounced connectivity monitor.
//!
//! Owns a background task that watches the raw [`NetworkStatusProvider`],
//! runs readings through a [`Debouncer`] and publishes settled status on a
//! watch channel. Settled transitions are reported to the event sink, and a
//! transition to online fires the registered [`SyncTrigger`].
//!
//! The task follows the usual lifecycle rules: the join handle is tracked,
//! cancellation is explicit, and `stop` bounds the join with a timeout.

use std::sync::Arc;
use std::time::Duration;

use checksync_common::time::SharedClock;
use checksync_domain::NetworkStatus;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::debounce::{Debouncer, NetworkEvent};
use super::errors::MonitorError;
use super::ports::{NetworkStatusProvider, SyncTrigger};
use crate::sync::ports::{SyncEvent, SyncEventSink};

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Debounced view of connectivity.
pub struct NetworkMonitor {
    provider: Arc<dyn NetworkStatusProvider>,
    clock: SharedClock,
    window: Duration,
    events: Arc<dyn SyncEventSink>,
    trigger: Option<Arc<dyn SyncTrigger>>,
    settled: Arc<watch::Sender<NetworkStatus>>,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("window", &self.window)
            .field("status", &self.status())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl NetworkMonitor {
    /// Create a monitor. The provider's current reading is taken as settled.
    pub fn new(
        provider: Arc<dyn NetworkStatusProvider>,
        clock: SharedClock,
        window: Duration,
        events: Arc<dyn SyncEventSink>,
    ) -> Self {
        let initial = Debouncer::new(window, provider.current()).reported();
        let (settled, _) = watch::channel(initial);
        Self {
            provider,
            clock,
            window,
            events,
            trigger: None,
            settled: Arc::new(settled),
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Fire `trigger` whenever connectivity settles to online.
    #[must_use]
    pub fn with_trigger(mut self, trigger: Arc<dyn SyncTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Settled status.
    #[must_use]
    pub fn status(&self) -> NetworkStatus {
        *self.settled.borrow()
    }

    /// Whether the settled status is online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.status().is_online
    }

    /// Receiver of settled status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.settled.subscribe()
    }

    /// Returns true when the background task is active.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Spawn the background task.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.is_running() {
            return Err(MonitorError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let watcher = Watcher {
            provider: Arc::clone(&self.provider),
            clock: Arc::clone(&self.clock),
            events: Arc::clone(&self.events),
            trigger: self.trigger.clone(),
            settled: Arc::clone(&self.settled),
            debouncer: Debouncer::new(self.window, self.status()),
        };
        let cancel = self.cancellation.clone();

        self.task_handle = Some(tokio::spawn(watcher.run(cancel)));
        info!("Network monitor started");
        Ok(())
    }

    /// Cancel the background task and wait for it to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<(), MonitorError> {
        let Some(handle) = self.task_handle.take() else {
            return Err(MonitorError::NotRunning);
        };

        self.cancellation.cancel();
        match tokio::time::timeout(JOIN_TIMEOUT, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Network monitor task panicked: {}", e);
                return Err(MonitorError::TaskPanicked(e.to_string()));
            }
            Err(_) => {
                warn!("Network monitor task did not complete within timeout");
                return Err(MonitorError::JoinTimeout(JOIN_TIMEOUT));
            }
        }

        self.cancellation = CancellationToken::new();
        info!("Network monitor stopped");
        Ok(())
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

struct Watcher {
    provider: Arc<dyn NetworkStatusProvider>,
    clock: SharedClock,
    events: Arc<dyn SyncEventSink>,
    trigger: Option<Arc<dyn SyncTrigger>>,
    settled: Arc<watch::Sender<NetworkStatus>>,
    debouncer: Debouncer,
}

impl Watcher {
    async fn run(mut self, cancel: CancellationToken) {
        let mut readings = self.provider.subscribe();
        let first = *readings.borrow_and_update();
        self.debouncer.observe(first, self.clock.now());

        loop {
            let wait =
                self.debouncer.deadline().map(|d| d.saturating_duration_since(self.clock.now()));
            let clock = Arc::clone(&self.clock);

            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Network monitor loop cancelled");
                    break;
                }
                changed = readings.changed() => {
                    if changed.is_err() {
                        debug!("Network provider closed; monitor loop exiting");
                        break;
                    }
                    let status = *readings.borrow_and_update();
                    self.debouncer.observe(status, self.clock.now());
                }
                () = async move {
                    match wait {
                        Some(wait) => clock.sleep(wait).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {}
            }

            if let Some(event) = self.debouncer.settle(self.clock.now()) {
                self.publish(event);
            }
        }
    }

    fn publish(&self, event: NetworkEvent) {
        let status = self.debouncer.reported();
        self.settled.send_replace(status);

        match event {
            NetworkEvent::BecameOnline { quality } => info!(%quality, "Network online"),
            NetworkEvent::BecameOffline => info!("Network offline"),
            NetworkEvent::QualityChanged { from, to } => {
                debug!(%from, %to, "Network quality changed");
            }
        }
        self.events.emit(&SyncEvent::Network(event));

        if matches!(event, NetworkEvent::BecameOnline { .. }) {
            if let Some(trigger) = &self.trigger {
                trigger.connected();
                trigger.trigger();
            }
        }
    }
}
