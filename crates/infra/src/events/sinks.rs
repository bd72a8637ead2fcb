//! Event sink adapters.
//!
//! Sinks are called inline from the orchestrator, so none of them block:
//! the tracing sink only logs, the broadcast sink drops events for lagging
//! subscribers, and the fanout sink forwards to each child in turn.

use std::sync::Arc;

use checksync_core::{NetworkEvent, SyncEvent, SyncEventSink};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Logs every event as a structured `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl SyncEventSink for TracingEventSink {
    fn emit(&self, event: &SyncEvent) {
        match event {
            SyncEvent::ActionEnqueued { id, action_type } => {
                debug!(action_id = %id, %action_type, "Action enqueued");
            }
            SyncEvent::ActionDeduplicated { existing, action_type } => {
                debug!(existing = %existing, %action_type, "Action deduplicated");
            }
            SyncEvent::SyncStarted { total } => info!(total, "Sync run started"),
            SyncEvent::SyncProgress { processed, total, percent } => {
                debug!(processed, total, percent, "Sync progress");
            }
            SyncEvent::ActionSucceeded { id } => debug!(action_id = %id, "Action synced"),
            SyncEvent::ActionRetryScheduled { id, attempt, delay, error } => {
                warn!(action_id = %id, attempt, delay = ?delay, error = %error, "Action retry scheduled");
            }
            SyncEvent::ActionFailed { id, kind, message } => {
                warn!(action_id = %id, kind = ?kind, error = %message, "Action failed");
            }
            SyncEvent::QueueCorrupted { dropped } => {
                error!(dropped, "Corrupt queue records dropped on load");
            }
            SyncEvent::SyncSucceeded(summary) => info!(
                processed = summary.processed_count,
                skipped = summary.skipped_count,
                "Sync run succeeded"
            ),
            SyncEvent::SyncFailed { errors, summary } => warn!(
                failed = summary.failed_count,
                errors = ?errors,
                "Sync run finished with errors"
            ),
            SyncEvent::Network(NetworkEvent::BecameOnline { quality }) => {
                info!(%quality, "Connectivity restored");
            }
            SyncEvent::Network(NetworkEvent::BecameOffline) => info!("Connectivity lost"),
            SyncEvent::Network(NetworkEvent::QualityChanged { from, to }) => {
                debug!(%from, %to, "Connection quality changed");
            }
        }
    }
}

/// Republishes events on a `tokio` broadcast channel for UI subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<SyncEvent>,
}

impl BroadcastEventSink {
    /// Channel keeping up to `capacity` events per slow subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl SyncEventSink for BroadcastEventSink {
    fn emit(&self, event: &SyncEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event.clone());
    }
}

/// Forwards each event to every child sink, in order.
#[derive(Clone, Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn SyncEventSink>>,
}

impl std::fmt::Debug for FanoutEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutEventSink").field("sinks", &self.sinks.len()).finish()
    }
}

impl FanoutEventSink {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn SyncEventSink>>) -> Self {
        Self { sinks }
    }

    /// Add another sink.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn SyncEventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl SyncEventSink for FanoutEventSink {
    fn emit(&self, event: &SyncEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use checksync_core::testing::RecordingEventSink;

    use super::*;

    #[tokio::test]
    async fn broadcast_delivers_to_subscribers() {
        let sink = BroadcastEventSink::new(8);
        let mut first = sink.subscribe();
        let mut second = sink.subscribe();

        sink.emit(&SyncEvent::SyncStarted { total: 2 });

        assert_eq!(first.recv().await.unwrap(), SyncEvent::SyncStarted { total: 2 });
        assert_eq!(second.recv().await.unwrap(), SyncEvent::SyncStarted { total: 2 });
    }

    #[test]
    fn broadcast_without_subscribers_is_silent() {
        let sink = BroadcastEventSink::new(1);
        sink.emit(&SyncEvent::QueueCorrupted { dropped: 1 });
        assert_eq!(sink.receiver_count(), 0);
    }

    #[test]
    fn fanout_reaches_every_child() {
        let a = Arc::new(RecordingEventSink::default());
        let b = Arc::new(RecordingEventSink::default());
        let fanout = FanoutEventSink::default()
            .with(a.clone())
            .with(b.clone())
            .with(Arc::new(TracingEventSink));

        fanout.emit(&SyncEvent::SyncStarted { total: 0 });

        assert_eq!(a.events(), vec![SyncEvent::SyncStarted { total: 0 }]);
        assert_eq!(b.events(), vec![SyncEvent::SyncStarted { total: 0 }]);
    }
}
