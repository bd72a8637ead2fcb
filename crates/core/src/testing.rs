//! In-memory collaborators for tests.
//!
//! Available to this crate's unit tests and, with the `test-utils` feature,
//! to integration tests and downstream crates.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use checksync_domain::{
    ActionId, ActionKind, ChecksyncError, QueuedAction, Result, SyncStatusRecord,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{watch, Notify};

use crate::network::NetworkEvent;
use crate::queue::{LoadedQueue, QueueStore};
use crate::sync::{ApplyError, RemoteActionApplier, SyncEvent, SyncEventSink};

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<Value>,
    unreadable: usize,
    status: Option<SyncStatusRecord>,
    fail_saves: bool,
    save_delay: Option<Duration>,
    saves: usize,
}

/// [`QueueStore`] kept in memory, with injectable save failures and latency.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    state: Mutex<MemoryState>,
}

impl MemoryQueueStore {
    /// Store pre-loaded with raw queue records.
    #[must_use]
    pub fn with_records(records: Vec<Value>) -> Self {
        Self { state: Mutex::new(MemoryState { records, ..MemoryState::default() }) }
    }

    /// Report `count` extra records as lost on the next load.
    pub fn set_unreadable(&self, count: usize) {
        self.state.lock().unreadable = count;
    }

    /// Hold every queue save for `delay` (tokio time) before writing.
    pub fn set_save_delay(&self, delay: Duration) {
        self.state.lock().save_delay = Some(delay);
    }

    /// Make every subsequent save fail (or succeed again).
    pub fn fail_saves(&self, fail: bool) {
        self.state.lock().fail_saves = fail;
    }

    /// Number of successful saves of either key.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.state.lock().saves
    }

    /// Raw persisted queue records.
    #[must_use]
    pub fn records(&self) -> Vec<Value> {
        self.state.lock().records.clone()
    }

    /// Persisted sync status record.
    #[must_use]
    pub fn sync_status(&self) -> Option<SyncStatusRecord> {
        self.state.lock().status.clone()
    }

    fn check_writable(state: &MemoryState) -> Result<()> {
        if state.fail_saves {
            return Err(ChecksyncError::Storage("injected save failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn load_queue(&self) -> Result<LoadedQueue> {
        let state = self.state.lock();
        Ok(LoadedQueue { records: state.records.clone(), unreadable: state.unreadable })
    }

    async fn save_queue(&self, actions: &[QueuedAction]) -> Result<()> {
        let delay = self.state.lock().save_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let records = actions
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ChecksyncError::Storage(e.to_string()))?;

        let mut state = self.state.lock();
        Self::check_writable(&state)?;
        state.records = records;
        state.saves += 1;
        Ok(())
    }

    async fn load_sync_status(&self) -> Result<Option<SyncStatusRecord>> {
        Ok(self.sync_status())
    }

    async fn save_sync_status(&self, status: &SyncStatusRecord) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_writable(&state)?;
        state.status = Some(status.clone());
        state.saves += 1;
        Ok(())
    }
}

type ApplyResult = std::result::Result<Option<Value>, ApplyError>;

#[derive(Debug)]
struct ScriptState {
    responses: VecDeque<ApplyResult>,
    fallback: ApplyResult,
    calls: Vec<(ActionId, ActionKind)>,
}

/// [`RemoteActionApplier`] that replays scripted responses.
///
/// Responses are consumed in call order; once the script runs out every call
/// gets the fallback (success by default). [`Self::hold`] parks calls until
/// [`Self::release`], which makes in-flight runs observable.
#[derive(Debug)]
pub struct ScriptedApplier {
    state: Mutex<ScriptState>,
    gate: watch::Sender<bool>,
    entered: Notify,
}

impl Default for ScriptedApplier {
    fn default() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(ScriptState {
                responses: VecDeque::new(),
                fallback: Ok(None),
                calls: Vec::new(),
            }),
            gate,
            entered: Notify::new(),
        }
    }
}

impl ScriptedApplier {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue one successful response.
    pub fn push_ok(&self, canonical: Option<Value>) {
        self.state.lock().responses.push_back(Ok(canonical));
    }

    /// Queue one failure.
    pub fn push_err(&self, error: ApplyError) {
        self.state.lock().responses.push_back(Err(error));
    }

    /// Answer every unscripted call with `error`.
    pub fn fail_always(&self, error: ApplyError) {
        self.state.lock().fallback = Err(error);
    }

    /// Every call so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(ActionId, ActionKind)> {
        self.state.lock().calls.clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Park subsequent calls until [`Self::release`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Let parked calls proceed.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Wait until at least `count` calls have been made.
    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            let entered = self.entered.notified();
            tokio::pin!(entered);
            entered.as_mut().enable();

            if self.call_count() >= count {
                return;
            }
            entered.await;
        }
    }
}

#[async_trait]
impl RemoteActionApplier for ScriptedApplier {
    async fn apply(&self, id: &ActionId, kind: &ActionKind) -> ApplyResult {
        self.state.lock().calls.push((*id, kind.clone()));
        self.entered.notify_waiters();

        let mut gate = self.gate.subscribe();
        // The sender lives as long as `self`, so this only fails on teardown.
        let _ = gate.wait_for(|open| *open).await;

        let mut state = self.state.lock();
        state.responses.pop_front().unwrap_or_else(|| state.fallback.clone())
    }
}

/// [`SyncEventSink`] that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingEventSink {
    #[must_use]
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }

    /// Only the connectivity transitions.
    #[must_use]
    pub fn network_events(&self) -> Vec<NetworkEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SyncEvent::Network(network) => Some(*network),
                _ => None,
            })
            .collect()
    }

    /// Number of events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&SyncEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|event| predicate(event)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl SyncEventSink for RecordingEventSink {
    fn emit(&self, event: &SyncEvent) {
        self.events.lock().push(event.clone());
    }
}
