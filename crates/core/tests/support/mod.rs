//! Shared harness for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use checksync_common::time::SharedClock;
use checksync_core::testing::{MemoryQueueStore, RecordingEventSink, ScriptedApplier};
use checksync_core::{EngineDeps, OfflineSync, SyncEvent, WatchNetworkProvider};
use checksync_domain::{ActionKind, Config, EntityId, NetworkQuality, NetworkStatus};
use serde_json::{Map, Value};

/// Engine wired to in-memory collaborators.
pub struct Harness {
    pub engine: OfflineSync,
    pub store: Arc<MemoryQueueStore>,
    pub applier: Arc<ScriptedApplier>,
    pub network: Arc<WatchNetworkProvider>,
    pub events: Arc<RecordingEventSink>,
}

impl Harness {
    pub async fn open(initial: NetworkStatus, clock: SharedClock) -> Self {
        Self::open_with_store(initial, clock, Arc::new(MemoryQueueStore::default())).await
    }

    pub async fn open_with_store(
        initial: NetworkStatus,
        clock: SharedClock,
        store: Arc<MemoryQueueStore>,
    ) -> Self {
        Self::open_with_config(initial, clock, store, &Config::default()).await
    }

    pub async fn open_with_config(
        initial: NetworkStatus,
        clock: SharedClock,
        store: Arc<MemoryQueueStore>,
        config: &Config,
    ) -> Self {
        let applier = ScriptedApplier::new();
        let network = Arc::new(WatchNetworkProvider::new(initial));
        let events = Arc::new(RecordingEventSink::default());

        let engine = OfflineSync::open(
            EngineDeps {
                store: store.clone(),
                applier: applier.clone(),
                network: network.clone(),
                events: events.clone(),
                clock,
            },
            config,
        )
        .await
        .expect("engine opens");
        engine.start().await.expect("engine starts");

        Self { engine, store, applier, network, events }
    }

    pub fn go_online(&self) {
        self.network.set_status(NetworkStatus::online(NetworkQuality::Good));
    }

    pub fn go_offline(&self) {
        self.network.set_status(NetworkStatus::offline());
    }

    pub fn entity(&self, id: &str) -> Option<Value> {
        self.engine.optimistic().get(&EntityId::from(id))
    }

    pub fn count(&self, predicate: impl Fn(&SyncEvent) -> bool) -> usize {
        self.events.count(predicate)
    }
}

/// Let paused tokio time run well past the debounce window and any work it
/// triggers.
pub async fn settle() {
    tokio::time::sleep(Duration::from_secs(2)).await;
}

pub fn online() -> NetworkStatus {
    NetworkStatus::online(NetworkQuality::Good)
}

pub fn complete(task: &str) -> ActionKind {
    ActionKind::TaskCompletion { task_id: task.into(), notes: None, completed_by: Some("user-1".into()) }
}

pub fn undo(task: &str) -> ActionKind {
    ActionKind::UndoTaskCompletion { task_id: task.into() }
}

pub fn update(checklist: &str, fields: Value) -> ActionKind {
    let fields: Map<String, Value> = match fields {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    };
    ActionKind::ChecklistUpdate { checklist_id: checklist.into(), fields }
}

pub fn note(task: &str, id: &str, text: &str) -> ActionKind {
    ActionKind::NoteAdd { task_id: task.into(), note_id: id.into(), text: text.into() }
}

pub fn submit_checklist(checklist: &str) -> ActionKind {
    ActionKind::ChecklistSubmission { checklist_id: checklist.into() }
}
