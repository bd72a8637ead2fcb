//! End-to-end scenarios for the offline sync engine
//!
//! **Coverage:**
//! - Offline enqueue, reconnect, successful drain
//! - Dedup collapse of checklist updates
//! - Retry exhaustion with rollback
//! - Debounced reconnect flapping triggers a single run
//! - Queue ordering, run idempotence, single-flight joins
//! - Manual sync collapsing a backoff wait
//! - Queues longer than one batch, enqueues landing mid-run
//! - Supersede racing a dispatch, connectivity stamping
//!
//! **Infrastructure:**
//! - In-memory queue store, scripted applier, recording event sink
//! - Paused tokio time with `SystemClock` for debounce scenarios
//! - `MockClock` for retry and backoff scenarios

mod support;

use std::sync::Arc;
use std::time::Duration;

use checksync_common::testing::MockClock;
use checksync_common::time::SystemClock;
use checksync_core::testing::MemoryQueueStore;
use checksync_core::{ApplyError, EnqueueOutcome, FailureKind, NetworkEvent, SyncError, SyncEvent};
use checksync_domain::{Config, NetworkQuality, NetworkStatus, NewAction, Priority, SyncState};
use serde_json::json;
use support::{complete, note, online, settle, submit_checklist, undo, update, Harness};

// ============================================================================
// Scenarios
// ============================================================================

/// Validates an offline completion that syncs after reconnecting.
///
/// Assertions:
/// - Confirms the completion is visible locally while offline.
/// - Confirms nothing is dispatched before the network settles online.
/// - Confirms the queue drains and no errors are recorded.
#[tokio::test(start_paused = true)]
async fn test_offline_completion_syncs_after_reconnect() {
    let h = Harness::open(NetworkStatus::offline(), Arc::new(SystemClock)).await;
    h.engine.optimistic().seed("T".into(), json!({"id": "T", "completed": false}));

    h.engine
        .submit(NewAction::new(complete("T")).with_priority(Priority::High))
        .await
        .unwrap();
    assert_eq!(h.entity("T").unwrap()["completed"], json!(true));
    settle().await;
    assert_eq!(h.applier.call_count(), 0);

    h.go_online();
    settle().await;

    assert_eq!(h.applier.call_count(), 1);
    assert!(h.engine.queue().is_empty().await);
    assert_eq!(h.entity("T").unwrap()["completed"], json!(true));
    let status = h.engine.sync_status();
    assert_eq!(status.state, SyncState::Idle);
    assert!(status.errors.is_empty());
    assert!(status.last_sync_time.is_some());
    assert!(status.last_connected_time.is_some());
    assert_eq!(h.count(|e| matches!(e, SyncEvent::SyncSucceeded(_))), 1);
}

/// Validates that two checklist updates collapse into one dispatch.
///
/// Assertions:
/// - Confirms one queued action holding the later field value.
/// - Confirms exactly one applier call carrying that value.
#[tokio::test(start_paused = true)]
async fn test_checklist_updates_collapse_before_sync() {
    let h = Harness::open(NetworkStatus::offline(), Arc::new(SystemClock)).await;

    h.engine.submit(NewAction::new(update("CL", json!({"field": 1})))).await.unwrap();
    let second = h.engine.submit(NewAction::new(update("CL", json!({"field": 2})))).await.unwrap();
    assert!(matches!(second, EnqueueOutcome::Superseded(_)));

    let queued = h.engine.queue().snapshot().await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].kind, update("CL", json!({"field": 2})));
    assert_eq!(h.entity("CL").unwrap()["field"], json!(2));

    h.go_online();
    settle().await;

    let calls = h.applier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, update("CL", json!({"field": 2})));
}

/// Validates retry exhaustion for an always-failing action.
///
/// Assertions:
/// - Confirms exactly three applier calls with backoff of 2s then 4s.
/// - Confirms one error message naming the attempt count.
/// - Confirms the local state is rolled back to the seeded value.
#[tokio::test]
async fn test_retry_exhaustion_rolls_back() {
    let clock = MockClock::new();
    let h = Harness::open(online(), Arc::new(clock.clone())).await;
    let seeded = json!({"id": "T", "completed": false, "title": "Torque check"});
    h.engine.optimistic().seed("T".into(), seeded.clone());
    h.applier.fail_always(ApplyError::transient("503 Service Unavailable"));

    h.engine.submit(NewAction::new(complete("T")).with_max_retries(3)).await.unwrap();
    let summary = h.engine.run_sync().await.unwrap();

    assert_eq!(h.applier.call_count(), 3);
    assert_eq!(clock.sleep_calls(), vec![Duration::from_secs(2), Duration::from_secs(4)]);
    assert_eq!(summary.failed_count, 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].contains("after 3 attempts"), "{}", summary.errors[0]);
    assert!(h.engine.queue().is_empty().await);
    assert_eq!(h.entity("T"), Some(seeded));
    assert_eq!(h.engine.sync_status().errors, summary.errors);
    assert_eq!(
        h.count(|e| matches!(e, SyncEvent::ActionFailed { kind: FailureKind::RetryExhausted, .. })),
        1
    );
    assert_eq!(h.count(|e| matches!(e, SyncEvent::SyncFailed { .. })), 1);
}

/// Validates that reconnect flapping inside the stability window runs once.
///
/// Assertions:
/// - Confirms a single `BecameOnline` event.
/// - Confirms a single dispatch and a single sync start.
#[tokio::test(start_paused = true)]
async fn test_reconnect_flapping_runs_sync_once() {
    let h = Harness::open(NetworkStatus::offline(), Arc::new(SystemClock)).await;
    h.engine.submit(NewAction::new(complete("T"))).await.unwrap();

    h.go_online();
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.go_offline();
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.go_online();
    settle().await;

    assert_eq!(
        h.events.network_events(),
        vec![NetworkEvent::BecameOnline { quality: NetworkQuality::Good }]
    );
    assert_eq!(h.applier.call_count(), 1);
    assert_eq!(h.count(|e| matches!(e, SyncEvent::SyncStarted { .. })), 1);
}

// ============================================================================
// Properties
// ============================================================================

/// Validates dispatch order across priorities.
///
/// Assertions:
/// - Confirms critical, then high, then low regardless of submit order.
#[tokio::test(start_paused = true)]
async fn test_dispatch_follows_queue_order() {
    let h = Harness::open(NetworkStatus::offline(), Arc::new(SystemClock)).await;
    h.engine.submit(NewAction::new(note("T", "n1", "first"))).await.unwrap();
    h.engine.submit(NewAction::new(submit_checklist("CL"))).await.unwrap();
    h.engine.submit(NewAction::new(complete("T"))).await.unwrap();

    h.go_online();
    settle().await;

    let types: Vec<String> =
        h.applier.calls().iter().map(|(_, kind)| kind.action_type().to_string()).collect();
    assert_eq!(types, vec!["checklist_submission", "task_completion", "note_add"]);
}

/// Validates that a second run with nothing new is a no-op.
///
/// Assertions:
/// - Confirms the second run dispatches nothing and changes nothing.
#[tokio::test]
async fn test_second_run_is_noop() {
    let clock = MockClock::new();
    let h = Harness::open(online(), Arc::new(clock)).await;
    h.engine.submit(NewAction::new(complete("T"))).await.unwrap();

    let first = h.engine.run_sync().await.unwrap();
    let calls = h.applier.call_count();
    let second = h.engine.run_sync().await.unwrap();

    assert_eq!(first.processed_count, 1);
    assert_eq!(second.total, 0);
    assert_eq!(second.processed_count, 0);
    assert_eq!(h.applier.call_count(), calls);
    assert!(h.engine.queue().is_empty().await);
}

/// Validates that run requests during an active run join it.
///
/// Assertions:
/// - Confirms both callers receive the same summary.
/// - Confirms one dispatch and one sync start.
#[tokio::test]
async fn test_concurrent_runs_share_one_flight() {
    let h = Arc::new(Harness::open(online(), Arc::new(MockClock::new())).await);
    h.applier.hold();

    // Submitting while online starts a run, which parks in the applier.
    h.engine.submit(NewAction::new(complete("T"))).await.unwrap();
    h.applier.wait_for_calls(1).await;
    assert!(h.engine.orchestrator().is_syncing());

    let first = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.engine.run_sync().await })
    };
    let second = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.engine.run_sync().await })
    };
    tokio::task::yield_now().await;
    h.applier.release();

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.processed_count, 1);
    assert_eq!(h.applier.call_count(), 1);
    assert_eq!(h.count(|e| matches!(e, SyncEvent::SyncStarted { .. })), 1);
}

/// Validates that a completion and its undo cancel out offline.
///
/// Assertions:
/// - Confirms the queue is empty and the entity is back to its seed.
#[tokio::test]
async fn test_completion_then_undo_is_net_zero() {
    let h = Harness::open(NetworkStatus::offline(), Arc::new(MockClock::new())).await;
    let seeded = json!({"id": "T", "completed": false});
    h.engine.optimistic().seed("T".into(), seeded.clone());

    h.engine.submit(NewAction::new(complete("T"))).await.unwrap();
    let outcome = h.engine.submit(NewAction::new(undo("T"))).await.unwrap();

    assert!(matches!(outcome, EnqueueOutcome::Cancelled { .. }));
    assert!(h.engine.queue().is_empty().await);
    assert_eq!(h.entity("T"), Some(seeded));
    assert_eq!(h.engine.optimistic().pending_patches(), 0);
}

/// Validates that a permanent failure rolls back without retrying.
///
/// Assertions:
/// - Confirms one applier call and no backoff sleep.
/// - Confirms the error message and the removed local effect.
#[tokio::test]
async fn test_permanent_failure_rolls_back_immediately() {
    let clock = MockClock::new();
    let h = Harness::open(online(), Arc::new(clock.clone())).await;
    h.applier.push_err(ApplyError::Permanent { message: "422 invalid note".into(), status: Some(422) });

    h.engine.submit(NewAction::new(note("T", "n1", "hello"))).await.unwrap();
    let summary = h.engine.run_sync().await.unwrap();

    assert_eq!(h.applier.call_count(), 1);
    assert!(clock.sleep_calls().is_empty());
    assert_eq!(summary.errors, vec!["Failed to sync note_add: permanent failure: 422 invalid note"]);
    assert!(h.entity("T").is_none());
}

/// Validates that a manual sync collapses a pending backoff wait.
///
/// Assertions:
/// - Confirms the retry happens without the backoff elapsing.
/// - Confirms the action is applied on the second attempt.
#[tokio::test]
async fn test_sync_now_cancels_backoff() {
    let clock = MockClock::new();
    clock.hold_sleeps(true);
    let h = Harness::open(online(), Arc::new(clock.clone())).await;
    h.applier.push_err(ApplyError::transient("connection reset"));

    h.engine.submit(NewAction::new(complete("T"))).await.unwrap();
    clock.wait_for_sleeps(1).await;
    assert_eq!(h.engine.sync_status().state, SyncState::Syncing);

    let summary = h.engine.sync_now().await.unwrap();

    assert_eq!(h.applier.call_count(), 2);
    assert_eq!(summary.processed_count, 1);
    assert_eq!(clock.elapsed(), Duration::ZERO);
    assert_eq!(h.count(|e| matches!(e, SyncEvent::ActionRetryScheduled { attempt: 1, .. })), 1);
}

/// Validates that syncing while offline is refused without side effects.
///
/// Assertions:
/// - Ensures `run_sync` fails with `Offline` and nothing is dispatched.
#[tokio::test]
async fn test_run_sync_offline_is_refused() {
    let h = Harness::open(NetworkStatus::offline(), Arc::new(MockClock::new())).await;
    h.engine.submit(NewAction::new(complete("T"))).await.unwrap();

    let err = h.engine.orchestrator().run_sync().await.unwrap_err();
    assert!(matches!(err, SyncError::Offline));
    assert_eq!(h.applier.call_count(), 0);
    assert_eq!(h.engine.queue().len().await, 1);
    assert!(h.store.sync_status().is_none());
}

/// Validates progress reporting across a batch.
///
/// Assertions:
/// - Confirms percent values 33, 67 and 100 for three actions.
#[tokio::test]
async fn test_progress_events_report_percent() {
    let h = Harness::open(NetworkStatus::offline(), Arc::new(MockClock::new())).await;
    for task in ["a", "b", "c"] {
        h.engine.submit(NewAction::new(complete(task))).await.unwrap();
    }
    h.go_online();
    while !h.engine.is_online() {
        tokio::task::yield_now().await;
    }
    h.engine.run_sync().await.unwrap();

    let percents: Vec<u8> = h
        .events
        .events()
        .iter()
        .filter_map(|e| match e {
            SyncEvent::SyncProgress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![33, 67, 100]);
}

/// Validates that one run drains a queue longer than the batch size.
///
/// Assertions:
/// - Confirms all five actions are dispatched with a batch size of two.
/// - Confirms a single run reports progress over all five.
/// - Confirms the queue is empty afterwards.
#[tokio::test]
async fn test_run_drains_queue_longer_than_batch() {
    let mut config = Config::default();
    config.sync.batch_size = 2;
    let h = Harness::open_with_config(
        NetworkStatus::offline(),
        Arc::new(MockClock::new()),
        Arc::new(MemoryQueueStore::default()),
        &config,
    )
    .await;
    for task in ["a", "b", "c", "d", "e"] {
        h.engine.submit(NewAction::new(complete(task))).await.unwrap();
    }

    h.go_online();
    while !h.engine.is_online() {
        tokio::task::yield_now().await;
    }
    h.engine.run_sync().await.unwrap();

    assert_eq!(h.applier.call_count(), 5);
    assert!(h.engine.queue().is_empty().await);
    assert_eq!(h.count(|e| matches!(e, SyncEvent::SyncStarted { total: 5 })), 1);
    let progress: Vec<(usize, usize)> = h
        .events
        .events()
        .iter()
        .filter_map(|e| match e {
            SyncEvent::SyncProgress { processed, total, .. } => Some((*processed, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
}

/// Validates that work enqueued during a run waits for the follow-up pass.
///
/// Assertions:
/// - Confirms two sync starts, each over a single action.
/// - Confirms the first action is dispatched before the late one.
/// - Confirms the joined caller sees the follow-up pass and the queue ends
///   empty.
#[tokio::test]
async fn test_enqueue_during_run_is_left_for_follow_up_pass() {
    let h = Arc::new(Harness::open(online(), Arc::new(MockClock::new())).await);
    h.applier.hold();

    h.engine.submit(NewAction::new(complete("A"))).await.unwrap();
    h.applier.wait_for_calls(1).await;
    h.engine.submit(NewAction::new(note("B", "n1", "late"))).await.unwrap();

    let joined = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.engine.run_sync().await })
    };
    tokio::task::yield_now().await;
    h.applier.release();
    let summary = joined.await.unwrap().unwrap();

    let starts: Vec<usize> = h
        .events
        .events()
        .iter()
        .filter_map(|e| match e {
            SyncEvent::SyncStarted { total } => Some(*total),
            _ => None,
        })
        .collect();
    assert_eq!(starts, vec![1, 1]);
    let types: Vec<String> =
        h.applier.calls().iter().map(|(_, kind)| kind.action_type().to_string()).collect();
    assert_eq!(types, vec!["task_completion", "note_add"]);
    assert_eq!(summary.total, 1);
    assert_eq!(summary.processed_count, 1);
    assert!(h.engine.queue().is_empty().await);
}

/// Validates that a supersede racing a dispatch never loses the newer value.
///
/// Assertions:
/// - Confirms the last payload sent for the checklist carries the newer field.
/// - Confirms the queue drains and the local value keeps the newer field.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_supersede_racing_dispatch_sends_latest_fields() {
    for _ in 0..20 {
        let store = Arc::new(MemoryQueueStore::default());
        let h = Arc::new(
            Harness::open_with_store(online(), Arc::new(MockClock::new()), store.clone()).await,
        );
        store.set_save_delay(Duration::from_millis(2));

        h.engine.submit(NewAction::new(update("CL", json!({"field": 1})))).await.unwrap();
        let racing = {
            let h = Arc::clone(&h);
            tokio::spawn(async move {
                h.engine.submit(NewAction::new(update("CL", json!({"field": 2})))).await
            })
        };
        racing.await.unwrap().unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while !h.engine.queue().is_empty().await || h.engine.orchestrator().is_syncing() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("queue drains");

        let calls = h.applier.calls();
        let last = calls.last().map(|(_, kind)| kind.clone());
        assert_eq!(last, Some(update("CL", json!({"field": 2}))));
        assert_eq!(h.entity("CL").unwrap()["field"], json!(2));
    }
}

/// Validates that connectivity is stamped even when there is nothing to sync.
///
/// Assertions:
/// - Confirms `last_connected_time` is set once the network settles online.
/// - Confirms the stamp is persisted with the sync status.
/// - Ensures no sync run starts for an empty queue.
#[tokio::test(start_paused = true)]
async fn test_reconnect_stamps_connection_without_run() {
    let h = Harness::open(NetworkStatus::offline(), Arc::new(SystemClock)).await;
    assert!(h.engine.sync_status().last_connected_time.is_none());

    h.go_online();
    settle().await;

    let stamped = h.engine.sync_status().last_connected_time;
    assert!(stamped.is_some());
    assert_eq!(h.store.sync_status().and_then(|s| s.last_connected_time), stamped);
    assert_eq!(h.count(|e| matches!(e, SyncEvent::SyncStarted { .. })), 0);
}
