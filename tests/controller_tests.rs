//! # Controller Tests
//!
//! End-to-end tests of the reconciliation engine without a cluster: a
//! notification channel feeds the controller, the recording fakes observe
//! what the reconciler did.
//!
//! These tests verify:
//! - Scaling a resource away from the desired count
//! - Idempotent reconciliation of a converged resource
//! - Retry with increasing backoff after mutation failures
//! - Startup ordering (no work before cache sync) and lifecycle states
//! - Recovery from a panicking reconciliation

mod common;

use async_trait::async_trait;
use common::{key, reconciler, snapshot, RecordingEventSink, RecordingScaler};
use replica_controller::cache::ResourceCache;
use replica_controller::controller::{
    Controller, ControllerOptions, ControllerState, SyncPolicy,
};
use replica_controller::events::{EventSink, EventType};
use replica_controller::queue::WorkQueue;
use replica_controller::reconciler::{Reconciler, ReplicaScaler, ScaleError};
use replica_controller::resource::{ResourceIdentity, ResourceSnapshot};
use replica_controller::translator::{Notification, SourceEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Harness {
    controller: Arc<Controller>,
    queue: WorkQueue,
    tx: mpsc::Sender<SourceEvent<ResourceSnapshot>>,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<(), replica_controller::controller::ControllerError>>,
}

impl Harness {
    fn start(reconciler_for: impl FnOnce(&Arc<ResourceCache>) -> Reconciler) -> Self {
        let cache = Arc::new(ResourceCache::new());
        let queue = WorkQueue::new("test");
        let controller = Arc::new(Controller::new(
            Arc::clone(&cache),
            queue.clone(),
            reconciler_for(&cache),
            ControllerOptions {
                workers: 2,
                sync_timeout: Duration::from_secs(60),
                sync_policy: SyncPolicy::Proceed,
            },
        ));
        let (tx, rx) = mpsc::channel(64);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let controller = Arc::clone(&controller);
            let shutdown = shutdown.clone();
            async move { controller.run(rx, shutdown).await }
        });
        Self {
            controller,
            queue,
            tx,
            shutdown,
            handle,
        }
    }

    async fn send(&self, event: impl Into<SourceEvent<ResourceSnapshot>>) {
        self.tx.send(event.into()).await.unwrap();
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap().unwrap();
        assert_eq!(self.controller.state(), ControllerState::Stopped);
    }
}

/// Poll `condition` until it holds, failing the test after a generous deadline
async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_scales_resource_to_desired_count() {
    let scaler = RecordingScaler::new();
    let sink = RecordingEventSink::new();
    let harness = Harness::start(|cache| reconciler(cache, &scaler, &sink));

    harness
        .send(Notification::Added(snapshot("ns", "app", "1", 1)))
        .await;
    harness.send(SourceEvent::InitialListDone).await;

    eventually(|| !sink.events().is_empty()).await;

    let calls = scaler.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].key, key("ns", "app"));
    assert_eq!(calls[0].replicas, 2);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].subject, key("ns", "app"));
    assert_eq!(events[0].event_type, EventType::Normal);
    assert_eq!(events[0].reason, "Synced");

    harness.stop().await;
}

#[tokio::test]
async fn test_converged_resource_is_not_mutated() {
    let scaler = RecordingScaler::new();
    let sink = RecordingEventSink::new();
    let harness = Harness::start(|cache| reconciler(cache, &scaler, &sink));

    harness
        .send(Notification::Added(snapshot("ns", "app", "1", 2)))
        .await;
    harness.send(SourceEvent::InitialListDone).await;

    eventually(|| !sink.events().is_empty()).await;

    assert!(scaler.calls().is_empty());
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Normal);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failures_retry_with_increasing_backoff() {
    let scaler = RecordingScaler::failing(2);
    let sink = RecordingEventSink::new();
    let harness = Harness::start(|cache| reconciler(cache, &scaler, &sink));
    let app = key("ns", "app");

    harness
        .send(Notification::Added(snapshot("ns", "app", "1", 1)))
        .await;
    harness.send(SourceEvent::InitialListDone).await;

    eventually(|| {
        sink.events()
            .iter()
            .any(|event| event.event_type == EventType::Normal)
    })
    .await;
    eventually(|| harness.queue.num_requeues(&app) == 0).await;

    let calls = scaler.calls();
    assert_eq!(calls.len(), 3, "two failures then one success");
    let first_gap = calls[1].at - calls[0].at;
    let second_gap = calls[2].at - calls[1].at;
    assert!(first_gap >= Duration::from_millis(5), "first retry after {first_gap:?}");
    assert!(second_gap >= Duration::from_millis(10), "second retry after {second_gap:?}");
    assert!(second_gap > first_gap);

    let kinds: Vec<EventType> = sink.events().iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![EventType::Warning, EventType::Warning, EventType::Normal]
    );

    harness.stop().await;
}

#[tokio::test]
async fn test_workers_wait_for_cache_sync() {
    let scaler = RecordingScaler::new();
    let sink = RecordingEventSink::new();
    let harness = Harness::start(|cache| reconciler(cache, &scaler, &sink));
    let mut states = harness.controller.subscribe_state();

    harness
        .send(Notification::Added(snapshot("ns", "app", "1", 1)))
        .await;
    states
        .wait_for(|state| *state == ControllerState::WaitingForSync)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(scaler.calls().is_empty(), "no reconciliation before sync");
    assert_eq!(harness.controller.state(), ControllerState::WaitingForSync);

    harness.send(SourceEvent::InitialListDone).await;
    states
        .wait_for(|state| *state == ControllerState::Running)
        .await
        .unwrap();
    eventually(|| scaler.calls().len() == 1).await;

    harness.stop().await;
}

#[tokio::test]
async fn test_deleted_resource_reconciles_as_noop() {
    let scaler = RecordingScaler::new();
    let sink = RecordingEventSink::new();
    let harness = Harness::start(|cache| reconciler(cache, &scaler, &sink));

    harness
        .send(Notification::Added(snapshot("ns", "app", "1", 1)))
        .await;
    harness
        .send(Notification::Deleted(snapshot("ns", "app", "1", 1)))
        .await;
    harness.send(SourceEvent::InitialListDone).await;

    eventually(|| harness.controller.state() == ControllerState::Running).await;
    eventually(|| harness.queue.is_empty()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(scaler.calls().is_empty());
    assert!(sink.events().is_empty());

    harness.stop().await;
}

#[tokio::test]
async fn test_unchanged_resync_is_not_reconciled_again() {
    let scaler = RecordingScaler::new();
    let sink = RecordingEventSink::new();
    let harness = Harness::start(|cache| reconciler(cache, &scaler, &sink));

    harness
        .send(Notification::Added(snapshot("ns", "app", "1", 2)))
        .await;
    harness.send(SourceEvent::InitialListDone).await;
    eventually(|| sink.events().len() == 1).await;

    harness
        .send(Notification::Updated {
            old: snapshot("ns", "app", "1", 2),
            new: snapshot("ns", "app", "1", 2),
        })
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.events().len(), 1);

    harness.stop().await;
}

/// Panics on the first call, succeeds afterwards
#[derive(Default)]
struct PanicOnceScaler {
    calls: AtomicUsize,
}

#[async_trait]
impl ReplicaScaler for PanicOnceScaler {
    async fn scale(&self, _key: &ResourceIdentity, _replicas: i32) -> Result<(), ScaleError> {
        assert!(
            self.calls.fetch_add(1, Ordering::SeqCst) > 0,
            "scaler exploded"
        );
        Ok(())
    }
}

#[tokio::test]
async fn test_panicking_reconcile_releases_key_and_retries() {
    let scaler = Arc::new(PanicOnceScaler::default());
    let sink = RecordingEventSink::new();
    let harness = Harness::start(|cache| {
        Reconciler::new(
            Arc::clone(cache),
            Arc::clone(&scaler) as Arc<dyn ReplicaScaler>,
            Arc::clone(&sink) as Arc<dyn EventSink>,
            2,
        )
    });

    harness
        .send(Notification::Added(snapshot("ns", "app", "1", 1)))
        .await;
    harness.send(SourceEvent::InitialListDone).await;

    eventually(|| !sink.events().is_empty()).await;
    assert_eq!(scaler.calls.load(Ordering::SeqCst), 2);
    assert_eq!(sink.events()[0].event_type, EventType::Normal);

    harness.stop().await;
}

#[tokio::test]
async fn test_lifecycle_states() {
    let scaler = RecordingScaler::new();
    let sink = RecordingEventSink::new();
    let cache = Arc::new(ResourceCache::new());
    let controller = Arc::new(Controller::new(
        Arc::clone(&cache),
        WorkQueue::new("test"),
        reconciler(&cache, &scaler, &sink),
        ControllerOptions {
            workers: 1,
            sync_timeout: Duration::from_secs(60),
            sync_policy: SyncPolicy::Abort,
        },
    ));
    assert_eq!(controller.state(), ControllerState::Created);

    let (tx, rx) = mpsc::channel::<SourceEvent<ResourceSnapshot>>(8);
    let shutdown = CancellationToken::new();
    let mut states = controller.subscribe_state();
    let handle = tokio::spawn({
        let controller = Arc::clone(&controller);
        let shutdown = shutdown.clone();
        async move { controller.run(rx, shutdown).await }
    });

    states
        .wait_for(|state| *state == ControllerState::WaitingForSync)
        .await
        .unwrap();
    tx.send(SourceEvent::InitialListDone).await.unwrap();
    states
        .wait_for(|state| *state == ControllerState::Running)
        .await
        .unwrap();

    shutdown.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(controller.state(), ControllerState::Stopped);
}
