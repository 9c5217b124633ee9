//! Push phase: at-least-once delivery under transient failures

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics_loadgen::{
    DeliveryTag, PhaseController, SharedQueue, StopCondition, StopReason, generator,
    snapshot::{MemorySnapshotStore, SnapshotKind},
    transport::HttpSink,
};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_record_delivered_exactly_once() {
    let (server, received) = mock_destination(15).await;
    let records = generator::generate(40);
    let expected: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
    let queue = SharedQueue::from_records(records);

    let sink = Arc::new(HttpSink::new(&server.uri(), Duration::from_secs(5)).unwrap());
    let store = Arc::new(MemorySnapshotStore::new());
    let controller = PhaseController::push(
        fast_settings(5, 50.0, StopCondition::QueueDrained),
        sink,
        DeliveryTag::default(),
        queue.clone(),
    )
    .with_store(store.clone());

    let report = tokio::time::timeout(
        Duration::from_secs(20),
        controller.run(CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(report.reason, StopReason::QueueDrained);
    assert_eq!(report.stats.delivered, 40);
    assert_eq!(report.stats.requeued, 15);
    assert!(queue.is_drained());
    assert!(report.snapshot.is_none());
    assert!(store.saved().is_empty());

    let ids = received.ids();
    assert_eq!(ids.len(), 40);
    assert_eq!(ids.into_iter().collect::<HashSet<_>>(), expected);
    assert_eq!(received.attempts(), 55);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_push_persists_undelivered_records() {
    let records = generator::generate(25);
    let expected: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
    let queue = SharedQueue::from_records(records);

    let sink = Arc::new(FlakySink::new(usize::MAX));
    let store = Arc::new(MemorySnapshotStore::new());
    let handle = PhaseController::push(
        fast_settings(5, 50.0, StopCondition::Manual),
        sink.clone(),
        DeliveryTag::default(),
        queue.clone(),
    )
    .with_store(store.clone())
    .start();

    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.stop();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.reason, StopReason::Cancelled);
    assert!(report.stats.requeued > 0);
    assert_eq!(report.stats.delivered, 0);
    assert_eq!(queue.leased(), 0);

    let saved = store.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].metadata.phase, SnapshotKind::Push);
    assert_eq!(saved[0].metadata.destination_endpoint.as_deref(), Some("flaky"));
    let persisted: HashSet<_> = saved[0].metrics.iter().map(|r| r.id.clone()).collect();
    assert_eq!(persisted, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unbounded_push_waits_on_empty_queue() {
    let sink = Arc::new(FlakySink::new(0));
    let queue = SharedQueue::new();
    let handle = PhaseController::push(
        fast_settings(3, 50.0, StopCondition::Manual),
        sink.clone(),
        DeliveryTag::default(),
        queue.clone(),
    )
    .start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    queue.extend(generator::generate(10));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while sink.delivered().len() < 10 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    handle.stop();
    let report = handle.wait().await.unwrap();

    assert_eq!(sink.delivered().len(), 10);
    assert_eq!(report.stats.delivered, 10);
    assert_eq!(report.reason, StopReason::Cancelled);
}
