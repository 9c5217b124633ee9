//! Fetch phase against a mock source endpoint

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use metrics_loadgen::{
    LoadError, PhaseController, PhaseKind, PhaseState, SharedQueue, SourceTag, StopCondition,
    StopReason,
    snapshot::{self, FileSnapshotStore},
    transport::HttpSource,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crate::helpers::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fetch_reaches_target_and_persists() {
    let server = mock_source().await;
    let dir = tempfile::tempdir().unwrap();
    let queue = SharedQueue::new();

    let source = Arc::new(HttpSource::new(&server.uri(), Duration::from_secs(10)).unwrap());
    let controller = PhaseController::fetch(
        fast_settings(5, 1.0, StopCondition::TargetCount(50)),
        source,
        queue.clone(),
    )
    .with_store(Arc::new(FileSnapshotStore::new(dir.path())));
    let states = controller.subscribe();

    let report = tokio::time::timeout(
        Duration::from_secs(15),
        controller.run(CancellationToken::new()),
    )
    .await
    .expect("fetch phase did not finish within 15s")
    .unwrap();

    assert_eq!(*states.borrow(), PhaseState::Stopped);
    assert_eq!(report.reason, StopReason::TargetReached);
    assert_eq!(queue.len(), 50);

    let path = report.snapshot.unwrap();
    assert!(
        path.file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("metrics_data_")
    );

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["metadata"]["total_records"], 50);
    assert_eq!(raw["metadata"]["phase"], "fetch");
    assert_eq!(raw["metadata"]["target_records"], 50);

    let loaded = snapshot::load(&path).await.unwrap();
    assert_eq!(loaded.records.len(), 50);
    assert_eq!(loaded.rejected, 0);
    let ids: HashSet<_> = loaded.records.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids.len(), 50);
    assert!(
        loaded
            .records
            .iter()
            .all(|r| r.source_tag == Some(SourceTag::Live))
    );
    assert_eq!(snapshot_files(dir.path(), "metrics_data").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bad_responses_are_skipped() {
    let server = MockServer::start().await;
    let requests = Arc::new(AtomicUsize::new(0));

    let counter = requests.clone();
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(move |_: &Request| match counter.fetch_add(1, Ordering::SeqCst) % 4 {
            0 => ResponseTemplate::new(500),
            1 => ResponseTemplate::new(200).set_body_json(json!({ "hour": "12:00:00" })),
            2 => ResponseTemplate::new(200).set_body_string("not json"),
            _ => ResponseTemplate::new(200).set_body_json(valid_payload()),
        })
        .mount(&server)
        .await;

    let queue = SharedQueue::new();
    let source = Arc::new(HttpSource::new(&server.uri(), Duration::from_secs(5)).unwrap());
    let controller = PhaseController::fetch(
        fast_settings(4, 20.0, StopCondition::TargetCount(10)),
        source,
        queue.clone(),
    );

    let report = tokio::time::timeout(
        Duration::from_secs(15),
        controller.run(CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(queue.len(), 10);
    assert_eq!(report.stats.fetched, 10);
    assert!(report.stats.rejected > 0);
    assert!(report.stats.fetch_failed > 0);
}

#[tokio::test]
async fn test_unreachable_source_is_a_startup_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let mut settings = fast_settings(2, 10.0, StopCondition::TargetCount(5));
    settings.preflight_attempts = 3;
    settings.preflight_delay = Duration::from_millis(10);
    let source = Arc::new(HttpSource::new(&server.uri(), Duration::from_secs(1)).unwrap());

    let result = PhaseController::fetch(settings, source, SharedQueue::new())
        .run(CancellationToken::new())
        .await;

    assert_matches!(
        result,
        Err(LoadError::Startup {
            phase: PhaseKind::Fetch,
            ..
        })
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}
