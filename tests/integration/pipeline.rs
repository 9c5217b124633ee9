//! Run modes over HTTP mocks and a snapshot directory

use std::collections::HashSet;
use std::time::Duration;

use assert_matches::assert_matches;
use metrics_loadgen::{LoadConfig, LoadError, PhaseKind, Pipeline, StopReason, snapshot};
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

use crate::helpers::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_run_over_http() {
    let source = mock_source().await;
    let (destination, received) = mock_destination(5).await;
    let dir = tempfile::tempdir().unwrap();
    let pipeline =
        Pipeline::from_config(fast_config(&source.uri(), &destination.uri(), dir.path())).unwrap();

    let report = tokio::time::timeout(
        Duration::from_secs(30),
        pipeline.run_full(&CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(report.fetch.reason, StopReason::TargetReached);
    let push = report.push.unwrap();
    assert_eq!(push.reason, StopReason::QueueDrained);
    assert_eq!(push.stats.delivered, 40);

    let fetched = snapshot_files(dir.path(), "metrics_data");
    assert_eq!(fetched.len(), 1);
    let loaded = snapshot::load(&fetched[0]).await.unwrap();
    let expected: HashSet<_> = loaded.records.into_iter().map(|r| r.id).collect();

    assert_eq!(received.ids().into_iter().collect::<HashSet<_>>(), expected);
    assert!(snapshot_files(dir.path(), "remaining_data").is_empty());
}

#[tokio::test]
async fn test_push_refused_below_minimum() {
    let source = mock_source().await;
    let (destination, received) = mock_destination(0).await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config(&source.uri(), &destination.uri(), dir.path());
    config.target_records = 10;
    let pipeline = Pipeline::from_config(config).unwrap();

    let result = pipeline.run_full(&CancellationToken::new()).await;

    assert_matches!(
        result,
        Err(LoadError::Startup {
            phase: PhaseKind::Push,
            ..
        })
    );
    assert_eq!(pipeline.queue().len(), 10);
    assert_eq!(received.attempts(), 0);
}

#[tokio::test]
async fn test_full_run_halts_when_source_is_down() {
    let source = MockServer::start().await;
    let (destination, received) = mock_destination(0).await;
    let dir = tempfile::tempdir().unwrap();
    let pipeline =
        Pipeline::from_config(fast_config(&source.uri(), &destination.uri(), dir.path())).unwrap();

    let result = pipeline.run_full(&CancellationToken::new()).await;

    assert_matches!(
        result,
        Err(LoadError::Startup {
            phase: PhaseKind::Fetch,
            ..
        })
    );
    assert_eq!(received.attempts(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dummy_snapshot_pushed_from_file() {
    let (destination, received) = mock_destination(3).await;
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config("http://127.0.0.1:9", &destination.uri(), dir.path());

    let generator = Pipeline::from_config(config.clone()).unwrap();
    let path = generator.generate_dummy(15, false).await.unwrap();
    assert!(generator.queue().is_empty());

    let pusher = Pipeline::from_config(config).unwrap();
    let loaded = pusher.load_snapshot(&path).await.unwrap();
    assert_eq!(loaded.records.len(), 15);

    let report = tokio::time::timeout(
        Duration::from_secs(20),
        pusher.continue_push(true, &CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(report.stats.delivered, 15);
    assert_eq!(report.stats.requeued, 3);
    assert!(
        received
            .ids()
            .iter()
            .all(|id| id.starts_with("dummy_"))
    );
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = LoadConfig::default();
    config.push.users = 0;

    assert_matches!(
        Pipeline::from_config(config).err(),
        Some(LoadError::InvalidConfig(_))
    );
}
