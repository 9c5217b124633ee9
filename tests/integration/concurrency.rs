//! Concurrency tests
//!
//! These tests hammer the shared queue and the phase controller from many
//! tasks at once:
//! - no record lost or duplicated under concurrent appends and leases
//! - no target overshoot with many fetchers
//! - the pool never runs more actors than configured

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_loadgen::{
    PhaseController, SharedQueue, StopCondition, StopReason,
    error::TransportError,
    generator,
    transport::MetricsSource,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

/// Source answering instantly with fresh payloads
struct InstantSource;

#[async_trait]
impl MetricsSource for InstantSource {
    fn describe(&self) -> String {
        "instant".to_string()
    }

    async fn fetch(&self) -> Result<Value, TransportError> {
        tokio::task::yield_now().await;
        Ok(valid_payload())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_appends_lose_nothing() {
    let queue = SharedQueue::new();

    let mut tasks = vec![];
    for _ in 0..16 {
        let queue = queue.clone();
        tasks.push(tokio::spawn(async move {
            for record in generator::generate(100) {
                queue.append(record);
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let ids: HashSet<_> = queue.snapshot().into_iter().map(|r| r.id).collect();
    assert_eq!(queue.len(), 1600);
    assert_eq!(ids.len(), 1600);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_leases_settle_every_record() {
    let records = generator::generate(500);
    let expected: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
    let queue = SharedQueue::from_records(records);

    let mut tasks = vec![];
    for worker in 0..10 {
        let queue = queue.clone();
        tasks.push(tokio::spawn(async move {
            let mut delivered = vec![];
            let mut attempt = 0usize;
            while let Some(record) = queue.lease_front() {
                attempt += 1;
                tokio::task::yield_now().await;
                // every third attempt of odd workers fails
                if worker % 2 == 1 && attempt % 3 == 0 {
                    queue.return_lease(record);
                } else {
                    delivered.push(record.id.clone());
                    queue.complete_lease();
                }
            }
            delivered
        }));
    }

    let mut delivered = vec![];
    for task in tasks {
        delivered.extend(task.await.unwrap());
    }

    assert!(queue.is_drained());
    assert_eq!(delivered.len(), 500);
    assert_eq!(delivered.into_iter().collect::<HashSet<_>>(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_no_overshoot_with_many_fetchers() {
    for _ in 0..3 {
        let queue = SharedQueue::new();
        let mut settings = fast_settings(50, 1000.0, StopCondition::TargetCount(100));
        settings.pool.wait = metrics_loadgen::actors::actor::WaitRange::new(
            Duration::ZERO,
            Duration::from_millis(2),
        )
        .unwrap();

        let report = PhaseController::fetch(settings, Arc::new(InstantSource), queue.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.reason, StopReason::TargetReached);
        assert_eq!(queue.len(), 100);
        assert_eq!(report.stats.fetched, 100);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_never_exceeds_users() {
    let handle = PhaseController::fetch(
        fast_settings(7, 500.0, StopCondition::Manual),
        Arc::new(InstantSource),
        SharedQueue::new(),
    )
    .start();

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.stop();
    let report = handle.wait().await.unwrap();

    let pool = report.pool.unwrap();
    assert_eq!(pool.spawned, 7);
    assert_eq!(pool.target, 7);
    assert_eq!(pool.active, 0);
}
