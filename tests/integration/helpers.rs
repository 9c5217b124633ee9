//! Test helpers shared by the integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use metrics_loadgen::{
    LoadConfig,
    actors::{actor::WaitRange, pool::PoolConfig},
    error::TransportError,
    generator,
    phase::{PhaseSettings, StopCondition},
    record::DeliveryEnvelope,
    transport::MetricsSink,
};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// A valid source payload, as a live endpoint would send it
pub fn valid_payload() -> Value {
    let mut value = serde_json::to_value(generator::dummy_record()).unwrap();
    let map = value.as_object_mut().unwrap();
    map.remove("source_tag");
    map.remove("id");
    map.remove("timestamp");
    value
}

/// Mock source answering every `GET /metrics` with a fresh valid payload
pub async fn mock_source() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(|_: &Request| ResponseTemplate::new(200).set_body_json(valid_payload()))
        .mount(&server)
        .await;
    server
}

/// Ids received by a mock destination, one entry per accepted delivery
#[derive(Clone, Default)]
pub struct Received {
    pub ids: Arc<Mutex<Vec<String>>>,
    pub attempts: Arc<AtomicUsize>,
}

impl Received {
    pub fn ids(&self) -> Vec<String> {
        self.ids.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// Mock destination rejecting the first `failures` requests with 503
pub async fn mock_destination(failures: usize) -> (MockServer, Received) {
    let server = MockServer::start().await;
    let received = Received::default();

    let state = received.clone();
    Mock::given(method("POST"))
        .and(path("/metrics"))
        .respond_with(move |req: &Request| {
            let attempt = state.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < failures {
                return ResponseTemplate::new(503);
            }

            let body: Value = req.body_json().unwrap();
            assert_eq!(body["api"], "Balanced");
            assert_eq!(body["load_balancer"], "nginx");
            state
                .ids
                .lock()
                .unwrap()
                .push(body["id"].as_str().unwrap().to_string());
            ResponseTemplate::new(201)
        })
        .mount(&server)
        .await;

    (server, received)
}

/// In-process sink failing the first `failures` calls
pub struct FlakySink {
    failures: usize,
    calls: AtomicUsize,
    pub delivered: Mutex<Vec<String>>,
}

impl FlakySink {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsSink for FlakySink {
    fn describe(&self) -> String {
        "flaky".to_string()
    }

    async fn deliver(&self, envelope: &DeliveryEnvelope<'_>) -> Result<(), TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1)).await;
        if call < self.failures {
            return Err(TransportError::Status(503));
        }
        self.delivered
            .lock()
            .unwrap()
            .push(envelope.record.id.clone());
        Ok(())
    }
}

/// Phase settings with millisecond waits and fast polling
pub fn fast_settings(users: usize, spawn_rate: f64, stop: StopCondition) -> PhaseSettings {
    let pool = PoolConfig {
        users,
        spawn_rate,
        wait: WaitRange::new(Duration::from_millis(10), Duration::from_millis(50)).unwrap(),
    };
    let mut settings = PhaseSettings::new(pool, stop);
    settings.poll_interval = Duration::from_millis(20);
    settings.report.interval = Duration::from_millis(500);
    settings
}

/// Configuration pointing at mock servers, with fast populations
pub fn fast_config(source: &str, destination: &str, snapshot_dir: &Path) -> LoadConfig {
    let mut config = LoadConfig::default();
    config.source_url = source.to_string();
    config.destination_url = destination.to_string();
    config.snapshot_dir = snapshot_dir.to_path_buf();
    for population in [&mut config.fetch, &mut config.push, &mut config.direct] {
        population.users = 5;
        population.spawn_rate = 50.0;
        population.wait_min_secs = 0.005;
        population.wait_max_secs = 0.02;
        population.timeout_secs = 2.0;
    }
    config.target_records = 40;
    config.min_records_for_push = 20;
    config.phase_pause_secs = 0.05;
    config.push_until_empty = true;
    config.preflight_attempts = 2;
    config
}

/// Snapshot files in `dir` whose name starts with `prefix`
pub fn snapshot_files(dir: &Path, prefix: &str) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(prefix) && name.ends_with(".json"))
        })
        .collect();
    files.sort();
    files
}
