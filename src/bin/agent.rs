use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;
use metrics_loadgen::{
    Record, validator,
    util::{get_addr, get_fail_rate, get_port},
};
use rocket::{
    State,
    figment::Figment,
    get,
    http::Status,
    launch, post, routes,
    serde::json::{Json, Value},
};
use serde::Serialize;
use sysinfo::{ProcessStatus, System};
use tracing::{debug, error, instrument, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

const MB: f64 = 1024.0 * 1024.0;

/// Counters for the ingestion side
#[derive(Debug, Default)]
struct Ingest {
    received: AtomicU64,
    failed: AtomicU64,
    invalid: AtomicU64,
    fail_rate: f64,
}

#[derive(Debug, Serialize)]
struct IngestStats {
    received: u64,
    failed: u64,
    invalid: u64,
    fail_rate: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Take a host sample; blocks for the CPU measurement interval
fn sample() -> Record {
    let mut sys = System::new_all();
    sys.refresh_all();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_all();

    let total_ram = round2(sys.total_memory() as f64 / MB);
    let ram_used = round2(sys.used_memory() as f64 / MB);
    let cpu_used = round2(sys.global_cpu_usage() as f64);

    let mut running = 0;
    let mut sleeping = 0;
    let mut zombie = 0;
    let mut stopped = 0;
    for process in sys.processes().values() {
        match process.status() {
            ProcessStatus::Run => running += 1,
            ProcessStatus::Sleep | ProcessStatus::Idle => sleeping += 1,
            ProcessStatus::Zombie => zombie += 1,
            ProcessStatus::Stop => stopped += 1,
            _ => {}
        }
    }

    let now = Local::now();
    Record {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: now.to_rfc3339(),
        total_ram,
        ram_free: round2(total_ram - ram_used),
        ram_used,
        ram_percent: if total_ram > 0.0 {
            round2(ram_used / total_ram * 100.0)
        } else {
            0.0
        },
        cpu_used_percent: cpu_used,
        cpu_free_percent: round2(100.0 - cpu_used),
        processes_running: running,
        processes_total: sys.processes().len() as u64,
        processes_sleeping: sleeping,
        processes_zombie: zombie,
        processes_stopped: stopped,
        hour: now.format("%H:%M:%S").to_string(),
        source_tag: None,
        extra: Default::default(),
    }
}

#[get("/metrics")]
#[instrument]
async fn metrics() -> Result<Json<Record>, Status> {
    let record = tokio::task::spawn_blocking(sample).await.map_err(|e| {
        error!("sampling task failed: {e}");
        Status::InternalServerError
    })?;
    debug!(ram = record.ram_percent, cpu = record.cpu_used_percent, "serving metrics");

    Ok(Json(record))
}

#[post("/metrics", data = "<payload>")]
fn ingest(payload: Json<Value>, state: &State<Ingest>) -> Status {
    if fastrand::f64() < state.fail_rate {
        state.failed.fetch_add(1, Ordering::Relaxed);
        return Status::ServiceUnavailable;
    }

    match validator::validate(payload.into_inner()) {
        Ok(record) => {
            let received = state.received.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("received {} ({received} total)", record.id);
            Status::Created
        }
        Err(e) => {
            warn!("rejecting delivery: {e}");
            state.invalid.fetch_add(1, Ordering::Relaxed);
            Status::UnprocessableEntity
        }
    }
}

#[get("/stats")]
fn stats(state: &State<Ingest>) -> Json<IngestStats> {
    Json(IngestStats {
        received: state.received.load(Ordering::Relaxed),
        failed: state.failed.load(Ordering::Relaxed),
        invalid: state.invalid.load(Ordering::Relaxed),
        fail_rate: state.fail_rate,
    })
}

#[get("/ping")]
fn ping() {}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new()
        .with_target("agent", tracing::metadata::LevelFilter::DEBUG)
        .with_target("metrics_loadgen", tracing::metadata::LevelFilter::INFO)
        .with_target("rocket", tracing::metadata::LevelFilter::INFO);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(true),
        )
        .with(filter)
        .init();
}

fn get_config() -> Figment {
    rocket::Config::figment()
        .merge(("port", get_port()))
        .merge(("address", get_addr()))
}

#[launch]
fn rocket() -> _ {
    init();
    let figment = get_config();
    let counters = Ingest {
        fail_rate: get_fail_rate(),
        ..Ingest::default()
    };

    rocket::custom(figment)
        .manage(counters)
        .mount("/", routes![metrics, ingest, stats, ping])
}
