//! Dummy record generator
//!
//! Produces plausible records without any network I/O, used to seed the queue
//! for the push phase. Values are random, shape is fixed and derived fields
//! are internally consistent.

use chrono::{Duration, Local};
use tracing::debug;
use uuid::Uuid;

use crate::record::{Record, SourceTag};

/// Log a progress line every this many records
const PROGRESS_STEP: usize = 500;

/// Generate `count` dummy records
pub fn generate(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            if (i + 1) % PROGRESS_STEP == 0 {
                debug!("generated {}/{count} dummy records", i + 1);
            }
            dummy_record()
        })
        .collect()
}

/// Build one dummy record
pub fn dummy_record() -> Record {
    let total_ram = fastrand::u64(8_000..=32_000);
    let ram_used = fastrand::u64(total_ram * 3 / 10..=total_ram * 9 / 10);
    let ram_free = total_ram - ram_used;
    let ram_percent = round2(ram_used as f64 / total_ram as f64 * 100.0);

    let cpu_used = round2(10.0 + fastrand::f64() * 85.0);
    let cpu_free = round2(100.0 - cpu_used);

    let processes_total = fastrand::u64(200..=500);
    let processes_running = fastrand::u64(1..=10);
    let processes_sleeping = processes_total - processes_running - fastrand::u64(0..=5);
    let remainder = processes_total - processes_running - processes_sleeping;
    let processes_zombie = fastrand::u64(0..=remainder.min(3));
    let processes_stopped = remainder.saturating_sub(processes_zombie);

    let observed_at = Local::now() - Duration::seconds(fastrand::i64(0..=3600));

    Record {
        id: format!("dummy_{}", Uuid::new_v4().simple()),
        timestamp: observed_at.to_rfc3339(),
        total_ram: total_ram as f64,
        ram_free: ram_free as f64,
        ram_used: ram_used as f64,
        ram_percent,
        cpu_used_percent: cpu_used,
        cpu_free_percent: cpu_free,
        processes_running,
        processes_total,
        processes_sleeping,
        processes_zombie,
        processes_stopped,
        hour: observed_at.format("%H:%M:%S").to_string(),
        source_tag: Some(SourceTag::Dummy),
        extra: Default::default(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
