//! Fetch task - pulls records from the source into the shared queue
//!
//! ## Cycle
//!
//! ```text
//! queue at target? ──yes──▶ skip
//!        │ no
//!        ▼
//! GET source ──error/timeout──▶ skip (next cycle retries naturally)
//!        │
//!        ▼
//! validate ──invalid──▶ drop + log
//!        │
//!        ▼
//! append while below target
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    queue::SharedQueue, record::SourceTag, stats::PhaseStats, transport::MetricsSource,
    validator,
};

use super::actor::ActorTask;
use super::messages::{ActorKind, TaskOutcome};

pub struct FetchTask {
    source: Arc<dyn MetricsSource>,
    queue: SharedQueue,
    target: usize,
    stats: Arc<PhaseStats>,
}

impl FetchTask {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        queue: SharedQueue,
        target: usize,
        stats: Arc<PhaseStats>,
    ) -> Self {
        Self {
            source,
            queue,
            target,
            stats,
        }
    }
}

#[async_trait]
impl ActorTask for FetchTask {
    fn kind(&self) -> ActorKind {
        ActorKind::Fetcher
    }

    async fn perform(&self) -> TaskOutcome {
        if self.queue.len() >= self.target {
            return TaskOutcome::TargetReached;
        }

        let payload = match self.source.fetch().await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("fetch from {} failed: {e}", self.source.describe());
                self.stats.record_fetch_failed();
                return TaskOutcome::FetchFailed;
            }
        };

        let mut record = match validator::validate(payload) {
            Ok(record) => record,
            Err(e) => {
                warn!("discarding payload: {e}");
                self.stats.record_rejected();
                return TaskOutcome::Rejected;
            }
        };
        record.source_tag.get_or_insert(SourceTag::Live);

        let (ram, cpu) = (record.ram_percent, record.cpu_used_percent);
        match self.queue.append_within(record, self.target) {
            Ok(len) => {
                self.stats.record_fetched();
                debug!(ram, cpu, "queue: {len}/{}", self.target);
                TaskOutcome::Appended
            }
            Err(_) => TaskOutcome::TargetReached,
        }
    }
}
