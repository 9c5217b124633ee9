//! Forward task - direct pass-through mode
//!
//! Fetches a record and delivers it straight away without touching a queue.
//! A failed delivery is only logged: there is nowhere to put the record back.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    record::{DeliveryTag, SourceTag},
    stats::PhaseStats,
    transport::{MetricsSink, MetricsSource},
    validator,
};

use super::actor::ActorTask;
use super::messages::{ActorKind, TaskOutcome};

pub struct ForwardTask {
    source: Arc<dyn MetricsSource>,
    sink: Arc<dyn MetricsSink>,
    tag: DeliveryTag,
    stats: Arc<PhaseStats>,
}

impl ForwardTask {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        sink: Arc<dyn MetricsSink>,
        tag: DeliveryTag,
        stats: Arc<PhaseStats>,
    ) -> Self {
        Self {
            source,
            sink,
            tag,
            stats,
        }
    }
}

#[async_trait]
impl ActorTask for ForwardTask {
    fn kind(&self) -> ActorKind {
        ActorKind::Forwarder
    }

    async fn perform(&self) -> TaskOutcome {
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

        match self.sink.deliver(&self.tag.envelope(&record)).await {
            Ok(()) => {
                self.stats.record_forwarded();
                debug!(
                    ram = record.ram_percent,
                    cpu = record.cpu_used_percent,
                    "forwarded {} to {}",
                    record.id,
                    self.tag.api
                );
                TaskOutcome::Forwarded
            }
            Err(e) => {
                warn!("direct delivery of {} failed: {e}", record.id);
                self.stats.record_forward_failed();
                TaskOutcome::ForwardFailed
            }
        }
    }
}
