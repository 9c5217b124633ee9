//! Push task - drains the shared queue into the destination
//!
//! A record taken from the head is either delivered (and gone for good) or put
//! back at the head unchanged. Retries are unbounded and have no backoff: a
//! destination that keeps failing keeps the same record cycling at the head
//! until it succeeds or the phase is stopped, at which point it is persisted
//! with the rest of the queue.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    queue::SharedQueue, record::DeliveryTag, stats::PhaseStats, transport::MetricsSink,
};

use super::actor::ActorTask;
use super::messages::{ActorKind, TaskOutcome};

pub struct PushTask {
    sink: Arc<dyn MetricsSink>,
    queue: SharedQueue,
    tag: DeliveryTag,
    stats: Arc<PhaseStats>,
}

impl PushTask {
    pub fn new(
        sink: Arc<dyn MetricsSink>,
        queue: SharedQueue,
        tag: DeliveryTag,
        stats: Arc<PhaseStats>,
    ) -> Self {
        Self {
            sink,
            queue,
            tag,
            stats,
        }
    }
}

#[async_trait]
impl ActorTask for PushTask {
    fn kind(&self) -> ActorKind {
        ActorKind::Pusher
    }

    async fn perform(&self) -> TaskOutcome {
        let Some(record) = self.queue.lease_front() else {
            return TaskOutcome::QueueEmpty;
        };

        let result = self.sink.deliver(&self.tag.envelope(&record)).await;

        match result {
            Ok(()) => {
                self.queue.complete_lease();
                self.stats.record_delivered();
                debug!(
                    ram = record.ram_percent,
                    cpu = record.cpu_used_percent,
                    "delivered {} to {}",
                    record.id,
                    self.tag.api
                );
                TaskOutcome::Delivered
            }
            Err(e) => {
                warn!("delivery of {} failed, requeueing: {e}", record.id);
                self.queue.return_lease(record);
                self.stats.record_requeued();
                TaskOutcome::Requeued
            }
        }
    }
}
