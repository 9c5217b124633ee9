//! Message types for actor communication
//!
//! Pools are controlled through an mpsc command channel; queries answer on a
//! oneshot channel carried inside the command.

use std::fmt;

use serde::Serialize;
use tokio::sync::oneshot;

/// Which task an actor performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Fetcher,
    Pusher,
    Forwarder,
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorKind::Fetcher => write!(f, "fetcher"),
            ActorKind::Pusher => write!(f, "pusher"),
            ActorKind::Forwarder => write!(f, "forwarder"),
        }
    }
}

/// Result of one task cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Fetched record appended to the queue
    Appended,
    /// Queue already holds the target count, nothing done
    TargetReached,
    /// Payload failed validation and was dropped
    Rejected,
    /// Fetch timed out or failed; cycle skipped
    FetchFailed,
    /// Record acknowledged by the destination
    Delivered,
    /// Delivery failed, record back at the head of the queue
    Requeued,
    /// Queue empty, cycle skipped
    QueueEmpty,
    /// Direct mode: fetched record delivered
    Forwarded,
    /// Direct mode: delivery failed, record dropped
    ForwardFailed,
}

/// Commands that can be sent to an actor pool
#[derive(Debug)]
pub enum PoolCommand {
    /// Report the current population
    Status {
        respond_to: oneshot::Sender<PoolStatus>,
    },

    /// Cancel every actor and wait for them to finish their current cycle
    Stop {
        respond_to: oneshot::Sender<PoolStatus>,
    },
}

/// Population of an actor pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub kind: ActorKind,

    /// Target concurrency
    pub target: usize,

    /// Actors currently running
    pub active: usize,

    /// Actors started since the pool was created
    pub spawned: usize,
}

impl PoolStatus {
    /// All actors have been started
    pub fn is_ramped(&self) -> bool {
        self.spawned >= self.target
    }
}
