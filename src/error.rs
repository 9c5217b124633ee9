//! Error types for the load generator
//!
//! Per-task errors ([`ValidationError`], [`TransportError`]) are handled inside
//! the actors and never reach the phase controller. [`LoadError`] is what a
//! phase or the pipeline returns to the caller.

use thiserror::Error;

use crate::phase::PhaseKind;
use crate::validator::FieldKind;

/// Payload rejected by the record validator
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Payload is not a JSON object
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// One or more required fields are absent
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// Field present but holding a value of the wrong kind
    #[error("field `{field}` is not a valid {expected}")]
    WrongType {
        field: &'static str,
        expected: FieldKind,
    },

    /// Payload passed the schema check but could not be decoded
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failure talking to the source or destination endpoint
///
/// On the fetch side this only skips the current cycle. On the push side it
/// sends the record back to the head of the queue.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Request exceeded its timeout
    #[error("request timed out")]
    Timeout,

    /// Connection or protocol failure
    #[error("request failed: {0}")]
    Request(String),

    /// Endpoint answered with a status that is not accepted
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// Response body was not the expected JSON
    #[error("failed to decode response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Errors while writing or reading queue snapshots
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid snapshot format: {0}")]
    InvalidFormat(String),
}

/// Errors surfaced by a phase or by the pipeline
#[derive(Debug, Error)]
pub enum LoadError {
    /// A required dependency is unusable; halts the affected phase only
    #[error("{phase} phase could not start: {reason}")]
    Startup { phase: PhaseKind, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Nothing in the queue to push
    #[error("queue is empty, nothing to deliver")]
    EmptyQueue,

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The actor pool stopped responding
    #[error("actor pool failure: {0}")]
    Pool(String),

    /// The task running a phase panicked or was aborted
    #[error("phase task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type LoadResult<T> = Result<T, LoadError>;
