//! Two-phase synthetic load generator for a load-balanced metrics pipeline
//!
//! Phase one ramps up a population of fetchers that pull metric records from a
//! source endpoint into a shared queue until a target count is reached. Phase
//! two ramps up pushers that drain the queue into the ingestion endpoint,
//! putting failed records back at the head. The queue is persisted as a JSON
//! snapshot whenever a phase stops with records left in it.

pub mod actors;
pub mod config;
pub mod error;
pub mod generator;
pub mod phase;
pub mod pipeline;
pub mod queue;
pub mod record;
pub mod snapshot;
pub mod stats;
pub mod transport;
pub mod util;
pub mod validator;

pub use config::LoadConfig;
pub use error::{LoadError, LoadResult};
pub use phase::{PhaseController, PhaseKind, PhaseReport, PhaseState, StopCondition, StopReason};
pub use pipeline::Pipeline;
pub use queue::SharedQueue;
pub use record::{DeliveryTag, Record, SourceTag};
