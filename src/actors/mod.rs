//! Actor-based load generation
//!
//! Each simulated client is an independent Tokio task. A pool of them shares
//! one task object and, through it, the record queue.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │ PhaseController  │
//!                  └────────┬─────────┘
//!                           │ Status / Stop
//!                  ┌────────▼─────────┐
//!                  │    ActorPool     │  spawns 1 actor every 1/R s
//!                  └────────┬─────────┘
//!             ┌─────────────┼─────────────┐
//!        ┌────▼────┐   ┌────▼────┐   ┌────▼────┐
//!        │ Actor-0 │   │ Actor-1 │   │ Actor-N │   sleep(rng) → task
//!        └────┬────┘   └────┬────┘   └────┬────┘
//!             └─────────────┼─────────────┘
//!                  ┌────────▼─────────┐
//!                  │   SharedQueue    │
//!                  └──────────────────┘
//! ```
//!
//! ## Task Types
//!
//! - **FetchTask**: source endpoint → validator → queue tail
//! - **PushTask**: queue head → destination, failures back to the head
//! - **ForwardTask**: source endpoint → destination, no queue (direct mode)

pub mod actor;
pub mod fetcher;
pub mod forwarder;
pub mod messages;
pub mod pool;
pub mod pusher;
