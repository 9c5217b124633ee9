//! Simulated client loop
//!
//! An actor repeats one task forever: wait a random duration inside the
//! configured range, then perform the task. Cancellation is checked at the top
//! of every cycle and interrupts the wait, but a task that already started is
//! always allowed to finish (its request completes or times out), so a record
//! is never left popped without being settled.
//!
//! ```text
//! ┌──────────────┐   cancelled?   ┌────────────┐   ┌──────────────┐
//! │ top of cycle │ ─────no──────▶ │ sleep(rng) │ ─▶│ task.perform │ ──┐
//! └──────────────┘                └────────────┘   └──────────────┘   │
//!        ▲                                                            │
//!        └────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use super::messages::{ActorKind, TaskOutcome};

/// One unit of work an actor performs per cycle
///
/// Implementations handle their own errors: whatever goes wrong is logged and
/// folded into the returned [`TaskOutcome`].
#[async_trait]
pub trait ActorTask: Send + Sync + 'static {
    fn kind(&self) -> ActorKind;

    async fn perform(&self) -> TaskOutcome;
}

/// Uniform range the inter-task wait is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitRange {
    min: Duration,
    max: Duration,
}

impl WaitRange {
    /// Returns `None` when `min > max`
    pub fn new(min: Duration, max: Duration) -> Option<Self> {
        (min <= max).then_some(Self { min, max })
    }

    /// Returns `None` for negative, non-finite or unrepresentable bounds
    pub fn from_secs_f64(min: f64, max: f64) -> Option<Self> {
        let min = Duration::try_from_secs_f64(min).ok()?;
        let max = Duration::try_from_secs_f64(max).ok()?;
        Self::new(min, max)
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn sample(&self) -> Duration {
        self.min + (self.max - self.min).mul_f64(fastrand::f64())
    }
}

impl Default for WaitRange {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(2),
        }
    }
}

pub struct Actor {
    id: usize,
    task: Arc<dyn ActorTask>,
    wait: WaitRange,
    cancel: CancellationToken,
}

impl Actor {
    pub fn new(
        id: usize,
        task: Arc<dyn ActorTask>,
        wait: WaitRange,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            task,
            wait,
            cancel,
        }
    }

    /// Run until cancelled, returning the number of completed cycles
    #[instrument(skip(self), fields(actor = self.id, kind = %self.task.kind()))]
    pub async fn run(self) -> usize {
        trace!("actor started");
        let mut cycles = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.wait.sample()) => {}
            }

            let outcome = self.task.perform().await;
            trace!(?outcome, "cycle complete");
            cycles += 1;
        }

        debug!("actor stopped after {cycles} cycles");
        cycles
    }
}
