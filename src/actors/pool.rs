//! ActorPool - ramped population of actors of one kind
//!
//! The pool starts empty and spawns one actor every `1 / spawn_rate` seconds
//! (the first immediately) until `users` actors are running, then holds them.
//! It runs as its own task and is controlled through a [`PoolHandle`].
//!
//! ## Message Flow
//!
//! ```text
//! spawn tick ──▶ Actor-1 ... Actor-N   (each: sleep → task → sleep → ...)
//!     ↑
//!     └─── Commands (Status, Stop)
//! ```
//!
//! `Stop` cancels the shared token and waits for every actor to finish its
//! current cycle before answering.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::actor::{Actor, ActorTask, WaitRange};
use super::messages::{ActorKind, PoolCommand, PoolStatus};

/// Shape of an actor population
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolConfig {
    /// Target number of concurrent actors
    pub users: usize,

    /// Actors started per second while ramping
    pub spawn_rate: f64,

    /// Range the per-cycle wait is drawn from
    pub wait: WaitRange,
}

impl PoolConfig {
    /// Time between two spawns, `None` if the rate gives no usable interval
    pub fn spawn_interval(&self) -> Option<Duration> {
        if !(self.spawn_rate.is_finite() && self.spawn_rate > 0.0) {
            return None;
        }
        Duration::try_from_secs_f64(1.0 / self.spawn_rate).ok()
    }
}

struct ActorPool {
    config: PoolConfig,
    kind: ActorKind,
    task: Arc<dyn ActorTask>,
    command_rx: mpsc::Receiver<PoolCommand>,
    actors: JoinSet<usize>,
    cancel: CancellationToken,
    spawned: usize,
}

impl ActorPool {
    #[instrument(skip(self), fields(kind = %self.kind, users = self.config.users))]
    async fn run(mut self) {
        debug!("starting actor pool");

        let Some(period) = self.config.spawn_interval() else {
            error!("spawn rate {} gives no usable interval", self.config.spawn_rate);
            return;
        };
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick(), if self.spawned < self.config.users => {
                    self.spawn_actor();
                }

                Some(joined) = self.actors.join_next(), if !self.actors.is_empty() => {
                    Self::reap(joined);
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(PoolCommand::Status { respond_to }) => {
                            let _ = respond_to.send(self.status());
                        }

                        Some(PoolCommand::Stop { respond_to }) => {
                            self.stop().await;
                            let _ = respond_to.send(self.status());
                            break;
                        }

                        None => {
                            warn!("command channel closed, stopping pool");
                            self.stop().await;
                            break;
                        }
                    }
                }
            }
        }

        debug!("actor pool stopped");
    }

    fn spawn_actor(&mut self) {
        let actor = Actor::new(
            self.spawned,
            self.task.clone(),
            self.config.wait,
            self.cancel.child_token(),
        );
        self.actors.spawn(actor.run());
        self.spawned += 1;

        if self.spawned == self.config.users {
            info!("all {} {}s running", self.spawned, self.kind);
        } else {
            debug!("{}/{} {}s running", self.spawned, self.config.users, self.kind);
        }
    }

    fn reap(joined: Result<usize, JoinError>) {
        match joined {
            Ok(cycles) => debug!("actor exited after {cycles} cycles"),
            Err(e) => error!("actor task failed: {e}"),
        }
    }

    async fn stop(&mut self) {
        debug!("cancelling {} actors", self.actors.len());
        self.cancel.cancel();

        while let Some(joined) = self.actors.join_next().await {
            Self::reap(joined);
        }
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            kind: self.kind,
            target: self.config.users,
            active: self.actors.len(),
            spawned: self.spawned,
        }
    }
}

/// Handle for controlling an actor pool
///
/// Cloneable; dropping every handle stops the pool.
#[derive(Clone)]
pub struct PoolHandle {
    sender: mpsc::Sender<PoolCommand>,
    pub kind: ActorKind,
}

impl PoolHandle {
    /// Spawn a pool whose actors all run `task`
    ///
    /// A pool whose `spawn_rate` has no [`PoolConfig::spawn_interval`] exits
    /// right away; the phase settings are validated before they get here.
    pub fn spawn(config: PoolConfig, task: Arc<dyn ActorTask>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let kind = task.kind();

        let pool = ActorPool {
            config,
            kind,
            task,
            command_rx: cmd_rx,
            actors: JoinSet::new(),
            cancel: CancellationToken::new(),
            spawned: 0,
        };

        tokio::spawn(pool.run());

        Self {
            sender: cmd_tx,
            kind,
        }
    }

    pub async fn status(&self) -> Result<PoolStatus> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PoolCommand::Status { respond_to: tx })
            .await
            .context("failed to send Status command")?;

        rx.await.context("failed to receive pool status")
    }

    /// Stop every actor, returning the final population once all have exited
    pub async fn stop(&self) -> Result<PoolStatus> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PoolCommand::Stop { respond_to: tx })
            .await
            .context("failed to send Stop command")?;

        rx.await.context("failed to receive stop confirmation")
    }
}
