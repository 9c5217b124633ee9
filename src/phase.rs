//! Phase controller
//!
//! Orchestrates one phase end to end: owns an actor pool, watches the stop
//! condition, reports progress and persists the queue once everything has
//! stopped.
//!
//! ## State Machine
//!
//! ```text
//! Idle ──run()──▶ Ramping ──all actors spawned──▶ Running
//!                    │                               │
//!                    └──────── stop condition ───────┤
//!                                                    ▼
//!                          Stopped ◀── persisted ── Draining
//! ```
//!
//! The controller only polls wall-clock time, the queue and the shared
//! counters. Actors never report errors to it; a stalled endpoint shows up as
//! stalled progress.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    actors::{
        actor::ActorTask,
        fetcher::FetchTask,
        forwarder::ForwardTask,
        messages::PoolStatus,
        pool::{PoolConfig, PoolHandle},
        pusher::PushTask,
    },
    error::{LoadError, LoadResult},
    queue::SharedQueue,
    record::DeliveryTag,
    snapshot::{Snapshot, SnapshotContext, SnapshotKind, SnapshotStore},
    stats::{PhaseStats, StatsSnapshot},
    transport::{MetricsSink, MetricsSource},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Fetch,
    Push,
    Direct,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseKind::Fetch => write!(f, "fetch"),
            PhaseKind::Push => write!(f, "push"),
            PhaseKind::Direct => write!(f, "direct"),
        }
    }
}

impl PhaseKind {
    fn snapshot_kind(self) -> Option<SnapshotKind> {
        match self {
            PhaseKind::Fetch => Some(SnapshotKind::Fetch),
            PhaseKind::Push => Some(SnapshotKind::Push),
            PhaseKind::Direct => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    Idle,
    Ramping,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseState::Idle => "idle",
            PhaseState::Ramping => "ramping",
            PhaseState::Running => "running",
            PhaseState::Draining => "draining",
            PhaseState::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

/// When a phase stops on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// Queue length reached the target count
    TargetCount(usize),
    /// Queue empty and no record out for delivery (bounded push run)
    QueueDrained,
    /// Only external cancellation (or the maximum duration) stops the phase
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    QueueDrained,
    TimedOut,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::TargetReached => write!(f, "target reached"),
            StopReason::QueueDrained => write!(f, "queue drained"),
            StopReason::TimedOut => write!(f, "maximum duration exceeded"),
            StopReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Progress reporting cadence and the advisory low-progress warning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportSettings {
    pub interval: Duration,
    /// Warn once this much time has passed...
    pub warn_after: Duration,
    /// ...and progress towards the target is still below this fraction
    pub warn_below_ratio: f64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            warn_after: Duration::from_secs(600),
            warn_below_ratio: 0.05,
        }
    }
}

impl ReportSettings {
    /// Advisory only: nothing is aborted when this returns true
    pub fn is_stalled(&self, elapsed: Duration, progress: f64) -> bool {
        elapsed > self.warn_after && progress < self.warn_below_ratio
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSettings {
    pub pool: PoolConfig,
    pub stop: StopCondition,
    pub max_duration: Option<Duration>,
    pub report: ReportSettings,
    /// How often the stop condition is checked
    pub poll_interval: Duration,
    /// Source probes before ramping; 0 disables the preflight
    pub preflight_attempts: u32,
    pub preflight_delay: Duration,
}

impl PhaseSettings {
    pub fn new(pool: PoolConfig, stop: StopCondition) -> Self {
        Self {
            pool,
            stop,
            max_duration: None,
            report: ReportSettings::default(),
            poll_interval: Duration::from_millis(250),
            preflight_attempts: 0,
            preflight_delay: Duration::from_secs(1),
        }
    }

    pub fn validate(&self) -> LoadResult<()> {
        if self.pool.users == 0 {
            return Err(LoadError::InvalidConfig("users must be at least 1".into()));
        }
        if self.pool.spawn_interval().is_none() {
            return Err(LoadError::InvalidConfig(format!(
                "spawn rate must be a positive number, got {}",
                self.pool.spawn_rate
            )));
        }
        if self.report.interval.is_zero() || self.poll_interval.is_zero() {
            return Err(LoadError::InvalidConfig(
                "report and poll intervals must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one phase
#[derive(Debug, Clone)]
pub struct PhaseReport {
    pub kind: PhaseKind,
    pub reason: StopReason,
    pub elapsed: Duration,
    /// Queue length after every actor stopped
    pub queue_len: usize,
    pub stats: StatsSnapshot,
    /// Final pool population, `None` if the pool stopped responding
    pub pool: Option<PoolStatus>,
    /// Where the queue was persisted
    pub snapshot: Option<PathBuf>,
}

pub struct PhaseController {
    kind: PhaseKind,
    settings: PhaseSettings,
    queue: SharedQueue,
    task: Arc<dyn ActorTask>,
    stats: Arc<PhaseStats>,
    preflight: Option<Arc<dyn MetricsSource>>,
    store: Option<Arc<dyn SnapshotStore>>,
    context: SnapshotContext,
    state_tx: watch::Sender<PhaseState>,
}

impl PhaseController {
    fn new(
        kind: PhaseKind,
        settings: PhaseSettings,
        queue: SharedQueue,
        task: Arc<dyn ActorTask>,
        stats: Arc<PhaseStats>,
        context: SnapshotContext,
    ) -> Self {
        let (state_tx, _) = watch::channel(PhaseState::Idle);
        Self {
            kind,
            settings,
            queue,
            task,
            stats,
            preflight: None,
            store: None,
            context,
            state_tx,
        }
    }

    /// Fetch phase: source → queue until the target count is reached
    pub fn fetch(
        settings: PhaseSettings,
        source: Arc<dyn MetricsSource>,
        queue: SharedQueue,
    ) -> Self {
        let target = match settings.stop {
            StopCondition::TargetCount(target) => target,
            _ => usize::MAX,
        };
        let stats = Arc::new(PhaseStats::new());
        let task = Arc::new(FetchTask::new(
            source.clone(),
            queue.clone(),
            target,
            stats.clone(),
        ));
        let context = SnapshotContext {
            target_records: (target != usize::MAX).then_some(target),
            users: Some(settings.pool.users),
            source_endpoint: Some(source.describe()),
            destination_endpoint: None,
        };

        let mut controller = Self::new(PhaseKind::Fetch, settings, queue, task, stats, context);
        controller.preflight = Some(source);
        controller
    }

    /// Push phase: queue → destination, failures requeued at the head
    pub fn push(
        settings: PhaseSettings,
        sink: Arc<dyn MetricsSink>,
        tag: DeliveryTag,
        queue: SharedQueue,
    ) -> Self {
        let stats = Arc::new(PhaseStats::new());
        let context = SnapshotContext {
            target_records: None,
            users: Some(settings.pool.users),
            source_endpoint: None,
            destination_endpoint: Some(sink.describe()),
        };
        let task = Arc::new(PushTask::new(sink, queue.clone(), tag, stats.clone()));

        Self::new(PhaseKind::Push, settings, queue, task, stats, context)
    }

    /// Direct mode: every fetched record is delivered at once, no queue
    pub fn direct(
        settings: PhaseSettings,
        source: Arc<dyn MetricsSource>,
        sink: Arc<dyn MetricsSink>,
        tag: DeliveryTag,
    ) -> Self {
        let stats = Arc::new(PhaseStats::new());
        let context = SnapshotContext {
            target_records: None,
            users: Some(settings.pool.users),
            source_endpoint: Some(source.describe()),
            destination_endpoint: Some(sink.describe()),
        };
        let task = Arc::new(ForwardTask::new(source.clone(), sink, tag, stats.clone()));

        let mut controller = Self::new(
            PhaseKind::Direct,
            settings,
            SharedQueue::new(),
            task,
            stats,
            context,
        );
        controller.preflight = Some(source);
        controller
    }

    /// Persist the queue through `store` when the phase stops
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn kind(&self) -> PhaseKind {
        self.kind
    }

    pub fn state(&self) -> PhaseState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<PhaseState> {
        self.state_tx.subscribe()
    }

    pub fn stats(&self) -> Arc<PhaseStats> {
        self.stats.clone()
    }

    /// Run the phase on its own task
    pub fn start(self) -> PhaseHandle {
        let cancel = CancellationToken::new();
        let state = self.subscribe();
        let join = tokio::spawn(self.run(cancel.clone()));

        PhaseHandle {
            state,
            cancel,
            join,
        }
    }

    /// Run the phase to completion
    ///
    /// Returns an error only when the phase could not start; everything that
    /// goes wrong afterwards is logged and reflected in the report.
    #[instrument(skip_all, fields(phase = %self.kind))]
    pub async fn run(self, cancel: CancellationToken) -> LoadResult<PhaseReport> {
        self.settings.validate()?;

        let started = Instant::now();
        info!(
            "{} phase starting: {} users, +{}/s, wait {:?}-{:?}",
            self.kind,
            self.settings.pool.users,
            self.settings.pool.spawn_rate,
            self.settings.pool.wait.min(),
            self.settings.pool.wait.max(),
        );

        if let Err(e) = self.preflight(&cancel).await {
            self.set_state(PhaseState::Stopped);
            return Err(e);
        }

        self.set_state(PhaseState::Ramping);
        let pool = PoolHandle::spawn(self.settings.pool, self.task.clone());

        let mut poll = interval(self.settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report = interval(self.settings.report.interval);
        report.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break StopReason::Cancelled,

                _ = report.tick() => self.report_progress(started.elapsed()),

                _ = poll.tick() => {
                    if self.state() == PhaseState::Ramping {
                        self.check_ramped(&pool).await;
                    }
                    if let Some(reason) = self.stop_reason(started.elapsed()) {
                        break reason;
                    }
                }
            }
        };

        info!("{} phase stopping: {reason}", self.kind);
        self.set_state(PhaseState::Draining);

        let pool_status = match pool.stop().await {
            Ok(status) => Some(status),
            Err(e) => {
                error!("failed to stop actor pool: {e:#}");
                None
            }
        };

        let snapshot = self.persist().await;
        self.set_state(PhaseState::Stopped);

        let report = PhaseReport {
            kind: self.kind,
            reason,
            elapsed: started.elapsed(),
            queue_len: self.queue.len(),
            stats: self.stats.snapshot(),
            pool: pool_status,
            snapshot,
        };

        info!(
            "{} phase completed in {}s ({reason}): queue {}, {:?}",
            self.kind,
            report.elapsed.as_secs(),
            report.queue_len,
            report.stats
        );

        Ok(report)
    }

    fn set_state(&self, state: PhaseState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("{previous} -> {state}");
        }
    }

    async fn preflight(&self, cancel: &CancellationToken) -> LoadResult<()> {
        let Some(source) = &self.preflight else {
            return Ok(());
        };
        let attempts = self.settings.preflight_attempts;
        if attempts == 0 {
            return Ok(());
        }

        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match source.fetch().await {
                Ok(_) => {
                    debug!("preflight against {} succeeded", source.describe());
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "preflight {attempt}/{attempts} against {} failed: {e}",
                        source.describe()
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                tokio::select! {
                    // the main loop picks the cancellation up right away
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(self.settings.preflight_delay) => {}
                }
            }
        }

        Err(LoadError::Startup {
            phase: self.kind,
            reason: format!("{} unreachable ({last_error})", source.describe()),
        })
    }

    async fn check_ramped(&self, pool: &PoolHandle) {
        match pool.status().await {
            Ok(status) if status.is_ramped() => {
                info!("all {} {}s spawned", status.spawned, status.kind);
                self.set_state(PhaseState::Running);
            }
            Ok(_) => {}
            Err(e) => warn!("failed to query pool status: {e:#}"),
        }
    }

    fn stop_reason(&self, elapsed: Duration) -> Option<StopReason> {
        match self.settings.stop {
            StopCondition::TargetCount(target) if self.queue.len() >= target => {
                return Some(StopReason::TargetReached);
            }
            StopCondition::QueueDrained if self.queue.is_drained() => {
                return Some(StopReason::QueueDrained);
            }
            _ => {}
        }

        if let Some(max) = self.settings.max_duration
            && elapsed >= max
        {
            return Some(StopReason::TimedOut);
        }

        None
    }

    fn report_progress(&self, elapsed: Duration) {
        let secs = elapsed.as_secs();
        let queued = self.queue.len();
        let stats = self.stats.snapshot();

        match (self.kind, self.settings.stop) {
            (_, StopCondition::TargetCount(target)) => {
                let progress = if target == 0 {
                    1.0
                } else {
                    queued as f64 / target as f64
                };
                info!(
                    "{secs}s - progress: {queued}/{target} ({:.1}%) - remaining: {}",
                    progress * 100.0,
                    target.saturating_sub(queued)
                );

                if self.settings.report.is_stalled(elapsed, progress) {
                    warn!(
                        "little progress after {secs}s, check connectivity of {}",
                        self.context.source_endpoint.as_deref().unwrap_or("the source")
                    );
                }
            }
            (PhaseKind::Direct, _) => {
                info!(
                    "{secs}s - forwarded: {}, failed: {}, fetch errors: {}",
                    stats.forwarded, stats.forward_failed, stats.fetch_failed
                );
            }
            _ if queued > 0 => {
                info!(
                    "{secs}s - queue: {queued} remaining - delivered: {}, requeued: {}",
                    stats.delivered, stats.requeued
                );
            }
            _ => {
                info!(
                    "{secs}s - queue empty, waiting for more data (delivered: {})",
                    stats.delivered
                );
            }
        }
    }

    async fn persist(&self) -> Option<PathBuf> {
        let store = self.store.as_ref()?;
        let kind = self.kind.snapshot_kind()?;

        let records = self.queue.snapshot();
        if records.is_empty() {
            info!("queue empty, nothing to persist");
            return None;
        }

        let snapshot = Snapshot::new(kind, records, self.context.clone());
        match store.persist(&snapshot).await {
            Ok(path) => Some(path),
            Err(e) => {
                error!("failed to persist {} records: {e}", snapshot.metadata.total_records);
                None
            }
        }
    }
}

/// A phase running on its own task
pub struct PhaseHandle {
    state: watch::Receiver<PhaseState>,
    cancel: CancellationToken,
    join: JoinHandle<LoadResult<PhaseReport>>,
}

impl PhaseHandle {
    pub fn state(&self) -> PhaseState {
        *self.state.borrow()
    }

    /// Receiver for state transitions
    pub fn watch(&self) -> watch::Receiver<PhaseState> {
        self.state.clone()
    }

    /// Request the phase to stop; it still drains and persists
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for the phase to finish
    pub async fn wait(self) -> LoadResult<PhaseReport> {
        self.join.await?
    }
}
