//! Run modes
//!
//! A [`Pipeline`] owns the shared queue and the endpoints and wires them into
//! phase controllers. The queue lives as long as the pipeline, so records
//! left over by one run (or loaded from a snapshot) are available to the next.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    config::LoadConfig,
    error::{LoadError, LoadResult},
    generator,
    phase::{PhaseController, PhaseKind, PhaseReport},
    queue::SharedQueue,
    snapshot::{
        self, FileSnapshotStore, LoadedSnapshot, Snapshot, SnapshotContext, SnapshotKind,
        SnapshotStore,
    },
    transport::{HttpSink, HttpSource, MetricsSink, MetricsSource},
};

/// Reports of a fetch-then-push run
#[derive(Debug, Clone)]
pub struct FullRunReport {
    pub fetch: PhaseReport,
    /// `None` when the run was cancelled before the push phase started
    pub push: Option<PhaseReport>,
}

pub struct Pipeline {
    config: LoadConfig,
    source: Arc<dyn MetricsSource>,
    direct_source: Arc<dyn MetricsSource>,
    sink: Arc<dyn MetricsSink>,
    store: Arc<dyn SnapshotStore>,
    queue: SharedQueue,
}

impl Pipeline {
    /// HTTP endpoints and a file snapshot store, as configured
    pub fn from_config(config: LoadConfig) -> LoadResult<Self> {
        config
            .validate()
            .map_err(|e| LoadError::InvalidConfig(format!("{e:#}")))?;

        let source = Arc::new(HttpSource::new(&config.source_url, config.fetch.timeout())?);
        let direct_source = Arc::new(HttpSource::new(
            &config.source_url,
            config.direct.timeout(),
        )?);
        let sink = Arc::new(HttpSink::new(&config.destination_url, config.push.timeout())?);
        let store = Arc::new(FileSnapshotStore::new(config.snapshot_dir.clone()));

        Ok(Self {
            config,
            source,
            direct_source,
            sink,
            store,
            queue: SharedQueue::new(),
        })
    }

    /// Pipeline over arbitrary endpoints and store
    pub fn with_parts(
        config: LoadConfig,
        source: Arc<dyn MetricsSource>,
        sink: Arc<dyn MetricsSink>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            config,
            direct_source: source.clone(),
            source,
            sink,
            store,
            queue: SharedQueue::new(),
        }
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    pub fn queue(&self) -> &SharedQueue {
        &self.queue
    }

    /// Fetch phase, then push phase
    ///
    /// The push phase is refused with a startup error when the fetch phase
    /// collected fewer than `min_records_for_push` records.
    #[instrument(skip_all)]
    pub async fn run_full(&self, cancel: &CancellationToken) -> LoadResult<FullRunReport> {
        let fetch = self.run_fetch(cancel).await?;
        if cancel.is_cancelled() {
            return Ok(FullRunReport { fetch, push: None });
        }

        let collected = self.queue.len();
        let required = self.config.min_records_for_push;
        if collected < required {
            return Err(LoadError::Startup {
                phase: PhaseKind::Push,
                reason: format!("only {collected} records fetched, at least {required} needed"),
            });
        }

        let pause = self.config.phase_pause();
        info!("{collected} records ready, starting push phase in {pause:?}");
        tokio::select! {
            _ = cancel.cancelled() => return Ok(FullRunReport { fetch, push: None }),
            _ = tokio::time::sleep(pause) => {}
        }

        let push = self.run_push(false, cancel).await?;
        Ok(FullRunReport {
            fetch,
            push: Some(push),
        })
    }

    /// Collect records until the queue holds `target_records`
    pub async fn run_fetch(&self, cancel: &CancellationToken) -> LoadResult<PhaseReport> {
        PhaseController::fetch(
            self.config.fetch_settings(),
            self.source.clone(),
            self.queue.clone(),
        )
        .with_store(self.store.clone())
        .run(cancel.clone())
        .await
    }

    /// Deliver queued records
    ///
    /// With `until_empty` the phase stops once every record has been
    /// delivered; otherwise it keeps polling the queue until cancelled.
    pub async fn run_push(
        &self,
        until_empty: bool,
        cancel: &CancellationToken,
    ) -> LoadResult<PhaseReport> {
        PhaseController::push(
            self.config.push_settings(until_empty),
            self.sink.clone(),
            self.config.delivery.clone(),
            self.queue.clone(),
        )
        .with_store(self.store.clone())
        .run(cancel.clone())
        .await
    }

    /// Push phase over records already in memory
    pub async fn continue_push(
        &self,
        until_empty: bool,
        cancel: &CancellationToken,
    ) -> LoadResult<PhaseReport> {
        if self.queue.is_empty() {
            return Err(LoadError::EmptyQueue);
        }
        info!("continuing with {} records in memory", self.queue.len());
        self.run_push(until_empty, cancel).await
    }

    /// Append the records of a snapshot file to the queue
    pub async fn load_snapshot(&self, path: &Path) -> LoadResult<LoadedSnapshot> {
        let loaded = snapshot::load(path).await?;
        let len = self.queue.extend(loaded.records.iter().cloned());

        info!(
            "loaded {} records from {} (queue: {len})",
            loaded.records.len(),
            path.display()
        );
        if loaded.rejected > 0 {
            warn!("{} invalid entries skipped", loaded.rejected);
        }
        Ok(loaded)
    }

    /// Generate dummy records and persist them, optionally queueing them too
    pub async fn generate_dummy(&self, count: usize, load: bool) -> LoadResult<PathBuf> {
        let records = generator::generate(count);
        if load {
            self.queue.extend(records.iter().cloned());
        }

        let context = SnapshotContext {
            target_records: Some(count),
            ..SnapshotContext::default()
        };
        let path = self
            .store
            .persist(&Snapshot::new(SnapshotKind::Dummy, records, context))
            .await?;

        info!("generated {count} dummy records");
        Ok(path)
    }

    /// Fetch and deliver immediately, bypassing the queue, until cancelled
    pub async fn run_direct(&self, cancel: &CancellationToken) -> LoadResult<PhaseReport> {
        PhaseController::direct(
            self.config.direct_settings(),
            self.direct_source.clone(),
            self.sink.clone(),
            self.config.delivery.clone(),
        )
        .run(cancel.clone())
        .await
    }

    /// Persist whatever the queue still holds
    pub async fn persist_remaining(&self) -> LoadResult<Option<PathBuf>> {
        let records = self.queue.snapshot();
        if records.is_empty() {
            return Ok(None);
        }

        let context = SnapshotContext {
            destination_endpoint: Some(self.sink.describe()),
            ..SnapshotContext::default()
        };
        let path = self
            .store
            .persist(&Snapshot::new(SnapshotKind::Interrupted, records, context))
            .await?;
        Ok(Some(path))
    }
}
