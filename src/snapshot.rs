//! Queue snapshots
//!
//! When a phase stops, the queue contents are written out as a JSON document
//! with a `metadata` object and a `metrics` array. Snapshots can be loaded
//! back into a queue by appending the array in file order.
//!
//! ## Backends
//!
//! - **File** (default): one pretty-printed JSON file per snapshot
//! - **Memory**: keeps snapshots in a vector, for tests

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{error::SnapshotError, record::Record, validator};

/// What produced a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// End of a fetch phase
    Fetch,
    /// Records left over after a push phase
    Push,
    /// Output of the dummy generator
    Dummy,
    /// Queue saved on an interrupted or failed run
    Interrupted,
}

impl SnapshotKind {
    pub fn file_prefix(self) -> &'static str {
        match self {
            SnapshotKind::Fetch => "metrics_data",
            SnapshotKind::Push | SnapshotKind::Interrupted => "remaining_data",
            SnapshotKind::Dummy => "dummy_metrics_data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub total_records: usize,
    pub generated_at: DateTime<Local>,
    pub phase: SnapshotKind,
    #[serde(default)]
    pub target_records: Option<usize>,
    #[serde(default)]
    pub users: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_endpoint: Option<String>,
}

/// Run parameters recorded next to the data
#[derive(Debug, Clone, Default)]
pub struct SnapshotContext {
    pub target_records: Option<usize>,
    pub users: Option<usize>,
    pub source_endpoint: Option<String>,
    pub destination_endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub metrics: Vec<Record>,
}

impl Snapshot {
    pub fn new(kind: SnapshotKind, metrics: Vec<Record>, context: SnapshotContext) -> Self {
        Self {
            metadata: SnapshotMetadata {
                total_records: metrics.len(),
                generated_at: Local::now(),
                phase: kind,
                target_records: context.target_records,
                users: context.users,
                source_endpoint: context.source_endpoint,
                destination_endpoint: context.destination_endpoint,
            },
            metrics,
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.json",
            self.metadata.phase.file_prefix(),
            self.metadata.generated_at.format("%Y%m%d_%H%M%S_%3f")
        )
    }
}

/// Records read back from a snapshot file
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    /// Accepted records, in file order
    pub records: Vec<Record>,
    /// Entries dropped by the validator
    pub rejected: usize,
}

/// Read a snapshot file
///
/// Accepts the full document (`{"metadata": .., "metrics": [..]}`) as well as
/// a bare array of records. Every entry goes through the validator; entries
/// that fail are skipped and counted.
pub async fn load(path: &Path) -> Result<LoadedSnapshot, SnapshotError> {
    let content = tokio::fs::read_to_string(path).await?;
    let document: Value = serde_json::from_str(&content)?;

    let entries = match document {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("metrics") {
            Some(Value::Array(entries)) => entries,
            _ => {
                return Err(SnapshotError::InvalidFormat(
                    "expected a `metrics` array".to_string(),
                ));
            }
        },
        _ => {
            return Err(SnapshotError::InvalidFormat(
                "expected an object or an array".to_string(),
            ));
        }
    };

    let mut records = Vec::with_capacity(entries.len());
    let mut rejected = 0;
    for entry in entries {
        match validator::validate(entry) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("skipping snapshot entry: {e}");
                rejected += 1;
            }
        }
    }

    debug!(
        "loaded {} records from {} ({rejected} rejected)",
        records.len(),
        path.display()
    );

    Ok(LoadedSnapshot { records, rejected })
}

/// Persistence hook for queue contents
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot, returning where it was written
    async fn persist(&self, snapshot: &Snapshot) -> Result<PathBuf, SnapshotError>;
}

/// Writes each snapshot as a JSON file into a directory
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn persist(&self, snapshot: &Snapshot) -> Result<PathBuf, SnapshotError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(snapshot.file_name());
        let content = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&path, content).await?;

        info!(
            "saved {} records to {}",
            snapshot.metadata.total_records,
            path.display()
        );
        Ok(path)
    }
}

/// Keeps snapshots in memory (no persistence)
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    saved: Mutex<Vec<Snapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot persisted so far
    pub fn saved(&self) -> Vec<Snapshot> {
        self.saved
            .lock()
            .map(|saved| saved.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn persist(&self, snapshot: &Snapshot) -> Result<PathBuf, SnapshotError> {
        let name = snapshot.file_name();
        self.saved
            .lock()
            .map_err(|_| SnapshotError::InvalidFormat("memory store poisoned".to_string()))?
            .push(snapshot.clone());
        Ok(PathBuf::from(name))
    }
}
