//! Load generator configuration
//!
//! Read from a TOML file (`~/.config/metrics-loadgen/config.toml` unless a
//! path is given), then overridden by environment variables, then by CLI
//! flags in the binary. Every field has a default, so an empty file or no
//! file at all is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    actors::{actor::WaitRange, pool::PoolConfig},
    phase::{PhaseSettings, ReportSettings, StopCondition},
    record::DeliveryTag,
    util,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Base URL of the metrics source (`/metrics` is appended)
    #[serde(default = "default_source_url")]
    pub source_url: String,

    /// Base URL of the load-balanced ingestion API (`/metrics` is appended)
    #[serde(default = "default_destination_url")]
    pub destination_url: String,

    /// Directory snapshot files are written to
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,

    #[serde(default = "PopulationConfig::fetch")]
    pub fetch: PopulationConfig,

    #[serde(default = "PopulationConfig::push")]
    pub push: PopulationConfig,

    #[serde(default = "PopulationConfig::direct")]
    pub direct: PopulationConfig,

    /// Records the fetch phase collects before it stops
    #[serde(default = "default_target_records")]
    pub target_records: usize,

    /// Stop a standalone push phase once the queue is drained
    #[serde(default)]
    pub push_until_empty: bool,

    /// Pause between the fetch and the push phase of a full run
    #[serde(default = "default_phase_pause")]
    pub phase_pause_secs: f64,

    /// Fewer fetched records than this refuses the push phase of a full run
    #[serde(default = "default_min_records_for_push")]
    pub min_records_for_push: usize,

    /// Source probes before a fetch or direct phase ramps; 0 disables
    #[serde(default = "default_preflight_attempts")]
    pub preflight_attempts: u32,

    #[serde(default)]
    pub report: ReportConfig,

    /// Metadata attached to every delivered record
    #[serde(default)]
    pub delivery: DeliveryTag,
}

/// Shape of one actor population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationConfig {
    pub users: usize,

    /// Actors started per second
    #[serde(default = "default_spawn_rate")]
    pub spawn_rate: f64,

    /// Per-cycle wait range in seconds
    pub wait_min_secs: f64,
    pub wait_max_secs: f64,

    /// Request timeout in seconds
    pub timeout_secs: f64,

    /// Hard limit on the phase duration
    #[serde(default)]
    pub max_duration_secs: Option<u64>,
}

impl PopulationConfig {
    fn fetch() -> Self {
        Self {
            users: 300,
            spawn_rate: default_spawn_rate(),
            wait_min_secs: 1.0,
            wait_max_secs: 2.0,
            timeout_secs: 10.0,
            max_duration_secs: None,
        }
    }

    fn push() -> Self {
        Self {
            users: 150,
            spawn_rate: default_spawn_rate(),
            wait_min_secs: 1.0,
            wait_max_secs: 4.0,
            timeout_secs: 5.0,
            max_duration_secs: None,
        }
    }

    fn direct() -> Self {
        Self {
            users: 50,
            spawn_rate: default_spawn_rate(),
            wait_min_secs: 1.0,
            wait_max_secs: 2.0,
            timeout_secs: 10.0,
            max_duration_secs: None,
        }
    }

    /// 10s when `timeout_secs` is not a usable duration
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::from_secs(10))
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.users == 0 {
            bail!("{name}.users must be at least 1");
        }
        if self.pool().spawn_interval().is_none() {
            bail!("{name}.spawn_rate must be positive, got {}", self.spawn_rate);
        }
        if WaitRange::from_secs_f64(self.wait_min_secs, self.wait_max_secs).is_none() {
            bail!(
                "{name}: invalid wait range {}s-{}s",
                self.wait_min_secs,
                self.wait_max_secs
            );
        }
        match Duration::try_from_secs_f64(self.timeout_secs) {
            Ok(timeout) if !timeout.is_zero() => {}
            _ => bail!("{name}.timeout_secs must be positive, got {}", self.timeout_secs),
        }
        Ok(())
    }

    fn pool(&self) -> PoolConfig {
        PoolConfig {
            users: self.users,
            spawn_rate: self.spawn_rate,
            wait: WaitRange::from_secs_f64(self.wait_min_secs, self.wait_max_secs)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_warn_after")]
    pub warn_after_secs: u64,

    #[serde(default = "default_warn_below_ratio")]
    pub warn_below_ratio: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_report_interval(),
            warn_after_secs: default_warn_after(),
            warn_below_ratio: default_warn_below_ratio(),
        }
    }
}

fn default_source_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_destination_url() -> String {
    "http://localhost/api".to_string()
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_spawn_rate() -> f64 {
    1.0
}

fn default_target_records() -> usize {
    2000
}

fn default_phase_pause() -> f64 {
    5.0
}

fn default_min_records_for_push() -> usize {
    100
}

fn default_preflight_attempts() -> u32 {
    3
}

fn default_report_interval() -> u64 {
    10
}

fn default_warn_after() -> u64 {
    600 // 10 minutes
}

fn default_warn_below_ratio() -> f64 {
    0.05
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            source_url: default_source_url(),
            destination_url: default_destination_url(),
            snapshot_dir: default_snapshot_dir(),
            fetch: PopulationConfig::fetch(),
            push: PopulationConfig::push(),
            direct: PopulationConfig::direct(),
            target_records: default_target_records(),
            push_until_empty: false,
            phase_pause_secs: default_phase_pause(),
            min_records_for_push: default_min_records_for_push(),
            preflight_attempts: default_preflight_attempts(),
            report: ReportConfig::default(),
            delivery: DeliveryTag::default(),
        }
    }
}

impl LoadConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("metrics-loadgen").join("config.toml"))
    }

    /// Load configuration from file, or use defaults if there is none
    ///
    /// An explicitly given path must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(|| Self::default_path().filter(|p| p.exists()));

        let Some(path) = config_path else {
            debug!("no config file found, using defaults");
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
            .inspect(|config| trace!("loaded config: {config:?}"))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides
    ///
    /// `lookup` resolves a variable name, usually `std::env::var(..).ok()`.
    /// Unparsable numbers are rejected rather than ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(util::SOURCE_URL_VAR) {
            self.source_url = url;
        }
        if let Some(url) = lookup(util::DESTINATION_URL_VAR) {
            self.destination_url = url;
        }
        if let Some(target) = lookup(util::TARGET_RECORDS_VAR) {
            self.target_records = target
                .parse()
                .with_context(|| format!("{} is not a count: {target}", util::TARGET_RECORDS_VAR))?;
        }
        if let Some(dir) = lookup(util::SNAPSHOT_DIR_VAR) {
            self.snapshot_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.fetch.validate("fetch")?;
        self.push.validate("push")?;
        self.direct.validate("direct")?;

        if self.target_records == 0 {
            bail!("target_records must be at least 1");
        }
        if Duration::try_from_secs_f64(self.phase_pause_secs).is_err() {
            bail!(
                "phase_pause_secs must be a non-negative number of seconds, got {}",
                self.phase_pause_secs
            );
        }
        if self.report.interval_secs == 0 {
            bail!("report.interval_secs must be at least 1");
        }
        Ok(())
    }

    pub fn phase_pause(&self) -> Duration {
        Duration::try_from_secs_f64(self.phase_pause_secs).unwrap_or_default()
    }

    fn report_settings(&self) -> ReportSettings {
        ReportSettings {
            interval: Duration::from_secs(self.report.interval_secs),
            warn_after: Duration::from_secs(self.report.warn_after_secs),
            warn_below_ratio: self.report.warn_below_ratio,
        }
    }

    fn settings(&self, population: &PopulationConfig, stop: StopCondition) -> PhaseSettings {
        let mut settings = PhaseSettings::new(population.pool(), stop);
        settings.max_duration = population.max_duration_secs.map(Duration::from_secs);
        settings.report = self.report_settings();
        settings
    }

    pub fn fetch_settings(&self) -> PhaseSettings {
        let mut settings = self.settings(
            &self.fetch,
            StopCondition::TargetCount(self.target_records),
        );
        settings.preflight_attempts = self.preflight_attempts;
        settings
    }

    pub fn push_settings(&self, until_empty: bool) -> PhaseSettings {
        let stop = if until_empty || self.push_until_empty {
            StopCondition::QueueDrained
        } else {
            StopCondition::Manual
        };
        self.settings(&self.push, stop)
    }

    pub fn direct_settings(&self) -> PhaseSettings {
        let mut settings = self.settings(&self.direct, StopCondition::Manual);
        settings.preflight_attempts = self.preflight_attempts;
        settings
    }
}
