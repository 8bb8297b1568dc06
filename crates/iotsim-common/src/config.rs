//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Shared primitives and utilities for the simulator runtime."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;
use url::Url;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_stage_poll_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_physics_step() -> Duration {
    Duration::from_millis(100)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_time_budget() -> Duration {
    Duration::from_secs(900)
}

fn default_safety_margin() -> Duration {
    Duration::from_secs(5)
}

fn default_metrics_enabled() -> bool {
    true
}

/// Primary configuration object for the simulator runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub stage_store: StageStoreConfig,
    #[serde(default)]
    pub invocation: InvocationConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no candidate existed and defaults were used.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "IOTSIM_CONFIG";

    /// Load configuration from disk, respecting the `IOTSIM_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the effective source path.
    ///
    /// An explicit `IOTSIM_CONFIG` path must exist. When none of the
    /// candidates exist the defaults are returned.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        debug!("no configuration file found; using defaults");
        let config = AppConfig::default();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("failed to load config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.publisher.validate()?;
        self.stage_store.validate()?;
        self.invocation.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

/// Tuning knobs for the simulation engine.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Period of the external stage poll.
    #[serde(default = "default_stage_poll_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub stage_poll_interval: Duration,
    /// Integration step of the vehicle physics loop.
    #[serde(default = "default_physics_step", rename = "physics_step_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub physics_step: Duration,
    /// Fixed seed for generators; entropy is used when unset.
    #[serde(default)]
    pub random_seed: Option<u64>,
    #[serde(default)]
    pub qos: u8,
    /// Distance after which simulated vehicles end their trip; unbounded when unset.
    #[serde(default)]
    pub vehicle_trip_km: Option<f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stage_poll_interval: default_stage_poll_interval(),
            physics_step: default_physics_step(),
            random_seed: None,
            qos: 0,
            vehicle_trip_km: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stage_poll_interval.is_zero() {
            return Err(anyhow!("engine.stage_poll_interval must be greater than zero"));
        }
        if self.physics_step.is_zero() {
            return Err(anyhow!("engine.physics_step_ms must be greater than zero"));
        }
        if self.qos > 1 {
            return Err(anyhow!("engine.qos must be 0 or 1, got {}", self.qos));
        }
        if let Some(trip) = self.vehicle_trip_km {
            if !(trip.is_finite() && trip > 0.0) {
                return Err(anyhow!("engine.vehicle_trip_km must be positive, got {trip}"));
            }
        }
        Ok(())
    }
}

/// Destination kinds for published telemetry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PublisherKind {
    Memory,
    #[default]
    Stdout,
    File,
    Http,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    #[serde(default)]
    pub kind: PublisherKind,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub endpoint: Option<Url>,
    /// Per-request limit for the http backend.
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            kind: PublisherKind::default(),
            path: None,
            endpoint: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            PublisherKind::File if self.path.is_none() => {
                Err(anyhow!("publisher.path is required for the file publisher"))
            }
            PublisherKind::Http if self.endpoint.is_none() => {
                Err(anyhow!("publisher.endpoint is required for the http publisher"))
            }
            _ if self.request_timeout.is_zero() => {
                Err(anyhow!("publisher.request_timeout must be greater than zero"))
            }
            _ => Ok(()),
        }
    }
}

/// Backends the stage poll can read simulation records from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StageStoreKind {
    #[default]
    Memory,
    File,
    Http,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStoreConfig {
    #[serde(default)]
    pub kind: StageStoreKind,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub endpoint: Option<Url>,
    /// Per-request limit for the http backend.
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
}

impl Default for StageStoreConfig {
    fn default() -> Self {
        Self {
            kind: StageStoreKind::default(),
            path: None,
            endpoint: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl StageStoreConfig {
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            StageStoreKind::File if self.path.is_none() => {
                Err(anyhow!("stage_store.path is required for the file store"))
            }
            StageStoreKind::Http if self.endpoint.is_none() => {
                Err(anyhow!("stage_store.endpoint is required for the http store"))
            }
            _ if self.request_timeout.is_zero() => {
                Err(anyhow!("stage_store.request_timeout must be greater than zero"))
            }
            _ => Ok(()),
        }
    }
}

/// Execution budget granted to a single invocation.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationConfig {
    #[serde(default = "default_time_budget")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub time_budget: Duration,
    /// Subtracted from the budget so the result is written before the hard limit.
    #[serde(default = "default_safety_margin")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub safety_margin: Duration,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            time_budget: default_time_budget(),
            safety_margin: default_safety_margin(),
        }
    }
}

impl InvocationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.time_budget <= self.safety_margin {
            return Err(anyhow!(
                "invocation.time_budget ({}s) must exceed safety_margin ({}s)",
                self.time_budget.as_secs(),
                self.safety_margin.as_secs()
            ));
        }
        Ok(())
    }

    /// Budget left for device work once the safety margin is reserved.
    pub fn effective_budget(&self) -> Duration {
        self.time_budget.saturating_sub(self.safety_margin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Where the text exposition is written after a run; stderr when unset.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            output: None,
        }
    }
}
