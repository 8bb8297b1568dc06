//! ---
//! iotsim_section: "02-messaging-data-model"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Shared schema definitions and validation logic."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};

use crate::{SchemaError, SchemaResult};

/// Substring that marked the vehicle demo before simulations carried an explicit
/// generator discriminator.
pub const LEGACY_VEHICLE_MARKER: &str = "idsAutoDemo";

/// Lifecycle flag of a simulation; `stage` is the only field mutated externally
/// while an invocation runs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Running,
    Sleeping,
    Stopping,
    Complete,
}

/// Lifecycle of a single device runner.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceStage {
    #[default]
    Idle,
    Running,
    Sleeping,
}

/// Telemetry generator variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GeneratorKind {
    Random,
    Vehicle,
}

/// Device type entry as listed on the simulation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationDevice {
    pub type_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub amount: u32,
}

/// A named run describing stage, timing, and device types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    pub sim_id: String,
    #[serde(default)]
    pub name: String,
    pub stage: Stage,
    /// Seconds between ticks.
    pub interval: u64,
    /// Seconds a device keeps ticking, measured from its first start.
    pub duration: u64,
    #[serde(default)]
    pub devices: Vec<SimulationDevice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<GeneratorKind>,
    /// Fields owned by the record store; echoed back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Simulation {
    pub fn new(sim_id: impl Into<String>, stage: Stage, interval: u64, duration: u64) -> Self {
        Self {
            sim_id: sim_id.into(),
            name: String::new(),
            stage,
            interval,
            duration,
            devices: Vec::new(),
            generator: None,
            extra: Map::new(),
        }
    }

    pub fn with_generator(mut self, kind: GeneratorKind) -> Self {
        self.generator = Some(kind);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration)
    }

    /// Generator variant for this simulation. The explicit discriminator wins;
    /// records without one fall back to the legacy simId convention.
    pub fn generator_kind(&self) -> GeneratorKind {
        match self.generator {
            Some(kind) => kind,
            None if self.sim_id.contains(LEGACY_VEHICLE_MARKER) => GeneratorKind::Vehicle,
            None => GeneratorKind::Random,
        }
    }

    pub fn validate(&self) -> SchemaResult<()> {
        if self.sim_id.trim().is_empty() {
            return Err(SchemaError::EmptySimulationId);
        }
        if self.interval == 0 {
            return Err(SchemaError::InvalidInterval {
                sim_id: self.sim_id.clone(),
            });
        }
        if self.duration == 0 {
            return Err(SchemaError::InvalidDuration {
                sim_id: self.sim_id.clone(),
            });
        }
        Ok(())
    }
}
