//! ---
//! iotsim_section: "11-simulation"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Generator contract and factory."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, Utc};
use iotsim_msg::TelemetryMessage;
use iotsim_schema::{DeviceTypeSpec, GeneratorKind, GeneratorState};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::random::RandomGenerator;
use crate::vehicle::VehicleGenerator;

/// Produces telemetry for a single device on demand.
pub trait TelemetryGenerator: Send + Sync {
    /// Begin any background work. Called once before the first tick.
    fn start(&mut self) {}

    /// Append this tick's messages for `device_id` to the internal buffer.
    fn generate(&mut self, spec: &DeviceTypeSpec, device_id: &str, now: DateTime<Utc>);

    fn messages(&self) -> &[TelemetryMessage];

    fn clear_messages(&mut self);

    /// Halt background work and freeze state. Idempotent.
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Resumable state, safe to call after `stop`.
    fn state(&self) -> GeneratorState;
}

/// Construction parameters shared by all generators.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub seed: Option<u64>,
    pub physics_step: Duration,
    pub trip_distance_km: Option<f64>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            seed: None,
            physics_step: Duration::from_millis(100),
            trip_distance_km: None,
        }
    }
}

impl GeneratorOptions {
    pub(crate) fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Build the generator variant for `kind`, resuming from `prior`.
pub fn build_generator(
    kind: GeneratorKind,
    prior: GeneratorState,
    options: &GeneratorOptions,
) -> Box<dyn TelemetryGenerator> {
    match kind {
        GeneratorKind::Random => Box::new(RandomGenerator::new(prior, options)),
        GeneratorKind::Vehicle => Box::new(VehicleGenerator::new(prior, options)),
    }
}
