//! ---
//! iotsim_section: "02-messaging-data-model"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Shared schema definitions and validation logic."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
//! Data model exchanged between the invocation boundary, the engine, and the
//! generators.
//!
//! Everything here serializes with camelCase keys so records written by the
//! external orchestrator round-trip unchanged. Checkpoints are plain values:
//! they are produced by one invocation and consumed by a later one.

pub mod checkpoint;
pub mod device;
pub mod invocation;
pub mod simulation;

/// Shared result type for schema validation routines.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Structural problems detected in invocation input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Raised when the simulation interval is zero.
    #[error("simulation {sim_id}: interval must be greater than zero")]
    InvalidInterval { sim_id: String },
    /// Raised when the simulation duration is zero.
    #[error("simulation {sim_id}: duration must be greater than zero")]
    InvalidDuration { sim_id: String },
    /// Raised when the simulation id is blank.
    #[error("simulation id must not be empty")]
    EmptySimulationId,
    /// Raised when a device type id is blank.
    #[error("device type id must not be empty")]
    EmptyTypeId,
    /// Raised when a device type requests an unsupported number of instances.
    #[error("device type {type_id}: amount {amount} outside {min}..={max}")]
    InvalidAmount {
        type_id: String,
        amount: u32,
        min: u32,
        max: u32,
    },
    /// Raised when resume states do not line up with the requested amount.
    #[error("device type {type_id}: {found} resume states supplied for {expected} instances")]
    StatesLength {
        type_id: String,
        expected: usize,
        found: usize,
    },
}

pub use checkpoint::{
    DeviceCheckpoint, DeviceTypeCheckpoint, DeviceTypeOutcome, GeneratorState, InstanceOutcome,
    JsonObject, Outcome, COMPLETE_MARKER,
};
pub use device::{DeviceTypeRequest, DeviceTypeSpec, MAX_DEVICE_AMOUNT, MIN_DEVICE_AMOUNT};
pub use invocation::{InvocationOptions, InvocationRequest, InvocationResult};
pub use simulation::{DeviceStage, GeneratorKind, Simulation, SimulationDevice, Stage};
