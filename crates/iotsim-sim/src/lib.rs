//! ---
//! iotsim_section: "11-simulation"
//! iotsim_subsection: "01-bootstrap"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Telemetry generator module exports and shared types."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
//! Telemetry generators for simulated devices.
//!
//! Two generators are available: [`RandomGenerator`] samples declarative
//! attribute descriptors, while [`VehicleGenerator`] reports the state of a
//! continuously integrated vehicle model. Both are built through
//! [`build_generator`] and expose their resumable state as a
//! [`GeneratorState`](iotsim_schema::GeneratorState).

pub mod attributes;
pub mod generator;
pub mod random;
pub mod vehicle;

pub use attributes::{round_to_precision, AttributeDescriptor, AttributeKind, CharSet, DescriptorError};
pub use generator::{build_generator, GeneratorOptions, TelemetryGenerator};
pub use random::RandomGenerator;
pub use vehicle::dynamics::DynamicsModel;
pub use vehicle::state::{GearLever, IgnitionStatus, TransmissionGear, VehicleState};
pub use vehicle::VehicleGenerator;
