//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Primary orchestration and lifecycle management."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
//! Simulation execution engine: device runners, the per-device-type engine
//! with its stage poll, and the invocation entrypoint.

pub mod device;
pub mod engine;
pub mod error;
pub mod invocation;
pub mod store;

pub use device::{device_id, DeviceInstance, DeviceRunner, RunnerHandle, RunnerServices, RunnerSettings};
pub use engine::{EngineSettings, SimulationEngine};
pub use error::{EngineError, EngineResult};
pub use invocation::{run_invocation, InvocationEnv};
pub use store::{HttpStageStore, InMemoryStageStore, JsonFileStageStore, StageStore, StoreError};
