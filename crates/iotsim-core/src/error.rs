//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Primary orchestration and lifecycle management."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use iotsim_msg::PublishError;
use iotsim_schema::SchemaError;

use crate::store::StoreError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failures that abort an engine run. None of them are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("telemetry publish failed: {0}")]
    Publish(#[from] PublishError),
    #[error("stage poll failed: {0}")]
    StageStore(#[from] StoreError),
    #[error("simulation {sim_id} no longer exists in the stage store")]
    SimulationMissing { sim_id: String },
    #[error("device runner task failed: {0}")]
    Runner(#[from] tokio::task::JoinError),
    #[error("device runner {index} finished without reporting an outcome")]
    RunnerLost { index: usize },
    #[error("invalid invocation input: {0}")]
    InvalidInput(#[from] SchemaError),
}
