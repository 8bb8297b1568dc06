//! ---
//! iotsim_section: "02-messaging-data-model"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Shared schema definitions and validation logic."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::checkpoint::DeviceTypeOutcome;
use crate::device::DeviceTypeRequest;
use crate::simulation::Simulation;

/// Options passed between consecutive invocations of the same simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationOptions {
    #[serde(default)]
    pub restart: bool,
}

/// Payload handed to one invocation by the external orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub simulation: Simulation,
    #[serde(default)]
    pub devices: Vec<DeviceTypeRequest>,
    #[serde(default)]
    pub options: InvocationOptions,
}

/// Payload returned to the external orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub options: InvocationOptions,
    pub simulation: Simulation,
    pub devices: Vec<DeviceTypeOutcome>,
}

impl InvocationResult {
    /// Build the result, recomputing `restart` from the device outcomes.
    pub fn new(simulation: Simulation, devices: Vec<DeviceTypeOutcome>) -> Self {
        let restart = devices.iter().any(|outcome| !outcome.is_complete());
        Self {
            options: InvocationOptions { restart },
            simulation,
            devices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{DeviceTypeCheckpoint, Outcome};
    use crate::device::DeviceTypeSpec;
    use crate::simulation::Stage;
    use serde_json::json;

    #[test]
    fn restart_reflects_checkpoints() {
        let sim = Simulation::new("abc", Stage::Running, 1, 10);
        let done = InvocationResult::new(sim.clone(), vec![Outcome::Complete, Outcome::Complete]);
        assert!(!done.options.restart);

        let pending = InvocationResult::new(
            sim,
            vec![
                Outcome::Complete,
                Outcome::Checkpoint(DeviceTypeCheckpoint {
                    type_id: "t".into(),
                    amount: 1,
                    info: DeviceTypeSpec::new("topic", Vec::new()),
                    states: vec![Outcome::Complete],
                }),
            ],
        );
        assert!(pending.options.restart);
    }

    #[test]
    fn transient_option_fields_are_dropped() {
        let request: InvocationRequest = serde_json::from_value(json!({
            "simulation": {"simId": "abc", "stage": "running", "interval": 1, "duration": 5},
            "devices": [],
            "options": {"restart": true, "context": {"awsRequestId": "123"}}
        }))
        .unwrap();
        assert!(request.options.restart);
        assert_eq!(
            serde_json::to_value(&request.options).unwrap(),
            json!({"restart": true})
        );
    }
}
