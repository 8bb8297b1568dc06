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
use serde_json::Value;

use crate::checkpoint::InstanceOutcome;
use crate::{SchemaError, SchemaResult};

pub const MIN_DEVICE_AMOUNT: u32 = 1;
pub const MAX_DEVICE_AMOUNT: u32 = 100;

/// Topic and attribute schema describing one kind of simulated device.
///
/// Attribute descriptors stay raw JSON here; generators interpret them and skip
/// the ones they do not understand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceTypeSpec {
    pub topic: String,
    #[serde(default)]
    pub payload: Vec<Value>,
}

impl DeviceTypeSpec {
    pub fn new(topic: impl Into<String>, payload: Vec<Value>) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// Request to run `amount` instances of one device type, optionally resuming
/// from the per-instance states of an earlier invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTypeRequest {
    pub type_id: String,
    pub amount: u32,
    pub info: DeviceTypeSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<Vec<InstanceOutcome>>,
}

impl DeviceTypeRequest {
    pub fn new(type_id: impl Into<String>, amount: u32, info: DeviceTypeSpec) -> Self {
        Self {
            type_id: type_id.into(),
            amount,
            info,
            states: None,
        }
    }

    pub fn with_states(mut self, states: Vec<InstanceOutcome>) -> Self {
        self.states = Some(states);
        self
    }

    /// Prior outcome for instance `index`, if this request resumes a run.
    pub fn prior_state(&self, index: usize) -> Option<&InstanceOutcome> {
        self.states.as_ref().and_then(|states| states.get(index))
    }

    pub fn validate(&self) -> SchemaResult<()> {
        if self.type_id.trim().is_empty() {
            return Err(SchemaError::EmptyTypeId);
        }
        if !(MIN_DEVICE_AMOUNT..=MAX_DEVICE_AMOUNT).contains(&self.amount) {
            return Err(SchemaError::InvalidAmount {
                type_id: self.type_id.clone(),
                amount: self.amount,
                min: MIN_DEVICE_AMOUNT,
                max: MAX_DEVICE_AMOUNT,
            });
        }
        if let Some(states) = &self.states {
            if states.len() != self.amount as usize {
                return Err(SchemaError::StatesLength {
                    type_id: self.type_id.clone(),
                    expected: self.amount as usize,
                    found: states.len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> DeviceTypeSpec {
        DeviceTypeSpec::new("sensors/temp", vec![json!({"name": "t", "type": "int"})])
    }

    #[test]
    fn amount_bounds_are_enforced() {
        assert!(DeviceTypeRequest::new("t", 1, spec()).validate().is_ok());
        assert!(DeviceTypeRequest::new("t", 100, spec()).validate().is_ok());
        assert!(matches!(
            DeviceTypeRequest::new("t", 0, spec()).validate(),
            Err(SchemaError::InvalidAmount { amount: 0, .. })
        ));
        assert!(matches!(
            DeviceTypeRequest::new("t", 101, spec()).validate(),
            Err(SchemaError::InvalidAmount { amount: 101, .. })
        ));
    }

    #[test]
    fn states_must_match_amount() {
        let request = DeviceTypeRequest::new("t", 2, spec()).with_states(vec![InstanceOutcome::Complete]);
        assert!(matches!(
            request.validate(),
            Err(SchemaError::StatesLength {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn deserializes_request_with_states() {
        let raw = json!({
            "typeId": "xyz987",
            "amount": 2,
            "info": {"topic": "fleet/telemetry", "payload": []},
            "states": ["complete", {
                "stage": "running",
                "started": 1_700_000_000_000i64,
                "id": "abcxyz1",
                "generator": {"currentState": {}, "staticValues": {}}
            }]
        });
        let request: DeviceTypeRequest = serde_json::from_value(raw).unwrap();
        assert!(request.prior_state(0).unwrap().is_complete());
        assert!(!request.prior_state(1).unwrap().is_complete());
        assert!(request.prior_state(2).is_none());
    }
}
