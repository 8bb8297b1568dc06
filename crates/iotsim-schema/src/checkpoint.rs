//! ---
//! iotsim_section: "02-messaging-data-model"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Shared schema definitions and validation logic."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::device::DeviceTypeSpec;
use crate::simulation::DeviceStage;

/// Literal recorded in place of a checkpoint once a device or device type is done.
pub const COMPLETE_MARKER: &str = "complete";

pub type JsonObject = Map<String, Value>;

/// Resumable generator state, owned by the generator and passed by value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorState {
    /// Physical or series state that evolves tick by tick.
    #[serde(default)]
    pub current_state: JsonObject,
    /// Identity constants created once per logical device.
    #[serde(default)]
    pub static_values: JsonObject,
}

impl GeneratorState {
    pub fn is_empty(&self) -> bool {
        self.current_state.is_empty() && self.static_values.is_empty()
    }
}

/// Snapshot of a device that has not finished yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCheckpoint {
    pub stage: DeviceStage,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started: DateTime<Utc>,
    pub id: String,
    #[serde(default)]
    pub generator: GeneratorState,
}

/// Resume input for a device type that still has unfinished instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTypeCheckpoint {
    pub type_id: String,
    pub amount: u32,
    pub info: DeviceTypeSpec,
    pub states: Vec<InstanceOutcome>,
}

/// Either the `"complete"` marker or a checkpoint to resume from.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Complete,
    Checkpoint(T),
}

pub type InstanceOutcome = Outcome<DeviceCheckpoint>;
pub type DeviceTypeOutcome = Outcome<DeviceTypeCheckpoint>;

impl<T> Outcome<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, Outcome::Complete)
    }

    pub fn checkpoint(&self) -> Option<&T> {
        match self {
            Outcome::Complete => None,
            Outcome::Checkpoint(state) => Some(state),
        }
    }

    pub fn into_checkpoint(self) -> Option<T> {
        match self {
            Outcome::Complete => None,
            Outcome::Checkpoint(state) => Some(state),
        }
    }
}

impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Outcome::Complete => serializer.serialize_str(COMPLETE_MARKER),
            Outcome::Checkpoint(state) => state.serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OutcomeRepr<T> {
    Marker(String),
    State(T),
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Outcome<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match OutcomeRepr::<T>::deserialize(deserializer)? {
            OutcomeRepr::Marker(marker) if marker == COMPLETE_MARKER => Ok(Outcome::Complete),
            OutcomeRepr::Marker(other) => Err(de::Error::custom(format!(
                "unexpected outcome marker '{other}', expected '{COMPLETE_MARKER}'"
            ))),
            OutcomeRepr::State(state) => Ok(Outcome::Checkpoint(state)),
        }
    }
}
