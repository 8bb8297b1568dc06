//! ---
//! iotsim_section: "02-messaging-data-model"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Telemetry message types and publish channels."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{PublishError, Result};

/// Delivery quality passed through to the channel untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce,
    /// Broker acknowledges delivery.
    AtLeastOnce,
}

impl QoS {
    /// Numeric level as used on the wire.
    pub fn level(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
        }
    }
}

impl From<QoS> for u8 {
    fn from(value: QoS) -> Self {
        value.level()
    }
}

impl TryFrom<u8> for QoS {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            other => Err(format!("unsupported qos level {other}")),
        }
    }
}

/// One telemetry message buffered by a generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    /// Destination topic.
    pub topic: String,
    /// JSON object published as the message body.
    pub payload: Map<String, Value>,
}

impl TelemetryMessage {
    /// Construct a message for `topic`.
    pub fn new(topic: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Serialize the payload into the string handed to publishers.
    pub fn encode_payload(&self) -> Result<String> {
        serde_json::to_string(&self.payload).map_err(PublishError::from)
    }
}
