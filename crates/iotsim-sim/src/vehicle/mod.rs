//! ---
//! iotsim_section: "11-simulation"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Physics-backed connected vehicle telemetry generator."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
//! Connected-vehicle generator.
//!
//! Each logical vehicle carries a VIN and a trip id that are created once and
//! then threaded through every checkpoint in `staticValues`. The physical
//! state is checkpointed in `currentState` as a [`VehicleState`] snapshot.

pub mod dynamics;
pub mod state;

use chrono::{DateTime, Utc};
use iotsim_common::time::telemetry_timestamp;
use iotsim_msg::TelemetryMessage;
use iotsim_schema::{DeviceTypeSpec, GeneratorState, JsonObject};
use rand::prelude::*;
use serde_json::{json, Number, Value};
use tracing::{debug, trace, warn};

use crate::attributes::{number_field, round_to_precision};
use crate::generator::{GeneratorOptions, TelemetryGenerator};
use dynamics::DynamicsModel;
use state::VehicleState;

pub const VIN_KEY: &str = "vin";
pub const TRIP_ID_KEY: &str = "tripId";
const VIN_LENGTH: usize = 17;
/// VINs never contain I, O or Q.
const VIN_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPRSTUVWXYZ0123456789";

pub struct VehicleGenerator {
    model: DynamicsModel,
    vin: String,
    trip_id: String,
    messages: Vec<TelemetryMessage>,
    stopped: bool,
}

impl VehicleGenerator {
    pub fn new(prior: GeneratorState, options: &GeneratorOptions) -> Self {
        let mut rng = options.rng();
        let snapshot = restore_snapshot(prior.current_state);
        let vin = prior
            .static_values
            .get(VIN_KEY)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| generate_vin(&mut rng));
        let trip_id = prior
            .static_values
            .get(TRIP_ID_KEY)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Builder::from_random_bytes(rng.gen()).into_uuid().to_string());
        let model = DynamicsModel::new(
            snapshot,
            StdRng::seed_from_u64(rng.gen()),
            options.physics_step,
            options.trip_distance_km,
        );
        Self {
            model,
            vin,
            trip_id,
            messages: Vec::new(),
            stopped: false,
        }
    }

    pub fn vin(&self) -> &str {
        &self.vin
    }

    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    pub fn model(&self) -> &DynamicsModel {
        &self.model
    }

    fn snapshot_fields(snapshot: &VehicleState) -> JsonObject {
        match serde_json::to_value(snapshot) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) | Err(_) => {
                warn!("vehicle snapshot did not serialize to an object");
                JsonObject::new()
            }
        }
    }
}

fn restore_snapshot(current_state: JsonObject) -> Option<VehicleState> {
    if current_state.is_empty() {
        return None;
    }
    match serde_json::from_value(Value::Object(current_state)) {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            debug!(error = %err, "discarding unreadable vehicle snapshot");
            None
        }
    }
}

fn generate_vin<R: Rng>(rng: &mut R) -> String {
    (0..VIN_LENGTH)
        .filter_map(|_| VIN_ALPHABET.choose(rng).map(|byte| *byte as char))
        .collect()
}

fn rounded(value: Value, precision: Option<f64>) -> Value {
    match (precision, value.as_f64()) {
        (Some(precision), Some(raw)) if value.is_f64() || value.is_i64() || value.is_u64() => {
            Number::from_f64(round_to_precision(raw, precision))
                .map(Value::Number)
                .unwrap_or(value)
        }
        _ => value,
    }
}

impl TelemetryGenerator for VehicleGenerator {
    fn start(&mut self) {
        if !self.stopped {
            self.model.start_physics_loop();
        }
    }

    fn generate(&mut self, spec: &DeviceTypeSpec, device_id: &str, now: DateTime<Utc>) {
        let snapshot = self.model.snapshot();
        if !snapshot.is_ignition_on() {
            trace!(device = device_id, ignition = %snapshot.ignition_status, "ignition not on; no telemetry");
            return;
        }
        let fields = Self::snapshot_fields(&snapshot);

        let mut payload = JsonObject::new();
        for raw in &spec.payload {
            let Some(descriptor) = raw.as_object() else {
                debug!("skipping non-object vehicle attribute");
                continue;
            };
            let Some(name) = descriptor.get("name").and_then(Value::as_str) else {
                debug!("skipping vehicle attribute without a name");
                continue;
            };
            let precision = number_field(descriptor, "precision");
            let value = if name == "location" {
                json!({
                    "latitude": rounded(json!(snapshot.latitude), precision),
                    "longitude": rounded(json!(snapshot.longitude), precision),
                })
            } else if let Some(value) = fields.get(name) {
                rounded(value.clone(), precision)
            } else {
                debug!(attribute = name, "vehicle model has no such signal");
                continue;
            };
            payload.insert(name.to_owned(), value);
        }

        payload.insert("timestamp".into(), Value::String(telemetry_timestamp(now)));
        payload.insert("trip_id".into(), Value::String(self.trip_id.clone()));
        payload.insert("VIN".into(), Value::String(self.vin.clone()));
        payload.insert("_id_".into(), Value::String(device_id.to_owned()));
        self.messages.push(TelemetryMessage::new(spec.topic.clone(), payload));
    }

    fn messages(&self) -> &[TelemetryMessage] {
        &self.messages
    }

    fn clear_messages(&mut self) {
        self.messages.clear();
    }

    fn stop(&mut self) {
        self.model.stop_physics_loop();
        self.model.update(VehicleState::switch_off);
        self.stopped = true;
    }

    fn is_running(&self) -> bool {
        let snapshot = self.model.snapshot();
        !self.stopped && snapshot.is_ignition_on() && snapshot.engine_running
    }

    fn state(&self) -> GeneratorState {
        let mut static_values = JsonObject::new();
        static_values.insert(VIN_KEY.into(), Value::String(self.vin.clone()));
        static_values.insert(TRIP_ID_KEY.into(), Value::String(self.trip_id.clone()));
        GeneratorState {
            current_state: Self::snapshot_fields(&self.model.snapshot()),
            static_values,
        }
    }
}
