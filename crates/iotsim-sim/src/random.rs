//! ---
//! iotsim_section: "11-simulation"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Declarative random-value telemetry generator."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use iotsim_msg::TelemetryMessage;
use iotsim_schema::{DeviceTypeSpec, GeneratorState, JsonObject};
use rand::prelude::*;
use serde_json::{json, Number, Value};
use tracing::debug;

use crate::attributes::{round_to_precision, AttributeDescriptor, AttributeKind, CharSet, TimestampFormat};
use crate::generator::{GeneratorOptions, TelemetryGenerator};

const METRES_PER_DEGREE: f64 = 111_320.0;

/// Samples every attribute descriptor of a device type once per tick.
#[derive(Debug)]
pub struct RandomGenerator {
    rng: StdRng,
    messages: Vec<TelemetryMessage>,
    running: bool,
    /// Step counters of stateful series, keyed by dotted attribute path.
    current_state: JsonObject,
    static_values: JsonObject,
}

impl RandomGenerator {
    pub fn new(prior: GeneratorState, options: &GeneratorOptions) -> Self {
        Self {
            rng: options.rng(),
            messages: Vec::new(),
            running: true,
            current_state: prior.current_state,
            static_values: prior.static_values,
        }
    }

    fn sample_fields(&mut self, descriptors: &[Value], prefix: &str, now: DateTime<Utc>) -> JsonObject {
        let mut payload = JsonObject::new();
        for raw in descriptors {
            let descriptor = match AttributeDescriptor::parse(raw) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    debug!(error = %err, "skipping attribute descriptor");
                    continue;
                }
            };
            let path = if prefix.is_empty() {
                descriptor.name.clone()
            } else {
                format!("{prefix}.{}", descriptor.name)
            };

            if descriptor.is_static {
                if let Some(value) = self.static_values.get(&path) {
                    payload.insert(descriptor.name, value.clone());
                    continue;
                }
            }

            let Some(value) = self.sample(&descriptor.kind, &path, now) else {
                debug!(attribute = %path, "attribute produced no value");
                continue;
            };
            if descriptor.is_static {
                self.static_values.insert(path, value.clone());
            }
            payload.insert(descriptor.name, value);
        }
        payload
    }

    fn sample(&mut self, kind: &AttributeKind, path: &str, now: DateTime<Utc>) -> Option<Value> {
        let value = match kind {
            AttributeKind::Id { length, charset } => Value::String(self.random_chars(*length, *charset)),
            AttributeKind::Bool => Value::Bool(self.rng.gen()),
            AttributeKind::Int { min, max } => json!(self.rng.gen_range(*min..=*max)),
            AttributeKind::Float { min, max, precision } => {
                let raw = self.rng.gen_range(*min..=*max);
                float(round_to_precision(raw, *precision))?
            }
            AttributeKind::Location { lat, long, radius } => {
                let (latitude, longitude) = self.point_within(*lat, *long, *radius);
                json!({
                    "latitude": round_to_precision(latitude, 1e-6),
                    "longitude": round_to_precision(longitude, 1e-6),
                })
            }
            AttributeKind::Text { min, max } => {
                let length = self.rng.gen_range(*min..=*max);
                Value::String(self.random_chars(length, CharSet::Alphanumeric))
            }
            AttributeKind::Timestamp { format } => match format {
                TimestampFormat::Default => Value::String(now.format("%Y-%m-%dT%H:%M:%S").to_string()),
                TimestampFormat::Unix => json!(now.timestamp()),
            },
            AttributeKind::PickOne { options } => options.choose(&mut self.rng)?.clone(),
            AttributeKind::Object { payload } => {
                let nested = self.sample_fields(payload, path, now);
                if nested.is_empty() {
                    return None;
                }
                Value::Object(nested)
            }
            AttributeKind::Sinusoidal { min, max, period } => {
                let step = self.next_step(path);
                let mid = (min + max) / 2.0;
                let amplitude = (max - min) / 2.0;
                float(round_to_precision(
                    mid + amplitude * (2.0 * PI * step as f64 / period).sin(),
                    0.01,
                ))?
            }
            AttributeKind::Decay { min, max, rate } => {
                let step = self.next_step(path);
                float(round_to_precision(
                    min + (max - min) * (-rate * step as f64).exp(),
                    0.01,
                ))?
            }
        };
        Some(value)
    }

    /// Returns the current step of a series and advances it.
    fn next_step(&mut self, path: &str) -> u64 {
        let step = self
            .current_state
            .get(path)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        self.current_state.insert(path.to_owned(), json!(step + 1));
        step
    }

    fn random_chars(&mut self, length: usize, charset: CharSet) -> String {
        let alphabet = charset.alphabet();
        (0..length)
            .filter_map(|_| alphabet.choose(&mut self.rng).map(|byte| *byte as char))
            .collect()
    }

    /// Uniformly distributed point within `radius` metres of the centre.
    fn point_within(&mut self, lat: f64, long: f64, radius: f64) -> (f64, f64) {
        if radius <= 0.0 {
            return (lat, long);
        }
        let distance = radius * self.rng.gen::<f64>().sqrt();
        let bearing = 2.0 * PI * self.rng.gen::<f64>();
        let d_lat = distance * bearing.cos() / METRES_PER_DEGREE;
        let d_long = distance * bearing.sin() / (METRES_PER_DEGREE * lat.to_radians().cos().max(1e-6));
        (lat + d_lat, long + d_long)
    }
}

fn float(value: f64) -> Option<Value> {
    Number::from_f64(value).map(Value::Number)
}

impl TelemetryGenerator for RandomGenerator {
    fn generate(&mut self, spec: &DeviceTypeSpec, device_id: &str, now: DateTime<Utc>) {
        if !self.running {
            return;
        }
        let mut payload = self.sample_fields(&spec.payload, "", now);
        if payload.is_empty() {
            debug!(device = device_id, "no attributes produced a value");
            return;
        }
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
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn state(&self) -> GeneratorState {
        GeneratorState {
            current_state: self.current_state.clone(),
            static_values: self.static_values.clone(),
        }
    }
}
