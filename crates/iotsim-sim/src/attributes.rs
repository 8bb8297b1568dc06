//! ---
//! iotsim_section: "11-simulation"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Attribute descriptors accepted in device type payload specs."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
//! Lenient parsing of attribute descriptors.
//!
//! Device type records are authored in a console that stores numbers either
//! as JSON numbers or as strings, so numeric fields accept both. Anything that
//! cannot be interpreted yields a [`DescriptorError`] which generators log and
//! skip.

use serde_json::{Map, Value};
use strum::{AsRefStr, EnumString};

const DEFAULT_ID_LENGTH: usize = 21;
const DEFAULT_FLOAT_PRECISION: f64 = 0.01;
const DEFAULT_SINUSOIDAL_PERIOD: f64 = 60.0;
const DEFAULT_DECAY_RATE: f64 = 0.05;
/// Upper bound for generated `id` and `string` lengths.
pub const MAX_TEXT_LENGTH: usize = 1024;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DescriptorError {
    #[error("descriptor is not a JSON object")]
    NotAnObject,
    #[error("descriptor is missing '{0}'")]
    MissingField(&'static str),
    #[error("attribute '{name}' has unknown type '{kind}'")]
    UnknownType { name: String, kind: String },
    #[error("attribute '{name}': min {min} exceeds max {max}")]
    InvertedRange { name: String, min: f64, max: f64 },
    #[error("attribute '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// Character set used by `id` attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CharSet {
    #[default]
    Alphanumeric,
    Alphabetic,
    Numeric,
    Hex,
}

impl CharSet {
    pub fn alphabet(self) -> &'static [u8] {
        match self {
            CharSet::Alphanumeric => {
                b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789"
            }
            CharSet::Alphabetic => b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz",
            CharSet::Numeric => b"0123456789",
            CharSet::Hex => b"0123456789abcdef",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    #[default]
    Default,
    Unix,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    Id { length: usize, charset: CharSet },
    Bool,
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64, precision: f64 },
    Location { lat: f64, long: f64, radius: f64 },
    Text { min: usize, max: usize },
    Timestamp { format: TimestampFormat },
    PickOne { options: Vec<Value> },
    /// Nested descriptors, kept raw and parsed when the object is sampled.
    Object { payload: Vec<Value> },
    Sinusoidal { min: f64, max: f64, period: f64 },
    Decay { min: f64, max: f64, rate: f64 },
}

/// One parsed entry of a device type payload spec.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    pub name: String,
    /// Generated once per device and reused afterwards.
    pub is_static: bool,
    pub kind: AttributeKind,
}

impl AttributeDescriptor {
    pub fn parse(raw: &Value) -> Result<Self, DescriptorError> {
        let object = raw.as_object().ok_or(DescriptorError::NotAnObject)?;
        let name = object
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or(DescriptorError::MissingField("name"))?
            .to_owned();
        let kind_name = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or(DescriptorError::MissingField("type"))?;
        let is_static = bool_field(object, "static").unwrap_or(false);

        let kind = match kind_name {
            "id" => AttributeKind::Id {
                length: bounded_length(
                    &name,
                    usize_field(object, "length").unwrap_or(DEFAULT_ID_LENGTH),
                )?,
                charset: match object.get("charSet").and_then(Value::as_str) {
                    None => CharSet::default(),
                    Some(raw) => raw.parse().map_err(|_| DescriptorError::Invalid {
                        name: name.clone(),
                        reason: format!("unknown charSet '{raw}'"),
                    })?,
                },
            },
            "bool" => AttributeKind::Bool,
            "int" => {
                let (min, max) = range(&name, object)?;
                AttributeKind::Int {
                    min: min.round() as i64,
                    max: max.round() as i64,
                }
            }
            "float" => {
                let (min, max) = range(&name, object)?;
                AttributeKind::Float {
                    min,
                    max,
                    precision: number_field(object, "precision").unwrap_or(DEFAULT_FLOAT_PRECISION),
                }
            }
            "location" => AttributeKind::Location {
                lat: required_number(&name, object, "lat")?,
                long: required_number(&name, object, "long")?,
                radius: number_field(object, "radius").unwrap_or(0.0).max(0.0),
            },
            "string" => {
                let (min, max) = range(&name, object)?;
                if min < 0.0 {
                    return Err(DescriptorError::Invalid {
                        name,
                        reason: "string length bounds must not be negative".into(),
                    });
                }
                AttributeKind::Text {
                    min: min as usize,
                    max: bounded_length(&name, max as usize)?,
                }
            }
            "timestamp" => AttributeKind::Timestamp {
                format: match object.get("tsformat").and_then(Value::as_str) {
                    Some("unix") => TimestampFormat::Unix,
                    _ => TimestampFormat::Default,
                },
            },
            "pickOne" => {
                let options = object
                    .get("arr")
                    .and_then(Value::as_array)
                    .filter(|options| !options.is_empty())
                    .cloned()
                    .ok_or_else(|| DescriptorError::Invalid {
                        name: name.clone(),
                        reason: "pickOne requires a non-empty 'arr'".into(),
                    })?;
                AttributeKind::PickOne { options }
            }
            "object" => AttributeKind::Object {
                payload: object
                    .get("payload")
                    .and_then(Value::as_array)
                    .cloned()
                    .ok_or(DescriptorError::MissingField("payload"))?,
            },
            "sinusoidal" => {
                let (min, max) = range(&name, object)?;
                AttributeKind::Sinusoidal {
                    min,
                    max,
                    period: positive_or(object, "period", DEFAULT_SINUSOIDAL_PERIOD),
                }
            }
            "decay" => {
                let (min, max) = range(&name, object)?;
                AttributeKind::Decay {
                    min,
                    max,
                    rate: positive_or(object, "rate", DEFAULT_DECAY_RATE),
                }
            }
            other => {
                return Err(DescriptorError::UnknownType {
                    name,
                    kind: other.to_owned(),
                })
            }
        };

        Ok(Self {
            name,
            is_static,
            kind,
        })
    }
}

/// Round `value` to the number of decimals implied by `precision`
/// (`round(log10(1 / precision))`). Non-positive precisions leave the value untouched.
pub fn round_to_precision(value: f64, precision: f64) -> f64 {
    if !(precision.is_finite() && precision > 0.0) || !value.is_finite() {
        return value;
    }
    let decimals = (1.0 / precision).log10().round().max(0.0) as i32;
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Numbers may arrive as JSON numbers or numeric strings. Non-finite values
/// such as `"inf"` or `"NaN"` read as absent.
pub(crate) fn number_field(object: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = match object.get(key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|value| value.is_finite())
}

fn usize_field(object: &Map<String, Value>, key: &str) -> Option<usize> {
    number_field(object, key)
        .filter(|value| *value >= 0.0)
        .map(|value| value as usize)
}

fn bool_field(object: &Map<String, Value>, key: &str) -> Option<bool> {
    match object.get(key)? {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

fn positive_or(object: &Map<String, Value>, key: &str, fallback: f64) -> f64 {
    number_field(object, key)
        .filter(|value| value.is_finite() && *value > 0.0)
        .unwrap_or(fallback)
}

fn required_number(
    name: &str,
    object: &Map<String, Value>,
    key: &'static str,
) -> Result<f64, DescriptorError> {
    number_field(object, key).ok_or_else(|| DescriptorError::Invalid {
        name: name.to_owned(),
        reason: format!("'{key}' must be numeric"),
    })
}

fn range(name: &str, object: &Map<String, Value>) -> Result<(f64, f64), DescriptorError> {
    let min = required_number(name, object, "min")?;
    let max = required_number(name, object, "max")?;
    if min > max {
        return Err(DescriptorError::InvertedRange {
            name: name.to_owned(),
            min,
            max,
        });
    }
    if !(max - min).is_finite() {
        return Err(DescriptorError::Invalid {
            name: name.to_owned(),
            reason: format!("range {min}..={max} is too wide to sample"),
        });
    }
    Ok((min, max))
}

fn bounded_length(name: &str, length: usize) -> Result<usize, DescriptorError> {
    if length > MAX_TEXT_LENGTH {
        return Err(DescriptorError::Invalid {
            name: name.to_owned(),
            reason: format!("length {length} exceeds {MAX_TEXT_LENGTH}"),
        });
    }
    Ok(length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rounding_follows_precision_decimals() {
        assert_eq!(round_to_precision(1.23456, 0.01), 1.23);
        assert_eq!(round_to_precision(0.0, 0.1), 0.0);
        assert_eq!(round_to_precision(17.5, 1.0), 18.0);
        assert_eq!(round_to_precision(2.71828, 0.001), 2.718);
        assert_eq!(round_to_precision(3.3, 0.0), 3.3);
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let descriptor =
            AttributeDescriptor::parse(&json!({"name": "temp", "type": "float", "min": "10", "max": "20.5"}))
                .unwrap();
        assert_eq!(
            descriptor.kind,
            AttributeKind::Float {
                min: 10.0,
                max: 20.5,
                precision: DEFAULT_FLOAT_PRECISION
            }
        );
        assert!(!descriptor.is_static);
    }

    #[test]
    fn id_defaults_and_charset() {
        let descriptor = AttributeDescriptor::parse(
            &json!({"name": "serial", "type": "id", "charSet": "HEX", "static": true}),
        )
        .unwrap();
        assert!(descriptor.is_static);
        assert_eq!(
            descriptor.kind,
            AttributeKind::Id {
                length: DEFAULT_ID_LENGTH,
                charset: CharSet::Hex
            }
        );
    }

    #[test]
    fn malformed_descriptors_are_reported() {
        assert_eq!(
            AttributeDescriptor::parse(&json!("speed")),
            Err(DescriptorError::NotAnObject)
        );
        assert_eq!(
            AttributeDescriptor::parse(&json!({"type": "bool"})),
            Err(DescriptorError::MissingField("name"))
        );
        assert!(matches!(
            AttributeDescriptor::parse(&json!({"name": "x", "type": "int", "min": 5, "max": 1})),
            Err(DescriptorError::InvertedRange { .. })
        ));
        assert!(matches!(
            AttributeDescriptor::parse(&json!({"name": "x", "type": "quaternion"})),
            Err(DescriptorError::UnknownType { .. })
        ));
        assert!(matches!(
            AttributeDescriptor::parse(&json!({"name": "x", "type": "pickOne", "arr": []})),
            Err(DescriptorError::Invalid { .. })
        ));
    }

    #[test]
    fn non_finite_bounds_are_rejected() {
        for (min, max) in [(json!("0"), json!("inf")), (json!("NaN"), json!("NaN")), (json!("-inf"), json!(1))] {
            let parsed =
                AttributeDescriptor::parse(&json!({"name": "x", "type": "float", "min": min, "max": max}));
            assert!(matches!(parsed, Err(DescriptorError::Invalid { .. })), "{parsed:?}");
        }
    }

    #[test]
    fn ranges_wider_than_f64_are_rejected() {
        for kind in ["float", "sinusoidal", "decay"] {
            let parsed = AttributeDescriptor::parse(
                &json!({"name": "x", "type": kind, "min": -1.7e308, "max": 1.7e308}),
            );
            assert!(matches!(parsed, Err(DescriptorError::Invalid { .. })), "{kind}: {parsed:?}");
        }
    }

    #[test]
    fn text_lengths_are_capped() {
        assert!(matches!(
            AttributeDescriptor::parse(&json!({"name": "x", "type": "string", "min": 0, "max": 1e12})),
            Err(DescriptorError::Invalid { .. })
        ));
        assert!(matches!(
            AttributeDescriptor::parse(&json!({"name": "x", "type": "id", "length": 5000})),
            Err(DescriptorError::Invalid { .. })
        ));
        let at_cap = AttributeDescriptor::parse(
            &json!({"name": "x", "type": "string", "min": 0, "max": MAX_TEXT_LENGTH}),
        )
        .unwrap();
        assert_eq!(at_cap.kind, AttributeKind::Text { min: 0, max: MAX_TEXT_LENGTH });
    }
}
