//! Envelope decoding
//!
//! An envelope is one log record payload: base64 text wrapping a UTF-8 JSON
//! object. Decoding is a single schema-validating step that yields a typed
//! [`RawReading`] or an [`EnvelopeError`]:
//!
//! - `deviceId` must be a non-empty string without control characters
//! - `ts` must be an integer number of milliseconds within chrono's date range
//! - each sensor field must be a JSON number, `null`, or absent; `null` and
//!   absent are the same thing (the encoder defaults them to `0.0`)
//! - a sensor field holding any other JSON type is rejected, not defaulted
//! - unknown fields are ignored

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};

use crate::types::{RawReading, SensorFields, FEATURE_NAMES};

/// Why an envelope could not be turned into a reading.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' is invalid: expected {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

/// Decode a base64 envelope into a reading.
pub fn decode_envelope(data: &str) -> Result<RawReading, EnvelopeError> {
    let bytes = STANDARD.decode(data.trim())?;
    let text = String::from_utf8(bytes)?;
    parse_reading(&text)
}

/// Parse and validate the JSON body of an envelope.
pub fn parse_reading(json: &str) -> Result<RawReading, EnvelopeError> {
    let Value::Object(obj) = serde_json::from_str::<Value>(json)? else {
        return Err(EnvelopeError::NotAnObject);
    };

    let device_id = device_id_field(&obj)?;
    let ts = ts_field(&obj)?;

    let mut sensors = SensorFields::default();
    for name in FEATURE_NAMES {
        let value = sensor_field(&obj, name)?;
        if let Some(slot) = sensors.slot_mut(name) {
            *slot = value;
        }
    }

    Ok(RawReading::new(device_id, ts, sensors))
}

/// Encode a reading as a base64 envelope (producer side).
pub fn encode_envelope(reading: &RawReading) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(reading)?;
    Ok(STANDARD.encode(json))
}

fn device_id_field(obj: &Map<String, Value>) -> Result<String, EnvelopeError> {
    match obj.get("deviceId") {
        None | Some(Value::Null) => Err(EnvelopeError::MissingField("deviceId")),
        Some(Value::String(s)) if !s.is_empty() && !s.chars().any(char::is_control) => {
            Ok(s.clone())
        }
        Some(_) => Err(EnvelopeError::InvalidField {
            field: "deviceId",
            expected: "a non-empty string without control characters",
        }),
    }
}

fn ts_field(obj: &Map<String, Value>) -> Result<i64, EnvelopeError> {
    let invalid = EnvelopeError::InvalidField {
        field: "ts",
        expected: "integer milliseconds since epoch",
    };
    match obj.get("ts") {
        None | Some(Value::Null) => Err(EnvelopeError::MissingField("ts")),
        Some(Value::Number(n)) => {
            let ts = n.as_i64().ok_or(invalid)?;
            // Reject timestamps that cannot map to a calendar day.
            if chrono::DateTime::from_timestamp_millis(ts).is_none() {
                return Err(EnvelopeError::InvalidField {
                    field: "ts",
                    expected: "a timestamp within the supported date range",
                });
            }
            Ok(ts)
        }
        Some(_) => Err(invalid),
    }
}

fn sensor_field(obj: &Map<String, Value>, name: &'static str) -> Result<Option<f64>, EnvelopeError> {
    match obj.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or(EnvelopeError::InvalidField {
            field: name,
            expected: "a finite number",
        }),
        Some(_) => Err(EnvelopeError::InvalidField {
            field: name,
            expected: "a number",
        }),
    }
}
