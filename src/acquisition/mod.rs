//! Telemetry acquisition
//!
//! Turns log record payloads into typed readings.

pub mod envelope;

pub use envelope::{decode_envelope, encode_envelope, parse_reading, EnvelopeError};
