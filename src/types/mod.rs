//! Core telemetry types

mod reading;
mod record;

pub use reading::{FeatureVector, RawReading, SensorFields, FEATURE_COUNT, FEATURE_NAMES};
pub use record::{PartitionKey, ScoredRecord};
