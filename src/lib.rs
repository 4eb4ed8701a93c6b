//! Telemetry Scorer: streaming anomaly scoring for device telemetry
//!
//! Consumes batches of base64 JSON envelopes from a partitioned log, turns
//! each reading into a fixed-order feature line, scores it against a remote
//! model, applies an anomaly threshold and persists the result under a
//! per-device, per-day partition key.
//!
//! ## Architecture
//!
//! - **Acquisition**: envelope decoding into typed readings
//! - **Pipeline**: feature encoding, decision policy, batch dispatch, delivery
//! - **Scoring**: remote model client
//! - **Storage**: idempotent keyed persistence (sled or in-memory)
//! - **API**: HTTP ingest and query surface

pub mod acquisition;
pub mod api;
pub mod config;
pub mod pipeline;
pub mod scoring;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::ScorerConfig;

// Re-export commonly used types
pub use types::{FeatureVector, PartitionKey, RawReading, ScoredRecord, SensorFields};

// Re-export pipeline entry points
pub use pipeline::{BatchReport, DeliveryLoop, Dispatcher, EnvelopeBatch, FailureKind};

// Re-export collaborators
pub use scoring::{HttpScoringClient, ScoringModel};
pub use storage::{InMemoryRecordStore, RecordStore, SledRecordStore};
