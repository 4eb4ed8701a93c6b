//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Scoring
// ============================================================================

/// Scoring endpoint used when none is configured.
pub const SCORING_ENDPOINT_URL: &str = "http://127.0.0.1:8081/invocations";

/// TCP connect timeout for the scoring endpoint (ms).
pub const SCORING_CONNECT_TIMEOUT_MS: u64 = 2_000;

/// Whole-request timeout for one scoring call (ms).
pub const SCORING_REQUEST_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// Store
// ============================================================================

/// Default sled database directory.
pub const STORE_PATH: &str = "./data/scored_records.db";

// ============================================================================
// Decision
// ============================================================================

/// Default anomaly threshold.
pub const ANOMALY_THRESHOLD: f64 = 0.5;

// ============================================================================
// Dispatch
// ============================================================================

/// Concurrent records per batch.
///
/// Size this to the scoring endpoint's sustainable concurrent request budget.
pub const MAX_CONCURRENCY: usize = 8;

/// Deadline for processing one batch (ms).
pub const BATCH_DEADLINE_MS: u64 = 30_000;

/// Delivery attempts per batch before it is abandoned.
pub const MAX_BATCH_ATTEMPTS: u32 = 3;

/// Base delay between redeliveries of a failed batch (ms), multiplied by the
/// attempt number.
pub const REDELIVERY_BACKOFF_MS: u64 = 500;

// ============================================================================
// Server
// ============================================================================

/// HTTP bind address for the ingest API.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";

/// Maximum accepted request body for a batch (bytes).
pub const MAX_BATCH_BODY_BYTES: usize = 6 * 1024 * 1024;
