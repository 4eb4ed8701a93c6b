//! API route definitions
//!
//! - POST /api/v1/batches - dispatch one log delivery event
//! - GET  /api/v1/devices/:device_id/days/:date/records - one device-day
//! - GET  /api/v1/devices/:device_id/days/:date/records/:ts - one record
//! - GET  /api/v1/stats - cumulative pipeline counters
//! - GET  /health - liveness

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, ApiState};

/// Versioned API routes, nested under `/api/v1`
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/batches", post(handlers::ingest_batch))
        .route(
            "/devices/:device_id/days/:date/records",
            get(handlers::get_day_records),
        )
        .route(
            "/devices/:device_id/days/:date/records/:ts",
            get(handlers::get_record),
        )
        .route("/stats", get(handlers::get_stats))
        .with_state(state)
}

/// Unversioned liveness route
pub fn health_routes() -> Router {
    Router::new().route("/health", get(handlers::health_check))
}
