//! API request handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::pipeline::{DeliveryEvent, Dispatcher, EnvelopeBatch, StatsSnapshot};
use crate::storage::{RecordStore, StoreError, StoredRecord};
use crate::types::PartitionKey;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<dyn RecordStore>,
}

impl ApiState {
    pub fn new(dispatcher: Arc<Dispatcher>, store: Arc<dyn RecordStore>) -> Self {
        Self { dispatcher, store }
    }
}

// ============================================================================
// Batch Ingest
// ============================================================================

/// `POST /api/v1/batches`
///
/// Runs the batch and returns its report. The status tells the upstream
/// deliverer what to do: 200 acknowledges the batch, 500 asks for the whole
/// batch to be redelivered.
pub async fn ingest_batch(
    State(state): State<ApiState>,
    payload: Result<Json<DeliveryEvent>, JsonRejection>,
) -> Response {
    let Json(event) = match payload {
        Ok(event) => event,
        Err(rejection) => {
            warn!("Rejected batch body: {}", rejection.body_text());
            return ApiErrorResponse::from_rejection(&rejection);
        }
    };

    let batch = EnvelopeBatch::from(event);
    let report = state.dispatcher.dispatch(&batch).await;

    let status = if report.should_redeliver {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    ApiResponse::with_status(status, report)
}

// ============================================================================
// Device-Day Queries
// ============================================================================

/// Run a store call on the blocking pool.
async fn with_store<T, F>(store: &Arc<dyn RecordStore>, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn RecordStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| StoreError::Storage(format!("store task failed: {e}")))?
}

#[derive(Debug, Serialize)]
pub struct DayRecords {
    pub pk: PartitionKey,
    pub count: usize,
    pub records: Vec<StoredRecord>,
}

fn partition_for(device_id: &str, date: &str) -> Result<PartitionKey, Response> {
    if device_id.is_empty() || device_id.chars().any(char::is_control) {
        return Err(ApiErrorResponse::bad_request("device id must be non-empty printable text"));
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|d| PartitionKey::new(device_id, d))
        .map_err(|_| ApiErrorResponse::bad_request(format!("invalid date '{date}', expected YYYY-MM-DD")))
}

/// `GET /api/v1/devices/:device_id/days/:date/records`
pub async fn get_day_records(
    State(state): State<ApiState>,
    Path((device_id, date)): Path<(String, String)>,
) -> Response {
    let pk = match partition_for(&device_id, &date) {
        Ok(pk) => pk,
        Err(resp) => return resp,
    };

    let query_pk = pk.clone();
    match with_store(&state.store, move |store| store.query_partition(&query_pk)).await {
        Ok(records) => ApiResponse::ok(DayRecords {
            count: records.len(),
            pk,
            records,
        }),
        Err(e) => {
            warn!(pk = %pk, "Partition query failed: {}", e);
            ApiErrorResponse::internal(e.to_string())
        }
    }
}

/// `GET /api/v1/devices/:device_id/days/:date/records/:ts`
pub async fn get_record(
    State(state): State<ApiState>,
    Path((device_id, date, ts)): Path<(String, String, i64)>,
) -> Response {
    let pk = match partition_for(&device_id, &date) {
        Ok(pk) => pk,
        Err(resp) => return resp,
    };

    let get_pk = pk.clone();
    match with_store(&state.store, move |store| store.get(&get_pk, ts)).await {
        Ok(Some(record)) => ApiResponse::ok(record),
        Ok(None) => ApiErrorResponse::not_found(format!("no record at {pk} ts {ts}")),
        Err(e) => ApiErrorResponse::internal(e.to_string()),
    }
}

// ============================================================================
// Stats & Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub pipeline: StatsSnapshot,
    pub store_backend: &'static str,
    pub stored_records: Option<usize>,
    pub threshold: f64,
}

/// `GET /api/v1/stats`
pub async fn get_stats(State(state): State<ApiState>) -> Response {
    let stored_records = match with_store(&state.store, |store| store.count()).await {
        Ok(n) => Some(n),
        Err(e) => {
            warn!("Record count failed: {}", e);
            None
        }
    };

    ApiResponse::ok(StatsResponse {
        pipeline: state.dispatcher.stats().snapshot(),
        store_backend: state.store.backend_name(),
        stored_records,
        threshold: state.dispatcher.policy().threshold(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /health`
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Log a one-line summary of what the API serves.
pub fn log_routes(addr: &std::net::SocketAddr) {
    info!("Ingest API listening on http://{}", addr);
    info!("  POST /api/v1/batches");
    info!("  GET  /api/v1/devices/:device_id/days/:date/records");
    info!("  GET  /api/v1/stats");
    info!("  GET  /health");
}
