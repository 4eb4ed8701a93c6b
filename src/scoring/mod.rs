//! Remote scoring model
//!
//! The model is consumed only as a synchronous endpoint: one feature line in,
//! one score line out. [`ScoringModel`] is the seam the dispatcher depends
//! on; [`HttpScoringClient`] is the production implementation.

mod client;

pub use client::HttpScoringClient;

use async_trait::async_trait;

/// Maximum number of response body characters kept in error messages.
const BODY_PREVIEW_CHARS: usize = 120;

/// Something that turns a feature line into an anomaly score.
///
/// Implementations must be safe for concurrent use by many in-flight records
/// and must not retry internally.
#[async_trait]
pub trait ScoringModel: Send + Sync {
    /// Score one serialized feature line.
    async fn score(&self, feature_line: &str) -> Result<f64, ScoringError>;

    /// Endpoint identifier for logging
    fn endpoint(&self) -> &str;
}

/// Scoring errors
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("scoring endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("scoring endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("scoring response is not a decimal score: {body:?}")]
    Parse { body: String },
    #[error("failed to build scoring client: {0}")]
    Client(String),
}

impl ScoringError {
    /// Whether the response arrived but could not be read as a score.
    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

/// Extract the score from a response body.
///
/// The first line's first comma-separated field is the score; any trailing
/// fields are ignored. The score must be a finite decimal.
pub fn parse_score(body: &str) -> Result<f64, ScoringError> {
    let first_field = body
        .trim()
        .lines()
        .next()
        .and_then(|line| line.split(',').next())
        .map(str::trim)
        .unwrap_or_default();

    match first_field.parse::<f64>() {
        Ok(score) if score.is_finite() => Ok(score),
        _ => Err(ScoringError::Parse {
            body: preview(body),
        }),
    }
}

/// Truncate a response body for error messages.
pub(crate) fn preview(body: &str) -> String {
    if body.chars().count() <= BODY_PREVIEW_CHARS {
        body.to_string()
    } else {
        let head: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
        format!("{head}...")
    }
}
