//! HTTP scoring client
//!
//! POSTs a feature line as `text/csv` and reads the score from the `text/csv`
//! response. Non-2xx responses and transport errors are scoring failures; a
//! 2xx body that is not a number is a parse failure. Nothing is retried here.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;

use super::{parse_score, preview, ScoringError, ScoringModel};
use crate::config::ScoringConfig;

/// Content type for both the request and the expected response.
const CSV_CONTENT_TYPE: &str = "text/csv";

/// HTTP client for the scoring endpoint
#[derive(Clone)]
pub struct HttpScoringClient {
    http: reqwest::Client,
    endpoint_url: String,
}

impl HttpScoringClient {
    /// Build a client from scoring configuration.
    pub fn new(config: &ScoringConfig) -> Result<Self, ScoringError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ScoringError::Client(e.to_string()))?;

        Ok(Self {
            http,
            endpoint_url: config.endpoint_url.clone(),
        })
    }
}

#[async_trait]
impl ScoringModel for HttpScoringClient {
    async fn score(&self, feature_line: &str) -> Result<f64, ScoringError> {
        let resp = self
            .http
            .post(&self.endpoint_url)
            .header(CONTENT_TYPE, CSV_CONTENT_TYPE)
            .header(ACCEPT, CSV_CONTENT_TYPE)
            .body(feature_line.to_owned())
            .send()
            .await
            .map_err(|e| ScoringError::Unreachable(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ScoringError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            return Err(ScoringError::Status {
                status: status.as_u16(),
                body: preview(&body),
            });
        }

        parse_score(&body)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint_url
    }
}
