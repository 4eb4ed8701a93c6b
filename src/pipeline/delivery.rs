//! At-least-once delivery loop
//!
//! Pulls batches from a [`BatchSource`], hands each to the [`Dispatcher`] and
//! redelivers the whole batch while its report asks for it, up to
//! `dispatch.max_batch_attempts`. Idempotent writes make the redelivery of
//! already persisted records harmless.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::dispatcher::Dispatcher;
use super::outcome::BatchReport;
use super::source::{BatchEvent, BatchSource, EnvelopeBatch};

/// Summary of one delivery loop run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    /// Distinct batches pulled from the source
    pub batches: u64,
    /// Dispatch attempts, including redeliveries
    pub attempts: u64,
    pub records_persisted: u64,
    pub records_failed: u64,
    /// Batches given up on with retryable failures remaining
    pub batches_abandoned: u64,
}

/// Consumes a batch source until EOF or cancellation.
pub struct DeliveryLoop {
    dispatcher: Arc<Dispatcher>,
    cancel_token: CancellationToken,
    max_attempts: u32,
    backoff: Duration,
}

impl DeliveryLoop {
    pub fn new(dispatcher: Arc<Dispatcher>, cancel_token: CancellationToken) -> Self {
        let dispatch = &dispatcher.config().dispatch;
        let max_attempts = dispatch.max_batch_attempts.max(1);
        let backoff = Duration::from_millis(dispatch.redelivery_backoff_ms);
        Self {
            dispatcher,
            cancel_token,
            max_attempts,
            backoff,
        }
    }

    /// Run until the source is exhausted or cancellation.
    pub async fn run<S: BatchSource>(self, source: &mut S) -> DeliveryStats {
        let mut stats = DeliveryStats::default();
        info!(source = source.source_name(), "Consuming batches");

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    info!("[DeliveryLoop] Shutdown signal received");
                    break;
                }
                result = source.next_batch() => match result {
                    Ok(ev) => ev,
                    Err(e) => {
                        warn!("[DeliveryLoop] Source error: {}", e);
                        break;
                    }
                }
            };

            let batch = match event {
                BatchEvent::Batch(b) => b,
                BatchEvent::Eof => {
                    info!(batches = stats.batches, "[DeliveryLoop] Source reached end");
                    break;
                }
            };

            stats.batches += 1;
            let Some(report) = self.deliver(&batch, &mut stats).await else {
                break;
            };
            stats.records_persisted += report.persisted as u64;
            stats.records_failed += report.failed as u64;
        }

        info!(
            batches = stats.batches,
            attempts = stats.attempts,
            persisted = stats.records_persisted,
            failed = stats.records_failed,
            abandoned = stats.batches_abandoned,
            "{}",
            self.dispatcher.stats().snapshot()
        );
        stats
    }

    /// Deliver one batch, redelivering while the report asks for it.
    ///
    /// Returns the last report, or `None` if cancelled while backing off.
    async fn deliver(&self, batch: &EnvelopeBatch, stats: &mut DeliveryStats) -> Option<BatchReport> {
        let mut attempt = 1u32;
        loop {
            stats.attempts += 1;
            let report = self.dispatcher.dispatch(batch).await;
            if !report.should_redeliver {
                return Some(report);
            }
            if attempt >= self.max_attempts {
                warn!(
                    attempts = attempt,
                    failed = report.failed,
                    "Abandoning batch with retryable failures"
                );
                stats.batches_abandoned += 1;
                return Some(report);
            }

            let delay = self.backoff * attempt;
            warn!(
                attempt,
                failed = report.failed,
                delay_ms = delay.as_millis() as u64,
                "Redelivering batch"
            );
            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
