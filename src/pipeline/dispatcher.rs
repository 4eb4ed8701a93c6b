//! Batch dispatcher
//!
//! Drives every envelope of a batch through
//! `Received → Decoded → Encoded → Scored → Decided → Persisted` on a bounded
//! set of concurrent tasks and folds the per-record results into one
//! [`BatchReport`].
//!
//! A record's failure never affects its siblings. When the batch deadline
//! expires, unfinished tasks are aborted and reported as timeouts at the stage
//! they were attempting.
//!
//! `dispatch.max_concurrency` is one permit pool for the whole process, so
//! concurrent batches (parallel ingest requests) share the scoring budget.
//! Store writes run on the blocking pool. A write that is already running
//! when its record times out still completes atomically, and redelivery then
//! finds it `Unchanged`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::decision::DecisionPolicy;
use super::encoder;
use super::error::PipelineError;
use super::outcome::{BatchReport, RecordOutcome, RecordState, Stage};
use super::source::{EnvelopeBatch, LogRecord};
use super::stats::PipelineStats;
use crate::acquisition::{decode_envelope, EnvelopeError};
use crate::config::ScorerConfig;
use crate::scoring::ScoringModel;
use crate::storage::{RecordStore, StoredRecord};
use crate::types::{PartitionKey, ScoredRecord};

// ============================================================================
// Shared Record Context
// ============================================================================

/// Everything a record task needs; shared read-only across tasks.
struct RecordContext {
    scorer: Arc<dyn ScoringModel>,
    store: Arc<dyn RecordStore>,
    policy: DecisionPolicy,
    permits: Arc<Semaphore>,
}

/// Progress of each record in the batch, readable after its task is aborted.
struct BatchProgress {
    stages: Vec<AtomicU8>,
    device_ids: Vec<OnceLock<String>>,
}

impl BatchProgress {
    fn new(len: usize) -> Self {
        Self {
            stages: (0..len).map(|_| AtomicU8::new(Stage::Received.as_u8())).collect(),
            device_ids: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    fn reach(&self, index: usize, stage: Stage) {
        self.stages[index].store(stage.as_u8(), Ordering::Release);
    }

    fn reached(&self, index: usize) -> Stage {
        Stage::from_u8(self.stages[index].load(Ordering::Acquire)).unwrap_or(Stage::Received)
    }

    /// The stage a record was working towards.
    fn attempting(&self, index: usize) -> Stage {
        let reached = self.reached(index);
        reached.next().unwrap_or(reached)
    }

    fn set_device(&self, index: usize, device_id: &str) {
        let _ = self.device_ids[index].set(device_id.to_string());
    }

    fn device(&self, index: usize) -> Option<String> {
        self.device_ids[index].get().cloned()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Processes envelope batches against a scoring model and a record store.
pub struct Dispatcher {
    ctx: Arc<RecordContext>,
    config: Arc<ScorerConfig>,
    stats: Arc<PipelineStats>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<ScorerConfig>,
        scorer: Arc<dyn ScoringModel>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let policy = DecisionPolicy::new(config.decision.threshold);
        info!(
            endpoint = scorer.endpoint(),
            store = store.backend_name(),
            threshold = policy.threshold(),
            max_concurrency = config.dispatch.max_concurrency,
            "Dispatcher ready"
        );
        Self {
            ctx: Arc::new(RecordContext {
                scorer,
                store,
                policy,
                permits: Arc::new(Semaphore::new(config.dispatch.max_concurrency.max(1))),
            }),
            config,
            stats: Arc::new(PipelineStats::new()),
        }
    }

    pub fn policy(&self) -> DecisionPolicy {
        self.ctx.policy
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    fn batch_deadline(&self) -> Duration {
        Duration::from_millis(self.config.dispatch.batch_deadline_ms)
    }

    /// Process one batch and report every record's outcome.
    ///
    /// Never fails as a whole: every problem is a per-record outcome, and
    /// `should_redeliver` on the report says whether redelivering the batch
    /// could help.
    pub async fn dispatch(&self, batch: &EnvelopeBatch) -> BatchReport {
        let started = Instant::now();
        let len = batch.len();
        let progress = Arc::new(BatchProgress::new(len));
        let mut tasks = JoinSet::new();

        for (index, record) in batch.records.iter().enumerate() {
            let ctx = Arc::clone(&self.ctx);
            let progress = Arc::clone(&progress);
            let permits = Arc::clone(&self.ctx.permits);
            let record = record.clone();
            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(p) => p,
                    Err(e) => {
                        let err = PipelineError::Internal(e.to_string());
                        return failed_outcome(index, &record, &progress, &err);
                    }
                };
                process_record(&ctx, index, &record, &progress).await
            });
        }

        let mut slots: Vec<Option<RecordOutcome>> = vec![None; len];
        let mut timed_out = false;

        let deadline = tokio::time::sleep(self.batch_deadline());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(outcome)) => {
                        let index = outcome.index;
                        slots[index] = Some(outcome);
                    }
                    Some(Err(e)) => warn!("Record task failed: {}", e),
                    None => break,
                },
                _ = &mut deadline => {
                    timed_out = true;
                    warn!(
                        deadline_ms = self.config.dispatch.batch_deadline_ms,
                        pending = tasks.len(),
                        "Batch deadline expired, aborting unfinished records"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        // Tasks that finished before the abort still report normally.
        while let Some(joined) = tasks.join_next().await {
            if let Ok(outcome) = joined {
                let index = outcome.index;
                slots[index] = Some(outcome);
            }
        }

        let outcomes = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    let err = if timed_out {
                        PipelineError::Timeout(progress.attempting(index))
                    } else {
                        PipelineError::Internal("task panicked".to_string())
                    };
                    failed_outcome(index, &batch.records[index], &progress, &err)
                })
            })
            .collect();

        let report = BatchReport::from_outcomes(outcomes, started.elapsed().as_millis() as u64);
        self.stats.record_batch(&report);

        info!(
            records = len,
            persisted = report.persisted,
            failed = report.failed,
            anomalies = report.anomalies,
            should_redeliver = report.should_redeliver,
            elapsed_ms = report.elapsed_ms,
            "Batch processed"
        );
        report
    }
}

// ============================================================================
// Per-Record Processing
// ============================================================================

async fn process_record(
    ctx: &RecordContext,
    index: usize,
    record: &LogRecord,
    progress: &BatchProgress,
) -> RecordOutcome {
    match run_stages(ctx, index, record, progress).await {
        Ok(state) => RecordOutcome {
            index,
            sequence_number: record.sequence_number.clone(),
            device_id: progress.device(index),
            state,
        },
        Err(err) => failed_outcome(index, record, progress, &err),
    }
}

async fn run_stages(
    ctx: &RecordContext,
    index: usize,
    record: &LogRecord,
    progress: &BatchProgress,
) -> Result<RecordState, PipelineError> {
    let reading = decode_envelope(&record.data)?;
    progress.set_device(index, &reading.device_id);
    let pk = PartitionKey::for_timestamp(&reading.device_id, reading.ts).ok_or(
        EnvelopeError::InvalidField {
            field: "ts",
            expected: "a timestamp within the supported date range",
        },
    )?;
    progress.reach(index, Stage::Decoded);

    let features = encoder::encode(&reading.sensors);
    let line = encoder::feature_line(&features);
    progress.reach(index, Stage::Encoded);

    let score = ctx.scorer.score(&line).await?;
    progress.reach(index, Stage::Scored);

    let anomaly = ctx.policy.is_anomalous(score);
    progress.reach(index, Stage::Decided);

    let ts = reading.ts;
    let scored = ScoredRecord {
        reading,
        features,
        score,
        anomaly,
        partition_key: pk.clone(),
    };
    let stored = StoredRecord::from_scored(&scored)?;
    let store = Arc::clone(&ctx.store);
    let write = tokio::task::spawn_blocking(move || store.put(&stored))
        .await
        .map_err(|e| PipelineError::Internal(format!("store write task failed: {e}")))??;
    progress.reach(index, Stage::Persisted);

    debug!(
        device_id = %scored.reading.device_id,
        pk = %pk,
        ts,
        score,
        anomaly,
        write = ?write,
        "Record persisted"
    );

    Ok(RecordState::Persisted {
        pk,
        ts,
        score,
        anomaly,
        write,
    })
}

fn failed_outcome(
    index: usize,
    record: &LogRecord,
    progress: &BatchProgress,
    err: &PipelineError,
) -> RecordOutcome {
    let stage = match err {
        PipelineError::Timeout(stage) => *stage,
        _ => progress.attempting(index),
    };
    let device_id = progress.device(index);

    warn!(
        index,
        device_id = device_id.as_deref().unwrap_or("-"),
        sequence_number = record.sequence_number.as_deref().unwrap_or("-"),
        stage = %stage,
        kind = %err.kind(),
        "Record failed: {}",
        err
    );

    RecordOutcome {
        index,
        sequence_number: record.sequence_number.clone(),
        device_id,
        state: RecordState::Failed {
            stage,
            kind: err.kind(),
            message: err.to_string(),
        },
    }
}
