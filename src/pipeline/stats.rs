//! Cumulative pipeline counters
//!
//! Lock-free atomics updated once per dispatched batch; read as a
//! [`StatsSnapshot`] by the stats endpoint and the delivery loop summary.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use super::outcome::{BatchReport, FailureKind};

/// Process-lifetime counters shared by every dispatch.
#[derive(Debug, Default)]
pub struct PipelineStats {
    batches: AtomicU64,
    redelivery_requests: AtomicU64,
    records_received: AtomicU64,
    records_persisted: AtomicU64,
    anomalies: AtomicU64,
    decode_failures: AtomicU64,
    scoring_failures: AtomicU64,
    parse_failures: AtomicU64,
    persistence_failures: AtomicU64,
    rejected_failures: AtomicU64,
    timeouts: AtomicU64,
    internal_failures: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one batch report into the counters.
    pub fn record_batch(&self, report: &BatchReport) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        if report.should_redeliver {
            self.redelivery_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.records_received
            .fetch_add(report.records.len() as u64, Ordering::Relaxed);
        self.records_persisted
            .fetch_add(report.persisted as u64, Ordering::Relaxed);
        self.anomalies
            .fetch_add(report.anomalies as u64, Ordering::Relaxed);

        for kind in report.records.iter().filter_map(|r| r.failure_kind()) {
            self.failure_counter(kind).fetch_add(1, Ordering::Relaxed);
        }
    }

    fn failure_counter(&self, kind: FailureKind) -> &AtomicU64 {
        match kind {
            FailureKind::Decode => &self.decode_failures,
            FailureKind::Scoring => &self.scoring_failures,
            FailureKind::Parse => &self.parse_failures,
            FailureKind::Persistence => &self.persistence_failures,
            FailureKind::Rejected => &self.rejected_failures,
            FailureKind::Timeout => &self.timeouts,
            FailureKind::Internal => &self.internal_failures,
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            batches: load(&self.batches),
            redelivery_requests: load(&self.redelivery_requests),
            records_received: load(&self.records_received),
            records_persisted: load(&self.records_persisted),
            anomalies: load(&self.anomalies),
            failures: FailureCounts {
                decode: load(&self.decode_failures),
                scoring: load(&self.scoring_failures),
                parse: load(&self.parse_failures),
                persistence: load(&self.persistence_failures),
                rejected: load(&self.rejected_failures),
                timeout: load(&self.timeouts),
                internal: load(&self.internal_failures),
            },
        }
    }
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub batches: u64,
    pub redelivery_requests: u64,
    pub records_received: u64,
    pub records_persisted: u64,
    pub anomalies: u64,
    pub failures: FailureCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailureCounts {
    pub decode: u64,
    pub scoring: u64,
    pub parse: u64,
    pub persistence: u64,
    pub rejected: u64,
    pub timeout: u64,
    pub internal: u64,
}

impl FailureCounts {
    pub const fn total(&self) -> u64 {
        self.decode
            + self.scoring
            + self.parse
            + self.persistence
            + self.rejected
            + self.timeout
            + self.internal
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline: {} batches, {} records ({} persisted, {} anomalies, {} failed)",
            self.batches,
            self.records_received,
            self.records_persisted,
            self.anomalies,
            self.failures.total()
        )
    }
}
