//! Per-record and per-batch outcomes
//!
//! Every record in a batch ends in exactly one [`RecordState`]: persisted, or
//! failed with the stage it was trying to reach and a [`FailureKind`].

use serde::{Deserialize, Serialize};

use crate::storage::WriteOutcome;
use crate::types::PartitionKey;

// ============================================================================
// Stage
// ============================================================================

/// Lifecycle stages a record moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Stage {
    Received = 0,
    Decoded = 1,
    Encoded = 2,
    Scored = 3,
    Decided = 4,
    Persisted = 5,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Received,
        Stage::Decoded,
        Stage::Encoded,
        Stage::Scored,
        Stage::Decided,
        Stage::Persisted,
    ];

    /// The stage after this one; `Persisted` is terminal.
    pub const fn next(self) -> Option<Stage> {
        match self {
            Stage::Received => Some(Stage::Decoded),
            Stage::Decoded => Some(Stage::Encoded),
            Stage::Encoded => Some(Stage::Scored),
            Stage::Scored => Some(Stage::Decided),
            Stage::Decided => Some(Stage::Persisted),
            Stage::Persisted => None,
        }
    }

    pub(crate) const fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(raw: u8) -> Option<Stage> {
        Self::ALL.get(usize::from(raw)).copied()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Decoded => "decoded",
            Stage::Encoded => "encoded",
            Stage::Scored => "scored",
            Stage::Decided => "decided",
            Stage::Persisted => "persisted",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Failure Kind
// ============================================================================

/// Classification of a per-record failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Envelope could not be turned into a valid reading
    Decode,
    /// Scoring endpoint unreachable or returned a non-success status
    Scoring,
    /// Scoring response was not a decimal score
    Parse,
    /// Store was unavailable or failed the write
    Persistence,
    /// Store refused the record's values; the same envelope is refused again
    Rejected,
    /// Batch deadline expired before the record finished
    Timeout,
    /// Record task ended without reporting (panic or cancellation)
    Internal,
}

impl FailureKind {
    /// Whether redelivering the batch could make this record succeed.
    ///
    /// Decode, parse and rejection failures are deterministic for a given
    /// envelope and model, so redelivery cannot fix them.
    pub const fn retryable(self) -> bool {
        match self {
            FailureKind::Decode | FailureKind::Parse | FailureKind::Rejected => false,
            FailureKind::Scoring
            | FailureKind::Persistence
            | FailureKind::Timeout
            | FailureKind::Internal => true,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            FailureKind::Decode => "decode",
            FailureKind::Scoring => "scoring",
            FailureKind::Parse => "parse",
            FailureKind::Persistence => "persistence",
            FailureKind::Rejected => "rejected",
            FailureKind::Timeout => "timeout",
            FailureKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Record Outcome
// ============================================================================

/// Terminal state of one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordState {
    Persisted {
        pk: PartitionKey,
        ts: i64,
        score: f64,
        anomaly: bool,
        write: WriteOutcome,
    },
    Failed {
        /// Stage the record was trying to reach when it failed
        stage: Stage,
        kind: FailureKind,
        message: String,
    },
}

/// Outcome of one envelope in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
    /// Position of the envelope in the batch
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
    /// Known once the envelope decoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(flatten)]
    pub state: RecordState,
}

impl RecordOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self.state, RecordState::Persisted { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self.state {
            RecordState::Failed { kind, .. } => Some(kind),
            RecordState::Persisted { .. } => None,
        }
    }

    pub fn is_anomaly(&self) -> bool {
        matches!(self.state, RecordState::Persisted { anomaly: true, .. })
    }
}

// ============================================================================
// Batch Report
// ============================================================================

/// Aggregated result of dispatching one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// One outcome per envelope, in batch order
    pub records: Vec<RecordOutcome>,
    pub persisted: usize,
    pub failed: usize,
    pub anomalies: usize,
    /// Any record failed with a retryable kind
    pub should_redeliver: bool,
    pub elapsed_ms: u64,
}

impl BatchReport {
    /// Build a report from outcomes; outcomes are sorted into batch order.
    pub fn from_outcomes(mut records: Vec<RecordOutcome>, elapsed_ms: u64) -> Self {
        records.sort_by_key(|r| r.index);

        let persisted = records.iter().filter(|r| r.is_persisted()).count();
        let anomalies = records.iter().filter(|r| r.is_anomaly()).count();
        let should_redeliver = records
            .iter()
            .filter_map(RecordOutcome::failure_kind)
            .any(FailureKind::retryable);

        Self {
            failed: records.len() - persisted,
            records,
            persisted,
            anomalies,
            should_redeliver,
            elapsed_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of failed records of the given kind.
    pub fn failures_of(&self, kind: FailureKind) -> usize {
        self.records
            .iter()
            .filter(|r| r.failure_kind() == Some(kind))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persisted(index: usize, anomaly: bool) -> RecordOutcome {
        RecordOutcome {
            index,
            sequence_number: None,
            device_id: Some("dev-1".to_string()),
            state: RecordState::Persisted {
                pk: PartitionKey::for_timestamp("dev-1", 1_690_000_000_000).unwrap(),
                ts: 1_690_000_000_000 + index as i64,
                score: if anomaly { 0.91 } else { 0.12 },
                anomaly,
                write: WriteOutcome::Created,
            },
        }
    }

    fn failed(index: usize, stage: Stage, kind: FailureKind) -> RecordOutcome {
        RecordOutcome {
            index,
            sequence_number: None,
            device_id: None,
            state: RecordState::Failed {
                stage,
                kind,
                message: "boom".to_string(),
            },
        }
    }

    #[test]
    fn test_stage_order_and_round_trip() {
        let mut stage = Stage::Received;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen, Stage::ALL);
        for s in Stage::ALL {
            assert_eq!(Stage::from_u8(s.as_u8()), Some(s));
        }
        assert_eq!(Stage::from_u8(6), None);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(!FailureKind::Decode.retryable());
        assert!(!FailureKind::Parse.retryable());
        assert!(!FailureKind::Rejected.retryable());
        assert!(FailureKind::Scoring.retryable());
        assert!(FailureKind::Persistence.retryable());
        assert!(FailureKind::Timeout.retryable());
        assert!(FailureKind::Internal.retryable());
    }

    #[test]
    fn test_report_counts_and_ordering() {
        let report = BatchReport::from_outcomes(
            vec![
                persisted(2, true),
                failed(1, Stage::Decoded, FailureKind::Decode),
                persisted(0, false),
            ],
            7,
        );
        let indices: Vec<usize> = report.records.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(report.persisted, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.anomalies, 1);
        assert_eq!(report.failures_of(FailureKind::Decode), 1);
        assert!(!report.should_redeliver);
    }

    #[test]
    fn test_retryable_failure_requests_redelivery() {
        let report = BatchReport::from_outcomes(
            vec![
                persisted(0, false),
                failed(1, Stage::Scored, FailureKind::Scoring),
            ],
            1,
        );
        assert!(report.should_redeliver);
    }

    #[test]
    fn test_outcome_json_shape() {
        let json = serde_json::to_value(failed(3, Stage::Scored, FailureKind::Parse)).unwrap();
        assert_eq!(json["index"], 3);
        assert_eq!(json["status"], "failed");
        assert_eq!(json["stage"], "scored");
        assert_eq!(json["kind"], "parse");
        assert!(json.get("device_id").is_none());

        let json = serde_json::to_value(persisted(0, true)).unwrap();
        assert_eq!(json["status"], "persisted");
        assert_eq!(json["pk"], "dev-1#2023-07-22");
        assert_eq!(json["write"], "created");
        assert_eq!(json["anomaly"], true);
    }
}
