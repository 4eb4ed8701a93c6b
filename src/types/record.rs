//! Scored record and partition key types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{FeatureVector, RawReading};

/// Store partition key: `{deviceId}#{YYYY-MM-DD}` (UTC day).
///
/// One partition holds one device's readings for one calendar day, so a
/// per-device, per-day query is a single prefix scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn new(device_id: &str, date: NaiveDate) -> Self {
        Self(format!("{}#{}", device_id, date.format("%Y-%m-%d")))
    }

    /// Key for a reading taken at `ts` (ms since epoch).
    ///
    /// Returns `None` only when `ts` is outside the representable date range.
    pub fn for_timestamp(device_id: &str, ts: i64) -> Option<Self> {
        chrono::DateTime::from_timestamp_millis(ts).map(|t| Self::new(device_id, t.date_naive()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reading after scoring and decision, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub reading: RawReading,
    /// Features actually sent to the model (defaults applied)
    pub features: FeatureVector,
    pub score: f64,
    pub anomaly: bool,
    pub partition_key: PartitionKey,
}

impl ScoredRecord {
    /// Sort key within the partition.
    pub const fn sort_key(&self) -> i64 {
        self.reading.ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_key_reference_case() {
        let pk = PartitionKey::for_timestamp("dev-1", 1_690_000_000_000).unwrap();
        assert_eq!(pk.as_str(), "dev-1#2023-07-22");
    }

    #[test]
    fn test_partition_key_day_boundaries() {
        // 2023-07-22T23:59:59.999Z and 2023-07-23T00:00:00.000Z
        let last_ms = 1_690_070_399_999;
        let pk_last = PartitionKey::for_timestamp("d", last_ms).unwrap();
        let pk_next = PartitionKey::for_timestamp("d", last_ms + 1).unwrap();
        assert_eq!(pk_last.as_str(), "d#2023-07-22");
        assert_eq!(pk_next.as_str(), "d#2023-07-23");
    }

    #[test]
    fn test_partition_key_is_deterministic() {
        let a = PartitionKey::for_timestamp("pump-7", 1_700_000_000_123).unwrap();
        let b = PartitionKey::for_timestamp("pump-7", 1_700_000_000_123).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "pump-7#2023-11-14");
    }

    #[test]
    fn test_partition_key_serializes_as_plain_string() {
        let pk = PartitionKey::new("dev-1", NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(serde_json::to_string(&pk).unwrap(), "\"dev-1#2024-02-29\"");
    }
}
