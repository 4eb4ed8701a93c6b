//! Persisted record layout

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::StoreError;
use crate::types::{PartitionKey, ScoredRecord};

/// The durable form of a scored reading.
///
/// Every numeric attribute is an exact decimal built from the shortest
/// round-trippable string of the source `f64`, so `0.12` is stored as the
/// decimal `0.12` and reads back as `0.12`, never as
/// `0.11999999999999999555910790149937`. Precision is unbounded, so tiny
/// scores and very large readings keep every digit of their shortest form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub pk: PartitionKey,
    pub ts: i64,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub temp_c: BigDecimal,
    pub humidity_pct: BigDecimal,
    pub vibration_g: BigDecimal,
    pub pressure_kpa: BigDecimal,
    pub voltage_v: BigDecimal,
    pub current_a: BigDecimal,
    pub score: BigDecimal,
    /// 1 if anomalous, else 0
    pub anomaly: u8,
}

impl StoredRecord {
    /// Convert a scored record, failing if any value has no exact decimal form.
    pub fn from_scored(record: &ScoredRecord) -> Result<Self, StoreError> {
        let f = record.features.values();
        Ok(Self {
            pk: record.partition_key.clone(),
            ts: record.sort_key(),
            device_id: record.reading.device_id.clone(),
            temp_c: exact_decimal("temp_c", f[0])?,
            humidity_pct: exact_decimal("humidity_pct", f[1])?,
            vibration_g: exact_decimal("vibration_g", f[2])?,
            pressure_kpa: exact_decimal("pressure_kpa", f[3])?,
            voltage_v: exact_decimal("voltage_v", f[4])?,
            current_a: exact_decimal("current_a", f[5])?,
            score: exact_decimal("score", record.score)?,
            anomaly: u8::from(record.anomaly),
        })
    }

    pub const fn is_anomaly(&self) -> bool {
        self.anomaly == 1
    }
}

/// Exact decimal for an `f64`, via its shortest round-trippable string.
///
/// Every finite `f64` has one; NaN and infinities are rejected.
pub fn exact_decimal(field: &'static str, value: f64) -> Result<BigDecimal, StoreError> {
    if !value.is_finite() {
        return Err(StoreError::NotRepresentable { field, value });
    }
    BigDecimal::from_str(&value.to_string())
        .map_err(|_| StoreError::NotRepresentable { field, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encoder::encode;
    use crate::types::{RawReading, SensorFields};

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_exact_decimal_uses_shortest_string() {
        assert_eq!(exact_decimal("x", 0.12).unwrap(), dec("0.12"));
        assert_eq!(exact_decimal("x", 0.1 + 0.2).unwrap(), dec("0.30000000000000004"));
        assert_eq!(exact_decimal("x", 28.0).unwrap(), dec("28"));
        assert_eq!(exact_decimal("x", -4.5).unwrap(), dec("-4.5"));
    }

    #[test]
    fn test_exact_decimal_keeps_extreme_magnitudes() {
        assert_eq!(
            exact_decimal("x", 1e-30).unwrap(),
            dec("0.000000000000000000000000000001")
        );
        let tiny_score = 1.234_567_890_123_456_7e-15;
        let decimal = exact_decimal("x", tiny_score).unwrap();
        assert_eq!(decimal, dec(&tiny_score.to_string()));
        assert_eq!(decimal.to_string().parse::<f64>().unwrap(), tiny_score);
        assert_eq!(
            exact_decimal("x", 1e29).unwrap(),
            dec("100000000000000000000000000000")
        );
        assert_eq!(exact_decimal("x", -1e40).unwrap(), dec("-1e40"));
    }

    #[test]
    fn test_exact_decimal_rejects_non_finite() {
        assert!(exact_decimal("x", f64::NAN).is_err());
        assert!(exact_decimal("x", f64::INFINITY).is_err());
        assert!(exact_decimal("x", f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn test_extreme_values_survive_json() {
        let stored = StoredRecord {
            pk: PartitionKey::for_timestamp("dev-1", 0).unwrap(),
            ts: 0,
            device_id: "dev-1".to_string(),
            temp_c: exact_decimal("temp_c", 1e29).unwrap(),
            humidity_pct: dec("0"),
            vibration_g: exact_decimal("vibration_g", 1e-30).unwrap(),
            pressure_kpa: dec("0"),
            voltage_v: dec("0"),
            current_a: dec("0"),
            score: exact_decimal("score", 1.234_567_890_123_456_7e-15).unwrap(),
            anomaly: 0,
        };
        let json = serde_json::to_string(&stored).unwrap();
        let back: StoredRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stored);
    }

    #[test]
    fn test_from_scored_record() {
        let sensors = SensorFields {
            temp_c: Some(28.0),
            vibration_g: Some(0.03),
            current_a: Some(0.8),
            ..Default::default()
        };
        let reading = RawReading::new("dev-1", 1_690_000_000_000, sensors);
        let scored = ScoredRecord {
            features: encode(&reading.sensors),
            partition_key: PartitionKey::for_timestamp("dev-1", reading.ts).unwrap(),
            reading,
            score: 0.91,
            anomaly: true,
        };

        let stored = StoredRecord::from_scored(&scored).unwrap();
        assert_eq!(stored.pk.as_str(), "dev-1#2023-07-22");
        assert_eq!(stored.ts, 1_690_000_000_000);
        assert_eq!(stored.vibration_g, dec("0.03"));
        assert_eq!(stored.humidity_pct, dec("0"));
        assert_eq!(stored.score, dec("0.91"));
        assert_eq!(stored.anomaly, 1);
        assert!(stored.is_anomaly());
    }

    #[test]
    fn test_json_layout_uses_decimal_strings() {
        let stored = StoredRecord {
            pk: PartitionKey::for_timestamp("dev-1", 0).unwrap(),
            ts: 0,
            device_id: "dev-1".to_string(),
            temp_c: dec("28"),
            humidity_pct: dec("40"),
            vibration_g: dec("0.03"),
            pressure_kpa: dec("101"),
            voltage_v: dec("12"),
            current_a: dec("0.8"),
            score: dec("0.12"),
            anomaly: 0,
        };
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["pk"], "dev-1#1970-01-01");
        assert_eq!(json["deviceId"], "dev-1");
        assert_eq!(json["score"], "0.12");
        assert_eq!(json["anomaly"], 0);

        let back: StoredRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, stored);
    }
}
