//! Sensor reading types
//!
//! A [`RawReading`] is the typed form of one telemetry envelope. It is built
//! only by the envelope decoder, which applies the defaulting policy: sensor
//! fields that are absent or `null` stay `None` here and become `0.0` when the
//! reading is encoded into a [`FeatureVector`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Number of model features.
pub const FEATURE_COUNT: usize = 6;

/// Feature names in model order.
///
/// This order is the training-time schema of the scoring model. Changing it
/// here without retraining silently corrupts every score.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "temp_c",
    "humidity_pct",
    "vibration_g",
    "pressure_kpa",
    "voltage_v",
    "current_a",
];

/// The six optional sensor channels of a reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorFields {
    /// Temperature (°C)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_c: Option<f64>,
    /// Relative humidity (%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_pct: Option<f64>,
    /// Vibration (g)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibration_g: Option<f64>,
    /// Pressure (kPa)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure_kpa: Option<f64>,
    /// Supply voltage (V)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage_v: Option<f64>,
    /// Current draw (A)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_a: Option<f64>,
}

impl SensorFields {
    /// Channel values in model order.
    pub const fn ordered(&self) -> [Option<f64>; FEATURE_COUNT] {
        [
            self.temp_c,
            self.humidity_pct,
            self.vibration_g,
            self.pressure_kpa,
            self.voltage_v,
            self.current_a,
        ]
    }

    /// Mutable slot for a channel by its wire name.
    pub fn slot_mut(&mut self, name: &str) -> Option<&mut Option<f64>> {
        match name {
            "temp_c" => Some(&mut self.temp_c),
            "humidity_pct" => Some(&mut self.humidity_pct),
            "vibration_g" => Some(&mut self.vibration_g),
            "pressure_kpa" => Some(&mut self.pressure_kpa),
            "voltage_v" => Some(&mut self.voltage_v),
            "current_a" => Some(&mut self.current_a),
            _ => None,
        }
    }
}

/// One decoded telemetry reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    /// Device identity
    #[serde(rename = "deviceId")]
    pub device_id: String,
    /// Milliseconds since the Unix epoch
    pub ts: i64,
    #[serde(flatten)]
    pub sensors: SensorFields,
}

impl RawReading {
    pub fn new(device_id: impl Into<String>, ts: i64, sensors: SensorFields) -> Self {
        Self {
            device_id: device_id.into(),
            ts,
            sensors,
        }
    }

    /// Reading time as a UTC instant, `None` if `ts` is outside chrono's range.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.ts)
    }

    /// UTC calendar date of the reading.
    pub fn utc_date(&self) -> Option<NaiveDate> {
        self.timestamp().map(|t| t.date_naive())
    }
}

/// Model input: the six sensor values in [`FEATURE_NAMES`] order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub const fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub const fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    /// Value of a named feature.
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.0[i])
    }

    /// `(name, value)` pairs in model order.
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.0.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utc_date_of_reference_timestamp() {
        let reading = RawReading::new("dev-1", 1_690_000_000_000, SensorFields::default());
        assert_eq!(
            reading.utc_date(),
            NaiveDate::from_ymd_opt(2023, 7, 22)
        );
    }

    #[test]
    fn test_utc_date_before_epoch() {
        let reading = RawReading::new("dev-1", -1, SensorFields::default());
        assert_eq!(reading.utc_date(), NaiveDate::from_ymd_opt(1969, 12, 31));
    }

    #[test]
    fn test_serialize_skips_absent_channels() {
        let reading = RawReading::new(
            "dev-2",
            5,
            SensorFields {
                temp_c: Some(21.5),
                ..Default::default()
            },
        );
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["deviceId"], "dev-2");
        assert_eq!(json["temp_c"], 21.5);
        assert!(json.get("humidity_pct").is_none());
    }

    #[test]
    fn test_feature_lookup_by_name() {
        let v = FeatureVector::new([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(v.get("pressure_kpa"), Some(4.0));
        assert_eq!(v.get("rpm"), None);
        let names: Vec<_> = v.named().map(|(n, _)| n).collect();
        assert_eq!(names, FEATURE_NAMES);
    }

    #[test]
    fn test_slot_mut_covers_every_feature() {
        let mut fields = SensorFields::default();
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            *fields.slot_mut(name).unwrap() = Some(i as f64);
        }
        let ordered = fields.ordered();
        for (i, value) in ordered.iter().enumerate() {
            assert_eq!(*value, Some(i as f64));
        }
    }
}
