//! Feature encoding
//!
//! Reading → [`FeatureVector`] → feature line. The line is what the scoring
//! endpoint receives: six comma-separated values in [`FEATURE_NAMES`] order,
//! no header, no label column.
//!
//! [`FEATURE_NAMES`]: crate::types::FEATURE_NAMES

use crate::types::{FeatureVector, SensorFields};

/// Value used for a sensor channel the reading did not carry.
pub const MISSING_FEATURE_DEFAULT: f64 = 0.0;

/// Build the model-ordered feature vector, defaulting absent channels.
pub fn encode(sensors: &SensorFields) -> FeatureVector {
    FeatureVector::new(sensors.ordered().map(|v| v.unwrap_or(MISSING_FEATURE_DEFAULT)))
}

/// Serialize a feature vector as one line of model input.
///
/// Each value uses its shortest round-trippable decimal form.
pub fn feature_line(features: &FeatureVector) -> String {
    features
        .values()
        .iter()
        .map(|v| format!("{v:?}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::parse_reading;

    #[test]
    fn test_reference_reading_line() {
        let reading = parse_reading(
            r#"{"deviceId":"dev-1","ts":1690000000000,"temp_c":28.0,"humidity_pct":40.0,"vibration_g":0.03,"pressure_kpa":101.0,"voltage_v":12.0,"current_a":0.8}"#,
        )
        .unwrap();
        let line = feature_line(&encode(&reading.sensors));
        assert_eq!(line, "28.0,40.0,0.03,101.0,12.0,0.8");
    }

    #[test]
    fn test_order_independent_of_input_field_order() {
        let shuffled = parse_reading(
            r#"{"current_a":6.0,"ts":1,"voltage_v":5.0,"pressure_kpa":4.0,"deviceId":"d","vibration_g":3.0,"humidity_pct":2.0,"temp_c":1.0}"#,
        )
        .unwrap();
        let v = encode(&shuffled.sensors);
        assert_eq!(v.values(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_every_subset_of_missing_fields_defaults_to_zero() {
        let full = [1.5, 2.5, 3.5, 4.5, 5.5, 6.5];
        for mask in 0u8..64 {
            let mut sensors = SensorFields::default();
            for (i, name) in crate::types::FEATURE_NAMES.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    *sensors.slot_mut(name).unwrap() = Some(full[i]);
                }
            }
            let v = encode(&sensors);
            for i in 0..6 {
                let expected = if mask & (1 << i) != 0 { full[i] } else { 0.0 };
                assert_eq!(v.values()[i], expected, "mask {mask:06b}, feature {i}");
            }
        }
    }

    #[test]
    fn test_line_has_six_fields_and_no_header() {
        let line = feature_line(&encode(&SensorFields::default()));
        assert_eq!(line, "0.0,0.0,0.0,0.0,0.0,0.0");
        assert_eq!(line.split(',').count(), 6);
    }

    #[test]
    fn test_line_values_round_trip() {
        let v = FeatureVector::new([0.1, -17.25, 1e-9, 123_456.789, 0.30000000000000004, 2.0]);
        let parsed: Vec<f64> = feature_line(&v)
            .split(',')
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(parsed.as_slice(), v.values());
    }
}
