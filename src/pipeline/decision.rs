//! Anomaly decision policy

/// Threshold comparison applied to every score.
///
/// The threshold is fixed when the policy is built and never changes for the
/// life of the process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    threshold: f64,
}

impl DecisionPolicy {
    pub const fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// A score at or above the threshold is anomalous.
    pub fn is_anomalous(&self, score: f64) -> bool {
        score >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_is_anomalous() {
        let policy = DecisionPolicy::new(0.5);
        assert!(policy.is_anomalous(0.5));
    }

    #[test]
    fn test_below_and_above() {
        let policy = DecisionPolicy::new(0.5);
        assert!(!policy.is_anomalous(0.12));
        assert!(!policy.is_anomalous(0.499_999_999));
        assert!(policy.is_anomalous(0.91));
    }

    #[test]
    fn test_closed_lower_bound_over_grid() {
        for t in [-1.0, 0.0, 0.25, 0.5, 0.75, 1.0] {
            let policy = DecisionPolicy::new(t);
            for s in [-1.0, 0.0, 0.1, 0.25, 0.5, 0.75, 0.9, 1.0] {
                assert_eq!(policy.is_anomalous(s), s >= t, "score {s} threshold {t}");
            }
        }
    }
}
