//! Config validation: unknown-key detection with Levenshtein suggestions
//! and sanity checks on otherwise valid values.
//!
//! The raw TOML is first parsed into `toml::Value` and its key tree compared
//! against the known field names. Unknown keys only produce warnings; they
//! never stop a config from loading.

use std::collections::HashSet;

use super::ScorerConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, "; did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for ScorerConfig.
///
/// Any new field added to ScorerConfig must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [scoring]
        "scoring",
        "scoring.endpoint_url",
        "scoring.connect_timeout_ms",
        "scoring.request_timeout_ms",
        // [store]
        "store",
        "store.path",
        "store.flush_every_write",
        // [decision]
        "decision",
        "decision.threshold",
        // [dispatch]
        "dispatch",
        "dispatch.max_concurrency",
        "dispatch.batch_deadline_ms",
        "dispatch.max_batch_attempts",
        "dispatch.redelivery_backoff_ms",
        // [server]
        "server",
        "server.addr",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// A table `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Edit distance between two strings, counted in chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are reported by serde
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Suspicious Values
// ============================================================================

/// Warnings for values that load fine but are probably mistakes.
pub fn suspicious_values(config: &ScorerConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let threshold = config.decision.threshold;
    if !(0.0..=1.0).contains(&threshold) {
        warnings.push(ValidationWarning {
            field: "decision.threshold".to_string(),
            message: format!(
                "decision.threshold = {threshold} is outside 0..=1; every record will be \
                 classified the same way if the model emits probabilities"
            ),
            suggestion: None,
        });
    }

    if config.dispatch.batch_deadline_ms <= config.scoring.request_timeout_ms {
        warnings.push(ValidationWarning {
            field: "dispatch.batch_deadline_ms".to_string(),
            message: format!(
                "dispatch.batch_deadline_ms = {} does not exceed scoring.request_timeout_ms = {}; \
                 one slow scoring call can time out the whole batch",
                config.dispatch.batch_deadline_ms, config.scoring.request_timeout_ms
            ),
            suggestion: None,
        });
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================
