//! Scorer Configuration
//!
//! One immutable [`ScorerConfig`] is built at startup and handed to every
//! component that needs it. Nothing reads configuration after that.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "SCORER_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "scorer.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a scorer process.
///
/// Load with `ScorerConfig::load()` which searches:
/// 1. `$SCORER_CONFIG` env var
/// 2. `./scorer.toml`
/// 3. Built-in defaults
///
/// and then applies `SCORING_ENDPOINT_URL`, `STORE_PATH` and `THRESHOLD`
/// environment overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScorerConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub decision: DecisionConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Remote scoring endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub endpoint_url: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            endpoint_url: defaults::SCORING_ENDPOINT_URL.to_string(),
            connect_timeout_ms: defaults::SCORING_CONNECT_TIMEOUT_MS,
            request_timeout_ms: defaults::SCORING_REQUEST_TIMEOUT_MS,
        }
    }
}

/// Durable record store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Flush each record to disk before reporting it persisted
    pub flush_every_write: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(defaults::STORE_PATH),
            flush_every_write: true,
        }
    }
}

/// Anomaly decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Scores at or above this value are anomalous
    pub threshold: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::ANOMALY_THRESHOLD,
        }
    }
}

/// Batch dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_concurrency: usize,
    pub batch_deadline_ms: u64,
    pub max_batch_attempts: u32,
    pub redelivery_backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: defaults::MAX_CONCURRENCY,
            batch_deadline_ms: defaults::BATCH_DEADLINE_MS,
            max_batch_attempts: defaults::MAX_BATCH_ATTEMPTS,
            redelivery_backoff_ms: defaults::REDELIVERY_BACKOFF_MS,
        }
    }
}

/// Ingest API server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl ScorerConfig {
    /// Load configuration using the standard search order plus environment
    /// overrides, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Like [`load`](Self::load), but an explicit `path` replaces the search.
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => {
                let config = Self::load_from_file(p)?;
                info!(path = %p.display(), "Loaded scorer config");
                config
            }
            None => Self::load_file_or_default()?,
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        for w in super::validation::suspicious_values(&config) {
            warn!("{}", w);
        }
        Ok(config)
    }

    fn load_file_or_default() -> Result<Self, ConfigError> {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                let config = Self::load_from_file(&p)?;
                info!(path = %p.display(), "Loaded scorer config from {}", CONFIG_PATH_ENV);
                return Ok(config);
            }
            warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_PATH_ENV);
        }

        // 2. Check ./scorer.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            let config = Self::load_from_file(&local)?;
            info!("Loaded scorer config from ./{}", LOCAL_CONFIG_FILE);
            return Ok(config);
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Ok(Self::default())
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse a TOML document. Unknown keys are logged as warnings.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SCORING_ENDPOINT_URL`, `STORE_PATH` and `THRESHOLD` as
    /// resolved by `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SCORING_ENDPOINT_URL") {
            self.scoring.endpoint_url = url;
        }
        if let Some(path) = lookup("STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("THRESHOLD") {
            self.decision.threshold = raw.trim().parse().map_err(|_| {
                ConfigError::Validation(vec![format!("THRESHOLD={raw:?} is not a decimal number")])
            })?;
        }
        Ok(())
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all values for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let url = self.scoring.endpoint_url.trim();
        if url.is_empty() {
            errors.push("scoring.endpoint_url must not be empty".to_string());
        } else if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(format!("scoring.endpoint_url {url:?} must be an http(s) URL"));
        }
        if self.scoring.request_timeout_ms == 0 {
            errors.push("scoring.request_timeout_ms must be > 0".to_string());
        }
        if self.scoring.connect_timeout_ms == 0 {
            errors.push("scoring.connect_timeout_ms must be > 0".to_string());
        }

        if self.store.path.as_os_str().is_empty() {
            errors.push("store.path must not be empty".to_string());
        }

        if !self.decision.threshold.is_finite() {
            errors.push(format!(
                "decision.threshold must be a finite number, got {}",
                self.decision.threshold
            ));
        }

        if self.dispatch.max_concurrency == 0 {
            errors.push("dispatch.max_concurrency must be > 0".to_string());
        }
        if self.dispatch.batch_deadline_ms == 0 {
            errors.push("dispatch.batch_deadline_ms must be > 0".to_string());
        }
        if self.dispatch.max_batch_attempts == 0 {
            errors.push("dispatch.max_batch_attempts must be > 0".to_string());
        }

        if self.server.addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "server.addr {:?} is not a HOST:PORT socket address",
                self.server.addr
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("config serialization error: {0}")]
    Serialize(#[source] toml::ser::Error),
    #[error("config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}
