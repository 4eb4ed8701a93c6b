//! Scorer Configuration Module
//!
//! ## Loading Order
//!
//! 1. `SCORER_CONFIG` environment variable (path to TOML file)
//! 2. `scorer.toml` in the current working directory
//! 3. Built-in defaults
//!
//! `SCORING_ENDPOINT_URL`, `STORE_PATH` and `THRESHOLD` then override the
//! loaded values. The result is passed explicitly to each component:
//!
//! ```ignore
//! let config = Arc::new(ScorerConfig::load()?);
//! let dispatcher = Dispatcher::new(config.clone(), scorer, store);
//! ```

mod scorer_config;
pub mod defaults;
pub mod validation;

pub use scorer_config::*;
