//! Scoring Pipeline Module
//!
//! ```text
//! envelope ─▶ decode ─▶ encode ─▶ score ─▶ decide ─▶ persist ─▶ outcome
//!   (base64/JSON)  (6 features)  (remote)  (≥ threshold)  (keyed put)
//! ```
//!
//! The [`Dispatcher`] runs that chain for every record of a batch and returns
//! a [`BatchReport`]. The [`DeliveryLoop`] feeds it from a [`BatchSource`] and
//! redelivers batches whose report asks for it.

pub mod decision;
mod delivery;
mod dispatcher;
pub mod encoder;
mod error;
pub mod outcome;
pub mod source;
mod stats;

pub use decision::DecisionPolicy;
pub use delivery::{DeliveryLoop, DeliveryStats};
pub use dispatcher::Dispatcher;
pub use error::PipelineError;
pub use outcome::{BatchReport, FailureKind, RecordOutcome, RecordState, Stage};
pub use source::{
    BatchEvent, BatchSource, DeliveryEvent, EnvelopeBatch, JsonLinesSource, LogRecord,
    ReplaySource, StdinSource,
};
pub use stats::{FailureCounts, PipelineStats, StatsSnapshot};
