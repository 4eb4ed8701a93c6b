//! Pipeline error taxonomy

use super::outcome::{FailureKind, Stage};
use crate::acquisition::EnvelopeError;
use crate::scoring::ScoringError;
use crate::storage::StoreError;

/// Why a single record failed
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("decode failure: {0}")]
    Decode(#[from] EnvelopeError),
    #[error("scoring failure: {0}")]
    Scoring(ScoringError),
    #[error("parse failure: {0}")]
    Parse(ScoringError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
    #[error("batch deadline expired before reaching stage '{0}'")]
    Timeout(Stage),
    #[error("record task ended without an outcome: {0}")]
    Internal(String),
}

impl From<ScoringError> for PipelineError {
    fn from(err: ScoringError) -> Self {
        if err.is_parse() {
            Self::Parse(err)
        } else {
            Self::Scoring(err)
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Decode(_) => FailureKind::Decode,
            Self::Scoring(_) => FailureKind::Scoring,
            Self::Parse(_) => FailureKind::Parse,
            Self::Persistence(e) if e.is_permanent() => FailureKind::Rejected,
            Self::Persistence(_) => FailureKind::Persistence,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Internal(_) => FailureKind::Internal,
        }
    }

    pub fn retryable(&self) -> bool {
        self.kind().retryable()
    }
}
