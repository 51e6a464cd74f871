//! Error types for bnews-scoring
//!
//! The variants form the failure vocabulary of the scoring core. None of them
//! is ever converted into a default numeric score: a caller that receives
//! `AllPerspectivesInvalid` or `AllModelsUnavailable` must surface a failure,
//! not a neutral 0.0.

use bnews_common::db::retry::RetryError;
use bnews_common::db::is_lock_error;
use thiserror::Error;

use crate::services::scoring_client::FailureKind;

/// Scoring core error taxonomy
#[derive(Debug, Error)]
pub enum ScoreError {
    /// Malformed composite score configuration
    #[error("Invalid configuration: {0}")]
    Validation(String),

    /// Caller-supplied value rejected (e.g. manual score out of range)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No perspective produced a valid value; no score can be derived
    #[error("All perspectives invalid: no valid score could be derived")]
    AllPerspectivesInvalid,

    /// Lock contention on the database; retryable
    #[error("Transient store error: {0}")]
    TransientStore(String),

    /// Store failure that retrying cannot fix, or retry budget exhausted
    #[error("Persistent store error: {0}")]
    PersistentStore(String),

    /// A single model failed its scoring call
    #[error("Model '{model}' unavailable ({kind}): {message}")]
    ModelUnavailable {
        model: String,
        kind: FailureKind,
        message: String,
    },

    /// Every configured model failed
    #[error("All models unavailable; last error: {source}")]
    AllModelsUnavailable {
        #[source]
        source: Box<ScoreError>,
    },

    /// Requested document or job not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unexpected internal failure (e.g. panicked background job)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScoreError {
    /// Wrap the last model failure of a sweep
    pub fn all_models_unavailable(last: ScoreError) -> Self {
        ScoreError::AllModelsUnavailable {
            source: Box::new(last),
        }
    }

    /// True when an API caller should answer with a server-error status
    ///
    /// Only rejected caller input and unknown documents are client errors.
    pub fn is_server_error(&self) -> bool {
        !matches!(self, ScoreError::InvalidInput(_) | ScoreError::NotFound(_))
    }

    /// Classify a sqlx error raised outside a retry loop
    pub fn from_sqlx(operation: &str, err: sqlx::Error) -> Self {
        if is_lock_error(&err) {
            ScoreError::TransientStore(format!("{}: {}", operation, err))
        } else {
            ScoreError::PersistentStore(format!("{}: {}", operation, err))
        }
    }
}

impl From<RetryError<sqlx::Error>> for ScoreError {
    fn from(err: RetryError<sqlx::Error>) -> Self {
        ScoreError::PersistentStore(err.to_string())
    }
}

impl From<bnews_common::Error> for ScoreError {
    fn from(err: bnews_common::Error) -> Self {
        match err {
            bnews_common::Error::Database(e) => ScoreError::from_sqlx("database", e),
            bnews_common::Error::Config(msg) => ScoreError::Validation(msg),
            err @ bnews_common::Error::ConfigNotFound(_) => ScoreError::Validation(err.to_string()),
            bnews_common::Error::Io(e) => ScoreError::Internal(format!("IO error: {}", e)),
            bnews_common::Error::Logging(msg) => ScoreError::Internal(msg),
        }
    }
}
