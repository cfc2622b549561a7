//! Error types for the quiz-generation pipeline.

use crate::types::{GroupId, StepNumber};
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Record encoding error: {0}")]
    Codec(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Batch cannot be written: {0}")]
    InvalidBatch(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Backend(format!("sled: {}", err))
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Codec(err.to_string())
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Backend(format!("postgres: {}", err))
    }
}

impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::Backend(format!("migration failed: {}", err))
    }
}

/// Structural or semantic defect in a generated payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{stage} payload has {actual} items, expected {expected}")]
    WrongItemCount {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("stem item #{index} has a blank id")]
    BlankId { index: usize },

    #[error("duplicate stem id '{0}'")]
    DuplicateStemId(String),

    #[error("stem item '{0}' has a blank stem")]
    BlankStem(String),

    #[error("stem item '{0}' has a blank answer")]
    BlankAnswer(String),

    #[error("option item references unknown stem id '{0}'")]
    UnknownStemId(String),

    #[error("stem id '{0}' is covered by more than one option item")]
    DuplicateOptionId(String),

    #[error("option item '{id}' has {actual} choices, expected 4")]
    WrongChoiceCount { id: String, actual: usize },

    #[error("option item '{id}' has answer index {index} outside [0, 3]")]
    AnswerIndexOutOfRange { id: String, index: i64 },

    #[error("option item '{id}' repeats choice '{choice}'")]
    DuplicateChoice { id: String, choice: String },

    #[error("option item '{id}' has a {length}-character choice (max 255)")]
    ChoiceTooLong { id: String, length: usize },

    #[error("option item '{id}' points at a choice that is not the canonical answer")]
    AnswerMismatch { id: String },
}

/// Errors raised inside one generation attempt
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Study group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Study step not found: group={group_id} step={step}")]
    StepNotFound { group_id: GroupId, step: StepNumber },

    #[error("Invalid payload: {0}")]
    Validation(#[from] ValidationError),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Shuffle invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Generation interrupted")]
    Interrupted,

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl GenerationError {
    /// Whether the retry wrapper around an external call should try again.
    ///
    /// Validation failures and transport failures share one policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::Validation(_)
                | GenerationError::ProviderError(_)
                | GenerationError::ProviderRequestFailed(_)
                | GenerationError::ProviderAuthFailed(_)
                | GenerationError::ProviderRateLimit(_)
                | GenerationError::MalformedResponse(_)
        )
    }
}

impl From<config::ConfigError> for GenerationError {
    fn from(err: config::ConfigError) -> Self {
        GenerationError::ConfigError(err.to_string())
    }
}
