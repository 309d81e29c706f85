use thiserror::Error;

use crate::storage::StorageError;

/// Failure taxonomy of the personalization core. Prediction paths log these and
/// degrade to defaults; only profile operations surface them to callers.
#[derive(Debug, Error)]
pub enum AdaptiveError {
    #[error("insufficient data: need {required} {what}, have {available}")]
    InsufficientData {
        what: &'static str,
        required: usize,
        available: usize,
    },
    #[error("no trained model for user {user_id} on topic {topic}")]
    ModelUnavailable { user_id: String, topic: String },
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("no profile for user {0}")]
    ProfileNotFound(String),
    #[error("training failed: {0}")]
    Training(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type AdaptiveResult<T> = Result<T, AdaptiveError>;
