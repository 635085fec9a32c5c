//! Store error types

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a document store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Driver-level failure, passed through verbatim
    #[error("{0}")]
    Driver(String),

    /// Pipeline construct the store cannot execute
    #[error("unsupported pipeline construct: {0}")]
    Unsupported(String),

    /// Stage body is structurally invalid
    #[error("invalid stage {stage}: {reason}")]
    InvalidStage { stage: String, reason: String },

    /// Internal lock was poisoned by a panicking writer
    #[error("store state unavailable: lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        StoreError::Driver(message.into())
    }

    pub fn unsupported(construct: impl Into<String>) -> Self {
        StoreError::Unsupported(construct.into())
    }

    pub(crate) fn invalid_stage(stage: &str, reason: impl Into<String>) -> Self {
        StoreError::InvalidStage {
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }
}
