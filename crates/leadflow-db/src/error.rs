use thiserror::Error;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write did not match (record missing, already exists, or
    /// changed underneath us).
    #[error("Condition failed: {0}")]
    ConditionFailed(String),

    /// The store rejected the request due to capacity limits. Retryable.
    #[error("Store throttled the request: {0}")]
    Throttled(String),

    /// The email secondary index cannot serve queries right now.
    #[error("Email index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Only throttling is worth an automatic retry; everything else either
    /// cannot succeed on retry or signals a logic conflict.
    pub fn is_throttled(&self) -> bool {
        matches!(self, StoreError::Throttled(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
