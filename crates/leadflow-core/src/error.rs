//! Error types module
//!
//! All failures in the ingestion core are unified under [`AppError`].
//! Validation, conflict, and not-found errors are never retried and surface
//! immediately; database errors may be retried upstream when the store
//! throttled the request. The [`ErrorMetadata`] trait lets errors
//! self-describe the structured payload that polling clients see on a failed
//! upload.

use crate::models::status::StatusError;
use chrono::Utc;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like store throttling
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error reporting - defines how an error is presented to
/// polling clients and operators.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "DATABASE_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Retry hint in seconds, for recoverable errors
    fn retry_after_seconds(&self) -> Option<u64>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {message}")]
    Database { message: String, throttled: bool },

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Build the structured error payload stored on a ProcessingStatusRecord.
    pub fn to_status_error(&self) -> StatusError {
        StatusError {
            message: self.client_message(),
            code: self.error_code().to_string(),
            timestamp: Utc::now(),
            recoverable: self.is_recoverable(),
            retry_after_seconds: self.retry_after_seconds(),
        }
    }
}

impl ErrorMetadata for AppError {
    fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Database { .. } => "DATABASE_ERROR",
            AppError::ExternalApi(_) => "EXTERNAL_API_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Database { .. } | AppError::ExternalApi(_)
        )
    }

    fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            AppError::Database { throttled: true, .. } => Some(30),
            AppError::Database { throttled: false, .. } | AppError::ExternalApi(_) => Some(5),
            _ => None,
        }
    }

    fn client_message(&self) -> String {
        match self {
            // Store internals stay out of client-visible payloads.
            AppError::Database { .. } => "Failed to access the lead store".to_string(),
            AppError::Internal(_) => "Internal processing error".to_string(),
            AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::NotFound(msg)
            | AppError::ExternalApi(msg) => msg.clone(),
        }
    }

    fn log_level(&self) -> LogLevel {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) | AppError::NotFound(_) => {
                LogLevel::Debug
            }
            AppError::Database { throttled: true, .. } => LogLevel::Warn,
            AppError::Database { .. } | AppError::ExternalApi(_) | AppError::Internal(_) => {
                LogLevel::Error
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("Validation error: {}", err))
    }
}
