//! Leadflow Core Library
//!
//! This crate provides the domain models, error taxonomy, configuration, and
//! validation shared across all leadflow components. It performs no I/O; the
//! store abstraction lives in `leadflow-db` and the pipeline logic in
//! `leadflow-services`.

pub mod config;
pub mod email;
pub mod error;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use config::IngestConfig;
pub use email::{is_empty_email, normalize_email, NormalizedEmail, EMAIL_SENTINEL};
pub use error::{AppError, ErrorMetadata, LogLevel};
