//! Input validation helpers shared across services.

pub mod upload;

pub use upload::{validate_upload_id, MAX_UPLOAD_ID_LENGTH};
