//! Business logic for lead ingestion: in-batch duplicate resolution,
//! email-keyed upserts, batch processing with per-record failure isolation,
//! and upload status tracking.

pub mod batch;
pub mod dedup;
pub mod status;
pub mod upsert;

pub use batch::{BatchProcessor, BatchResult, BatchStats};
pub use dedup::{resolve_duplicates, ResolvedBatch};
pub use status::StatusService;
pub use upsert::{UpsertEngine, UpsertOutcome};

use leadflow_core::AppError;
use leadflow_db::StoreError;

/// Lift store-level failures into the application error taxonomy.
pub(crate) fn map_store_error(err: StoreError) -> AppError {
    match err {
        StoreError::ConditionFailed(msg) => AppError::Conflict(msg),
        StoreError::NotFound(msg) => AppError::NotFound(msg),
        StoreError::Throttled(msg) => AppError::Database {
            message: msg,
            throttled: true,
        },
        StoreError::IndexUnavailable(msg) | StoreError::Other(msg) => AppError::Database {
            message: msg,
            throttled: false,
        },
        StoreError::Serialization(msg) => AppError::Internal(msg),
    }
}
