//! Domain models for the lead ingestion pipeline.

pub mod audit;
pub mod lead;
pub mod status;

pub use audit::{DuplicateAction, DuplicateActionLog};
pub use lead::{LeadRecord, RawLead, FIELD_PLACEHOLDER};
pub use status::{
    completion_percentage, BatchCompletion, MetadataUpdate, NewUploadRequest, ProcessingStage,
    ProcessingStatusRecord, ProgressEstimates, ProgressUpdate, StatusError, StatusPatch,
    UpdateStatusRequest, UploadMetadata, UploadProgress, UploadStatus,
};
