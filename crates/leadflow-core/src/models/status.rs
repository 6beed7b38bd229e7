use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use validator::Validate;

/// Upload lifecycle: `uploading -> uploaded -> processing -> {completed |
/// error | cancelled}`. `error` may re-enter `processing` through an explicit
/// recovery action; `completed` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploading,
    Uploaded,
    Processing,
    Completed,
    Error,
    Cancelled,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Cancelled)
    }

    /// Whether the state machine admits `self -> next`. Same-state updates
    /// are always allowed (counter refreshes do not change status).
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (Uploading, Uploaded)
                | (Uploading, Error)
                | (Uploading, Cancelled)
                | (Uploaded, Processing)
                | (Uploaded, Error)
                | (Uploaded, Cancelled)
                | (Processing, Completed)
                | (Processing, Error)
                | (Processing, Cancelled)
                | (Error, Processing)
        )
    }
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadStatus::Uploading => write!(f, "uploading"),
            UploadStatus::Uploaded => write!(f, "uploaded"),
            UploadStatus::Processing => write!(f, "processing"),
            UploadStatus::Completed => write!(f, "completed"),
            UploadStatus::Error => write!(f, "error"),
            UploadStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for UploadStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(UploadStatus::Uploading),
            "uploaded" => Ok(UploadStatus::Uploaded),
            "processing" => Ok(UploadStatus::Processing),
            "completed" => Ok(UploadStatus::Completed),
            "error" => Ok(UploadStatus::Error),
            "cancelled" => Ok(UploadStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid upload status: {}", s)),
        }
    }
}

/// Coarse pipeline stage, reported alongside the status for polling clients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    FileUpload,
    FileProcessing,
    BatchProcessing,
    Completed,
    Cancelled,
}

impl Display for ProcessingStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ProcessingStage::FileUpload => write!(f, "file_upload"),
            ProcessingStage::FileProcessing => write!(f, "file_processing"),
            ProcessingStage::BatchProcessing => write!(f, "batch_processing"),
            ProcessingStage::Completed => write!(f, "completed"),
            ProcessingStage::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for ProcessingStage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file_upload" => Ok(ProcessingStage::FileUpload),
            "file_processing" => Ok(ProcessingStage::FileProcessing),
            "batch_processing" => Ok(ProcessingStage::BatchProcessing),
            "completed" => Ok(ProcessingStage::Completed),
            "cancelled" => Ok(ProcessingStage::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid processing stage: {}", s)),
        }
    }
}

/// Batch counters for one upload. `percentage` is always derived from
/// `completed_batches / total_batches`, never caller-supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadProgress {
    pub total_batches: i64,
    pub completed_batches: i64,
    pub total_leads: i64,
    pub processed_leads: i64,
    pub created_leads: i64,
    pub updated_leads: i64,
    pub percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_seconds: Option<i64>,
    /// Batches per second, measured since `start_time`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_rate: Option<f64>,
    /// Advisory flag: clients should only render ETAs when this is true,
    /// which avoids flashing estimates for jobs that finish in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_estimates: Option<bool>,
}

/// Percentage derived from batch counters. Exact for whole-number ratios
/// (3/10 yields precisely 30.0); zero total batches yields 0.
pub fn completion_percentage(completed_batches: i64, total_batches: i64) -> f64 {
    if total_batches > 0 {
        (completed_batches as f64 * 100.0) / total_batches as f64
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub file_name: String,
    pub file_size: i64,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    /// Progress frozen at the moment of cancellation ("partial completion").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_progress: Option<UploadProgress>,
}

/// Structured error payload visible to polling clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusError {
    pub message: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl StatusError {
    pub fn new(
        message: impl Into<String>,
        code: impl Into<String>,
        recoverable: bool,
        retry_after_seconds: Option<u64>,
    ) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            timestamp: Utc::now(),
            recoverable,
            retry_after_seconds,
        }
    }
}

/// Per-upload progress record. Owned exclusively by the upload it tracks;
/// expires via the store's TTL mechanism once `expires_at` has passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStatusRecord {
    pub upload_id: String,
    pub status: UploadStatus,
    pub stage: ProcessingStage,
    pub progress: UploadProgress,
    pub metadata: UploadMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StatusError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Epoch seconds; the record is considered gone once this has passed.
    pub expires_at: i64,
}

impl ProcessingStatusRecord {
    pub fn new(
        upload_id: &str,
        file_name: &str,
        file_size: i64,
        initial_status: UploadStatus,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            upload_id: upload_id.to_string(),
            status: initial_status,
            stage: ProcessingStage::FileUpload,
            progress: UploadProgress::default(),
            metadata: UploadMetadata {
                file_name: file_name.to_string(),
                file_size,
                start_time: now,
                completed_at: None,
                cancelled_at: None,
                cancellation_reason: None,
                partial_progress: None,
            },
            error: None,
            created_at: now,
            updated_at: now,
            expires_at: (now + ttl).timestamp(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now.timestamp()
    }
}

/// Request to open progress tracking for one upload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewUploadRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Upload id must be between 1 and 255 characters"
    ))]
    pub upload_id: String,
    #[validate(length(
        min = 1,
        max = 255,
        message = "File name must be between 1 and 255 characters"
    ))]
    pub file_name: String,
    #[validate(range(min = 0, message = "File size cannot be negative"))]
    pub file_size: i64,
    #[serde(default)]
    pub initial_status: Option<UploadStatus>,
}

/// Partial progress update; absent counters keep their stored values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressUpdate {
    pub total_batches: Option<i64>,
    pub completed_batches: Option<i64>,
    pub total_leads: Option<i64>,
    pub processed_leads: Option<i64>,
    pub created_leads: Option<i64>,
    pub updated_leads: Option<i64>,
    /// Accepted for wire compatibility; the stored percentage is always
    /// recomputed from the batch counters server-side.
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataUpdate {
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<UploadStatus>,
    pub stage: Option<ProcessingStage>,
    pub progress: Option<ProgressUpdate>,
    pub metadata: Option<MetadataUpdate>,
}

/// Derived estimate fields, written (or cleared) as one group.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressEstimates {
    pub estimated_remaining_seconds: Option<i64>,
    pub processing_rate: Option<f64>,
    pub show_estimates: Option<bool>,
}

/// Field-targeted write against a status record. Only the fields a patch
/// carries are written; everything else — the batch counters above all —
/// keeps whatever value concurrent writers have put there. This is what
/// keeps counter-free updates from clobbering atomic increments that land
/// between a read and the write.
#[derive(Debug, Clone, Default)]
pub struct StatusPatch {
    pub status: Option<UploadStatus>,
    pub stage: Option<ProcessingStage>,
    pub total_batches: Option<i64>,
    pub completed_batches: Option<i64>,
    pub total_leads: Option<i64>,
    pub processed_leads: Option<i64>,
    pub created_leads: Option<i64>,
    pub updated_leads: Option<i64>,
    pub percentage: Option<f64>,
    pub estimates: Option<ProgressEstimates>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<StatusError>,
    pub clear_error: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub partial_progress: Option<UploadProgress>,
}

/// Counter deltas contributed by one finished batch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BatchCompletion {
    pub leads_processed: i64,
    pub leads_created: i64,
    pub leads_updated: i64,
}
