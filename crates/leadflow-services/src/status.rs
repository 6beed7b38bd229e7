//! Upload status tracking.
//!
//! Each upload owns one status record walking the lifecycle
//! `uploading -> uploaded -> processing -> {completed | error | cancelled}`.
//! Records carry a sliding TTL refreshed on every write, and counter
//! increments go through the store's atomic add so concurrent batch
//! completions never lose updates.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use validator::Validate;

use leadflow_core::models::{
    completion_percentage, BatchCompletion, NewUploadRequest, ProcessingStage,
    ProcessingStatusRecord, ProgressEstimates, StatusError, StatusPatch, UpdateStatusRequest,
    UploadStatus,
};
use leadflow_core::validation::validate_upload_id;
use leadflow_core::{AppError, IngestConfig};

use crate::map_store_error;
use leadflow_db::{with_backoff, RetryPolicy, StatusStore, StoreError};

/// Estimates are meaningless in the first seconds of a job.
const ESTIMATE_MIN_ELAPSED_SECS: f64 = 5.0;
/// Jobs projected to finish faster than this never show an ETA.
const ESTIMATE_DISPLAY_THRESHOLD_SECS: f64 = 30.0;

pub struct StatusService {
    store: Arc<dyn StatusStore>,
    retry: RetryPolicy,
    ttl: Duration,
}

impl StatusService {
    pub fn new(store: Arc<dyn StatusStore>, retry: RetryPolicy, ttl_hours: i64) -> Self {
        Self {
            store,
            retry,
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn from_config(store: Arc<dyn StatusStore>, config: &IngestConfig) -> Self {
        Self::new(
            store,
            RetryPolicy::from_config(config),
            config.status_ttl_hours,
        )
    }

    /// Open status tracking for a new upload.
    #[tracing::instrument(skip(self, request), fields(upload_id = %request.upload_id))]
    pub async fn create(
        &self,
        request: NewUploadRequest,
    ) -> Result<ProcessingStatusRecord, AppError> {
        request.validate()?;
        validate_upload_id(&request.upload_id)?;

        let record = ProcessingStatusRecord::new(
            &request.upload_id,
            &request.file_name,
            request.file_size,
            request.initial_status.unwrap_or(UploadStatus::Uploading),
            self.ttl,
        );

        match with_backoff(&self.retry, "status_create", || self.store.create(&record)).await {
            Ok(()) => {
                tracing::info!(upload_id = %record.upload_id, "Status record created");
                Ok(record)
            }
            Err(StoreError::ConditionFailed(_)) => Err(AppError::Conflict(format!(
                "upload {} already has a status record",
                request.upload_id
            ))),
            Err(e) => Err(map_store_error(e)),
        }
    }

    /// Fetch the current record. Expired records are reported as missing
    /// even if the store has not reaped them yet.
    pub async fn get(&self, upload_id: &str) -> Result<ProcessingStatusRecord, AppError> {
        validate_upload_id(upload_id)?;
        let record = with_backoff(&self.retry, "status_get", || self.store.get(upload_id))
            .await
            .map_err(map_store_error)?;

        record
            .filter(|r| !r.is_expired(Utc::now()))
            .ok_or_else(|| AppError::NotFound(format!("no status record for upload {}", upload_id)))
    }

    /// Apply a partial update: status transition, stage, counters, metadata.
    /// Rejected transitions surface as conflicts; the percentage and ETA
    /// fields are recomputed server-side whenever counters are supplied.
    ///
    /// The write is a field-targeted patch, never a whole-record replace:
    /// counter fields the request does not carry stay out of the write, so
    /// a stage or metadata refresh can race concurrent
    /// `increment_batch_completion` calls without losing increments.
    #[tracing::instrument(skip(self, request), fields(upload_id = %upload_id))]
    pub async fn update(
        &self,
        upload_id: &str,
        request: UpdateStatusRequest,
    ) -> Result<ProcessingStatusRecord, AppError> {
        let record = self.get(upload_id).await?;
        let now = Utc::now();
        let mut patch = StatusPatch {
            stage: request.stage,
            ..Default::default()
        };

        if let Some(next) = request.status {
            if !record.status.can_transition_to(next) {
                return Err(AppError::Conflict(format!(
                    "upload {} cannot move from {} to {}",
                    upload_id, record.status, next
                )));
            }
            patch.status = Some(next);
        }
        if let Some(progress) = request.progress {
            // Derive percentage and estimates from the merged view; only the
            // supplied counters enter the patch.
            let mut merged = record.clone();
            if let Some(next) = patch.status {
                merged.status = next;
            }
            if let Some(v) = progress.total_batches {
                merged.progress.total_batches = v;
                patch.total_batches = Some(v);
            }
            if let Some(v) = progress.completed_batches {
                merged.progress.completed_batches = v;
                patch.completed_batches = Some(v);
            }
            if let Some(v) = progress.total_leads {
                merged.progress.total_leads = v;
                patch.total_leads = Some(v);
            }
            if let Some(v) = progress.processed_leads {
                merged.progress.processed_leads = v;
                patch.processed_leads = Some(v);
            }
            if let Some(v) = progress.created_leads {
                merged.progress.created_leads = v;
                patch.created_leads = Some(v);
            }
            if let Some(v) = progress.updated_leads {
                merged.progress.updated_leads = v;
                patch.updated_leads = Some(v);
            }
            merged.progress.percentage = completion_percentage(
                merged.progress.completed_batches,
                merged.progress.total_batches,
            );
            apply_estimates(&mut merged, now);
            patch.percentage = Some(merged.progress.percentage);
            patch.estimates = Some(ProgressEstimates {
                estimated_remaining_seconds: merged.progress.estimated_remaining_seconds,
                processing_rate: merged.progress.processing_rate,
                show_estimates: merged.progress.show_estimates,
            });
        }
        if let Some(metadata) = request.metadata {
            patch.file_name = metadata.file_name;
            patch.file_size = metadata.file_size;
        }

        if patch.status == Some(UploadStatus::Completed) {
            patch.stage = Some(ProcessingStage::Completed);
            if record.metadata.completed_at.is_none() {
                patch.completed_at = Some(now);
            }
        }

        self.apply(upload_id, patch, now).await
    }

    /// Record one batch's completion through the store's atomic counter add.
    /// Never reads-then-writes the counters: concurrent callers all land.
    #[tracing::instrument(skip(self, completion), fields(upload_id = %upload_id))]
    pub async fn increment_batch_completion(
        &self,
        upload_id: &str,
        completion: BatchCompletion,
    ) -> Result<ProcessingStatusRecord, AppError> {
        validate_upload_id(upload_id)?;
        let now = Utc::now();
        let expires_at = (now + self.ttl).timestamp();

        match with_backoff(&self.retry, "status_increment", || {
            self.store
                .add_batch_completion(upload_id, &completion, now, expires_at)
        })
        .await
        {
            Ok(record) => {
                if record.status == UploadStatus::Completed {
                    tracing::info!(
                        upload_id = %upload_id,
                        total_batches = record.progress.total_batches,
                        processed_leads = record.progress.processed_leads,
                        "Upload completed"
                    );
                }
                Ok(record)
            }
            Err(StoreError::ConditionFailed(_)) => Err(AppError::NotFound(format!(
                "no status record for upload {}",
                upload_id
            ))),
            Err(e) => Err(map_store_error(e)),
        }
    }

    /// Mark the upload failed. Terminal uploads cannot fail retroactively.
    #[tracing::instrument(skip(self, error), fields(upload_id = %upload_id, code = %error.code))]
    pub async fn set_error(
        &self,
        upload_id: &str,
        error: StatusError,
    ) -> Result<ProcessingStatusRecord, AppError> {
        let record = self.get(upload_id).await?;
        if !record.status.can_transition_to(UploadStatus::Error) {
            return Err(AppError::Conflict(format!(
                "upload {} is {} and cannot move to error",
                upload_id, record.status
            )));
        }
        let patch = StatusPatch {
            status: Some(UploadStatus::Error),
            error: Some(error),
            ..Default::default()
        };
        self.apply(upload_id, patch, Utc::now()).await
    }

    /// Cancel the upload, freezing the progress made so far.
    #[tracing::instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn cancel(
        &self,
        upload_id: &str,
        reason: Option<String>,
    ) -> Result<ProcessingStatusRecord, AppError> {
        let record = self.get(upload_id).await?;
        if matches!(
            record.status,
            UploadStatus::Completed | UploadStatus::Error | UploadStatus::Cancelled
        ) {
            return Err(AppError::Conflict(format!(
                "upload {} is {} and cannot be cancelled",
                upload_id, record.status
            )));
        }

        let now = Utc::now();
        let patch = StatusPatch {
            status: Some(UploadStatus::Cancelled),
            stage: Some(ProcessingStage::Cancelled),
            cancelled_at: Some(now),
            cancellation_reason: reason,
            partial_progress: Some(record.progress.clone()),
            ..Default::default()
        };

        tracing::info!(
            upload_id = %upload_id,
            completed_batches = record.progress.completed_batches,
            "Upload cancelled"
        );
        self.apply(upload_id, patch, now).await
    }

    /// Resume a failed upload. Only errored records whose error is marked
    /// recoverable can go back to processing.
    #[tracing::instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn recover(&self, upload_id: &str) -> Result<ProcessingStatusRecord, AppError> {
        let record = self.get(upload_id).await?;
        let recoverable = record.status == UploadStatus::Error
            && record.error.as_ref().is_some_and(|e| e.recoverable);
        if !recoverable {
            return Err(AppError::Conflict(format!(
                "upload {} is not in a recoverable error state",
                upload_id
            )));
        }

        let patch = StatusPatch {
            status: Some(UploadStatus::Processing),
            stage: Some(ProcessingStage::BatchProcessing),
            clear_error: true,
            ..Default::default()
        };
        self.apply(upload_id, patch, Utc::now()).await
    }

    async fn apply(
        &self,
        upload_id: &str,
        patch: StatusPatch,
        now: DateTime<Utc>,
    ) -> Result<ProcessingStatusRecord, AppError> {
        // Sliding expiry: every write buys the record another full TTL.
        let expires_at = (now + self.ttl).timestamp();

        match with_backoff(&self.retry, "status_patch", || {
            self.store.apply_patch(upload_id, &patch, now, expires_at)
        })
        .await
        {
            Ok(record) => Ok(record),
            Err(StoreError::ConditionFailed(_)) => Err(AppError::NotFound(format!(
                "no status record for upload {}",
                upload_id
            ))),
            Err(e) => Err(map_store_error(e)),
        }
    }
}

/// Recompute rate and ETA from elapsed time and batch counters. Estimates
/// only appear once the job has run long enough to measure, and the
/// display flag only turns on for jobs projected to run past the threshold.
fn apply_estimates(record: &mut ProcessingStatusRecord, now: DateTime<Utc>) {
    let completed = record.progress.completed_batches;
    let total = record.progress.total_batches;
    let elapsed_secs = (now - record.metadata.start_time).num_milliseconds() as f64 / 1000.0;

    let measurable = record.status == UploadStatus::Processing
        && elapsed_secs >= ESTIMATE_MIN_ELAPSED_SECS
        && completed > 0
        && completed < total;

    if measurable {
        let rate = completed as f64 / elapsed_secs;
        let remaining_secs = (total - completed) as f64 / rate;
        record.progress.processing_rate = Some(rate);
        record.progress.estimated_remaining_seconds = Some(remaining_secs.ceil() as i64);
        record.progress.show_estimates =
            Some(elapsed_secs + remaining_secs > ESTIMATE_DISPLAY_THRESHOLD_SECS);
    } else {
        record.progress.processing_rate = None;
        record.progress.estimated_remaining_seconds = None;
        record.progress.show_estimates = None;
    }
}
