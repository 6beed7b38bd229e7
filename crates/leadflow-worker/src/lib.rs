//! Batch worker: runs one batch through the ingestion pipeline and keeps the
//! upload's status record in sync with the outcome.

use leadflow_core::models::{BatchCompletion, RawLead, UploadStatus};
use leadflow_core::AppError;
use leadflow_services::{BatchProcessor, BatchResult, StatusService};

pub struct BatchWorker {
    processor: BatchProcessor,
    status: StatusService,
}

impl BatchWorker {
    pub fn new(processor: BatchProcessor, status: StatusService) -> Self {
        Self { processor, status }
    }

    /// Process one batch for an upload. Returns `Ok(None)` when the upload
    /// was cancelled and the batch was skipped. On failure the error is
    /// written to the status record before propagating.
    #[tracing::instrument(skip(self, records), fields(upload_id = %upload_id, records = records.len()))]
    pub async fn process_batch(
        &self,
        upload_id: &str,
        records: Vec<RawLead>,
        source_file: &str,
    ) -> Result<Option<BatchResult>, AppError> {
        let record = self.status.get(upload_id).await?;
        if record.status == UploadStatus::Cancelled {
            tracing::info!(upload_id = %upload_id, "Upload cancelled, skipping batch");
            return Ok(None);
        }

        match self
            .processor
            .batch_upsert_or_fallback(records, source_file)
            .await
        {
            Ok(result) => {
                let completion = BatchCompletion {
                    leads_processed: (result.stats.created + result.stats.updated) as i64,
                    leads_created: result.stats.created as i64,
                    leads_updated: result.stats.updated as i64,
                };
                self.status
                    .increment_batch_completion(upload_id, completion)
                    .await?;
                Ok(Some(result))
            }
            Err(err) => {
                let status_error = err.to_status_error();
                if let Err(report_err) = self.status.set_error(upload_id, status_error).await {
                    tracing::error!(
                        upload_id = %upload_id,
                        error = %report_err,
                        "Failed to record batch error on status record"
                    );
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::models::{
        NewUploadRequest, ProcessingStage, ProgressUpdate, UpdateStatusRequest,
    };
    use leadflow_db::{MemoryLeadStore, MemoryStatusStore, RetryPolicy};
    use leadflow_services::UpsertEngine;
    use std::sync::Arc;

    struct Fixture {
        lead_store: Arc<MemoryLeadStore>,
        status_service: StatusService,
        worker: BatchWorker,
    }

    fn fixture() -> Fixture {
        let lead_store = Arc::new(MemoryLeadStore::new());
        let status_store = Arc::new(MemoryStatusStore::new());
        let status_service =
            StatusService::new(status_store.clone(), RetryPolicy::default(), 24);
        let worker = BatchWorker::new(
            BatchProcessor::new(UpsertEngine::new(lead_store.clone()), 100),
            StatusService::new(status_store, RetryPolicy::default(), 24),
        );
        Fixture {
            lead_store,
            status_service,
            worker,
        }
    }

    fn raw(first: &str, email: &str) -> RawLead {
        RawLead {
            first_name: Some(first.to_string()),
            email: Some(email.to_string()),
            ..Default::default()
        }
    }

    async fn start_upload(service: &StatusService, upload_id: &str, total_batches: i64) {
        service
            .create(NewUploadRequest {
                upload_id: upload_id.to_string(),
                file_name: "leads.xlsx".to_string(),
                file_size: 1024,
                initial_status: None,
            })
            .await
            .unwrap();
        service
            .update(
                upload_id,
                UpdateStatusRequest {
                    status: Some(UploadStatus::Uploaded),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service
            .update(
                upload_id,
                UpdateStatusRequest {
                    status: Some(UploadStatus::Processing),
                    stage: Some(ProcessingStage::BatchProcessing),
                    progress: Some(ProgressUpdate {
                        total_batches: Some(total_batches),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_batch_advances_status() {
        let fx = fixture();
        start_upload(&fx.status_service, "upload-1", 1).await;

        let result = fx
            .worker
            .process_batch(
                "upload-1",
                vec![raw("John", "john@acme.com"), raw("Jane", "jane@acme.com")],
                "leads.xlsx",
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.stats.created, 2);
        assert_eq!(fx.lead_store.len(), 2);

        let status = fx.status_service.get("upload-1").await.unwrap();
        assert_eq!(status.status, UploadStatus::Completed);
        assert_eq!(status.progress.created_leads, 2);
    }

    #[tokio::test]
    async fn test_cancelled_upload_skips_batch() {
        let fx = fixture();
        start_upload(&fx.status_service, "upload-1", 2).await;
        fx.status_service
            .cancel("upload-1", Some("user stop".to_string()))
            .await
            .unwrap();

        let outcome = fx
            .worker
            .process_batch("upload-1", vec![raw("John", "john@acme.com")], "leads.xlsx")
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(fx.lead_store.is_empty());
    }

    #[tokio::test]
    async fn test_batch_failure_lands_on_status_record() {
        let fx = fixture();
        start_upload(&fx.status_service, "upload-1", 1).await;
        fx.lead_store.set_fail_all_puts(true);

        let err = fx
            .worker
            .process_batch("upload-1", vec![raw("John", "john@acme.com")], "leads.xlsx")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database { .. }));

        let status = fx.status_service.get("upload-1").await.unwrap();
        assert_eq!(status.status, UploadStatus::Error);
        let status_error = status.error.unwrap();
        assert_eq!(status_error.code, "DATABASE_ERROR");
        assert!(status_error.recoverable);
    }
}
