mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{init_tracing, make_status_service};
use leadflow_core::models::{
    BatchCompletion, NewUploadRequest, ProcessingStage, ProcessingStatusRecord, ProgressUpdate,
    StatusError, UpdateStatusRequest, UploadStatus,
};
use leadflow_core::AppError;
use leadflow_db::StatusStore;
use leadflow_services::StatusService;

fn new_request(upload_id: &str) -> NewUploadRequest {
    NewUploadRequest {
        upload_id: upload_id.to_string(),
        file_name: "leads.xlsx".to_string(),
        file_size: 4096,
        initial_status: None,
    }
}

async fn start_processing(service: &StatusService, upload_id: &str, total_batches: i64) {
    service.create(new_request(upload_id)).await.unwrap();
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
async fn test_full_lifecycle_to_completed() {
    init_tracing();
    let (_, service) = make_status_service();
    start_processing(&service, "upload-1", 2).await;

    let completion = BatchCompletion {
        leads_processed: 50,
        leads_created: 45,
        leads_updated: 5,
    };
    let mid = service
        .increment_batch_completion("upload-1", completion)
        .await
        .unwrap();
    assert_eq!(mid.status, UploadStatus::Processing);
    assert_eq!(mid.progress.percentage, 50.0);

    let done = service
        .increment_batch_completion("upload-1", completion)
        .await
        .unwrap();
    assert_eq!(done.status, UploadStatus::Completed);
    assert_eq!(done.stage, ProcessingStage::Completed);
    assert_eq!(done.progress.percentage, 100.0);
    assert_eq!(done.progress.processed_leads, 100);
    assert_eq!(done.progress.created_leads, 90);
    assert!(done.metadata.completed_at.is_some());
}

#[tokio::test]
async fn test_concurrent_increments_all_land() {
    init_tracing();
    let (_, service) = make_status_service();
    let service = Arc::new(service);
    let total: i64 = 10;
    start_processing(&service, "upload-1", total).await;

    let mut handles = Vec::new();
    for _ in 0..total {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .increment_batch_completion(
                    "upload-1",
                    BatchCompletion {
                        leads_processed: 10,
                        leads_created: 10,
                        leads_updated: 0,
                    },
                )
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let record = service.get("upload-1").await.unwrap();
    // Atomic adds: ten concurrent completions always total ten.
    assert_eq!(record.progress.completed_batches, total);
    assert_eq!(record.progress.processed_leads, 100);
    assert_eq!(record.progress.percentage, 100.0);
    assert_eq!(record.status, UploadStatus::Completed);
}

#[tokio::test]
async fn test_stage_updates_do_not_clobber_concurrent_increments() {
    init_tracing();
    let (_, service) = make_status_service();
    let service = Arc::new(service);
    let total: i64 = 20;
    start_processing(&service, "upload-1", total).await;

    // Interleave counter-free stage refreshes with the batch completions.
    // The refreshes read the record too, but since they only patch the
    // fields they carry, none of the increments can be overwritten with a
    // stale counter value.
    let mut handles = Vec::new();
    for i in 0..total {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .increment_batch_completion(
                    "upload-1",
                    BatchCompletion {
                        leads_processed: 5,
                        leads_created: 5,
                        leads_updated: 0,
                    },
                )
                .await
                .unwrap();
            if i % 2 == 0 {
                service
                    .update(
                        "upload-1",
                        UpdateStatusRequest {
                            stage: Some(ProcessingStage::BatchProcessing),
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let record = service.get("upload-1").await.unwrap();
    assert_eq!(record.progress.completed_batches, total);
    assert_eq!(record.progress.processed_leads, 100);
    assert_eq!(record.status, UploadStatus::Completed);
}

#[tokio::test]
async fn test_completed_upload_cannot_be_cancelled() {
    init_tracing();
    let (_, service) = make_status_service();
    start_processing(&service, "upload-1", 1).await;
    let done = service
        .increment_batch_completion(
            "upload-1",
            BatchCompletion {
                leads_processed: 10,
                leads_created: 10,
                leads_updated: 0,
            },
        )
        .await
        .unwrap();
    assert_eq!(done.status, UploadStatus::Completed);

    let err = service
        .cancel("upload-1", Some("too late".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // The rejected cancel leaves the record exactly as completion wrote it.
    let record = service.get("upload-1").await.unwrap();
    assert_eq!(record.status, UploadStatus::Completed);
    assert_eq!(record.progress.completed_batches, 1);
    assert!(record.metadata.cancelled_at.is_none());
    assert!(record.metadata.cancellation_reason.is_none());
    assert!(record.metadata.partial_progress.is_none());
    assert_eq!(record.updated_at, done.updated_at);
}

#[tokio::test]
async fn test_invalid_transition_is_a_conflict() {
    init_tracing();
    let (_, service) = make_status_service();
    service.create(new_request("upload-1")).await.unwrap();

    // uploading -> processing skips the uploaded step.
    let err = service
        .update(
            "upload-1",
            UpdateStatusRequest {
                status: Some(UploadStatus::Processing),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_duplicate_create_is_a_conflict() {
    init_tracing();
    let (_, service) = make_status_service();
    service.create(new_request("upload-1")).await.unwrap();
    let err = service.create(new_request("upload-1")).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_cancel_freezes_partial_progress() {
    init_tracing();
    let (_, service) = make_status_service();
    start_processing(&service, "upload-1", 4).await;
    service
        .increment_batch_completion(
            "upload-1",
            BatchCompletion {
                leads_processed: 25,
                leads_created: 25,
                leads_updated: 0,
            },
        )
        .await
        .unwrap();

    let cancelled = service
        .cancel("upload-1", Some("user requested".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, UploadStatus::Cancelled);
    assert_eq!(cancelled.stage, ProcessingStage::Cancelled);
    assert!(cancelled.metadata.cancelled_at.is_some());
    let partial = cancelled.metadata.partial_progress.unwrap();
    assert_eq!(partial.completed_batches, 1);
    assert_eq!(partial.processed_leads, 25);

    // Cancelling twice conflicts.
    let err = service.cancel("upload-1", None).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_error_then_recover() {
    init_tracing();
    let (_, service) = make_status_service();
    start_processing(&service, "upload-1", 4).await;

    let failed = service
        .set_error(
            "upload-1",
            StatusError::new("store throttled", "DATABASE_ERROR", true, Some(30)),
        )
        .await
        .unwrap();
    assert_eq!(failed.status, UploadStatus::Error);

    // An errored upload cannot be cancelled, only recovered.
    let err = service.cancel("upload-1", None).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let recovered = service.recover("upload-1").await.unwrap();
    assert_eq!(recovered.status, UploadStatus::Processing);
    assert_eq!(recovered.stage, ProcessingStage::BatchProcessing);
    assert!(recovered.error.is_none());
}

#[tokio::test]
async fn test_unrecoverable_error_cannot_recover() {
    init_tracing();
    let (_, service) = make_status_service();
    start_processing(&service, "upload-1", 4).await;
    service
        .set_error(
            "upload-1",
            StatusError::new("bad file", "VALIDATION_ERROR", false, None),
        )
        .await
        .unwrap();

    let err = service.recover("upload-1").await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_expired_record_reads_as_missing() {
    init_tracing();
    let (store, service) = make_status_service();

    let mut record = ProcessingStatusRecord::new(
        "upload-1",
        "leads.xlsx",
        100,
        UploadStatus::Processing,
        Duration::hours(24),
    );
    record.expires_at = (Utc::now() - Duration::hours(1)).timestamp();
    store.create(&record).await.unwrap();

    let err = service.get("upload-1").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_throttled_store_is_retried() {
    init_tracing();
    let store = Arc::new(leadflow_db::MemoryStatusStore::new());
    let fast_retry = leadflow_db::RetryPolicy {
        base_delay_ms: 1,
        max_delay_ms: 4,
        max_attempts: 3,
    };
    let service = StatusService::new(store.clone(), fast_retry, 24);
    service.create(new_request("upload-1")).await.unwrap();

    store.inject_throttles(2);
    let record = service.get("upload-1").await.unwrap();
    assert_eq!(record.upload_id, "upload-1");
}

#[tokio::test]
async fn test_invalid_upload_id_rejected() {
    init_tracing();
    let (_, service) = make_status_service();
    let err = service.get("not a valid id!").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
