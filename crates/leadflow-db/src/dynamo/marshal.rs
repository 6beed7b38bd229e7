//! Attribute-map conversions for DynamoDB items.
//!
//! Status records use a flat attribute layout so counter fields can be
//! targeted by `ADD` update expressions; nested documents cannot. The
//! `error` and `partial_progress` payloads are opaque to queries and travel
//! as JSON strings.

use std::collections::HashMap;
use std::str::FromStr;

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use leadflow_core::email::normalize_email;
use leadflow_core::models::{
    LeadRecord, ProcessingStage, ProcessingStatusRecord, StatusError, UploadMetadata,
    UploadProgress, UploadStatus,
};

use crate::error::{StoreError, StoreResult};

pub(crate) type Item = HashMap<String, AttributeValue>;

pub(crate) fn s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

pub(crate) fn n(value: i64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

pub(crate) fn f(value: f64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

pub(crate) fn get_s(item: &Item, key: &str) -> StoreResult<String> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| StoreError::Serialization(format!("missing string attribute '{}'", key)))
}

fn get_opt_s(item: &Item, key: &str) -> Option<String> {
    item.get(key).and_then(|v| v.as_s().ok()).cloned()
}

pub(crate) fn get_n_i64(item: &Item, key: &str) -> StoreResult<i64> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| StoreError::Serialization(format!("missing numeric attribute '{}'", key)))
}

fn get_n_f64(item: &Item, key: &str) -> StoreResult<f64> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| StoreError::Serialization(format!("missing numeric attribute '{}'", key)))
}

fn get_opt_n_i64(item: &Item, key: &str) -> Option<i64> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|v| v.parse().ok())
}

fn get_opt_n_f64(item: &Item, key: &str) -> Option<f64> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|v| v.parse().ok())
}

fn get_opt_bool(item: &Item, key: &str) -> Option<bool> {
    item.get(key).and_then(|v| v.as_bool().ok()).copied()
}

fn get_datetime(item: &Item, key: &str) -> StoreResult<DateTime<Utc>> {
    parse_datetime(&get_s(item, key)?, key)
}

fn get_opt_datetime(item: &Item, key: &str) -> StoreResult<Option<DateTime<Utc>>> {
    match get_opt_s(item, key) {
        Some(raw) => Ok(Some(parse_datetime(&raw, key)?)),
        None => Ok(None),
    }
}

fn parse_datetime(raw: &str, key: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp in '{}': {}", key, e)))
}

pub(crate) fn lead_to_item(record: &LeadRecord) -> Item {
    HashMap::from([
        ("id".to_string(), s(record.id.to_string())),
        ("first_name".to_string(), s(&record.first_name)),
        ("last_name".to_string(), s(&record.last_name)),
        ("title".to_string(), s(&record.title)),
        ("company".to_string(), s(&record.company)),
        ("email".to_string(), s(record.email.as_str())),
        ("phone".to_string(), s(&record.phone)),
        ("remarks".to_string(), s(&record.remarks)),
        ("source_file".to_string(), s(&record.source_file)),
        ("created_at".to_string(), s(record.created_at.to_rfc3339())),
        ("updated_at".to_string(), s(record.updated_at.to_rfc3339())),
    ])
}

pub(crate) fn item_to_lead(item: &Item) -> StoreResult<LeadRecord> {
    let id = Uuid::parse_str(&get_s(item, "id")?)
        .map_err(|e| StoreError::Serialization(format!("bad lead id: {}", e)))?;
    Ok(LeadRecord {
        id,
        first_name: get_s(item, "first_name")?,
        last_name: get_s(item, "last_name")?,
        title: get_s(item, "title")?,
        company: get_s(item, "company")?,
        // normalize_email is idempotent, so stored values pass through.
        email: normalize_email(&get_s(item, "email")?),
        phone: get_s(item, "phone")?,
        remarks: get_s(item, "remarks")?,
        source_file: get_s(item, "source_file")?,
        created_at: get_datetime(item, "created_at")?,
        updated_at: get_datetime(item, "updated_at")?,
    })
}

pub(crate) fn status_to_item(record: &ProcessingStatusRecord) -> StoreResult<Item> {
    let mut item = HashMap::from([
        ("upload_id".to_string(), s(&record.upload_id)),
        ("status".to_string(), s(record.status.to_string())),
        ("stage".to_string(), s(record.stage.to_string())),
        ("total_batches".to_string(), n(record.progress.total_batches)),
        (
            "completed_batches".to_string(),
            n(record.progress.completed_batches),
        ),
        ("total_leads".to_string(), n(record.progress.total_leads)),
        (
            "processed_leads".to_string(),
            n(record.progress.processed_leads),
        ),
        ("created_leads".to_string(), n(record.progress.created_leads)),
        ("updated_leads".to_string(), n(record.progress.updated_leads)),
        ("percentage".to_string(), f(record.progress.percentage)),
        ("file_name".to_string(), s(&record.metadata.file_name)),
        ("file_size".to_string(), n(record.metadata.file_size)),
        (
            "start_time".to_string(),
            s(record.metadata.start_time.to_rfc3339()),
        ),
        ("created_at".to_string(), s(record.created_at.to_rfc3339())),
        ("updated_at".to_string(), s(record.updated_at.to_rfc3339())),
        ("expires_at".to_string(), n(record.expires_at)),
    ]);

    if let Some(eta) = record.progress.estimated_remaining_seconds {
        item.insert("estimated_remaining_seconds".to_string(), n(eta));
    }
    if let Some(rate) = record.progress.processing_rate {
        item.insert("processing_rate".to_string(), f(rate));
    }
    if let Some(show) = record.progress.show_estimates {
        item.insert("show_estimates".to_string(), AttributeValue::Bool(show));
    }
    if let Some(completed_at) = record.metadata.completed_at {
        item.insert("completed_at".to_string(), s(completed_at.to_rfc3339()));
    }
    if let Some(cancelled_at) = record.metadata.cancelled_at {
        item.insert("cancelled_at".to_string(), s(cancelled_at.to_rfc3339()));
    }
    if let Some(ref reason) = record.metadata.cancellation_reason {
        item.insert("cancellation_reason".to_string(), s(reason));
    }
    if let Some(ref partial) = record.metadata.partial_progress {
        let json = serde_json::to_string(partial)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        item.insert("partial_progress".to_string(), s(json));
    }
    if let Some(ref error) = record.error {
        let json =
            serde_json::to_string(error).map_err(|e| StoreError::Serialization(e.to_string()))?;
        item.insert("error".to_string(), s(json));
    }

    Ok(item)
}

pub(crate) fn item_to_status(item: &Item) -> StoreResult<ProcessingStatusRecord> {
    let status = UploadStatus::from_str(&get_s(item, "status")?)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let stage = ProcessingStage::from_str(&get_s(item, "stage")?)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    let partial_progress: Option<UploadProgress> = match get_opt_s(item, "partial_progress") {
        Some(json) => Some(
            serde_json::from_str(&json).map_err(|e| StoreError::Serialization(e.to_string()))?,
        ),
        None => None,
    };
    let error: Option<StatusError> = match get_opt_s(item, "error") {
        Some(json) => Some(
            serde_json::from_str(&json).map_err(|e| StoreError::Serialization(e.to_string()))?,
        ),
        None => None,
    };

    Ok(ProcessingStatusRecord {
        upload_id: get_s(item, "upload_id")?,
        status,
        stage,
        progress: UploadProgress {
            total_batches: get_n_i64(item, "total_batches")?,
            completed_batches: get_n_i64(item, "completed_batches")?,
            total_leads: get_n_i64(item, "total_leads")?,
            processed_leads: get_n_i64(item, "processed_leads")?,
            created_leads: get_n_i64(item, "created_leads")?,
            updated_leads: get_n_i64(item, "updated_leads")?,
            percentage: get_n_f64(item, "percentage")?,
            estimated_remaining_seconds: get_opt_n_i64(item, "estimated_remaining_seconds"),
            processing_rate: get_opt_n_f64(item, "processing_rate"),
            show_estimates: get_opt_bool(item, "show_estimates"),
        },
        metadata: UploadMetadata {
            file_name: get_s(item, "file_name")?,
            file_size: get_n_i64(item, "file_size")?,
            start_time: get_datetime(item, "start_time")?,
            completed_at: get_opt_datetime(item, "completed_at")?,
            cancelled_at: get_opt_datetime(item, "cancelled_at")?,
            cancellation_reason: get_opt_s(item, "cancellation_reason"),
            partial_progress,
        },
        error,
        created_at: get_datetime(item, "created_at")?,
        updated_at: get_datetime(item, "updated_at")?,
        expires_at: get_n_i64(item, "expires_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use leadflow_core::models::RawLead;

    #[test]
    fn test_lead_round_trip() {
        let raw = RawLead {
            first_name: Some("Ada".to_string()),
            email: Some("Ada@Acme.com".to_string()),
            ..Default::default()
        };
        let record = LeadRecord::from_raw(&raw, "leads.csv", Utc::now());
        let restored = item_to_lead(&lead_to_item(&record)).unwrap();
        assert_eq!(restored.id, record.id);
        assert_eq!(restored.email, record.email);
        assert_eq!(restored.first_name, "Ada");
        assert_eq!(restored.created_at, record.created_at);
    }

    #[test]
    fn test_status_round_trip_with_error() {
        let mut record = ProcessingStatusRecord::new(
            "upload-1",
            "leads.xlsx",
            1024,
            UploadStatus::Processing,
            Duration::hours(24),
        );
        record.progress.total_batches = 10;
        record.progress.completed_batches = 3;
        record.progress.percentage = 30.0;
        record.error = Some(StatusError::new("boom", "DATABASE_ERROR", true, Some(30)));

        let item = status_to_item(&record).unwrap();
        let restored = item_to_status(&item).unwrap();
        assert_eq!(restored.status, UploadStatus::Processing);
        assert_eq!(restored.progress.completed_batches, 3);
        assert_eq!(restored.progress.percentage, 30.0);
        assert_eq!(restored.error.unwrap().code, "DATABASE_ERROR");
        assert_eq!(restored.expires_at, record.expires_at);
    }

    #[test]
    fn test_missing_attribute_is_serialization_error() {
        let item: Item = HashMap::new();
        assert!(matches!(
            item_to_lead(&item),
            Err(StoreError::Serialization(_))
        ));
    }
}
