use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};

use leadflow_core::models::{
    completion_percentage, BatchCompletion, ProcessingStage, ProcessingStatusRecord, StatusPatch,
    UploadStatus,
};

use crate::dynamo::classify_sdk_error;
use crate::dynamo::marshal::{f, item_to_status, n, s, status_to_item};
use crate::error::{StoreError, StoreResult};
use crate::store::StatusStore;

/// Status store backed by a DynamoDB table keyed by upload id, with native
/// TTL on the `expires_at` attribute.
#[derive(Clone)]
pub struct DynamoStatusStore {
    client: Client,
    table: String,
}

impl DynamoStatusStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl StatusStore for DynamoStatusStore {
    async fn create(&self, record: &ProcessingStatusRecord) -> StoreResult<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(status_to_item(record)?))
            .condition_expression("attribute_not_exists(upload_id)")
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;
        Ok(())
    }

    async fn get(&self, upload_id: &str) -> StoreResult<Option<ProcessingStatusRecord>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("upload_id", s(upload_id))
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        match output.item() {
            Some(item) => Ok(Some(item_to_status(item)?)),
            None => Ok(None),
        }
    }

    async fn apply_patch(
        &self,
        upload_id: &str,
        patch: &StatusPatch,
        now: DateTime<Utc>,
        expires_at: i64,
    ) -> StoreResult<ProcessingStatusRecord> {
        // One update expression touching exactly the attributes the patch
        // carries. Counters stay out of the expression unless supplied, so
        // this write can race ADD-based increments without losing them.
        let mut sets = vec!["updated_at = :now".to_string(), "expires_at = :exp".to_string()];
        let mut removes: Vec<&str> = Vec::new();

        let mut update = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("upload_id", s(upload_id))
            .condition_expression("attribute_exists(upload_id)")
            .expression_attribute_values(":now", s(now.to_rfc3339()))
            .expression_attribute_values(":exp", n(expires_at))
            .return_values(ReturnValue::AllNew);

        if let Some(status) = patch.status {
            sets.push("#s = :status".to_string());
            update = update
                .expression_attribute_names("#s", "status")
                .expression_attribute_values(":status", s(status.to_string()));
        }
        if let Some(stage) = patch.stage {
            sets.push("#st = :stage".to_string());
            update = update
                .expression_attribute_names("#st", "stage")
                .expression_attribute_values(":stage", s(stage.to_string()));
        }
        for (attr, placeholder, value) in [
            ("total_batches", ":tb", patch.total_batches),
            ("completed_batches", ":cb", patch.completed_batches),
            ("total_leads", ":tl", patch.total_leads),
            ("processed_leads", ":pl", patch.processed_leads),
            ("created_leads", ":cl", patch.created_leads),
            ("updated_leads", ":ul", patch.updated_leads),
        ] {
            if let Some(v) = value {
                sets.push(format!("{} = {}", attr, placeholder));
                update = update.expression_attribute_values(placeholder, n(v));
            }
        }
        if let Some(pct) = patch.percentage {
            sets.push("#pct = :pct".to_string());
            update = update
                .expression_attribute_names("#pct", "percentage")
                .expression_attribute_values(":pct", f(pct));
        }
        if let Some(est) = patch.estimates {
            match est.estimated_remaining_seconds {
                Some(v) => {
                    sets.push("estimated_remaining_seconds = :eta".to_string());
                    update = update.expression_attribute_values(":eta", n(v));
                }
                None => removes.push("estimated_remaining_seconds"),
            }
            match est.processing_rate {
                Some(v) => {
                    sets.push("processing_rate = :rate".to_string());
                    update = update.expression_attribute_values(":rate", f(v));
                }
                None => removes.push("processing_rate"),
            }
            match est.show_estimates {
                Some(v) => {
                    sets.push("show_estimates = :show".to_string());
                    update = update
                        .expression_attribute_values(":show", AttributeValue::Bool(v));
                }
                None => removes.push("show_estimates"),
            }
        }
        if let Some(ref file_name) = patch.file_name {
            sets.push("file_name = :fname".to_string());
            update = update.expression_attribute_values(":fname", s(file_name));
        }
        if let Some(file_size) = patch.file_size {
            sets.push("file_size = :fsize".to_string());
            update = update.expression_attribute_values(":fsize", n(file_size));
        }
        if let Some(completed_at) = patch.completed_at {
            sets.push("completed_at = :done".to_string());
            update = update.expression_attribute_values(":done", s(completed_at.to_rfc3339()));
        }
        if let Some(ref error) = patch.error {
            let json = serde_json::to_string(error)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            sets.push("#err = :err".to_string());
            update = update
                .expression_attribute_names("#err", "error")
                .expression_attribute_values(":err", s(json));
        } else if patch.clear_error {
            removes.push("#err");
            update = update.expression_attribute_names("#err", "error");
        }
        if let Some(cancelled_at) = patch.cancelled_at {
            sets.push("cancelled_at = :cat".to_string());
            update = update.expression_attribute_values(":cat", s(cancelled_at.to_rfc3339()));
        }
        if let Some(ref reason) = patch.cancellation_reason {
            sets.push("cancellation_reason = :why".to_string());
            update = update.expression_attribute_values(":why", s(reason));
        }
        if let Some(ref partial) = patch.partial_progress {
            let json = serde_json::to_string(partial)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            sets.push("partial_progress = :pp".to_string());
            update = update.expression_attribute_values(":pp", s(json));
        }

        let mut expression = format!("SET {}", sets.join(", "));
        if !removes.is_empty() {
            expression.push_str(" REMOVE ");
            expression.push_str(&removes.join(", "));
        }

        let output = update
            .update_expression(expression)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;
        let item = output
            .attributes()
            .ok_or_else(|| StoreError::Other("update returned no attributes".to_string()))?;
        item_to_status(item)
    }

    async fn add_batch_completion(
        &self,
        upload_id: &str,
        completion: &BatchCompletion,
        now: DateTime<Utc>,
        expires_at: i64,
    ) -> StoreResult<ProcessingStatusRecord> {
        // Counters move with a single ADD expression, never get-then-put.
        // Every concurrent batch completion lands, and ALL_NEW hands back
        // the post-increment counters this caller is responsible for.
        let output = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("upload_id", s(upload_id))
            .update_expression(
                "ADD completed_batches :b, processed_leads :p, created_leads :c, \
                 updated_leads :u SET updated_at = :now, expires_at = :exp",
            )
            .condition_expression("attribute_exists(upload_id)")
            .expression_attribute_values(":b", n(1))
            .expression_attribute_values(":p", n(completion.leads_processed))
            .expression_attribute_values(":c", n(completion.leads_created))
            .expression_attribute_values(":u", n(completion.leads_updated))
            .expression_attribute_values(":now", s(now.to_rfc3339()))
            .expression_attribute_values(":exp", n(expires_at))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        let item = output
            .attributes()
            .ok_or_else(|| StoreError::Other("update returned no attributes".to_string()))?;
        let mut record = item_to_status(item)?;

        let completed = record.progress.completed_batches;
        let total = record.progress.total_batches;
        record.progress.percentage = completion_percentage(completed, total);

        let finished = total > 0 && completed >= total && record.status == UploadStatus::Processing;
        if finished {
            record.status = UploadStatus::Completed;
            record.stage = ProcessingStage::Completed;
            record.metadata.completed_at = Some(now);
            record.progress.estimated_remaining_seconds = None;
            record.progress.processing_rate = None;
            record.progress.show_estimates = None;
        }

        // Follow-up write for the derived fields, guarded on the counter
        // value this caller observed. If another batch completion has moved
        // the counter since, that caller carries the fresher derivation and
        // this write is skipped.
        let mut update = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("upload_id", s(upload_id))
            .condition_expression("completed_batches = :seen")
            .expression_attribute_values(":seen", n(completed))
            .expression_attribute_names("#pct", "percentage")
            .expression_attribute_values(":pct", f(record.progress.percentage));

        if finished {
            update = update
                .update_expression(
                    "SET #pct = :pct, #s = :status, #st = :stage, completed_at = :done \
                     REMOVE estimated_remaining_seconds, processing_rate, show_estimates",
                )
                .expression_attribute_names("#s", "status")
                .expression_attribute_names("#st", "stage")
                .expression_attribute_values(":status", s(record.status.to_string()))
                .expression_attribute_values(":stage", s(record.stage.to_string()))
                .expression_attribute_values(":done", s(now.to_rfc3339()));
        } else {
            update = update.update_expression("SET #pct = :pct");
        }

        // Best-effort: the counters are already committed and `record`
        // already carries the correct derivation. Surfacing a failure here
        // would make the caller retry the ADD and double-count the batch.
        if let Err(e) = update.send().await {
            match classify_sdk_error(&e) {
                StoreError::ConditionFailed(_) => tracing::debug!(
                    upload_id = %upload_id,
                    completed_batches = completed,
                    "Derived-field write superseded by a newer batch completion"
                ),
                other => tracing::warn!(
                    upload_id = %upload_id,
                    completed_batches = completed,
                    error = %other,
                    "Derived-field write failed; next completion will repair it"
                ),
            }
        }

        Ok(record)
    }
}
