//! In-memory store backends for tests and local development.
//!
//! Behavior mirrors the DynamoDB backends, including conditional-write
//! semantics, TTL visibility, and atomic counter increments. Failure
//! injection hooks let tests exercise degraded-store paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use leadflow_core::email::NormalizedEmail;
use leadflow_core::models::{
    completion_percentage, BatchCompletion, LeadRecord, ProcessingStage, ProcessingStatusRecord,
    StatusPatch, UploadStatus,
};

use crate::error::{StoreError, StoreResult};
use crate::store::{LeadStore, StatusStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct MemoryLeadStore {
    leads: Mutex<HashMap<Uuid, LeadRecord>>,
    email_index_unavailable: AtomicBool,
    fail_all_puts: AtomicBool,
    fail_email: Mutex<Option<String>>,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.leads).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<LeadRecord> {
        lock(&self.leads).values().cloned().collect()
    }

    /// Simulate the email secondary index going down.
    pub fn set_email_index_available(&self, available: bool) {
        self.email_index_unavailable
            .store(!available, Ordering::SeqCst);
    }

    /// Make every put fail, simulating a store outage.
    pub fn set_fail_all_puts(&self, fail: bool) {
        self.fail_all_puts.store(fail, Ordering::SeqCst);
    }

    /// Make puts fail for one specific normalized email.
    pub fn set_fail_email(&self, email: Option<&str>) {
        *lock(&self.fail_email) = email.map(str::to_string);
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<LeadRecord>> {
        Ok(lock(&self.leads).get(&id).cloned())
    }

    async fn put(&self, record: &LeadRecord) -> StoreResult<()> {
        if self.fail_all_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Other("injected put failure".to_string()));
        }
        if let Some(ref email) = *lock(&self.fail_email) {
            if record.email.as_str() == email {
                return Err(StoreError::Other(format!(
                    "injected put failure for {}",
                    email
                )));
            }
        }
        lock(&self.leads).insert(record.id, record.clone());
        Ok(())
    }

    async fn query_by_email(&self, email: &NormalizedEmail) -> StoreResult<Option<LeadRecord>> {
        if self.email_index_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::IndexUnavailable(
                "email index offline".to_string(),
            ));
        }
        Ok(lock(&self.leads)
            .values()
            .find(|record| &record.email == email)
            .cloned())
    }
}

#[derive(Default)]
pub struct MemoryStatusStore {
    records: Mutex<HashMap<String, ProcessingStatusRecord>>,
    throttles: AtomicU32,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` operations fail with a throttling error.
    pub fn inject_throttles(&self, count: u32) {
        self.throttles.store(count, Ordering::SeqCst);
    }

    fn maybe_throttle(&self) -> StoreResult<()> {
        let was_pending = self
            .throttles
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if was_pending {
            Err(StoreError::Throttled("injected throttle".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn create(&self, record: &ProcessingStatusRecord) -> StoreResult<()> {
        self.maybe_throttle()?;
        let mut records = lock(&self.records);
        if records.contains_key(&record.upload_id) {
            return Err(StoreError::ConditionFailed(format!(
                "status record already exists for upload {}",
                record.upload_id
            )));
        }
        records.insert(record.upload_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, upload_id: &str) -> StoreResult<Option<ProcessingStatusRecord>> {
        self.maybe_throttle()?;
        let records = lock(&self.records);
        // TTL semantics: expired records are invisible, same as the store
        // reaping them.
        Ok(records
            .get(upload_id)
            .filter(|record| !record.is_expired(Utc::now()))
            .cloned())
    }

    async fn apply_patch(
        &self,
        upload_id: &str,
        patch: &StatusPatch,
        now: DateTime<Utc>,
        expires_at: i64,
    ) -> StoreResult<ProcessingStatusRecord> {
        self.maybe_throttle()?;
        let mut records = lock(&self.records);
        let record = records.get_mut(upload_id).ok_or_else(|| {
            StoreError::ConditionFailed(format!("no status record for upload {}", upload_id))
        })?;

        // Patch semantics: untouched fields keep their current value, so a
        // counter-free patch cannot undo a concurrent increment.
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(stage) = patch.stage {
            record.stage = stage;
        }
        if let Some(v) = patch.total_batches {
            record.progress.total_batches = v;
        }
        if let Some(v) = patch.completed_batches {
            record.progress.completed_batches = v;
        }
        if let Some(v) = patch.total_leads {
            record.progress.total_leads = v;
        }
        if let Some(v) = patch.processed_leads {
            record.progress.processed_leads = v;
        }
        if let Some(v) = patch.created_leads {
            record.progress.created_leads = v;
        }
        if let Some(v) = patch.updated_leads {
            record.progress.updated_leads = v;
        }
        if let Some(pct) = patch.percentage {
            record.progress.percentage = pct;
        }
        if let Some(est) = patch.estimates {
            record.progress.estimated_remaining_seconds = est.estimated_remaining_seconds;
            record.progress.processing_rate = est.processing_rate;
            record.progress.show_estimates = est.show_estimates;
        }
        if let Some(ref file_name) = patch.file_name {
            record.metadata.file_name = file_name.clone();
        }
        if let Some(file_size) = patch.file_size {
            record.metadata.file_size = file_size;
        }
        if let Some(completed_at) = patch.completed_at {
            record.metadata.completed_at = Some(completed_at);
        }
        if let Some(ref error) = patch.error {
            record.error = Some(error.clone());
        }
        if patch.clear_error {
            record.error = None;
        }
        if let Some(cancelled_at) = patch.cancelled_at {
            record.metadata.cancelled_at = Some(cancelled_at);
        }
        if let Some(ref reason) = patch.cancellation_reason {
            record.metadata.cancellation_reason = Some(reason.clone());
        }
        if let Some(ref partial) = patch.partial_progress {
            record.metadata.partial_progress = Some(partial.clone());
        }
        record.updated_at = now;
        record.expires_at = expires_at;

        Ok(record.clone())
    }

    async fn add_batch_completion(
        &self,
        upload_id: &str,
        completion: &BatchCompletion,
        now: DateTime<Utc>,
        expires_at: i64,
    ) -> StoreResult<ProcessingStatusRecord> {
        self.maybe_throttle()?;
        let mut records = lock(&self.records);
        let record = records.get_mut(upload_id).ok_or_else(|| {
            StoreError::ConditionFailed(format!("no status record for upload {}", upload_id))
        })?;

        // Increment and derivation happen under one lock, so concurrent
        // completions serialize exactly like the ADD expression does.
        record.progress.completed_batches += 1;
        record.progress.processed_leads += completion.leads_processed;
        record.progress.created_leads += completion.leads_created;
        record.progress.updated_leads += completion.leads_updated;
        record.progress.percentage = completion_percentage(
            record.progress.completed_batches,
            record.progress.total_batches,
        );
        record.updated_at = now;
        record.expires_at = expires_at;

        let total = record.progress.total_batches;
        if total > 0
            && record.progress.completed_batches >= total
            && record.status == UploadStatus::Processing
        {
            record.status = UploadStatus::Completed;
            record.stage = ProcessingStage::Completed;
            record.metadata.completed_at = Some(now);
            record.progress.estimated_remaining_seconds = None;
            record.progress.processing_rate = None;
            record.progress.show_estimates = None;
        }

        Ok(record.clone())
    }
}
