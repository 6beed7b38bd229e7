//! Store abstraction traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use leadflow_core::email::NormalizedEmail;
use leadflow_core::models::{BatchCompletion, LeadRecord, ProcessingStatusRecord, StatusPatch};

use crate::error::StoreResult;

/// Lead persistence, keyed by lead id with a secondary lookup by normalized
/// email.
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<LeadRecord>>;

    /// Unconditional write; inserts or fully replaces the record.
    async fn put(&self, record: &LeadRecord) -> StoreResult<()>;

    /// Look up a lead by normalized email through the secondary index.
    /// Returns `IndexUnavailable` when the index cannot serve queries;
    /// callers decide whether that degrades to insert-only behavior.
    async fn query_by_email(&self, email: &NormalizedEmail) -> StoreResult<Option<LeadRecord>>;
}

/// Upload status persistence with atomic counter increments.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Insert a new record; fails with `ConditionFailed` if one already
    /// exists for the upload id.
    async fn create(&self, record: &ProcessingStatusRecord) -> StoreResult<()>;

    async fn get(&self, upload_id: &str) -> StoreResult<Option<ProcessingStatusRecord>>;

    /// Write only the fields the patch carries; fails with
    /// `ConditionFailed` if the record is gone. Fields the patch leaves
    /// unset — the batch counters above all — keep whatever value
    /// concurrent writers have put there, so a counter-free patch can race
    /// `add_batch_completion` without losing increments.
    async fn apply_patch(
        &self,
        upload_id: &str,
        patch: &StatusPatch,
        now: DateTime<Utc>,
        expires_at: i64,
    ) -> StoreResult<ProcessingStatusRecord>;

    /// Atomically add one batch's counters to the record and return the
    /// updated state. The increment must happen inside the store, never as a
    /// read-modify-write in the caller: concurrent batch completions all
    /// land, and the returned counters reflect every one applied so far.
    ///
    /// Implementations also derive the percentage from the new counters and,
    /// when `completed_batches` reaches `total_batches` while the record is
    /// still `processing`, flip it to `completed` (stage `completed`,
    /// `completed_at` set, estimates cleared).
    async fn add_batch_completion(
        &self,
        upload_id: &str,
        completion: &BatchCompletion,
        now: DateTime<Utc>,
        expires_at: i64,
    ) -> StoreResult<ProcessingStatusRecord>;
}
