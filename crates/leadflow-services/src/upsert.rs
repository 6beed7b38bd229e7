//! Email-keyed lead upserts.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use leadflow_core::email::NormalizedEmail;
use leadflow_core::models::{LeadRecord, RawLead};
use leadflow_core::AppError;
use leadflow_db::{LeadStore, StoreError};

use crate::map_store_error;

/// What one upsert did.
pub struct UpsertOutcome {
    pub id: Uuid,
    pub was_updated: bool,
    /// Whether the email index was consulted (false for sentinel emails).
    pub index_queried: bool,
    /// The record as it stood before the update, for audit trails.
    pub previous: Option<LeadRecord>,
}

/// Inserts or updates leads, matching existing records by normalized email.
#[derive(Clone)]
pub struct UpsertEngine {
    store: Arc<dyn LeadStore>,
}

impl UpsertEngine {
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self { store }
    }

    /// Look up an existing lead by email. Sentinel emails never match
    /// anything; an unavailable index degrades to "no match" so ingestion
    /// keeps working in insert-only mode.
    pub async fn find_by_email(
        &self,
        email: &NormalizedEmail,
    ) -> Result<Option<LeadRecord>, AppError> {
        if email.is_sentinel() {
            return Ok(None);
        }
        match self.store.query_by_email(email).await {
            Ok(existing) => Ok(existing),
            Err(StoreError::IndexUnavailable(msg)) => {
                tracing::warn!(
                    email = %email,
                    error = %msg,
                    "Email index unavailable, falling back to insert-only"
                );
                Ok(None)
            }
            Err(e) => Err(map_store_error(e)),
        }
    }

    /// Insert the lead, or update the existing record that shares its
    /// normalized email. Updates replace field values wholesale but keep
    /// the original id and `created_at`.
    pub async fn upsert(&self, raw: &RawLead, source_file: &str) -> Result<UpsertOutcome, AppError> {
        let email = raw.normalized_email();
        let index_queried = !email.is_sentinel();
        let existing = self.find_by_email(&email).await?;
        let now = Utc::now();

        match existing {
            Some(mut record) => {
                let previous = record.clone();
                record.apply_update(raw, source_file, now);
                self.store.put(&record).await.map_err(map_store_error)?;
                Ok(UpsertOutcome {
                    id: record.id,
                    was_updated: true,
                    index_queried,
                    previous: Some(previous),
                })
            }
            None => {
                let record = LeadRecord::from_raw(raw, source_file, now);
                self.store.put(&record).await.map_err(map_store_error)?;
                Ok(UpsertOutcome {
                    id: record.id,
                    was_updated: false,
                    index_queried,
                    previous: None,
                })
            }
        }
    }

    /// Insert without consulting the email index. Used by the bulk-insert
    /// fallback, where duplicate detection is deliberately off.
    pub async fn insert_new(&self, raw: &RawLead, source_file: &str) -> Result<Uuid, AppError> {
        let record = LeadRecord::from_raw(raw, source_file, Utc::now());
        self.store.put(&record).await.map_err(map_store_error)?;
        Ok(record.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_db::MemoryLeadStore;

    fn raw(first: &str, email: Option<&str>) -> RawLead {
        RawLead {
            first_name: Some(first.to_string()),
            email: email.map(|e| e.to_string()),
            ..Default::default()
        }
    }

    fn engine() -> (Arc<MemoryLeadStore>, UpsertEngine) {
        let store = Arc::new(MemoryLeadStore::new());
        let engine = UpsertEngine::new(store.clone());
        (store, engine)
    }

    #[tokio::test]
    async fn test_insert_then_update_preserves_created_at() {
        let (store, engine) = engine();

        let first = engine
            .upsert(&raw("John", Some("John@Acme.com")), "a.csv")
            .await
            .unwrap();
        assert!(!first.was_updated);
        assert!(first.index_queried);

        let second = engine
            .upsert(&raw("Johnny", Some("john@acme.com")), "b.csv")
            .await
            .unwrap();
        assert!(second.was_updated);
        assert_eq!(second.id, first.id);
        assert_eq!(
            second.previous.as_ref().map(|p| p.first_name.as_str()),
            Some("John")
        );

        assert_eq!(store.len(), 1);
        let stored = store.get(first.id).await.unwrap().unwrap();
        assert_eq!(stored.first_name, "Johnny");
        assert_eq!(stored.source_file, "b.csv");
        assert_eq!(
            stored.created_at,
            second.previous.as_ref().map(|p| p.created_at).unwrap()
        );
    }

    #[tokio::test]
    async fn test_sentinel_emails_always_insert() {
        let (store, engine) = engine();

        let a = engine.upsert(&raw("A", None), "a.csv").await.unwrap();
        let b = engine.upsert(&raw("B", Some("N/A")), "a.csv").await.unwrap();
        assert!(!a.was_updated);
        assert!(!b.was_updated);
        assert!(!a.index_queried);
        assert!(!b.index_queried);
        assert_ne!(a.id, b.id);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_index_outage_degrades_to_insert() {
        let (store, engine) = engine();
        engine
            .upsert(&raw("John", Some("john@acme.com")), "a.csv")
            .await
            .unwrap();

        store.set_email_index_available(false);
        let outcome = engine
            .upsert(&raw("Johnny", Some("john@acme.com")), "b.csv")
            .await
            .unwrap();
        // Degraded mode inserts a second record rather than failing the row.
        assert!(!outcome.was_updated);
        assert_eq!(store.len(), 2);
    }
}
