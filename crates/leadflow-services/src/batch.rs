//! Batch processing with per-record failure isolation.
//!
//! One bad row never fails the batch: it produces an audit entry and the
//! remaining rows continue. Only a fully failed batch surfaces an error,
//! since that pattern means the store itself is down rather than the data
//! being bad.

use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use leadflow_core::models::{DuplicateActionLog, RawLead};
use leadflow_core::AppError;

use crate::dedup::resolve_duplicates;
use crate::upsert::UpsertEngine;

/// Observed-to-budget slack before the perf warning fires.
const BUDGET_SLACK_NUM: u64 = 12;
const BUDGET_SLACK_DEN: u64 = 10;

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub total_submitted: usize,
    pub unique_after_dedup: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub duplicates_resolved: usize,
    pub email_queries: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug)]
pub struct BatchResult {
    pub created_ids: Vec<Uuid>,
    pub updated_ids: Vec<Uuid>,
    pub actions: Vec<DuplicateActionLog>,
    pub stats: BatchStats,
}

pub struct BatchProcessor {
    engine: UpsertEngine,
    per_record_budget_ms: u64,
}

impl BatchProcessor {
    pub fn new(engine: UpsertEngine, per_record_budget_ms: u64) -> Self {
        Self {
            engine,
            per_record_budget_ms,
        }
    }

    /// Deduplicate the batch, then upsert each survivor. Individual row
    /// failures are audited and skipped; the call only errs when every row
    /// failed, which signals a systemic store problem.
    #[tracing::instrument(skip(self, records), fields(source_file = %source_file, records = records.len()))]
    pub async fn batch_upsert(
        &self,
        records: Vec<RawLead>,
        source_file: &str,
    ) -> Result<BatchResult, AppError> {
        let started = Instant::now();
        let total_submitted = records.len();

        let resolved = resolve_duplicates(records, source_file);
        let unique_after_dedup = resolved.records.len();
        let duplicates_resolved = resolved.duplicates_resolved;
        let mut actions = resolved.actions;

        let mut created_ids = Vec::new();
        let mut updated_ids = Vec::new();
        let mut email_queries = 0;
        let mut failed = 0;

        for raw in &resolved.records {
            let email = raw.normalized_email();
            match self.engine.upsert(raw, source_file).await {
                Ok(outcome) => {
                    if outcome.index_queried {
                        email_queries += 1;
                    }
                    if outcome.was_updated {
                        let log = DuplicateActionLog::lead_updated(
                            email.as_str(),
                            outcome.id,
                            outcome.previous.as_ref().map(|p| p.field_snapshot()),
                            raw.field_snapshot(),
                            outcome.previous.map(|p| p.source_file),
                            source_file,
                        );
                        log.emit();
                        actions.push(log);
                        updated_ids.push(outcome.id);
                    } else {
                        created_ids.push(outcome.id);
                    }
                }
                Err(err) => {
                    let log = DuplicateActionLog::lead_failed(email.as_str(), &err, source_file);
                    log.emit();
                    actions.push(log);
                    failed += 1;
                }
            }
        }

        if unique_after_dedup > 0 && failed == unique_after_dedup {
            return Err(AppError::Database {
                message: format!(
                    "every record in the batch failed to persist ({} of {})",
                    failed, unique_after_dedup
                ),
                throttled: false,
            });
        }

        let stats = BatchStats {
            total_submitted,
            unique_after_dedup,
            created: created_ids.len(),
            updated: updated_ids.len(),
            failed,
            duplicates_resolved,
            email_queries,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        self.check_performance(&stats);

        tracing::info!(
            created = stats.created,
            updated = stats.updated,
            failed = stats.failed,
            duplicates_resolved = stats.duplicates_resolved,
            elapsed_ms = stats.elapsed_ms,
            "Batch upsert finished"
        );

        Ok(BatchResult {
            created_ids,
            updated_ids,
            actions,
            stats,
        })
    }

    /// Insert every record without duplicate detection. Used when the upsert
    /// path is unusable; re-created duplicates are accepted and visible in
    /// the audit trail.
    #[tracing::instrument(skip(self, records), fields(source_file = %source_file, records = records.len()))]
    pub async fn bulk_insert(
        &self,
        records: Vec<RawLead>,
        source_file: &str,
    ) -> Result<BatchResult, AppError> {
        tracing::warn!(
            records = records.len(),
            "Bulk insert fallback engaged: duplicate detection is OFF"
        );

        let started = Instant::now();
        let total_submitted = records.len();
        let mut created_ids = Vec::new();
        let mut actions = Vec::new();
        let mut failed = 0;

        for raw in &records {
            let email = raw.normalized_email();
            match self.engine.insert_new(raw, source_file).await {
                Ok(id) => created_ids.push(id),
                Err(err) => {
                    let log = DuplicateActionLog::lead_failed(email.as_str(), &err, source_file);
                    log.emit();
                    actions.push(log);
                    failed += 1;
                }
            }
        }

        if total_submitted > 0 && failed == total_submitted {
            return Err(AppError::Database {
                message: format!("bulk insert failed for all {} records", total_submitted),
                throttled: false,
            });
        }

        let stats = BatchStats {
            total_submitted,
            unique_after_dedup: total_submitted,
            created: created_ids.len(),
            updated: 0,
            failed,
            duplicates_resolved: 0,
            email_queries: 0,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        Ok(BatchResult {
            created_ids,
            updated_ids: Vec::new(),
            actions,
            stats,
        })
    }

    /// Try the full upsert path; if the whole batch fails, fall back to
    /// plain inserts so the data still lands.
    pub async fn batch_upsert_or_fallback(
        &self,
        records: Vec<RawLead>,
        source_file: &str,
    ) -> Result<BatchResult, AppError> {
        match self.batch_upsert(records.clone(), source_file).await {
            Ok(result) => Ok(result),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "Batch upsert failed, retrying as bulk insert"
                );
                self.bulk_insert(records, source_file).await
            }
        }
    }

    fn check_performance(&self, stats: &BatchStats) {
        if stats.unique_after_dedup == 0 {
            return;
        }
        let budget_ms = self.per_record_budget_ms * stats.unique_after_dedup as u64
            * BUDGET_SLACK_NUM
            / BUDGET_SLACK_DEN;
        if stats.elapsed_ms > budget_ms {
            tracing::warn!(
                elapsed_ms = stats.elapsed_ms,
                budget_ms = budget_ms,
                records = stats.unique_after_dedup,
                email_queries = stats.email_queries,
                "Batch exceeded its latency budget"
            );
        }
    }
}
