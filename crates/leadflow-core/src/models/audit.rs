use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

/// What happened to a lead during ingestion. Every duplicate resolution,
/// update, and per-record failure produces exactly one audit entry.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateAction {
    BatchDuplicateResolved,
    LeadUpdated,
    LeadFailed,
}

impl Display for DuplicateAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DuplicateAction::BatchDuplicateResolved => write!(f, "batch-duplicate-resolved"),
            DuplicateAction::LeadUpdated => write!(f, "lead-updated"),
            DuplicateAction::LeadFailed => write!(f, "lead-failed"),
        }
    }
}

/// One audit entry. Emitted into the structured log stream rather than
/// persisted, so operators can reconstruct what a batch did to the store.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateActionLog {
    pub action: DuplicateAction,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_source_file: Option<String>,
    pub source_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DuplicateActionLog {
    /// Two rows in the same batch shared a normalized email; the later row
    /// won and the earlier one was discarded.
    pub fn batch_duplicate(
        email: &str,
        first_seen_index: usize,
        resolved_index: usize,
        before: Value,
        after: Value,
        source_file: &str,
    ) -> Self {
        Self {
            action: DuplicateAction::BatchDuplicateResolved,
            email: email.to_string(),
            lead_id: None,
            before: Some(before),
            after: Some(after),
            first_seen_index: Some(first_seen_index),
            resolved_index: Some(resolved_index),
            previous_source_file: None,
            source_file: source_file.to_string(),
            detail: None,
            timestamp: Utc::now(),
        }
    }

    /// An incoming row matched an existing record by email and replaced its
    /// field values.
    pub fn lead_updated(
        email: &str,
        lead_id: Uuid,
        before: Option<Value>,
        after: Value,
        previous_source_file: Option<String>,
        source_file: &str,
    ) -> Self {
        Self {
            action: DuplicateAction::LeadUpdated,
            email: email.to_string(),
            lead_id: Some(lead_id),
            before,
            after: Some(after),
            first_seen_index: None,
            resolved_index: None,
            previous_source_file,
            source_file: source_file.to_string(),
            detail: None,
            timestamp: Utc::now(),
        }
    }

    /// A single row failed to persist; the rest of the batch continues.
    pub fn lead_failed(email: &str, error: &dyn Display, source_file: &str) -> Self {
        Self {
            action: DuplicateAction::LeadFailed,
            email: email.to_string(),
            lead_id: None,
            before: None,
            after: None,
            first_seen_index: None,
            resolved_index: None,
            previous_source_file: None,
            source_file: source_file.to_string(),
            detail: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }

    /// Write this entry to the structured log stream.
    pub fn emit(&self) {
        let entry = serde_json::to_string(self).unwrap_or_else(|_| self.action.to_string());
        match self.action {
            DuplicateAction::LeadFailed => {
                tracing::error!(
                    action = %self.action,
                    email = %self.email,
                    source_file = %self.source_file,
                    audit = %entry,
                    "Lead failed to persist"
                );
            }
            _ => {
                tracing::info!(
                    action = %self.action,
                    email = %self.email,
                    source_file = %self.source_file,
                    audit = %entry,
                    "Duplicate action recorded"
                );
            }
        }
    }
}
