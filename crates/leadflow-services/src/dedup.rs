//! In-batch duplicate resolution.
//!
//! Two rows in the same batch with the same normalized email are the same
//! lead; the later row wins because spreadsheet exports list corrections
//! below the original entry. Sentinel emails never collide with each other,
//! so rows without a real address all survive.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use leadflow_core::email::NormalizedEmail;
use leadflow_core::models::{DuplicateActionLog, RawLead};

/// Outcome of duplicate resolution over one batch.
pub struct ResolvedBatch {
    /// Surviving records, each occupying the position where its email was
    /// first seen.
    pub records: Vec<RawLead>,
    pub actions: Vec<DuplicateActionLog>,
    pub duplicates_resolved: usize,
}

/// Collapse the batch so each normalized email appears at most once,
/// keeping the last occurrence. Emits one audit entry per discarded row.
pub fn resolve_duplicates(records: Vec<RawLead>, source_file: &str) -> ResolvedBatch {
    let mut survivors: Vec<RawLead> = Vec::with_capacity(records.len());
    let mut seen: HashMap<NormalizedEmail, (usize, usize)> = HashMap::new();
    let mut actions = Vec::new();
    let mut duplicates_resolved = 0;

    for (index, record) in records.into_iter().enumerate() {
        let email = record.normalized_email();
        if email.is_sentinel() {
            survivors.push(record);
            continue;
        }
        match seen.entry(email) {
            Entry::Occupied(entry) => {
                let (slot, first_seen) = *entry.get();
                let log = DuplicateActionLog::batch_duplicate(
                    entry.key().as_str(),
                    first_seen,
                    index,
                    survivors[slot].field_snapshot(),
                    record.field_snapshot(),
                    source_file,
                );
                log.emit();
                actions.push(log);
                survivors[slot] = record;
                duplicates_resolved += 1;
            }
            Entry::Vacant(entry) => {
                entry.insert((survivors.len(), index));
                survivors.push(record);
            }
        }
    }

    ResolvedBatch {
        records: survivors,
        actions,
        duplicates_resolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::models::DuplicateAction;

    fn raw(first: &str, email: Option<&str>) -> RawLead {
        RawLead {
            first_name: Some(first.to_string()),
            email: email.map(|e| e.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_last_occurrence_wins_in_place() {
        let batch = vec![
            raw("John", Some("John@Acme.com")),
            raw("Jane", Some("jane@acme.com")),
            raw("Johnny", Some("john@acme.com")),
        ];
        let resolved = resolve_duplicates(batch, "leads.csv");

        assert_eq!(resolved.records.len(), 2);
        assert_eq!(resolved.duplicates_resolved, 1);
        // The winner takes the slot where the email was first seen.
        assert_eq!(resolved.records[0].first_name.as_deref(), Some("Johnny"));
        assert_eq!(resolved.records[1].first_name.as_deref(), Some("Jane"));

        assert_eq!(resolved.actions.len(), 1);
        let action = &resolved.actions[0];
        assert_eq!(action.action, DuplicateAction::BatchDuplicateResolved);
        assert_eq!(action.email, "john@acme.com");
        assert_eq!(action.first_seen_index, Some(0));
        assert_eq!(action.resolved_index, Some(2));
    }

    #[test]
    fn test_sentinel_emails_never_collide() {
        let batch = vec![
            raw("A", None),
            raw("B", Some("")),
            raw("C", Some("N/A")),
            raw("D", Some("null")),
        ];
        let resolved = resolve_duplicates(batch, "leads.csv");
        assert_eq!(resolved.records.len(), 4);
        assert_eq!(resolved.duplicates_resolved, 0);
        assert!(resolved.actions.is_empty());
    }

    #[test]
    fn test_case_and_whitespace_variants_collide() {
        let batch = vec![
            raw("A", Some("john@acme.com")),
            raw("B", Some("  JOHN@ACME.COM ")),
            raw("C", Some("John@Acme.com")),
        ];
        let resolved = resolve_duplicates(batch, "leads.csv");
        assert_eq!(resolved.records.len(), 1);
        assert_eq!(resolved.duplicates_resolved, 2);
        assert_eq!(resolved.records[0].first_name.as_deref(), Some("C"));
    }

    #[test]
    fn test_empty_batch() {
        let resolved = resolve_duplicates(Vec::new(), "leads.csv");
        assert!(resolved.records.is_empty());
        assert!(resolved.actions.is_empty());
    }
}
