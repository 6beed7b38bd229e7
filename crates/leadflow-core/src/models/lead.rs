use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::email::{normalize_optional_email, NormalizedEmail};

/// Placeholder stored for spreadsheet fields that arrived empty.
pub const FIELD_PLACEHOLDER: &str = "N/A";

/// A lead as it arrives from the standardization step: every field optional,
/// nothing normalized yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawLead {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub remarks: Option<String>,
}

impl RawLead {
    pub fn normalized_email(&self) -> NormalizedEmail {
        normalize_optional_email(self.email.as_deref())
    }

    /// JSON snapshot of the raw fields, for audit entries. Serializing a
    /// plain struct of strings cannot fail; Null is the defensive fallback.
    pub fn field_snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A lead as persisted in the store. Absent fields hold [`FIELD_PLACEHOLDER`];
/// `email` is always normalized. `created_at` is immutable after the first
/// write, `updated_at` changes on every write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub title: String,
    pub company: String,
    pub email: NormalizedEmail,
    pub phone: String,
    pub remarks: String,
    pub source_file: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeadRecord {
    /// Build a brand-new record from raw input, with a fresh id and
    /// `created_at == updated_at`.
    pub fn from_raw(raw: &RawLead, source_file: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name: field_or_placeholder(&raw.first_name),
            last_name: field_or_placeholder(&raw.last_name),
            title: field_or_placeholder(&raw.title),
            company: field_or_placeholder(&raw.company),
            email: raw.normalized_email(),
            phone: field_or_placeholder(&raw.phone),
            remarks: field_or_placeholder(&raw.remarks),
            source_file: source_file.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite every field except `id` and `created_at` with the incoming
    /// values. Field values are replaced wholesale, not merged.
    pub fn apply_update(&mut self, raw: &RawLead, source_file: &str, now: DateTime<Utc>) {
        self.first_name = field_or_placeholder(&raw.first_name);
        self.last_name = field_or_placeholder(&raw.last_name);
        self.title = field_or_placeholder(&raw.title);
        self.company = field_or_placeholder(&raw.company);
        self.email = raw.normalized_email();
        self.phone = field_or_placeholder(&raw.phone);
        self.remarks = field_or_placeholder(&raw.remarks);
        self.source_file = source_file.to_string();
        self.updated_at = now;
    }

    pub fn field_snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn field_or_placeholder(value: &Option<String>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => FIELD_PLACEHOLDER.to_string(),
    }
}
