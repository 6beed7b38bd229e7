//! Email normalization.
//!
//! Spreadsheet exports encode "no email" in many ways ("n/a", "null",
//! "not provided", blank cells). All of them collapse to a single canonical
//! sentinel so the rest of the pipeline has exactly one representation for an
//! absent address. Format is deliberately not validated: a malformed string
//! like `not-an-email` passes through unchanged and is treated as a real,
//! unique address.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Canonical value meaning "no email provided". Sentinel emails are exempt
/// from duplicate matching everywhere.
pub const EMAIL_SENTINEL: &str = "N/A";

/// Placeholder strings that mean "no email", compared after trim + lowercase.
const EMPTY_EMAIL_MARKERS: &[&str] = &[
    "",
    "n/a",
    "null",
    "none",
    "na",
    "not available",
    "not provided",
];

/// An email string that has been through [`normalize_email`]: trimmed,
/// lowercased, or replaced with the [`EMAIL_SENTINEL`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedEmail(String);

impl NormalizedEmail {
    pub fn sentinel() -> Self {
        Self(EMAIL_SENTINEL.to_string())
    }

    pub fn is_sentinel(&self) -> bool {
        self.0 == EMAIL_SENTINEL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for NormalizedEmail {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// Canonicalizes an email string into a comparison key.
///
/// Idempotent: `normalize_email(x.as_str())` on an already-normalized value
/// yields the same value (the sentinel lowercases to "n/a", which is itself
/// an empty marker).
pub fn normalize_email(raw: &str) -> NormalizedEmail {
    let cleaned = raw.trim().to_lowercase();
    if EMPTY_EMAIL_MARKERS.contains(&cleaned.as_str()) {
        return NormalizedEmail::sentinel();
    }
    NormalizedEmail(cleaned)
}

/// Absent values normalize to the sentinel, same as placeholder strings.
pub fn normalize_optional_email(raw: Option<&str>) -> NormalizedEmail {
    match raw {
        Some(value) => normalize_email(value),
        None => NormalizedEmail::sentinel(),
    }
}

/// True iff the input carries no real email address.
pub fn is_empty_email(raw: &str) -> bool {
    normalize_email(raw).is_sentinel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_and_whitespace_variants_normalize_identically() {
        let variants = [
            "John@Acme.com",
            "john@acme.com",
            "  JOHN@ACME.COM  ",
            "\tjohn@Acme.Com\n",
        ];
        for variant in variants {
            assert_eq!(normalize_email(variant).as_str(), "john@acme.com");
        }
    }

    #[test]
    fn empty_markers_yield_the_sentinel() {
        let markers = ["", "   ", "N/A", "n/a", "null", "NULL", "None", "NA", "na",
            "Not Available", "not provided"];
        for marker in markers {
            let normalized = normalize_email(marker);
            assert!(normalized.is_sentinel(), "{marker:?} should be sentinel");
            assert_eq!(normalized.as_str(), EMAIL_SENTINEL);
            assert!(is_empty_email(marker));
        }
        assert!(normalize_optional_email(None).is_sentinel());
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in ["John@Acme.com", "N/A", "", "not-an-email"] {
            let once = normalize_email(input);
            let twice = normalize_email(once.as_str());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn malformed_addresses_pass_through_unvalidated() {
        let normalized = normalize_email("Not-An-Email");
        assert!(!normalized.is_sentinel());
        assert_eq!(normalized.as_str(), "not-an-email");
    }
}
