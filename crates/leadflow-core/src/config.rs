//! Configuration module
//!
//! Runtime settings for the ingestion pipeline, loaded from the environment
//! with sensible defaults for local development.

use std::env;

const STATUS_TTL_HOURS: i64 = 24;
const RETRY_BASE_DELAY_MS: u64 = 1000;
const RETRY_MAX_ATTEMPTS: u32 = 3;
const RETRY_MAX_DELAY_MS: u64 = 8000;
const PER_RECORD_BUDGET_MS: u64 = 100;

/// Application configuration for the lead ingestion services.
#[derive(Clone, Debug)]
pub struct IngestConfig {
    /// Table holding lead records, keyed by lead id.
    pub leads_table: String,
    /// Table holding per-upload processing status records.
    pub status_table: String,
    /// Secondary index on the leads table keyed by normalized email.
    pub email_index: String,
    /// Sliding lifetime for status records; refreshed on every update.
    pub status_ttl_hours: i64,
    pub retry_base_delay_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_max_delay_ms: u64,
    /// Soft per-record latency budget used by the batch perf warning.
    pub per_record_budget_ms: u64,
    pub environment: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            leads_table: "leads".to_string(),
            status_table: "upload_status".to_string(),
            email_index: "email-index".to_string(),
            status_ttl_hours: STATUS_TTL_HOURS,
            retry_base_delay_ms: RETRY_BASE_DELAY_MS,
            retry_max_attempts: RETRY_MAX_ATTEMPTS,
            retry_max_delay_ms: RETRY_MAX_DELAY_MS,
            per_record_budget_ms: PER_RECORD_BUDGET_MS,
            environment: "development".to_string(),
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let config = IngestConfig {
            leads_table: env::var("LEADS_TABLE").unwrap_or_else(|_| "leads".to_string()),
            status_table: env::var("STATUS_TABLE")
                .unwrap_or_else(|_| "upload_status".to_string()),
            email_index: env::var("LEADS_EMAIL_INDEX")
                .unwrap_or_else(|_| "email-index".to_string()),
            status_ttl_hours: env::var("STATUS_TTL_HOURS")
                .unwrap_or_else(|_| STATUS_TTL_HOURS.to_string())
                .parse()
                .unwrap_or(STATUS_TTL_HOURS),
            retry_base_delay_ms: env::var("RETRY_BASE_DELAY_MS")
                .unwrap_or_else(|_| RETRY_BASE_DELAY_MS.to_string())
                .parse()
                .unwrap_or(RETRY_BASE_DELAY_MS),
            retry_max_attempts: env::var("RETRY_MAX_ATTEMPTS")
                .unwrap_or_else(|_| RETRY_MAX_ATTEMPTS.to_string())
                .parse()
                .unwrap_or(RETRY_MAX_ATTEMPTS),
            retry_max_delay_ms: env::var("RETRY_MAX_DELAY_MS")
                .unwrap_or_else(|_| RETRY_MAX_DELAY_MS.to_string())
                .parse()
                .unwrap_or(RETRY_MAX_DELAY_MS),
            per_record_budget_ms: env::var("PER_RECORD_BUDGET_MS")
                .unwrap_or_else(|_| PER_RECORD_BUDGET_MS.to_string())
                .parse()
                .unwrap_or(PER_RECORD_BUDGET_MS),
            environment,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.leads_table.trim().is_empty() {
            return Err(anyhow::anyhow!("LEADS_TABLE cannot be empty"));
        }
        if self.status_table.trim().is_empty() {
            return Err(anyhow::anyhow!("STATUS_TABLE cannot be empty"));
        }
        if self.email_index.trim().is_empty() {
            return Err(anyhow::anyhow!("LEADS_EMAIL_INDEX cannot be empty"));
        }
        if self.status_ttl_hours <= 0 {
            return Err(anyhow::anyhow!("STATUS_TTL_HOURS must be positive"));
        }
        if self.retry_base_delay_ms == 0 {
            return Err(anyhow::anyhow!("RETRY_BASE_DELAY_MS must be positive"));
        }
        if self.retry_max_attempts == 0 {
            return Err(anyhow::anyhow!("RETRY_MAX_ATTEMPTS must be at least 1"));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(anyhow::anyhow!(
                "RETRY_MAX_DELAY_MS cannot be smaller than RETRY_BASE_DELAY_MS"
            ));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }
}
