use std::sync::Arc;

use leadflow_core::models::RawLead;
use leadflow_db::{MemoryLeadStore, MemoryStatusStore, RetryPolicy};
use leadflow_services::{BatchProcessor, StatusService, UpsertEngine};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn make_lead(first: &str, company: &str, email: Option<&str>) -> RawLead {
    RawLead {
        first_name: Some(first.to_string()),
        company: Some(company.to_string()),
        email: email.map(|e| e.to_string()),
        ..Default::default()
    }
}

pub fn make_processor() -> (Arc<MemoryLeadStore>, BatchProcessor) {
    let store = Arc::new(MemoryLeadStore::new());
    let engine = UpsertEngine::new(store.clone());
    (store.clone(), BatchProcessor::new(engine, 100))
}

pub fn make_status_service() -> (Arc<MemoryStatusStore>, StatusService) {
    let store = Arc::new(MemoryStatusStore::new());
    let service = StatusService::new(store.clone(), RetryPolicy::default(), 24);
    (store, service)
}
