//! Persistence layer for the lead ingestion pipeline.
//!
//! Defines the [`LeadStore`] and [`StatusStore`] traits plus two backends:
//! a DynamoDB implementation for production and an in-memory implementation
//! for tests and local development.

pub mod dynamo;
pub mod error;
pub mod memory;
pub mod retry;
pub mod store;

pub use dynamo::{dynamo_client_from_env, DynamoLeadStore, DynamoStatusStore};
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryLeadStore, MemoryStatusStore};
pub use retry::{with_backoff, RetryPolicy};
pub use store::{LeadStore, StatusStore};
