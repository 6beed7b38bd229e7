//! DynamoDB-backed store implementations.

mod leads;
mod marshal;
mod status;

pub use leads::DynamoLeadStore;
pub use status::DynamoStatusStore;

use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::Client;

use crate::error::StoreError;

/// Build a DynamoDB client from the ambient AWS environment (credentials
/// chain, region, endpoint overrides).
pub async fn dynamo_client_from_env() -> Client {
    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    Client::new(&config)
}

/// Map an SDK error onto the store error taxonomy by service error code.
pub(crate) fn classify_sdk_error<E, R>(err: &SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata,
{
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| "request failed".to_string());

    match err.code() {
        Some("ConditionalCheckFailedException") => StoreError::ConditionFailed(message),
        Some(
            "ProvisionedThroughputExceededException" | "ThrottlingException" | "RequestLimitExceeded",
        ) => StoreError::Throttled(message),
        Some("ResourceNotFoundException") => StoreError::IndexUnavailable(message),
        Some(code) => StoreError::Other(format!("{}: {}", code, message)),
        None => StoreError::Other(message),
    }
}
