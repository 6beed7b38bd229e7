use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use uuid::Uuid;

use leadflow_core::email::NormalizedEmail;
use leadflow_core::models::LeadRecord;

use crate::dynamo::classify_sdk_error;
use crate::dynamo::marshal::{item_to_lead, lead_to_item, s};
use crate::error::StoreResult;
use crate::store::LeadStore;

/// Lead store backed by a DynamoDB table with a global secondary index on
/// the normalized email attribute.
#[derive(Clone)]
pub struct DynamoLeadStore {
    client: Client,
    table: String,
    email_index: String,
}

impl DynamoLeadStore {
    pub fn new(client: Client, table: impl Into<String>, email_index: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
            email_index: email_index.into(),
        }
    }
}

#[async_trait]
impl LeadStore for DynamoLeadStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<LeadRecord>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("id", s(id.to_string()))
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        match output.item() {
            Some(item) => Ok(Some(item_to_lead(item)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, record: &LeadRecord) -> StoreResult<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(lead_to_item(record)))
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;
        Ok(())
    }

    async fn query_by_email(&self, email: &NormalizedEmail) -> StoreResult<Option<LeadRecord>> {
        let output = self
            .client
            .query()
            .table_name(&self.table)
            .index_name(&self.email_index)
            .key_condition_expression("email = :email")
            .expression_attribute_values(":email", s(email.as_str()))
            .limit(1)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        match output.items().first() {
            Some(item) => Ok(Some(item_to_lead(item)?)),
            None => Ok(None),
        }
    }
}
