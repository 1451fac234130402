//! Typed document-store client

use super::key_value::decode;
use super::{BackendType, Command, DriverError, Reply};
use crate::error::Result;
use crate::manager::ConnectionManager;
use crate::tier::Tier;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_core_resilience::PoolStats;

/// A stored document
pub type Document = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertOneResult {
    pub inserted_id: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Document-store operations for one tenant
///
/// Filters use the usual query operators (`$eq`, `$ne`, `$gt`, `$gte`, `$lt`,
/// `$lte`, `$in`, `$exists`) and dotted field paths. Updates accept `$set`,
/// `$unset` and `$inc`.
#[derive(Debug, Clone)]
pub struct DocumentClient {
    manager: ConnectionManager,
    tenant_id: String,
    tier: Tier,
}

impl DocumentClient {
    pub fn new(manager: ConnectionManager, tenant_id: impl Into<String>, tier: Tier) -> Self {
        Self {
            manager,
            tenant_id: tenant_id.into(),
            tier,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub async fn find(
        &self,
        collection: &str,
        filter: Value,
        limit: Option<usize>,
    ) -> Result<Vec<Document>> {
        let mut command = Command::new("FIND").arg(collection).arg(filter);
        if let Some(limit) = limit {
            command = command.arg(limit);
        }
        self.query("find", command).await
    }

    pub async fn find_one(&self, collection: &str, filter: Value) -> Result<Option<Document>> {
        self.query(
            "find_one",
            Command::new("FIND_ONE").arg(collection).arg(filter),
        )
        .await
    }

    /// Insert a document; an `_id` is generated when the document has none
    pub async fn insert_one<D: Serialize>(
        &self,
        collection: &str,
        document: &D,
    ) -> Result<InsertOneResult> {
        let document = serde_json::to_value(document)
            .map_err(|e| DriverError::InvalidArgument(format!("document: {}", e)))?;
        if !document.is_object() {
            return Err(DriverError::InvalidArgument("document must be an object".to_string()).into());
        }

        self.query(
            "insert_one",
            Command::new("INSERT_ONE").arg(collection).arg(document),
        )
        .await
    }

    /// Update the first document matching `filter`
    pub async fn update_one(
        &self,
        collection: &str,
        filter: Value,
        update: Value,
    ) -> Result<UpdateResult> {
        self.query(
            "update_one",
            Command::new("UPDATE_ONE")
                .arg(collection)
                .arg(filter)
                .arg(update),
        )
        .await
    }

    /// Delete the first document matching `filter`
    pub async fn delete_one(&self, collection: &str, filter: Value) -> Result<DeleteResult> {
        self.query(
            "delete_one",
            Command::new("DELETE_ONE").arg(collection).arg(filter),
        )
        .await
    }

    pub async fn ping(&self) -> Result<bool> {
        let reply = self.call("ping", Command::new("PING")).await?;
        Ok(reply.get("ok").and_then(Value::as_f64) == Some(1.0))
    }

    /// Database selected by the tenant's connection string
    pub async fn database_name(&self) -> Result<String> {
        self.query("database_name", Command::new("DATABASE_NAME"))
            .await
    }

    pub async fn pool_stats(&self) -> Option<PoolStats> {
        self.manager
            .pool_stats(&self.tenant_id, BackendType::Document)
            .await
    }

    /// Close this tenant's document-store pool
    pub async fn close(&self) -> bool {
        self.manager
            .close_connection(&self.tenant_id, BackendType::Document)
            .await
    }

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        command: Command,
    ) -> Result<T> {
        let name = command.name().to_string();
        let reply = self.call(operation, command).await?;
        decode(&name, reply)
    }

    async fn call(&self, operation: &str, command: Command) -> Result<Reply> {
        self.manager
            .execute_with_circuit_breaker(
                &self.tenant_id,
                BackendType::Document,
                self.tier,
                operation,
                move |conn| Box::pin(async move { Ok(conn.execute(command).await?) }),
            )
            .await
    }
}
