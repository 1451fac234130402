//! Shared fixture: a manager over in-memory drivers with two tenants

#![allow(dead_code)]

use std::sync::Arc;
use tessera::backend::{
    BackendType, Command, MemoryDocumentDriver, MemoryKeyValueDriver, StaticCredentialStore,
};
use tessera::{ConnectionManager, CredentialCodec, ManagerConfig, MetricsRegistry, Result, Tier};

pub const TENANT_A: &str = "tenant-a";
pub const TENANT_B: &str = "tenant-b";

pub struct Harness {
    pub manager: ConnectionManager,
    pub kv: MemoryKeyValueDriver,
    pub docs: MemoryDocumentDriver,
    pub metrics: MetricsRegistry,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        tessera::logging::init_test_logging();

        let codec = CredentialCodec::new([42u8; 32]);
        let store = StaticCredentialStore::new();
        for (i, tenant) in [TENANT_A, TENANT_B].into_iter().enumerate() {
            store.insert(
                tenant,
                BackendType::KeyValue,
                codec
                    .encrypt(&format!("rediss://kv.internal:6380/{}", i))
                    .unwrap(),
            );
            store.insert(
                tenant,
                BackendType::Document,
                codec
                    .encrypt(&format!("mongodb+srv://docs.internal/{}", tenant.replace('-', "_")))
                    .unwrap(),
            );
        }

        let kv = MemoryKeyValueDriver::new();
        let docs = MemoryDocumentDriver::new();
        let metrics = MetricsRegistry::new().unwrap();
        let manager = ConnectionManager::builder()
            .config(config)
            .driver(Arc::new(kv.clone()))
            .driver(Arc::new(docs.clone()))
            .credentials(Arc::new(store))
            .codec(codec)
            .metrics(metrics.clone())
            .build()
            .unwrap();

        Self {
            manager,
            kv,
            docs,
            metrics,
        }
    }

    /// Run one key-value command through the breaker
    pub async fn kv_command(&self, tenant: &str, command: Command) -> Result<serde_json::Value> {
        self.manager
            .execute_with_circuit_breaker(tenant, BackendType::KeyValue, Tier::Free, "command", |conn| {
                Box::pin(async move { Ok(conn.execute(command).await?) })
            })
            .await
    }

    pub async fn kv_ping(&self, tenant: &str) -> Result<serde_json::Value> {
        self.kv_command(tenant, Command::new("PING")).await
    }
}
