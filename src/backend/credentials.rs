//! Per-tenant connection-string lookup
//!
//! The manager asks a [`CredentialStore`] for a tenant's encrypted connection
//! string each time a pool needs a new physical connection. Stores only ever
//! hand out ciphertext; decryption happens inside the manager at connect time.

use super::{BackendType, ConnectionKey};
use crate::credential::EncryptedConnectionString;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Source of encrypted connection strings
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Encrypted connection string for a (tenant, backend) pair, if any
    async fn connection_string(
        &self,
        key: &ConnectionKey,
    ) -> Result<Option<EncryptedConnectionString>>;
}

/// In-process credential store
///
/// Suitable for tests, the CLI and deployments that load tenant credentials
/// once at startup.
#[derive(Debug, Default)]
pub struct StaticCredentialStore {
    entries: RwLock<HashMap<ConnectionKey, EncryptedConnectionString>>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) the connection string for a tenant's backend
    pub fn insert(
        &self,
        tenant_id: impl Into<String>,
        backend: BackendType,
        encrypted: EncryptedConnectionString,
    ) {
        let key = ConnectionKey::new(tenant_id, backend);
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, encrypted);
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(
        self,
        tenant_id: impl Into<String>,
        backend: BackendType,
        encrypted: EncryptedConnectionString,
    ) -> Self {
        self.insert(tenant_id, backend, encrypted);
        self
    }

    pub fn remove(&self, tenant_id: &str, backend: &BackendType) -> bool {
        let key = ConnectionKey::new(tenant_id, backend.clone());
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn connection_string(
        &self,
        key: &ConnectionKey,
    ) -> Result<Option<EncryptedConnectionString>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialCodec;

    #[tokio::test]
    async fn test_lookup_by_tenant_and_backend() {
        let codec = CredentialCodec::new([3u8; 32]);
        let store = StaticCredentialStore::new()
            .with("a", BackendType::KeyValue, codec.encrypt("redis://a").unwrap())
            .with("a", BackendType::Document, codec.encrypt("mongodb://a").unwrap());

        let kv = ConnectionKey::new("a", BackendType::KeyValue);
        let found = store.connection_string(&kv).await.unwrap().unwrap();
        assert_eq!(
            secrecy::ExposeSecret::expose_secret(&codec.decrypt(&found).unwrap()),
            "redis://a"
        );

        let missing = ConnectionKey::new("b", BackendType::KeyValue);
        assert!(store.connection_string(&missing).await.unwrap().is_none());
    }

    #[test]
    fn test_remove() {
        let codec = CredentialCodec::new([3u8; 32]);
        let store = StaticCredentialStore::new();
        store.insert("a", BackendType::KeyValue, codec.encrypt("redis://a").unwrap());
        assert_eq!(store.len(), 1);

        assert!(store.remove("a", &BackendType::KeyValue));
        assert!(!store.remove("a", &BackendType::KeyValue));
        assert!(store.is_empty());
    }
}
