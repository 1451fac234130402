//! Opens physical connections for one (tenant, backend) key

use crate::backend::{Connection, ConnectionKey, CredentialStore, Driver, TransportSecurity};
use crate::credential::CredentialCodec;
use crate::error::{Error, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tessera_core_resilience::{ConnectionFactory, ResilienceError};
use tracing::debug;

/// Resolves, decrypts and checks the tenant's connection string, then
/// connects through the backend's driver
pub(crate) struct TenantConnectionFactory {
    pub key: ConnectionKey,
    pub driver: Arc<dyn Driver>,
    pub credentials: Arc<dyn CredentialStore>,
    pub codec: Arc<CredentialCodec>,
    pub require_tls: bool,
}

impl TenantConnectionFactory {
    async fn open(&self) -> Result<Box<dyn Connection>> {
        let encrypted = self
            .credentials
            .connection_string(&self.key)
            .await?
            .ok_or_else(|| Error::CredentialsNotFound {
                tenant_id: self.key.tenant_id.clone(),
                backend: self.key.backend.clone(),
            })?;

        // Plaintext lives only until this function returns
        let uri = self.codec.decrypt(&encrypted)?;

        let transport =
            TransportSecurity::from_uri(uri.expose_secret()).map_err(|source| Error::Connection {
                tenant_id: self.key.tenant_id.clone(),
                backend: self.key.backend.clone(),
                source,
            })?;
        if self.require_tls && !transport.is_tls() {
            return Err(Error::InsecureTransport {
                tenant_id: self.key.tenant_id.clone(),
                backend: self.key.backend.clone(),
            });
        }

        let conn = self
            .driver
            .connect(uri.expose_secret())
            .await
            .map_err(|source| Error::Connection {
                tenant_id: self.key.tenant_id.clone(),
                backend: self.key.backend.clone(),
                source,
            })?;

        debug!(
            tenant_id = %self.key.tenant_id,
            backend = %self.key.backend,
            transport = %transport,
            "Opened backend connection"
        );
        Ok(conn)
    }
}

#[async_trait]
impl ConnectionFactory<Box<dyn Connection>> for TenantConnectionFactory {
    async fn create(&self) -> std::result::Result<Box<dyn Connection>, ResilienceError> {
        self.open().await.map_err(ResilienceError::connect)
    }

    async fn is_healthy(&self, conn: &mut Box<dyn Connection>) -> bool {
        conn.ping().await.is_ok()
    }

    async fn close(&self, mut conn: Box<dyn Connection>) {
        if let Err(e) = conn.close().await {
            debug!(
                tenant_id = %self.key.tenant_id,
                backend = %self.key.backend,
                error = %e,
                "Error while closing backend connection"
            );
        }
    }
}
