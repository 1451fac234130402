/*!
 * Tessera - Multi-tenant connection manager
 *
 * Brokers pooled, fault-contained access to per-tenant backend stores
 * (key-value and document stores, extensible to others) from one shared
 * process:
 * - One bounded connection pool and one circuit breaker per (tenant, backend)
 * - Pool limits sized by the tenant's subscription tier
 * - Connection strings encrypted at rest with AES-256-GCM
 * - Prometheus metrics labelled by tenant, backend and tier
 * - Typed key-value and document-store clients over the pooled connections
 */

pub mod backend;
pub mod cli_style;
pub mod config;
pub mod credential;
pub mod error;
pub mod logging;
pub mod manager;
pub mod tier;

// Re-export commonly used types
pub use backend::{
    BackendType, Command, Connection, ConnectionKey, CredentialStore, DocumentClient, Driver,
    KeyValueClient,
};
pub use config::{LogLevel, LoggingConfig, ManagerConfig};
pub use credential::{
    decrypt_connection_string, encrypt_connection_string, CredentialCodec,
    EncryptedConnectionString,
};
pub use error::{Error, Result};
pub use manager::{
    CircuitStatus, ConnectionManager, ConnectionManagerBuilder, ConnectionMetadata, ReaperHandle,
};
pub use tessera_core_resilience::{CircuitState, PoolStats};
pub use tessera_observability::MetricsRegistry;
pub use tier::{Tier, TierLimits, TierPolicy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
