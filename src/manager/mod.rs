//! Multi-tenant connection manager
//!
//! The manager owns one [`ConnectionPool`](tessera_core_resilience::ConnectionPool)
//! and one [`CircuitBreaker`](tessera_core_resilience::CircuitBreaker) per
//! (tenant, backend) key, created lazily on first use and sized from the
//! caller's [`Tier`]. Every backend call goes through
//! [`ConnectionManager::execute_with_circuit_breaker`]:
//!
//! ```text
//!  caller ──► breaker ──► pool.acquire ──► f(conn) ──► pool.release
//!               │              │              │
//!          CircuitOpen   PoolExhausted   operation error
//! ```
//!
//! Tenants never share a pool, a breaker or counters. The only shared state
//! is the metrics registry.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tessera::backend::{BackendType, Command, MemoryKeyValueDriver, StaticCredentialStore};
//! use tessera::{ConnectionManager, CredentialCodec, ManagerConfig, Tier};
//!
//! # async fn example() -> tessera::Result<()> {
//! let codec = CredentialCodec::from_env()?;
//! let store = StaticCredentialStore::new().with(
//!     "tenant-a",
//!     BackendType::KeyValue,
//!     codec.encrypt("redis://localhost:6379/0")?,
//! );
//!
//! let manager = ConnectionManager::builder()
//!     .config(ManagerConfig::default())
//!     .driver(Arc::new(MemoryKeyValueDriver::new()))
//!     .credentials(Arc::new(store))
//!     .codec(codec)
//!     .build()?;
//!
//! let reply = manager
//!     .execute_with_circuit_breaker("tenant-a", BackendType::KeyValue, Tier::Free, "ping", |conn| {
//!         Box::pin(async move { Ok(conn.execute(Command::new("PING")).await?) })
//!     })
//!     .await?;
//! assert_eq!(reply, "PONG");
//! # Ok(())
//! # }
//! ```

mod entry;
mod factory;
mod reaper;

pub use entry::ConnectionMetadata;
pub use reaper::ReaperHandle;

use crate::backend::{
    BackendType, Connection, ConnectionKey, CredentialStore, Driver, DriverRegistry,
};
use crate::config::ManagerConfig;
use crate::credential::CredentialCodec;
use crate::error::{Error, Result};
use crate::tier::Tier;
use entry::{PoolTimings, TenantEntry};
use factory::TenantConnectionFactory;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tessera_core_resilience::{CircuitState, CircuitTransition, PoolStats};
use tessera_observability::MetricsRegistry;
use tokio::sync::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Breaker snapshot for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitStatus {
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// Builder for [`ConnectionManager`]
pub struct ConnectionManagerBuilder {
    config: ManagerConfig,
    drivers: DriverRegistry,
    credentials: Option<Arc<dyn CredentialStore>>,
    codec: Option<CredentialCodec>,
    metrics: Option<MetricsRegistry>,
}

impl ConnectionManagerBuilder {
    fn new() -> Self {
        Self {
            config: ManagerConfig::default(),
            drivers: DriverRegistry::new(),
            credentials: None,
            codec: None,
            metrics: None,
        }
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a driver for the backend type it reports
    pub fn driver(self, driver: Arc<dyn Driver>) -> Self {
        self.drivers.register(driver);
        self
    }

    pub fn credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Codec for stored connection strings (default: from the environment)
    pub fn codec(mut self, codec: CredentialCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Metrics registry (default: the process-wide registry)
    pub fn metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<ConnectionManager> {
        self.config.validate()?;

        let credentials = self
            .credentials
            .ok_or_else(|| Error::Config("a credential store is required".to_string()))?;
        let codec = match self.codec {
            Some(codec) => codec,
            None => CredentialCodec::from_env()?,
        };
        let metrics = self
            .metrics
            .unwrap_or_else(|| MetricsRegistry::global().clone());

        Ok(ConnectionManager {
            inner: Arc::new(ManagerInner {
                config: self.config,
                drivers: self.drivers,
                credentials,
                codec: Arc::new(codec),
                metrics,
                entries: RwLock::new(HashMap::new()),
            }),
        })
    }
}

struct ManagerInner {
    config: ManagerConfig,
    drivers: DriverRegistry,
    credentials: Arc<dyn CredentialStore>,
    codec: Arc<CredentialCodec>,
    metrics: MetricsRegistry,
    entries: RwLock<HashMap<ConnectionKey, Arc<TenantEntry>>>,
}

/// Tenant-aware pool and breaker manager
///
/// Cheap to clone; clones share the same pools.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.inner.config)
            .field("drivers", &self.inner.drivers)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn builder() -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Run `f` on a pooled connection under circuit-breaker protection
    ///
    /// Fails with [`Error::CircuitOpen`] without touching the pool while the
    /// key's breaker is open, with [`Error::PoolExhausted`] when no
    /// connection frees up within the acquire timeout, or with the error `f`
    /// returned, unchanged. Every outcome is recorded in the key's metadata,
    /// its breaker and the metrics registry. Nothing is retried.
    pub async fn execute_with_circuit_breaker<T, F>(
        &self,
        tenant_id: &str,
        backend: BackendType,
        tier: Tier,
        operation: &str,
        f: F,
    ) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut dyn Connection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let key = ConnectionKey::new(tenant_id, backend);
        let entry = self.entry(&key, tier).await?;
        let labels = entry.labels();
        let metrics = &self.inner.metrics;

        let permit = match entry.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                metrics.record_rejection(labels, "circuit_open");
                debug!(
                    tenant_id = %key.tenant_id,
                    backend = %key.backend,
                    operation,
                    "Rejected call: circuit breaker open"
                );
                return Err(Error::CircuitOpen {
                    tenant_id: key.tenant_id,
                    backend: key.backend,
                });
            }
        };
        if let Some(transition) = permit.transition() {
            self.on_transition(&entry, transition);
        }

        let started = Instant::now();
        let mut conn = match entry.pool.acquire().await {
            Ok(conn) => conn,
            Err(err) => {
                let err = Error::from_resilience(err, &key);
                entry.record_error();
                metrics.record_error(labels, operation, err.kind(), None);

                // Only a backend refusing connections counts against the breaker
                if matches!(err, Error::Connection { .. }) {
                    if let Some(transition) = permit.fail() {
                        self.on_transition(&entry, transition);
                    }
                } else {
                    drop(permit);
                }

                warn!(
                    tenant_id = %key.tenant_id,
                    backend = %key.backend,
                    operation,
                    error = %err,
                    "Could not obtain a connection"
                );
                self.publish_pool(&entry);
                return Err(err);
            }
        };
        self.publish_pool(&entry);

        let outcome = match self.inner.config.operation_timeout() {
            Some(limit) => tokio::time::timeout(limit, f(&mut **conn))
                .await
                .unwrap_or_else(|_| {
                    Err(Error::OperationTimeout {
                        operation: operation.to_string(),
                        timeout: limit,
                    })
                }),
            None => f(&mut **conn).await,
        };
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Ok(value) => {
                entry.pool.release(conn).await;
                entry.record_query(false);
                if let Some(transition) = permit.succeed() {
                    self.on_transition(&entry, transition);
                }
                metrics.record_success(labels, operation, elapsed);
                self.publish_pool(&entry);
                Ok(value)
            }
            Err(err) => {
                // A timed-out command may have left a reply in flight
                if matches!(err, Error::OperationTimeout { .. }) {
                    entry.pool.discard(conn).await;
                } else {
                    entry.pool.release(conn).await;
                }
                entry.record_query(true);
                if let Some(transition) = permit.fail() {
                    self.on_transition(&entry, transition);
                }
                metrics.record_error(labels, operation, err.kind(), Some(elapsed));
                debug!(
                    tenant_id = %key.tenant_id,
                    backend = %key.backend,
                    operation,
                    error = %err,
                    "Operation failed"
                );
                self.publish_pool(&entry);
                Err(err)
            }
        }
    }

    /// Usage snapshot for one key
    pub async fn connection_metadata(
        &self,
        tenant_id: &str,
        backend: BackendType,
    ) -> Option<ConnectionMetadata> {
        self.lookup(&ConnectionKey::new(tenant_id, backend))
            .await
            .map(|entry| entry.metadata())
    }

    /// Usage snapshots for every key, ordered by key
    pub async fn all_connection_metadata(&self) -> Vec<ConnectionMetadata> {
        self.snapshot()
            .await
            .iter()
            .map(|entry| entry.metadata())
            .collect()
    }

    /// Pool occupancy for one key; `None` if the key was never used
    pub async fn pool_stats(&self, tenant_id: &str, backend: BackendType) -> Option<PoolStats> {
        self.lookup(&ConnectionKey::new(tenant_id, backend))
            .await
            .map(|entry| entry.pool.stats())
    }

    /// Pool occupancy for every key, ordered by key
    pub async fn all_pool_stats(&self) -> Vec<(ConnectionKey, PoolStats)> {
        self.snapshot()
            .await
            .iter()
            .map(|entry| (entry.key.clone(), entry.pool.stats()))
            .collect()
    }

    /// False only while the key's breaker is open
    pub async fn check_health(&self, tenant_id: &str, backend: BackendType) -> bool {
        self.lookup(&ConnectionKey::new(tenant_id, backend))
            .await
            .map_or(true, |entry| entry.breaker.is_healthy())
    }

    /// Breaker state and failure streak for one key
    pub async fn circuit_status(
        &self,
        tenant_id: &str,
        backend: BackendType,
    ) -> Option<CircuitStatus> {
        self.lookup(&ConnectionKey::new(tenant_id, backend))
            .await
            .map(|entry| CircuitStatus {
                state: entry.breaker.state(),
                consecutive_failures: entry.breaker.failure_count(),
            })
    }

    /// Prometheus text exposition of every metric
    pub async fn metrics(&self) -> Result<String> {
        for entry in self.snapshot().await {
            self.publish_pool(&entry);
        }
        Ok(self.inner.metrics.render()?)
    }

    pub fn metrics_registry(&self) -> &MetricsRegistry {
        &self.inner.metrics
    }

    /// Close and forget one key; other keys of the tenant are untouched
    pub async fn close_connection(&self, tenant_id: &str, backend: BackendType) -> bool {
        let key = ConnectionKey::new(tenant_id, backend);
        let removed = self.inner.entries.write().await.remove(&key);

        match removed {
            Some(entry) => {
                self.shutdown(&entry).await;
                true
            }
            None => false,
        }
    }

    /// Close idle connections unused for the configured idle timeout
    ///
    /// Keys stay registered even when their pool ends up empty. Returns the
    /// number of connections closed.
    pub async fn close_idle_connections(&self) -> usize {
        let threshold = self.inner.config.idle_timeout();
        let mut closed = 0;

        for entry in self.snapshot().await {
            let count = entry.pool.close_idle(threshold).await;
            if count > 0 {
                debug!(
                    tenant_id = %entry.key.tenant_id,
                    backend = %entry.key.backend,
                    closed = count,
                    "Closed idle connections"
                );
                self.publish_pool(&entry);
            }
            closed += count;
        }

        closed
    }

    /// Close every pool and forget every key
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<TenantEntry>> = {
            let mut entries = self.inner.entries.write().await;
            entries.drain().map(|(_, entry)| entry).collect()
        };

        for entry in &drained {
            self.shutdown(entry).await;
        }

        info!(pools = drained.len(), "Closed all connection pools");
        drained.len()
    }

    /// Run [`close_idle_connections`](Self::close_idle_connections) every
    /// `reap_interval` until the returned handle is dropped
    pub fn spawn_idle_reaper(&self) -> ReaperHandle {
        let manager = self.clone();
        let period = self.inner.config.reap_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let closed = manager.close_idle_connections().await;
                if closed > 0 {
                    info!(closed, "Idle reaper closed connections");
                }
            }
        });

        ReaperHandle::new(handle)
    }

    /// Open connections for a key until its tier's `min_size` are idle
    pub async fn prewarm(&self, tenant_id: &str, backend: BackendType, tier: Tier) -> Result<usize> {
        let key = ConnectionKey::new(tenant_id, backend);
        let entry = self.entry(&key, tier).await?;

        let created = entry
            .pool
            .warm_up()
            .await
            .map_err(|e| Error::from_resilience(e, &key))?;
        self.publish_pool(&entry);
        Ok(created)
    }

    async fn lookup(&self, key: &ConnectionKey) -> Option<Arc<TenantEntry>> {
        self.inner.entries.read().await.get(key).cloned()
    }

    async fn snapshot(&self) -> Vec<Arc<TenantEntry>> {
        let mut entries: Vec<_> = self.inner.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Get the entry for a key, creating it on first use
    async fn entry(&self, key: &ConnectionKey, tier: Tier) -> Result<Arc<TenantEntry>> {
        if let Some(entry) = self.lookup(key).await {
            if entry.tier != tier {
                debug!(
                    tenant_id = %key.tenant_id,
                    backend = %key.backend,
                    pool_tier = %entry.tier,
                    requested_tier = %tier,
                    "Tier differs from open pool; applies once the pool is recreated"
                );
            }
            return Ok(entry);
        }

        let driver = self
            .inner
            .drivers
            .get(&key.backend)
            .ok_or_else(|| Error::DriverNotRegistered(key.backend.clone()))?;

        let entry = {
            let mut entries = self.inner.entries.write().await;
            if let Some(entry) = entries.get(key) {
                return Ok(entry.clone());
            }
            let entry = Arc::new(self.create_entry(key.clone(), tier, driver));
            entries.insert(key.clone(), entry.clone());
            entry
        };

        let limits = self.inner.config.tiers.limits_for(tier);
        info!(
            tenant_id = %key.tenant_id,
            backend = %key.backend,
            tier = %tier,
            max_size = limits.max_size,
            "Created connection pool"
        );
        self.inner
            .metrics
            .set_circuit_state(entry.labels(), CircuitState::Closed.as_gauge());
        self.publish_pool(&entry);

        if self.inner.config.prewarm {
            self.spawn_warm_up(entry.clone());
        }

        Ok(entry)
    }

    fn create_entry(&self, key: ConnectionKey, tier: Tier, driver: Arc<dyn Driver>) -> TenantEntry {
        let config = &self.inner.config;
        let factory = TenantConnectionFactory {
            key: key.clone(),
            driver,
            credentials: self.inner.credentials.clone(),
            codec: self.inner.codec.clone(),
            require_tls: config.require_tls,
        };
        let timings = PoolTimings {
            acquire_timeout: config.acquire_timeout(),
            idle_timeout: config.idle_timeout(),
            max_lifetime: config.max_lifetime(),
        };

        TenantEntry::new(key, tier, config.tiers.limits_for(tier), timings, factory)
    }

    fn spawn_warm_up(&self, entry: Arc<TenantEntry>) {
        let manager = self.clone();
        tokio::spawn(async move {
            match entry.pool.warm_up().await {
                Ok(created) => {
                    debug!(
                        tenant_id = %entry.key.tenant_id,
                        backend = %entry.key.backend,
                        created,
                        "Pre-warmed connection pool"
                    );
                    manager.publish_pool(&entry);
                }
                Err(e) => warn!(
                    tenant_id = %entry.key.tenant_id,
                    backend = %entry.key.backend,
                    error = %Error::from_resilience(e, &entry.key),
                    "Pool pre-warm failed"
                ),
            }
        });
    }

    async fn shutdown(&self, entry: &TenantEntry) {
        let closed = entry.pool.close().await;
        self.inner.metrics.forget_key(entry.labels());
        info!(
            tenant_id = %entry.key.tenant_id,
            backend = %entry.key.backend,
            closed,
            "Closed connection pool"
        );
    }

    fn on_transition(&self, entry: &TenantEntry, transition: CircuitTransition) {
        self.inner.metrics.record_transition(
            entry.labels(),
            transition.event(),
            transition.target().as_gauge(),
        );
    }

    fn publish_pool(&self, entry: &TenantEntry) {
        // A closed key's series were already dropped by `shutdown`
        if entry.pool.is_closed() {
            return;
        }
        let stats = entry.pool.stats();
        self.inner
            .metrics
            .set_pool_stats(entry.labels(), stats.size, stats.available, stats.pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, MemoryKeyValueDriver, StaticCredentialStore};
    use std::time::Duration;

    fn manager(config: ManagerConfig, uri: &str) -> (ConnectionManager, MemoryKeyValueDriver) {
        let codec = CredentialCodec::new([5u8; 32]);
        let store = StaticCredentialStore::new().with(
            "tenant-a",
            BackendType::KeyValue,
            codec.encrypt(uri).unwrap(),
        );
        let driver = MemoryKeyValueDriver::new();
        let manager = ConnectionManager::builder()
            .config(config)
            .driver(Arc::new(driver.clone()))
            .credentials(Arc::new(store))
            .codec(codec)
            .metrics(MetricsRegistry::new().unwrap())
            .build()
            .unwrap();
        (manager, driver)
    }

    async fn ping(manager: &ConnectionManager, tenant: &str) -> Result<serde_json::Value> {
        manager
            .execute_with_circuit_breaker(tenant, BackendType::KeyValue, Tier::Free, "ping", |conn| {
                Box::pin(async move { Ok(conn.execute(Command::new("PING")).await?) })
            })
            .await
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let (manager, driver) = manager(ManagerConfig::default(), "redis://localhost");

        let err = ping(&manager, "stranger").await.unwrap_err();
        assert!(matches!(err, Error::CredentialsNotFound { .. }));
        assert_eq!(driver.stats().connects(), 0);

        let meta = manager
            .connection_metadata("stranger", BackendType::KeyValue)
            .await
            .unwrap();
        assert_eq!((meta.query_count, meta.error_count), (0, 1));
        assert!(manager.check_health("stranger", BackendType::KeyValue).await);
    }

    #[tokio::test]
    async fn test_driver_not_registered() {
        let (manager, _) = manager(ManagerConfig::default(), "redis://localhost");
        let err = manager
            .execute_with_circuit_breaker("tenant-a", BackendType::Document, Tier::Pro, "find", |_conn| {
                Box::pin(async move { Ok(()) })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DriverNotRegistered(BackendType::Document)));
        assert!(manager.all_connection_metadata().await.is_empty());
    }

    #[tokio::test]
    async fn test_require_tls_refuses_plaintext() {
        let config = ManagerConfig {
            require_tls: true,
            ..Default::default()
        };
        let (manager, driver) = manager(config, "redis://localhost:6379");

        let err = ping(&manager, "tenant-a").await.unwrap_err();
        assert!(matches!(err, Error::InsecureTransport { .. }));
        assert_eq!(driver.stats().connects(), 0);
    }

    #[tokio::test]
    async fn test_require_tls_accepts_tls() {
        let config = ManagerConfig {
            require_tls: true,
            ..Default::default()
        };
        let (manager, _) = manager(config, "rediss://localhost:6380");
        assert_eq!(ping(&manager, "tenant-a").await.unwrap(), "PONG");
    }

    #[tokio::test]
    async fn test_connect_failures_open_the_breaker() {
        let config = ManagerConfig {
            tiers: crate::tier::TierPolicy::default().with_breaker(2, Duration::from_secs(30)),
            ..Default::default()
        };
        let (manager, driver) = manager(config, "redis://localhost");
        driver.set_fail_connect(true);

        for _ in 0..2 {
            let err = ping(&manager, "tenant-a").await.unwrap_err();
            assert!(matches!(err, Error::Connection { .. }));
            assert!(err.is_backend_origin());
        }

        let err = ping(&manager, "tenant-a").await.unwrap_err();
        assert!(matches!(err, Error::CircuitOpen { .. }));
        assert!(!manager.check_health("tenant-a", BackendType::KeyValue).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_timeout_counts_as_failure() {
        let config = ManagerConfig {
            operation_timeout_ms: Some(100),
            ..Default::default()
        };
        let (manager, driver) = manager(config, "redis://localhost");
        driver.set_latency(Duration::from_secs(1));

        let err = ping(&manager, "tenant-a").await.unwrap_err();
        assert!(matches!(err, Error::OperationTimeout { .. }));

        let meta = manager
            .connection_metadata("tenant-a", BackendType::KeyValue)
            .await
            .unwrap();
        assert_eq!((meta.query_count, meta.error_count), (1, 1));

        let status = manager
            .circuit_status("tenant-a", BackendType::KeyValue)
            .await
            .unwrap();
        assert_eq!(status.consecutive_failures, 1);

        // The timed-out connection is not reused
        let stats = manager.pool_stats("tenant-a", BackendType::KeyValue).await.unwrap();
        assert_eq!(stats.size, 0);
    }

    #[tokio::test]
    async fn test_tier_is_fixed_at_pool_creation() {
        let (manager, _) = manager(ManagerConfig::default(), "redis://localhost");
        ping(&manager, "tenant-a").await.unwrap();

        manager
            .execute_with_circuit_breaker("tenant-a", BackendType::KeyValue, Tier::Enterprise, "ping", |conn| {
                Box::pin(async move { Ok(conn.execute(Command::new("PING")).await?) })
            })
            .await
            .unwrap();

        let stats = manager.pool_stats("tenant-a", BackendType::KeyValue).await.unwrap();
        assert_eq!(stats.max_size, 2);

        assert!(manager.close_connection("tenant-a", BackendType::KeyValue).await);
        manager
            .execute_with_circuit_breaker("tenant-a", BackendType::KeyValue, Tier::Enterprise, "ping", |conn| {
                Box::pin(async move { Ok(conn.execute(Command::new("PING")).await?) })
            })
            .await
            .unwrap();
        let stats = manager.pool_stats("tenant-a", BackendType::KeyValue).await.unwrap();
        assert_eq!(stats.max_size, 50);
    }

    #[tokio::test]
    async fn test_explicit_prewarm() {
        let (manager, driver) = manager(ManagerConfig::default(), "redis://localhost");
        let created = manager
            .prewarm("tenant-a", BackendType::KeyValue, Tier::Free)
            .await
            .unwrap();

        assert_eq!(created, 1);
        assert_eq!(driver.stats().connects(), 1);
        let stats = manager.pool_stats("tenant-a", BackendType::KeyValue).await.unwrap();
        assert_eq!((stats.size, stats.available), (1, 1));
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let (manager, _) = manager(ManagerConfig::default(), "redis://localhost");
        ping(&manager, "tenant-a").await.unwrap();

        let text = manager.metrics().await.unwrap();
        assert!(text.contains("tessera_queries_total"));
        assert!(text.contains("tessera_pool_connections"));
        assert!(text.contains("tenant=\"tenant-a\""));
        assert!(!text.contains("redis://"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_in_flight_at_close_leaves_no_pool_gauges() {
        let (manager, driver) = manager(ManagerConfig::default(), "redis://localhost");
        ping(&manager, "tenant-a").await.unwrap();
        driver.set_latency(Duration::from_secs(1));

        let in_flight = {
            let manager = manager.clone();
            tokio::spawn(async move { ping(&manager, "tenant-a").await })
        };
        while manager
            .pool_stats("tenant-a", BackendType::KeyValue)
            .await
            .map_or(0, |stats| stats.in_use)
            < 1
        {
            tokio::task::yield_now().await;
        }

        assert!(manager.close_connection("tenant-a", BackendType::KeyValue).await);
        in_flight.await.unwrap().unwrap();

        let text = manager.metrics().await.unwrap();
        assert!(text.contains("tessera_queries_total"));
        assert!(!text.contains("tessera_pool_connections"));
    }

    #[test]
    fn test_build_requires_credentials() {
        let result = ConnectionManager::builder()
            .codec(CredentialCodec::new([0u8; 32]))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
