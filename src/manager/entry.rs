//! Per-key state: one pool, one breaker and usage counters

use super::factory::TenantConnectionFactory;
use crate::backend::{BackendType, Connection, ConnectionKey};
use crate::tier::{Tier, TierLimits};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tessera_core_resilience::{CircuitBreaker, ConnectionPool, PoolConfig};
use tessera_observability::KeyLabels;

/// Read-only snapshot of a key's usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionMetadata {
    pub tenant_id: String,
    pub backend_type: BackendType,
    pub tier: Tier,
    pub query_count: u64,
    pub error_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// Pool timing shared by every key of a manager
#[derive(Debug, Clone, Copy)]
pub(crate) struct PoolTimings {
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Option<Duration>,
}

pub(crate) struct TenantEntry {
    pub key: ConnectionKey,
    pub tier: Tier,
    pub pool: ConnectionPool<Box<dyn Connection>>,
    pub breaker: CircuitBreaker,
    created_at: DateTime<Utc>,
    last_used_at: Mutex<DateTime<Utc>>,
    query_count: AtomicU64,
    error_count: AtomicU64,
}

impl TenantEntry {
    pub fn new(
        key: ConnectionKey,
        tier: Tier,
        limits: &TierLimits,
        timings: PoolTimings,
        factory: TenantConnectionFactory,
    ) -> Self {
        let pool = ConnectionPool::new(
            Arc::new(factory),
            PoolConfig {
                max_size: limits.max_size,
                min_idle: limits.min_size,
                max_pending: limits.max_pending,
                idle_timeout: Some(timings.idle_timeout),
                max_lifetime: timings.max_lifetime,
                acquire_timeout: timings.acquire_timeout,
            },
        );
        let breaker = CircuitBreaker::new(key.to_string(), limits.breaker_config());
        let now = Utc::now();

        Self {
            key,
            tier,
            pool,
            breaker,
            created_at: now,
            last_used_at: Mutex::new(now),
            query_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    pub fn labels(&self) -> KeyLabels<'_> {
        KeyLabels::new(&self.key.tenant_id, self.key.backend.as_str(), self.tier.as_str())
    }

    /// Count a query that reached the backend
    pub fn record_query(&self, failed: bool) {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        if failed {
            self.error_count.fetch_add(1, Ordering::SeqCst);
        }
        self.touch();
    }

    /// Count a failure that happened before any query ran
    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::SeqCst);
        self.touch();
    }

    fn touch(&self) {
        *self.last_used_at.lock().unwrap_or_else(|e| e.into_inner()) = Utc::now();
    }

    pub fn metadata(&self) -> ConnectionMetadata {
        ConnectionMetadata {
            tenant_id: self.key.tenant_id.clone(),
            backend_type: self.key.backend.clone(),
            tier: self.tier,
            query_count: self.query_count.load(Ordering::SeqCst),
            error_count: self.error_count.load(Ordering::SeqCst),
            created_at: self.created_at,
            last_used_at: *self.last_used_at.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }
}
