//! Tessera Core Resilience: Pure-logic fault tolerance primitives
//!
//! # Overview
//!
//! This crate provides the two building blocks the tenant connection manager
//! composes for every (tenant, backend) pair:
//!
//! - **Circuit Breaker**: Fails fast while a backend is unhealthy, probing it
//!   with a single trial call once the reset timeout has elapsed
//! - **Connection Pool**: Bounded connection reuse with a FIFO wait queue,
//!   liveness checks on release and idle reaping
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Tenants, tiers or credentials
//! - Wire protocols of the pooled backends
//! - Metrics exporters
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Connection Manager              │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Circuit Breaker                   │  ← Fail-fast protection
//! │  (Tracks failures, opens on threshold)  │
//! └─────────────┬───────────────────────────┘
//!               │ admitted
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Connection Pool                   │  ← Bounded reuse
//! │  (FIFO waiters, liveness on release)    │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!          Backend store
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use tessera_core_resilience::{
//!     CircuitBreaker, CircuitBreakerConfig, ConnectionFactory, ConnectionPool, PoolConfig,
//!     ResilienceError,
//! };
//! use std::sync::Arc;
//!
//! struct Conn;
//! struct Factory;
//!
//! #[async_trait::async_trait]
//! impl ConnectionFactory<Conn> for Factory {
//!     async fn create(&self) -> Result<Conn, ResilienceError> {
//!         Ok(Conn)
//!     }
//!
//!     async fn is_healthy(&self, _conn: &mut Conn) -> bool {
//!         true
//!     }
//! }
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let breaker = CircuitBreaker::new("tenant-a/kv", CircuitBreakerConfig::default());
//! let pool = ConnectionPool::new(Arc::new(Factory), PoolConfig::default());
//!
//! let permit = breaker.try_acquire()?;
//! let conn = pool.acquire().await?;
//! // Use connection...
//! pool.release(conn).await;
//! permit.succeed();
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod connection_pool;
pub mod error;

// Re-export main types for convenience
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitPermit, CircuitState, CircuitTransition,
};
pub use connection_pool::{ConnectionFactory, ConnectionPool, PoolConfig, PoolStats, PooledConnection};
pub use error::ResilienceError;
