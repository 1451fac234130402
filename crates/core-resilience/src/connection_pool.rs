//! Generic connection pool for reusable connections
//!
//! Provides bounded connection reuse with a FIFO wait queue, idle reaping,
//! lifetime limits and liveness checks on release.
//!
//! Slots are handed out by a fair semaphore sized to `max_size`: a caller
//! holds one permit for as long as it holds a connection, so waiters are
//! served strictly in arrival order and a released connection goes to the
//! longest-waiting caller.

use super::error::ResilienceError;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;
use tracing::debug;

/// Configuration for connection pool behavior
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: usize,
    /// Minimum number of idle connections kept warm by [`ConnectionPool::warm_up`]
    pub min_idle: usize,
    /// Maximum number of callers allowed to wait for a connection
    pub max_pending: usize,
    /// Maximum time a connection can remain idle before being reaped
    pub idle_timeout: Option<Duration>,
    /// Maximum lifetime of a connection
    pub max_lifetime: Option<Duration>,
    /// Timeout for acquiring a connection from the pool
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: 0,
            max_pending: 100,
            idle_timeout: Some(Duration::from_secs(300)), // 5 minutes
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// Factory trait for creating and validating connections
#[async_trait::async_trait]
pub trait ConnectionFactory<T: Send + 'static>: Send + Sync {
    /// Create a new connection
    async fn create(&self) -> Result<T, ResilienceError>;

    /// Check if a connection is still alive
    async fn is_healthy(&self, conn: &mut T) -> bool;

    /// Close a connection (optional cleanup)
    async fn close(&self, conn: T) {
        drop(conn);
    }
}

/// An idle connection with bookkeeping
struct IdleConnection<T> {
    conn: T,
    created_at: Instant,
    last_used: Instant,
}

impl<T> IdleConnection<T> {
    fn is_expired(&self, config: &PoolConfig) -> bool {
        if let Some(max_lifetime) = config.max_lifetime {
            if self.created_at.elapsed() >= max_lifetime {
                return true;
            }
        }
        false
    }
}

/// Internal pool state
struct PoolState<T> {
    /// Available connections, most recently used at the back
    idle: VecDeque<IdleConnection<T>>,
    /// Connections instantiated (idle + in use + being created)
    size: usize,
    closed: bool,
}

struct PoolShared<T> {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory<T>>,
    state: Mutex<PoolState<T>>,
    semaphore: Arc<Semaphore>,
    pending: AtomicUsize,
}

impl<T> PoolShared<T> {
    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn forget_one(&self) {
        let mut state = self.lock();
        state.size = state.size.saturating_sub(1);
    }
}

/// A generic connection pool
///
/// # Example
/// ```no_run
/// use tessera_core_resilience::{ConnectionPool, PoolConfig, ConnectionFactory, ResilienceError};
/// use std::sync::Arc;
///
/// struct MyConnection { id: usize }
/// struct MyConnectionFactory;
///
/// #[async_trait::async_trait]
/// impl ConnectionFactory<MyConnection> for MyConnectionFactory {
///     async fn create(&self) -> Result<MyConnection, ResilienceError> {
///         Ok(MyConnection { id: 1 })
///     }
///
///     async fn is_healthy(&self, _conn: &mut MyConnection) -> bool {
///         true
///     }
/// }
///
/// # async fn example() -> Result<(), ResilienceError> {
/// let pool = ConnectionPool::new(Arc::new(MyConnectionFactory), PoolConfig::default());
///
/// let conn = pool.acquire().await?;
/// // Use connection...
/// pool.release(conn).await;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionPool<T: Send + 'static> {
    shared: Arc<PoolShared<T>>,
}

impl<T: Send + 'static> Clone for ConnectionPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for ConnectionPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<T: Send + 'static> ConnectionPool<T> {
    /// Create a new connection pool
    pub fn new(factory: Arc<dyn ConnectionFactory<T>>, config: PoolConfig) -> Self {
        let max_size = config.max_size;
        Self {
            shared: Arc::new(PoolShared {
                config,
                factory,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    size: 0,
                    closed: false,
                }),
                semaphore: Arc::new(Semaphore::new(max_size)),
                pending: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Acquire a connection from the pool
    ///
    /// Hands out an idle connection if one exists, otherwise creates one while
    /// the pool is below `max_size`. At capacity the caller waits in FIFO
    /// order for up to `acquire_timeout` and then fails with `PoolExhausted`.
    /// A caller that abandons the wait leaves the queue without consuming a
    /// slot.
    pub async fn acquire(&self) -> Result<PooledConnection<T>, ResilienceError> {
        let permit = self.acquire_permit().await?;

        let (reused, expired) = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(ResilienceError::PoolClosed);
            }

            let mut expired = Vec::new();
            let mut reused = None;
            while let Some(idle) = state.idle.pop_back() {
                if idle.is_expired(&self.shared.config) {
                    state.size -= 1;
                    expired.push(idle.conn);
                } else {
                    reused = Some(idle);
                    break;
                }
            }

            if reused.is_none() {
                // Holding a permit with no idle connection guarantees room
                state.size += 1;
            }
            (reused, expired)
        };

        let reservation = match reused {
            Some(idle) => {
                // Owned before awaiting, so cancellation frees the slot
                let pooled = PooledConnection {
                    conn: Some(idle.conn),
                    created_at: idle.created_at,
                    pool: self.shared.clone(),
                    _permit: permit,
                };
                self.close_all(expired).await;
                return Ok(pooled);
            }
            None => SizeReservation::new(&self.shared),
        };

        self.close_all(expired).await;

        let conn = self.shared.factory.create().await?;
        reservation.commit();
        debug!(size = self.stats().size, "Created pooled connection");

        Ok(PooledConnection {
            conn: Some(conn),
            created_at: Instant::now(),
            pool: self.shared.clone(),
            _permit: permit,
        })
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, ResilienceError> {
        match self.shared.semaphore.clone().try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => return Err(ResilienceError::PoolClosed),
            Err(TryAcquireError::NoPermits) => {}
        }

        let _pending = PendingGuard::enter(&self.shared)?;
        let timeout = self.shared.config.acquire_timeout;

        match tokio::time::timeout(timeout, self.shared.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(ResilienceError::PoolClosed),
            Err(_) => Err(ResilienceError::PoolExhausted {
                waited: timeout,
                pending: self.shared.pending.load(Ordering::SeqCst),
            }),
        }
    }

    /// Return a connection to the pool
    ///
    /// Live connections go back to the idle set (and from there to the
    /// longest-waiting caller). Connections that fail the liveness check, or
    /// that come back after the pool was closed, are closed and no longer
    /// counted.
    pub async fn release(&self, mut conn: PooledConnection<T>) {
        let closed = self.shared.lock().closed;
        let healthy = match conn.conn.as_mut() {
            Some(inner) if !closed => self.shared.factory.is_healthy(inner).await,
            _ => false,
        };

        let Some(inner) = conn.conn.take() else {
            return;
        };

        let dead = {
            let mut state = self.shared.lock();
            if healthy && !state.closed {
                state.idle.push_back(IdleConnection {
                    conn: inner,
                    created_at: conn.created_at,
                    last_used: Instant::now(),
                });
                None
            } else {
                state.size -= 1;
                Some(inner)
            }
        };

        // Dropping the permit wakes the next waiter
        drop(conn);

        if let Some(inner) = dead {
            debug!("Discarding dead pooled connection");
            self.shared.factory.close(inner).await;
        }
    }

    /// Close a connection instead of returning it to the pool
    pub async fn discard(&self, mut conn: PooledConnection<T>) {
        let Some(inner) = conn.conn.take() else {
            return;
        };
        self.shared.forget_one();
        drop(conn);
        self.shared.factory.close(inner).await;
    }

    /// Close idle connections unused for at least `threshold`
    ///
    /// Connections in use are never touched. Returns the number closed.
    pub async fn close_idle(&self, threshold: Duration) -> usize {
        let stale: Vec<T> = {
            let mut state = self.shared.lock();
            let (stale, fresh): (Vec<_>, Vec<_>) = state
                .idle
                .drain(..)
                .partition(|idle| idle.last_used.elapsed() >= threshold);
            state.idle = fresh.into_iter().collect();
            state.size -= stale.len();
            stale.into_iter().map(|idle| idle.conn).collect()
        };

        let count = stale.len();
        self.close_all(stale).await;
        count
    }

    /// Close idle connections older than the configured `idle_timeout`
    pub async fn reap_idle(&self) -> usize {
        match self.shared.config.idle_timeout {
            Some(timeout) => self.close_idle(timeout).await,
            None => 0,
        }
    }

    /// Fill the pool up to `min_idle` idle connections
    ///
    /// Stops early when every slot is in use.
    pub async fn warm_up(&self) -> Result<usize, ResilienceError> {
        let mut created = 0;

        loop {
            let Ok(permit) = self.shared.semaphore.clone().try_acquire_owned() else {
                break;
            };

            let reservation = {
                let mut state = self.shared.lock();
                if state.closed
                    || state.idle.len() >= self.shared.config.min_idle
                    || state.size >= self.shared.config.max_size
                {
                    break;
                }
                state.size += 1;
                SizeReservation::new(&self.shared)
            };

            let conn = self.shared.factory.create().await?;
            reservation.commit();

            let now = Instant::now();
            self.shared.lock().idle.push_back(IdleConnection {
                conn,
                created_at: now,
                last_used: now,
            });
            drop(permit);
            created += 1;
        }

        Ok(created)
    }

    /// Close the pool
    ///
    /// Waiting and future callers get `PoolClosed`, idle connections are
    /// closed now and connections in use are closed when released.
    pub async fn close(&self) -> usize {
        let idle = {
            let mut state = self.shared.lock();
            state.closed = true;
            let idle: Vec<T> = state.idle.drain(..).map(|idle| idle.conn).collect();
            state.size -= idle.len();
            idle
        };
        self.shared.semaphore.close();

        let count = idle.len();
        self.close_all(idle).await;
        count
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            size: state.size,
            available: state.idle.len(),
            in_use: state.size - state.idle.len(),
            pending: self.shared.pending.load(Ordering::SeqCst),
            max_size: self.shared.config.max_size,
        }
    }

    async fn close_all(&self, conns: Vec<T>) {
        for conn in conns {
            self.shared.factory.close(conn).await;
        }
    }
}

/// A connection checked out of a [`ConnectionPool`]
///
/// Give it back with [`ConnectionPool::release`]. Dropping it instead
/// discards the connection and frees its slot.
pub struct PooledConnection<T: Send + 'static> {
    conn: Option<T>,
    created_at: Instant,
    pool: Arc<PoolShared<T>>,
    _permit: OwnedSemaphorePermit,
}

impl<T: Send + 'static> PooledConnection<T> {
    /// When the underlying connection was established
    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

impl<T: Send + 'static> Deref for PooledConnection<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.conn
            .as_ref()
            .unwrap_or_else(|| unreachable!("pooled connection used after release"))
    }
}

impl<T: Send + 'static> DerefMut for PooledConnection<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.conn
            .as_mut()
            .unwrap_or_else(|| unreachable!("pooled connection used after release"))
    }
}

impl<T: Send + 'static> Drop for PooledConnection<T> {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            self.pool.forget_one();
        }
    }
}

/// Counts a caller in `pending` for as long as it waits
struct PendingGuard<'a> {
    pending: &'a AtomicUsize,
}

impl<'a> PendingGuard<'a> {
    fn enter<T>(shared: &'a PoolShared<T>) -> Result<Self, ResilienceError> {
        let previous = shared.pending.fetch_add(1, Ordering::SeqCst);
        if previous >= shared.config.max_pending {
            shared.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(ResilienceError::PoolExhausted {
                waited: Duration::ZERO,
                pending: previous,
            });
        }
        Ok(Self {
            pending: &shared.pending,
        })
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Undoes a `size` increment unless the connection was actually created
struct SizeReservation<'a, T> {
    shared: Option<&'a PoolShared<T>>,
}

impl<'a, T> SizeReservation<'a, T> {
    fn new(shared: &'a PoolShared<T>) -> Self {
        Self {
            shared: Some(shared),
        }
    }

    fn commit(mut self) {
        self.shared = None;
    }
}

impl<T> Drop for SizeReservation<'_, T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.forget_one();
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently instantiated
    pub size: usize,
    /// Idle connections ready to hand out
    pub available: usize,
    /// Connections checked out (or being established)
    pub in_use: usize,
    /// Callers waiting for a connection
    pub pending: usize,
    /// Maximum pool size
    pub max_size: usize,
}

impl PoolStats {
    /// Get pool utilization as a percentage
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            (self.size as f64 / self.max_size as f64) * 100.0
        }
    }
}
