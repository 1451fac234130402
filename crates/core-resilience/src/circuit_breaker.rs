//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker prevents cascading failures by failing fast when a service
//! is experiencing issues. It has three states:
//! - Closed: Normal operation, requests pass through
//! - Open: Service is unhealthy, requests fail immediately
//! - HalfOpen: A single trial request is admitted to test recovery
//!
//! The Open → HalfOpen transition is evaluated lazily on the next admission
//! attempt; no background timer is involved.

use super::error::ResilienceError;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests fail immediately
    Open,
    /// Circuit is half-open, one trial request tests service recovery
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }

    /// Numeric encoding used for gauges: closed=0, half-open=1, open=2
    pub fn as_gauge(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change, reported so owners can publish metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitTransition {
    /// Closed or HalfOpen → Open
    Opened,
    /// HalfOpen → Closed
    Closed,
    /// Open → HalfOpen
    HalfOpened,
}

impl CircuitTransition {
    /// Event name: `open`, `close` or `half-open`
    pub fn event(&self) -> &'static str {
        match self {
            CircuitTransition::Opened => "open",
            CircuitTransition::Closed => "close",
            CircuitTransition::HalfOpened => "half-open",
        }
    }

    /// State the breaker is in after this transition
    pub fn target(&self) -> CircuitState {
        match self {
            CircuitTransition::Opened => CircuitState::Open,
            CircuitTransition::Closed => CircuitState::Closed,
            CircuitTransition::HalfOpened => CircuitState::HalfOpen,
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Time since the last failure before an open circuit admits a trial call
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Internal state of the circuit breaker
#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    /// Set while the single half-open trial call is running
    trial_in_flight: bool,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            trial_in_flight: false,
        }
    }
}

/// Circuit breaker for protecting against cascading failures
///
/// Callers ask for a [`CircuitPermit`] before doing any work and report the
/// outcome through it. A rejected admission never reaches the protected
/// resource.
///
/// # Example
/// ```no_run
/// use tessera_core_resilience::{CircuitBreaker, CircuitBreakerConfig};
///
/// let breaker = CircuitBreaker::new("tenant-a/kv", CircuitBreakerConfig::default());
///
/// let permit = breaker.try_acquire().expect("circuit is closed");
/// // ... talk to the backend ...
/// permit.succeed();
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(name: impl Into<Arc<str>>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CircuitBreakerState::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state of the circuit breaker
    ///
    /// This does not perform the lazy Open → HalfOpen transition.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Get current consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// When the most recent failure was recorded
    pub fn last_failure_at(&self) -> Option<Instant> {
        self.lock().last_failure_at
    }

    /// Healthy unless the circuit is open
    pub fn is_healthy(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.lock();
        state.state = CircuitState::Closed;
        state.consecutive_failures = 0;
        state.last_failure_at = None;
        state.trial_in_flight = false;
    }

    /// Ask to run one call
    ///
    /// Returns `CircuitOpen` while the circuit is open and the reset timeout has
    /// not elapsed, or while a half-open trial is already running. Once the
    /// reset timeout has elapsed the first caller moves the circuit to
    /// half-open and becomes the trial.
    pub fn try_acquire(&self) -> Result<CircuitPermit, ResilienceError> {
        let mut state = self.lock();

        match state.state {
            CircuitState::Closed => Ok(self.permit(false, None)),
            CircuitState::Open => {
                let elapsed = state
                    .last_failure_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);

                if !elapsed {
                    return Err(ResilienceError::CircuitOpen(self.name.to_string()));
                }

                state.state = CircuitState::HalfOpen;
                state.trial_in_flight = true;
                drop(state);

                warn!(
                    breaker = %self.name,
                    event = "half-open",
                    "Circuit breaker half-open, admitting trial call"
                );
                Ok(self.permit(true, Some(CircuitTransition::HalfOpened)))
            }
            CircuitState::HalfOpen => {
                if state.trial_in_flight {
                    return Err(ResilienceError::CircuitOpen(self.name.to_string()));
                }
                state.trial_in_flight = true;
                Ok(self.permit(true, None))
            }
        }
    }

    /// Run `op` under circuit breaker protection
    ///
    /// Every error returned by `op` counts as a failure. The error itself is
    /// returned unchanged.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: From<ResilienceError>,
    {
        let permit = self.try_acquire()?;

        match op().await {
            Ok(result) => {
                permit.succeed();
                Ok(result)
            }
            Err(e) => {
                permit.fail();
                Err(e)
            }
        }
    }

    fn permit(&self, trial: bool, transition: Option<CircuitTransition>) -> CircuitPermit {
        CircuitPermit {
            breaker: self.clone(),
            trial,
            transition,
            settled: false,
        }
    }

    fn on_success(&self, trial: bool) -> Option<CircuitTransition> {
        let mut state = self.lock();
        state.consecutive_failures = 0;

        if trial {
            state.trial_in_flight = false;
        }

        if trial && state.state == CircuitState::HalfOpen {
            state.state = CircuitState::Closed;
            drop(state);

            info!(
                breaker = %self.name,
                event = "close",
                "Circuit breaker closed after successful trial call"
            );
            return Some(CircuitTransition::Closed);
        }

        None
    }

    fn on_failure(&self, trial: bool) -> Option<CircuitTransition> {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure_at = Some(Instant::now());

        if trial {
            state.trial_in_flight = false;
        }

        let should_open = match state.state {
            CircuitState::Closed => state.consecutive_failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if !should_open {
            return None;
        }

        state.state = CircuitState::Open;
        state.trial_in_flight = false;
        let failures = state.consecutive_failures;
        drop(state);

        error!(
            breaker = %self.name,
            event = "open",
            consecutive_failures = failures,
            reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
            "Circuit breaker opened"
        );
        Some(CircuitTransition::Opened)
    }

    fn on_abandoned(&self, trial: bool) {
        if trial {
            self.lock().trial_in_flight = false;
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerState> {
        // State is plain data; a panic mid-update cannot leave it torn
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Admission to run one call through a [`CircuitBreaker`]
///
/// Report the outcome with [`succeed`](Self::succeed) or
/// [`fail`](Self::fail). Dropping the permit without reporting (for example
/// when the caller is cancelled) frees a half-open trial slot without
/// counting as success or failure.
#[derive(Debug)]
pub struct CircuitPermit {
    breaker: CircuitBreaker,
    trial: bool,
    transition: Option<CircuitTransition>,
    settled: bool,
}

impl CircuitPermit {
    /// Whether this call is the half-open trial
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// Transition caused by granting this permit (Open → HalfOpen)
    pub fn transition(&self) -> Option<CircuitTransition> {
        self.transition
    }

    /// Record a successful call
    pub fn succeed(mut self) -> Option<CircuitTransition> {
        self.settled = true;
        self.breaker.on_success(self.trial)
    }

    /// Record a failed call
    pub fn fail(mut self) -> Option<CircuitTransition> {
        self.settled = true;
        self.breaker.on_failure(self.trial)
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandoned(self.trial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_millis(reset_ms),
            },
        )
    }

    #[tokio::test]
    async fn test_circuit_breaker_closed_to_open() {
        let breaker = breaker(3, 100);

        for _ in 0..3 {
            let result: Result<(), ResilienceError> = breaker
                .call(|| async { Err(ResilienceError::PoolClosed) })
                .await;
            assert!(result.is_err());
        }

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.is_healthy());

        let rejected = breaker.try_acquire();
        assert!(matches!(rejected, Err(ResilienceError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn test_open_rejects_without_running_operation() {
        let breaker = breaker(1, 60_000);
        breaker.try_acquire().unwrap().fail();

        let mut ran = false;
        let result: Result<(), ResilienceError> = breaker
            .call(|| {
                ran = true;
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::CircuitOpen(_))));
        assert!(!ran);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_half_open_to_closed() {
        let breaker = breaker(2, 50);

        breaker.try_acquire().unwrap().fail();
        assert_eq!(
            breaker.try_acquire().unwrap().fail(),
            Some(CircuitTransition::Opened)
        );

        tokio::time::advance(Duration::from_millis(60)).await;

        let permit = breaker.try_acquire().unwrap();
        assert!(permit.is_trial());
        assert_eq!(permit.transition(), Some(CircuitTransition::HalfOpened));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert_eq!(permit.succeed(), Some(CircuitTransition::Closed));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial() {
        let breaker = breaker(1, 10);
        breaker.try_acquire().unwrap().fail();
        tokio::time::advance(Duration::from_millis(20)).await;

        let trial = breaker.try_acquire().unwrap();
        assert!(matches!(
            breaker.try_acquire(),
            Err(ResilienceError::CircuitOpen(_))
        ));

        assert_eq!(trial.fail(), Some(CircuitTransition::Opened));
        assert_eq!(breaker.state(), CircuitState::Open);

        // Timer restarted by the failed trial
        assert!(breaker.try_acquire().is_err());
        tokio::time::advance(Duration::from_millis(20)).await;
        assert!(breaker.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_frees_slot() {
        let breaker = breaker(1, 10);
        breaker.try_acquire().unwrap().fail();
        tokio::time::advance(Duration::from_millis(20)).await;

        drop(breaker.try_acquire().unwrap());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let retry = breaker.try_acquire().unwrap();
        assert!(retry.is_trial());
        assert_eq!(retry.transition(), None);
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let breaker = breaker(5, 100);
        for _ in 0..4 {
            breaker.try_acquire().unwrap().fail();
        }
        assert_eq!(breaker.failure_count(), 4);

        assert_eq!(breaker.try_acquire().unwrap().succeed(), None);
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_reset() {
        let breaker = breaker(1, 60_000);
        breaker.try_acquire().unwrap().fail();
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert!(breaker.last_failure_at().is_none());
    }
}
