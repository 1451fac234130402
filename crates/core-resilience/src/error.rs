//! Error types for resilience primitives

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the circuit breaker and connection pool
#[derive(Error, Debug)]
pub enum ResilienceError {
    /// The circuit is open (or a half-open trial is already in flight)
    #[error("Circuit breaker '{0}' is open")]
    CircuitOpen(String),

    /// No connection slot became free within the acquire timeout, or the
    /// pending queue is full
    #[error("Connection pool exhausted after waiting {waited:?} ({pending} callers pending)")]
    PoolExhausted { waited: Duration, pending: usize },

    /// The pool was closed while the caller was waiting or before it arrived
    #[error("Connection pool is closed")]
    PoolClosed,

    /// The connection factory failed to establish a physical connection
    #[error("Failed to establish connection: {0}")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ResilienceError {
    /// Wrap any error raised while creating a connection
    pub fn connect<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        ResilienceError::Connect(err.into())
    }

    /// True for rejections the pool or breaker raised on its own, without the
    /// backend having been contacted
    pub fn is_protective(&self) -> bool {
        matches!(
            self,
            ResilienceError::CircuitOpen(_) | ResilienceError::PoolExhausted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protective_classification() {
        assert!(ResilienceError::CircuitOpen("t1/kv".into()).is_protective());
        assert!(ResilienceError::PoolExhausted {
            waited: Duration::from_millis(10),
            pending: 3
        }
        .is_protective());
        assert!(!ResilienceError::PoolClosed.is_protective());
        assert!(!ResilienceError::connect("refused").is_protective());
    }

    #[test]
    fn test_connect_keeps_source_message() {
        let err = ResilienceError::connect("connection refused");
        assert_eq!(
            err.to_string(),
            "Failed to establish connection: connection refused"
        );
    }
}
