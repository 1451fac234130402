/*!
 * Error types for Tessera
 */

use crate::backend::{BackendType, ConnectionKey, DriverError};
use std::io;
use std::time::Duration;
use tessera_core_resilience::ResilienceError;
use tessera_observability::MetricsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Exit code constants for the CLI
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_CREDENTIALS: i32 = 3;

#[derive(Error, Debug)]
pub enum Error {
    /// The backend rejected or dropped the connection while it was being opened
    #[error("Connection to {backend} for tenant '{tenant_id}' failed: {source}")]
    Connection {
        tenant_id: String,
        backend: BackendType,
        #[source]
        source: DriverError,
    },

    /// The tenant's circuit breaker is rejecting calls
    #[error("Circuit breaker open for tenant '{tenant_id}' on {backend}")]
    CircuitOpen {
        tenant_id: String,
        backend: BackendType,
    },

    /// No pooled connection became available in time
    #[error("Connection pool exhausted for tenant '{tenant_id}' on {backend} after waiting {waited:?}")]
    PoolExhausted {
        tenant_id: String,
        backend: BackendType,
        waited: Duration,
    },

    /// The pool was closed while the call was in progress
    #[error("Connection pool for tenant '{tenant_id}' on {backend} is closed")]
    PoolClosed {
        tenant_id: String,
        backend: BackendType,
    },

    /// Malformed or tampered ciphertext, or a bad key
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// The wrapped operation's own failure, returned as-is
    #[error(transparent)]
    Operation(#[from] DriverError),

    /// The wrapped operation did not finish within the operation timeout
    #[error("Operation '{operation}' timed out after {timeout:?}")]
    OperationTimeout { operation: String, timeout: Duration },

    /// A plaintext connection string was refused while TLS is required
    #[error("Refusing plaintext connection to {backend} for tenant '{tenant_id}': TLS is required")]
    InsecureTransport {
        tenant_id: String,
        backend: BackendType,
    },

    /// No connection string is stored for the tenant
    #[error("No credentials for tenant '{tenant_id}' on {backend}")]
    CredentialsNotFound {
        tenant_id: String,
        backend: BackendType,
    },

    /// No driver is registered for the backend type
    #[error("No driver registered for backend '{0}'")]
    DriverNotRegistered(BackendType),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registry failure
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Attach a connection key to a pool or breaker error
    ///
    /// Connect failures raised by the manager's own connection factory carry
    /// a complete [`Error`] and are unwrapped unchanged.
    pub fn from_resilience(err: ResilienceError, key: &ConnectionKey) -> Self {
        let tenant_id = key.tenant_id.clone();
        let backend = key.backend.clone();

        match err {
            ResilienceError::CircuitOpen(_) => Error::CircuitOpen { tenant_id, backend },
            ResilienceError::PoolExhausted { waited, .. } => Error::PoolExhausted {
                tenant_id,
                backend,
                waited,
            },
            ResilienceError::PoolClosed => Error::PoolClosed { tenant_id, backend },
            ResilienceError::Connect(source) => match source.downcast::<Error>() {
                Ok(err) => *err,
                Err(source) => Error::Connection {
                    tenant_id,
                    backend,
                    source: DriverError::Other(source),
                },
            },
        }
    }

    /// True when the manager refused the call to protect itself or the backend
    pub fn is_protective(&self) -> bool {
        matches!(self, Error::CircuitOpen { .. } | Error::PoolExhausted { .. })
    }

    /// True when the failure came from the backend or the operation itself
    pub fn is_backend_origin(&self) -> bool {
        matches!(
            self,
            Error::Connection { .. } | Error::Operation(_) | Error::OperationTimeout { .. }
        )
    }

    /// Short label used as the `kind` metric label
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Connection { .. } => "connection",
            Error::CircuitOpen { .. } => "circuit_open",
            Error::PoolExhausted { .. } => "pool_exhausted",
            Error::PoolClosed { .. } => "pool_closed",
            Error::Encryption(_) => "encryption",
            Error::Operation(_) => "operation",
            Error::OperationTimeout { .. } => "timeout",
            Error::InsecureTransport { .. } => "insecure_transport",
            Error::CredentialsNotFound { .. } => "credentials_not_found",
            Error::DriverNotRegistered(_) => "driver_not_registered",
            Error::Config(_) => "config",
            Error::Metrics(_) => "metrics",
            Error::Io(_) => "io",
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) | Error::Io(_) => EXIT_CONFIG,
            Error::Encryption(_)
            | Error::CredentialsNotFound { .. }
            | Error::InsecureTransport { .. } => EXIT_CREDENTIALS,
            _ => EXIT_FAILURE,
        }
    }
}
