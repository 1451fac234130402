//! Error types reported by backend drivers
//!
//! Drivers surface every failure as a [`DriverError`]. The connection manager
//! passes command failures back to the caller untouched (as
//! [`crate::Error::Operation`]) and wraps connect failures in
//! [`crate::Error::Connection`].

use thiserror::Error;

/// Result type alias for driver operations
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Failure raised by a driver or one of its connections
#[derive(Error, Debug)]
pub enum DriverError {
    /// The backend refused to open a connection
    #[error("Connection refused by {backend}: {message}")]
    ConnectionRefused { backend: String, message: String },

    /// The connection was closed by either side
    #[error("Connection closed")]
    Disconnected,

    /// The connection string could not be parsed (the string itself is never included)
    #[error("Invalid connection string: {0}")]
    InvalidUri(String),

    /// The backend does not understand the command
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    /// The command was sent with the wrong number of arguments
    #[error("Wrong number of arguments for '{command}': expected {expected}, got {actual}")]
    Arity {
        command: String,
        expected: usize,
        actual: usize,
    },

    /// The key holds a value of a different kind
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// An argument had an unusable shape or value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The reply could not be interpreted by the client
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Error message returned by the backend server
    #[error("Backend error: {0}")]
    Backend(String),

    /// Any other failure
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl DriverError {
    /// Wrap an arbitrary error
    pub fn other<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        DriverError::Other(err.into())
    }

    /// Check if the failure means the connection itself is unusable
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DriverError::ConnectionRefused { .. } | DriverError::Disconnected
        )
    }

    /// Check if the caller sent something the backend rejected
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DriverError::UnknownCommand(_)
                | DriverError::Arity { .. }
                | DriverError::WrongType
                | DriverError::InvalidArgument(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors() {
        assert!(DriverError::Disconnected.is_connection_error());
        assert!(DriverError::ConnectionRefused {
            backend: "key_value".into(),
            message: "auth failed".into(),
        }
        .is_connection_error());
        assert!(!DriverError::WrongType.is_connection_error());
    }

    #[test]
    fn test_client_errors() {
        assert!(DriverError::UnknownCommand("FLY".into()).is_client_error());
        assert!(DriverError::Arity {
            command: "GET".into(),
            expected: 1,
            actual: 0,
        }
        .is_client_error());
        assert!(!DriverError::Backend("oops".into()).is_client_error());
    }

    #[test]
    fn test_other_is_transparent() {
        let err = DriverError::other("socket reset");
        assert_eq!(err.to_string(), "socket reset");
    }
}
