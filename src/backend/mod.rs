//! Backend driver abstraction
//!
//! Every backend the manager pools (key-value stores, document stores, or a
//! custom store) is reached through the same two traits:
//!
//! - [`Driver`]: opens physical connections from a connection string
//! - [`Connection`]: executes [`Command`]s and answers liveness pings
//!
//! Commands and replies are uniform (a command name plus JSON arguments, a
//! JSON reply) so one manager can pool connections of every backend type.
//! Typed access lives in the façades, [`KeyValueClient`] and
//! [`DocumentClient`].
//!
//! # Example
//!
//! ```
//! use tessera::backend::{BackendType, Command, ConnectionKey};
//!
//! let key = ConnectionKey::new("tenant-a", BackendType::KeyValue);
//! assert_eq!(key.to_string(), "tenant-a/key_value");
//!
//! let cmd = Command::new("SET").arg("greeting").arg("hello");
//! assert_eq!(cmd.args_slice().len(), 2);
//! ```

pub mod credentials;
pub mod document;
pub mod error;
pub mod key_value;
pub mod memory;
pub mod registry;
pub mod transport;

pub use credentials::{CredentialStore, StaticCredentialStore};
pub use document::{DeleteResult, Document, DocumentClient, InsertOneResult, UpdateResult};
pub use error::{DriverError, DriverResult};
pub use key_value::KeyValueClient;
pub use memory::{MemoryDocumentDriver, MemoryKeyValueDriver, MemoryStats};
pub use registry::DriverRegistry;
pub use transport::TransportSecurity;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reply returned by a backend command
pub type Reply = serde_json::Value;

/// Kind of backend store a connection talks to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// Key-value cache (strings, hashes, lists, sets, sorted sets)
    KeyValue,

    /// Document database (collections of JSON documents)
    Document,

    /// Any other store with a registered driver
    Custom(String),
}

impl BackendType {
    /// Stable label used in logs and metrics
    pub fn as_str(&self) -> &str {
        match self {
            BackendType::KeyValue => "key_value",
            BackendType::Document => "document",
            BackendType::Custom(name) => name,
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "key_value" | "kv" | "redis" => BackendType::KeyValue,
            "document" | "doc" | "mongodb" => BackendType::Document,
            _ => BackendType::Custom(s.to_string()),
        })
    }
}

/// Composite key addressing one pool, one breaker and one metadata record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionKey {
    pub tenant_id: String,
    pub backend: BackendType,
}

impl ConnectionKey {
    pub fn new(tenant_id: impl Into<String>, backend: BackendType) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            backend,
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.backend)
    }
}

/// A single backend command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    name: String,
    args: Vec<serde_json::Value>,
}

impl Command {
    /// Start a command; names are case-insensitive and stored upper-case
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            args: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Append several arguments
    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<serde_json::Value>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args_slice(&self) -> &[serde_json::Value] {
        &self.args
    }

    /// Consume the command, yielding its name and arguments
    pub fn into_parts(self) -> (String, Vec<serde_json::Value>) {
        (self.name, self.args)
    }
}

/// A live physical connection to a backend
#[async_trait]
pub trait Connection: Send + Sync {
    /// Send one command and wait for its reply
    async fn execute(&mut self, command: Command) -> DriverResult<Reply>;

    /// Cheap round trip used as the liveness check on pool release
    async fn ping(&mut self) -> DriverResult<()>;

    /// Close the connection
    async fn close(&mut self) -> DriverResult<()>;
}

/// Opens connections for one backend type
#[async_trait]
pub trait Driver: Send + Sync {
    /// Backend type this driver serves
    fn backend_type(&self) -> BackendType;

    /// Open a physical connection
    ///
    /// `uri` is the decrypted connection string. It lives only for the
    /// duration of this call and must never be logged or stored.
    async fn connect(&self, uri: &str) -> DriverResult<Box<dyn Connection>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_backend_type_labels() {
        assert_eq!(BackendType::KeyValue.as_str(), "key_value");
        assert_eq!(BackendType::Document.to_string(), "document");
        assert_eq!(BackendType::Custom("graph".into()).to_string(), "graph");
    }

    #[test]
    fn test_backend_type_from_str() {
        assert_eq!("redis".parse::<BackendType>().unwrap(), BackendType::KeyValue);
        assert_eq!("Document".parse::<BackendType>().unwrap(), BackendType::Document);
        assert_eq!(
            "graph".parse::<BackendType>().unwrap(),
            BackendType::Custom("graph".into())
        );
    }

    #[test]
    fn test_connection_key_identity() {
        let mut keys = HashSet::new();
        keys.insert(ConnectionKey::new("a", BackendType::KeyValue));
        keys.insert(ConnectionKey::new("a", BackendType::KeyValue));
        keys.insert(ConnectionKey::new("a", BackendType::Document));
        keys.insert(ConnectionKey::new("b", BackendType::KeyValue));
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_command_builder() {
        let cmd = Command::new("mset").args(["a", "1", "b", "2"]);
        assert_eq!(cmd.name(), "MSET");
        assert_eq!(cmd.args_slice().len(), 4);

        let (name, args) = cmd.into_parts();
        assert_eq!(name, "MSET");
        assert_eq!(args[2], serde_json::json!("b"));
    }
}
