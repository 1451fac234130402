//! Transport security policy for connection strings
//!
//! TLS is selected by the URI itself: the `rediss://` and `mongodb+srv://`
//! schemes, or a `tls=true` / `ssl=true` query flag. When the manager is
//! configured with `require_tls`, plaintext URIs are refused before any
//! connection attempt.

use super::error::{DriverError, DriverResult};
use serde::Serialize;
use std::fmt;
use url::Url;

const TLS_SCHEMES: &[&str] = &["rediss", "mongodb+srv"];
const TLS_FLAGS: &[&str] = &["tls", "ssl"];

/// Whether a connection string asks for an encrypted transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportSecurity {
    Tls,
    Plaintext,
}

impl TransportSecurity {
    /// Classify a connection string
    ///
    /// Parse failures never echo the URI back, since it may carry a password.
    pub fn from_uri(uri: &str) -> DriverResult<Self> {
        let url = parse(uri)?;

        if TLS_SCHEMES.contains(&url.scheme()) {
            return Ok(TransportSecurity::Tls);
        }

        let flagged = url.query_pairs().any(|(k, v)| {
            TLS_FLAGS.contains(&k.to_ascii_lowercase().as_str())
                && matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
        });

        Ok(if flagged {
            TransportSecurity::Tls
        } else {
            TransportSecurity::Plaintext
        })
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, TransportSecurity::Tls)
    }
}

impl fmt::Display for TransportSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportSecurity::Tls => f.write_str("tls"),
            TransportSecurity::Plaintext => f.write_str("plaintext"),
        }
    }
}

/// Render a connection string with user info, path and query removed
pub fn redact_uri(uri: &str) -> DriverResult<String> {
    let url = parse(uri)?;
    let host = url.host_str().unwrap_or_default();

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

fn parse(uri: &str) -> DriverResult<Url> {
    Url::parse(uri).map_err(|e| DriverError::InvalidUri(e.to_string()))
}
