//! Tessera Observability
//!
//! Prometheus metrics for the tenant connection manager. The registry is
//! labelled by tenant, backend and tier rather than keyed per tenant, so a
//! single scrape covers every pool and circuit breaker in the process.
//!
//! ## Quick Start
//!
//! ```
//! use tessera_observability::{KeyLabels, MetricsRegistry};
//!
//! let metrics = MetricsRegistry::new().unwrap();
//! let key = KeyLabels::new("tenant-a", "key_value", "pro");
//!
//! metrics.record_success(key, "get", 0.003);
//! metrics.record_transition(key, "open", 2);
//!
//! let text = metrics.render().unwrap();
//! assert!(text.contains("tessera_queries_total"));
//! ```

pub mod error;
pub mod metrics;

pub use error::MetricsError;
pub use metrics::{KeyLabels, MetricsRegistry};
