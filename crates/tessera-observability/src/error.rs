//! Error types for the observability crate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Metrics output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}
