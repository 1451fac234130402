/*!
 * Logging and tracing initialization
 */

use std::fs::File;
use std::path::Path;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize structured logging based on configuration
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let log_level = config.level.to_tracing_level();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("tessera={}", log_level)))
        .map_err(|e| Error::Config(format!("Failed to create log filter: {}", e)))?;

    match config.file {
        Some(ref log_path) => init_file_logging(log_path, env_filter)?,
        None if config.json => init_json_stdout_logging(env_filter)?,
        None => init_stdout_logging(env_filter)?,
    }

    Ok(())
}

/// Initialize compact logging to stdout
fn init_stdout_logging(env_filter: EnvFilter) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("Logging already initialized: {}", e)))
}

/// Initialize JSON lines logging to stdout
fn init_json_stdout_logging(env_filter: EnvFilter) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .json()
        .with_current_span(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("Logging already initialized: {}", e)))
}

/// Initialize JSON logging to a file
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = File::create(log_path)
        .map_err(|e| Error::Config(format!("Failed to create log file: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false) // No ANSI colors in file
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("Logging already initialized: {}", e)))
}

/// Initialize logging for tests (idempotent, captured by the test harness)
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tessera=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok(); // Ignore error if already initialized
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_init_test_logging_is_idempotent() {
        init_test_logging();
        init_test_logging();
        tracing::debug!("logging initialized twice without panicking");
    }

    #[test]
    fn test_second_init_reports_error() {
        init_test_logging();

        let config = LoggingConfig {
            level: LogLevel::Warn,
            file: None,
            json: false,
        };
        assert!(matches!(init_logging(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_unwritable_log_file() {
        let config = LoggingConfig {
            level: LogLevel::Info,
            file: Some("/nonexistent/dir/tessera.log".into()),
            json: true,
        };
        assert!(matches!(init_logging(&config), Err(Error::Config(_))));
    }
}
