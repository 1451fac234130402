/*!
 * Configuration for the connection manager
 */

use crate::error::{Error, Result};
use crate::tier::TierPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable forcing TLS enforcement on or off
pub const REQUIRE_TLS_ENV: &str = "TESSERA_REQUIRE_TLS";

/// Environment variable overriding the log level
pub const LOG_LEVEL_ENV: &str = "TESSERA_LOG_LEVEL";

/// Connection manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Maximum time a call waits for a pooled connection
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Idle time after which a pooled connection is reaped
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Maximum age of a physical connection (0 = unlimited)
    #[serde(
        default = "default_max_lifetime_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_lifetime_secs: Option<u64>,

    /// Upper bound on a single wrapped operation (None = unbounded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout_ms: Option<u64>,

    /// Interval of the background idle reaper
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,

    /// Refuse plaintext connection strings
    #[serde(default)]
    pub require_tls: bool,

    /// Fill new pools to the tier's `min_size` in the background
    #[serde(default)]
    pub prewarm: bool,

    /// Tier limits table
    #[serde(default)]
    pub tiers: TierPolicy,

    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: default_acquire_timeout_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_lifetime_secs: default_max_lifetime_secs(),
            operation_timeout_ms: None,
            reap_interval_secs: default_reap_interval_secs(),
            require_tls: false,
            prewarm: false,
            tiers: TierPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Emit JSON lines instead of the compact human format
    #[serde(default)]
    pub json: bool,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(Error::Config(format!("unknown log level '{}'", other))),
        }
    }
}

// Default value functions for serde
fn default_acquire_timeout_ms() -> u64 {
    5_000
}

fn default_idle_timeout_secs() -> u64 {
    300 // 5 minutes
}

fn default_max_lifetime_secs() -> Option<u64> {
    Some(1800) // 30 minutes
}

fn default_reap_interval_secs() -> u64 {
    60
}

impl ManagerConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ManagerConfig =
            toml::from_str(text).map_err(|e| Error::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), contents)?;
        Ok(())
    }

    /// Apply `TESSERA_REQUIRE_TLS` and `TESSERA_LOG_LEVEL`
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(value) = std::env::var(REQUIRE_TLS_ENV) {
            self.require_tls = parse_bool(REQUIRE_TLS_ENV, &value)?;
        }
        if let Ok(value) = std::env::var(LOG_LEVEL_ENV) {
            self.logging.level = value.parse()?;
        }
        Ok(self)
    }

    /// Check timeouts and the tier table
    pub fn validate(&self) -> Result<()> {
        if self.acquire_timeout_ms == 0 {
            return Err(Error::Config("acquire_timeout_ms must be > 0".to_string()));
        }
        if self.reap_interval_secs == 0 {
            return Err(Error::Config("reap_interval_secs must be > 0".to_string()));
        }
        if self.operation_timeout_ms == Some(0) {
            return Err(Error::Config("operation_timeout_ms must be > 0".to_string()));
        }
        self.tiers.validate()
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    /// Development preset: short timeouts, plaintext allowed
    pub fn development_preset() -> Self {
        Self {
            acquire_timeout_ms: 1_000,
            idle_timeout_secs: 30,
            reap_interval_secs: 10,
            logging: LoggingConfig {
                level: LogLevel::Debug,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Production preset: TLS required, bounded operations, warm pools
    pub fn production_preset() -> Self {
        Self {
            require_tls: true,
            prewarm: true,
            operation_timeout_ms: Some(30_000),
            logging: LoggingConfig {
                json: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}
