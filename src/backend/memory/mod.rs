//! In-memory drivers for testing and simulation
//!
//! [`MemoryKeyValueDriver`] and [`MemoryDocumentDriver`] implement the
//! [`Driver`](super::Driver) contract without any network I/O. All
//! connections opened by one driver share the same data, the way clients of
//! one server would. Each driver counts connects, closes, pings and commands
//! and can be told to fail, so pool and breaker behavior can be observed from
//! tests.
//!
//! # Example
//!
//! ```
//! use tessera::backend::{Command, Driver, MemoryKeyValueDriver};
//!
//! # async fn example() -> Result<(), tessera::backend::DriverError> {
//! let driver = MemoryKeyValueDriver::new();
//! let mut conn = driver.connect("redis://localhost:6379").await?;
//!
//! conn.execute(Command::new("SET").arg("k").arg("v")).await?;
//! assert_eq!(driver.stats().connects(), 1);
//! # Ok(())
//! # }
//! ```

mod document;
mod key_value;

pub use document::MemoryDocumentDriver;
pub use key_value::MemoryKeyValueDriver;

use super::error::{DriverError, DriverResult};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Activity counters for an in-memory driver
#[derive(Debug, Default)]
pub struct MemoryStats {
    connects: AtomicUsize,
    closes: AtomicUsize,
    pings: AtomicUsize,
    commands: AtomicUsize,
    open: AtomicUsize,
    peak_open: AtomicUsize,
}

impl MemoryStats {
    /// Successful connects
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Connections closed (explicitly or by drop)
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }

    /// Connections currently open
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open connections seen
    pub fn peak_open(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }

    fn on_connect(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_open.fetch_max(open, Ordering::SeqCst);
    }

    fn on_close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Failure switches shared by the in-memory drivers
#[derive(Debug, Default)]
struct Faults {
    fail_connect: AtomicBool,
    fail_ping: AtomicBool,
    fail_commands: AtomicBool,
    latency_ms: AtomicU64,
    /// Bumped to kill every connection opened before
    epoch: AtomicU64,
}

impl Faults {
    fn check_connect(&self, backend: &str) -> DriverResult<()> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(DriverError::ConnectionRefused {
                backend: backend.to_string(),
                message: "connection refused (injected)".to_string(),
            });
        }
        Ok(())
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
    }
}

/// Connection bookkeeping shared by both in-memory connection types
#[derive(Debug)]
struct ConnState {
    epoch: u64,
    closed: bool,
}

impl ConnState {
    fn new(faults: &Faults) -> Self {
        Self {
            epoch: faults.epoch(),
            closed: false,
        }
    }

    /// Fail if the connection was closed or killed
    fn check_alive(&self, faults: &Faults) -> DriverResult<()> {
        if self.closed || self.epoch != faults.epoch() {
            return Err(DriverError::Disconnected);
        }
        Ok(())
    }

    async fn before_command(&self, faults: &Faults, stats: &MemoryStats) -> DriverResult<()> {
        self.check_alive(faults)?;
        faults.delay().await;
        stats.commands.fetch_add(1, Ordering::SeqCst);
        if faults.fail_commands.load(Ordering::SeqCst) {
            return Err(DriverError::Backend("injected failure".to_string()));
        }
        Ok(())
    }

    fn ping(&self, faults: &Faults, stats: &MemoryStats) -> DriverResult<()> {
        stats.pings.fetch_add(1, Ordering::SeqCst);
        self.check_alive(faults)?;
        if faults.fail_ping.load(Ordering::SeqCst) {
            return Err(DriverError::Disconnected);
        }
        Ok(())
    }

    fn close(&mut self, stats: &MemoryStats) {
        if !self.closed {
            self.closed = true;
            stats.on_close();
        }
    }
}

/// Generates the failure-injection setters shared by both drivers
macro_rules! fault_controls {
    ($driver:ty) => {
        impl $driver {
            /// Activity counters
            pub fn stats(&self) -> &super::MemoryStats {
                &self.shared.stats
            }

            /// Make new connection attempts fail
            pub fn set_fail_connect(&self, fail: bool) {
                self.shared
                    .faults
                    .fail_connect
                    .store(fail, std::sync::atomic::Ordering::SeqCst);
            }

            /// Make liveness pings fail, so released connections are discarded
            pub fn set_fail_ping(&self, fail: bool) {
                self.shared
                    .faults
                    .fail_ping
                    .store(fail, std::sync::atomic::Ordering::SeqCst);
            }

            /// Make every command fail with a backend error
            pub fn set_fail_commands(&self, fail: bool) {
                self.shared
                    .faults
                    .fail_commands
                    .store(fail, std::sync::atomic::Ordering::SeqCst);
            }

            /// Delay every command by `latency`
            pub fn set_latency(&self, latency: std::time::Duration) {
                self.shared
                    .faults
                    .latency_ms
                    .store(latency.as_millis() as u64, std::sync::atomic::Ordering::SeqCst);
            }

            /// Drop every open connection, as a server restart would
            pub fn kill_connections(&self) {
                self.shared
                    .faults
                    .epoch
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }
    };
}
use fault_controls;

fn check_scheme(uri: &str, accepted: &[&str]) -> DriverResult<url::Url> {
    let url = url::Url::parse(uri).map_err(|e| DriverError::InvalidUri(e.to_string()))?;
    if !accepted.contains(&url.scheme()) {
        return Err(DriverError::InvalidUri(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    Ok(url)
}

fn arity(command: &str, args: &[Value], expected: usize) -> DriverResult<()> {
    if args.len() != expected {
        return Err(DriverError::Arity {
            command: command.to_string(),
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

fn min_arity(command: &str, args: &[Value], expected: usize) -> DriverResult<()> {
    if args.len() < expected {
        return Err(DriverError::Arity {
            command: command.to_string(),
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

/// Read an argument as text; numbers and booleans are accepted
fn text(value: &Value) -> DriverResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(DriverError::InvalidArgument(format!(
            "expected a string, got {}",
            other
        ))),
    }
}

fn integer(value: &Value) -> DriverResult<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| DriverError::InvalidArgument(format!("{} is not an integer", n))),
        Value::String(s) => s
            .parse()
            .map_err(|_| DriverError::InvalidArgument(format!("'{}' is not an integer", s))),
        other => Err(DriverError::InvalidArgument(format!(
            "expected an integer, got {}",
            other
        ))),
    }
}

fn float(value: &Value) -> DriverResult<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| DriverError::InvalidArgument(format!("{} is not a number", n))),
        Value::String(s) => match s.as_str() {
            "-inf" => Ok(f64::NEG_INFINITY),
            "+inf" | "inf" => Ok(f64::INFINITY),
            _ => s
                .parse()
                .map_err(|_| DriverError::InvalidArgument(format!("'{}' is not a number", s))),
        },
        other => Err(DriverError::InvalidArgument(format!(
            "expected a number, got {}",
            other
        ))),
    }
}
