//! Service tiers and the pool/breaker limits they map to
//!
//! A tier is supplied with every call and only consulted when a pool is first
//! created for a (tenant, backend) key. Changing a tenant's tier does not
//! resize an open pool; the new limits apply once the key has been closed and
//! is recreated.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tessera_core_resilience::CircuitBreakerConfig;

/// Service tier of a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Pro, Tier::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(Error::Config(format!("unknown tier '{}'", other))),
        }
    }
}

/// Pool and breaker limits for one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    /// Connections kept warm when pre-warming is enabled
    pub min_size: usize,

    /// Hard cap on physical connections per (tenant, backend)
    pub max_size: usize,

    /// Callers allowed to queue for a connection before failing fast
    pub max_pending: usize,

    /// Consecutive failures that open the breaker
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time the breaker stays open before admitting a trial call
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

impl TierLimits {
    pub const fn new(min_size: usize, max_size: usize, max_pending: usize) -> Self {
        Self {
            min_size,
            max_size,
            max_pending,
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
        }
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    /// Breaker configuration for pools of this tier
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: self.reset_timeout(),
        }
    }

    fn validate(&self, tier: Tier) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::Config(format!("{} tier: max_size must be > 0", tier)));
        }
        if self.min_size > self.max_size {
            return Err(Error::Config(format!(
                "{} tier: min_size ({}) exceeds max_size ({})",
                tier, self.min_size, self.max_size
            )));
        }
        if self.failure_threshold == 0 {
            return Err(Error::Config(format!(
                "{} tier: failure_threshold must be > 0",
                tier
            )));
        }
        Ok(())
    }
}

/// Tier → limits table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    #[serde(default = "default_free")]
    pub free: TierLimits,

    #[serde(default = "default_pro")]
    pub pro: TierLimits,

    #[serde(default = "default_enterprise")]
    pub enterprise: TierLimits,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            free: default_free(),
            pro: default_pro(),
            enterprise: default_enterprise(),
        }
    }
}

impl TierPolicy {
    /// Limits for a tier
    pub fn limits_for(&self, tier: Tier) -> &TierLimits {
        match tier {
            Tier::Free => &self.free,
            Tier::Pro => &self.pro,
            Tier::Enterprise => &self.enterprise,
        }
    }

    /// Set the breaker parameters of every tier at once
    pub fn with_breaker(mut self, failure_threshold: u32, reset_timeout: Duration) -> Self {
        for limits in [&mut self.free, &mut self.pro, &mut self.enterprise] {
            limits.failure_threshold = failure_threshold;
            limits.reset_timeout_ms = reset_timeout.as_millis() as u64;
        }
        self
    }

    /// Check per-tier sanity and that pool caps grow strictly with the tier
    pub fn validate(&self) -> Result<()> {
        for tier in Tier::ALL {
            self.limits_for(tier).validate(tier)?;
        }

        if !(self.free.max_size < self.pro.max_size && self.pro.max_size < self.enterprise.max_size)
        {
            return Err(Error::Config(format!(
                "tier max_size must increase free < pro < enterprise (got {} / {} / {})",
                self.free.max_size, self.pro.max_size, self.enterprise.max_size
            )));
        }

        Ok(())
    }
}

// Default value functions for serde
fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

fn default_free() -> TierLimits {
    TierLimits::new(1, 2, 50)
}

fn default_pro() -> TierLimits {
    TierLimits::new(2, 10, 200)
}

fn default_enterprise() -> TierLimits {
    TierLimits::new(5, 50, 1000)
}
