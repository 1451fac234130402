//! Prometheus metrics for tenant connection management
//!
//! Every series is labelled by `tenant`, `backend` and `tier` so one export
//! surface covers all tenants. The process normally shares the lazily built
//! [`MetricsRegistry::global`] instance; tests build their own with
//! [`MetricsRegistry::new`].

use crate::error::MetricsError;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global registry shared by every manager in the process
static GLOBAL: OnceLock<MetricsRegistry> = OnceLock::new();

const KEY_LABELS: [&str; 3] = ["tenant", "backend", "tier"];

/// Label set identifying one (tenant, backend) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyLabels<'a> {
    pub tenant: &'a str,
    pub backend: &'a str,
    pub tier: &'a str,
}

impl<'a> KeyLabels<'a> {
    pub fn new(tenant: &'a str, backend: &'a str, tier: &'a str) -> Self {
        Self {
            tenant,
            backend,
            tier,
        }
    }

    fn with<'b>(&'b self, extra: &'b str) -> [&'b str; 4] {
        [self.tenant, self.backend, self.tier, extra]
    }

    fn values(&self) -> [&str; 3] {
        [self.tenant, self.backend, self.tier]
    }
}

/// Process-wide metrics for queries, errors, rejections, pools and breakers
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    queries_total: IntCounterVec,
    query_duration_seconds: HistogramVec,
    errors_total: IntCounterVec,
    rejected_total: IntCounterVec,
    circuit_state: IntGaugeVec,
    circuit_transitions_total: IntCounterVec,
    pool_connections: IntGaugeVec,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}

impl MetricsRegistry {
    /// Build an independent registry with all metrics registered
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        // Query counter
        let queries_total = IntCounterVec::new(
            Opts::new(
                "tessera_queries_total",
                "Total backend operations executed, by outcome",
            ),
            &["tenant", "backend", "tier", "status"],
        )?;
        registry.register(Box::new(queries_total.clone()))?;

        // Query latency
        let query_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "tessera_query_duration_seconds",
                "Backend operation latency including pool acquisition",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["tenant", "backend", "tier", "operation"],
        )?;
        registry.register(Box::new(query_duration_seconds.clone()))?;

        // Errors
        let errors_total = IntCounterVec::new(
            Opts::new("tessera_errors_total", "Total failed backend operations"),
            &["tenant", "backend", "tier", "kind"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        // Fail-fast rejections
        let rejected_total = IntCounterVec::new(
            Opts::new(
                "tessera_rejected_total",
                "Calls rejected before reaching the pool",
            ),
            &["tenant", "backend", "tier", "reason"],
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        // Breaker state
        let circuit_state = IntGaugeVec::new(
            Opts::new(
                "tessera_circuit_breaker_state",
                "Circuit breaker state (0=closed, 1=half-open, 2=open)",
            ),
            &KEY_LABELS,
        )?;
        registry.register(Box::new(circuit_state.clone()))?;

        let circuit_transitions_total = IntCounterVec::new(
            Opts::new(
                "tessera_circuit_breaker_transitions_total",
                "Circuit breaker state transitions by event",
            ),
            &["tenant", "backend", "tier", "event"],
        )?;
        registry.register(Box::new(circuit_transitions_total.clone()))?;

        // Pool occupancy
        let pool_connections = IntGaugeVec::new(
            Opts::new(
                "tessera_pool_connections",
                "Pool occupancy (size, available, pending)",
            ),
            &["tenant", "backend", "tier", "state"],
        )?;
        registry.register(Box::new(pool_connections.clone()))?;

        Ok(Self {
            registry,
            queries_total,
            query_duration_seconds,
            errors_total,
            rejected_total,
            circuit_state,
            circuit_transitions_total,
            pool_connections,
        })
    }

    /// Get or initialize the process-wide registry
    pub fn global() -> &'static MetricsRegistry {
        GLOBAL.get_or_init(|| {
            MetricsRegistry::new().expect("static metric definitions are valid")
        })
    }

    /// Record a successful operation and its latency
    pub fn record_success(&self, key: KeyLabels<'_>, operation: &str, duration_secs: f64) {
        self.queries_total.with_label_values(&key.with("success")).inc();
        self.query_duration_seconds
            .with_label_values(&key.with(operation))
            .observe(duration_secs);
    }

    /// Record a failed operation
    ///
    /// `kind` distinguishes operation, connection, timeout and pool-exhaustion
    /// failures. Pool exhaustion never ran a query, so it is not counted in
    /// `tessera_queries_total`.
    pub fn record_error(
        &self,
        key: KeyLabels<'_>,
        operation: &str,
        kind: &str,
        duration_secs: Option<f64>,
    ) {
        self.errors_total.with_label_values(&key.with(kind)).inc();
        if let Some(duration) = duration_secs {
            self.queries_total.with_label_values(&key.with("error")).inc();
            self.query_duration_seconds
                .with_label_values(&key.with(operation))
                .observe(duration);
        }
    }

    /// Record a call rejected without touching the pool
    pub fn record_rejection(&self, key: KeyLabels<'_>, reason: &str) {
        self.rejected_total.with_label_values(&key.with(reason)).inc();
    }

    /// Publish the breaker's current state
    pub fn set_circuit_state(&self, key: KeyLabels<'_>, state: i64) {
        self.circuit_state.with_label_values(&key.values()).set(state);
    }

    /// Count a breaker transition (`open`, `close`, `half-open`)
    pub fn record_transition(&self, key: KeyLabels<'_>, event: &str, state: i64) {
        self.circuit_transitions_total
            .with_label_values(&key.with(event))
            .inc();
        self.set_circuit_state(key, state);
    }

    /// Publish pool occupancy
    pub fn set_pool_stats(&self, key: KeyLabels<'_>, size: usize, available: usize, pending: usize) {
        for (state, value) in [("size", size), ("available", available), ("pending", pending)] {
            self.pool_connections
                .with_label_values(&key.with(state))
                .set(value as i64);
        }
    }

    /// Drop gauge series for a key that no longer exists
    ///
    /// Counters are left in place; they are monotonic by contract.
    pub fn forget_key(&self, key: KeyLabels<'_>) {
        let _ = self.circuit_state.remove_label_values(&key.values());
        for state in ["size", "available", "pending"] {
            let _ = self.pool_connections.remove_label_values(&key.with(state));
        }
    }

    /// Clear every series (tests only need this; the process registry lives forever)
    pub fn reset(&self) {
        self.queries_total.reset();
        self.query_duration_seconds.reset();
        self.errors_total.reset();
        self.rejected_total.reset();
        self.circuit_state.reset();
        self.circuit_transitions_total.reset();
        self.pool_connections.reset();
    }

    /// Current value of `tessera_queries_total` for a key and status
    pub fn query_count(&self, key: KeyLabels<'_>, status: &str) -> u64 {
        self.queries_total.with_label_values(&key.with(status)).get()
    }

    /// Current value of `tessera_errors_total` for a key and kind
    pub fn error_count(&self, key: KeyLabels<'_>, kind: &str) -> u64 {
        self.errors_total.with_label_values(&key.with(kind)).get()
    }

    /// Current value of `tessera_rejected_total` for a key and reason
    pub fn rejection_count(&self, key: KeyLabels<'_>, reason: &str) -> u64 {
        self.rejected_total.with_label_values(&key.with(reason)).get()
    }

    /// Underlying Prometheus registry, for mounting on an exporter
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
