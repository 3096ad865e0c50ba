//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the admission
//! controller. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the admission controller.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Rate limiting, concurrency and queueing limits.
    pub backpressure: BackpressureConfig,

    /// Per-resource circuit breaker settings.
    pub breaker: BreakerConfig,

    /// Background dispatcher tuning.
    pub dispatcher: DispatcherConfig,

    /// Idle eviction of per-resource state.
    pub registry: RegistryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Admission limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackpressureConfig {
    /// Maximum requests per resource within the sliding window.
    pub max_requests: usize,

    /// Sliding window length in milliseconds.
    pub time_window_ms: u64,

    /// Size of the shared permit pool. Falls back to `max_requests` when unset.
    pub max_concurrent: Option<usize>,

    /// Maximum number of requests waiting for a permit.
    pub max_queue_size: usize,

    /// Default time a queued request waits before giving up, in milliseconds.
    pub queue_timeout_ms: u64,
}

impl BackpressureConfig {
    pub fn time_window(&self) -> Duration {
        Duration::from_millis(self.time_window_ms)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    /// Effective capacity of the concurrency gate.
    pub fn concurrency_limit(&self) -> usize {
        self.max_concurrent.unwrap_or(self.max_requests)
    }
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            time_window_ms: 1_000,
            max_concurrent: None,
            max_queue_size: 1_000,
            queue_timeout_ms: 5_000,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Time the circuit stays open before a probe is allowed, in milliseconds.
    pub recovery_timeout_ms: u64,

    /// Successful probes required to close a half-open circuit.
    pub half_open_required_successes: u32,
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            half_open_required_successes: 1,
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Fallback poll interval when no wakeup arrives, in milliseconds.
    pub poll_interval_ms: u64,

    /// Base delay after an internal fault, in milliseconds.
    pub error_backoff_base_ms: u64,

    /// Upper bound on the fault delay, in milliseconds.
    pub error_backoff_max_ms: u64,

    /// Consecutive faults before the dispatcher reports itself unhealthy.
    pub unhealthy_after_errors: u32,
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            error_backoff_base_ms: 10,
            error_backoff_max_ms: 1_000,
            unhealthy_after_errors: 5,
        }
    }
}

/// Per-resource state retention.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Idle time after which a resource's state may be dropped, in seconds.
    pub idle_ttl_secs: u64,

    /// Minimum time between idle sweeps, in seconds.
    pub sweep_interval_secs: u64,

    /// Soft cap on tracked resources; idle entries beyond it are evicted LRU first.
    pub max_tracked_resources: usize,
}

impl RegistryConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 600,
            sweep_interval_secs: 60,
            max_tracked_resources: 10_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default tracing filter, overridden by `RUST_LOG`.
    pub log_filter: String,

    /// Install the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "backpressure=info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
