//! Admission outcomes, errors and stats.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::ConfigError;
use crate::limits::GateError;
use crate::resilience::BreakerState;

/// Why a request was not admitted. All of these are expected backpressure
/// conditions; the caller decides whether and when to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// The resource used up its quota for the current window.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// The resource's circuit is open and not yet eligible to probe.
    #[error("circuit open")]
    CircuitOpen,

    /// The admission queue was at capacity.
    #[error("admission queue full")]
    QueueFull,

    /// No permit was granted before the wait timed out.
    #[error("timed out waiting for a permit")]
    QueueTimeout,
}

impl Rejection {
    /// Stable label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::RateLimitExceeded => "rate_limit_exceeded",
            Rejection::CircuitOpen => "circuit_open",
            Rejection::QueueFull => "queue_full",
            Rejection::QueueTimeout => "queue_timeout",
        }
    }
}

/// Errors building a controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no Tokio runtime available to run the dispatcher")]
    NoRuntime,
}

/// Internal dispatcher faults. Logged and survived, never returned to callers.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("permit pool out of sync: {0}")]
    Gate(#[from] GateError),

    #[error("dispatch pass panicked: {0}")]
    Panicked(String),
}

/// Dispatcher health signal.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherHealth {
    Healthy = 0,
    /// The last dispatch pass faulted; the loop is backing off.
    Degraded = 1,
    /// Repeated consecutive faults; queued admission may be stalled.
    Unhealthy = 2,
    /// The dispatcher was shut down.
    Stopped = 3,
}

impl From<u8> for DispatcherHealth {
    fn from(val: u8) -> Self {
        match val {
            0 => DispatcherHealth::Healthy,
            1 => DispatcherHealth::Degraded,
            2 => DispatcherHealth::Unhealthy,
            _ => DispatcherHealth::Stopped,
        }
    }
}

/// Per-resource view in a stats snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStats {
    pub requests_in_window: usize,
    pub remaining_quota: usize,
    pub breaker_state: BreakerState,
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub queue_size: usize,
    pub permits_in_use: usize,
    pub max_concurrent: usize,
    pub dispatcher_health: DispatcherHealth,
    pub per_resource: BTreeMap<String, ResourceStats>,
}

impl StatsSnapshot {
    pub fn resource(&self, resource_id: &str) -> Option<&ResourceStats> {
        self.per_resource.get(resource_id)
    }
}
