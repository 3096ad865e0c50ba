//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the `MetricsSink` capability the controller reports through
//! - Provide a no-op default and a `metrics` facade implementation
//! - Install the Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `backpressure_admitted_total` (counter): admissions by resource, path
//! - `backpressure_rejected_total` (counter): rejections by resource, reason
//! - `backpressure_breaker_transitions_total` (counter): by resource, from, to
//! - `backpressure_release_violations_total` (counter): releases with no permit out
//! - `backpressure_dispatcher_errors_total` (counter): faulted dispatch passes
//! - `backpressure_queue_depth` (gauge): requests waiting for a permit
//! - `backpressure_permits_in_use` (gauge): outstanding gate permits
//!
//! # Design Decisions
//! - The core only sees the trait; no telemetry backend is required
//! - Sink calls happen outside the controller lock

use metrics::Label;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

pub const ADMITTED_TOTAL: &str = "backpressure_admitted_total";
pub const REJECTED_TOTAL: &str = "backpressure_rejected_total";
pub const BREAKER_TRANSITIONS_TOTAL: &str = "backpressure_breaker_transitions_total";
pub const RELEASE_VIOLATIONS_TOTAL: &str = "backpressure_release_violations_total";
pub const DISPATCHER_ERRORS_TOTAL: &str = "backpressure_dispatcher_errors_total";
pub const QUEUE_DEPTH: &str = "backpressure_queue_depth";
pub const PERMITS_IN_USE: &str = "backpressure_permits_in_use";

/// Destination for admission events.
pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]);
    fn set_gauge(&self, name: &str, value: f64);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment_counter(&self, _name: &str, _labels: &[(&str, &str)]) {}
    fn set_gauge(&self, _name: &str, _value: f64) {}
}

/// Forwards to the global `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusMetrics;

impl MetricsSink for PrometheusMetrics {
    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        let labels: Vec<Label> = labels
            .iter()
            .map(|(key, value)| Label::new(key.to_string(), value.to_string()))
            .collect();
        metrics::counter!(name.to_string(), labels).increment(1);
    }

    fn set_gauge(&self, name: &str, value: f64) {
        metrics::gauge!(name.to_string()).set(value);
    }
}

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn install_prometheus_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::MetricsSink;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records every call for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingMetrics {
        pub counters: Mutex<Vec<(String, Vec<(String, String)>)>>,
        pub gauges: Mutex<HashMap<String, f64>>,
    }

    impl RecordingMetrics {
        pub fn count(&self, name: &str, label: (&str, &str)) -> usize {
            self.counters
                .lock()
                .unwrap()
                .iter()
                .filter(|(n, labels)| {
                    n == name && labels.iter().any(|(k, v)| k == label.0 && v == label.1)
                })
                .count()
        }

        /// Increments of `name` regardless of labels.
        pub fn total(&self, name: &str) -> usize {
            self.counters
                .lock()
                .unwrap()
                .iter()
                .filter(|(n, _)| n == name)
                .count()
        }

        pub fn gauge(&self, name: &str) -> Option<f64> {
            self.gauges.lock().unwrap().get(name).copied()
        }
    }

    impl MetricsSink for RecordingMetrics {
        fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
            let labels = labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.counters.lock().unwrap().push((name.to_string(), labels));
        }

        fn set_gauge(&self, name: &str, value: f64) {
            self.gauges.lock().unwrap().insert(name.to_string(), value);
        }
    }
}
