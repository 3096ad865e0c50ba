//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Controller and dispatcher produce:
//!     → tracing events (structured fields: resource, reason, request_id)
//!     → metrics.rs MetricsSink (counters, gauges)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Metrics go through an injectable sink with a no-op default
//! - Request ID (uuid) flows from enqueue to grant or timeout

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{install_prometheus_exporter, MetricsSink, NoopMetrics, PrometheusMetrics};

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ObservabilityConfig;

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("failed to install log subscriber: {0}")]
    Logging(#[from] logging::TryInitError),

    #[error("invalid metrics address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("failed to install metrics exporter: {0}")]
    Exporter(#[from] metrics_exporter_prometheus::BuildError),
}

/// Install logging and, when enabled, the Prometheus exporter.
///
/// Returns the sink to hand to `BackpressureController::with_metrics`.
/// Must be called from within a Tokio runtime when metrics are enabled.
pub fn init(config: &ObservabilityConfig) -> Result<Arc<dyn MetricsSink>, ObservabilityError> {
    init_logging(&config.log_filter)?;

    if !config.metrics_enabled {
        return Ok(Arc::new(NoopMetrics));
    }
    let addr: SocketAddr = config.metrics_address.parse()?;
    install_prometheus_exporter(addr)?;
    Ok(Arc::new(PrometheusMetrics))
}
