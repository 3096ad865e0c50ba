//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities, thresholds and durations > 0)
//! - Validate the metrics bind address when the exporter is enabled
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AdmissionConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the controller

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::AdmissionConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A value that must be strictly positive was zero.
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    /// Lower bound exceeds upper bound.
    #[error("{lower} ({lower_value}) must not exceed {upper} ({upper_value})")]
    InvertedRange {
        lower: &'static str,
        lower_value: u64,
        upper: &'static str,
        upper_value: u64,
    },

    /// Metrics address could not be parsed.
    #[error("invalid metrics address: {0}")]
    MetricsAddress(String),
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &AdmissionConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut positive = |field: &'static str, value: u64| {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field });
        }
    };

    let bp = &config.backpressure;
    positive("backpressure.max_requests", bp.max_requests as u64);
    positive("backpressure.time_window_ms", bp.time_window_ms);
    if let Some(max_concurrent) = bp.max_concurrent {
        positive("backpressure.max_concurrent", max_concurrent as u64);
    }
    positive("backpressure.max_queue_size", bp.max_queue_size as u64);
    positive("backpressure.queue_timeout_ms", bp.queue_timeout_ms);

    let breaker = &config.breaker;
    positive("breaker.failure_threshold", breaker.failure_threshold as u64);
    positive("breaker.recovery_timeout_ms", breaker.recovery_timeout_ms);
    positive(
        "breaker.half_open_required_successes",
        breaker.half_open_required_successes as u64,
    );

    let dispatcher = &config.dispatcher;
    positive("dispatcher.poll_interval_ms", dispatcher.poll_interval_ms);
    positive("dispatcher.error_backoff_base_ms", dispatcher.error_backoff_base_ms);
    positive("dispatcher.unhealthy_after_errors", dispatcher.unhealthy_after_errors as u64);

    let registry = &config.registry;
    positive("registry.idle_ttl_secs", registry.idle_ttl_secs);
    positive("registry.sweep_interval_secs", registry.sweep_interval_secs);
    positive("registry.max_tracked_resources", registry.max_tracked_resources as u64);

    if dispatcher.error_backoff_base_ms > dispatcher.error_backoff_max_ms {
        errors.push(ValidationError::InvertedRange {
            lower: "dispatcher.error_backoff_base_ms",
            lower_value: dispatcher.error_backoff_base_ms,
            upper: "dispatcher.error_backoff_max_ms",
            upper_value: dispatcher.error_backoff_max_ms,
        });
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::MetricsAddress(obs.metrics_address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AdmissionConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_violation() {
        let mut config = AdmissionConfig::default();
        config.backpressure.max_requests = 0;
        config.backpressure.max_concurrent = Some(0);
        config.breaker.failure_threshold = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::NotPositive {
            field: "backpressure.max_concurrent"
        }));
    }

    #[test]
    fn test_inverted_backoff_range() {
        let mut config = AdmissionConfig::default();
        config.dispatcher.error_backoff_base_ms = 5_000;
        config.dispatcher.error_backoff_max_ms = 100;

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvertedRange { .. }));
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = AdmissionConfig::default();
        config.observability.metrics_address = "not-an-address".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::MetricsAddress("not-an-address".into())]
        );
    }
}
