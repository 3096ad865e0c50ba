//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::AdmissionConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<AdmissionConfig, ConfigError> {
    let config: AdmissionConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Invalid)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AdmissionConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content)?;

    tracing::info!(
        path = %path.display(),
        max_requests = config.backpressure.max_requests,
        max_concurrent = config.backpressure.concurrency_limit(),
        max_queue_size = config.backpressure.max_queue_size,
        "Configuration loaded"
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("backpressure-{}.toml", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            "[backpressure]\nmax_requests = 3\nmax_queue_size = 2\nqueue_timeout_ms = 500\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.backpressure.max_queue_size, 2);
        assert_eq!(config.backpressure.queue_timeout_ms, 500);

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/backpressure.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = parse_config("[breaker]\nfailure_threshold = 0\n").unwrap_err();
        match err {
            ConfigError::Invalid(errors) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = parse_config("[backpressure\nmax_requests = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
