//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or AdmissionConfig::default()
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AdmissionConfig (validated, immutable)
//!     → moved into BackpressureController at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the controller is built; no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::AdmissionConfig;
pub use schema::BackpressureConfig;
pub use schema::BreakerConfig;
pub use schema::DispatcherConfig;
pub use schema::ObservabilityConfig;
pub use schema::RegistryConfig;
pub use validation::{validate_config, ValidationError};
