//! Admission limits subsystem.
//!
//! # Data Flow
//! ```text
//! acquire(resource):
//!     → rate_limit.rs (per-resource sliding window quota)
//!     → concurrency.rs (shared permit pool, fast path or queue)
//!
//! registry.rs holds the per-resource windows (and breakers) and drops
//! state for resources that have gone quiet.
//! ```
//!
//! # Design Decisions
//! - Pure data structures, no locking: the controller owns them all behind
//!   a single mutex
//! - Timestamps use `tokio::time::Instant` so tests can pause the clock

pub mod concurrency;
pub mod rate_limit;
pub mod registry;

pub use concurrency::{ConcurrencyGate, GateError};
pub use rate_limit::{RateLimitWindow, RateLimiter};
pub use registry::{Evictable, ResourceRegistry};
