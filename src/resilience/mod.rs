//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! acquire(resource):
//!     → circuit_breaker.rs (fail fast while the resource is isolated)
//! record_outcome(resource, success):
//!     → circuit_breaker.rs (count failures, open/close the circuit)
//! Dispatcher fault:
//!     → backoff.rs (jittered delay before the next dispatch pass)
//! ```
//!
//! # Design Decisions
//! - Circuit breaker prevents cascading failures
//! - The controller never retries on the caller's behalf
//! - Jittered backoff keeps a faulting dispatcher from spinning

pub mod backoff;
pub mod circuit_breaker;

pub use backoff::Backoff;
pub use circuit_breaker::{BreakerPolicy, BreakerState, CircuitBreaker, Transition, Verdict};
