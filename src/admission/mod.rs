//! Admission subsystem.
//!
//! # Data Flow
//! ```text
//! acquire(resource, priority, timeout)
//!     → controller.rs: rate limit → breaker → permit pool
//!         ├─ permit free:  granted immediately
//!         ├─ queue full:   Rejection::QueueFull
//!         └─ otherwise:    queue.rs (priority, arrival order)
//!                              → dispatcher.rs grants on release/enqueue wakeup
//!                              → or Rejection::QueueTimeout
//!
//! release(resource)             → permit back to pool, dispatcher woken
//! record_outcome(resource, ok)  → resource's circuit breaker
//! ```
//!
//! # Design Decisions
//! - Single-process primitive; nothing is persisted across restarts
//! - Fairness is best effort: priority then arrival among waiters only

pub mod controller;
pub mod dispatcher;
pub mod permit;
pub mod queue;
pub mod types;

pub use controller::BackpressureController;
pub use permit::AdmissionPermit;
pub use queue::{AdmissionQueue, AdmissionRequest, QueueFull};
pub use types::{
    ControllerError, DispatchError, DispatcherHealth, Rejection, ResourceStats, StatsSnapshot,
};
