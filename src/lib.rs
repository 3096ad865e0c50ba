//! In-process admission control and backpressure.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │               BackpressureController                 │
//!   acquire ──────┼─▶ rate limit ─▶ circuit ─▶ permit pool ──▶ granted   │
//!                 │   (per resource) breaker   (shared, N)                │
//!                 │        │           │           │ full                 │
//!                 │        ▼           ▼           ▼                      │
//!                 │   RateLimit-   CircuitOpen  admission queue ◀──┐      │
//!                 │   Exceeded                 (priority, FIFO)    │      │
//!                 │                                  │         dispatcher │
//!   release ──────┼─▶ permit pool ───── wakeup ──────┼────────────▶│      │
//!   record_outcome┼─▶ circuit breaker                ▼             │      │
//!                 │                          QueueFull / QueueTimeout     │
//!                 └──────────────────────────────────────────────────────┘
//! ```
//!
//! The protected operation itself is opaque: callers run it after `acquire`
//! succeeds and report back with `release` and `record_outcome`.

// Core subsystems
pub mod admission;
pub mod config;
pub mod limits;
pub mod resilience;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use admission::{AdmissionPermit, BackpressureController, Rejection, StatsSnapshot};
pub use config::AdmissionConfig;
