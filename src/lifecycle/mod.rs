//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! BackpressureController::new:
//!     Validate config → Build state → Spawn dispatcher (subscribed to Shutdown)
//!
//! BackpressureController::shutdown / drop:
//!     Trigger Shutdown → Dispatcher exits its loop
//! ```
//!
//! # Design Decisions
//! - The dispatcher only stops on an explicit shutdown, never on its own

pub mod shutdown;

pub use shutdown::Shutdown;
