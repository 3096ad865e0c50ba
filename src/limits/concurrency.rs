//! Bounded permit pool shared by every resource.
//!
//! # Design Decisions
//! - One pool for all resources: a burst on one resource can take every
//!   permit and starve queued requests for the others. Grant order among
//!   waiters is only priority then arrival, never per-resource fairness.
//! - Releasing with nothing outstanding is a caller bug and is refused

use thiserror::Error;

/// Misuse of the permit pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("release called with no outstanding permits")]
    NoOutstandingPermits,
}

/// Counting permit pool of fixed capacity.
#[derive(Debug)]
pub struct ConcurrencyGate {
    capacity: usize,
    outstanding: usize,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            outstanding: 0,
        }
    }

    /// Take a permit if one is free.
    pub fn try_acquire(&mut self) -> bool {
        if self.outstanding < self.capacity {
            self.outstanding += 1;
            true
        } else {
            false
        }
    }

    /// Return a permit to the pool.
    pub fn release(&mut self) -> Result<(), GateError> {
        if self.outstanding == 0 {
            return Err(GateError::NoOutstandingPermits);
        }
        self.outstanding -= 1;
        Ok(())
    }

    pub fn has_capacity(&self) -> bool {
        self.outstanding < self.capacity
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
