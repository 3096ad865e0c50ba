//! Circuit breaker for resource protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: resource assumed down, requests fail fast
//! - Half-Open: testing if resource recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first check after recovery_timeout (that call is the probe)
//! Half-Open → Closed: half_open_required_successes probe successes
//! Half-Open → Open: any probe failure
//! ```
//!
//! # Design Decisions
//! - Per-resource circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in flight in Half-Open (prevents hammering a recovering resource)
//! - A probe lease that is never resolved expires after recovery_timeout

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::limits::Evictable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change, reported so callers can log and count it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: BreakerState,
    pub to: BreakerState,
}

/// Outcome of asking the breaker whether a call may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Closed: the call proceeds normally.
    Allowed,
    /// The call proceeds as the half-open probe.
    Probe { transition: Option<Transition> },
    /// Open, or a probe is already in flight.
    Rejected,
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Verdict::Rejected)
    }
}

/// Thresholds shared by every breaker a controller creates.
#[derive(Debug, Clone, Copy)]
pub struct BreakerPolicy {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub half_open_required_successes: u32,
}

impl From<&BreakerConfig> for BreakerPolicy {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            recovery_timeout: config.recovery_timeout(),
            half_open_required_successes: config.half_open_required_successes,
        }
    }
}

/// Failure-isolation state machine for one resource.
#[derive(Debug)]
pub struct CircuitBreaker {
    policy: BreakerPolicy,
    state: BreakerState,
    consecutive_failures: u32,
    last_failure_time: Option<Instant>,
    half_open_successes: u32,
    probe_started: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            policy,
            state: BreakerState::Closed,
            consecutive_failures: 0,
            last_failure_time: None,
            half_open_successes: 0,
            probe_started: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn transition(&mut self, to: BreakerState) -> Transition {
        let from = self.state;
        self.state = to;
        Transition { from, to }
    }

    /// Decide whether a call may proceed at `now`.
    pub fn check(&mut self, now: Instant) -> Verdict {
        match self.state {
            BreakerState::Closed => Verdict::Allowed,
            BreakerState::Open => {
                let recovered = self
                    .last_failure_time
                    .map_or(true, |t| now.saturating_duration_since(t) >= self.policy.recovery_timeout);
                if recovered {
                    let transition = self.transition(BreakerState::HalfOpen);
                    self.half_open_successes = 0;
                    self.probe_started = Some(now);
                    Verdict::Probe {
                        transition: Some(transition),
                    }
                } else {
                    Verdict::Rejected
                }
            }
            BreakerState::HalfOpen => {
                let lease_free = self.probe_started.map_or(true, |started| {
                    now.saturating_duration_since(started) >= self.policy.recovery_timeout
                });
                if lease_free {
                    self.probe_started = Some(now);
                    Verdict::Probe { transition: None }
                } else {
                    Verdict::Rejected
                }
            }
        }
    }

    /// Hand back a probe lease whose call never reached the resource.
    pub fn abandon_probe(&mut self) {
        if self.state == BreakerState::HalfOpen {
            self.probe_started = None;
        }
    }

    pub fn record_success(&mut self) -> Option<Transition> {
        match self.state {
            BreakerState::Closed => {
                self.consecutive_failures = 0;
                None
            }
            BreakerState::HalfOpen => {
                self.probe_started = None;
                self.half_open_successes += 1;
                if self.half_open_successes >= self.policy.half_open_required_successes {
                    self.consecutive_failures = 0;
                    self.half_open_successes = 0;
                    self.last_failure_time = None;
                    Some(self.transition(BreakerState::Closed))
                } else {
                    None
                }
            }
            // Late result from a call admitted before the circuit opened.
            BreakerState::Open => None,
        }
    }

    pub fn record_failure(&mut self, now: Instant) -> Option<Transition> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        match self.state {
            BreakerState::Closed => {
                self.last_failure_time = Some(now);
                if self.consecutive_failures >= self.policy.failure_threshold {
                    Some(self.transition(BreakerState::Open))
                } else {
                    None
                }
            }
            BreakerState::HalfOpen => {
                self.last_failure_time = Some(now);
                self.half_open_successes = 0;
                self.probe_started = None;
                Some(self.transition(BreakerState::Open))
            }
            // Keep the recovery schedule of the original trip.
            BreakerState::Open => None,
        }
    }
}

impl Evictable for CircuitBreaker {
    fn is_idle(&self, _now: Instant) -> bool {
        self.state == BreakerState::Closed && self.consecutive_failures == 0
    }
}
