//! Sliding-window rate limiting per resource.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::limits::registry::Evictable;

/// Timestamps of requests recorded for one resource inside the trailing window.
#[derive(Debug)]
pub struct RateLimitWindow {
    timestamps: VecDeque<Instant>,
    span: Duration,
}

impl RateLimitWindow {
    pub fn new(span: Duration) -> Self {
        Self {
            timestamps: VecDeque::new(),
            span,
        }
    }

    /// Drop every timestamp strictly older than `now - span`.
    fn prune(&mut self, now: Instant) {
        // Before the clock has run a full window nothing can be stale.
        let Some(cutoff) = now.checked_sub(self.span) else {
            return;
        };
        while let Some(&oldest) = self.timestamps.front() {
            if oldest < cutoff {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record `now` if fewer than `max_requests` remain after pruning.
    ///
    /// A rejected call leaves the window untouched apart from pruning.
    pub fn try_record(&mut self, now: Instant, max_requests: usize) -> bool {
        self.prune(now);
        if self.timestamps.len() < max_requests {
            self.timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Number of requests inside the window ending at `now`.
    pub fn count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.timestamps.len()
    }
}

impl Evictable for RateLimitWindow {
    fn is_idle(&self, now: Instant) -> bool {
        match (self.timestamps.back(), now.checked_sub(self.span)) {
            (None, _) => true,
            (Some(&newest), Some(cutoff)) => newest < cutoff,
            (Some(_), None) => false,
        }
    }
}

/// Quota settings applied to every resource window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    max_requests: usize,
    time_window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, time_window: Duration) -> Self {
        Self {
            max_requests,
            time_window,
        }
    }

    /// An empty window sized for this limiter.
    pub fn window(&self) -> RateLimitWindow {
        RateLimitWindow::new(self.time_window)
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn try_record(&self, window: &mut RateLimitWindow, now: Instant) -> bool {
        window.try_record(now, self.max_requests)
    }

    /// Returns `(requests_in_window, remaining_quota)`.
    pub fn usage(&self, window: &mut RateLimitWindow, now: Instant) -> (usize, usize) {
        let used = window.count(now);
        (used, self.max_requests.saturating_sub(used))
    }
}
