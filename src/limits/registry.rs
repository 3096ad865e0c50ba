//! Bounded per-resource state.
//!
//! # Responsibilities
//! - Create per-resource state lazily on first use
//! - Track when each resource was last touched
//! - Drop idle state after `idle_ttl`, and least-recently-used idle state
//!   once more than `max_entries` resources are tracked
//!
//! # Design Decisions
//! - Only entries that report themselves idle are ever evicted, so an open
//!   breaker or a non-empty window survives any amount of churn
//! - Sweeps piggyback on normal access, throttled by `sweep_interval`

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// State that can be forgotten without changing admission decisions.
pub trait Evictable {
    fn is_idle(&self, now: Instant) -> bool;
}

#[derive(Debug)]
struct Entry<T> {
    value: T,
    last_touched: Instant,
}

/// Map of resource id to lazily created state with idle eviction.
#[derive(Debug)]
pub struct ResourceRegistry<T> {
    entries: HashMap<String, Entry<T>>,
    idle_ttl: Duration,
    sweep_interval: Duration,
    max_entries: usize,
    last_sweep: Instant,
}

impl<T: Evictable> ResourceRegistry<T> {
    pub fn new(idle_ttl: Duration, sweep_interval: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            idle_ttl,
            sweep_interval,
            max_entries,
            last_sweep: Instant::now(),
        }
    }

    /// Fetch the state for `key`, creating it with `init` if absent.
    pub fn get_or_insert_with<F>(&mut self, key: &str, now: Instant, init: F) -> &mut T
    where
        F: FnOnce() -> T,
    {
        self.maybe_sweep(now);
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.evict_lru(now, self.entries.len() + 1 - self.max_entries);
        }

        let entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: init(),
            last_touched: now,
        });
        entry.last_touched = now;
        &mut entry.value
    }

    /// Fetch existing state without creating it.
    pub fn get_mut(&mut self, key: &str, now: Instant) -> Option<&mut T> {
        self.entries.get_mut(key).map(|entry| {
            entry.last_touched = now;
            &mut entry.value
        })
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut T)> {
        self.entries.iter_mut().map(|(key, entry)| (key, &mut entry.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run an idle sweep if `sweep_interval` has passed since the last one.
    pub fn maybe_sweep(&mut self, now: Instant) -> usize {
        if now.saturating_duration_since(self.last_sweep) < self.sweep_interval {
            return 0;
        }
        self.last_sweep = now;
        self.sweep(now)
    }

    /// Remove every idle entry untouched for at least `idle_ttl`.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let idle_ttl = self.idle_ttl;
        self.entries.retain(|_, entry| {
            now.saturating_duration_since(entry.last_touched) < idle_ttl
                || !entry.value.is_idle(now)
        });

        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.entries.len(), "Swept idle resource state");
        }
        evicted
    }

    /// Evict up to `count` idle entries, least recently touched first.
    fn evict_lru(&mut self, now: Instant, count: usize) {
        let mut idle: Vec<(Instant, String)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.value.is_idle(now))
            .map(|(key, entry)| (entry.last_touched, key.clone()))
            .collect();
        idle.sort();

        for (_, key) in idle.into_iter().take(count) {
            self.entries.remove(&key);
        }

        if self.entries.len() >= self.max_entries {
            tracing::warn!(
                tracked = self.entries.len(),
                max = self.max_entries,
                "Resource registry over capacity with no idle entries to evict"
            );
        }
    }
}
