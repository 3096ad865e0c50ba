//! Backpressure controller.
//!
//! # Responsibilities
//! - Own the rate-limit windows, breakers, admission queue and permit pool
//! - Decide admit / queue / reject for every `acquire`
//! - Forward outcomes to the resource's breaker
//! - Report every admit, reject and breaker transition to the metrics sink
//!
//! # Design Decisions
//! - One mutex guards all state; it is never held across an `.await`
//! - Rejections are values (`Rejection`), never panics or errors
//! - Only genuine permit contention waits, bounded by the queue timeout
//! - A waiter that gives up closes its result slot under the lock, so the
//!   dispatcher can never grant a permit nobody will release

use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::atomic::AtomicU32;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::admission::dispatcher;
use crate::admission::permit::AdmissionPermit;
use crate::admission::queue::{AdmissionQueue, AdmissionRequest};
use crate::admission::types::{
    ControllerError, DispatcherHealth, Rejection, ResourceStats, StatsSnapshot,
};
use crate::config::{validate_config, AdmissionConfig, ConfigError};
use crate::lifecycle::Shutdown;
use crate::limits::{ConcurrencyGate, GateError, RateLimitWindow, RateLimiter, ResourceRegistry};
use crate::observability::metrics::{self as names, MetricsSink, NoopMetrics};
use crate::resilience::{BreakerPolicy, BreakerState, CircuitBreaker, Transition, Verdict};

/// All mutable admission state, guarded by `Shared::state`.
#[derive(Debug)]
pub(crate) struct State {
    pub(crate) windows: ResourceRegistry<RateLimitWindow>,
    pub(crate) breakers: ResourceRegistry<CircuitBreaker>,
    pub(crate) queue: AdmissionQueue,
    pub(crate) gate: ConcurrencyGate,
}

/// State shared between the controller handle, permits and the dispatcher.
pub(crate) struct Shared {
    state: Mutex<State>,
    pub(crate) wakeup: Notify,
    limiter: RateLimiter,
    breaker_policy: BreakerPolicy,
    queue_timeout: Duration,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    health: AtomicU8,
    /// Number of upcoming dispatch passes that should fault.
    #[cfg(test)]
    pub(crate) faults: AtomicU32,
}

/// Result of the synchronous part of `acquire`.
enum Admission {
    Granted,
    Queued {
        id: Uuid,
        rx: oneshot::Receiver<()>,
        probe: bool,
    },
}

impl Shared {
    /// Lock the admission state.
    ///
    /// Every critical section leaves the state consistent before it can
    /// panic, so a poisoned lock is still safe to use.
    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn health(&self) -> DispatcherHealth {
        DispatcherHealth::from(self.health.load(Ordering::Relaxed))
    }

    pub(crate) fn set_health(&self, health: DispatcherHealth) {
        self.health.store(health as u8, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn take_fault(&self) -> bool {
        self.faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Hand back a half-open probe lease whose call will never report.
    fn abandon_probe(&self, resource_id: &str) {
        let mut state = self.lock();
        if let Some(breaker) = state.breakers.get_mut(resource_id, Instant::now()) {
            breaker.abandon_probe();
        }
    }

    /// Steps 1-3 of admission, plus enqueueing on contention.
    fn admit_or_enqueue(&self, resource_id: &str, priority: i32) -> Result<Admission, Rejection> {
        let now = Instant::now();
        let mut guard = self.lock();
        let state = &mut *guard;

        let limiter = self.limiter;
        let window = state
            .windows
            .get_or_insert_with(resource_id, now, || limiter.window());
        if !limiter.try_record(window, now) {
            drop(guard);
            self.reject(resource_id, Rejection::RateLimitExceeded);
            return Err(Rejection::RateLimitExceeded);
        }

        let policy = self.breaker_policy;
        let breaker = state
            .breakers
            .get_or_insert_with(resource_id, now, || CircuitBreaker::new(policy));
        let (probe, transition) = match breaker.check(now) {
            Verdict::Allowed => (false, None),
            Verdict::Probe { transition } => (true, transition),
            Verdict::Rejected => {
                drop(guard);
                self.reject(resource_id, Rejection::CircuitOpen);
                return Err(Rejection::CircuitOpen);
            }
        };

        if state.gate.try_acquire() {
            let (queued, in_use) = (state.queue.len(), state.gate.outstanding());
            drop(guard);
            if let Some(transition) = transition {
                self.on_transition(resource_id, transition);
            }
            self.publish_gauges(queued, in_use);
            self.metrics
                .increment_counter(names::ADMITTED_TOTAL, &[("resource", resource_id), ("path", "fast")]);
            tracing::debug!(resource = %resource_id, priority, probe, "Admitted immediately");
            return Ok(Admission::Granted);
        }

        let (request, rx) = AdmissionRequest::new(resource_id, priority, now);
        let id = request.id;
        if state.queue.enqueue(request).is_err() {
            if probe {
                if let Some(breaker) = state.breakers.get_mut(resource_id, now) {
                    breaker.abandon_probe();
                }
            }
            drop(guard);
            if let Some(transition) = transition {
                self.on_transition(resource_id, transition);
            }
            self.reject(resource_id, Rejection::QueueFull);
            return Err(Rejection::QueueFull);
        }

        let (queued, in_use) = (state.queue.len(), state.gate.outstanding());
        drop(guard);
        if let Some(transition) = transition {
            self.on_transition(resource_id, transition);
        }
        self.publish_gauges(queued, in_use);
        tracing::debug!(
            resource = %resource_id,
            priority,
            request_id = %id,
            queue_size = queued,
            "Permit pool saturated, request queued"
        );
        Ok(Admission::Queued { id, rx, probe })
    }

    /// Give up on a queued request. Returns true if a grant had already landed.
    ///
    /// Runs under the lock so it serializes with the dispatcher: either the
    /// grant was delivered before the slot closed, or the dispatcher will see
    /// a closed slot and discard the request.
    fn cancel_wait(
        &self,
        id: Uuid,
        rx: &mut oneshot::Receiver<()>,
        resource_id: &str,
        probe: bool,
    ) -> bool {
        let mut state = self.lock();
        rx.close();
        let granted = rx.try_recv().is_ok();
        if !granted {
            state.queue.remove(id);
            if probe {
                if let Some(breaker) = state.breakers.get_mut(resource_id, Instant::now()) {
                    breaker.abandon_probe();
                }
            }
        }
        let (queued, in_use) = (state.queue.len(), state.gate.outstanding());
        drop(state);
        self.publish_gauges(queued, in_use);
        granted
    }

    pub(crate) fn release(&self, resource_id: &str) -> Result<(), GateError> {
        let mut state = self.lock();
        let result = state.gate.release();
        let (queued, in_use) = (state.queue.len(), state.gate.outstanding());
        drop(state);

        match result {
            Ok(()) => {
                self.publish_gauges(queued, in_use);
                self.wakeup.notify_one();
            }
            Err(ref e) => {
                tracing::warn!(resource = %resource_id, error = %e, "Release without a granted permit");
                self.metrics
                    .increment_counter(names::RELEASE_VIOLATIONS_TOTAL, &[("resource", resource_id)]);
            }
        }
        result
    }

    pub(crate) fn record_outcome(&self, resource_id: &str, success: bool) {
        let now = Instant::now();
        let policy = self.breaker_policy;
        let transition = {
            let mut state = self.lock();
            let breaker = state
                .breakers
                .get_or_insert_with(resource_id, now, || CircuitBreaker::new(policy));
            if success {
                breaker.record_success()
            } else {
                breaker.record_failure(now)
            }
        };
        if let Some(transition) = transition {
            self.on_transition(resource_id, transition);
        }
    }

    fn stats(&self) -> StatsSnapshot {
        let now = Instant::now();
        let mut state = self.lock();
        let state = &mut *state;
        let limiter = self.limiter;

        let mut per_resource = BTreeMap::new();
        for (resource_id, window) in state.windows.iter_mut() {
            let (requests_in_window, remaining_quota) = limiter.usage(window, now);
            let breaker_state = state
                .breakers
                .get(resource_id)
                .map_or(BreakerState::Closed, CircuitBreaker::state);
            per_resource.insert(
                resource_id.clone(),
                ResourceStats {
                    requests_in_window,
                    remaining_quota,
                    breaker_state,
                },
            );
        }
        for (resource_id, breaker) in state.breakers.iter_mut() {
            per_resource
                .entry(resource_id.clone())
                .or_insert_with(|| ResourceStats {
                    requests_in_window: 0,
                    remaining_quota: limiter.max_requests(),
                    breaker_state: breaker.state(),
                });
        }

        StatsSnapshot {
            queue_size: state.queue.len(),
            permits_in_use: state.gate.outstanding(),
            max_concurrent: state.gate.capacity(),
            dispatcher_health: self.health(),
            per_resource,
        }
    }

    fn reject(&self, resource_id: &str, rejection: Rejection) {
        tracing::debug!(resource = %resource_id, reason = rejection.reason(), "Request rejected");
        self.metrics.increment_counter(
            names::REJECTED_TOTAL,
            &[("resource", resource_id), ("reason", rejection.reason())],
        );
    }

    fn on_transition(&self, resource_id: &str, transition: Transition) {
        match transition.to {
            BreakerState::Open => tracing::warn!(
                resource = %resource_id,
                from = %transition.from,
                to = %transition.to,
                "Circuit opened"
            ),
            _ => tracing::info!(
                resource = %resource_id,
                from = %transition.from,
                to = %transition.to,
                "Circuit state changed"
            ),
        }
        self.metrics.increment_counter(
            names::BREAKER_TRANSITIONS_TOTAL,
            &[
                ("resource", resource_id),
                ("from", transition.from.as_str()),
                ("to", transition.to.as_str()),
            ],
        );
    }

    pub(crate) fn publish_gauges(&self, queue_size: usize, permits_in_use: usize) {
        self.metrics.set_gauge(names::QUEUE_DEPTH, queue_size as f64);
        self.metrics.set_gauge(names::PERMITS_IN_USE, permits_in_use as f64);
    }
}

/// A caller waiting on its result slot.
///
/// If the `acquire` future is dropped mid-wait the request is cancelled, and
/// a grant that raced with the drop is handed straight back to the pool.
struct PendingAdmission<'a> {
    shared: &'a Shared,
    resource_id: &'a str,
    id: Uuid,
    rx: oneshot::Receiver<()>,
    probe: bool,
    done: bool,
}

impl PendingAdmission<'_> {
    fn cancel(&mut self) -> bool {
        self.done = true;
        self.shared
            .cancel_wait(self.id, &mut self.rx, self.resource_id, self.probe)
    }
}

impl Drop for PendingAdmission<'_> {
    fn drop(&mut self) {
        if !self.done && self.cancel() {
            tracing::debug!(
                resource = %self.resource_id,
                request_id = %self.id,
                "Waiter dropped after grant, returning permit"
            );
            let _ = self.shared.release(self.resource_id);
            if self.probe {
                self.shared.abandon_probe(self.resource_id);
            }
        }
    }
}

/// Admission controller for a set of downstream resources.
///
/// Callers `acquire` before touching a resource, then `release` the permit
/// and `record_outcome` exactly once per successful acquire (or use
/// [`BackpressureController::admit`] to get a permit that releases itself).
pub struct BackpressureController {
    shared: Arc<Shared>,
    shutdown: Shutdown,
    dispatcher: JoinHandle<()>,
}

impl BackpressureController {
    /// Build a controller with no-op metrics.
    ///
    /// Must be called from within a Tokio runtime; the dispatcher is spawned here.
    pub fn new(config: AdmissionConfig) -> Result<Self, ControllerError> {
        Self::with_metrics(config, Arc::new(NoopMetrics))
    }

    pub fn with_metrics(
        config: AdmissionConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, ControllerError> {
        validate_config(&config).map_err(ConfigError::Invalid)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ControllerError::NoRuntime)?;

        let bp = &config.backpressure;
        let reg = &config.registry;
        let state = State {
            windows: ResourceRegistry::new(reg.idle_ttl(), reg.sweep_interval(), reg.max_tracked_resources),
            breakers: ResourceRegistry::new(reg.idle_ttl(), reg.sweep_interval(), reg.max_tracked_resources),
            queue: AdmissionQueue::new(bp.max_queue_size),
            gate: ConcurrencyGate::new(bp.concurrency_limit()),
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            wakeup: Notify::new(),
            limiter: RateLimiter::new(bp.max_requests, bp.time_window()),
            breaker_policy: BreakerPolicy::from(&config.breaker),
            queue_timeout: bp.queue_timeout(),
            metrics,
            health: AtomicU8::new(DispatcherHealth::Healthy as u8),
            #[cfg(test)]
            faults: AtomicU32::new(0),
        });

        let shutdown = Shutdown::new();
        let dispatcher = runtime.spawn(dispatcher::run(
            shared.clone(),
            config.dispatcher.clone(),
            shutdown.subscribe(),
        ));

        tracing::info!(
            max_requests = bp.max_requests,
            time_window_ms = bp.time_window_ms,
            max_concurrent = bp.concurrency_limit(),
            max_queue_size = bp.max_queue_size,
            queue_timeout_ms = bp.queue_timeout_ms,
            "Backpressure controller started"
        );

        Ok(Self {
            shared,
            shutdown,
            dispatcher,
        })
    }

    /// Ask for a permit to call `resource_id`.
    ///
    /// Rate-limit, open-circuit and full-queue rejections return immediately.
    /// Only when every permit is taken does the call wait, for at most
    /// `timeout` (or the configured queue timeout when `None`).
    pub async fn acquire(
        &self,
        resource_id: &str,
        priority: i32,
        timeout: Option<Duration>,
    ) -> Result<(), Rejection> {
        let (id, rx, probe) = match self.shared.admit_or_enqueue(resource_id, priority)? {
            Admission::Granted => return Ok(()),
            Admission::Queued { id, rx, probe } => (id, rx, probe),
        };
        self.shared.wakeup.notify_one();

        let wait = timeout.unwrap_or(self.shared.queue_timeout);
        let started = Instant::now();
        let mut pending = PendingAdmission {
            shared: &self.shared,
            resource_id,
            id,
            rx,
            probe,
            done: false,
        };

        let outcome = tokio::time::timeout(wait, &mut pending.rx).await;
        let granted = match outcome {
            Ok(Ok(())) => {
                pending.done = true;
                true
            }
            // Slot dropped without a grant, or the wait timed out.
            Ok(Err(_)) | Err(_) => pending.cancel(),
        };

        if granted {
            self.shared.metrics.increment_counter(
                names::ADMITTED_TOTAL,
                &[("resource", resource_id), ("path", "queued")],
            );
            tracing::debug!(
                resource = %resource_id,
                request_id = %id,
                waited_ms = started.elapsed().as_millis() as u64,
                "Queued request granted"
            );
            Ok(())
        } else {
            self.shared.reject(resource_id, Rejection::QueueTimeout);
            Err(Rejection::QueueTimeout)
        }
    }

    /// Like [`acquire`](Self::acquire), but returns a permit that releases on drop.
    pub async fn admit(
        &self,
        resource_id: &str,
        priority: i32,
        timeout: Option<Duration>,
    ) -> Result<AdmissionPermit, Rejection> {
        self.acquire(resource_id, priority, timeout).await?;
        Ok(AdmissionPermit::new(self.shared.clone(), resource_id))
    }

    /// Return one permit to the pool and wake the dispatcher.
    ///
    /// Does not touch the breaker; call [`record_outcome`](Self::record_outcome) too.
    pub fn release(&self, resource_id: &str) -> Result<(), GateError> {
        self.shared.release(resource_id)
    }

    /// Feed the result of a call into the resource's circuit breaker.
    pub fn record_outcome(&self, resource_id: &str, success: bool) {
        self.shared.record_outcome(resource_id, success)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats()
    }

    pub fn dispatcher_health(&self) -> DispatcherHealth {
        self.shared.health()
    }

    /// Stop the dispatcher. Queued requests are left to time out.
    pub fn shutdown(&self) {
        if self.shutdown.trigger() {
            tracing::info!("Backpressure controller shutting down");
        }
    }

    /// True once `shutdown` was called or the controller began dropping.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// True once the dispatcher task has exited.
    pub fn is_stopped(&self) -> bool {
        self.dispatcher.is_finished()
    }

    #[cfg(test)]
    pub(crate) fn shared_for_tests(&self) -> Arc<Shared> {
        self.shared.clone()
    }
}

impl Drop for BackpressureController {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::testing::RecordingMetrics;

    fn config(max_requests: usize, max_queue_size: usize) -> AdmissionConfig {
        let mut config = AdmissionConfig::default();
        config.backpressure.max_requests = max_requests;
        config.backpressure.max_queue_size = max_queue_size;
        config.backpressure.queue_timeout_ms = 500;
        config.breaker.failure_threshold = 2;
        config.breaker.recovery_timeout_ms = 2_000;
        config.dispatcher.poll_interval_ms = 10;
        config
    }

    #[test]
    fn test_requires_runtime() {
        let err = BackpressureController::new(config(3, 2)).err().unwrap();
        assert!(matches!(err, ControllerError::NoRuntime));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let err = BackpressureController::new(config(0, 2)).err().unwrap();
        assert!(matches!(err, ControllerError::Config(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_without_queueing() {
        let mut cfg = config(2, 2);
        cfg.backpressure.max_concurrent = Some(10);
        let controller = BackpressureController::new(cfg).unwrap();

        assert!(controller.acquire("a", 1, None).await.is_ok());
        assert!(controller.acquire("a", 1, None).await.is_ok());
        assert_eq!(
            controller.acquire("a", 1, None).await,
            Err(Rejection::RateLimitExceeded)
        );
        // Quotas are per resource.
        assert!(controller.acquire("b", 1, None).await.is_ok());

        let stats = controller.stats();
        assert_eq!(stats.queue_size, 0);
        assert_eq!(stats.permits_in_use, 3);
        assert_eq!(stats.resource("a").unwrap().remaining_quota, 0);
        assert_eq!(stats.resource("b").unwrap().requests_in_window, 1);
    }

    #[tokio::test]
    async fn test_queue_full_is_immediate() {
        let mut cfg = config(10, 1);
        cfg.backpressure.max_concurrent = Some(1);
        let metrics = Arc::new(RecordingMetrics::default());
        let controller = Arc::new(BackpressureController::with_metrics(cfg, metrics.clone()).unwrap());

        controller.acquire("a", 1, None).await.unwrap();
        let waiter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.acquire("a", 1, Some(Duration::from_secs(5))).await })
        };
        while controller.stats().queue_size == 0 {
            tokio::task::yield_now().await;
        }

        let started = std::time::Instant::now();
        assert_eq!(controller.acquire("a", 1, None).await, Err(Rejection::QueueFull));
        assert!(started.elapsed() < Duration::from_millis(100));

        assert_eq!(metrics.gauge(names::QUEUE_DEPTH), Some(1.0));
        assert_eq!(metrics.gauge(names::PERMITS_IN_USE), Some(1.0));

        controller.release("a").unwrap();
        assert_eq!(waiter.await.unwrap(), Ok(()));

        assert_eq!(metrics.gauge(names::QUEUE_DEPTH), Some(0.0));
        assert_eq!(metrics.gauge(names::PERMITS_IN_USE), Some(1.0));
        assert_eq!(metrics.count(names::ADMITTED_TOTAL, ("path", "fast")), 1);
        assert_eq!(metrics.count(names::ADMITTED_TOTAL, ("path", "queued")), 1);
        assert_eq!(metrics.count(names::REJECTED_TOTAL, ("reason", "queue_full")), 1);
    }

    #[tokio::test]
    async fn test_queue_timeout_leaves_no_phantom_grant() {
        let mut cfg = config(10, 4);
        cfg.backpressure.max_concurrent = Some(1);
        let controller = BackpressureController::new(cfg).unwrap();

        controller.acquire("a", 1, None).await.unwrap();
        assert_eq!(
            controller.acquire("a", 1, Some(Duration::from_millis(30))).await,
            Err(Rejection::QueueTimeout)
        );
        assert_eq!(controller.stats().queue_size, 0);

        controller.release("a").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // The timed-out waiter must not have been handed the freed permit.
        assert_eq!(controller.stats().permits_in_use, 0);
    }

    #[tokio::test]
    async fn test_dropped_waiter_is_cancelled() {
        let mut cfg = config(10, 4);
        cfg.backpressure.max_concurrent = Some(1);
        let controller = BackpressureController::new(cfg).unwrap();

        controller.acquire("a", 1, None).await.unwrap();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            controller.acquire("a", 1, Some(Duration::from_secs(10))),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(controller.stats().queue_size, 0);

        controller.release("a").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(controller.stats().permits_in_use, 0);
    }

    #[tokio::test]
    async fn test_release_without_permit_is_reported() {
        let metrics = Arc::new(RecordingMetrics::default());
        let controller = BackpressureController::with_metrics(config(3, 2), metrics.clone()).unwrap();

        assert_eq!(controller.release("a"), Err(GateError::NoOutstandingPermits));
        assert_eq!(metrics.count(names::RELEASE_VIOLATIONS_TOTAL, ("resource", "a")), 1);
    }

    #[tokio::test]
    async fn test_breaker_blocks_and_reports() {
        let metrics = Arc::new(RecordingMetrics::default());
        let controller = BackpressureController::with_metrics(config(10, 2), metrics.clone()).unwrap();

        controller.record_outcome("svc", false);
        controller.record_outcome("svc", false);
        assert_eq!(controller.acquire("svc", 1, None).await, Err(Rejection::CircuitOpen));
        assert_eq!(controller.stats().resource("svc").unwrap().breaker_state, BreakerState::Open);

        assert_eq!(metrics.count(names::BREAKER_TRANSITIONS_TOTAL, ("to", "open")), 1);
        assert_eq!(metrics.count(names::REJECTED_TOTAL, ("reason", "circuit_open")), 1);
    }

    #[tokio::test]
    async fn test_admit_permit_releases_on_drop() {
        let controller = BackpressureController::new(config(5, 2)).unwrap();

        let permit = controller.admit("a", 1, None).await.unwrap();
        assert_eq!(permit.resource_id(), "a");
        assert_eq!(controller.stats().permits_in_use, 1);
        drop(permit);
        assert_eq!(controller.stats().permits_in_use, 0);

        let permit = controller.admit("a", 1, None).await.unwrap();
        permit.failed();
        assert_eq!(controller.stats().permits_in_use, 0);
        controller.admit("a", 1, None).await.unwrap().failed();
        assert_eq!(controller.acquire("a", 1, None).await, Err(Rejection::CircuitOpen));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_half_open_waiter_returns_lease() {
        let mut cfg = config(10, 2);
        cfg.backpressure.max_concurrent = Some(1);
        cfg.dispatcher.poll_interval_ms = 10_000;
        let controller = BackpressureController::new(cfg).unwrap();
        let shared = controller.shared_for_tests();

        controller.acquire("other", 1, None).await.unwrap();
        controller.record_outcome("svc", false);
        controller.record_outcome("svc", false);
        tokio::time::sleep(Duration::from_millis(2_000)).await;

        // The recovery call takes the half-open lease and queues behind "other".
        let mut trial = Box::pin(controller.acquire("svc", 1, None));
        tokio::select! {
            biased;
            _ = &mut trial => panic!("gate is saturated, call must queue"),
            _ = std::future::ready(()) => {}
        }
        assert_eq!(controller.stats().queue_size, 1);
        assert_eq!(controller.stats().resource("svc").unwrap().breaker_state, BreakerState::HalfOpen);

        // Granted, but the caller goes away before observing it.
        controller.release("other").unwrap();
        dispatcher::dispatch_once(&shared).unwrap();
        drop(trial);
        assert_eq!(controller.stats().permits_in_use, 0);

        // The lease is free again, so the next call can test the resource.
        assert_eq!(controller.acquire("svc", 1, None).await, Ok(()));
    }

    #[tokio::test]
    async fn test_shutdown_stops_dispatcher() {
        let controller = BackpressureController::new(config(3, 2)).unwrap();
        assert!(!controller.is_shutdown());
        controller.shutdown();
        assert!(controller.is_shutdown());
        for _ in 0..100 {
            if controller.is_stopped() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(controller.is_stopped());
        assert_eq!(controller.dispatcher_health(), DispatcherHealth::Stopped);
    }
}
