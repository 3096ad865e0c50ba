//! Shared utilities for integration and load testing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backpressure::config::AdmissionConfig;
use backpressure::{BackpressureController, Rejection};
use tokio::task::JoinHandle;

/// Limits used by the end-to-end scenario.
pub fn scenario_config() -> AdmissionConfig {
    let mut config = AdmissionConfig::default();
    config.backpressure.max_requests = 3;
    config.backpressure.time_window_ms = 1_000;
    config.backpressure.max_queue_size = 2;
    config.backpressure.queue_timeout_ms = 500;
    config.breaker.failure_threshold = 2;
    config.breaker.recovery_timeout_ms = 2_000;
    config.breaker.half_open_required_successes = 1;
    config.dispatcher.poll_interval_ms = 20;
    config
}

/// A single shared permit with a generous quota, so only the gate matters.
#[allow(dead_code)]
pub fn single_permit_config(max_queue_size: usize) -> AdmissionConfig {
    let mut config = AdmissionConfig::default();
    config.backpressure.max_requests = 10_000;
    config.backpressure.max_concurrent = Some(1);
    config.backpressure.max_queue_size = max_queue_size;
    config.backpressure.queue_timeout_ms = 5_000;
    config.dispatcher.poll_interval_ms = 20;
    config
}

/// Spawn an `acquire` that runs in the background.
#[allow(dead_code)]
pub fn spawn_acquire(
    controller: &Arc<BackpressureController>,
    resource: &'static str,
    priority: i32,
) -> JoinHandle<Result<(), Rejection>> {
    let controller = controller.clone();
    tokio::spawn(async move { controller.acquire(resource, priority, None).await })
}

/// Poll `condition` until it holds or `limit` passes.
#[allow(dead_code)]
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}

/// Await `fut`, failing the test if it takes longer than `limit`.
#[allow(dead_code)]
pub async fn within<T>(limit: Duration, fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(limit, fut)
        .await
        .expect("operation did not finish in time")
}
