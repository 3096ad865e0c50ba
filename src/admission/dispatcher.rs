//! Background dispatcher.
//!
//! # Responsibilities
//! - Wait for a release or enqueue wakeup (or the fallback poll)
//! - Grant freed permits to the highest-priority live queued requests
//! - Discard requests whose waiters already gave up
//! - Survive internal faults: log, back off, report health, keep going
//!
//! # Design Decisions
//! - Woken by `Notify`; the poll interval only bounds worst-case latency
//! - A dispatch pass is synchronous and runs entirely under the state lock
//! - Panics inside a pass are caught; the loop only exits on shutdown

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::admission::controller::Shared;
use crate::admission::types::{DispatchError, DispatcherHealth};
use crate::config::DispatcherConfig;
use crate::observability::metrics as names;
use crate::resilience::Backoff;

/// What a single dispatch pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct DispatchReport {
    pub granted: usize,
    pub discarded: usize,
}

/// Match queued requests to free permits until one side runs out.
pub(crate) fn dispatch_once(shared: &Shared) -> Result<DispatchReport, DispatchError> {
    #[cfg(test)]
    if shared.take_fault() {
        panic!("injected dispatch fault");
    }

    let mut report = DispatchReport::default();
    let mut state = shared.lock();

    while let Some(request) = state.queue.pop_highest() {
        if request.is_cancelled() {
            report.discarded += 1;
            continue;
        }
        if !state.gate.try_acquire() {
            // No capacity: the key is unchanged so the request keeps its place.
            state.queue.requeue(request);
            break;
        }

        let id = request.id;
        let resource_id = request.resource_id.clone();
        let waited = Instant::now().saturating_duration_since(request.enqueue_time);
        match request.grant() {
            Ok(()) => {
                report.granted += 1;
                tracing::debug!(
                    resource = %resource_id,
                    request_id = %id,
                    waited_ms = waited.as_millis() as u64,
                    "Dispatched permit to queued request"
                );
            }
            Err(_) => {
                // Waiter vanished between the check and the send.
                state.gate.release()?;
                report.discarded += 1;
            }
        }
    }

    if report.granted > 0 || report.discarded > 0 {
        let (queued, in_use) = (state.queue.len(), state.gate.outstanding());
        drop(state);
        shared.publish_gauges(queued, in_use);
    }
    Ok(report)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one pass, converting a panic into a `DispatchError`.
fn guarded_pass(shared: &Shared) -> Result<DispatchReport, DispatchError> {
    match panic::catch_unwind(AssertUnwindSafe(|| dispatch_once(shared))) {
        Ok(result) => result,
        Err(payload) => Err(DispatchError::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Dispatcher main loop.
pub(crate) async fn run(
    shared: Arc<Shared>,
    config: DispatcherConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(poll_interval_ms = config.poll_interval_ms, "Dispatcher starting");

    let poll_interval = config.poll_interval();
    let mut backoff = Backoff::new(
        std::time::Duration::from_millis(config.error_backoff_base_ms),
        std::time::Duration::from_millis(config.error_backoff_max_ms),
    );

    loop {
        tokio::select! {
            _ = shared.wakeup.notified() => {}
            _ = time::sleep(poll_interval) => {}
            _ = shutdown.recv() => {
                tracing::info!("Dispatcher received shutdown signal, exiting loop");
                break;
            }
        }

        match guarded_pass(&shared) {
            Ok(_) => {
                if backoff.attempt() > 0 {
                    tracing::info!(faults = backoff.attempt(), "Dispatcher recovered");
                    backoff.reset();
                }
                shared.set_health(DispatcherHealth::Healthy);
            }
            Err(e) => {
                let delay = backoff.next_delay();
                let health = if backoff.attempt() >= config.unhealthy_after_errors {
                    DispatcherHealth::Unhealthy
                } else {
                    DispatcherHealth::Degraded
                };
                shared.set_health(health);
                shared.metrics.increment_counter(names::DISPATCHER_ERRORS_TOTAL, &[]);
                tracing::error!(
                    error = %e,
                    consecutive_faults = backoff.attempt(),
                    health = ?health,
                    delay_ms = delay.as_millis() as u64,
                    "Dispatch pass failed, backing off"
                );

                tokio::select! {
                    _ = time::sleep(delay) => {}
                    _ = shutdown.recv() => {
                        tracing::info!("Dispatcher received shutdown signal during backoff");
                        break;
                    }
                }
            }
        }
    }

    shared.set_health(DispatcherHealth::Stopped);
}
