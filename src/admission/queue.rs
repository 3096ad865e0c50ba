//! Bounded priority queue of requests waiting for a permit.
//!
//! Ordering is `(priority, enqueue_time, sequence)` ascending: a lower
//! priority value is served first and equal priorities are served FIFO.
//! The sequence number breaks ties between identical timestamps.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("admission queue is full ({0} entries)")]
pub struct QueueFull(pub usize);

/// A caller waiting for a permit.
///
/// The result slot is a oneshot sender. The waiting caller holds the
/// receiver; once the caller gives up the receiver is closed and the
/// request is considered cancelled.
#[derive(Debug)]
pub struct AdmissionRequest {
    pub id: Uuid,
    pub resource_id: String,
    pub priority: i32,
    pub enqueue_time: Instant,
    seq: u64,
    slot: oneshot::Sender<()>,
}

impl AdmissionRequest {
    pub fn new(
        resource_id: &str,
        priority: i32,
        enqueue_time: Instant,
    ) -> (Self, oneshot::Receiver<()>) {
        let (slot, rx) = oneshot::channel();
        let request = Self {
            id: Uuid::new_v4(),
            resource_id: resource_id.to_string(),
            priority,
            enqueue_time,
            seq: 0,
            slot,
        };
        (request, rx)
    }

    pub fn is_cancelled(&self) -> bool {
        self.slot.is_closed()
    }

    /// Resolve the slot as granted. Fails if the waiter already gave up.
    pub fn grant(self) -> Result<(), GrantFailed> {
        let id = self.id;
        self.slot.send(()).map_err(|_| GrantFailed { id })
    }

    fn key(&self) -> (i32, Instant, u64) {
        (self.priority, self.enqueue_time, self.seq)
    }
}

/// The waiter was gone by the time the grant was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantFailed {
    pub id: Uuid,
}

impl PartialEq for AdmissionRequest {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for AdmissionRequest {}

impl PartialOrd for AdmissionRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AdmissionRequest {
    // BinaryHeap is a max-heap; invert so the smallest key is on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

/// Bounded priority queue of pending admissions.
#[derive(Debug)]
pub struct AdmissionQueue {
    heap: BinaryHeap<AdmissionRequest>,
    max_size: usize,
    next_seq: u64,
}

impl AdmissionQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            max_size,
            next_seq: 0,
        }
    }

    /// Add a request, or refuse immediately if the queue is at capacity.
    ///
    /// Cancelled entries are purged before a request is refused, so dead
    /// waiters never hold capacity against live ones.
    pub fn enqueue(&mut self, mut request: AdmissionRequest) -> Result<(), QueueFull> {
        if self.heap.len() >= self.max_size {
            self.purge_cancelled();
            if self.heap.len() >= self.max_size {
                return Err(QueueFull(self.heap.len()));
            }
        }
        request.seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(request);
        Ok(())
    }

    /// Put back a request that was popped but could not be granted.
    ///
    /// Keeps its original key, so its position is unchanged, and skips the
    /// capacity check since it was already counted.
    pub fn requeue(&mut self, request: AdmissionRequest) {
        self.heap.push(request);
    }

    pub fn peek_highest(&self) -> Option<&AdmissionRequest> {
        self.heap.peek()
    }

    pub fn pop_highest(&mut self) -> Option<AdmissionRequest> {
        self.heap.pop()
    }

    /// Remove a specific request, e.g. after its waiter timed out.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.heap.len();
        self.heap.retain(|request| request.id != id);
        self.heap.len() != before
    }

    pub fn purge_cancelled(&mut self) -> usize {
        let before = self.heap.len();
        self.heap.retain(|request| !request.is_cancelled());
        before - self.heap.len()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
