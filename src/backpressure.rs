//! Backpressure handling for write operations.
//!
//! The writer task is the sink: frames handed to it but not yet written count
//! as pending. When the pending count reaches the limit the sink is full and
//! producers must stop handing it frames. Every time the writer brings the
//! count back below the limit it raises a drain signal.
//!
//! The signal is recurring: each drain stores one wakeup for the producer,
//! so a drain that happens before the producer starts waiting is not lost.
//!
//! While the sink is full the producer keeps frames in a [`DeferQueue`]
//! governed by an explicit [`DeferPolicy`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Notify;

use crate::error::{Result, SsewireError};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING: usize = 16;

#[derive(Debug)]
struct Shared {
    pending: AtomicUsize,
    drains: AtomicU64,
    drained: Notify,
}

/// Backpressure controller for managing write queue pressure.
///
/// Clones share state: the producer reserves, the writer task releases.
#[derive(Debug, Clone)]
pub struct BackpressureController {
    shared: Arc<Shared>,
    /// Maximum allowed pending frames.
    max_pending: usize,
}

impl BackpressureController {
    /// Create a new backpressure controller with specified limit.
    pub fn new(max_pending: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: AtomicUsize::new(0),
                drains: AtomicU64::new(0),
                drained: Notify::new(),
            }),
            max_pending: max_pending.max(1),
        }
    }

    /// Check if we can accept more frames.
    #[inline]
    pub fn can_accept(&self) -> bool {
        self.pending_count() < self.max_pending
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.pending_count() >= self.max_pending
    }

    /// Get current pending count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Get maximum pending limit.
    #[inline]
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Number of drain signals raised so far.
    #[inline]
    pub fn drain_count(&self) -> u64 {
        self.shared.drains.load(Ordering::Acquire)
    }

    /// Try to reserve a slot without blocking.
    ///
    /// Returns `Ok(())` if reserved, `Err(Backpressure)` if at capacity.
    pub fn try_reserve(&self) -> Result<()> {
        self.shared
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max_pending).then_some(current + 1)
            })
            .map(|_| ())
            .map_err(|_| SsewireError::Backpressure)
    }

    /// Give back a reservation that was never used (frame not queued).
    ///
    /// Does not raise a drain signal.
    #[inline]
    pub fn cancel_reservation(&self) {
        self.shared.pending.fetch_sub(1, Ordering::AcqRel);
    }

    /// Release slots after frames were written.
    ///
    /// Raises the drain signal when this brings the count from at-limit to
    /// below the limit.
    pub fn release_many(&self, count: usize) {
        if count == 0 {
            return;
        }

        let previous = self.shared.pending.fetch_sub(count, Ordering::AcqRel);
        if previous >= self.max_pending && previous - count < self.max_pending {
            self.shared.drains.fetch_add(1, Ordering::AcqRel);
            self.shared.drained.notify_one();
        }
    }

    /// Release a single slot.
    #[inline]
    pub fn release(&self) {
        self.release_many(1);
    }

    /// Wait for the next drain signal.
    ///
    /// If a drain happened since the last call, this returns immediately.
    /// Callers should re-check [`can_accept`](Self::can_accept) afterwards.
    pub async fn drained(&self) {
        self.shared.drained.notified().await;
    }
}

impl Default for BackpressureController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

/// What to keep while the sink is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeferPolicy {
    /// Keep only the newest frame; each new frame replaces the deferred one.
    #[default]
    KeepLatest,
    /// Keep up to `n` frames in order, dropping the oldest when full.
    Bounded(usize),
}

impl DeferPolicy {
    /// Maximum number of frames held.
    pub fn capacity(&self) -> usize {
        match self {
            DeferPolicy::KeepLatest => 1,
            DeferPolicy::Bounded(n) => (*n).max(1),
        }
    }
}

/// Frames held back while the sink is full.
#[derive(Debug)]
pub struct DeferQueue {
    policy: DeferPolicy,
    frames: VecDeque<Bytes>,
    dropped: u64,
}

impl DeferQueue {
    /// Create an empty queue with the given policy.
    pub fn new(policy: DeferPolicy) -> Self {
        Self {
            policy,
            frames: VecDeque::with_capacity(policy.capacity()),
            dropped: 0,
        }
    }

    /// Defer a frame, returning the frame evicted to make room, if any.
    pub fn push(&mut self, frame: Bytes) -> Option<Bytes> {
        let evicted = if self.frames.len() >= self.policy.capacity() {
            self.dropped += 1;
            self.frames.pop_front()
        } else {
            None
        };
        self.frames.push_back(frame);
        evicted
    }

    /// Take the oldest deferred frame.
    pub fn pop_front(&mut self) -> Option<Bytes> {
        self.frames.pop_front()
    }

    /// Put a frame back at the front (flush attempt failed).
    pub fn push_front(&mut self, frame: Bytes) {
        self.frames.push_front(frame);
    }

    /// Number of deferred frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if nothing is deferred.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames evicted by the policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// The active policy.
    pub fn policy(&self) -> DeferPolicy {
        self.policy
    }
}
