// src/dag/slots.rs

//! Processor slot accounting shared between the coordinator and workers.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::error;

/// Counting pool of processor slots.
///
/// Acquisition is all-or-nothing: a job needing `n` slots either gets all
/// of them or none. The pool never hands out more than `max` slots at once.
#[derive(Debug)]
pub struct SlotPool {
    max: usize,
    available: AtomicUsize,
    acquired_total: AtomicU64,
    released_total: AtomicU64,
}

impl SlotPool {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            available: AtomicUsize::new(max),
            acquired_total: AtomicU64::new(0),
            released_total: AtomicU64::new(0),
        }
    }

    /// Take `n` slots if they are all free right now.
    pub fn try_acquire(&self, n: usize) -> bool {
        if n > self.max {
            return false;
        }
        let acquired = self
            .available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |avail| {
                avail.checked_sub(n)
            })
            .is_ok();
        if acquired {
            self.acquired_total.fetch_add(n as u64, Ordering::Relaxed);
        }
        acquired
    }

    /// Return `n` slots taken by a successful [`SlotPool::try_acquire`].
    ///
    /// Releasing more than is outstanding is a bookkeeping bug; it is logged
    /// and the pool is clamped at `max`.
    pub fn release(&self, n: usize) {
        let result = self
            .available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |avail| {
                let next = avail + n;
                (next <= self.max).then_some(next)
            });
        match result {
            Ok(_) => {
                self.released_total.fetch_add(n as u64, Ordering::Relaxed);
            }
            Err(avail) => {
                error!(slots = n, available = avail, max = self.max, "slot over-release");
                self.available.store(self.max, Ordering::Release);
            }
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn available(&self) -> usize {
        self.available.load(Ordering::Acquire)
    }

    pub fn in_use(&self) -> usize {
        self.max - self.available()
    }

    /// Total slots ever acquired.
    pub fn acquired_total(&self) -> u64 {
        self.acquired_total.load(Ordering::Relaxed)
    }

    /// Total slots ever released.
    pub fn released_total(&self) -> u64 {
        self.released_total.load(Ordering::Relaxed)
    }
}
