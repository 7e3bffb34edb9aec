// SPDX-License-Identifier: MPL-2.0

//! Single-slot frame handoff between the decode worker and the renderer.
//!
//! ```text
//! ┌─────────────┐
//! │ DecodeWorker│  decodes into its own back buffer
//! └─────┬───────┘
//!       │ publish() - swaps the slot, hands back the displaced frame
//!       ▼
//! ┌─────────────┐
//! │ FrameStore  │  ← one published frame + dirty flag
//! └─────┬───────┘
//!       │ try_consume() - returns the frame once, never blocks
//!       ▼
//! ┌─────────────┐
//! │ Presentation│
//! └─────────────┘
//! ```
//!
//! # Key Guarantees
//!
//! - **No torn reads**: a published frame lives behind an `Arc` and is never
//!   mutated again. The worker only recycles a displaced buffer once
//!   `Arc::get_mut` proves nobody else can see it.
//! - **Renderer never blocks**: `try_consume` uses `try_lock` and reports
//!   nothing on contention; the frame stays dirty for the next tick.
//! - **Producer never waits on the consumer**: `publish` holds the slot lock
//!   for a pointer swap only.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use crate::animated::Frame;

/// Statistics about frame store operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Total frames published by the worker.
    pub published: u64,
    /// Frames handed to the renderer.
    pub consumed: u64,
    /// Frames replaced before the renderer consumed them.
    pub overwritten: u64,
}

/// Holds the most recent complete frame and whether it has been consumed.
///
/// Designed for a single producer (decode worker) and a single consumer
/// (presentation bridge) on different threads.
#[derive(Debug, Default)]
pub struct FrameStore {
    /// The published frame.
    slot: Mutex<Option<Arc<Frame>>>,
    /// Set by `publish`, cleared by `try_consume`. Only changed with `slot` held.
    dirty: AtomicBool,
    /// Set once the worker is disposed; further publication is refused.
    closed: AtomicBool,
    stats_published: AtomicU64,
    stats_consumed: AtomicU64,
    stats_overwritten: AtomicU64,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<Frame>>> {
        // The slot is only ever swapped or cloned, so a poisoned guard still
        // holds a whole frame.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `frame` the published frame and mark the store dirty.
    ///
    /// Returns the displaced frame so the producer can recycle its buffer, or
    /// hands `frame` back as `Err` if the store has been closed.
    pub fn publish(&self, frame: Arc<Frame>) -> Result<Option<Arc<Frame>>, Arc<Frame>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(frame);
        }

        let mut slot = self.slot();
        let displaced = slot.replace(frame);
        if self.dirty.swap(true, Ordering::AcqRel) {
            self.stats_overwritten.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("published frame replaced an unconsumed one");
        }
        drop(slot);

        self.stats_published.fetch_add(1, Ordering::Relaxed);
        Ok(displaced)
    }

    /// Take the published frame if it has not been consumed yet.
    ///
    /// This method NEVER blocks - it returns immediately.
    pub fn try_consume(&self) -> Option<Arc<Frame>> {
        if !self.dirty.load(Ordering::Acquire) {
            return None;
        }

        let slot = match self.slot.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            // Lock contention - leave the frame dirty for the next tick
            Err(TryLockError::WouldBlock) => return None,
        };

        if !self.dirty.swap(false, Ordering::AcqRel) {
            return None;
        }

        let frame = slot.clone();
        drop(slot);

        if frame.is_some() {
            self.stats_consumed.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Whether an unconsumed frame is waiting.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Refuse all further publication. A frame that is already dirty can
    /// still be consumed once.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            published: self.stats_published.load(Ordering::Relaxed),
            consumed: self.stats_consumed.load(Ordering::Relaxed),
            overwritten: self.stats_overwritten.load(Ordering::Relaxed),
        }
    }
}

/// Shared handle to a frame store.
pub type SharedFrameStore = Arc<FrameStore>;
