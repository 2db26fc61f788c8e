//! Bounded fix queue
//!
//! Circular buffer of unit ids handed from repair agents to the consumer.
//! Two counting semaphores track free and filled slots; a separate lock
//! guards each end's index. Waiting for a slot never happens while an
//! index lock is held, so blocked producers cannot starve each other out
//! of the write position.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::Semaphore;

use super::units::UnitId;

/// Errors returned by the fix queue
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue's semaphores were closed
    #[error("fix queue closed")]
    Closed,
}

// ============================================================================
// Bounded Fix Queue
// ============================================================================

/// Fixed-capacity FIFO of pending fix events
///
/// Safe for any number of concurrent pushers. `pop` is intended for a single
/// consumer but stays correct with several.
#[derive(Debug)]
pub struct BoundedFixQueue {
    slots: Box<[AtomicU64]>,
    /// Permits for empty slots, starts at capacity
    free: Semaphore,
    /// Permits for written slots, starts at zero
    filled: Semaphore,
    /// Next write position
    tail: Mutex<usize>,
    /// Next read position
    head: Mutex<usize>,
}

impl BoundedFixQueue {
    /// Create an empty queue. `capacity` must be non-zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            free: Semaphore::new(capacity),
            filled: Semaphore::new(0),
            tail: Mutex::new(0),
            head: Mutex::new(0),
        }
    }

    /// Maximum number of queued entries
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of entries ready to pop
    pub fn len(&self) -> usize {
        self.filled.available_permits()
    }

    /// Whether no entry is ready to pop
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `unit`, waiting until a slot is free.
    ///
    /// Cancel-safe: dropping the future before it completes leaves the queue
    /// untouched.
    pub async fn push(&self, unit: UnitId) -> Result<(), QueueError> {
        self.free
            .acquire()
            .await
            .map_err(|_| QueueError::Closed)?
            .forget();
        self.write_slot(unit);
        Ok(())
    }

    /// Remove the oldest entry, waiting until one exists.
    ///
    /// Cancel-safe in the same way as [`push`](Self::push).
    pub async fn pop(&self) -> Result<UnitId, QueueError> {
        self.filled
            .acquire()
            .await
            .map_err(|_| QueueError::Closed)?
            .forget();
        Ok(self.read_slot())
    }

    // Slots are written in index order under the tail lock, so once `n`
    // filled permits exist the first `n` unread slots are all written.
    fn write_slot(&self, unit: UnitId) {
        let mut tail = lock_index(&self.tail);
        self.slots[*tail].store(unit, Ordering::Release);
        *tail = (*tail + 1) % self.slots.len();
        drop(tail);
        self.filled.add_permits(1);
    }

    fn read_slot(&self) -> UnitId {
        let mut head = lock_index(&self.head);
        let unit = self.slots[*head].load(Ordering::Acquire);
        *head = (*head + 1) % self.slots.len();
        drop(head);
        self.free.add_permits(1);
        unit
    }
}

fn lock_index(index: &Mutex<usize>) -> MutexGuard<'_, usize> {
    index.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Tests
// ============================================================================
