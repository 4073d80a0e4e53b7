// src/ring_buffer.rs
//! Bounded error queue with FIFO eviction.
//!
//! The handler keeps the most recent errors for diagnostics and statistics.
//! Memory stays fixed no matter how many errors arrive: once the buffer is
//! full, each insertion evicts exactly the oldest entry.
//!
//! # Design Principles
//!
//! - **Bounded memory**: fixed slot array allocated once, never grown
//! - **FIFO eviction**: oldest entry dropped first
//! - **RwLock-based**: concurrent readers, exclusive writers
//! - **Poison-tolerant**: a panic while holding the lock never disables the queue
//!
//! # Example
//!
//! ```rust
//! use quotefast_errors::{AppError, ErrorContext, ErrorQueue, QueueEntry, Severity};
//!
//! let queue = ErrorQueue::new(2);
//! for n in 0..3 {
//!     let err = AppError::builder(format!("error {n}")).build();
//!     queue.push(QueueEntry::new(err, ErrorContext::new(), Severity::Low));
//! }
//!
//! assert_eq!(queue.len(), 2);
//! assert_eq!(queue.eviction_count(), 1);
//! assert_eq!(queue.snapshot()[0].error.message(), "error 1");
//! ```

use crate::{ErrorContext, HandledError, Severity};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One handled error as recorded by the handler.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    /// The error as it was handled.
    pub error: HandledError,
    /// Context after enrichment.
    pub context: ErrorContext,
    /// Severity asserted by the caller.
    pub severity: Severity,
}

impl QueueEntry {
    /// Bundle an entry.
    #[inline]
    pub fn new(error: impl Into<HandledError>, context: ErrorContext, severity: Severity) -> Self {
        Self {
            error: error.into(),
            context,
            severity,
        }
    }
}

/// Fixed-size ring with exact allocation.
struct RingBuffer {
    entries: Box<[Option<QueueEntry>]>,
    /// Next write slot.
    tail: usize,
    /// Oldest live slot.
    head: usize,
    len: usize,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            entries: std::iter::repeat_with(|| None)
                .take(capacity)
                .collect::<Box<[Option<QueueEntry>]>>(),
            tail: 0,
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, entry: QueueEntry) -> Option<QueueEntry> {
        let evicted = self.entries[self.tail].replace(entry);
        self.tail = (self.tail + 1) % self.entries.len();

        if self.len < self.entries.len() {
            self.len += 1;
        } else {
            self.head = (self.head + 1) % self.entries.len();
        }

        evicted
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    /// Oldest first.
    fn iter(&self) -> impl DoubleEndedIterator<Item = &QueueEntry> {
        let head = self.head;
        let cap = self.entries.len();

        (0..self.len).filter_map(move |i| self.entries[(head + i) % cap].as_ref())
    }

    fn clear(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = None;
        }
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }
}

/// Shared, bounded queue of recent errors.
///
/// Clones share the same buffer.
#[derive(Clone)]
pub struct ErrorQueue {
    buffer: Arc<RwLock<RingBuffer>>,
    capacity: usize,
    eviction_count: Arc<AtomicU64>,
}

impl ErrorQueue {
    /// Queue holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Arc::new(RwLock::new(RingBuffer::new(capacity))),
            capacity,
            eviction_count: Arc::new(AtomicU64::new(0)),
        }
    }

    #[inline]
    fn read_buffer(&self) -> RwLockReadGuard<'_, RingBuffer> {
        match self.buffer.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[inline]
    fn write_buffer(&self) -> RwLockWriteGuard<'_, RingBuffer> {
        match self.buffer.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append an entry, returning the one evicted to make room.
    pub fn push(&self, entry: QueueEntry) -> Option<QueueEntry> {
        let evicted = self.write_buffer().push(entry);
        if evicted.is_some() {
            self.eviction_count.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    /// Owned copy of every entry, oldest first.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.read_buffer().iter().cloned().collect()
    }

    /// Up to `count` entries, newest first.
    pub fn recent(&self, count: usize) -> Vec<QueueEntry> {
        self.read_buffer().iter().rev().take(count).cloned().collect()
    }

    /// Fold over the live entries under a single read lock.
    ///
    /// Everything `f` sees belongs to the same instant.
    pub fn with_entries<R>(&self, f: impl FnOnce(&mut dyn Iterator<Item = &QueueEntry>) -> R) -> R {
        let buffer = self.read_buffer();
        let mut iter = buffer.iter();
        f(&mut iter)
    }

    /// Current number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.read_buffer().len()
    }

    /// True when no entry is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once the next push will evict.
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Total evictions since creation. Not reset by [`clear`](Self::clear).
    #[inline]
    pub fn eviction_count(&self) -> u64 {
        self.eviction_count.load(Ordering::Relaxed)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.write_buffer().clear();
    }
}

impl std::fmt::Debug for ErrorQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("eviction_count", &self.eviction_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppError, NativeError};

    fn entry(n: usize) -> QueueEntry {
        let err = AppError::builder(format!("error {n}")).build();
        QueueEntry::new(err, ErrorContext::new(), Severity::Medium)
    }

    #[test]
    fn evicts_oldest_first() {
        let queue = ErrorQueue::new(3);

        for i in 0..5 {
            queue.push(entry(i));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.eviction_count(), 2);

        let messages: Vec<_> = queue
            .snapshot()
            .iter()
            .map(|e| e.error.message().to_owned())
            .collect();
        assert_eq!(messages, ["error 2", "error 3", "error 4"]);
    }

    #[test]
    fn push_returns_evicted_entry() {
        let queue = ErrorQueue::new(1);
        assert!(queue.push(entry(0)).is_none());
        let evicted = queue.push(entry(1)).unwrap();
        assert_eq!(evicted.error.message(), "error 0");
    }

    #[test]
    fn recent_is_newest_first() {
        let queue = ErrorQueue::new(10);
        for i in 0..4 {
            queue.push(entry(i));
        }
        let recent = queue.recent(2);
        assert_eq!(recent[0].error.message(), "error 3");
        assert_eq!(recent[1].error.message(), "error 2");
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let queue = ErrorQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(entry(0));
        assert!(queue.is_full());
    }

    #[test]
    fn snapshot_is_detached_from_queue() {
        let queue = ErrorQueue::new(4);
        queue.push(entry(0));
        let mut snapshot = queue.snapshot();
        snapshot.clear();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn clear_keeps_eviction_history() {
        let queue = ErrorQueue::new(1);
        queue.push(entry(0));
        queue.push(entry(1));
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.eviction_count(), 1);

        queue.push(entry(2));
        assert_eq!(queue.snapshot()[0].error.message(), "error 2");
    }

    #[test]
    fn clone_shares_state() {
        let first = ErrorQueue::new(8);
        let second = first.clone();
        first.push(QueueEntry::new(
            NativeError::new("Error", "plain"),
            ErrorContext::new(),
            Severity::Low,
        ));
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn concurrent_pushes_stay_bounded() {
        use std::thread;

        let queue = ErrorQueue::new(64);
        let mut handles = Vec::new();

        for t in 0..8 {
            let queue = queue.clone();
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    queue.push(entry(t * 1000 + j));
                    assert!(queue.len() <= 64);
                }
            }));
        }

        for handle in handles {
            handle.join().expect("thread panicked");
        }

        assert_eq!(queue.len(), 64);
        assert_eq!(queue.eviction_count(), 800 - 64);
    }
}
