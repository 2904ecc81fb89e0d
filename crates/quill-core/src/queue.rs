//! Bounded ingestion queue between producers and the processor thread.
//!
//! Producers on any thread push without blocking; a full queue drops the
//! record and counts it. The single consumer waits on either new records or
//! the stop signal with a bounded timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};
use serde::Serialize;

use crate::error::{LogError, Result};
use crate::types::LogRecord;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Snapshot of queue and processor counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    /// Maximum queued records.
    pub capacity: usize,
    /// Records currently queued.
    pub depth: usize,
    /// Records accepted into the queue.
    pub enqueued: u64,
    /// Records taken off the queue.
    pub dequeued: u64,
    /// Records dropped because the queue was full.
    pub dropped: u64,
    /// Records refused by admission control.
    pub rejected: u64,
    /// Records handled by the processor.
    pub processed: u64,
    /// Batches handled by the processor.
    pub batches: u64,
    /// Total processing time in microseconds.
    pub process_time_us: u64,
    /// `depth / capacity` as a percentage.
    pub utilization_percent: f64,
    /// Depth is below the health threshold.
    pub healthy: bool,
}

/// Multi-producer, single-consumer record queue.
#[derive(Debug)]
pub struct IngestionQueue {
    sender: Sender<LogRecord>,
    receiver: Receiver<LogRecord>,
    capacity: usize,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
    processed: AtomicU64,
    batches: AtomicU64,
    process_time_us: AtomicU64,
}

impl Default for IngestionQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl IngestionQueue {
    /// Creates a queue holding at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            process_time_us: AtomicU64::new(0),
        }
    }

    /// Pushes a record without blocking. Returns false if it was dropped.
    pub fn push(&self, record: LogRecord) -> bool {
        self.try_push(record).is_ok()
    }

    /// Like [`push`](Self::push), reporting a drop as
    /// [`LogError::QueueFull`].
    pub fn try_push(&self, record: LogRecord) -> Result<()> {
        match self.sender.try_send(record) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.note_dropped();
                Err(LogError::QueueFull {
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Counts a record dropped before it reached the queue.
    pub fn note_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a record refused by admission control.
    pub fn note_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a processed batch.
    pub fn note_batch(&self, records: usize, elapsed: Duration) {
        self.processed.fetch_add(records as u64, Ordering::Relaxed);
        self.batches.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.process_time_us.fetch_add(micros, Ordering::Relaxed);
    }

    /// Waits up to `wait` for records, then moves up to `max` into `batch`.
    ///
    /// Returns false once `stop` is signalled (sender dropped or a unit
    /// sent); `batch` is left untouched in that case.
    pub fn wait_batch(
        &self,
        batch: &mut Vec<LogRecord>,
        max: usize,
        wait: Duration,
        stop: &Receiver<()>,
    ) -> bool {
        select! {
            recv(self.receiver) -> msg => {
                if let Ok(record) = msg {
                    self.dequeued.fetch_add(1, Ordering::Relaxed);
                    batch.push(record);
                }
            }
            recv(stop) -> _ => return false,
            default(wait) => return true,
        }
        self.drain_into(batch, max.saturating_sub(batch.len()));
        true
    }

    /// Moves up to `max` queued records into `batch` without blocking.
    pub fn drain_into(&self, batch: &mut Vec<LogRecord>, max: usize) -> usize {
        let before = batch.len();
        batch.extend(self.receiver.try_iter().take(max));
        let taken = batch.len() - before;
        self.dequeued.fetch_add(taken as u64, Ordering::Relaxed);
        taken
    }

    /// Records currently queued.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Maximum queued records.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Records accepted so far.
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Records handled by the processor so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Counter snapshot; healthy while depth stays under
    /// `health_threshold * capacity`.
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self, health_threshold: f64) -> QueueStats {
        let depth = self.len();
        let utilization = depth as f64 / self.capacity as f64;
        QueueStats {
            capacity: self.capacity,
            depth,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            process_time_us: self.process_time_us.load(Ordering::Relaxed),
            utilization_percent: utilization * 100.0,
            healthy: utilization < health_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;
    use std::sync::Arc;
    use std::thread;

    fn record(message: &str) -> LogRecord {
        LogRecord::new("Gameplay", Severity::Info, message)
    }

    // ===== Capacity =====

    #[test]
    fn full_queue_drops() {
        let queue = IngestionQueue::new(100);
        let accepted = (0..150).filter(|i| queue.push(record(&i.to_string()))).count();

        assert_eq!(accepted, 100);
        assert_eq!(queue.dropped(), 50);
        assert_eq!(queue.len(), 100);

        let stats = queue.stats(0.8);
        assert_eq!(stats.enqueued, 100);
        assert_eq!(stats.dropped, 50);
        assert!(!stats.healthy);
        assert!((stats.utilization_percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn try_push_reports_capacity() {
        let queue = IngestionQueue::new(1);
        queue.try_push(record("a")).unwrap();
        let err = queue.try_push(record("b")).unwrap_err();
        assert!(matches!(err, LogError::QueueFull { capacity: 1 }));
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let queue = IngestionQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.push(record("a")));
        assert!(!queue.push(record("b")));
    }

    // ===== Draining =====

    #[test]
    fn drain_preserves_order() {
        let queue = IngestionQueue::new(16);
        for i in 0..10 {
            queue.push(record(&i.to_string()));
        }
        let mut batch = Vec::new();
        assert_eq!(queue.drain_into(&mut batch, 4), 4);
        assert_eq!(queue.drain_into(&mut batch, 100), 6);
        let messages: Vec<_> = batch.iter().map(LogRecord::message).collect();
        assert_eq!(messages, ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]);
        assert!(queue.is_empty());
        assert_eq!(queue.stats(0.8).dequeued, 10);
    }

    #[test]
    fn wait_batch_caps_at_max() {
        let queue = IngestionQueue::new(16);
        for i in 0..10 {
            queue.push(record(&i.to_string()));
        }
        let (_stop_tx, stop_rx) = bounded::<()>(1);
        let mut batch = Vec::new();
        assert!(queue.wait_batch(&mut batch, 3, Duration::from_millis(10), &stop_rx));
        assert_eq!(batch.len(), 3);
        assert_eq!(queue.len(), 7);
    }

    #[test]
    fn wait_batch_times_out_when_idle() {
        let queue = IngestionQueue::new(4);
        let (_stop_tx, stop_rx) = bounded::<()>(1);
        let mut batch = Vec::new();
        assert!(queue.wait_batch(&mut batch, 8, Duration::from_millis(5), &stop_rx));
        assert!(batch.is_empty());
    }

    #[test]
    fn wait_batch_observes_stop() {
        let queue = IngestionQueue::new(4);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        drop(stop_tx);
        let mut batch = Vec::new();
        assert!(!queue.wait_batch(&mut batch, 8, Duration::from_secs(5), &stop_rx));
    }

    // ===== Concurrency =====

    #[test]
    fn concurrent_producers() {
        let queue = Arc::new(IngestionQueue::new(10_000));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..500 {
                        queue.push(record(&format!("{t}-{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.enqueued(), 2000);
        assert_eq!(queue.len(), 2000);
    }

    #[test]
    fn batch_counters() {
        let queue = IngestionQueue::new(4);
        queue.note_batch(3, Duration::from_micros(40));
        queue.note_batch(2, Duration::from_micros(60));
        queue.note_rejected();
        let stats = queue.stats(0.8);
        assert_eq!(stats.processed, 5);
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.process_time_us, 100);
        assert_eq!(stats.rejected, 1);
        assert!(stats.healthy);
    }
}
