//! In-memory record storage bounded by entry counts and a byte budget.
//!
//! This module provides:
//! - [`LogStore`] — Per-channel FIFO storage with memory accounting
//! - [`InsertOutcome`] — What happened to an inserted record
//! - [`TrimReport`] — What a trim pass freed
//!
//! Records and the per-channel byte counters share one mutex, so a trim
//! never observes a channel's records and its accounting out of step.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::budget::{MemoryHealth, MemoryStats, MemoryTracker, TrimPolicy};
use crate::channels::ChannelAllowList;
use crate::error::{LogError, Result};
use crate::types::LogRecord;

/// Result of [`LogStore::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was stored; `evicted` older records were dropped to honor
    /// the channel's entry limit.
    Stored {
        /// Records evicted from the same channel.
        evicted: usize,
    },
    /// The channel is not on the allow-list.
    NotAllowed,
    /// The record did not fit even after trimming.
    OverBudget,
}

impl InsertOutcome {
    /// Returns true if the record was stored.
    #[must_use]
    pub const fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

/// What a trim pass freed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrimReport {
    /// Bytes released.
    pub bytes_freed: u64,
    /// Records removed.
    pub entries_removed: usize,
}

#[derive(Debug)]
struct StoreInner {
    channels: HashMap<String, VecDeque<LogRecord>>,
    tracker: MemoryTracker,
    over_budget_reported: bool,
}

/// Thread-safe per-channel record store.
#[derive(Debug)]
pub struct LogStore {
    inner: Mutex<StoreInner>,
    allow_list: ChannelAllowList,
    policy: TrimPolicy,
    pressure_threshold: f64,
    /// Mirror of the tracker total for lock-free reads.
    used_bytes: AtomicU64,
    entry_count: AtomicU64,
    dropped_over_budget: AtomicU64,
    rejected_not_allowed: AtomicU64,
}

impl LogStore {
    /// Creates a store with a byte budget and the built-in allow-list.
    #[must_use]
    pub fn new(budget_bytes: u64) -> Self {
        Self::with_policy(budget_bytes, ChannelAllowList::default(), TrimPolicy::default())
    }

    /// Creates a store with full control over the allow-list and trim policy.
    #[must_use]
    pub fn with_policy(budget_bytes: u64, allow_list: ChannelAllowList, policy: TrimPolicy) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                channels: HashMap::new(),
                tracker: MemoryTracker::new(budget_bytes),
                over_budget_reported: false,
            }),
            allow_list,
            policy,
            pressure_threshold: 0.8,
            used_bytes: AtomicU64::new(0),
            entry_count: AtomicU64::new(0),
            dropped_over_budget: AtomicU64::new(0),
            rejected_not_allowed: AtomicU64::new(0),
        }
    }

    /// Sets the usage ratio above which the store reports memory pressure.
    #[must_use]
    pub const fn with_pressure_threshold(mut self, threshold: f64) -> Self {
        self.pressure_threshold = threshold;
        self
    }

    /// Holds the store lock until the guard drops, stalling every insert.
    #[cfg(test)]
    pub(crate) fn hold(&self) -> impl Sized + '_ {
        self.inner.lock()
    }

    /// Stores a record, keeping at most `max_entries` for its channel.
    ///
    /// If the record would push usage over budget the store trims first; if
    /// it still does not fit the record is dropped.
    #[allow(clippy::significant_drop_tightening)]
    pub fn insert(&self, record: LogRecord, max_entries: usize) -> InsertOutcome {
        if !self.allow_list.is_allowed(record.channel()) {
            self.rejected_not_allowed.fetch_add(1, Ordering::Relaxed);
            warn!(channel = %record.channel(), "record on unknown channel rejected");
            return InsertOutcome::NotAllowed;
        }

        let size = MemoryTracker::record_size(&record);
        let mut inner = self.inner.lock();

        if inner.tracker.would_exceed(size) {
            self.trim_locked(&mut inner);
            if inner.tracker.would_exceed(size) {
                self.dropped_over_budget.fetch_add(1, Ordering::Relaxed);
                if !inner.over_budget_reported {
                    inner.over_budget_reported = true;
                    error!(
                        channel = %record.channel(),
                        size,
                        used = inner.tracker.total_used(),
                        budget = inner.tracker.budget(),
                        "memory budget exceeded after trimming, dropping records"
                    );
                }
                return InsertOutcome::OverBudget;
            }
        }
        inner.over_budget_reported = false;

        let channel = record.channel().to_string();
        inner.tracker.add_usage(&channel, size);

        let StoreInner {
            channels, tracker, ..
        } = &mut *inner;
        let queue = channels.entry(channel.clone()).or_default();
        queue.push_back(record);

        let mut evicted = 0;
        while queue.len() > max_entries {
            let Some(oldest) = queue.pop_front() else {
                break;
            };
            tracker.remove_usage(&channel, MemoryTracker::record_size(&oldest));
            evicted += 1;
        }
        if queue.is_empty() {
            channels.remove(&channel);
        }

        self.sync_counters(&inner);
        InsertOutcome::Stored { evicted }
    }

    /// Like [`insert`](Self::insert), reporting a refused record as an error.
    /// Returns the number of records evicted.
    pub fn try_insert(&self, record: LogRecord, max_entries: usize) -> Result<usize> {
        let channel = record.channel().to_string();
        let needed = MemoryTracker::record_size(&record);
        match self.insert(record, max_entries) {
            InsertOutcome::Stored { evicted } => Ok(evicted),
            InsertOutcome::NotAllowed => Err(LogError::ChannelNotAllowed(channel)),
            InsertOutcome::OverBudget => Err(LogError::BudgetExceeded {
                needed,
                budget: self.inner.lock().tracker.budget(),
            }),
        }
    }

    /// Evicts oldest records, largest channels first, until usage is back
    /// under the trim target.
    pub fn trim_to_budget(&self) -> TrimReport {
        let mut inner = self.inner.lock();
        self.trim_locked(&mut inner)
    }

    fn trim_locked(&self, inner: &mut StoreInner) -> TrimReport {
        let Some(reduction) = self
            .policy
            .reduction_needed(inner.tracker.total_used(), inner.tracker.budget())
        else {
            return TrimReport::default();
        };

        let mut report = TrimReport::default();
        let mut remaining = reduction;

        for (channel, _) in inner.tracker.channels_by_usage() {
            if remaining == 0 {
                break;
            }
            let Some(queue) = inner.channels.get_mut(&channel) else {
                continue;
            };

            while remaining > 0 && !queue.is_empty() {
                let fraction = self
                    .policy
                    .removal_fraction(inner.tracker.channel_usage(&channel), remaining);
                let count = ((queue.len() as f64 * fraction) as usize).clamp(1, queue.len());

                let mut freed = 0;
                for oldest in queue.drain(..count) {
                    freed += MemoryTracker::record_size(&oldest);
                }
                inner.tracker.remove_usage(&channel, freed);
                report.bytes_freed += freed;
                report.entries_removed += count;
                remaining = remaining.saturating_sub(freed);
            }

            if queue.is_empty() {
                inner.channels.remove(&channel);
            }
        }

        if report.entries_removed > 0 {
            inner.tracker.note_trim();
            debug!(
                bytes_freed = report.bytes_freed,
                entries_removed = report.entries_removed,
                used = inner.tracker.total_used(),
                "trimmed store to budget"
            );
        }
        self.sync_counters(inner);
        report
    }

    fn sync_counters(&self, inner: &StoreInner) {
        self.used_bytes
            .store(inner.tracker.total_used(), Ordering::Release);
        let entries: usize = inner.channels.values().map(VecDeque::len).sum();
        self.entry_count.store(entries as u64, Ordering::Release);
    }

    /// Returns up to `max` of the most recent records, oldest first.
    ///
    /// With no channel (or an empty name) every channel is merged and
    /// ordered by timestamp; records of one channel keep insertion order.
    pub fn entries(&self, channel: Option<&str>, max: usize) -> Vec<LogRecord> {
        let inner = self.inner.lock();
        let mut records: Vec<LogRecord> = match channel.filter(|c| !c.is_empty()) {
            Some(name) => inner
                .channels
                .get(name)
                .map(|q| q.iter().cloned().collect())
                .unwrap_or_default(),
            None => {
                let mut names: Vec<_> = inner.channels.keys().collect();
                names.sort();
                let mut all: Vec<LogRecord> = names
                    .into_iter()
                    .filter_map(|n| inner.channels.get(n))
                    .flat_map(|q| q.iter().cloned())
                    .collect();
                all.sort_by_key(LogRecord::timestamp);
                all
            }
        };
        drop(inner);

        let skip = records.len().saturating_sub(max);
        records.drain(..skip);
        records
    }

    /// Number of records held for a channel.
    pub fn channel_len(&self, channel: &str) -> usize {
        self.inner.lock().channels.get(channel).map_or(0, VecDeque::len)
    }

    /// Channels currently holding records, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.lock().channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drops every record of one channel, returning how many were held.
    pub fn clear_channel(&self, channel: &str) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.channels.remove(channel).map_or(0, |q| q.len());
        inner.tracker.clear_channel(channel);
        self.sync_counters(&inner);
        removed
    }

    /// Drops every record.
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock();
        inner.channels.clear();
        inner.tracker.clear();
        self.sync_counters(&inner);
    }

    /// Changes the byte budget. Does not trim by itself.
    pub fn set_budget(&self, budget_bytes: u64) {
        self.inner.lock().tracker.set_budget(budget_bytes);
    }

    /// Bytes in use, without taking the store lock.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Acquire)
    }

    /// Records held, without taking the store lock.
    pub fn len(&self) -> usize {
        self.entry_count.load(Ordering::Acquire) as usize
    }

    /// Returns true if no record is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records rejected because their channel is not allowed.
    pub fn rejected_not_allowed(&self) -> u64 {
        self.rejected_not_allowed.load(Ordering::Relaxed)
    }

    /// Returns true if the per-channel counters sum to the total.
    pub fn accounting_consistent(&self) -> bool {
        let inner = self.inner.lock();
        inner.tracker.per_channel_sum() == inner.tracker.total_used()
    }

    /// Snapshot of memory accounting.
    pub fn memory_stats(&self) -> MemoryStats {
        let inner = self.inner.lock();
        let tracker = &inner.tracker;
        let largest = tracker.channels_by_usage().into_iter().next();
        let usage_percent = tracker.usage_percent();
        MemoryStats {
            budget_bytes: tracker.budget(),
            used_bytes: tracker.total_used(),
            usage_percent,
            entries: inner.channels.values().map(|q| q.len() as u64).sum(),
            trim_events: tracker.trim_events(),
            dropped_over_budget: self.dropped_over_budget.load(Ordering::Relaxed),
            largest_channel_bytes: largest.as_ref().map_or(0, |(_, b)| *b),
            largest_channel: largest.map(|(name, _)| name),
            health: MemoryHealth::from_percent(usage_percent),
            healthy: usage_percent < self.pressure_threshold * 100.0,
        }
    }
}
