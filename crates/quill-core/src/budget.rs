//! Memory budget accounting and the trim policy.
//!
//! [`MemoryTracker`] keeps global and per-channel byte counts. It is owned by
//! the store and only mutated under the store lock, so the per-channel sum
//! always matches the total once an insert or trim has finished.
//!
//! [`TrimPolicy`] holds the constants that decide how far a trim pass cuts
//! and how aggressively each channel is thinned.

use std::collections::HashMap;
use std::mem;

use serde::{Deserialize, Serialize};

use crate::types::LogRecord;

/// Bytes in a mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Tunable constants for [`trim_to_budget`](crate::LogStore::trim_to_budget).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimPolicy {
    /// Usage at or below `budget * (1 - tolerance)` is never trimmed.
    pub tolerance: f64,
    /// Fraction of the budget kept after a normal trim.
    pub target_fraction: f64,
    /// Overage ratio above which `elevated_target` applies.
    pub elevated_ratio: f64,
    /// Fraction kept when over `elevated_ratio`.
    pub elevated_target: f64,
    /// Overage ratio above which `emergency_target` applies.
    pub emergency_ratio: f64,
    /// Fraction kept when over `emergency_ratio`.
    pub emergency_target: f64,
    /// Per-round removal fraction for a channel that can cover little.
    pub base_removal: f64,
    /// Removal fraction when a channel can cover `medium_share` of the need.
    pub medium_removal: f64,
    /// Share of the outstanding reduction that selects `medium_removal`.
    pub medium_share: f64,
    /// Removal fraction when a channel can cover `high_share` of the need.
    pub high_removal: f64,
    /// Share of the outstanding reduction that selects `high_removal`.
    pub high_share: f64,
}

impl Default for TrimPolicy {
    fn default() -> Self {
        Self {
            tolerance: 0.02,
            target_fraction: 0.75,
            elevated_ratio: 1.10,
            elevated_target: 0.60,
            emergency_ratio: 1.20,
            emergency_target: 0.50,
            base_removal: 0.25,
            medium_removal: 0.50,
            medium_share: 0.25,
            high_removal: 0.75,
            high_share: 0.50,
        }
    }
}

impl TrimPolicy {
    /// Fraction of the budget to keep for a given `used / budget` ratio.
    #[must_use]
    pub fn target_for(&self, overage_ratio: f64) -> f64 {
        if overage_ratio > self.emergency_ratio {
            self.emergency_target
        } else if overage_ratio > self.elevated_ratio {
            self.elevated_target
        } else {
            self.target_fraction
        }
    }

    /// Fraction of a channel's entries to drop in one round.
    ///
    /// `channel_bytes` is what the channel holds, `remaining` what the pass
    /// still needs to free.
    #[must_use]
    pub fn removal_fraction(&self, channel_bytes: u64, remaining: u64) -> f64 {
        let channel = channel_bytes as f64;
        let remaining = remaining as f64;
        if channel >= remaining * self.high_share {
            self.high_removal
        } else if channel >= remaining * self.medium_share {
            self.medium_removal
        } else {
            self.base_removal
        }
    }

    /// Bytes a trim pass must free, or `None` when no trim is needed.
    #[must_use]
    pub fn reduction_needed(&self, used: u64, budget: u64) -> Option<u64> {
        if budget == 0 {
            return (used > 0).then_some(used);
        }
        let budget_f = budget as f64;
        let used_f = used as f64;
        if used_f <= budget_f * (1.0 - self.tolerance) {
            return None;
        }
        let target = budget_f * self.target_for(used_f / budget_f);
        let reduction = (used_f - target).ceil();
        (reduction > 0.0).then_some(reduction as u64)
    }
}

/// Coarse memory health bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoryHealth {
    /// Below 75% of budget.
    Healthy,
    /// 75% to 90%.
    Caution,
    /// 90% to 100%.
    Critical,
    /// At or over budget.
    Crisis,
}

impl MemoryHealth {
    /// Classifies a usage percentage.
    #[must_use]
    pub fn from_percent(percent: f64) -> Self {
        if percent < 75.0 {
            Self::Healthy
        } else if percent < 90.0 {
            Self::Caution
        } else if percent < 100.0 {
            Self::Critical
        } else {
            Self::Crisis
        }
    }
}

/// Snapshot of memory accounting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    /// Budget in bytes.
    pub budget_bytes: u64,
    /// Bytes in use.
    pub used_bytes: u64,
    /// `used / budget * 100`.
    pub usage_percent: f64,
    /// Records held.
    pub entries: u64,
    /// Trim passes that freed memory.
    pub trim_events: u64,
    /// Records dropped because they did not fit even after trimming.
    pub dropped_over_budget: u64,
    /// Channel holding the most bytes.
    pub largest_channel: Option<String>,
    /// Bytes held by `largest_channel`.
    pub largest_channel_bytes: u64,
    /// Health band.
    pub health: MemoryHealth,
    /// Usage is below the configured pressure threshold.
    pub healthy: bool,
}

/// Global and per-channel byte accounting.
#[derive(Debug, Clone)]
pub struct MemoryTracker {
    budget: u64,
    total_used: u64,
    per_channel: HashMap<String, u64>,
    trim_events: u64,
}

impl MemoryTracker {
    /// Creates a tracker with a budget in bytes.
    #[must_use]
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            total_used: 0,
            per_channel: HashMap::new(),
            trim_events: 0,
        }
    }

    /// Accounted size of a record: struct overhead plus text lengths.
    #[must_use]
    pub fn record_size(record: &LogRecord) -> u64 {
        (mem::size_of::<LogRecord>() + record.message().len() + record.channel().len()) as u64
    }

    /// Returns true if adding `additional` bytes would exceed the budget.
    #[must_use]
    pub fn would_exceed(&self, additional: u64) -> bool {
        self.total_used.saturating_add(additional) > self.budget
    }

    /// Accounts `bytes` to `channel`.
    pub fn add_usage(&mut self, channel: &str, bytes: u64) {
        *self.per_channel.entry(channel.to_string()).or_insert(0) += bytes;
        self.total_used = self.total_used.saturating_add(bytes);
    }

    /// Releases `bytes` from `channel`. Clamps at zero.
    pub fn remove_usage(&mut self, channel: &str, bytes: u64) {
        let Some(used) = self.per_channel.get_mut(channel) else {
            return;
        };
        let released = bytes.min(*used);
        *used -= released;
        if *used == 0 {
            self.per_channel.remove(channel);
        }
        self.total_used -= released;
    }

    /// Forgets a channel entirely, returning what it held.
    pub fn clear_channel(&mut self, channel: &str) -> u64 {
        let released = self.per_channel.remove(channel).unwrap_or(0);
        self.total_used -= released;
        released
    }

    /// Forgets every channel.
    pub fn clear(&mut self) {
        self.per_channel.clear();
        self.total_used = 0;
    }

    /// Channels ordered by usage, largest first. Ties break by name.
    #[must_use]
    pub fn channels_by_usage(&self) -> Vec<(String, u64)> {
        let mut channels: Vec<_> = self
            .per_channel
            .iter()
            .map(|(name, bytes)| (name.clone(), *bytes))
            .collect();
        channels.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        channels
    }

    /// Records that a trim pass ran.
    pub fn note_trim(&mut self) {
        self.trim_events += 1;
    }

    /// Changes the budget.
    pub fn set_budget(&mut self, budget: u64) {
        self.budget = budget;
    }

    /// Budget in bytes.
    #[must_use]
    pub const fn budget(&self) -> u64 {
        self.budget
    }

    /// Bytes in use.
    #[must_use]
    pub const fn total_used(&self) -> u64 {
        self.total_used
    }

    /// Bytes in use by one channel.
    #[must_use]
    pub fn channel_usage(&self, channel: &str) -> u64 {
        self.per_channel.get(channel).copied().unwrap_or(0)
    }

    /// Sum of all per-channel counters.
    #[must_use]
    pub fn per_channel_sum(&self) -> u64 {
        self.per_channel.values().sum()
    }

    /// Completed trim passes.
    #[must_use]
    pub const fn trim_events(&self) -> u64 {
        self.trim_events
    }

    /// `used / budget * 100`.
    #[must_use]
    pub fn usage_percent(&self) -> f64 {
        if self.budget == 0 {
            return if self.total_used == 0 { 0.0 } else { 100.0 };
        }
        self.total_used as f64 / self.budget as f64 * 100.0
    }
}
