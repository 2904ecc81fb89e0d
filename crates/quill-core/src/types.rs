//! Core types for the logging pipeline.
//!
//! This module provides:
//! - [`Severity`] — Severity levels for records
//! - [`LogRecord`] — An immutable log record
//! - [`DisplayColor`] — Display hint carried by a channel
//! - [`RateLimit`] — Token-bucket parameters
//! - [`ChannelConfig`] — Operator-authored channel settings

use std::cell::Cell;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Record severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// General information.
    #[default]
    Info = 0,
    /// Something unexpected that does not stop the caller.
    Warning = 1,
    /// A failed operation.
    Error = 2,
    /// A failure that needs immediate attention.
    Critical = 3,
}

impl Severity {
    /// All severities, least severe first.
    pub const ALL: [Self; 4] = [Self::Info, Self::Warning, Self::Error, Self::Critical];

    /// Returns true if this severity is at least as severe as `other`.
    #[must_use]
    pub fn is_at_least(self, other: Self) -> bool {
        self >= other
    }

    /// Returns the level string used in JSON lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" | "message" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" | "fatal" => Ok(Self::Critical),
            other => Err(LogError::ConfigInvalid(format!("unknown severity: {other}"))),
        }
    }
}

static NEXT_THREAD_TAG: AtomicU32 = AtomicU32::new(1);

thread_local! {
    static THREAD_TAG: Cell<u32> = const { Cell::new(0) };
}

/// Returns a small, process-unique number for the calling thread.
///
/// Tags are handed out on first use, starting at 1.
pub fn current_thread_tag() -> u32 {
    THREAD_TAG.with(|tag| {
        let current = tag.get();
        if current != 0 {
            return current;
        }
        let assigned = NEXT_THREAD_TAG.fetch_add(1, Ordering::Relaxed);
        tag.set(assigned);
        assigned
    })
}

/// An immutable log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    message: String,
    channel: String,
    severity: Severity,
    timestamp: DateTime<Local>,
    thread_id: u32,
}

impl LogRecord {
    /// Creates a record stamped with the current time and calling thread.
    pub fn new(channel: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            channel: channel.into(),
            severity,
            timestamp: Local::now(),
            thread_id: current_thread_tag(),
        }
    }

    /// Replaces the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Replaces the producing thread id.
    #[must_use]
    pub const fn with_thread_id(mut self, thread_id: u32) -> Self {
        self.thread_id = thread_id;
        self
    }

    /// The message text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// When the record was created.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// Tag of the producing thread.
    #[must_use]
    pub const fn thread_id(&self) -> u32 {
        self.thread_id
    }
}

/// Display hint attached to a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayColor {
    /// Neutral; treated as "unset" for inheritance.
    #[default]
    White,
    /// Red.
    Red,
    /// Green.
    Green,
    /// Blue.
    Blue,
    /// Yellow.
    Yellow,
    /// Cyan.
    Cyan,
    /// Magenta.
    Magenta,
    /// Orange.
    Orange,
    /// Gray.
    Gray,
}

/// Token-bucket parameters for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    /// Sustained refill rate. Zero means "unset, inherit from parent".
    pub tokens_per_second: f64,
    /// Maximum tokens held. Zero means "same as `tokens_per_second`".
    pub burst_capacity: f64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            tokens_per_second: 20.0,
            burst_capacity: 20.0,
        }
    }
}

impl RateLimit {
    /// Creates a rate limit.
    #[must_use]
    pub const fn new(tokens_per_second: f64, burst_capacity: f64) -> Self {
        Self {
            tokens_per_second,
            burst_capacity,
        }
    }

    /// Burst capacity, falling back to the refill rate when unset.
    #[must_use]
    pub fn effective_burst(&self) -> f64 {
        if self.burst_capacity > 0.0 {
            self.burst_capacity
        } else {
            self.tokens_per_second
        }
    }

    /// Returns true when no rate has been configured.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.tokens_per_second <= 0.0
    }
}

/// Operator-authored settings for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Whether the channel accepts records.
    pub enabled: bool,
    /// Records below this severity are rejected.
    pub min_severity: Severity,
    /// Display hint.
    pub color: DisplayColor,
    /// Admission rate limit.
    pub rate_limit: RateLimit,
    /// Maximum records retained in memory for the channel.
    pub max_entries: usize,
    /// Resolve effective settings against the parent channel.
    pub inherit_from_parent: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_severity: Severity::Info,
            color: DisplayColor::White,
            rate_limit: RateLimit::default(),
            max_entries: 1000,
            inherit_from_parent: true,
        }
    }
}

impl ChannelConfig {
    /// Sets whether the channel is enabled.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the minimum severity.
    #[must_use]
    pub const fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    /// Sets the display color.
    #[must_use]
    pub const fn with_color(mut self, color: DisplayColor) -> Self {
        self.color = color;
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub const fn with_rate_limit(mut self, tokens_per_second: f64, burst_capacity: f64) -> Self {
        self.rate_limit = RateLimit::new(tokens_per_second, burst_capacity);
        self
    }

    /// Sets the retained entry limit.
    #[must_use]
    pub const fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Sets parent inheritance.
    #[must_use]
    pub const fn with_inherit(mut self, inherit: bool) -> Self {
        self.inherit_from_parent = inherit;
        self
    }
}
