//! Point-in-time health snapshots of a running pipeline.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::budget::MemoryStats;
use crate::queue::QueueStats;
use crate::writer::WriterStats;

/// Rotation and retention counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotationStats {
    /// Rotations performed.
    pub total_rotations: u64,
    /// Files deleted by retention sweeps and the per-day cap.
    pub files_deleted: u64,
    /// Bytes reclaimed by those deletions.
    pub bytes_freed: u64,
    /// When the last retention sweep ran.
    pub last_cleanup: Option<DateTime<Local>>,
    /// Files currently receiving writes.
    pub active_files: usize,
    /// Bytes of log files in the log directory.
    pub disk_usage: u64,
}

/// Full pipeline snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Ingestion queue and processor.
    pub queue: QueueStats,
    /// Memory budget.
    pub memory: MemoryStats,
    /// File writer; `None` when file logging is off or degraded.
    pub writer: Option<WriterStats>,
    /// Rotation and retention.
    pub rotation: RotationStats,
    /// Registered channels.
    pub channels: usize,
    /// Processor is running and queue and memory are healthy.
    pub healthy: bool,
}

impl Diagnostics {
    /// One-line summary for log output.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "queue {}/{} (dropped {}), memory {:.1}% ({:?}), {} channels, {}",
            self.queue.depth,
            self.queue.capacity,
            self.queue.dropped,
            self.memory.usage_percent,
            self.memory.health,
            self.channels,
            if self.healthy { "healthy" } else { "unhealthy" },
        )
    }
}
