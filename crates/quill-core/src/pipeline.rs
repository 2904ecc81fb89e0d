//! The assembled logging pipeline.
//!
//! [`Pipeline`] owns every component and the worker threads:
//!
//! ```text
//! submit ─▶ registry admission ─▶ ingestion queue ─▶ processor thread
//!                                                     ├─▶ store (memory budget)
//!                                                     └─▶ writer queue ─▶ writer thread ─▶ files
//! ```
//!
//! Components that fail to start leave the pipeline running in a degraded
//! mode: without a writer records are kept in memory only; without a
//! processor every submission is dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{ChannelStateCache, DEFAULT_CACHE_TTL};
use crate::channels::{ChannelAllowList, auto_registered};
use crate::config::QuillConfig;
use crate::diagnostics::{Diagnostics, RotationStats};
use crate::error::{LogError, Result};
use crate::format::JsonFormatter;
use crate::processor::{self, Processor, ProcessorSettings, RecordSink};
use crate::queue::IngestionQueue;
use crate::registry::{ChannelRegistry, ChannelState};
use crate::retention::{CleanupReport, PeriodicCleanup, RetentionManager};
use crate::rotation::LogRotator;
use crate::store::{LogStore, TrimReport};
use crate::structured::StructuredLog;
use crate::types::{ChannelConfig, LogRecord, Severity};
use crate::writer::FileWriter;

/// Default sampling interval for [`Pipeline::log_sampled`].
pub const DEFAULT_SAMPLE_EVERY: u32 = 100;

/// What happened to a submitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Queued for processing.
    Accepted,
    /// Refused by admission control (disabled, below severity, rate
    /// limited or unknown channel).
    Rejected,
    /// Admitted but dropped because the queue was full or the processor is
    /// not running.
    Dropped,
}

impl SubmitOutcome {
    /// Returns true if the record was queued.
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// A running logging pipeline.
#[derive(Debug)]
pub struct Pipeline {
    config: QuillConfig,
    log_dir: PathBuf,
    allow_list: ChannelAllowList,
    registry: Arc<ChannelRegistry>,
    cache: ChannelStateCache,
    store: Arc<LogStore>,
    queue: Arc<IngestionQueue>,
    rotator: Arc<LogRotator>,
    retention: Arc<RetentionManager>,
    writer: Option<Arc<FileWriter>>,
    processor: Option<Processor>,
    cleanup: Mutex<Option<PeriodicCleanup>>,
    samples: Mutex<HashMap<String, u32>>,
}

impl Pipeline {
    /// Validates `config`, runs startup cleanup and starts the worker
    /// threads.
    ///
    /// Only configuration errors fail startup; a writer or processor that
    /// cannot start is logged and leaves the pipeline degraded.
    pub fn start(config: QuillConfig) -> Result<Self> {
        config.validate()?;
        let log_dir = config.log_dir();

        let rotator = Arc::new(LogRotator::new(config.rotation.clone(), &config.file_prefix)?);
        let retention = Arc::new(RetentionManager::new(Arc::clone(&rotator)));
        if config.file_logging && config.rotation.auto_cleanup_on_startup && log_dir.is_dir() {
            let report = retention.perform_cleanup(&log_dir);
            debug!(
                files_deleted = report.files_deleted,
                skipped = report.skipped,
                "startup cleanup finished"
            );
        }

        let registry = Arc::new(ChannelRegistry::new(config.default_channel.clone()));
        if config.auto_register_channels {
            for descriptor in auto_registered() {
                let channel_config = config
                    .channels
                    .get(descriptor.name)
                    .unwrap_or(&config.default_channel);
                registry.register(descriptor.name, channel_config.clone())?;
            }
        }
        for (name, channel_config) in &config.channels {
            registry.register(name, channel_config.clone())?;
        }

        let allow_list = config.allow_list();
        let store = Arc::new(
            LogStore::with_policy(
                config.memory.budget_bytes(),
                allow_list.clone(),
                config.memory.trim,
            )
            .with_pressure_threshold(config.memory.pressure_threshold),
        );
        let queue = Arc::new(IngestionQueue::new(config.queue.capacity));

        let writer = if config.file_logging {
            match FileWriter::start(&log_dir, &config.writer) {
                Ok(writer) => Some(Arc::new(writer)),
                Err(e) => {
                    warn!(dir = %log_dir.display(), error = %e, "file logging disabled");
                    None
                }
            }
        } else {
            None
        };

        let sink = Arc::new(RecordSink {
            registry: Arc::clone(&registry),
            store: Arc::clone(&store),
            rotator: Arc::clone(&rotator),
            writer: writer.clone(),
            formatter: JsonFormatter::new(config.json.clone()),
            log_dir: log_dir.clone(),
        });
        let settings = ProcessorSettings {
            batch_size: config.queue.batch_size,
            idle_wait: Duration::from_millis(config.queue.idle_wait_ms),
        };
        let processor = match Processor::spawn(Arc::clone(&queue), sink, settings) {
            Ok(processor) => Some(processor),
            Err(e) => {
                warn!(error = %e, "record processing disabled");
                None
            }
        };

        let cleanup = if writer.is_some() {
            retention
                .schedule_periodic_cleanup(log_dir.clone())
                .unwrap_or_else(|e| {
                    warn!(error = %e, "periodic log cleanup disabled");
                    None
                })
        } else {
            None
        };

        info!(
            tier = %config.tier,
            dir = %log_dir.display(),
            channels = registry.len(),
            file_logging = writer.is_some(),
            "logging pipeline started"
        );

        Ok(Self {
            cache: ChannelStateCache::new(Arc::clone(&registry), DEFAULT_CACHE_TTL),
            config,
            log_dir,
            allow_list,
            registry,
            store,
            queue,
            rotator,
            retention,
            writer,
            processor,
            cleanup: Mutex::new(cleanup),
            samples: Mutex::new(HashMap::new()),
        })
    }

    // ----- Logging -----

    /// Runs admission control and queues the record. Never blocks.
    pub fn submit(&self, record: LogRecord) -> SubmitOutcome {
        if !self.registry.can_log(record.channel(), record.severity()) {
            self.queue.note_rejected();
            return SubmitOutcome::Rejected;
        }
        if !self.processor.as_ref().is_some_and(Processor::is_running) {
            self.queue.note_dropped();
            return SubmitOutcome::Dropped;
        }
        if self.queue.push(record) {
            SubmitOutcome::Accepted
        } else {
            SubmitOutcome::Dropped
        }
    }

    /// Submits a record stamped with the current time and thread.
    pub fn log(&self, channel: &str, severity: Severity, message: impl Into<String>) -> SubmitOutcome {
        self.submit(LogRecord::new(channel, severity, message))
    }

    /// Submits every `every`th call per channel (`0` means
    /// [`DEFAULT_SAMPLE_EVERY`]). Returns `None` for skipped calls.
    ///
    /// Calls the channel would reject anyway are not counted.
    pub fn log_sampled(
        &self,
        channel: &str,
        severity: Severity,
        message: impl Into<String>,
        every: u32,
    ) -> Option<SubmitOutcome> {
        if !self.cache.admits(channel, severity) {
            return None;
        }
        let every = if every == 0 { DEFAULT_SAMPLE_EVERY } else { every };
        let due = {
            let mut samples = self.samples.lock();
            let count = samples.entry(channel.to_string()).or_insert(0);
            *count += 1;
            if *count >= every {
                *count = 0;
                true
            } else {
                false
            }
        };
        due.then(|| self.log(channel, severity, message))
    }

    /// Starts a structured record; see [`StructuredLog`].
    pub fn structured(&self, channel: &str, severity: Severity) -> StructuredLog<'_> {
        StructuredLog::new(self, channel, severity)
    }

    /// Cheap check whether a record would pass the channel's enabled and
    /// severity filters. Rate limits are not consulted.
    pub fn is_enabled(&self, channel: &str, severity: Severity) -> bool {
        self.cache.admits(channel, severity)
    }

    // ----- Channels -----

    /// Registers or reconfigures a channel.
    pub fn register_channel(&self, name: &str, config: ChannelConfig) -> Result<()> {
        if !self.allow_list.is_allowed(name) {
            return Err(LogError::ChannelNotAllowed(name.to_string()));
        }
        self.registry.register(name, config)
    }

    /// Removes a channel; its children move to its parent.
    pub fn unregister_channel(&self, name: &str) -> Result<()> {
        self.registry.unregister(name)
    }

    /// Replaces a channel's config.
    pub fn update_channel(&self, name: &str, config: ChannelConfig) -> Result<()> {
        self.registry.update_config(name, config)
    }

    /// Enables or disables a channel, optionally its whole subtree.
    pub fn set_channel_enabled(&self, name: &str, enabled: bool, recursive: bool) -> Result<()> {
        self.registry.set_enabled(name, enabled, recursive)
    }

    /// Sets a channel's minimum severity, optionally for its whole subtree.
    pub fn set_channel_min_severity(
        &self,
        name: &str,
        severity: Severity,
        recursive: bool,
    ) -> Result<()> {
        self.registry.set_min_severity(name, severity, recursive)
    }

    /// Snapshot of one channel.
    pub fn channel_state(&self, name: &str) -> Option<ChannelState> {
        self.registry.get_state(name)
    }

    /// Registered channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        self.registry.channels()
    }

    /// The channel registry.
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    // ----- Stored records -----

    /// The last `max` stored records of `channel`, oldest first. `None` or
    /// an empty name returns records of every channel by timestamp.
    pub fn entries(&self, channel: Option<&str>, max: usize) -> Vec<LogRecord> {
        self.store.entries(channel, max)
    }

    /// Drops the stored records of one channel. Returns how many.
    pub fn clear_channel(&self, channel: &str) -> usize {
        self.store.clear_channel(channel)
    }

    /// Drops every stored record.
    pub fn clear_all(&self) {
        self.store.clear_all();
    }

    /// Evicts records until memory usage is back under the trim target.
    pub fn trim_to_budget(&self) -> TrimReport {
        self.store.trim_to_budget()
    }

    // ----- Files -----

    /// Rotates a channel's active file now and returns the new path.
    pub fn force_rotate(&self, channel: &str) -> Result<PathBuf> {
        if !self.registry.contains(channel) {
            return Err(LogError::ChannelNotFound(channel.to_string()));
        }
        let current = self.rotator.active_file_path(channel, &self.log_dir);
        let next = self.rotator.rotate(channel, &current);
        processor::retire_evicted(&self.rotator, self.writer.as_deref());
        Ok(next)
    }

    /// Runs a retention sweep of the log directory now.
    pub fn force_cleanup(&self) -> CleanupReport {
        self.retention.perform_cleanup(&self.log_dir)
    }

    /// Bytes of log files in the log directory.
    pub fn disk_usage(&self) -> u64 {
        self.retention.disk_usage(&self.log_dir)
    }

    /// Directory log files are written under.
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// The configuration the pipeline was started with.
    pub const fn config(&self) -> &QuillConfig {
        &self.config
    }

    // ----- Lifecycle -----

    /// Waits until every accepted record has been processed and written,
    /// then flushes open files. Returns false on timeout.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let settled = || {
            let processed = self.queue.is_empty() && self.queue.processed() >= self.queue.enqueued();
            let written = self.writer.as_ref().is_none_or(|writer| {
                let stats = writer.stats();
                stats.writes + stats.failed_writes >= stats.enqueued
                    && writer.pending_retirements() == 0
            });
            processed && written
        };

        while !settled() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        if let Some(writer) = &self.writer {
            writer.flush();
        }
        true
    }

    /// Snapshot of every component's counters.
    pub fn diagnostics(&self) -> Diagnostics {
        let queue = self.queue.stats(self.config.queue.health_threshold);
        let memory = self.store.memory_stats();
        let rotation = RotationStats {
            total_rotations: self.rotator.total_rotations(),
            files_deleted: self.rotator.files_deleted() + self.retention.files_deleted(),
            bytes_freed: self.rotator.bytes_freed() + self.retention.bytes_freed(),
            last_cleanup: self.retention.last_cleanup(),
            active_files: self.rotator.active_files(),
            disk_usage: self.disk_usage(),
        };
        let running = self.processor.as_ref().is_some_and(Processor::is_running);
        Diagnostics {
            healthy: running && queue.healthy && memory.healthy,
            queue,
            memory,
            writer: self.writer.as_ref().map(|writer| writer.stats()),
            rotation,
            channels: self.registry.len(),
        }
    }

    /// Stops the cleanup timer, drains the processor and the writer, and
    /// closes every file. Later submissions are dropped.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        let cleanup = self.cleanup.lock().take();
        if let Some(mut cleanup) = cleanup {
            cleanup.stop();
        }
        let was_running = self.processor.as_ref().is_some_and(Processor::is_running);
        if let Some(processor) = &self.processor {
            processor.stop();
        }
        if let Some(writer) = &self.writer {
            writer.stop();
        }
        if was_running {
            info!(
                processed = self.queue.processed(),
                dropped = self.queue.dropped(),
                "logging pipeline stopped"
            );
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
