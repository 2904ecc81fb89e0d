//! # quill-core
//!
//! Embeddable structured-logging pipeline.
//!
//! This crate provides:
//!
//! - [`Pipeline`] — Owns the components and worker threads; the entry point
//! - [`ChannelRegistry`] — Hierarchical channels with token-bucket admission
//! - [`IngestionQueue`] — Bounded multi-producer queue in front of the processor
//! - [`LogStore`] — Per-channel in-memory storage under a byte budget
//! - [`FileWriter`] — Batched appends on a dedicated writer thread
//! - [`LogRotator`] — Size-based rotation with deterministic file names
//! - [`RetentionManager`] — Deletes files past the retention window
//! - [`QuillConfig`] — TOML configuration with tier presets
//!
//! ## Example
//!
//! ```no_run
//! use quill_core::{Pipeline, QuillConfig, Severity};
//! use std::time::Duration;
//!
//! let pipeline = Pipeline::start(QuillConfig::default())?;
//! pipeline.log("Gameplay", Severity::Info, "match started");
//! pipeline.flush(Duration::from_secs(1));
//!
//! for record in pipeline.entries(Some("Gameplay"), 10) {
//!     println!("{} {}", record.severity(), record.message());
//! }
//! pipeline.shutdown();
//! # Ok::<(), quill_core::LogError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod budget;
pub mod cache;
pub mod channels;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod format;
pub mod pipeline;
mod processor;
pub mod queue;
pub mod registry;
pub mod retention;
pub mod rotation;
pub mod store;
pub mod structured;
pub mod token_bucket;
pub mod types;
pub mod writer;

// Re-export main types
pub use budget::{MemoryHealth, MemoryStats, MemoryTracker, TrimPolicy};
pub use cache::ChannelStateCache;
pub use channels::{
    AGGREGATE_CHANNEL, CHANNELS, ChannelAllowList, ChannelDescriptor, DEFAULT_CHANNEL,
};
pub use config::{ConfigTier, MemoryConfig, QueueConfig, QuillConfig};
pub use diagnostics::{Diagnostics, RotationStats};
pub use error::{LogError, Result};
pub use format::{JsonConfig, JsonFormatter, RESERVED_FIELDS};
pub use pipeline::{Pipeline, SubmitOutcome};
pub use queue::{IngestionQueue, QueueStats};
pub use registry::{ChannelRegistry, ChannelState, EffectiveSettings};
pub use retention::{CleanupReport, ExpiredFile, PeriodicCleanup, RetentionManager};
pub use rotation::{FileNaming, LogFileInfo, LogRotator, RotationConfig};
pub use store::{InsertOutcome, LogStore, TrimReport};
pub use structured::StructuredLog;
pub use token_bucket::TokenBucket;
pub use types::{ChannelConfig, DisplayColor, LogRecord, RateLimit, Severity};
pub use writer::{FileWriter, WriterConfig, WriterStats};
