//! Pipeline configuration.
//!
//! Configuration is TOML. The `tier` key picks a preset whose values fill
//! every key the file leaves out:
//!
//! ```toml
//! tier = "production"
//! log_directory = "/var/log/game"
//!
//! [memory]
//! budget_mb = 40
//!
//! [channels."Gameplay.Combat"]
//! min_severity = "warning"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::budget::{MIB, TrimPolicy};
use crate::channels::{ChannelAllowList, HIERARCHY_SEPARATOR};
use crate::error::{LogError, Result};
use crate::format::{JsonConfig, RESERVED_FIELDS};
use crate::rotation::RotationConfig;
use crate::types::{ChannelConfig, Severity};
use crate::writer::WriterConfig;

/// Default directory for log files.
pub const DEFAULT_LOG_DIRECTORY: &str = "logs";

/// Default file name prefix.
pub const DEFAULT_FILE_PREFIX: &str = "quill";

/// Preset bundles of settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigTier {
    /// Small queues and budgets, warnings and above, short retention.
    Production,
    /// Balanced defaults.
    #[default]
    Development,
    /// Large buffers, pretty JSON, long retention.
    Debug,
}

impl ConfigTier {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigTier {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            "debug" => Ok(Self::Debug),
            other => Err(LogError::ConfigInvalid(format!("unknown tier: {other}"))),
        }
    }
}

/// Ingestion queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum queued records.
    pub capacity: usize,
    /// Records processed per batch.
    pub batch_size: usize,
    /// Milliseconds the processor waits for work when idle.
    pub idle_wait_ms: u64,
    /// Queue is healthy below this fill ratio.
    pub health_threshold: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            batch_size: 64,
            idle_wait_ms: 100,
            health_threshold: 0.8,
        }
    }
}

/// Memory budget settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Budget for stored records, in MiB.
    pub budget_mb: u64,
    /// Usage ratio above which memory is reported as under pressure.
    pub pressure_threshold: f64,
    /// Trim policy constants.
    pub trim: TrimPolicy,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            budget_mb: 50,
            pressure_threshold: 0.8,
            trim: TrimPolicy::default(),
        }
    }
}

impl MemoryConfig {
    /// Budget in bytes.
    #[must_use]
    pub const fn budget_bytes(&self) -> u64 {
        self.budget_mb.saturating_mul(MIB)
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuillConfig {
    /// Preset the file's omitted values come from.
    pub tier: ConfigTier,
    /// Directory for log files; `logs` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_directory: Option<PathBuf>,
    /// File name prefix.
    pub file_prefix: String,
    /// Persist records to files.
    pub file_logging: bool,
    /// Register the built-in channel table on start.
    pub auto_register_channels: bool,
    /// Additional top-level channel names to accept.
    pub extra_channels: Vec<String>,
    /// Ingestion queue.
    pub queue: QueueConfig,
    /// Memory budget.
    pub memory: MemoryConfig,
    /// File writer.
    pub writer: WriterConfig,
    /// Rotation and retention.
    pub rotation: RotationConfig,
    /// JSON line shape.
    pub json: JsonConfig,
    /// Config for channels without an explicit entry.
    pub default_channel: ChannelConfig,
    /// Per-channel overrides.
    pub channels: BTreeMap<String, ChannelConfig>,
}

impl Default for QuillConfig {
    fn default() -> Self {
        Self::for_tier(ConfigTier::Development)
    }
}

impl QuillConfig {
    /// Preset configuration for a tier.
    #[must_use]
    pub fn for_tier(tier: ConfigTier) -> Self {
        let base = Self {
            tier,
            log_directory: None,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            file_logging: true,
            auto_register_channels: true,
            extra_channels: Vec::new(),
            queue: QueueConfig::default(),
            memory: MemoryConfig::default(),
            writer: WriterConfig::default(),
            rotation: RotationConfig::default(),
            json: JsonConfig::default(),
            default_channel: ChannelConfig::default(),
            channels: BTreeMap::new(),
        };

        match tier {
            ConfigTier::Development => base,
            ConfigTier::Production => Self {
                queue: QueueConfig {
                    capacity: 5_000,
                    batch_size: 32,
                    idle_wait_ms: 50,
                    ..base.queue
                },
                memory: MemoryConfig {
                    budget_mb: 25,
                    pressure_threshold: 0.7,
                    ..base.memory
                },
                writer: WriterConfig {
                    batch_size: 32,
                    flush_interval_secs: 2.0,
                    idle_wait_ms: 50,
                    ..base.writer
                },
                rotation: RotationConfig {
                    max_file_size_bytes: 50 * MIB,
                    retention_days: 3,
                    max_files_per_day: 5,
                    cleanup_interval_hours: 12,
                    ..base.rotation
                },
                default_channel: ChannelConfig::default()
                    .with_min_severity(Severity::Warning)
                    .with_max_entries(500),
                ..base
            },
            ConfigTier::Debug => Self {
                queue: QueueConfig {
                    capacity: 20_000,
                    batch_size: 128,
                    idle_wait_ms: 200,
                    ..base.queue
                },
                memory: MemoryConfig {
                    budget_mb: 100,
                    pressure_threshold: 0.9,
                    ..base.memory
                },
                writer: WriterConfig {
                    batch_size: 128,
                    flush_interval_secs: 10.0,
                    idle_wait_ms: 200,
                    ..base.writer
                },
                rotation: RotationConfig {
                    max_file_size_bytes: 200 * MIB,
                    retention_days: 14,
                    max_files_per_day: 20,
                    cleanup_interval_hours: 48,
                    ..base.rotation
                },
                json: JsonConfig {
                    compact: false,
                    ..base.json
                },
                default_channel: ChannelConfig::default().with_max_entries(5_000),
                ..base
            },
        }
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LogError::ConfigInvalid(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML, filling omitted keys from the tier
    /// preset, and validates it.
    pub fn from_toml(content: &str) -> Result<Self> {
        let overrides: toml::Table = toml::from_str(content)
            .map_err(|e| LogError::ConfigInvalid(format!("failed to parse config: {e}")))?;

        let tier = match overrides.get("tier") {
            Some(toml::Value::String(name)) => name.parse()?,
            Some(_) => return Err(LogError::ConfigInvalid("tier must be a string".to_string())),
            None => ConfigTier::default(),
        };

        let preset = toml::Value::try_from(Self::for_tier(tier))
            .map_err(|e| LogError::ConfigInvalid(format!("failed to encode preset: {e}")))?;
        let toml::Value::Table(mut merged) = preset else {
            return Err(LogError::ConfigInvalid("preset is not a table".to_string()));
        };
        merge_tables(&mut merged, overrides);

        let config: Self = toml::Value::Table(merged)
            .try_into()
            .map_err(|e| LogError::ConfigInvalid(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| LogError::ConfigInvalid(format!("failed to encode config: {e}")))
    }

    /// Directory log files are written under.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.log_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIRECTORY))
    }

    /// Allow-list built from the channel table and `extra_channels`.
    #[must_use]
    pub fn allow_list(&self) -> ChannelAllowList {
        ChannelAllowList::new(self.extra_channels.clone())
    }

    /// Validates the configuration.
    ///
    /// Rotation settings are not checked here: an invalid rotation config
    /// disables rotation and cleanup instead of failing startup.
    pub fn validate(&self) -> Result<()> {
        if self.file_prefix.is_empty() {
            return Err(LogError::ConfigInvalid("file_prefix cannot be empty".to_string()));
        }
        if self.file_prefix.contains(['/', '\\']) {
            return Err(LogError::ConfigInvalid(
                "file_prefix cannot contain path separators".to_string(),
            ));
        }

        if self.queue.capacity == 0 {
            return Err(LogError::ConfigInvalid(
                "queue.capacity must be greater than 0".to_string(),
            ));
        }
        if self.queue.batch_size == 0 {
            return Err(LogError::ConfigInvalid(
                "queue.batch_size must be greater than 0".to_string(),
            ));
        }
        if !in_unit_range(self.queue.health_threshold) {
            return Err(LogError::ConfigInvalid(
                "queue.health_threshold must be in (0, 1]".to_string(),
            ));
        }

        if self.memory.budget_mb == 0 {
            return Err(LogError::ConfigInvalid(
                "memory.budget_mb must be greater than 0".to_string(),
            ));
        }
        if !in_unit_range(self.memory.pressure_threshold) {
            return Err(LogError::ConfigInvalid(
                "memory.pressure_threshold must be in (0, 1]".to_string(),
            ));
        }
        let trim = &self.memory.trim;
        for (name, value) in [
            ("target_fraction", trim.target_fraction),
            ("elevated_target", trim.elevated_target),
            ("emergency_target", trim.emergency_target),
            ("base_removal", trim.base_removal),
            ("medium_removal", trim.medium_removal),
            ("high_removal", trim.high_removal),
        ] {
            if !in_unit_range(value) {
                return Err(LogError::ConfigInvalid(format!(
                    "memory.trim.{name} must be in (0, 1]"
                )));
            }
        }

        if let Some(key) = self
            .json
            .custom_fields
            .keys()
            .find(|key| RESERVED_FIELDS.contains(&key.as_str()))
        {
            return Err(LogError::ConfigInvalid(format!(
                "json.custom_fields.{key} collides with a built-in field"
            )));
        }

        if self.writer.queue_capacity == 0 {
            return Err(LogError::ConfigInvalid(
                "writer.queue_capacity must be greater than 0".to_string(),
            ));
        }

        for name in &self.extra_channels {
            if name.is_empty() || name.contains(HIERARCHY_SEPARATOR) {
                return Err(LogError::ConfigInvalid(format!(
                    "extra_channels entry {name:?} must be a non-empty top-level name"
                )));
            }
        }
        let allow_list = self.allow_list();
        for name in self.channels.keys() {
            if !allow_list.is_allowed(name) {
                return Err(LogError::ConfigInvalid(format!(
                    "channels.{name} is not a known channel"
                )));
            }
        }

        Ok(())
    }
}

fn in_unit_range(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}

/// Overlays `overrides` onto `base`, recursing into nested tables.
fn merge_tables(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
