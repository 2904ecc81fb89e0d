//! Size-based log file rotation.
//!
//! Files are named `<prefix>_<channel>_<YYYYMMDD>_<NNN>.json`. `NNN` counts
//! up per channel per day. The rotator tracks every file it has handed out
//! and the bytes queued for each, so the decision to rotate does not wait for
//! the writer thread to reach the disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Local, NaiveDate};
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::budget::MIB;
use crate::error::{LogError, Result};

/// Rotation and retention settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Rotate once the active file reaches this many bytes.
    pub max_file_size_bytes: u64,
    /// Delete files older than this many days.
    pub retention_days: u32,
    /// Files kept per channel per day; the oldest is deleted beyond this.
    pub max_files_per_day: u32,
    /// Run a retention sweep while the pipeline starts.
    pub auto_cleanup_on_startup: bool,
    /// Run retention sweeps on a timer.
    pub periodic_cleanup_enabled: bool,
    /// Hours between periodic sweeps.
    pub cleanup_interval_hours: u32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 100 * MIB,
            retention_days: 7,
            max_files_per_day: 10,
            auto_cleanup_on_startup: true,
            periodic_cleanup_enabled: true,
            cleanup_interval_hours: 24,
        }
    }
}

impl RotationConfig {
    /// Checks that size and retention are positive.
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size_bytes == 0 {
            return Err(LogError::ConfigInvalid(
                "rotation.max_file_size_bytes must be greater than 0".to_string(),
            ));
        }
        if self.retention_days == 0 {
            return Err(LogError::ConfigInvalid(
                "rotation.retention_days must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns true if [`validate`](Self::validate) passes.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Parsed components of a log file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileName {
    /// Channel the file belongs to.
    pub channel: String,
    /// Date encoded in the name.
    pub date: NaiveDate,
    /// Rotation index within the day.
    pub index: u32,
}

/// Builds and parses log file names for one prefix.
#[derive(Debug, Clone)]
pub struct FileNaming {
    prefix: String,
    pattern: Regex,
}

impl FileNaming {
    /// Creates a naming scheme for `prefix`.
    pub fn new(prefix: &str) -> Result<Self> {
        if prefix.is_empty() {
            return Err(LogError::ConfigInvalid("file_prefix cannot be empty".to_string()));
        }
        // Greedy channel group with anchored suffix: parsed from the right,
        // so channel names may contain '_'.
        let pattern = Regex::new(&format!(
            r"^{}_(.+)_(\d{{8}})_(\d{{3,}})\.json$",
            regex::escape(prefix)
        ))
        .map_err(|e| LogError::ConfigInvalid(format!("file_prefix: {e}")))?;
        Ok(Self {
            prefix: prefix.to_string(),
            pattern,
        })
    }

    /// The file prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// File name for a channel, date and index.
    #[must_use]
    pub fn file_name(&self, channel: &str, date: NaiveDate, index: u32) -> String {
        format!(
            "{}_{}_{}_{:03}.json",
            self.prefix,
            channel,
            date.format("%Y%m%d"),
            index
        )
    }

    /// Parses a file name produced by [`file_name`](Self::file_name).
    #[must_use]
    pub fn parse(&self, file_name: &str) -> Option<ParsedFileName> {
        let caps = self.pattern.captures(file_name)?;
        let date = NaiveDate::parse_from_str(caps.get(2)?.as_str(), "%Y%m%d").ok()?;
        let index = caps.get(3)?.as_str().parse().ok()?;
        Some(ParsedFileName {
            channel: caps.get(1)?.as_str().to_string(),
            date,
            index,
        })
    }

    /// Loose match used by retention: prefix and extension only.
    #[must_use]
    pub fn is_candidate(&self, file_name: &str) -> bool {
        file_name.len() > self.prefix.len() + 1
            && file_name.starts_with(&self.prefix)
            && file_name[self.prefix.len()..].starts_with('_')
            && file_name.ends_with(".json")
    }
}

/// One tracked log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogFileInfo {
    /// Full path.
    pub path: PathBuf,
    /// Owning channel.
    pub channel: String,
    /// Day the file belongs to.
    pub creation_date: NaiveDate,
    /// Bytes written or queued.
    pub size: u64,
    /// Index within the day.
    pub rotation_index: u32,
    /// Currently receiving writes.
    pub is_active: bool,
}

/// Decides when a channel's file is replaced and names the successor.
#[derive(Debug)]
pub struct LogRotator {
    config: RwLock<RotationConfig>,
    naming: FileNaming,
    files: Mutex<HashMap<String, Vec<LogFileInfo>>>,
    evicted: Mutex<Vec<LogFileInfo>>,
    total_rotations: AtomicU64,
    files_deleted: AtomicU64,
    bytes_freed: AtomicU64,
}

impl LogRotator {
    /// Creates a rotator.
    pub fn new(config: RotationConfig, prefix: &str) -> Result<Self> {
        Ok(Self {
            config: RwLock::new(config),
            naming: FileNaming::new(prefix)?,
            files: Mutex::new(HashMap::new()),
            evicted: Mutex::new(Vec::new()),
            total_rotations: AtomicU64::new(0),
            files_deleted: AtomicU64::new(0),
            bytes_freed: AtomicU64::new(0),
        })
    }

    /// Current settings.
    pub fn config(&self) -> RotationConfig {
        self.config.read().clone()
    }

    /// Replaces the settings.
    pub fn set_config(&self, config: RotationConfig) {
        *self.config.write() = config;
    }

    /// The naming scheme in use.
    pub const fn naming(&self) -> &FileNaming {
        &self.naming
    }

    /// Path of the file currently receiving a channel's lines.
    ///
    /// On first use for the day, files already on disk are adopted and the
    /// highest-indexed one becomes active.
    #[allow(clippy::significant_drop_tightening)]
    pub fn active_file_path(&self, channel: &str, base_dir: &Path) -> PathBuf {
        let today = Local::now().date_naive();
        let mut files = self.files.lock();
        let tracked = files.entry(channel.to_string()).or_default();

        if let Some(active) = tracked.iter_mut().find(|f| f.is_active) {
            if active.creation_date == today {
                return active.path.clone();
            }
            active.is_active = false;
        }

        self.adopt_existing(tracked, channel, base_dir, today);

        let resume = tracked
            .iter_mut()
            .filter(|f| f.creation_date == today)
            .max_by_key(|f| f.rotation_index);
        if let Some(latest) = resume {
            latest.is_active = true;
            debug!(channel, path = %latest.path.display(), "resuming log file");
            return latest.path.clone();
        }

        let path = base_dir.join(self.naming.file_name(channel, today, 1));
        tracked.push(LogFileInfo {
            path: path.clone(),
            channel: channel.to_string(),
            creation_date: today,
            size: 0,
            rotation_index: 1,
            is_active: true,
        });
        path
    }

    fn adopt_existing(
        &self,
        tracked: &mut Vec<LogFileInfo>,
        channel: &str,
        base_dir: &Path,
        today: NaiveDate,
    ) {
        let Ok(dir) = fs::read_dir(base_dir) else {
            return;
        };
        for entry in dir.flatten() {
            let name = entry.file_name();
            let Some(parsed) = name.to_str().and_then(|n| self.naming.parse(n)) else {
                continue;
            };
            if parsed.channel != channel || parsed.date != today {
                continue;
            }
            let path = entry.path();
            if tracked.iter().any(|f| f.path == path) {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            tracked.push(LogFileInfo {
                path,
                channel: channel.to_string(),
                creation_date: parsed.date,
                size,
                rotation_index: parsed.index,
                is_active: false,
            });
        }
    }

    /// Returns true when the file has reached the configured size.
    ///
    /// Always false while the rotation config is invalid.
    pub fn should_rotate(&self, channel: &str, path: &Path) -> bool {
        let max = {
            let config = self.config.read();
            if !config.is_valid() {
                return false;
            }
            config.max_file_size_bytes
        };

        let tracked_size = self
            .files
            .lock()
            .get(channel)
            .and_then(|files| files.iter().find(|f| f.path == path))
            .map(|f| f.size);
        let size = tracked_size
            .or_else(|| fs::metadata(path).ok().map(|m| m.len()))
            .unwrap_or(0);
        size >= max
    }

    /// Accounts `bytes` queued for `path`.
    pub fn record_write(&self, channel: &str, path: &Path, bytes: u64) {
        if let Some(info) = self
            .files
            .lock()
            .get_mut(channel)
            .and_then(|files| files.iter_mut().find(|f| f.path == path))
        {
            info.size += bytes;
        }
    }

    /// Retires `current_path` and returns the channel's next file.
    ///
    /// When the day already holds `max_files_per_day` files for the channel,
    /// the oldest of them stops being tracked and is queued for deletion.
    /// Lines may still be queued for it, so the file stays on disk until
    /// [`take_evicted`](Self::take_evicted) hands it to whoever owns the
    /// writes.
    pub fn rotate(&self, channel: &str, current_path: &Path) -> PathBuf {
        let today = Local::now().date_naive();
        let max_files = self.config.read().max_files_per_day.max(1) as usize;
        let dir = current_path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut files = self.files.lock();
        let tracked = files.entry(channel.to_string()).or_default();
        for info in tracked.iter_mut() {
            info.is_active = false;
        }

        let next_index = tracked
            .iter()
            .filter(|f| f.creation_date == today)
            .map(|f| f.rotation_index)
            .max()
            .unwrap_or(0)
            + 1;

        let mut evicted = Vec::new();
        loop {
            let todays: Vec<usize> = tracked
                .iter()
                .enumerate()
                .filter(|(_, f)| f.creation_date == today)
                .map(|(i, _)| i)
                .collect();
            if todays.len() < max_files {
                break;
            }
            let Some(&oldest) = todays.iter().min_by_key(|&&i| tracked[i].rotation_index) else {
                break;
            };
            evicted.push(tracked.remove(oldest));
        }

        let path = dir.join(self.naming.file_name(channel, today, next_index));
        tracked.push(LogFileInfo {
            path: path.clone(),
            channel: channel.to_string(),
            creation_date: today,
            size: 0,
            rotation_index: next_index,
            is_active: true,
        });
        drop(files);
        if !evicted.is_empty() {
            debug!(channel, count = evicted.len(), "files over daily limit evicted");
            self.evicted.lock().extend(evicted);
        }

        self.total_rotations.fetch_add(1, Ordering::Relaxed);
        info!(
            channel,
            from = %current_path.display(),
            to = %path.display(),
            "rotated log file"
        );
        path
    }

    /// Files evicted by the daily cap and not yet deleted.
    pub fn take_evicted(&self) -> Vec<LogFileInfo> {
        std::mem::take(&mut *self.evicted.lock())
    }

    /// Deletes every evicted file right away.
    ///
    /// Only for callers that know no writes are pending for those paths.
    pub fn purge_evicted(&self) {
        for info in self.take_evicted() {
            self.delete_evicted(&info);
        }
    }

    /// Deletes one evicted file and counts it.
    pub fn delete_evicted(&self, info: &LogFileInfo) {
        let size = fs::metadata(&info.path).map(|m| m.len()).unwrap_or(info.size);
        match fs::remove_file(&info.path) {
            Ok(()) => {
                self.files_deleted.fetch_add(1, Ordering::Relaxed);
                self.bytes_freed.fetch_add(size, Ordering::Relaxed);
                debug!(path = %info.path.display(), "deleted file over daily limit");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %info.path.display(), error = %e, "failed to delete log file");
            }
        }
    }

    /// Stops tracking a file, e.g. after retention deleted it.
    pub fn forget(&self, path: &Path) {
        let mut files = self.files.lock();
        for tracked in files.values_mut() {
            tracked.retain(|f| f.path != path);
        }
        files.retain(|_, tracked| !tracked.is_empty());
    }

    /// Tracked files of one channel.
    pub fn tracked_files(&self, channel: &str) -> Vec<LogFileInfo> {
        self.files.lock().get(channel).cloned().unwrap_or_default()
    }

    /// Number of files currently receiving writes.
    pub fn active_files(&self) -> usize {
        self.files
            .lock()
            .values()
            .flat_map(|files| files.iter())
            .filter(|f| f.is_active)
            .count()
    }

    /// Rotations performed.
    pub fn total_rotations(&self) -> u64 {
        self.total_rotations.load(Ordering::Relaxed)
    }

    /// Files deleted to honor the per-day cap.
    pub fn files_deleted(&self) -> u64 {
        self.files_deleted.load(Ordering::Relaxed)
    }

    /// Bytes freed by per-day cap deletions.
    pub fn bytes_freed(&self) -> u64 {
        self.bytes_freed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use test_case::test_case;

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    fn rotator(max_size: u64, max_files: u32) -> LogRotator {
        LogRotator::new(
            RotationConfig {
                max_file_size_bytes: max_size,
                max_files_per_day: max_files,
                ..RotationConfig::default()
            },
            "quill",
        )
        .unwrap()
    }

    // ===== Naming =====

    #[test]
    fn file_name_layout() {
        let naming = FileNaming::new("quill").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(naming.file_name("Gameplay", date, 1), "quill_Gameplay_20240309_001.json");
        assert_eq!(naming.file_name("AI", date, 42), "quill_AI_20240309_042.json");
        assert_eq!(naming.file_name("AI", date, 1234), "quill_AI_20240309_1234.json");
    }

    #[test_case("quill_Gameplay_20240309_001.json", Some(("Gameplay", 1)))]
    #[test_case("quill_Net_Replication_20240309_012.json", Some(("Net_Replication", 12)))]
    #[test_case("quill_Gameplay.Combat_20240309_003.json", Some(("Gameplay.Combat", 3)))]
    #[test_case("quill_Gameplay_20241399_001.json", None)]
    #[test_case("other_Gameplay_20240309_001.json", None)]
    #[test_case("quill_Gameplay_20240309_001.log", None)]
    fn parse_file_name(name: &str, expected: Option<(&str, u32)>) {
        let naming = FileNaming::new("quill").unwrap();
        let parsed = naming.parse(name).map(|p| (p.channel, p.index));
        assert_eq!(parsed, expected.map(|(c, i)| (c.to_string(), i)));
    }

    #[test]
    fn prefix_with_regex_metacharacters() {
        let naming = FileNaming::new("app.v2").unwrap();
        assert!(naming.parse("app.v2_UI_20240101_001.json").is_some());
        assert!(naming.parse("appXv2_UI_20240101_001.json").is_none());
    }

    #[test]
    fn candidate_match_is_loose() {
        let naming = FileNaming::new("quill").unwrap();
        assert!(naming.is_candidate("quill_Gameplay_garbage.json"));
        assert!(!naming.is_candidate("quillGameplay.json"));
        assert!(!naming.is_candidate("quill_.txt"));
    }

    #[test]
    fn empty_prefix_rejected() {
        assert!(matches!(FileNaming::new(""), Err(LogError::ConfigInvalid(_))));
    }

    // ===== Config =====

    #[test]
    fn config_validation() {
        assert!(RotationConfig::default().is_valid());
        let zero_size = RotationConfig {
            max_file_size_bytes: 0,
            ..RotationConfig::default()
        };
        assert!(zero_size.validate().unwrap_err().to_string().contains("max_file_size"));
        let zero_days = RotationConfig {
            retention_days: 0,
            ..RotationConfig::default()
        };
        assert!(!zero_days.is_valid());
    }

    // ===== Rotation =====

    #[test]
    fn first_active_file_is_index_one() {
        let dir = tempdir().unwrap();
        let rotator = rotator(100, 10);
        let path = rotator.active_file_path("Gameplay", dir.path());
        assert_eq!(
            path,
            dir.path().join(rotator.naming().file_name("Gameplay", today(), 1))
        );
        assert_eq!(rotator.active_file_path("Gameplay", dir.path()), path);
        assert_eq!(rotator.active_files(), 1);
    }

    #[test]
    fn rotates_at_size_threshold() {
        let dir = tempdir().unwrap();
        let rotator = rotator(100, 10);
        let first = rotator.active_file_path("Audio", dir.path());

        rotator.record_write("Audio", &first, 60);
        assert!(!rotator.should_rotate("Audio", &first));
        rotator.record_write("Audio", &first, 40);
        assert!(rotator.should_rotate("Audio", &first));

        let second = rotator.rotate("Audio", &first);
        assert_eq!(
            second,
            dir.path().join(rotator.naming().file_name("Audio", today(), 2))
        );
        assert_eq!(rotator.active_file_path("Audio", dir.path()), second);
        assert_eq!(rotator.total_rotations(), 1);
        assert_eq!(rotator.active_files(), 1);

        let files = rotator.tracked_files("Audio");
        assert_eq!(files.len(), 2);
        assert!(!files.iter().find(|f| f.path == first).unwrap().is_active);
    }

    #[test]
    fn successor_index_is_max_plus_one() {
        let dir = tempdir().unwrap();
        let rotator = rotator(1, 50);
        let mut path = rotator.active_file_path("UI", dir.path());
        for expected in 2..=5 {
            path = rotator.rotate("UI", &path);
            let parsed = rotator
                .naming()
                .parse(path.file_name().unwrap().to_str().unwrap())
                .unwrap();
            assert_eq!(parsed.index, expected);
        }
    }

    #[test]
    fn invalid_config_never_rotates() {
        let dir = tempdir().unwrap();
        let rotator = rotator(0, 10);
        let path = rotator.active_file_path("UI", dir.path());
        rotator.record_write("UI", &path, 1_000_000);
        assert!(!rotator.should_rotate("UI", &path));
    }

    #[test]
    fn resumes_existing_file_on_disk() {
        let dir = tempdir().unwrap();
        let naming = FileNaming::new("quill").unwrap();
        let existing = dir.path().join(naming.file_name("Network", today(), 3));
        fs::write(&existing, "x".repeat(80)).unwrap();
        fs::write(dir.path().join(naming.file_name("Network", today(), 1)), "y").unwrap();

        let rotator = rotator(100, 10);
        let path = rotator.active_file_path("Network", dir.path());
        assert_eq!(path, existing);

        rotator.record_write("Network", &path, 20);
        assert!(rotator.should_rotate("Network", &path));
        let next = rotator.rotate("Network", &path);
        assert!(next.to_str().unwrap().ends_with("_004.json"));
    }

    #[test]
    fn daily_cap_deletes_oldest() {
        let dir = tempdir().unwrap();
        let rotator = rotator(1, 3);
        let mut path = rotator.active_file_path("Physics", dir.path());
        fs::write(&path, "first").unwrap();
        let first = path.clone();

        for _ in 0..3 {
            path = rotator.rotate("Physics", &path);
            fs::write(&path, "data").unwrap();
        }

        let files = rotator.tracked_files("Physics");
        assert_eq!(files.len(), 3);
        assert!(first.exists());
        assert_eq!(rotator.files_deleted(), 0);

        rotator.purge_evicted();
        assert!(!first.exists());
        assert_eq!(rotator.files_deleted(), 1);
        assert_eq!(rotator.bytes_freed(), 5);
        assert!(path.to_str().unwrap().ends_with("_004.json"));
    }

    #[test]
    fn eviction_waits_for_owner() {
        let dir = tempdir().unwrap();
        let rotator = rotator(1, 2);
        let mut path = rotator.active_file_path("Audio", dir.path());
        let first = path.clone();
        path = rotator.rotate("Audio", &path);
        assert!(rotator.take_evicted().is_empty());

        rotator.rotate("Audio", &path);
        let evicted = rotator.take_evicted();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].path, first);
        assert!(rotator.take_evicted().is_empty());

        // Deleting a file that never reached the disk is not counted.
        rotator.delete_evicted(&evicted[0]);
        assert_eq!(rotator.files_deleted(), 0);
    }

    #[test]
    fn forget_drops_tracking() {
        let dir = tempdir().unwrap();
        let rotator = rotator(100, 10);
        let path = rotator.active_file_path("AI", dir.path());
        rotator.forget(&path);
        assert!(rotator.tracked_files("AI").is_empty());
        assert_eq!(rotator.active_files(), 0);
    }
}
