//! Time-based retention of rotated log files.
//!
//! A file is considered when its name carries the configured prefix and a
//! `.json` extension. Its date comes from the name, or from the file's
//! modification time when the name does not parse.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Days, Local, NaiveDate};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{LogError, Result};
use crate::rotation::LogRotator;

/// A file past the retention window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiredFile {
    /// Full path.
    pub path: PathBuf,
    /// Date the file was attributed to.
    pub date: NaiveDate,
    /// Size on disk.
    pub size: u64,
}

/// Outcome of one retention sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Files removed.
    pub files_deleted: u64,
    /// Bytes reclaimed.
    pub bytes_freed: u64,
    /// Files that could not be removed.
    pub failures: u64,
    /// The sweep did not run because the rotation config is invalid.
    pub skipped: bool,
}

/// Deletes log files older than the retention window.
#[derive(Debug)]
pub struct RetentionManager {
    rotator: Arc<LogRotator>,
    files_deleted: AtomicU64,
    bytes_freed: AtomicU64,
    sweeps: AtomicU64,
    last_cleanup: Mutex<Option<DateTime<Local>>>,
}

impl RetentionManager {
    /// Creates a manager sharing the rotator's config and naming scheme.
    #[must_use]
    pub fn new(rotator: Arc<LogRotator>) -> Self {
        Self {
            rotator,
            files_deleted: AtomicU64::new(0),
            bytes_freed: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
            last_cleanup: Mutex::new(None),
        }
    }

    /// Files in `base_dir` older than the retention window as of today.
    pub fn expired_files(&self, base_dir: &Path) -> Vec<ExpiredFile> {
        self.expired_files_at(base_dir, Local::now().date_naive())
    }

    /// Files in `base_dir` older than the retention window as of `today`.
    pub fn expired_files_at(&self, base_dir: &Path, today: NaiveDate) -> Vec<ExpiredFile> {
        let retention_days = self.rotator.config().retention_days;
        if retention_days == 0 {
            return Vec::new();
        }
        let Some(cutoff) = today.checked_sub_days(Days::new(u64::from(retention_days))) else {
            return Vec::new();
        };

        let Ok(dir) = fs::read_dir(base_dir) else {
            return Vec::new();
        };

        let naming = self.rotator.naming();
        let mut expired: Vec<ExpiredFile> = dir
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                if !naming.is_candidate(name) {
                    return None;
                }
                let metadata = entry.metadata().ok()?;
                if !metadata.is_file() {
                    return None;
                }
                let date = match naming.parse(name) {
                    Some(parsed) => parsed.date,
                    None => {
                        let modified: DateTime<Local> = metadata.modified().ok()?.into();
                        modified.date_naive()
                    }
                };
                (date < cutoff).then(|| ExpiredFile {
                    path: entry.path(),
                    date,
                    size: metadata.len(),
                })
            })
            .collect();
        expired.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.path.cmp(&b.path)));
        expired
    }

    /// Deletes every expired file in `base_dir`.
    ///
    /// Individual failures are logged and counted; the sweep continues.
    pub fn perform_cleanup(&self, base_dir: &Path) -> CleanupReport {
        self.perform_cleanup_at(base_dir, Local::now().date_naive())
    }

    /// [`perform_cleanup`](Self::perform_cleanup) with an explicit "today".
    pub fn perform_cleanup_at(&self, base_dir: &Path, today: NaiveDate) -> CleanupReport {
        if let Err(e) = self.rotator.config().validate() {
            warn!(error = %e, "skipping log cleanup");
            return CleanupReport {
                skipped: true,
                ..CleanupReport::default()
            };
        }

        let mut report = CleanupReport::default();
        for file in self.expired_files_at(base_dir, today) {
            match fs::remove_file(&file.path) {
                Ok(()) => {
                    report.files_deleted += 1;
                    report.bytes_freed += file.size;
                    self.rotator.forget(&file.path);
                    debug!(path = %file.path.display(), date = %file.date, "deleted expired log file");
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(path = %file.path.display(), error = %e, "failed to delete expired log file");
                }
            }
        }

        self.files_deleted.fetch_add(report.files_deleted, Ordering::Relaxed);
        self.bytes_freed.fetch_add(report.bytes_freed, Ordering::Relaxed);
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        *self.last_cleanup.lock() = Some(Local::now());

        if report.files_deleted > 0 || report.failures > 0 {
            info!(
                dir = %base_dir.display(),
                files_deleted = report.files_deleted,
                bytes_freed = report.bytes_freed,
                failures = report.failures,
                "log cleanup finished"
            );
        }
        report
    }

    /// Total size of the log files in `base_dir` that carry this prefix.
    pub fn disk_usage(&self, base_dir: &Path) -> u64 {
        let Ok(dir) = fs::read_dir(base_dir) else {
            return 0;
        };
        let naming = self.rotator.naming();
        dir.flatten()
            .filter(|entry| entry.file_name().to_str().is_some_and(|n| naming.is_candidate(n)))
            .filter_map(|entry| entry.metadata().ok())
            .filter(std::fs::Metadata::is_file)
            .map(|m| m.len())
            .sum()
    }

    /// Starts the periodic sweep if enabled in the rotation config.
    ///
    /// Returns `Ok(None)` when periodic cleanup is disabled.
    pub fn schedule_periodic_cleanup(
        self: &Arc<Self>,
        base_dir: PathBuf,
    ) -> Result<Option<PeriodicCleanup>> {
        let config = self.rotator.config();
        if !config.periodic_cleanup_enabled {
            return Ok(None);
        }
        if config.cleanup_interval_hours == 0 {
            return Err(LogError::ConfigInvalid(
                "rotation.cleanup_interval_hours must be greater than 0".to_string(),
            ));
        }
        let interval = Duration::from_secs(u64::from(config.cleanup_interval_hours) * 3600);
        self.schedule_every(base_dir, interval).map(Some)
    }

    /// Runs a sweep of `base_dir` every `interval` until the handle is
    /// stopped or dropped.
    pub fn schedule_every(
        self: &Arc<Self>,
        base_dir: PathBuf,
        interval: Duration,
    ) -> Result<PeriodicCleanup> {
        let signal = Arc::new(StopSignal::default());
        let manager = Arc::clone(self);
        let thread_signal = Arc::clone(&signal);

        let handle = thread::Builder::new()
            .name("quill-retention".to_string())
            .spawn(move || {
                while !thread_signal.wait(interval) {
                    manager.perform_cleanup(&base_dir);
                }
                debug!("retention timer stopped");
            })
            .map_err(|source| LogError::ThreadStart {
                stage: "retention",
                source,
            })?;

        Ok(PeriodicCleanup {
            signal,
            handle: Some(handle),
        })
    }

    /// Files deleted by all sweeps.
    pub fn files_deleted(&self) -> u64 {
        self.files_deleted.load(Ordering::Relaxed)
    }

    /// Bytes reclaimed by all sweeps.
    pub fn bytes_freed(&self) -> u64 {
        self.bytes_freed.load(Ordering::Relaxed)
    }

    /// Sweeps run.
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// When the last sweep ran.
    pub fn last_cleanup(&self) -> Option<DateTime<Local>> {
        *self.last_cleanup.lock()
    }
}

#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    /// Waits up to `timeout`. Returns true once stop has been requested.
    fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.wake.wait_for(&mut stopped, timeout);
        }
        *stopped
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }
}

/// Handle to the periodic retention timer. Dropping it stops the timer.
#[derive(Debug)]
pub struct PeriodicCleanup {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicCleanup {
    /// Stops the timer and waits for an in-flight sweep to finish.
    pub fn stop(&mut self) {
        self.signal.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("retention thread panicked");
            }
        }
    }
}

impl Drop for PeriodicCleanup {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::RotationConfig;
    use tempfile::tempdir;

    fn manager(retention_days: u32) -> Arc<RetentionManager> {
        let rotator = LogRotator::new(
            RotationConfig {
                retention_days,
                ..RotationConfig::default()
            },
            "quill",
        )
        .unwrap();
        Arc::new(RetentionManager::new(Arc::new(rotator)))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn expired_files_respect_window() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("quill_Gameplay_20240101_001.json"), "old").unwrap();
        fs::write(dir.path().join("quill_Gameplay_20240108_001.json"), "edge").unwrap();
        fs::write(dir.path().join("quill_Gameplay_20240110_001.json"), "new").unwrap();
        fs::write(dir.path().join("notes.json"), "unrelated").unwrap();

        let manager = manager(7);
        let expired = manager.expired_files_at(dir.path(), date(2024, 1, 15));
        let names: Vec<_> = expired
            .iter()
            .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        // Cutoff is 2024-01-08; that day itself is kept.
        assert_eq!(names, vec!["quill_Gameplay_20240101_001.json"]);
    }

    #[test]
    fn cleanup_deletes_and_counts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("quill_AI_20230101_001.json"), "12345").unwrap();
        fs::write(dir.path().join("quill_AI_20230102_002.json"), "123").unwrap();
        let keep = dir.path().join("quill_AI_20240114_001.json");
        fs::write(&keep, "keep").unwrap();

        let manager = manager(7);
        let report = manager.perform_cleanup_at(dir.path(), date(2024, 1, 15));

        assert_eq!(report.files_deleted, 2);
        assert_eq!(report.bytes_freed, 8);
        assert!(!report.skipped);
        assert!(keep.exists());
        assert_eq!(manager.files_deleted(), 2);
        assert_eq!(manager.bytes_freed(), 8);
        assert!(manager.last_cleanup().is_some());
    }

    #[test]
    fn unparseable_name_falls_back_to_mtime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quill_Misc_backup.json");
        fs::write(&path, "data").unwrap();

        let manager = manager(1);
        // Freshly written, so only expired when "today" is well in the future.
        assert!(manager.expired_files(dir.path()).is_empty());
        let future = Local::now().date_naive() + Days::new(30);
        assert_eq!(manager.expired_files_at(dir.path(), future).len(), 1);
    }

    #[test]
    fn invalid_config_skips_cleanup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quill_AI_20000101_001.json");
        fs::write(&path, "x").unwrap();

        let manager = manager(0);
        let report = manager.perform_cleanup(dir.path());
        assert!(report.skipped);
        assert!(path.exists());
    }

    #[test]
    fn missing_directory_is_empty() {
        let manager = manager(7);
        let missing = Path::new("/nonexistent/quill/logs");
        assert!(manager.expired_files(missing).is_empty());
        assert_eq!(manager.disk_usage(missing), 0);
        assert_eq!(manager.perform_cleanup(missing).files_deleted, 0);
    }

    #[test]
    fn disk_usage_counts_only_prefixed_logs() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("quill_A_20240101_001.json"), "12345").unwrap();
        fs::write(dir.path().join("quill_B_20240102_002.json"), "123").unwrap();
        fs::write(dir.path().join("other.json"), "ignored").unwrap();
        fs::write(dir.path().join("other_A_20240101_001.json"), "ignored").unwrap();
        fs::write(dir.path().join("quill_A_20240101_001.txt"), "ignored").unwrap();
        fs::create_dir(dir.path().join("quill_dir.json")).unwrap();
        assert_eq!(manager(7).disk_usage(dir.path()), 8);
    }

    #[test]
    fn periodic_cleanup_runs_and_stops() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("quill_AI_20000101_001.json"), "x").unwrap();

        let manager = manager(7);
        let mut timer = manager
            .schedule_every(dir.path().to_path_buf(), Duration::from_millis(20))
            .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while manager.sweeps() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        timer.stop();

        assert!(manager.sweeps() >= 1);
        assert_eq!(manager.files_deleted(), 1);
    }

    #[test]
    fn periodic_cleanup_disabled() {
        let rotator = LogRotator::new(
            RotationConfig {
                periodic_cleanup_enabled: false,
                ..RotationConfig::default()
            },
            "quill",
        )
        .unwrap();
        let manager = Arc::new(RetentionManager::new(Arc::new(rotator)));
        assert!(manager
            .schedule_periodic_cleanup(PathBuf::from("."))
            .unwrap()
            .is_none());
    }
}
