//! Batched file writer running on its own thread.
//!
//! The processor thread is the only producer; the writer thread is the only
//! consumer. Lines are grouped per destination, appended through cached
//! handles, and flushed on a fixed interval. Handles that saw no writes
//! during a whole flush interval are closed on the next tick.
//!
//! Files are retired through the same queue: every line queued for a path
//! before its retirement is written, the handle is closed, and only then does
//! the retirement action (usually a delete) run.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LogError, Result};

/// Largest batch the writer drains at once.
pub const MAX_WRITE_BATCH: usize = 512;

/// Shortest allowed flush interval.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// How long a retirement waits for room in a full queue.
pub const RETIRE_TIMEOUT: Duration = Duration::from_secs(1);

/// Writer thread settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Lines drained per batch, clamped to `1..=512`.
    pub batch_size: usize,
    /// Seconds between flushes, at least 0.1.
    pub flush_interval_secs: f64,
    /// Milliseconds to wait for work when idle.
    pub idle_wait_ms: u64,
    /// Capacity of the write queue.
    pub queue_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            flush_interval_secs: 5.0,
            idle_wait_ms: 100,
            queue_capacity: 10_000,
        }
    }
}

impl WriterConfig {
    /// Batch size after clamping.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_WRITE_BATCH)
    }

    /// Flush interval after clamping.
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        if self.flush_interval_secs.is_finite() {
            Duration::from_secs_f64(self.flush_interval_secs.max(0.0)).max(MIN_FLUSH_INTERVAL)
        } else {
            MIN_FLUSH_INTERVAL
        }
    }

    /// Idle wait as a duration.
    #[must_use]
    pub const fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

/// Writer counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    /// Lines accepted into the queue.
    pub enqueued: u64,
    /// Lines refused because the queue was full.
    pub dropped: u64,
    /// Lines appended to disk.
    pub writes: u64,
    /// Batches processed.
    pub batches: u64,
    /// Lines lost to open or write failures.
    pub failed_writes: u64,
    /// Bytes appended.
    pub bytes_written: u64,
    /// Time spent writing, in microseconds.
    pub write_time_us: u64,
    /// Files closed and handed to their retirement action.
    pub retired: u64,
    /// Cached handles currently open.
    pub open_files: usize,
    /// Lines waiting in the queue.
    pub queue_depth: usize,
    /// Queue capacity.
    pub queue_capacity: usize,
}

type RetireAction = Box<dyn FnOnce() + Send>;

enum WriteRequest {
    Append { path: PathBuf, line: String },
    Retire { path: PathBuf, then: RetireAction },
}

impl fmt::Debug for WriteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append { path, line } => f
                .debug_struct("Append")
                .field("path", path)
                .field("len", &line.len())
                .finish(),
            Self::Retire { path, .. } => f.debug_struct("Retire").field("path", path).finish(),
        }
    }
}

/// Lines of one batch grouped per path, in first-seen order.
#[derive(Debug, Default)]
struct PendingLines {
    order: Vec<PathBuf>,
    grouped: HashMap<PathBuf, (String, u64)>,
}

impl PendingLines {
    fn push(&mut self, path: PathBuf, line: &str) {
        if !self.grouped.contains_key(&path) {
            self.order.push(path.clone());
        }
        let (content, lines) = self.grouped.entry(path).or_default();
        content.push_str(line);
        content.push('\n');
        *lines += 1;
    }
}

#[derive(Debug)]
struct OpenFile {
    writer: BufWriter<File>,
    touched: bool,
}

#[derive(Debug, Default)]
struct WriterShared {
    handles: Mutex<HashMap<PathBuf, OpenFile>>,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    writes: AtomicU64,
    batches: AtomicU64,
    failed_writes: AtomicU64,
    bytes_written: AtomicU64,
    write_time_us: AtomicU64,
    retire_queued: AtomicU64,
    retired: AtomicU64,
}

impl WriterShared {
    fn write_batch(&self, batch: &mut Vec<WriteRequest>) {
        let started = Instant::now();

        let mut pending = PendingLines::default();
        for request in batch.drain(..) {
            match request {
                WriteRequest::Append { path, line } => pending.push(path, &line),
                WriteRequest::Retire { path, then } => {
                    self.write_pending(&mut pending);
                    self.close(&path);
                    then();
                    self.retired.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        self.write_pending(&mut pending);

        self.batches.fetch_add(1, Ordering::Relaxed);
        self.write_time_us
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
    }

    fn write_pending(&self, pending: &mut PendingLines) {
        if pending.order.is_empty() {
            return;
        }
        let mut handles = self.handles.lock();
        for path in pending.order.drain(..) {
            let Some((content, lines)) = pending.grouped.remove(&path) else {
                continue;
            };
            match append(&mut handles, &path, content.as_bytes()) {
                Ok(()) => {
                    self.writes.fetch_add(lines, Ordering::Relaxed);
                    self.bytes_written
                        .fetch_add(content.len() as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    self.failed_writes.fetch_add(lines, Ordering::Relaxed);
                    warn!(path = %path.display(), error = %e, lines, "failed to write log lines");
                }
            }
        }
    }

    fn close(&self, path: &Path) {
        let removed = self.handles.lock().remove(path);
        if let Some(mut open) = removed {
            if let Err(e) = open.writer.flush() {
                warn!(path = %path.display(), error = %e, "failed to flush retired log file");
            }
        }
    }

    /// Flushes every handle; with `close_idle`, closes those untouched since
    /// the previous tick.
    fn flush_all(&self, close_idle: bool) {
        let mut handles = self.handles.lock();
        handles.retain(|path, file| {
            if let Err(e) = file.writer.flush() {
                warn!(path = %path.display(), error = %e, "failed to flush log file");
                return false;
            }
            let keep = !close_idle || file.touched;
            file.touched = false;
            keep
        });
    }

    fn close_all(&self) {
        self.flush_all(false);
        self.handles.lock().clear();
    }
}

fn append(
    handles: &mut HashMap<PathBuf, OpenFile>,
    path: &Path,
    bytes: &[u8],
) -> std::io::Result<()> {
    if !handles.contains_key(path) {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        handles.insert(
            path.to_path_buf(),
            OpenFile {
                writer: BufWriter::new(file),
                touched: false,
            },
        );
    }
    let Some(open) = handles.get_mut(path) else {
        return Ok(());
    };
    open.touched = true;
    if let Err(e) = open.writer.write_all(bytes) {
        handles.remove(path);
        return Err(e);
    }
    Ok(())
}

/// Handle to the writer thread.
#[derive(Debug)]
pub struct FileWriter {
    base_dir: PathBuf,
    sender: Mutex<Option<Sender<WriteRequest>>>,
    receiver: Receiver<WriteRequest>,
    shared: Arc<WriterShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    capacity: usize,
}

impl FileWriter {
    /// Creates `base_dir` and starts the writer thread.
    pub fn start(base_dir: impl Into<PathBuf>, config: &WriterConfig) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;

        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        let shared = Arc::new(WriterShared::default());

        let thread_receiver = receiver.clone();
        let thread_shared = Arc::clone(&shared);
        let batch_size = config.effective_batch_size();
        let flush_interval = config.flush_interval();
        let idle_wait = config.idle_wait();

        let handle = thread::Builder::new()
            .name("quill-writer".to_string())
            .spawn(move || {
                run_writer(
                    &thread_receiver,
                    &thread_shared,
                    batch_size,
                    flush_interval,
                    idle_wait,
                );
            })
            .map_err(|source| LogError::ThreadStart {
                stage: "writer",
                source,
            })?;

        debug!(dir = %base_dir.display(), batch_size, ?flush_interval, "file writer started");
        Ok(Self {
            base_dir,
            sender: Mutex::new(Some(sender)),
            receiver,
            shared,
            handle: Mutex::new(Some(handle)),
            capacity,
        })
    }

    /// Directory files are written under.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Queues `line` for `path`. Returns false if the queue is full or the
    /// writer has stopped.
    pub fn enqueue(&self, line: String, path: PathBuf) -> bool {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        match sender.try_send(WriteRequest::Append { path, line }) {
            Ok(()) => {
                self.shared.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Queues the retirement of `path`: lines already queued for it are
    /// written, its handle is closed, then `then` runs on the writer thread.
    ///
    /// Waits up to [`RETIRE_TIMEOUT`] for room in the queue. Returns false
    /// if the request was not queued; `then` is dropped without running.
    pub fn retire(&self, path: PathBuf, then: impl FnOnce() + Send + 'static) -> bool {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return false;
        };
        let request = WriteRequest::Retire {
            path,
            then: Box::new(then),
        };
        self.shared.retire_queued.fetch_add(1, Ordering::Relaxed);
        if sender.send_timeout(request, RETIRE_TIMEOUT).is_ok() {
            true
        } else {
            self.shared.retire_queued.fetch_sub(1, Ordering::Relaxed);
            false
        }
    }

    /// Retirements queued but not yet carried out.
    pub fn pending_retirements(&self) -> u64 {
        let queued = self.shared.retire_queued.load(Ordering::Relaxed);
        queued.saturating_sub(self.shared.retired.load(Ordering::Relaxed))
    }

    /// Flushes every open handle now.
    ///
    /// Lines still queued are not waited for.
    pub fn flush(&self) {
        self.shared.flush_all(false);
    }

    /// Lines waiting in the queue.
    pub fn queue_depth(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true while the writer thread is running.
    pub fn is_running(&self) -> bool {
        self.handle.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Drains the queue, flushes, closes every file and joins the thread.
    ///
    /// Safe to call more than once.
    pub fn stop(&self) {
        // Disconnecting wakes the thread; it drains what is left, then exits.
        self.sender.lock().take();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("writer thread panicked");
            }
        }
    }

    /// Snapshot of the writer counters.
    pub fn stats(&self) -> WriterStats {
        let shared = &self.shared;
        WriterStats {
            enqueued: shared.enqueued.load(Ordering::Relaxed),
            dropped: shared.dropped.load(Ordering::Relaxed),
            writes: shared.writes.load(Ordering::Relaxed),
            batches: shared.batches.load(Ordering::Relaxed),
            failed_writes: shared.failed_writes.load(Ordering::Relaxed),
            bytes_written: shared.bytes_written.load(Ordering::Relaxed),
            write_time_us: shared.write_time_us.load(Ordering::Relaxed),
            retired: shared.retired.load(Ordering::Relaxed),
            open_files: shared.handles.lock().len(),
            queue_depth: self.receiver.len(),
            queue_capacity: self.capacity,
        }
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_writer(
    receiver: &Receiver<WriteRequest>,
    shared: &WriterShared,
    batch_size: usize,
    flush_interval: Duration,
    idle_wait: Duration,
) {
    let mut batch = Vec::with_capacity(batch_size);
    let mut last_flush = Instant::now();

    loop {
        match receiver.recv_timeout(idle_wait) {
            Ok(first) => {
                batch.push(first);
                batch.extend(receiver.try_iter().take(batch_size - 1));
                shared.write_batch(&mut batch);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_flush.elapsed() >= flush_interval {
            shared.flush_all(true);
            last_flush = Instant::now();
        }
    }

    shared.close_all();
    debug!("file writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fast_config() -> WriterConfig {
        WriterConfig {
            batch_size: 8,
            flush_interval_secs: 0.1,
            idle_wait_ms: 10,
            queue_capacity: 1000,
        }
    }

    // ===== Config =====

    #[test]
    fn config_clamps() {
        let config = WriterConfig {
            batch_size: 10_000,
            flush_interval_secs: 0.01,
            ..WriterConfig::default()
        };
        assert_eq!(config.effective_batch_size(), MAX_WRITE_BATCH);
        assert_eq!(config.flush_interval(), MIN_FLUSH_INTERVAL);

        let zero = WriterConfig {
            batch_size: 0,
            flush_interval_secs: f64::NAN,
            ..WriterConfig::default()
        };
        assert_eq!(zero.effective_batch_size(), 1);
        assert_eq!(zero.flush_interval(), MIN_FLUSH_INTERVAL);
    }

    #[test]
    fn default_config() {
        let config = WriterConfig::default();
        assert_eq!(config.effective_batch_size(), 64);
        assert_eq!(config.flush_interval(), Duration::from_secs(5));
        assert_eq!(config.idle_wait(), Duration::from_millis(100));
    }

    // ===== Writing =====

    #[test]
    fn creates_base_dir() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("nested/logs");
        let writer = FileWriter::start(&base, &fast_config()).unwrap();
        assert!(base.is_dir());
        assert!(writer.is_running());
        writer.stop();
        assert!(!writer.is_running());
    }

    #[test]
    fn stop_drains_and_groups_by_path() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");

        let writer = FileWriter::start(dir.path(), &fast_config()).unwrap();
        for i in 0..20 {
            let path = if i % 2 == 0 { &a } else { &b };
            assert!(writer.enqueue(format!("line {i}"), path.clone()));
        }
        writer.stop();

        let a_lines: Vec<String> = fs::read_to_string(&a)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(a_lines.len(), 10);
        assert_eq!(a_lines[0], "line 0");
        assert_eq!(a_lines[9], "line 18");
        assert!(fs::read_to_string(&b).unwrap().ends_with("line 19\n"));

        let stats = writer.stats();
        assert_eq!(stats.enqueued, 20);
        assert_eq!(stats.writes, 20);
        assert!(stats.batches >= 3);
        assert_eq!(stats.failed_writes, 0);
        assert_eq!(stats.open_files, 0);
    }

    #[test]
    fn appends_to_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("existing.json");
        fs::write(&path, "old\n").unwrap();

        let writer = FileWriter::start(dir.path(), &fast_config()).unwrap();
        writer.enqueue("new".to_string(), path.clone());
        writer.stop();
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");
    }

    #[test]
    fn failed_open_is_counted_and_writer_continues() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("missing-dir/file.json");
        let good = dir.path().join("good.json");

        let writer = FileWriter::start(dir.path(), &fast_config()).unwrap();
        writer.enqueue("lost".to_string(), bad);
        writer.enqueue("kept".to_string(), good.clone());
        writer.stop();

        let stats = writer.stats();
        assert_eq!(stats.failed_writes, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(fs::read_to_string(&good).unwrap(), "kept\n");
    }

    // ===== Retirement =====

    #[test]
    fn retire_runs_after_queued_lines() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("old.json");
        let next = dir.path().join("next.json");

        let writer = FileWriter::start(dir.path(), &fast_config()).unwrap();
        for i in 0..50 {
            assert!(writer.enqueue(format!("old {i}"), old.clone()));
        }
        let (seen_tx, seen_rx) = crossbeam_channel::bounded(1);
        let retired = old.clone();
        assert!(writer.retire(old.clone(), move || {
            let lines = fs::read_to_string(&retired).map(|s| s.lines().count());
            fs::remove_file(&retired).unwrap();
            seen_tx.send(lines.unwrap_or(0)).unwrap();
        }));
        writer.enqueue("next".to_string(), next.clone());

        assert_eq!(seen_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 50);
        writer.stop();

        assert!(!old.exists());
        assert_eq!(fs::read_to_string(&next).unwrap(), "next\n");
        let stats = writer.stats();
        assert_eq!(stats.retired, 1);
        assert_eq!(stats.writes, 51);
        assert_eq!(writer.pending_retirements(), 0);
    }

    #[test]
    fn retire_closes_cached_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cached.json");

        let writer = FileWriter::start(dir.path(), &fast_config()).unwrap();
        writer.enqueue("one".to_string(), path.clone());
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        writer.retire(path.clone(), move || done_tx.send(()).unwrap());
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(writer.stats().open_files, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\n");
        writer.stop();
    }

    #[test]
    fn retire_after_stop_is_refused() {
        let dir = tempdir().unwrap();
        let writer = FileWriter::start(dir.path(), &fast_config()).unwrap();
        writer.stop();
        assert!(!writer.retire(dir.path().join("x.json"), || {}));
        assert_eq!(writer.pending_retirements(), 0);
    }

    #[test]
    fn enqueue_after_stop_is_dropped() {
        let dir = tempdir().unwrap();
        let writer = FileWriter::start(dir.path(), &fast_config()).unwrap();
        writer.stop();
        assert!(!writer.enqueue("late".to_string(), dir.path().join("x.json")));
        assert_eq!(writer.stats().dropped, 1);
    }

    #[test]
    fn periodic_flush_reaches_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flushed.json");
        let writer = FileWriter::start(dir.path(), &fast_config()).unwrap();
        writer.enqueue("hello".to_string(), path.clone());

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if fs::read_to_string(&path).is_ok_and(|s| s == "hello\n") {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn start_fails_when_dir_cannot_be_created() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain-file");
        fs::write(&file, "x").unwrap();
        let result = FileWriter::start(file.join("logs"), &fast_config());
        assert!(matches!(result, Err(LogError::Io(_))));
    }
}
