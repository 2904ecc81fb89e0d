//! Consumer side of the ingestion queue.
//!
//! The processor thread drains records in batches, stores them under the
//! memory budget and forwards a formatted line for each persisted channel to
//! the file writer.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, bounded};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::channels::AGGREGATE_CHANNEL;
use crate::error::{LogError, Result};
use crate::format::JsonFormatter;
use crate::queue::IngestionQueue;
use crate::registry::ChannelRegistry;
use crate::rotation::LogRotator;
use crate::store::{InsertOutcome, LogStore};
use crate::types::LogRecord;
use crate::writer::FileWriter;

/// Everything one record touches on its way from the queue to storage.
#[derive(Debug)]
pub(crate) struct RecordSink {
    pub(crate) registry: Arc<ChannelRegistry>,
    pub(crate) store: Arc<LogStore>,
    pub(crate) rotator: Arc<LogRotator>,
    pub(crate) writer: Option<Arc<FileWriter>>,
    pub(crate) formatter: JsonFormatter,
    pub(crate) log_dir: PathBuf,
}

impl RecordSink {
    /// Stores one record and, when it was stored, hands its line to the
    /// writer.
    pub(crate) fn handle(&self, record: LogRecord) -> InsertOutcome {
        let max_entries = self.registry.effective(record.channel()).map_or_else(
            || self.registry.config(record.channel()).max_entries,
            |settings| settings.max_entries,
        );

        let line = match &self.writer {
            Some(_) if record.channel() != AGGREGATE_CHANNEL => match self.formatter.format(&record) {
                Ok(line) => Some(line),
                Err(e) => {
                    warn!(channel = %record.channel(), error = %e, "failed to format record");
                    None
                }
            },
            _ => None,
        };
        let channel = record.channel().to_string();

        let outcome = self.store.insert(record, max_entries);
        if let (InsertOutcome::Stored { .. }, Some(line), Some(writer)) = (outcome, line, &self.writer) {
            self.persist(writer, &channel, line);
        }
        outcome
    }

    fn persist(&self, writer: &FileWriter, channel: &str, line: String) {
        let mut path = self.rotator.active_file_path(channel, &self.log_dir);
        if self.rotator.should_rotate(channel, &path) {
            path = self.rotator.rotate(channel, &path);
            retire_evicted(&self.rotator, Some(writer));
        }
        let bytes = line.len() as u64 + 1;
        if writer.enqueue(line, path.clone()) {
            self.rotator.record_write(channel, &path, bytes);
        }
    }
}

/// Deletes the files the daily cap evicted.
///
/// With a writer, each deletion is queued behind the lines already waiting
/// for that file so nothing is written to, or recreates, a deleted path.
pub(crate) fn retire_evicted(rotator: &Arc<LogRotator>, writer: Option<&FileWriter>) {
    for info in rotator.take_evicted() {
        let Some(writer) = writer else {
            rotator.delete_evicted(&info);
            continue;
        };
        let owner = Arc::clone(rotator);
        let pending = info.clone();
        if writer.retire(info.path.clone(), move || owner.delete_evicted(&pending)) {
            continue;
        }
        if writer.is_running() {
            warn!(path = %info.path.display(), "write queue full; evicted log file left for retention");
        } else {
            rotator.delete_evicted(&info);
        }
    }
}

/// Tunables of the processor loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProcessorSettings {
    pub(crate) batch_size: usize,
    pub(crate) idle_wait: Duration,
}

/// Running processor thread. Stopping performs one final full drain.
#[derive(Debug)]
pub(crate) struct Processor {
    stop: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Processor {
    /// Spawns the processor thread.
    pub(crate) fn spawn(
        queue: Arc<IngestionQueue>,
        sink: Arc<RecordSink>,
        settings: ProcessorSettings,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("quill-processor".to_string())
            .spawn(move || {
                let batch_size = settings.batch_size.max(1);
                let mut batch = Vec::with_capacity(batch_size);
                while queue.wait_batch(&mut batch, batch_size, settings.idle_wait, &stop_rx) {
                    process_batch(&queue, &sink, &mut batch);
                }

                // Final drain: everything accepted before stop is processed.
                while queue.drain_into(&mut batch, batch_size) > 0 {
                    process_batch(&queue, &sink, &mut batch);
                }
                debug!("processor thread stopped");
            })
            .map_err(|source| LogError::ThreadStart {
                stage: "processor",
                source,
            })?;

        Ok(Self {
            stop: Mutex::new(Some(stop_tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Returns true until [`Processor::stop`] has been called.
    pub(crate) fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Signals stop and joins the thread. Safe to call more than once.
    pub(crate) fn stop(&self) {
        drop(self.stop.lock().take());
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("processor thread panicked");
            }
        }
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn process_batch(queue: &IngestionQueue, sink: &RecordSink, batch: &mut Vec<LogRecord>) {
    if batch.is_empty() {
        return;
    }
    let started = Instant::now();
    let count = batch.len();
    for record in batch.drain(..) {
        sink.handle(record);
    }
    queue.note_batch(count, started.elapsed());
}
