//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;
use std::path::PathBuf;

use chrono::NaiveDate;
use quill_core::{CleanupReport, Diagnostics};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Formats a byte count with a binary unit.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Result of a `run` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Lines read from input.
    pub lines_read: u64,
    /// Records queued.
    pub accepted: u64,
    /// Records refused by admission control.
    pub rejected: u64,
    /// Records dropped on a full queue.
    pub dropped: u64,
    /// Every record was drained before shutdown.
    pub drained: bool,
    /// Pipeline state just before shutdown.
    pub diagnostics: Diagnostics,
}

impl TableDisplay for RunSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let d = &self.diagnostics;
        writeln!(writer, "Pipeline Run")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Lines Read:       {}", self.lines_read)?;
        writeln!(writer, "Accepted:         {}", self.accepted)?;
        writeln!(writer, "Rejected:         {}", self.rejected)?;
        writeln!(writer, "Dropped:          {}", self.dropped)?;
        writeln!(writer, "Drained:          {}", if self.drained { "yes" } else { "no" })?;
        writeln!(writer)?;
        writeln!(writer, "Queue")?;
        writeln!(writer, "  Processed:      {}", d.queue.processed)?;
        writeln!(writer, "  Batches:        {}", d.queue.batches)?;
        writeln!(writer, "  Process Time:   {} us", d.queue.process_time_us)?;
        writeln!(writer)?;
        writeln!(writer, "Memory")?;
        writeln!(
            writer,
            "  Used:           {} / {} ({:.1}%)",
            format_bytes(d.memory.used_bytes),
            format_bytes(d.memory.budget_bytes),
            d.memory.usage_percent
        )?;
        writeln!(writer, "  Entries:        {}", d.memory.entries)?;
        writeln!(writer, "  Trim Events:    {}", d.memory.trim_events)?;
        writeln!(writer, "  Health:         {:?}", d.memory.health)?;
        if let Some(w) = &d.writer {
            writeln!(writer)?;
            writeln!(writer, "Writer")?;
            writeln!(writer, "  Lines Written:  {}", w.writes)?;
            writeln!(writer, "  Failed:         {}", w.failed_writes)?;
            writeln!(writer, "  Bytes:          {}", format_bytes(w.bytes_written))?;
        }
        writeln!(writer)?;
        writeln!(writer, "Files")?;
        writeln!(writer, "  Rotations:      {}", d.rotation.total_rotations)?;
        writeln!(writer, "  Active:         {}", d.rotation.active_files)?;
        writeln!(writer, "  Disk Usage:     {}", format_bytes(d.rotation.disk_usage))?;
        Ok(())
    }
}

/// One file affected by a cleanup.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupEntry {
    /// File path.
    pub path: PathBuf,
    /// Date attributed to the file.
    pub date: NaiveDate,
    /// Size in bytes.
    pub size: u64,
}

/// Result of a `cleanup` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupSummary {
    /// Directory swept.
    pub dir: PathBuf,
    /// Nothing was deleted.
    pub dry_run: bool,
    /// Files past the retention window.
    pub expired: Vec<CleanupEntry>,
    /// Sweep counters; absent on a dry run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<CleanupReport>,
}

impl TableDisplay for CleanupSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.expired.is_empty() {
            writeln!(writer, "No expired log files in {}.", self.dir.display())?;
            return Ok(());
        }
        writeln!(writer, "{:<12} {:>10}  PATH", "DATE", "SIZE")?;
        writeln!(writer, "{}", "─".repeat(60))?;
        for entry in &self.expired {
            writeln!(
                writer,
                "{:<12} {:>10}  {}",
                entry.date.format("%Y-%m-%d"),
                format_bytes(entry.size),
                entry.path.display()
            )?;
        }
        writeln!(writer)?;
        match &self.report {
            Some(report) if report.skipped => {
                writeln!(writer, "Cleanup skipped: invalid rotation settings.")?;
            }
            Some(report) => {
                writeln!(
                    writer,
                    "Deleted {} file(s), freed {}, {} failure(s).",
                    report.files_deleted,
                    format_bytes(report.bytes_freed),
                    report.failures
                )?;
            }
            None => writeln!(writer, "Dry run: {} file(s) would be deleted.", self.expired.len())?,
        }
        Ok(())
    }
}

/// One log file in a usage listing.
#[derive(Debug, Clone, Serialize)]
pub struct FileUsage {
    /// File name.
    pub name: String,
    /// Channel parsed from the name.
    pub channel: String,
    /// Date parsed from the name.
    pub date: NaiveDate,
    /// Rotation index parsed from the name.
    pub index: u32,
    /// Size in bytes.
    pub size: u64,
}

/// Result of a `usage` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    /// Directory inspected.
    pub dir: PathBuf,
    /// Total bytes of log files.
    pub total_bytes: u64,
    /// Log files, sorted by name.
    pub files: Vec<FileUsage>,
}

impl TableDisplay for UsageReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.files.is_empty() {
            writeln!(writer, "No log files in {}.", self.dir.display())?;
            return Ok(());
        }
        writeln!(
            writer,
            "{:<16} {:<12} {:>5} {:>10}  NAME",
            "CHANNEL", "DATE", "INDEX", "SIZE"
        )?;
        writeln!(writer, "{}", "─".repeat(72))?;
        for file in &self.files {
            writeln!(
                writer,
                "{:<16} {:<12} {:>5} {:>10}  {}",
                file.channel,
                file.date.format("%Y-%m-%d"),
                file.index,
                format_bytes(file.size),
                file.name
            )?;
        }
        writeln!(writer)?;
        writeln!(
            writer,
            "{} file(s), {} total",
            self.files.len(),
            format_bytes(self.total_bytes)
        )?;
        Ok(())
    }
}

/// One row of the channel table.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelRow {
    /// Channel name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Reserved for the pipeline.
    pub reserved: bool,
    /// Registered on start.
    pub auto_register: bool,
}

/// The channel table.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct ChannelList(pub Vec<ChannelRow>);

impl TableDisplay for ChannelList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "{:<12} {:<9} {:<5} DESCRIPTION", "NAME", "RESERVED", "AUTO")?;
        writeln!(writer, "{}", "─".repeat(64))?;
        for row in &self.0 {
            writeln!(
                writer,
                "{:<12} {:<9} {:<5} {}",
                row.name,
                if row.reserved { "yes" } else { "no" },
                if row.auto_register { "yes" } else { "no" },
                row.description
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage() -> UsageReport {
        UsageReport {
            dir: PathBuf::from("logs"),
            total_bytes: 3072,
            files: vec![FileUsage {
                name: "quill_Network_20240309_001.json".into(),
                channel: "Network".into(),
                date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
                index: 1,
                size: 3072,
            }],
        }
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(50 * 1024 * 1024), "50.0 MiB");
    }

    #[test]
    fn usage_table() {
        let text = OutputFormat::default().to_string(&usage()).unwrap();
        assert!(text.contains("Network"));
        assert!(text.contains("2024-03-09"));
        assert!(text.contains("3.0 KiB"));
        assert!(text.contains("1 file(s)"));
    }

    #[test]
    fn usage_json() {
        let format = OutputFormat::new(Format::Json);
        assert!(format.is_json());
        let text = format.to_string(&usage()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["total_bytes"], 3072);
        assert_eq!(value["files"][0]["index"], 1);
    }

    #[test]
    fn empty_cleanup_table() {
        let summary = CleanupSummary {
            dir: PathBuf::from("logs"),
            dry_run: true,
            expired: Vec::new(),
            report: None,
        };
        let text = OutputFormat::default().to_string(&summary).unwrap();
        assert_eq!(text, "No expired log files in logs.\n");
    }

    #[test]
    fn channel_list_json_is_array() {
        let list = ChannelList(vec![ChannelRow {
            name: "UI".into(),
            description: "Widgets".into(),
            reserved: false,
            auto_register: true,
        }]);
        let text = OutputFormat::new(Format::Json).to_string(&list).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["name"], "UI");
    }
}
