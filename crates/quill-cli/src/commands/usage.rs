//! Disk usage command implementation.

use std::fs;
use std::io::Write;

use quill_core::FileNaming;

use crate::cli::UsageArgs;
use crate::error::CliError;
use crate::output::{FileUsage, OutputFormat, UsageReport};

/// Usage command executor.
#[derive(Debug, Default)]
pub struct UsageCommand;

impl UsageCommand {
    /// Create a new usage command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute the usage command.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or output fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &UsageArgs,
    ) -> Result<(), CliError> {
        let report = Self::scan(args)?;
        format.write(writer, &report)
    }

    /// Lists the log files in `args.dir` whose names follow the naming
    /// scheme.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix is invalid or the directory cannot be
    /// read.
    pub fn scan(args: &UsageArgs) -> Result<UsageReport, CliError> {
        let naming = FileNaming::new(&args.prefix)?;
        let mut files = Vec::new();

        for entry in fs::read_dir(&args.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(parsed) = naming.parse(&name) else {
                continue;
            };
            let size = entry.metadata()?.len();
            files.push(FileUsage {
                name,
                channel: parsed.channel,
                date: parsed.date,
                index: parsed.index,
                size,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(UsageReport {
            dir: args.dir.clone(),
            total_bytes: files.iter().map(|f| f.size).sum(),
            files,
        })
    }
}
