//! Retention sweep command implementation.

use std::io::Write;
use std::sync::Arc;

use quill_core::{LogRotator, RetentionManager, RotationConfig};

use crate::cli::CleanupArgs;
use crate::error::CliError;
use crate::output::{CleanupEntry, CleanupSummary, OutputFormat};

/// Cleanup command executor.
#[derive(Debug, Default)]
pub struct CleanupCommand;

impl CleanupCommand {
    /// Create a new cleanup command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute the cleanup command.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are invalid or output fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &CleanupArgs,
    ) -> Result<(), CliError> {
        let summary = Self::sweep(args)?;
        format.write(writer, &summary)
    }

    /// Runs the sweep described by `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing or the arguments are
    /// invalid.
    pub fn sweep(args: &CleanupArgs) -> Result<CleanupSummary, CliError> {
        if args.retention_days == 0 {
            return Err(CliError::InvalidArgument(
                "retention days must be greater than 0".to_string(),
            ));
        }
        if !args.dir.is_dir() {
            return Err(CliError::InvalidArgument(format!(
                "{} is not a directory",
                args.dir.display()
            )));
        }

        let config = RotationConfig {
            retention_days: args.retention_days,
            ..RotationConfig::default()
        };
        let rotator = Arc::new(LogRotator::new(config, &args.prefix)?);
        let retention = RetentionManager::new(rotator);

        let expired = retention
            .expired_files(&args.dir)
            .into_iter()
            .map(|f| CleanupEntry {
                path: f.path,
                date: f.date,
                size: f.size,
            })
            .collect();
        let report = (!args.dry_run).then(|| retention.perform_cleanup(&args.dir));

        Ok(CleanupSummary {
            dir: args.dir.clone(),
            dry_run: args.dry_run,
            expired,
            report,
        })
    }
}
