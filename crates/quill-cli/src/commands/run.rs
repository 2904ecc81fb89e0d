//! Pipeline run command implementation.
//!
//! Starts a pipeline, logs every input line as one record on the chosen
//! channel, drains, shuts down and prints the final diagnostics.

use std::io::{BufRead, Write};
use std::time::Duration;

use quill_core::{Pipeline, QuillConfig, SubmitOutcome};
use tracing::{debug, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{OutputFormat, RunSummary};

/// Run command executor.
#[derive(Debug, Default)]
pub struct RunCommand;

impl RunCommand {
    /// Create a new run command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute the run command, reading records from `input`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid, reading input fails or
    /// output fails.
    pub fn execute<R: BufRead, W: Write>(
        &self,
        input: R,
        writer: &mut W,
        format: &OutputFormat,
        args: &RunArgs,
    ) -> Result<(), CliError> {
        let summary = Self::pump(input, args)?;
        format.write(writer, &summary)
    }

    /// Feeds `input` through a pipeline built from `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or reading input fails.
    pub fn pump<R: BufRead>(input: R, args: &RunArgs) -> Result<RunSummary, CliError> {
        let mut config = match &args.config {
            Some(path) => QuillConfig::from_file(path)?,
            None => QuillConfig::default(),
        };
        if let Some(dir) = &args.dir {
            config.log_directory = Some(dir.clone());
        }

        let pipeline = Pipeline::start(config)?;
        if !pipeline.channels().contains(&args.channel) {
            pipeline.register_channel(&args.channel, pipeline.config().default_channel.clone())?;
        }

        let (mut lines_read, mut accepted, mut rejected, mut dropped) = (0, 0, 0, 0);
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            lines_read += 1;
            match pipeline.log(&args.channel, args.severity, line) {
                SubmitOutcome::Accepted => accepted += 1,
                SubmitOutcome::Rejected => rejected += 1,
                SubmitOutcome::Dropped => dropped += 1,
            }
        }

        let drained = pipeline.flush(Duration::from_secs(args.flush_timeout));
        if !drained {
            warn!(timeout_secs = args.flush_timeout, "pipeline did not drain before timeout");
        }
        let diagnostics = pipeline.diagnostics();
        pipeline.shutdown();
        debug!(summary = %diagnostics.summary(), "run finished");

        Ok(RunSummary {
            lines_read,
            accepted,
            rejected,
            dropped,
            drained,
            diagnostics,
        })
    }
}
