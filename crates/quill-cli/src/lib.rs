//! # quill-cli
//!
//! Command-line front-end for the quill logging pipeline.
//!
//! Provides commands for:
//! - Running the pipeline over stdin
//! - Retention sweeps of a log directory
//! - Disk usage reports
//! - Inspecting the channel table
//! - Generating tier preset configs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{
    CleanupArgs, Cli, Commands, Format, InitConfigArgs, LogFormat, RunArgs, Tier, UsageArgs,
};
pub use error::CliError;
pub use output::OutputFormat;
