//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use quill_core::{ConfigTier, Severity};

/// quill - structured logging pipeline tools.
#[derive(Parser, Debug, Clone)]
#[command(name = "quill")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Format of diagnostics written to stderr.
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Diagnostic log formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Plain text lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Tier preset names accepted on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Tier {
    /// Small buffers, warnings and above.
    Production,
    /// Balanced defaults.
    #[default]
    Development,
    /// Large buffers, pretty JSON.
    Debug,
}

impl From<Tier> for ConfigTier {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Production => Self::Production,
            Tier::Development => Self::Development,
            Tier::Debug => Self::Debug,
        }
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the pipeline over stdin, one record per line.
    Run(RunArgs),

    /// Delete log files older than the retention window.
    Cleanup(CleanupArgs),

    /// Show disk usage of a log directory.
    Usage(UsageArgs),

    /// List the built-in channel table.
    Channels,

    /// Print a tier preset as TOML.
    InitConfig(InitConfigArgs),
}

/// Arguments for the run command.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Configuration file (TOML).
    #[arg(short, long, env = "QUILL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log directory, overriding the config.
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Channel records are logged on.
    #[arg(long, default_value = "Default")]
    pub channel: String,

    /// Severity of every record.
    #[arg(short, long, default_value = "info")]
    pub severity: Severity,

    /// Seconds to wait for records to drain before shutting down.
    #[arg(long, default_value_t = 10)]
    pub flush_timeout: u64,
}

/// Arguments for the cleanup command.
#[derive(Parser, Debug, Clone)]
pub struct CleanupArgs {
    /// Log directory to sweep.
    #[arg(short, long, default_value = "logs")]
    pub dir: PathBuf,

    /// Keep files from the last N days.
    #[arg(short, long, default_value_t = 7)]
    pub retention_days: u32,

    /// File name prefix.
    #[arg(short, long, default_value = "quill")]
    pub prefix: String,

    /// List expired files without deleting them.
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the usage command.
#[derive(Parser, Debug, Clone)]
pub struct UsageArgs {
    /// Log directory to inspect.
    #[arg(short, long, default_value = "logs")]
    pub dir: PathBuf,

    /// File name prefix.
    #[arg(short, long, default_value = "quill")]
    pub prefix: String,
}

/// Arguments for the init-config command.
#[derive(Parser, Debug, Clone)]
pub struct InitConfigArgs {
    /// Preset to emit.
    #[arg(short, long, value_enum, default_value_t = Tier::Development)]
    pub tier: Tier,

    /// Write to a file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite an existing output file.
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_default_is_table() {
        let cli = Cli::parse_from(["quill", "channels"]);
        assert_eq!(cli.format, Format::Table);
    }

    #[test]
    fn run_args_parse() {
        let cli = Cli::parse_from([
            "quill", "run", "--channel", "Network", "-s", "warning", "-d", "/tmp/logs",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.channel, "Network");
                assert_eq!(args.severity, Severity::Warning);
                assert_eq!(args.dir, Some(PathBuf::from("/tmp/logs")));
                assert_eq!(args.flush_timeout, 10);
            }
            other => panic!("expected run command, got {other:?}"),
        }
    }

    #[test]
    fn run_rejects_unknown_severity() {
        assert!(Cli::try_parse_from(["quill", "run", "-s", "loud"]).is_err());
    }

    #[test]
    fn cleanup_defaults() {
        let cli = Cli::parse_from(["quill", "cleanup"]);
        match cli.command {
            Commands::Cleanup(args) => {
                assert_eq!(args.dir, PathBuf::from("logs"));
                assert_eq!(args.retention_days, 7);
                assert_eq!(args.prefix, "quill");
                assert!(!args.dry_run);
            }
            other => panic!("expected cleanup command, got {other:?}"),
        }
    }

    #[test]
    fn init_config_tier() {
        let cli = Cli::parse_from(["quill", "--format", "json", "init-config", "--tier", "debug"]);
        assert_eq!(cli.format, Format::Json);
        match cli.command {
            Commands::InitConfig(args) => {
                assert_eq!(ConfigTier::from(args.tier), ConfigTier::Debug);
                assert!(args.output.is_none());
            }
            other => panic!("expected init-config command, got {other:?}"),
        }
    }
}
