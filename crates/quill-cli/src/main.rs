//! quill CLI binary entrypoint.
//!
//! This is the main entry point for the `quill` command-line tool.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use quill_cli::cli::{Cli, Commands, LogFormat};
use quill_cli::commands::{
    ChannelsCommand, CleanupCommand, InitConfigCommand, RunCommand, UsageCommand,
};
use quill_cli::output::OutputFormat;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr);
    match cli.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), quill_cli::CliError> {
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Run(args) => {
            let cmd = RunCommand::new();
            cmd.execute(io::stdin().lock(), &mut stdout, &format, &args)?;
        }
        Commands::Cleanup(args) => {
            let cmd = CleanupCommand::new();
            cmd.execute(&mut stdout, &format, &args)?;
        }
        Commands::Usage(args) => {
            let cmd = UsageCommand::new();
            cmd.execute(&mut stdout, &format, &args)?;
        }
        Commands::Channels => {
            let cmd = ChannelsCommand::new();
            cmd.execute(&mut stdout, &format)?;
        }
        Commands::InitConfig(args) => {
            let cmd = InitConfigCommand::new();
            cmd.execute(&mut stdout, &args)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_cli::cli::Format;

    #[test]
    fn cli_parses_channels() {
        let cli = Cli::parse_from(["quill", "channels"]);
        assert!(matches!(cli.command, Commands::Channels));
    }

    #[test]
    fn cli_respects_format_flag() {
        let cli = Cli::parse_from(["quill", "--format", "json", "channels"]);
        assert_eq!(cli.format, Format::Json);
    }

    #[test]
    fn cli_log_format_is_global() {
        let cli = Cli::parse_from(["quill", "channels", "--log-format", "json"]);
        assert_eq!(cli.log_format, LogFormat::Json);
        let cli = Cli::parse_from(["quill", "channels"]);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn run_usage_on_missing_dir_fails() {
        let cli = Cli::parse_from(["quill", "usage", "--dir", "/nonexistent/quill-logs"]);
        assert!(run(cli).is_err());
    }
}
