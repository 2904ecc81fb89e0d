//! Config preset command implementation.
//!
//! Always emits TOML, whatever `--format` says: the output is meant to be
//! saved and edited.

use std::fs;
use std::io::Write;

use quill_core::QuillConfig;
use tracing::info;

use crate::cli::InitConfigArgs;
use crate::error::CliError;

/// Init-config command executor.
#[derive(Debug, Default)]
pub struct InitConfigCommand;

impl InitConfigCommand {
    /// Create a new init-config command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute the init-config command.
    ///
    /// # Errors
    ///
    /// Returns an error if the output file exists without `--force`, or if
    /// writing fails.
    pub fn execute<W: Write>(&self, writer: &mut W, args: &InitConfigArgs) -> Result<(), CliError> {
        let config = QuillConfig::for_tier(args.tier.into());
        let text = config.to_toml()?;

        match &args.output {
            Some(path) => {
                if path.exists() && !args.force {
                    return Err(CliError::InvalidArgument(format!(
                        "{} already exists (use --force to overwrite)",
                        path.display()
                    )));
                }
                fs::write(path, &text)?;
                info!(path = %path.display(), tier = %config.tier, "wrote config");
                writeln!(writer, "Wrote {} preset to {}", config.tier, path.display())?;
            }
            None => writer.write_all(text.as_bytes())?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Tier;
    use quill_core::ConfigTier;
    use tempfile::tempdir;

    fn args(tier: Tier) -> InitConfigArgs {
        InitConfigArgs {
            tier,
            output: None,
            force: false,
        }
    }

    #[test]
    fn stdout_output_parses_back() {
        let mut out = Vec::new();
        InitConfigCommand::new()
            .execute(&mut out, &args(Tier::Production))
            .unwrap();
        let config = QuillConfig::from_toml(&String::from_utf8(out).unwrap()).unwrap();
        assert_eq!(config, QuillConfig::for_tier(ConfigTier::Production));
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quill.toml");
        fs::write(&path, "# mine").unwrap();

        let mut first = args(Tier::Debug);
        first.output = Some(path.clone());
        let err = InitConfigCommand::new()
            .execute(&mut Vec::new(), &first)
            .unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "# mine");

        first.force = true;
        InitConfigCommand::new()
            .execute(&mut Vec::new(), &first)
            .unwrap();
        assert_eq!(
            QuillConfig::from_file(&path).unwrap().tier,
            ConfigTier::Debug
        );
    }
}
