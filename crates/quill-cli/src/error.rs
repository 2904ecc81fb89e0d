//! CLI error types.

use std::fmt;

use quill_core::LogError;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// Invalid configuration.
    Config(String),
    /// Output formatting error.
    Format(String),
    /// Invalid argument.
    InvalidArgument(String),
    /// Pipeline error.
    Log(LogError),
    /// IO error.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Format(msg) => write!(f, "format error: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Log(e) => write!(f, "logging error: {e}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Log(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<LogError> for CliError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::ConfigInvalid(msg) => Self::Config(msg),
            other => Self::Log(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_error_display_invalid_argument() {
        let err = CliError::InvalidArgument("retention days must be positive".into());
        assert_eq!(
            err.to_string(),
            "invalid argument: retention days must be positive"
        );
    }

    #[test]
    fn cli_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err = CliError::from(io_err);
        assert!(matches!(cli_err, CliError::Io(_)));
    }

    #[test]
    fn config_errors_become_config_variant() {
        let err = CliError::from(LogError::ConfigInvalid("queue.capacity".into()));
        assert_eq!(err.to_string(), "configuration error: queue.capacity");
    }

    #[test]
    fn log_errors_keep_source() {
        use std::error::Error;
        let err = CliError::from(LogError::ChannelNotFound("Nowhere".into()));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "logging error: channel not found: Nowhere");
    }
}
