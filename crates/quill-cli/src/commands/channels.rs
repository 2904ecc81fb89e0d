//! Channel table command implementation.

use std::io::Write;

use quill_core::CHANNELS;

use crate::error::CliError;
use crate::output::{ChannelList, ChannelRow, OutputFormat};

/// Channels command executor.
#[derive(Debug, Default)]
pub struct ChannelsCommand;

impl ChannelsCommand {
    /// Create a new channels command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute the channels command.
    ///
    /// # Errors
    ///
    /// Returns an error if output fails.
    pub fn execute<W: Write>(&self, writer: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        format.write(writer, &Self::list())
    }

    /// The built-in channel table.
    #[must_use]
    pub fn list() -> ChannelList {
        ChannelList(
            CHANNELS
                .iter()
                .map(|d| ChannelRow {
                    name: d.name.to_string(),
                    description: d.description.to_string(),
                    reserved: d.reserved,
                    auto_register: d.auto_register,
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_channel() {
        let list = ChannelsCommand::list();
        assert_eq!(list.0.len(), CHANNELS.len());
        let custom = list.0.iter().find(|r| r.name == "Custom").unwrap();
        assert!(!custom.auto_register);
    }

    #[test]
    fn table_output() {
        let mut out = Vec::new();
        ChannelsCommand::new()
            .execute(&mut out, &OutputFormat::default())
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("NAME"));
        assert!(text.contains("Subsystem"));
    }
}
