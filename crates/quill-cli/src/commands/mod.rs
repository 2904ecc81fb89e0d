//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`run`] - Pipeline over stdin
//! - [`cleanup`] - Retention sweep
//! - [`usage`] - Disk usage of a log directory
//! - [`channels`] - Built-in channel table
//! - [`init_config`] - Tier presets as TOML

pub mod channels;
pub mod cleanup;
pub mod init_config;
pub mod run;
pub mod usage;

pub use channels::ChannelsCommand;
pub use cleanup::CleanupCommand;
pub use init_config::InitConfigCommand;
pub use run::RunCommand;
pub use usage::UsageCommand;
