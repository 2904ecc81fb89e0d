//! Built-in channel table.
//!
//! Channels are described by data, not code: adding one means adding a row
//! to [`CHANNELS`] (or listing it under `extra_channels` in the config).

use serde::Serialize;

/// Name of the channel that always exists in the registry.
pub const DEFAULT_CHANNEL: &str = "Default";

/// Name of the catch-all aggregation channel. It is stored in memory but
/// never written to its own file.
pub const AGGREGATE_CHANNEL: &str = "All";

/// Separator between parent and child in hierarchical channel names.
pub const HIERARCHY_SEPARATOR: char = '.';

/// One row of the channel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelDescriptor {
    /// Channel name.
    pub name: &'static str,
    /// Short human description.
    pub description: &'static str,
    /// Reserved for the pipeline's own use.
    pub reserved: bool,
    /// Registered automatically when the pipeline starts.
    pub auto_register: bool,
}

const fn channel(name: &'static str, description: &'static str) -> ChannelDescriptor {
    ChannelDescriptor {
        name,
        description,
        reserved: false,
        auto_register: true,
    }
}

/// Every channel known to the pipeline.
pub const CHANNELS: &[ChannelDescriptor] = &[
    ChannelDescriptor {
        name: DEFAULT_CHANNEL,
        description: "Fallback channel, always registered",
        reserved: true,
        auto_register: true,
    },
    ChannelDescriptor {
        name: AGGREGATE_CHANNEL,
        description: "Catch-all aggregation, kept in memory only",
        reserved: true,
        auto_register: true,
    },
    channel("Gameplay", "Game rules and player actions"),
    channel("Network", "Connections, replication and transport"),
    channel("Performance", "Timings, budgets and hitches"),
    channel("Debug", "Developer diagnostics"),
    channel("AI", "Decision making and navigation"),
    channel("Physics", "Simulation and collision"),
    channel("Audio", "Playback and mixing"),
    channel("Animation", "Skeletal and state-machine animation"),
    channel("UI", "Widgets and input focus"),
    ChannelDescriptor {
        name: "Subsystem",
        description: "Pipeline-internal notices",
        reserved: true,
        auto_register: true,
    },
    ChannelDescriptor {
        name: "Custom",
        description: "Application-defined records",
        reserved: false,
        auto_register: false,
    },
];

/// Looks up a channel descriptor by exact name.
#[must_use]
pub fn descriptor(name: &str) -> Option<&'static ChannelDescriptor> {
    CHANNELS.iter().find(|d| d.name == name)
}

/// Returns the top-level segment of a hierarchical name.
#[must_use]
pub fn root_segment(name: &str) -> &str {
    name.split(HIERARCHY_SEPARATOR).next().unwrap_or(name)
}

/// Returns the parent of a hierarchical name, if any.
#[must_use]
pub fn parent_name(name: &str) -> Option<&str> {
    name.rfind(HIERARCHY_SEPARATOR).map(|idx| &name[..idx])
}

/// Channels registered at startup.
pub fn auto_registered() -> impl Iterator<Item = &'static ChannelDescriptor> {
    CHANNELS.iter().filter(|d| d.auto_register)
}

/// Allow-list of channel names accepted by the store.
///
/// A hierarchical name is allowed when its root segment is.
#[derive(Debug, Clone, Default)]
pub struct ChannelAllowList {
    extra: Vec<String>,
}

impl ChannelAllowList {
    /// Creates an allow-list of the built-in table plus `extra` names.
    #[must_use]
    pub fn new(extra: Vec<String>) -> Self {
        Self { extra }
    }

    /// Returns true if records on `name` may be stored.
    #[must_use]
    pub fn is_allowed(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let root = root_segment(name);
        descriptor(root).is_some() || self.extra.iter().any(|e| e == root)
    }
}
