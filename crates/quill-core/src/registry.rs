//! Hierarchical channel registry with per-channel admission control.
//!
//! Channel names encode hierarchy with `.` (`Gameplay.Combat` is a child of
//! `Gameplay`). Each channel carries an operator-authored [`ChannelConfig`]
//! and derived [`EffectiveSettings`] resolved top-down through the parent
//! chain. Every mutation rebuilds the effective settings of the touched
//! channel and all of its descendants before the write lock is released.
//!
//! The hierarchy lives behind a reader/writer lock; each channel's token
//! bucket has its own mutex so admission checks on different channels never
//! contend.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::debug;

use crate::channels::{DEFAULT_CHANNEL, HIERARCHY_SEPARATOR, parent_name};
use crate::error::{LogError, Result};
use crate::token_bucket::TokenBucket;
use crate::types::{ChannelConfig, DisplayColor, RateLimit, Severity};

/// Settings in force for a channel after parent resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveSettings {
    /// Whether records are admitted at all.
    pub enabled: bool,
    /// Lowest admitted severity.
    pub min_severity: Severity,
    /// Display hint.
    pub color: DisplayColor,
    /// Rate limit; unset means unlimited.
    pub rate_limit: RateLimit,
    /// Records retained in memory.
    pub max_entries: usize,
}

impl EffectiveSettings {
    fn resolve(config: &ChannelConfig, parent: Option<&Self>) -> Self {
        match parent {
            Some(parent) if config.inherit_from_parent => Self {
                enabled: parent.enabled && config.enabled,
                min_severity: parent.min_severity.max(config.min_severity),
                color: if config.color == DisplayColor::default() {
                    parent.color
                } else {
                    config.color
                },
                rate_limit: if config.rate_limit.is_unset() {
                    parent.rate_limit
                } else {
                    config.rate_limit
                },
                max_entries: config.max_entries,
            },
            _ => Self {
                enabled: config.enabled,
                min_severity: config.min_severity,
                color: config.color,
                rate_limit: config.rate_limit,
                max_entries: config.max_entries,
            },
        }
    }

    /// Returns true if a record of `severity` passes the enabled/severity gate.
    #[must_use]
    pub fn admits(&self, severity: Severity) -> bool {
        self.enabled && severity >= self.min_severity
    }
}

/// Point-in-time view of one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelState {
    /// Channel name.
    pub name: String,
    /// Configured settings.
    pub config: ChannelConfig,
    /// Resolved settings.
    pub effective: EffectiveSettings,
    /// Tokens currently in the bucket.
    pub current_tokens: f64,
    /// Parent channel, if any.
    pub parent: Option<String>,
    /// Direct children, sorted.
    pub children: Vec<String>,
}

#[derive(Debug)]
struct ChannelEntry {
    config: ChannelConfig,
    effective: EffectiveSettings,
    parent: Option<String>,
    children: BTreeSet<String>,
    bucket: Arc<Mutex<TokenBucket>>,
}

impl ChannelEntry {
    fn new(config: ChannelConfig, parent: Option<String>) -> Self {
        let effective = EffectiveSettings::resolve(&config, None);
        let bucket = Arc::new(Mutex::new(TokenBucket::new(effective.rate_limit)));
        Self {
            config,
            effective,
            parent,
            children: BTreeSet::new(),
            bucket,
        }
    }
}

/// Registry of logging channels.
#[derive(Debug)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, ChannelEntry>>,
    default_config: ChannelConfig,
    version: AtomicU64,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

impl ChannelRegistry {
    /// Creates a registry holding only the `Default` channel.
    ///
    /// `default_config` is used for the `Default` channel and for parents
    /// that are registered implicitly.
    #[must_use]
    pub fn new(default_config: ChannelConfig) -> Self {
        let mut channels = HashMap::new();
        channels.insert(
            DEFAULT_CHANNEL.to_string(),
            ChannelEntry::new(default_config.clone(), None),
        );
        Self {
            channels: RwLock::new(channels),
            default_config,
            version: AtomicU64::new(0),
        }
    }

    /// Registers `name`, or replaces its config if already registered.
    ///
    /// Missing ancestors are registered first with the default config.
    pub fn register(&self, name: &str, config: ChannelConfig) -> Result<()> {
        validate_name(name)?;

        let mut channels = self.channels.write();
        self.ensure_ancestors(&mut channels, name);

        match channels.get_mut(name) {
            Some(entry) => entry.config = config,
            None => {
                let parent = parent_name(name).map(str::to_string);
                if let Some(parent) = &parent {
                    if let Some(parent_entry) = channels.get_mut(parent) {
                        parent_entry.children.insert(name.to_string());
                    }
                }
                channels.insert(name.to_string(), ChannelEntry::new(config, parent));
            }
        }

        rebuild_subtree(&mut channels, name);
        self.bump_version();
        debug!(channel = %name, "registered channel");
        Ok(())
    }

    fn ensure_ancestors(&self, channels: &mut HashMap<String, ChannelEntry>, name: &str) {
        let mut missing = Vec::new();
        let mut current = parent_name(name);
        while let Some(ancestor) = current {
            if channels.contains_key(ancestor) {
                break;
            }
            missing.push(ancestor);
            current = parent_name(ancestor);
        }

        // Outermost first so each ancestor finds its own parent in place.
        for ancestor in missing.into_iter().rev() {
            let parent = parent_name(ancestor).map(str::to_string);
            if let Some(parent) = &parent {
                if let Some(parent_entry) = channels.get_mut(parent) {
                    parent_entry.children.insert(ancestor.to_string());
                }
            }
            channels.insert(
                ancestor.to_string(),
                ChannelEntry::new(self.default_config.clone(), parent),
            );
            rebuild_subtree(channels, ancestor);
            debug!(channel = %ancestor, "implicitly registered parent channel");
        }
    }

    /// Removes `name`, re-parenting its children to its own parent.
    pub fn unregister(&self, name: &str) -> Result<()> {
        if name == DEFAULT_CHANNEL {
            return Err(LogError::ProtectedChannel(name.to_string()));
        }

        let mut channels = self.channels.write();
        let entry = channels
            .remove(name)
            .ok_or_else(|| LogError::ChannelNotFound(name.to_string()))?;

        if let Some(parent) = &entry.parent {
            if let Some(parent_entry) = channels.get_mut(parent) {
                parent_entry.children.remove(name);
                parent_entry.children.extend(entry.children.iter().cloned());
            }
        }
        for child in &entry.children {
            if let Some(child_entry) = channels.get_mut(child) {
                child_entry.parent.clone_from(&entry.parent);
            }
            rebuild_subtree(&mut channels, child);
        }

        self.bump_version();
        debug!(channel = %name, children = entry.children.len(), "unregistered channel");
        Ok(())
    }

    /// Replaces the config of a registered channel.
    pub fn update_config(&self, name: &str, config: ChannelConfig) -> Result<()> {
        let mut channels = self.channels.write();
        let entry = channels
            .get_mut(name)
            .ok_or_else(|| LogError::ChannelNotFound(name.to_string()))?;
        entry.config = config;
        rebuild_subtree(&mut channels, name);
        self.bump_version();
        Ok(())
    }

    /// Enables or disables a channel, optionally applying the same flag to
    /// every descendant's own config.
    pub fn set_enabled(&self, name: &str, enabled: bool, recursive: bool) -> Result<()> {
        self.edit_configs(name, recursive, |config| config.enabled = enabled)
    }

    /// Sets the minimum severity of a channel, optionally for every
    /// descendant as well.
    pub fn set_min_severity(&self, name: &str, severity: Severity, recursive: bool) -> Result<()> {
        self.edit_configs(name, recursive, |config| config.min_severity = severity)
    }

    fn edit_configs(
        &self,
        name: &str,
        recursive: bool,
        edit: impl Fn(&mut ChannelConfig),
    ) -> Result<()> {
        let mut channels = self.channels.write();
        if !channels.contains_key(name) {
            return Err(LogError::ChannelNotFound(name.to_string()));
        }

        let targets = if recursive {
            subtree(&channels, name)
        } else {
            vec![name.to_string()]
        };
        for target in &targets {
            if let Some(entry) = channels.get_mut(target) {
                edit(&mut entry.config);
            }
        }

        rebuild_subtree(&mut channels, name);
        self.bump_version();
        Ok(())
    }

    /// Admission check: enabled, severity and rate limit.
    ///
    /// Unknown channels are never admitted.
    pub fn can_log(&self, name: &str, severity: Severity) -> bool {
        let bucket = {
            let channels = self.channels.read();
            let Some(entry) = channels.get(name) else {
                return false;
            };
            if !entry.effective.admits(severity) {
                return false;
            }
            if entry.effective.rate_limit.is_unset() {
                return true;
            }
            Arc::clone(&entry.bucket)
        };
        bucket.lock().try_acquire()
    }

    /// Returns a snapshot of a channel.
    pub fn get_state(&self, name: &str) -> Option<ChannelState> {
        let channels = self.channels.read();
        let entry = channels.get(name)?;
        let current_tokens = entry.bucket.lock().tokens();
        Some(ChannelState {
            name: name.to_string(),
            config: entry.config.clone(),
            effective: entry.effective.clone(),
            current_tokens,
            parent: entry.parent.clone(),
            children: entry.children.iter().cloned().collect(),
        })
    }

    /// Returns the resolved settings of a channel.
    pub fn effective(&self, name: &str) -> Option<EffectiveSettings> {
        self.channels.read().get(name).map(|e| e.effective.clone())
    }

    /// Returns a channel's config, or the default config if unregistered.
    pub fn config(&self, name: &str) -> ChannelConfig {
        self.channels
            .read()
            .get(name)
            .map_or_else(|| self.default_config.clone(), |e| e.config.clone())
    }

    /// Returns every registered channel name, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<_> = self.channels.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the direct children of a channel.
    pub fn children(&self, name: &str) -> Result<Vec<String>> {
        self.channels
            .read()
            .get(name)
            .map(|e| e.children.iter().cloned().collect())
            .ok_or_else(|| LogError::ChannelNotFound(name.to_string()))
    }

    /// Returns the parent of a channel.
    pub fn parent(&self, name: &str) -> Result<Option<String>> {
        self.channels
            .read()
            .get(name)
            .map(|e| e.parent.clone())
            .ok_or_else(|| LogError::ChannelNotFound(name.to_string()))
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.channels.read().contains_key(name)
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Returns true if no channel is registered.
    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// Counter bumped on every mutation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.split(HIERARCHY_SEPARATOR).any(str::is_empty) {
        return Err(LogError::InvalidChannelName(name.to_string()));
    }
    Ok(())
}

/// Names of `root` and all its descendants, pre-order.
fn subtree(channels: &HashMap<String, ChannelEntry>, root: &str) -> Vec<String> {
    let mut order = Vec::new();
    let mut stack = vec![root.to_string()];
    while let Some(name) = stack.pop() {
        if let Some(entry) = channels.get(&name) {
            stack.extend(entry.children.iter().rev().cloned());
            order.push(name);
        }
    }
    order
}

/// Re-resolves effective settings for `root` and every descendant, parents
/// before children.
fn rebuild_subtree(channels: &mut HashMap<String, ChannelEntry>, root: &str) {
    for name in subtree(channels, root) {
        let parent_effective = channels
            .get(&name)
            .and_then(|e| e.parent.as_ref())
            .and_then(|p| channels.get(p))
            .map(|p| p.effective.clone());

        if let Some(entry) = channels.get_mut(&name) {
            let effective = EffectiveSettings::resolve(&entry.config, parent_effective.as_ref());
            if effective.rate_limit != entry.effective.rate_limit {
                entry.bucket.lock().reconfigure(effective.rate_limit);
            }
            entry.effective = effective;
        }
    }
}
