//! Short-lived read-through cache of resolved channel settings.
//!
//! Entries are served while both hold: the registry version has not moved
//! since the entry was fetched, and the entry is younger than the TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::registry::{ChannelRegistry, EffectiveSettings};
use crate::types::Severity;

/// Default lifetime of a cached entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct CachedSettings {
    settings: EffectiveSettings,
    version: u64,
    fetched_at: Instant,
}

/// Read-through cache in front of a [`ChannelRegistry`].
#[derive(Debug)]
pub struct ChannelStateCache {
    registry: Arc<ChannelRegistry>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedSettings>>,
}

impl ChannelStateCache {
    /// Creates a cache with the given TTL.
    #[must_use]
    pub fn new(registry: Arc<ChannelRegistry>, ttl: Duration) -> Self {
        Self {
            registry,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the resolved settings for `name`, fetching from the registry
    /// on a miss or when stale.
    pub fn get(&self, name: &str) -> Option<EffectiveSettings> {
        let version = self.registry.version();
        let now = Instant::now();

        if let Some(cached) = self.entries.lock().get(name) {
            if cached.version == version && now.duration_since(cached.fetched_at) < self.ttl {
                return Some(cached.settings.clone());
            }
        }

        let Some(settings) = self.registry.effective(name) else {
            self.entries.lock().remove(name);
            return None;
        };
        self.entries.lock().insert(
            name.to_string(),
            CachedSettings {
                settings: settings.clone(),
                version,
                fetched_at: now,
            },
        );
        Some(settings)
    }

    /// Cheap enabled/severity pre-check. Does not touch the rate limiter.
    pub fn admits(&self, name: &str, severity: Severity) -> bool {
        self.get(name).is_some_and(|s| s.admits(severity))
    }

    /// Drops every cached entry.
    pub fn invalidate(&self) {
        self.entries.lock().clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelConfig;

    fn cache_with(ttl: Duration) -> (Arc<ChannelRegistry>, ChannelStateCache) {
        let registry = Arc::new(ChannelRegistry::default());
        registry.register("Physics", ChannelConfig::default()).unwrap();
        let cache = ChannelStateCache::new(Arc::clone(&registry), ttl);
        (registry, cache)
    }

    #[test]
    fn miss_then_hit() {
        let (_registry, cache) = cache_with(DEFAULT_CACHE_TTL);
        assert!(cache.is_empty());
        assert!(cache.get("Physics").unwrap().enabled);
        assert_eq!(cache.len(), 1);
        assert!(cache.admits("Physics", Severity::Info));
    }

    #[test]
    fn version_bump_invalidates() {
        let (registry, cache) = cache_with(Duration::from_secs(3600));
        assert!(cache.admits("Physics", Severity::Info));
        registry.set_enabled("Physics", false, false).unwrap();
        assert!(!cache.admits("Physics", Severity::Info));
    }

    #[test]
    fn unknown_channel_is_not_cached() {
        let (_registry, cache) = cache_with(DEFAULT_CACHE_TTL);
        assert!(cache.get("Missing").is_none());
        assert!(!cache.admits("Missing", Severity::Critical));
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_ttl_always_refetches() {
        let (_registry, cache) = cache_with(Duration::ZERO);
        assert!(cache.get("Physics").is_some());
        assert!(cache.get("Physics").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unregister_evicts_on_next_read() {
        let (registry, cache) = cache_with(Duration::from_secs(3600));
        assert!(cache.get("Physics").is_some());
        registry.unregister("Physics").unwrap();
        assert!(cache.get("Physics").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_clears() {
        let (_registry, cache) = cache_with(DEFAULT_CACHE_TTL);
        cache.get("Physics");
        cache.invalidate();
        assert!(cache.is_empty());
    }
}
