//! Run-scoped response caching.
//!
//! The directory lists the same repository once per package; a short TTL
//! cache absorbs the repeats. The cache is an explicit interface passed in
//! at construction so tests inject the in-memory implementation directly
//! instead of touching any shared state.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Run-scoped string cache with per-entry TTL.
pub trait ResponseCache: Send + Sync {
    /// Returns the cached value for `key` when present and unexpired.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key` for `ttl`.
    fn set(&self, key: &str, value: String, ttl: Duration);

    /// Drops every entry.
    fn clear(&self);
}

/// In-memory [`ResponseCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        let (expires, value) = entries.get(key)?;
        (*expires > Instant::now()).then(|| value.clone())
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), (Instant::now() + ttl, value));
        }
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_returns_within_ttl() {
        let cache = MemoryCache::new();
        cache.set("k", "v".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn expired_entries_are_absent() {
        let cache = MemoryCache::new();
        cache.set("k", "v".to_string(), Duration::from_secs(0));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn clear_drops_everything() {
        let cache = MemoryCache::new();
        cache.set("k", "v".to_string(), Duration::from_secs(60));
        cache.clear();
        assert_eq!(cache.get("k"), None);
    }
}
