//! Process-wide key-value cache with per-entry TTL
//!
//! Holds the service access token and in-flight OTP sign-up records.
//! Values are stored as JSON so callers get typed access without the cache
//! knowing about their concrete types. Single-process, in-memory only;
//! entries never survive a restart.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Thread-safe TTL cache with string keys and JSON values
pub struct TtlCache {
    entries: DashMap<String, CachedEntry>,
}

/// A cached value with TTL metadata
struct CachedEntry {
    value: Value,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedEntry {
    fn is_expired(&self) -> bool {
        Instant::now().duration_since(self.cached_at) > self.ttl
    }
}

impl TtlCache {
    /// Create a new empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Get a typed value if it exists and hasn't expired
    ///
    /// Expired entries are evicted on access. A value that no longer
    /// deserializes into `T` is treated as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                debug!(key = %key, "Evicted expired cache entry");
                None
            } else {
                serde_json::from_value(entry.value.clone()).ok()
            }
        } else {
            None
        }
    }

    /// Store a value with the given TTL
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Ok(value) = serde_json::to_value(value) else {
            // Serialization of our own cache value types cannot fail.
            return;
        };
        self.entries.insert(
            key.to_string(),
            CachedEntry {
                value,
                cached_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Remove an entry, returning whether it existed
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Current number of entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}
