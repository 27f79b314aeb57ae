//! Last-known-good data, keyed by caller-chosen names

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::CacheConfig;

struct CacheEntry {
    value: Value,
    stored_at: Instant,
    seq: u64,
}

#[derive(Default)]
struct CacheInner {
    next_seq: u64,
    entries: HashMap<String, CacheEntry>,
}

/// In-memory store of the last successful result per key.
///
/// Values are kept as JSON so one cache can hold any serializable type.
/// Entries older than the cache's max age are dropped on read. When full,
/// writing a new key evicts the oldest write.
///
/// Clones share storage.
#[derive(Clone)]
pub struct OfflineCache {
    inner: Arc<Mutex<CacheInner>>,
    max_age: Duration,
    capacity: usize,
}

impl OfflineCache {
    /// Empty cache. A `capacity` of zero is treated as one.
    pub fn new(max_age: Duration, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner::default())),
            max_age,
            capacity: capacity.max(1),
        }
    }

    /// Cache sized from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_age, config.capacity)
    }

    /// Age after which entries are no longer served.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// Returns `false` when the value cannot be serialized; nothing is stored.
    pub fn put<T>(&self, key: impl Into<String>, value: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        let key = key.into();
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(error) => {
                warn!(key = %key, %error, "value not cacheable");
                return false;
            }
        };

        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                debug!(evicted = %oldest, "offline cache full");
                inner.entries.remove(&oldest);
            }
        }

        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                seq,
            },
        );
        true
    }

    /// Cached value for `key` if it is younger than the cache's max age.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_within(key, self.max_age)
    }

    /// Cached value for `key` if it is younger than `max_age`.
    ///
    /// A stored value of a different shape than `T` yields `None`.
    pub fn get_within<T: DeserializeOwned>(&self, key: &str, max_age: Duration) -> Option<T> {
        let value = {
            let mut inner = self.inner.lock();
            let age = inner.entries.get(key)?.stored_at.elapsed();
            if age > self.max_age {
                inner.entries.remove(key);
                debug!(key, ?age, "dropped stale cache entry");
                return None;
            }
            if age > max_age {
                return None;
            }
            inner.entries.get(key)?.value.clone()
        };

        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(error) => {
                debug!(key, %error, "cached value has a different shape");
                None
            }
        }
    }

    /// Drop the entry for `key`. Returns whether one existed.
    pub fn remove(&self, key: &str) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Number of entries, stale ones included until they are read.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OfflineCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl fmt::Debug for OfflineCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineCache")
            .field("entries", &self.len())
            .field("max_age", &self.max_age)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Per-call cache behaviour for `Resilience::fetch_or_cached`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Serve only entries younger than this. `None` uses the cache's max age.
    pub max_age: Option<Duration>,
    /// Whether a failed or skipped fetch falls back to the cache.
    pub fallback_to_cache: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_age: None,
            fallback_to_cache: true,
        }
    }
}

impl CacheOptions {
    /// Accept cached data up to `max_age` old.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Never serve cached data.
    pub fn without_fallback(mut self) -> Self {
        self.fallback_to_cache = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use tokio::time::advance;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        plan: String,
    }

    fn profile() -> Profile {
        Profile {
            name: "ada".into(),
            plan: "pro".into(),
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn typed_values_come_back() {
        let cache = OfflineCache::new(Duration::from_secs(60), 8);
        assert!(cache.put("profile", &profile()));

        assert_eq!(cache.get::<Profile>("profile"), Some(profile()));
        assert_eq!(cache.get::<Profile>("missing"), None);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn stale_entries_are_dropped() {
        let cache = OfflineCache::new(Duration::from_secs(60), 8);
        cache.put("count", &3u32);

        advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get::<u32>("count"), Some(3));

        advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get::<u32>("count"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn tighter_age_hides_without_dropping() {
        let cache = OfflineCache::new(Duration::from_secs(60), 8);
        cache.put("count", &3u32);
        advance(Duration::from_secs(10)).await;

        assert_eq!(cache.get_within::<u32>("count", Duration::from_secs(5)), None);
        assert_eq!(cache.get::<u32>("count"), Some(3));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn oldest_write_is_evicted_when_full() {
        let cache = OfflineCache::new(Duration::from_secs(60), 2);
        cache.put("a", &1u8);
        cache.put("b", &2u8);
        cache.put("a", &10u8);
        cache.put("c", &3u8);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get::<u8>("b"), None);
        assert_eq!(cache.get::<u8>("a"), Some(10));
        assert_eq!(cache.get::<u8>("c"), Some(3));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn shape_mismatch_is_a_miss() {
        let cache = OfflineCache::default();
        cache.put("profile", &profile());

        assert_eq!(cache.get::<Vec<u8>>("profile"), None);
        assert!(cache.remove("profile"));
        assert!(!cache.remove("profile"));
    }
}
