use crate::clock::{SharedClock, SystemClock};
use crate::store::{Payload, ResourceKey, ResourceKind};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "graphql")]
use async_graphql::SimpleObject;

/// Configuration for the cache system
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// How long an entry stays valid unless its kind overrides it
    pub ttl: Duration,
    /// Per resource kind TTL overrides
    pub kind_ttls: HashMap<ResourceKind, Duration>,
    /// Whether caching is enabled
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(5),
            kind_ttls: HashMap::new(),
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with a single global TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    pub fn with_kind_ttl(mut self, kind: ResourceKind, ttl: Duration) -> Self {
        self.kind_ttls.insert(kind, ttl);
        self
    }

    pub fn ttl_for(&self, kind: ResourceKind) -> Duration {
        self.kind_ttls.get(&kind).copied().unwrap_or(self.ttl)
    }
}

/// Cached value with the moment it was fetched
#[derive(Clone, Debug)]
pub struct CachedEntry<V> {
    pub value: V,
    pub fetched_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl<V> CachedEntry<V> {
    pub fn new(value: V, fetched_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            value,
            fetched_at,
            ttl,
        }
    }

    /// An entry is valid while `now - fetched_at < ttl`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at < self.ttl
    }
}

/// Cache key: the kind of resource plus its identity within that kind
#[derive(Hash, Eq, PartialEq, Clone, Debug)]
pub struct CacheKey {
    pub kind: ResourceKind,
    pub id: String,
}

impl CacheKey {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl From<&ResourceKey> for CacheKey {
    fn from(key: &ResourceKey) -> Self {
        Self::new(key.kind(), key.path())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// In-memory TTL cache using DashMap for thread safety.
///
/// Staleness is checked when an entry is read; nothing runs in the
/// background. `evict_expired` exists for callers that want to reclaim
/// memory eagerly.
pub struct TtlCache<V> {
    entries: DashMap<CacheKey, CachedEntry<V>>,
    config: CacheConfig,
    clock: SharedClock,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The instant the cache ages entries against
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// True iff an entry exists for `key` and is younger than its TTL
    pub fn is_valid(&self, key: &CacheKey) -> bool {
        let now = self.now();
        self.entries
            .get(key)
            .map(|entry| entry.is_valid_at(now))
            .unwrap_or(false)
    }

    /// Get cached value if available and valid
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        if !self.config.enabled {
            return None;
        }

        let now = self.now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_valid_at(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                log::debug!("Cache hit for key: {}", key);
                return Some(entry.value.clone());
            }
        }

        // Drop the stale entry, unless a concurrent put already replaced it
        if self
            .entries
            .remove_if(key, |_, entry| !entry.is_valid_at(now))
            .is_some()
        {
            log::debug!("Cache expired for key: {}", key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        log::debug!("Cache miss for key: {}", key);
        None
    }

    /// Store value in cache, replacing any previous entry and resetting
    /// its age
    pub fn put(&self, key: CacheKey, value: V) {
        if !self.config.enabled {
            return;
        }

        let ttl = self.config.ttl_for(key.kind);
        log::debug!("Stored in cache with key: {} (ttl {}s)", key, ttl.num_seconds());
        self.entries.insert(key, CachedEntry::new(value, self.now(), ttl));
    }

    /// Remove an entry unconditionally. Returns whether one was present.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            log::debug!("Invalidated cache key: {}", key);
        }
        removed
    }

    /// Remove expired entries from cache
    pub fn evict_expired(&self) -> usize {
        let now = self.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_valid_at(now));
        let evicted = before.saturating_sub(self.entries.len());

        log::debug!("Evicted {} expired cache entries", evicted);
        evicted
    }

    /// Clear all cache entries
    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        log::info!("Cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let now = self.now();
        let total_entries = self.entries.len();
        let expired_entries = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_valid_at(now))
            .count();

        CacheStats {
            total_entries,
            valid_entries: total_entries.saturating_sub(expired_entries),
            expired_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(SimpleObject))]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// The cache shared by every component reading the remote store
pub type PayloadCache = TtlCache<Arc<Payload>>;

/// Thread-safe wrapper for the cache
pub type SharedCache = Arc<PayloadCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache_with_clock(ttl: Duration) -> (TtlCache<Vec<String>>, ManualClock) {
        let clock = ManualClock::starting_now();
        let cache = TtlCache::with_clock(CacheConfig::new(ttl), Arc::new(clock.clone()));
        (cache, clock)
    }

    fn titles_key(channel: &str) -> CacheKey {
        CacheKey::from(&ResourceKey::Titles(channel.to_string()))
    }

    #[test]
    fn test_get_after_put() {
        let (cache, _clock) = cache_with_clock(Duration::seconds(300));
        let key = titles_key("MovieFacts");

        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), vec!["Inception".to_string()]);

        assert!(cache.is_valid(&key));
        assert_eq!(cache.get(&key), Some(vec!["Inception".to_string()]));
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let (cache, clock) = cache_with_clock(Duration::seconds(300));
        let key = titles_key("MovieFacts");
        cache.put(key.clone(), vec![]);

        clock.advance(Duration::seconds(299));
        assert!(cache.is_valid(&key));

        // Exactly TTL old is already stale
        clock.advance(Duration::seconds(1));
        assert!(!cache.is_valid(&key));
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_resets_age() {
        let (cache, clock) = cache_with_clock(Duration::seconds(60));
        let key = titles_key("MovieFacts");

        cache.put(key.clone(), vec!["old".to_string()]);
        clock.advance(Duration::seconds(45));
        cache.put(key.clone(), vec!["new".to_string()]);
        clock.advance(Duration::seconds(45));

        assert_eq!(cache.get(&key), Some(vec!["new".to_string()]));
    }

    #[test]
    fn test_invalidate() {
        let (cache, _clock) = cache_with_clock(Duration::seconds(60));
        let key = titles_key("MovieFacts");
        cache.put(key.clone(), vec![]);

        assert!(cache.invalidate(&key));
        assert!(!cache.invalidate(&key));
        assert!(!cache.is_valid(&key));
    }

    #[test]
    fn test_kind_ttl_override() {
        let clock = ManualClock::starting_now();
        let config = CacheConfig::new(Duration::seconds(300))
            .with_kind_ttl(ResourceKind::Users, Duration::seconds(30));
        let cache: TtlCache<u32> = TtlCache::with_clock(config, Arc::new(clock.clone()));

        let users = CacheKey::from(&ResourceKey::Users);
        let titles = titles_key("MovieFacts");
        cache.put(users.clone(), 1);
        cache.put(titles.clone(), 2);

        clock.advance(Duration::seconds(31));
        assert!(cache.get(&users).is_none());
        assert_eq!(cache.get(&titles), Some(2));
    }

    #[test]
    fn test_evict_expired_and_stats() {
        let (cache, clock) = cache_with_clock(Duration::seconds(60));
        cache.put(titles_key("a"), vec![]);
        clock.advance(Duration::seconds(61));
        cache.put(titles_key("b"), vec![]);

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.expired_entries, 1);
        assert_eq!(stats.valid_entries, 1);

        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.len(), 1);

        cache.get(&titles_key("b"));
        cache.get(&titles_key("a"));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_disabled_cache_never_stores() {
        let cache: TtlCache<u32> = TtlCache::new(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        let key = titles_key("MovieFacts");
        cache.put(key.clone(), 7);
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_key_display() {
        assert_eq!(
            titles_key("MovieFacts").to_string(),
            "titles:MovieFacts/titles_moviefacts.txt"
        );
    }
}
