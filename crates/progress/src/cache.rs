//! Time-to-live cache keyed by fetch scope.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use questline_core::{CacheEntry, Time};

/// Freshness window of cached reads.
pub const CACHE_EXPIRY: Duration = Duration::from_secs(5 * 60);

/// Whether a value fetched at `fetched_at` is still fresh at `now`.
///
/// Entries stamped in the future (the clock went backwards) count as stale.
pub fn is_fresh(fetched_at: Time, now: Time, ttl: Duration) -> bool {
    match now.signed_duration_since(fetched_at).to_std() {
        Ok(age) => age < ttl,
        Err(_) => false,
    }
}

/// Values keyed by scope together with their fetch time.
#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K: Eq + Hash, V> TtlCache<K, V> {
    /// Empty cache.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Cache rebuilt from persisted entries.
    pub fn from_entries(entries: HashMap<K, CacheEntry<V>>, ttl: Duration) -> Self {
        Self { ttl, entries }
    }

    /// Freshness window.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Raw entry, fresh or not.
    pub fn get(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    /// Value only if still fresh at `now`.
    pub fn get_fresh(&self, key: &K, now: Time) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|entry| is_fresh(entry.fetched_at, now, self.ttl))
            .map(|entry| &entry.value)
    }

    /// Mutable access to a cached value without touching its timestamp.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key).map(|entry| &mut entry.value)
    }

    /// Store a value fetched at `fetched_at`.
    pub fn put(&mut self, key: K, value: V, fetched_at: Time) {
        self.entries.insert(key, CacheEntry { value, fetched_at });
    }

    /// Drop one entry.
    pub fn invalidate(&mut self, key: &K) -> Option<CacheEntry<V>> {
        self.entries.remove(key)
    }

    /// Drop every entry.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    /// Keep the value of `key` readable but force the next fetch through.
    pub fn expire(&mut self, key: &K) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.fetched_at = Time::MIN_UTC;
        }
    }

    /// [`expire`](TtlCache::expire) every entry.
    pub fn expire_all(&mut self) {
        for entry in self.entries.values_mut() {
            entry.fetched_at = Time::MIN_UTC;
        }
    }

    /// Iterate over cached values.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.values_mut().map(|entry| &mut entry.value)
    }

    /// Persisted form.
    pub fn entries(&self) -> &HashMap<K, CacheEntry<V>> {
        &self.entries
    }

    /// Number of entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self::new(CACHE_EXPIRY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> Time {
        s.parse().unwrap()
    }

    #[test]
    fn test_fresh_within_ttl() {
        let mut cache: TtlCache<&str, u32> = TtlCache::default();
        cache.put("goals", 1, at("2026-01-01T10:00:00Z"));

        assert_eq!(cache.get_fresh(&"goals", at("2026-01-01T10:04:59Z")), Some(&1));
        assert_eq!(cache.get_fresh(&"goals", at("2026-01-01T10:05:00Z")), None);
        // Stale entries stay readable as a fallback.
        assert!(cache.get(&"goals").is_some());
    }

    #[test]
    fn test_future_timestamp_is_stale() {
        assert!(!is_fresh(
            at("2026-01-01T10:01:00Z"),
            at("2026-01-01T10:00:00Z"),
            CACHE_EXPIRY
        ));
    }

    #[test]
    fn test_invalidate_ignores_freshness() {
        let mut cache: TtlCache<&str, u32> = TtlCache::default();
        let now = at("2026-01-01T10:00:00Z");
        cache.put("g1", 1, now);
        cache.put("g2", 2, now);

        assert!(cache.invalidate(&"g1").is_some());
        assert_eq!(cache.get_fresh(&"g1", now), None);
        assert!(cache.get(&"g1").is_none());
        assert_eq!(cache.len(), 1);

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_stay_readable() {
        let mut cache: TtlCache<&str, u32> = TtlCache::default();
        let now = at("2026-01-01T10:00:00Z");
        cache.put("today", 1, now);
        cache.put("tomorrow", 2, now);

        cache.expire(&"today");
        assert_eq!(cache.get_fresh(&"today", now), None);
        assert_eq!(cache.get_fresh(&"tomorrow", now), Some(&2));
        assert_eq!(cache.get(&"today").map(|e| e.value), Some(1));

        cache.expire_all();
        assert_eq!(cache.get_fresh(&"tomorrow", now), None);
        assert_eq!(cache.len(), 2);
    }
}
