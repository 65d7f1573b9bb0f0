//! Hot cache: concurrent key/value storage for keys in hot ranges.
//!
//! A thin wrapper over a sharded concurrent hash map. Point operations are
//! safe under full concurrency; range enumeration is only performed during a
//! purge, which the coordinator serializes with its structure-wide writer
//! lock. Values are returned by value — handing out references into the map
//! across shard locks would be a correctness hazard.

use std::hash::Hash;

use dashmap::DashMap;

/// Concurrent map of cached entries, logically partitioned by the working
/// set's hot ranges.
pub struct HotCache<K, V> {
    map: DashMap<K, V>,
}

impl<K, V> std::fmt::Debug for HotCache<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotCache").finish_non_exhaustive()
    }
}

impl<K, V> HotCache<K, V>
where
    K: Eq + Hash + Ord + Copy,
    V: Copy,
{
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    /// Insert or overwrite the entry for `k`.
    pub fn insert(&self, k: K, v: V) {
        self.map.insert(k, v);
    }

    /// Look up `k`, returning the value by copy.
    #[must_use]
    pub fn find(&self, k: &K) -> Option<V> {
        self.map.get(k).map(|entry| *entry.value())
    }

    /// Remove the entry for `k`, if present.
    pub fn erase(&self, k: &K) {
        self.map.remove(k);
    }

    /// Enumerate all entries with `lo <= key < hi`.
    ///
    /// Iteration locks each shard in turn, so concurrent point operations on
    /// the same keys must be excluded by the caller — the purge path runs
    /// this under the coordinator's writer lock. The result is unsorted.
    #[must_use]
    pub fn collect_range(&self, lo: &K, hi: &K) -> Vec<(K, V)> {
        self.map
            .iter()
            .filter(|entry| entry.key() >= lo && entry.key() < hi)
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True iff no entries are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K, V> Default for HotCache<K, V>
where
    K: Eq + Hash + Ord + Copy,
    V: Copy,
{
    fn default() -> Self {
        Self::new()
    }
}
