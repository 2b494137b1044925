//! Sharded Map Implementation
//!
//! Concurrent hashmap split into independently locked shards.
//!
//! # Design
//!
//! - Each shard has its own RwLock, so unrelated keys rarely contend
//! - Power-of-2 shard count enables fast modulo via bitwise AND
//! - Each shard carries a generation counter bumped by invalidating writes;
//!   conditional inserts compare it under the write lock

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Single shard: a hashmap and its invalidation generation
#[repr(C, align(64))]
pub struct Shard<K, V> {
    map: RwLock<HashMap<K, V>>,
    /// Bumped by every write that must invalidate in-flight loads
    generation: AtomicU64,
}

impl<K, V> Default for Shard<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Shard<K, V> {
    /// Create a new empty shard
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Get the number of entries in this shard
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Check if the shard is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current invalidation generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl<K: Eq + Hash, V> Shard<K, V> {
    /// Run `f` against the value under the read lock
    pub fn read_with<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        let guard = self.map.read();
        guard.get(key).map(f)
    }

    /// Check if key exists
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.read().contains_key(key)
    }

    /// Insert and bump the generation in one critical section
    pub fn insert_invalidating(&self, key: K, value: V) -> Option<V> {
        let mut guard = self.map.write();
        self.generation.fetch_add(1, Ordering::Release);
        guard.insert(key, value)
    }

    /// Insert only if no invalidation happened since `expected` was read.
    ///
    /// Returns `false` (and drops the value) when the generation moved.
    pub fn insert_if_generation(&self, key: K, value: V, expected: u64) -> bool {
        let mut guard = self.map.write();
        if self.generation.load(Ordering::Acquire) != expected {
            return false;
        }
        guard.insert(key, value);
        true
    }

    /// Insert if the generation still equals `expected`, otherwise remove the
    /// key. Bumps the generation either way.
    pub fn replace_if_generation(&self, key: K, value: V, expected: u64) -> bool {
        let mut guard = self.map.write();
        if self.generation.fetch_add(1, Ordering::AcqRel) == expected {
            guard.insert(key, value);
            true
        } else {
            guard.remove(&key);
            false
        }
    }

    /// Remove a value without invalidating in-flight loads
    pub fn remove(&self, key: &K) -> Option<V> {
        self.map.write().remove(key)
    }

    /// Remove and bump the generation in one critical section
    pub fn remove_invalidating(&self, key: &K) -> Option<V> {
        let mut guard = self.map.write();
        self.generation.fetch_add(1, Ordering::Release);
        guard.remove(key)
    }

    /// Remove the value only if `pred` still holds under the write lock
    pub fn remove_if(&self, key: &K, pred: impl FnOnce(&V) -> bool) -> Option<V> {
        let mut guard = self.map.write();
        if guard.get(key).map(pred).unwrap_or(false) {
            guard.remove(key)
        } else {
            None
        }
    }

    /// Keep only entries matching `keep`; returns the number removed
    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) -> usize {
        let mut guard = self.map.write();
        let before = guard.len();
        guard.retain(|k, v| keep(k, v));
        before - guard.len()
    }

    /// Like [`Shard::retain`], but also bumps the generation so that loads
    /// started before the sweep cannot put a dropped entry back.
    pub fn retain_invalidating(&self, mut keep: impl FnMut(&K, &V) -> bool) -> usize {
        let mut guard = self.map.write();
        self.generation.fetch_add(1, Ordering::Release);
        let before = guard.len();
        guard.retain(|k, v| keep(k, v));
        before - guard.len()
    }

    /// Clear all entries and bump the generation
    pub fn clear(&self) -> usize {
        let mut guard = self.map.write();
        self.generation.fetch_add(1, Ordering::Release);
        let removed = guard.len();
        guard.clear();
        removed
    }

    /// Project every entry under the read lock
    pub fn collect<R>(&self, mut f: impl FnMut(&K, &V) -> R) -> Vec<R> {
        let guard = self.map.read();
        guard.iter().map(|(k, v)| f(k, v)).collect()
    }
}

/// Sharded map with a runtime, power-of-two shard count
pub struct ShardedMap<K, V> {
    shards: Box<[Shard<K, V>]>,
    mask: usize,
}

impl<K, V> ShardedMap<K, V> {
    /// Create a new sharded map. `shard_count` is rounded up to a power of two.
    pub fn new(shard_count: usize) -> Self {
        let count = shard_count.max(1).next_power_of_two();
        let shards: Vec<Shard<K, V>> = (0..count).map(|_| Shard::new()).collect();
        Self {
            shards: shards.into_boxed_slice(),
            mask: count - 1,
        }
    }

    /// Get the shard count
    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Get total number of entries across all shards
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.is_empty())
    }

    /// Iterate shards
    pub fn shards(&self) -> impl Iterator<Item = &Shard<K, V>> {
        self.shards.iter()
    }

    /// Shard for a precomputed key hash
    #[inline]
    pub fn shard_for_hash(&self, hash: u64) -> &Shard<K, V> {
        // Fold the well-mixed high bits into the low ones before masking
        let folded = hash ^ (hash >> 32);
        &self.shards[(folded as usize) & self.mask]
    }
}

impl<K: Eq + Hash, V> ShardedMap<K, V> {
    /// Clear all shards; returns the number of entries dropped
    pub fn clear(&self) -> usize {
        self.shards.iter().map(|s| s.clear()).sum()
    }
}

// =============================================================================
// Tests
// =============================================================================
