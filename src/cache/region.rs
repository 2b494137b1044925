//! Cache Region
//!
//! Size- and time-bounded key/value table for one region.
//!
//! # Design
//!
//! - Sharded storage, one `RwLock` per shard and no lock across the region
//! - Entry-count bound: inserting a new key into a full region first purges
//!   expired entries, then drops the entries the eviction policy scores
//!   highest
//! - TTL is counted from insertion and checked on every `get`
//! - Read-through populates are conditional on the shard generation observed
//!   before the Store was consulted, so a populate that raced with a
//!   write-through `put` or an `evict` is dropped instead of resurrecting
//!   stale data
//! - Write-through refreshes are conditional the same way, but a refresh that
//!   lost a race removes the key rather than leaving the old value behind

use std::time::Duration;

use tracing::trace;

use super::entry::{CacheEntry, CacheKey, CacheValue};
use super::policy::EvictionPolicy;
use super::shard::ShardedMap;
use super::stats::{RegionCounters, RegionStats};
use super::{RegionName, DEFAULT_REGION_CAPACITY, DEFAULT_SHARDS_PER_REGION, DEFAULT_TTL};

/// Region configuration
#[derive(Debug, Clone)]
pub struct RegionConfig {
    /// Maximum number of live entries
    pub capacity: usize,
    /// Maximum entry age
    pub ttl: Duration,
    /// Shard count (rounded up to a power of two)
    pub shards: usize,
    /// Victim selection when full
    pub policy: EvictionPolicy,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_REGION_CAPACITY,
            ttl: DEFAULT_TTL,
            shards: DEFAULT_SHARDS_PER_REGION,
            policy: EvictionPolicy::default(),
        }
    }
}

/// Proof of the shard generation observed before a Store read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    key: CacheKey,
    generation: u64,
}

impl LoadTicket {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

/// One bounded cache region
pub struct Region {
    name: RegionName,
    storage: ShardedMap<CacheKey, CacheEntry>,
    config: RegionConfig,
    counters: RegionCounters,
}

impl Region {
    /// Create a region with default configuration
    pub fn new(name: RegionName) -> Self {
        Self::with_config(name, RegionConfig::default())
    }

    pub fn with_config(name: RegionName, config: RegionConfig) -> Self {
        Self {
            name,
            storage: ShardedMap::new(config.shards),
            config,
            counters: RegionCounters::new(),
        }
    }

    pub fn name(&self) -> RegionName {
        self.name
    }

    /// Get a live entry. Expired entries are removed and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        let shard = self.storage.shard_for_hash(key.shard_hash());

        let found = shard.read_with(key, |entry| {
            if entry.is_expired() {
                None
            } else {
                entry.metadata.record_access();
                Some(entry.value().clone())
            }
        });

        match found {
            Some(Some(value)) => {
                self.counters.record_hit();
                Some(value)
            }
            Some(None) => {
                if shard.remove_if(key, |e| e.is_expired()).is_some() {
                    self.counters.record_expirations(1);
                }
                self.counters.record_miss();
                None
            }
            None => {
                self.counters.record_miss();
                None
            }
        }
    }

    /// Insert or replace, resetting the entry age.
    ///
    /// Counts as an invalidation for in-flight loads of the same shard.
    pub fn put(&self, key: CacheKey, value: CacheValue) {
        self.make_room(&key);
        let shard = self.storage.shard_for_hash(key.shard_hash());
        shard.insert_invalidating(key, CacheEntry::new(value, self.config.ttl));
        self.counters.record_insert();
    }

    /// Observe the shard generation before consulting the Store.
    pub fn begin_load(&self, key: CacheKey) -> LoadTicket {
        let generation = self.storage.shard_for_hash(key.shard_hash()).generation();
        LoadTicket { key, generation }
    }

    /// Populate from a Store read started with `ticket`.
    ///
    /// Returns `false` if a put or evict touched the shard in between; the
    /// value is then dropped and the next read goes to the Store again.
    pub fn complete_load(&self, ticket: LoadTicket, value: CacheValue) -> bool {
        self.make_room(&ticket.key);
        let shard = self.storage.shard_for_hash(ticket.key.shard_hash());
        let entry = CacheEntry::new(value, self.config.ttl);
        let key_display = ticket.key.to_string();

        if shard.insert_if_generation(ticket.key, entry, ticket.generation) {
            self.counters.record_insert();
            true
        } else {
            trace!(region = %self.name, key = %key_display, "Dropped populate that raced with a write");
            self.counters.record_rejected_load();
            false
        }
    }

    /// Write-through refresh of a key claimed with [`Region::begin_load`]
    /// before the Store write.
    ///
    /// If anything invalidated the shard since the claim, the key is removed
    /// instead and `false` is returned. Either way loads still in flight for
    /// the shard are invalidated.
    pub fn put_if_unchanged(&self, ticket: LoadTicket, value: CacheValue) -> bool {
        self.make_room(&ticket.key);
        let shard = self.storage.shard_for_hash(ticket.key.shard_hash());
        let entry = CacheEntry::new(value, self.config.ttl);
        let key_display = ticket.key.to_string();

        if shard.replace_if_generation(ticket.key, entry, ticket.generation) {
            self.counters.record_insert();
            true
        } else {
            trace!(region = %self.name, key = %key_display, "Write-through raced with an invalidation, key dropped");
            self.counters.record_rejected_load();
            false
        }
    }

    /// Remove a specific entry. Idempotent; returns whether one was present.
    pub fn evict(&self, key: &CacheKey) -> bool {
        let shard = self.storage.shard_for_hash(key.shard_hash());
        self.counters.record_invalidation();
        shard.remove_invalidating(key).is_some()
    }

    /// Remove every entry whose value matches `pred`; returns how many.
    ///
    /// Every shard is invalidated, matching or not, so a load that started
    /// before the sweep cannot reinsert what it removed.
    pub fn evict_matching(&self, pred: impl Fn(&CacheValue) -> bool) -> usize {
        let removed: usize = self
            .storage
            .shards()
            .map(|shard| shard.retain_invalidating(|_, entry| !pred(entry.value())))
            .sum();
        if removed > 0 {
            self.counters.record_invalidation();
        }
        removed
    }

    /// Drop every entry in the region
    pub fn clear(&self) -> usize {
        self.storage.clear()
    }

    /// Remove all expired entries; returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        let purged: usize = self
            .storage
            .shards()
            .map(|shard| shard.retain(|_, entry| !entry.is_expired()))
            .sum();
        if purged > 0 {
            self.counters.record_expirations(purged as u64);
        }
        purged
    }

    /// Check presence of a live entry without touching access statistics
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.storage
            .shard_for_hash(key.shard_hash())
            .read_with(key, |entry| !entry.is_expired())
            .unwrap_or(false)
    }

    /// Number of stored entries (expired ones included until purged)
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    pub fn stats(&self) -> RegionStats {
        self.counters
            .snapshot(self.name, self.len(), self.config.capacity)
    }

    /// Ensure a slot is free for `incoming` when it is a new key.
    ///
    /// Concurrent inserts may overshoot the bound briefly; every insert of a
    /// new key trims back down before proceeding.
    ///
    /// Victim selection scores and sorts the whole region, so an insert into a
    /// full region costs O(n log n) in the capacity. Sample a few shards
    /// instead if capacities grow well past the default.
    fn make_room(&self, incoming: &CacheKey) {
        if self.len() < self.config.capacity {
            return;
        }
        let shard = self.storage.shard_for_hash(incoming.shard_hash());
        if shard.contains_key(incoming) {
            return;
        }

        if self.purge_expired() > 0 && self.len() < self.config.capacity {
            return;
        }

        let policy = &self.config.policy;
        let mut candidates: Vec<(CacheKey, f64)> = self
            .storage
            .shards()
            .flat_map(|shard| {
                shard.collect(|key, entry| {
                    let idle = entry.metadata.idle().as_secs_f64();
                    (key.clone(), policy.calculate_score(idle, entry.metadata.access_count()))
                })
            })
            .filter(|(key, _)| key != incoming)
            .collect();

        // Highest score first = most evictable
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut evicted = 0u64;
        for (key, _) in candidates {
            if self.len() < self.config.capacity {
                break;
            }
            if self
                .storage
                .shard_for_hash(key.shard_hash())
                .remove(&key)
                .is_some()
            {
                evicted += 1;
            }
        }

        if evicted > 0 {
            trace!(region = %self.name, evicted, "Evicted entries to make room");
            self.counters.record_evictions(evicted);
        }
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("name", &self.name)
            .field("entries", &self.len())
            .field("capacity", &self.config.capacity)
            .field("ttl", &self.config.ttl)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TestTypeDto;
    use proptest::prelude::*;

    fn value(id: i64) -> CacheValue {
        CacheValue::TestType(TestTypeDto {
            id,
            name: format!("type-{}", id),
            code: format!("T-{:02}", id),
            description: None,
            price: 10.0,
        })
    }

    fn small_region(capacity: usize, ttl: Duration) -> Region {
        Region::with_config(
            RegionName::TestTypes,
            RegionConfig {
                capacity,
                ttl,
                shards: 4,
                policy: EvictionPolicy::lru(),
            },
        )
    }

    #[test]
    fn test_put_get() {
        let region = Region::new(RegionName::TestTypes);
        region.put(CacheKey::Id(1), value(1));

        assert_eq!(region.get(&CacheKey::Id(1)), Some(value(1)));
        assert_eq!(region.get(&CacheKey::Id(2)), None);

        let stats = region.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.inserts, 1);
    }

    #[test]
    fn test_put_replaces() {
        let region = Region::new(RegionName::TestTypes);
        region.put(CacheKey::Id(1), value(1));
        region.put(CacheKey::Id(1), value(9));
        assert_eq!(region.get(&CacheKey::Id(1)), Some(value(9)));
        assert_eq!(region.len(), 1);
    }

    #[test]
    fn test_evict_is_idempotent() {
        let region = Region::new(RegionName::TestTypes);
        region.put(CacheKey::Id(1), value(1));
        region.put(CacheKey::Id(2), value(2));

        assert!(region.evict(&CacheKey::Id(1)));
        assert!(!region.evict(&CacheKey::Id(1)));
        assert!(!region.evict(&CacheKey::Id(42)));

        assert_eq!(region.len(), 1);
        assert_eq!(region.get(&CacheKey::Id(2)), Some(value(2)));
    }

    #[test]
    fn test_ttl_expiry_is_a_miss() {
        let region = small_region(10, Duration::from_millis(20));
        region.put(CacheKey::Id(1), value(1));
        assert!(region.contains(&CacheKey::Id(1)));

        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(region.get(&CacheKey::Id(1)), None);
        assert!(region.is_empty());
        assert_eq!(region.stats().expirations, 1);
    }

    #[test]
    fn test_purge_expired() {
        let region = small_region(10, Duration::from_millis(20));
        for id in 0..5 {
            region.put(CacheKey::Id(id), value(id));
        }
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(region.purge_expired(), 5);
        assert!(region.is_empty());
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let region = small_region(3, Duration::from_secs(60));
        region.put(CacheKey::Id(1), value(1));
        std::thread::sleep(Duration::from_millis(5));
        region.put(CacheKey::Id(2), value(2));
        std::thread::sleep(Duration::from_millis(5));
        region.put(CacheKey::Id(3), value(3));
        std::thread::sleep(Duration::from_millis(5));

        // Touch 1 so that 2 becomes the idlest entry
        assert!(region.get(&CacheKey::Id(1)).is_some());
        std::thread::sleep(Duration::from_millis(5));

        region.put(CacheKey::Id(4), value(4));

        assert_eq!(region.len(), 3);
        assert!(!region.contains(&CacheKey::Id(2)));
        assert!(region.contains(&CacheKey::Id(1)));
        assert!(region.contains(&CacheKey::Id(4)));
        assert_eq!(region.stats().evictions, 1);
    }

    #[test]
    fn test_replacing_in_full_region_does_not_evict() {
        let region = small_region(2, Duration::from_secs(60));
        region.put(CacheKey::Id(1), value(1));
        region.put(CacheKey::Id(2), value(2));
        region.put(CacheKey::Id(2), value(20));

        assert_eq!(region.len(), 2);
        assert_eq!(region.stats().evictions, 0);
    }

    #[test]
    fn test_load_completes_without_interference() {
        let region = Region::new(RegionName::TestTypes);
        let ticket = region.begin_load(CacheKey::Id(5));
        assert!(region.complete_load(ticket, value(5)));
        assert_eq!(region.get(&CacheKey::Id(5)), Some(value(5)));
    }

    #[test]
    fn test_load_dropped_after_evict() {
        let region = Region::new(RegionName::TestTypes);
        let ticket = region.begin_load(CacheKey::Id(5));

        // A delete cascade evicts the key while the Store read is in flight
        region.evict(&CacheKey::Id(5));

        assert!(!region.complete_load(ticket, value(5)));
        assert_eq!(region.get(&CacheKey::Id(5)), None);
        assert_eq!(region.stats().rejected_loads, 1);
    }

    #[test]
    fn test_load_does_not_overwrite_write_through() {
        let region = Region::new(RegionName::TestTypes);
        let ticket = region.begin_load(CacheKey::Id(5));

        region.put(CacheKey::Id(5), value(50));

        assert!(!region.complete_load(ticket, value(5)));
        assert_eq!(region.get(&CacheKey::Id(5)), Some(value(50)));
    }

    #[test]
    fn test_write_through_after_quiet_claim_is_stored() {
        let region = Region::new(RegionName::TestTypes);
        region.put(CacheKey::Id(5), value(5));

        let ticket = region.begin_load(CacheKey::Id(5));
        assert!(region.put_if_unchanged(ticket, value(50)));
        assert_eq!(region.get(&CacheKey::Id(5)), Some(value(50)));
    }

    #[test]
    fn test_write_through_after_evict_drops_key() {
        let region = Region::new(RegionName::TestTypes);
        region.put(CacheKey::Id(5), value(5));
        let ticket = region.begin_load(CacheKey::Id(5));

        // A delete cascade runs between the Store write and the refresh
        region.evict(&CacheKey::Id(5));
        region.evict(&CacheKey::Id(5));

        assert!(!region.put_if_unchanged(ticket, value(50)));
        assert!(!region.contains(&CacheKey::Id(5)));
    }

    #[test]
    fn test_write_through_invalidates_pending_loads() {
        let region = Region::new(RegionName::TestTypes);
        let load = region.begin_load(CacheKey::Id(5));
        let update = region.begin_load(CacheKey::Id(5));

        assert!(region.put_if_unchanged(update, value(50)));
        assert!(!region.complete_load(load, value(5)));
        assert_eq!(region.get(&CacheKey::Id(5)), Some(value(50)));
    }

    #[test]
    fn test_evict_matching() {
        let region = Region::new(RegionName::TestTypes);
        for id in 0..6 {
            region.put(CacheKey::Id(id), value(id));
        }
        let pending = region.begin_load(CacheKey::Id(1));

        let removed = region.evict_matching(|v| v.record_id().map_or(false, |id| id % 2 == 1));
        assert_eq!(removed, 3);
        assert_eq!(region.len(), 3);
        assert!(region.contains(&CacheKey::Id(0)));
        assert!(!region.complete_load(pending, value(1)));
    }

    #[test]
    fn test_clear() {
        let region = Region::new(RegionName::TestTypes);
        for id in 0..10 {
            region.put(CacheKey::Id(id), value(id));
        }
        assert_eq!(region.clear(), 10);
        assert!(region.is_empty());
    }

    proptest! {
        #[test]
        fn prop_len_never_exceeds_capacity(
            capacity in 1usize..16,
            keys in proptest::collection::vec(0i64..64, 1..200),
        ) {
            let region = small_region(capacity, Duration::from_secs(60));
            for key in keys {
                region.put(CacheKey::Id(key), value(key));
                prop_assert!(region.len() <= capacity);
                prop_assert!(region.contains(&CacheKey::Id(key)));
            }
        }
    }
}
