//! Cache Manager
//!
//! Owns one [`Region`] per [`RegionName`]. Regions expire and evict
//! independently and never share a lock.

use std::time::Duration;

use tracing::{debug, info};

use super::entry::{CacheKey, CacheValue};
use super::policy::EvictionPolicy;
use super::region::{LoadTicket, Region, RegionConfig};
use super::stats::RegionStats;
use super::{RegionName, DEFAULT_REGION_CAPACITY, DEFAULT_SHARDS_PER_REGION, DEFAULT_TTL};

/// Cache configuration shared by every region
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum entries per region
    pub capacity_per_region: usize,
    /// Entry time to live
    pub ttl: Duration,
    /// Shards per region
    pub shards_per_region: usize,
    /// Eviction policy
    pub eviction_policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_per_region: DEFAULT_REGION_CAPACITY,
            ttl: DEFAULT_TTL,
            shards_per_region: DEFAULT_SHARDS_PER_REGION,
            eviction_policy: EvictionPolicy::default(),
        }
    }
}

impl CacheConfig {
    fn region_config(&self) -> RegionConfig {
        RegionConfig {
            capacity: self.capacity_per_region,
            ttl: self.ttl,
            shards: self.shards_per_region,
            policy: self.eviction_policy.clone(),
        }
    }
}

/// All cache regions of the process
pub struct CacheManager {
    regions: [Region; RegionName::COUNT],
    config: CacheConfig,
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheManager {
    /// Create a cache manager with default configuration
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        let regions = RegionName::ALL.map(|name| Region::with_config(name, config.region_config()));
        debug!(
            capacity = config.capacity_per_region,
            ttl_secs = config.ttl.as_secs(),
            policy = config.eviction_policy.name,
            "Cache regions initialized"
        );
        Self { regions, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[inline]
    pub fn region(&self, name: RegionName) -> &Region {
        &self.regions[name.index()]
    }

    /// Live entry or miss. Never consults the Store.
    pub fn get(&self, region: RegionName, key: &CacheKey) -> Option<CacheValue> {
        self.region(region).get(key)
    }

    /// Insert or replace an entry
    pub fn put(&self, region: RegionName, key: CacheKey, value: CacheValue) {
        self.region(region).put(key, value)
    }

    /// Remove an entry; no-op when absent
    pub fn evict(&self, region: RegionName, key: &CacheKey) -> bool {
        self.region(region).evict(key)
    }

    /// Clear a whole region (maintenance and tests)
    pub fn evict_region(&self, region: RegionName) -> usize {
        let removed = self.region(region).clear();
        info!(region = %region, removed, "Cache region cleared");
        removed
    }

    pub fn begin_load(&self, region: RegionName, key: CacheKey) -> LoadTicket {
        self.region(region).begin_load(key)
    }

    pub fn complete_load(&self, region: RegionName, ticket: LoadTicket, value: CacheValue) -> bool {
        self.region(region).complete_load(ticket, value)
    }

    /// Write-through refresh guarded by a ticket taken before the Store write
    pub fn put_if_unchanged(&self, region: RegionName, ticket: LoadTicket, value: CacheValue) -> bool {
        self.region(region).put_if_unchanged(ticket, value)
    }

    /// Remove every entry of `region` whose value matches `pred`
    pub fn evict_matching(&self, region: RegionName, pred: impl Fn(&CacheValue) -> bool) -> usize {
        self.region(region).evict_matching(pred)
    }

    /// Purge expired entries in every region
    pub fn purge_expired(&self) -> usize {
        self.regions.iter().map(Region::purge_expired).sum()
    }

    pub fn stats(&self) -> Vec<RegionStats> {
        self.regions.iter().map(Region::stats).collect()
    }

    /// Total entries across regions
    pub fn len(&self) -> usize {
        self.regions.iter().map(Region::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.iter().all(Region::is_empty)
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("regions", &self.regions)
            .finish()
    }
}
