//! Region Cache
//!
//! In-process, size- and time-bounded cache partitioned into regions: one
//! per entity kind plus two secondary-index regions for patient search.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          CacheManager                                 │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │ patients │ patientsByFio │ patientsByBirthDate │ orders │ tests │ ... │
//! │  Region     Region           Region               Region   Region     │
//! │  ┌──────────────┐                                                     │
//! │  │ ShardedMap   │  one RwLock per shard, per-shard generation         │
//! │  │ capacity+TTL │  LRU / LFU / LRU-K victim selection                 │
//! │  └──────────────┘                                                     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No operation blocks on another region. Losing an entry is always safe:
//! correctness never depends on a value still being cached.

mod entry;
mod manager;
mod policy;
mod region;
mod shard;
mod stats;

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::Error;

pub use entry::{CacheEntry, CacheKey, CacheValue, EntryMetadata, NameKey};
pub use manager::{CacheConfig, CacheManager};
pub use policy::{EvictionPolicy, PolicyKind};
pub use region::{LoadTicket, Region, RegionConfig};
pub use shard::{Shard, ShardedMap};
pub use stats::{RegionCounters, RegionStats};

/// Default maximum entries per region
pub const DEFAULT_REGION_CAPACITY: usize = 500;

/// Default entry time to live (10 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// Default shards per region
pub const DEFAULT_SHARDS_PER_REGION: usize = 16;

/// Named cache partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RegionName {
    Patients,
    /// Patient search by name triplet
    PatientsByName,
    /// Patient search by birth date
    PatientsByBirthDate,
    Orders,
    Tests,
    TestTypes,
}

impl RegionName {
    pub const COUNT: usize = 6;

    pub const ALL: [RegionName; Self::COUNT] = [
        RegionName::Patients,
        RegionName::PatientsByName,
        RegionName::PatientsByBirthDate,
        RegionName::Orders,
        RegionName::Tests,
        RegionName::TestTypes,
    ];

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// External name of the region
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionName::Patients => "patients",
            RegionName::PatientsByName => "patientsByFio",
            RegionName::PatientsByBirthDate => "patientsByBirthDate",
            RegionName::Orders => "orders",
            RegionName::Tests => "tests",
            RegionName::TestTypes => "testTypes",
        }
    }

    /// Whether the region memoizes search results rather than by-id snapshots
    pub fn is_search(&self) -> bool {
        matches!(self, RegionName::PatientsByName | RegionName::PatientsByBirthDate)
    }
}

impl std::fmt::Display for RegionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegionName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RegionName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidArgument(format!("unknown cache region '{}'", s)))
    }
}

// =============================================================================
// Tests
// =============================================================================
