//! Cache Coordinator
//!
//! The single place that decides how the cache and the Store interact for
//! each entity kind.
//!
//! ```text
//!  read-by-id     ──▶ cache hit? ──yes──▶ snapshot
//!                        │no
//!                        ▼
//!                   Store.find_by_id ──absent──▶ NotFound (cache untouched)
//!                        │present
//!                        ▼
//!                   conditional populate ──▶ snapshot
//!
//!  update-by-id   ──▶ claim key ─▶ Store.save ─▶ put, or evict if the
//!                     claim was invalidated meanwhile (write-through)
//!
//!  delete-by-id   ──▶ evict ─▶ resolve ─▶ children: evict, delete, settle
//!                                      ─▶ delete parent ─▶ settle
//! ```
//!
//! Search results are memoized per predicate key and are only dropped by TTL,
//! capacity pressure, region clears, or deletion of a patient they list.
//! Updates do not touch them.

mod cascade;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheKey, CacheManager, CacheValue, LoadTicket, RegionName};
use crate::domain::{EntityKind, OrderDto, PatientDto, Stores, TestDto, TestTypeDto};
use crate::error::{Error, Result};

pub use cascade::CascadeReport;

/// Region holding by-id snapshots of `kind`.
pub fn region_for(kind: EntityKind) -> RegionName {
    match kind {
        EntityKind::Patient => RegionName::Patients,
        EntityKind::Order => RegionName::Orders,
        EntityKind::Test => RegionName::Tests,
        EntityKind::TestType => RegionName::TestTypes,
    }
}

/// A snapshot type the coordinator can cache and load by id.
#[async_trait]
pub trait Cached: Clone + Send + Sync + Sized + 'static {
    const KIND: EntityKind;

    fn into_value(self) -> CacheValue;

    fn from_value(value: &CacheValue) -> Option<Self>;

    /// Load the snapshot straight from the Store.
    async fn load(stores: &Stores, id: i64) -> Result<Option<Self>>;
}

macro_rules! impl_cached {
    ($dto:ident, $kind:ident, $store:ident) => {
        #[async_trait]
        impl Cached for $dto {
            const KIND: EntityKind = EntityKind::$kind;

            fn into_value(self) -> CacheValue {
                CacheValue::$kind(self)
            }

            fn from_value(value: &CacheValue) -> Option<Self> {
                match value {
                    CacheValue::$kind(dto) => Some(dto.clone()),
                    _ => None,
                }
            }

            async fn load(stores: &Stores, id: i64) -> Result<Option<Self>> {
                let record = stores.$store.find_by_id(id).await?;
                Ok(record.as_ref().map($dto::from))
            }
        }
    };
}

impl_cached!(PatientDto, Patient, patients);
impl_cached!(OrderDto, Order, orders);
impl_cached!(TestDto, Test, tests);
impl_cached!(TestTypeDto, TestType, test_types);

/// Mediates between the [`CacheManager`] and the Store.
pub struct CacheCoordinator {
    cache: Arc<CacheManager>,
    stores: Stores,
}

impl CacheCoordinator {
    pub fn new(cache: Arc<CacheManager>, stores: Stores) -> Self {
        Self { cache, stores }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Read-through lookup by id.
    ///
    /// A hit never touches the Store. A miss loads once and populates the
    /// cache unless a concurrent write or evict touched the key meanwhile.
    #[instrument(skip(self), fields(kind = %D::KIND))]
    pub async fn get_cached<D: Cached>(&self, id: i64) -> Result<D> {
        let region = region_for(D::KIND);
        let key = CacheKey::Id(id);

        if let Some(value) = self.cache.get(region, &key) {
            if let Some(dto) = D::from_value(&value) {
                debug!(region = %region, id, "Cache hit");
                return Ok(dto);
            }
            warn!(region = %region, id, "Cached value has unexpected shape, evicting");
            self.cache.evict(region, &key);
        }

        debug!(region = %region, id, "Cache miss, loading from store");
        let ticket = self.cache.begin_load(region, key);
        match D::load(&self.stores, id).await? {
            Some(dto) => {
                self.cache.complete_load(region, ticket, dto.clone().into_value());
                Ok(dto)
            }
            None => Err(Error::not_found(D::KIND, id)),
        }
    }

    /// Claim the by-id key of a record that is about to be saved.
    ///
    /// Must be taken before the Store write and handed to
    /// [`CacheCoordinator::put_on_update`] afterwards.
    pub fn begin_update(&self, kind: EntityKind, id: i64) -> LoadTicket {
        self.cache.begin_load(region_for(kind), CacheKey::Id(id))
    }

    /// Write-through refresh after a successful Store update.
    ///
    /// If the key was invalidated since `ticket` was taken, e.g. by a delete
    /// cascade that ran while the save was in flight, the entry is evicted
    /// instead of written and `false` is returned. The next read then goes to
    /// the Store, so read-your-writes holds either way.
    pub fn put_on_update<D: Cached>(&self, ticket: LoadTicket, dto: &D) -> bool {
        let region = region_for(D::KIND);
        let key = ticket.key().to_string();
        let stored = self
            .cache
            .put_if_unchanged(region, ticket, dto.clone().into_value());
        if stored {
            debug!(region = %region, key = %key, "Cache refreshed after update");
        } else {
            debug!(region = %region, key = %key, "Update raced with an invalidation, entry evicted");
        }
        stored
    }

    /// Evict the by-id entry of a record.
    pub fn evict(&self, kind: EntityKind, id: i64) -> bool {
        self.cache.evict(region_for(kind), &CacheKey::Id(id))
    }

    /// Memoized search keyed by the predicate's input fields.
    ///
    /// Only successful results are cached; an error from `supplier` leaves the
    /// region untouched. Cached results are not invalidated by updates.
    pub async fn search_cached<D, F, Fut>(
        &self,
        region: RegionName,
        key: CacheKey,
        supplier: F,
    ) -> Result<Vec<D>>
    where
        D: Cached,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Vec<D>>> + Send,
    {
        if !region.is_search() {
            return Err(Error::InvalidArgument(format!(
                "region '{}' does not hold search results",
                region
            )));
        }

        if let Some(CacheValue::List(items)) = self.cache.get(region, &key) {
            if let Some(hit) = items.iter().map(D::from_value).collect::<Option<Vec<D>>>() {
                debug!(region = %region, key = %key, results = hit.len(), "Search cache hit");
                return Ok(hit);
            }
            self.cache.evict(region, &key);
        }

        let ticket = self.cache.begin_load(region, key);
        let results = supplier().await?;
        let value = CacheValue::list(results.iter().cloned().map(Cached::into_value).collect());
        self.cache.complete_load(region, ticket, value);
        debug!(region = %region, results = results.len(), "Search cached");
        Ok(results)
    }

    /// Clear one region.
    pub fn evict_region(&self, region: RegionName) -> usize {
        self.cache.evict_region(region)
    }

    /// Clear a region addressed by its external name.
    pub fn evict_region_by_name(&self, name: &str) -> Result<usize> {
        let region: RegionName = name.parse()?;
        Ok(self.evict_region(region))
    }
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
