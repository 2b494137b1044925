//! Cache Entry Types
//!
//! Keys, cached values and the per-entry bookkeeping used for TTL expiry and
//! eviction scoring.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use once_cell::sync::Lazy;

use crate::domain::{EntityKind, OrderDto, PatientDto, TestDto, TestTypeDto};

/// Process-wide reference point for access timestamps.
static CLOCK_BASE: Lazy<Instant> = Lazy::new(Instant::now);

#[inline]
fn micros_since_base(at: Instant) -> u64 {
    at.saturating_duration_since(*CLOCK_BASE).as_micros() as u64
}

/// Fast non-cryptographic hash (FxHash algorithm)
#[inline]
pub(crate) fn fx_hash(bytes: &[u8]) -> u64 {
    const SEED: u64 = 0x517cc1b727220a95;
    let mut hash = SEED;
    for &byte in bytes {
        hash = hash.rotate_left(5) ^ (byte as u64);
        hash = hash.wrapping_mul(SEED);
    }
    hash
}

// =============================================================================
// Keys
// =============================================================================

/// Composite key over a patient's name triplet.
///
/// Carries the pre-computed hash used for lookups plus the full fields for
/// collision resolution.
#[derive(Clone, Debug, Eq)]
pub struct NameKey {
    hash: u64,
    last_name: Option<String>,
    first_name: Option<String>,
    middle_name: Option<String>,
}

impl NameKey {
    pub fn new(
        last_name: Option<&str>,
        first_name: Option<&str>,
        middle_name: Option<&str>,
    ) -> Self {
        let mut hash: u64 = 1;
        for part in [last_name, first_name, middle_name] {
            // Absent and empty fields must not collide
            let part_hash = part.map(|s| fx_hash(s.as_bytes())).unwrap_or(0);
            hash = hash.wrapping_mul(31).wrapping_add(part_hash);
        }

        Self {
            hash,
            last_name: last_name.map(str::to_owned),
            first_name: first_name.map(str::to_owned),
            middle_name: middle_name.map(str::to_owned),
        }
    }

    /// Composite hash of the triplet
    #[inline]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    pub fn last_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }

    pub fn first_name(&self) -> Option<&str> {
        self.first_name.as_deref()
    }

    pub fn middle_name(&self) -> Option<&str> {
        self.middle_name.as_deref()
    }
}

impl PartialEq for NameKey {
    fn eq(&self, other: &Self) -> bool {
        // Fast path: compare hashes first
        if self.hash != other.hash {
            return false;
        }
        self.last_name == other.last_name
            && self.first_name == other.first_name
            && self.middle_name == other.middle_name
    }
}

impl Hash for NameKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

/// Key of an entry within a region.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Entity id (per-kind regions)
    Id(i64),
    /// Name triplet (patient search by name)
    Name(NameKey),
    /// Raw birth date (patient search by birth date)
    BirthDate(NaiveDate),
}

impl CacheKey {
    pub fn name(
        last_name: Option<&str>,
        first_name: Option<&str>,
        middle_name: Option<&str>,
    ) -> Self {
        CacheKey::Name(NameKey::new(last_name, first_name, middle_name))
    }

    /// Hash used to pick a shard.
    #[inline]
    pub fn shard_hash(&self) -> u64 {
        match self {
            CacheKey::Id(id) => fx_hash(&id.to_le_bytes()),
            CacheKey::Name(key) => key.hash_value(),
            CacheKey::BirthDate(date) => fx_hash(date.to_string().as_bytes()),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Id(id) => write!(f, "id:{}", id),
            CacheKey::Name(key) => write!(f, "name:{:016x}", key.hash_value()),
            CacheKey::BirthDate(date) => write!(f, "birth-date:{}", date),
        }
    }
}

impl From<i64> for CacheKey {
    fn from(id: i64) -> Self {
        CacheKey::Id(id)
    }
}

// =============================================================================
// Values
// =============================================================================

/// Snapshot held by a cache entry.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheValue {
    Patient(PatientDto),
    Order(OrderDto),
    Test(TestDto),
    TestType(TestTypeDto),
    /// Memoized search result
    List(Arc<[CacheValue]>),
}

impl CacheValue {
    pub fn list(values: Vec<CacheValue>) -> Self {
        CacheValue::List(values.into())
    }

    /// Id of the snapshot, if it is a single record.
    pub fn record_id(&self) -> Option<i64> {
        match self {
            CacheValue::Patient(p) => Some(p.id),
            CacheValue::Order(o) => Some(o.id),
            CacheValue::Test(t) => Some(t.id),
            CacheValue::TestType(t) => Some(t.id),
            CacheValue::List(_) => None,
        }
    }

    /// Whether this is, or lists, the snapshot of record `(kind, id)`.
    pub fn refers_to(&self, kind: EntityKind, id: i64) -> bool {
        let own_kind = match self {
            CacheValue::Patient(_) => EntityKind::Patient,
            CacheValue::Order(_) => EntityKind::Order,
            CacheValue::Test(_) => EntityKind::Test,
            CacheValue::TestType(_) => EntityKind::TestType,
            CacheValue::List(items) => return items.iter().any(|v| v.refers_to(kind, id)),
        };
        own_kind == kind && self.record_id() == Some(id)
    }
}

// =============================================================================
// Entries
// =============================================================================

/// Bookkeeping for one cache entry.
#[derive(Debug)]
pub struct EntryMetadata {
    /// Insertion time; TTL counts from here
    created_at: Instant,
    /// Time to live (zero = no expiry)
    ttl: Duration,
    /// Last access, micros since `CLOCK_BASE`
    last_access: AtomicU64,
    /// Access count for frequency-based eviction
    access_count: AtomicU32,
}

impl EntryMetadata {
    pub fn new(ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            created_at: now,
            ttl,
            last_access: AtomicU64::new(micros_since_base(now)),
            access_count: AtomicU32::new(1),
        }
    }

    /// Record an access and return the new count
    #[inline]
    pub fn record_access(&self) -> u32 {
        self.last_access
            .store(micros_since_base(Instant::now()), Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub fn access_count(&self) -> u32 {
        self.access_count.load(Ordering::Relaxed)
    }

    /// Age since insertion
    #[inline]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the last access
    pub fn idle(&self) -> Duration {
        let now = micros_since_base(Instant::now());
        Duration::from_micros(now.saturating_sub(self.last_access.load(Ordering::Relaxed)))
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        !self.ttl.is_zero() && self.age() >= self.ttl
    }
}

/// Cache entry containing a snapshot and its metadata
#[derive(Debug)]
pub struct CacheEntry {
    pub metadata: EntryMetadata,
    value: CacheValue,
}

impl CacheEntry {
    pub fn new(value: CacheValue, ttl: Duration) -> Self {
        Self {
            metadata: EntryMetadata::new(ttl),
            value,
        }
    }

    #[inline]
    pub fn value(&self) -> &CacheValue {
        &self.value
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.metadata.is_expired()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_name_key_equality() {
        let a = CacheKey::name(Some("Ivanov"), Some("Ivan"), Some("Ivanovich"));
        let b = CacheKey::name(Some("Ivanov"), Some("Ivan"), Some("Ivanovich"));
        let c = CacheKey::name(Some("Ivanov"), Some("Ivan"), None);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.shard_hash(), b.shard_hash());
    }

    #[test]
    fn test_name_key_field_order_matters() {
        let a = NameKey::new(Some("Anna"), Some("Maria"), None);
        let b = NameKey::new(Some("Maria"), Some("Anna"), None);
        assert_ne!(a, b);
        assert_ne!(a.hash_value(), b.hash_value());
    }

    #[test]
    fn test_absent_and_empty_fields_differ() {
        let absent = NameKey::new(Some("Petrov"), Some("Petr"), None);
        let empty = NameKey::new(Some("Petrov"), Some("Petr"), Some(""));
        assert_ne!(absent, empty);
    }

    #[test]
    fn test_key_kinds_do_not_collide() {
        let date = NaiveDate::from_ymd_opt(1991, 1, 1).unwrap();
        let mut set = HashSet::new();
        set.insert(CacheKey::Id(1));
        set.insert(CacheKey::BirthDate(date));
        set.insert(CacheKey::name(Some("a"), None, None));
        set.insert(CacheKey::Id(1));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_value_refers_to_record() {
        let test_type = |id: i64| {
            CacheValue::TestType(TestTypeDto {
                id,
                name: "Glucose".into(),
                code: "GLU".into(),
                description: None,
                price: 350.0,
            })
        };

        assert!(test_type(3).refers_to(EntityKind::TestType, 3));
        assert!(!test_type(3).refers_to(EntityKind::Test, 3));

        let list = CacheValue::list(vec![test_type(1), test_type(2)]);
        assert!(list.refers_to(EntityKind::TestType, 2));
        assert!(!list.refers_to(EntityKind::TestType, 3));
        assert!(!CacheValue::list(Vec::new()).refers_to(EntityKind::TestType, 1));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(CacheKey::Id(55).to_string(), "id:55");
        let date = NaiveDate::from_ymd_opt(2001, 2, 3).unwrap();
        assert_eq!(CacheKey::BirthDate(date).to_string(), "birth-date:2001-02-03");
    }

    #[test]
    fn test_metadata_access_tracking() {
        let meta = EntryMetadata::new(Duration::from_secs(60));
        assert_eq!(meta.access_count(), 1);
        assert_eq!(meta.record_access(), 2);
        meta.record_access();
        assert_eq!(meta.access_count(), 3);
    }

    #[test]
    fn test_metadata_ttl() {
        let no_ttl = EntryMetadata::new(Duration::ZERO);
        assert!(!no_ttl.is_expired());

        let short = EntryMetadata::new(Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(20));
        assert!(short.is_expired());

        let long = EntryMetadata::new(Duration::from_secs(3600));
        assert!(!long.is_expired());
    }

    #[test]
    fn test_list_value_has_no_record_id() {
        let list = CacheValue::list(Vec::new());
        assert_eq!(list.record_id(), None);
    }
}
