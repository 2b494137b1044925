//! Delete cascades
//!
//! Each cascade evicts a key before the Store record behind it is deleted,
//! deletes children before their parent, and evicts every deleted key once
//! more after the Store delete returns. The second eviction closes the window
//! in which a read-through that loaded the record before the delete could
//! populate it again.
//!
//! Patient deletes also sweep both search regions for any cached list that
//! includes the patient. Those lists may be keyed by a name or birth date the
//! patient no longer has.
//!
//! Ownership graph walked here:
//!
//! ```text
//! Patient ──▶ Order ──▶ Test ◀── TestType
//! ```

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::{region_for, CacheCoordinator};
use crate::cache::{CacheKey, RegionName};
use crate::domain::{EntityKind, Order, Patient, Record, Repository, Test, TestType};
use crate::error::{Error, Result};

/// Outcome of a completed cascade
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    /// Record the cascade was started for
    pub root: (EntityKind, i64),
    /// Records removed from the Store, children first, root last
    pub deleted: Vec<(EntityKind, i64)>,
    /// Eviction operations issued, including post-delete ones
    pub evictions: usize,
}

impl CascadeReport {
    fn new(kind: EntityKind, id: i64) -> Self {
        Self {
            root: (kind, id),
            deleted: Vec::new(),
            evictions: 0,
        }
    }

    pub fn deleted_count(&self, kind: EntityKind) -> usize {
        self.deleted.iter().filter(|(k, _)| *k == kind).count()
    }
}

impl CacheCoordinator {
    /// Delete a record and everything it owns, keeping the cache consistent.
    ///
    /// `NotFound` means the root did not exist and nothing was deleted. A
    /// Store failure part way through is reported as `CascadeIncomplete`;
    /// retrying the same delete is safe since vanished children are skipped.
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn delete_cascade(&self, kind: EntityKind, id: i64) -> Result<CascadeReport> {
        let mut report = CascadeReport::new(kind, id);

        let outcome = match kind {
            EntityKind::Patient => self.cascade_patient(id, &mut report).await,
            EntityKind::Order => self.cascade_order(id, &mut report).await,
            EntityKind::Test => self.cascade_test(id, &mut report).await,
            EntityKind::TestType => self.cascade_test_type(id, &mut report).await,
        };

        match outcome {
            Ok(()) => {
                info!(
                    deleted = report.deleted.len(),
                    evictions = report.evictions,
                    "Cascade delete complete"
                );
                Ok(report)
            }
            Err(e) if e.is_not_found() => Err(e),
            Err(e) => {
                warn!(
                    error = %e,
                    deleted = report.deleted.len(),
                    "Cascade delete interrupted"
                );
                Err(Error::CascadeIncomplete {
                    kind,
                    id,
                    source: Box::new(e),
                })
            }
        }
    }

    async fn cascade_patient(&self, id: i64, report: &mut CascadeReport) -> Result<()> {
        self.evict_tracked(EntityKind::Patient, id, report);
        let patient = self
            .stores
            .patients
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::Patient, id))?;
        self.evict_search_entries(id, &patient, report);

        for order in self.stores.orders.find_by_patient_id(id).await? {
            let Some(order_id) = order.id else { continue };
            self.evict_tracked(EntityKind::Order, order_id, report);
            self.remove_order_tree(order_id, report).await?;
        }

        if !self
            .delete_tracked::<Patient, _>(&*self.stores.patients, EntityKind::Patient, id, report)
            .await?
        {
            return Err(Error::not_found(EntityKind::Patient, id));
        }
        self.evict_search_entries(id, &patient, report);
        Ok(())
    }

    async fn cascade_order(&self, id: i64, report: &mut CascadeReport) -> Result<()> {
        self.evict_tracked(EntityKind::Order, id, report);
        if !self.stores.orders.exists_by_id(id).await? {
            return Err(Error::not_found(EntityKind::Order, id));
        }
        if !self.remove_order_tree(id, report).await? {
            return Err(Error::not_found(EntityKind::Order, id));
        }
        Ok(())
    }

    async fn cascade_test(&self, id: i64, report: &mut CascadeReport) -> Result<()> {
        self.evict_tracked(EntityKind::Test, id, report);
        if !self.stores.tests.exists_by_id(id).await? {
            return Err(Error::not_found(EntityKind::Test, id));
        }
        if !self
            .delete_tracked::<Test, _>(&*self.stores.tests, EntityKind::Test, id, report)
            .await?
        {
            return Err(Error::not_found(EntityKind::Test, id));
        }
        Ok(())
    }

    async fn cascade_test_type(&self, id: i64, report: &mut CascadeReport) -> Result<()> {
        self.evict_tracked(EntityKind::TestType, id, report);
        if !self.stores.test_types.exists_by_id(id).await? {
            return Err(Error::not_found(EntityKind::TestType, id));
        }

        for test in self.stores.tests.find_all_by_test_type_id(id).await? {
            let Some(test_id) = test.id else { continue };
            self.remove_test(test_id, report).await?;
        }

        if !self
            .delete_tracked::<TestType, _>(&*self.stores.test_types, EntityKind::TestType, id, report)
            .await?
        {
            return Err(Error::not_found(EntityKind::TestType, id));
        }
        Ok(())
    }

    /// Remove an order's tests and then the order. The order key must already
    /// be evicted. Returns whether the order itself was still stored.
    async fn remove_order_tree(&self, order_id: i64, report: &mut CascadeReport) -> Result<bool> {
        for test in self.stores.tests.find_by_order_id(order_id).await? {
            let Some(test_id) = test.id else { continue };
            self.remove_test(test_id, report).await?;
        }
        self.delete_tracked::<Order, _>(&*self.stores.orders, EntityKind::Order, order_id, report)
            .await
    }

    async fn remove_test(&self, test_id: i64, report: &mut CascadeReport) -> Result<bool> {
        self.evict_tracked(EntityKind::Test, test_id, report);
        self.delete_tracked::<Test, _>(&*self.stores.tests, EntityKind::Test, test_id, report)
            .await
    }

    /// Store delete followed by the settling eviction of the same key.
    async fn delete_tracked<T, R>(
        &self,
        repo: &R,
        kind: EntityKind,
        id: i64,
        report: &mut CascadeReport,
    ) -> Result<bool>
    where
        T: Record,
        R: Repository<T> + ?Sized,
    {
        let removed = repo.delete_by_id(id).await?;
        self.evict_tracked(kind, id, report);
        if removed {
            report.deleted.push((kind, id));
            debug!(kind = %kind, id, "Record deleted");
        } else {
            debug!(kind = %kind, id, "Record already gone, skipping");
        }
        Ok(removed)
    }

    fn evict_tracked(&self, kind: EntityKind, id: i64, report: &mut CascadeReport) {
        self.cache.evict(region_for(kind), &CacheKey::Id(id));
        report.evictions += 1;
    }

    /// Drop the search results keyed by the patient's current name triplet
    /// and birth date, then every other search result that lists the patient.
    fn evict_search_entries(&self, id: i64, patient: &Patient, report: &mut CascadeReport) {
        let name_key = CacheKey::name(
            Some(patient.last_name.as_str()),
            Some(patient.first_name.as_str()),
            patient.middle_name.as_deref(),
        );
        self.cache.evict(RegionName::PatientsByName, &name_key);
        self.cache
            .evict(RegionName::PatientsByBirthDate, &CacheKey::BirthDate(patient.birth_date));
        report.evictions += 2;

        for region in [RegionName::PatientsByName, RegionName::PatientsByBirthDate] {
            let swept = self
                .cache
                .evict_matching(region, |value| value.refers_to(EntityKind::Patient, id));
            if swept > 0 {
                debug!(region = %region, id, swept, "Dropped search results listing deleted patient");
            }
            report.evictions += swept;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::cache::CacheManager;
    use crate::domain::{Gender, OrderStatus, Stores, TestStatus};
    use chrono::NaiveDate;
    use std::sync::Arc;

    struct Fixture {
        store: Arc<InMemoryStore>,
        coordinator: CacheCoordinator,
        patient: i64,
        order: i64,
        test: i64,
        test_type: i64,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let coordinator =
            CacheCoordinator::new(Arc::new(CacheManager::new()), Stores::from_shared(store.clone()));

        let patient = store
            .save(Patient {
                id: None,
                last_name: "Sidorov".into(),
                first_name: "Petr".into(),
                middle_name: None,
                birth_date: NaiveDate::from_ymd_opt(1980, 5, 17).unwrap(),
                gender: Gender::Male,
                phone_number: None,
                snils: None,
            })
            .await
            .unwrap();
        let test_type = store
            .save(TestType {
                id: None,
                name: "Glucose".into(),
                code: "GLU".into(),
                description: None,
                price: 350.0,
            })
            .await
            .unwrap();
        let order = store
            .save(Order {
                id: None,
                patient_id: patient.id.unwrap(),
                created_at: crate::domain::model::now(),
                status: OrderStatus::Registered,
                comment: None,
            })
            .await
            .unwrap();
        let test = store
            .save(Test {
                id: None,
                order_id: order.id.unwrap(),
                test_type_id: test_type.id.unwrap(),
                executed_at: None,
                result: None,
                reference_values: None,
                status: TestStatus::Pending,
            })
            .await
            .unwrap();

        Fixture {
            store,
            coordinator,
            patient: patient.id.unwrap(),
            order: order.id.unwrap(),
            test: test.id.unwrap(),
            test_type: test_type.id.unwrap(),
        }
    }

    #[tokio::test]
    async fn test_patient_cascade_removes_graph() {
        let f = fixture().await;
        let report = f
            .coordinator
            .delete_cascade(EntityKind::Patient, f.patient)
            .await
            .unwrap();

        assert_eq!(
            report.deleted,
            vec![
                (EntityKind::Test, f.test),
                (EntityKind::Order, f.order),
                (EntityKind::Patient, f.patient),
            ]
        );
        assert!(Repository::<Order>::find_by_id(&*f.store, f.order)
            .await
            .unwrap()
            .is_none());
        assert!(Repository::<TestType>::find_by_id(&*f.store, f.test_type)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_patient_cascade_sweeps_search_lists_under_old_keys() {
        let f = fixture().await;
        let patient = Repository::<Patient>::find_by_id(&*f.store, f.patient)
            .await
            .unwrap()
            .unwrap();
        let listed = crate::cache::CacheValue::list(vec![crate::cache::CacheValue::Patient(
            crate::domain::PatientDto::from(&patient),
        )]);

        // Cached under a name and a birth date the patient no longer carries
        let cache = f.coordinator.cache();
        cache.put(
            RegionName::PatientsByName,
            CacheKey::name(Some("Kozlov"), Some("Petr"), None),
            listed.clone(),
        );
        cache.put(
            RegionName::PatientsByBirthDate,
            CacheKey::BirthDate(NaiveDate::from_ymd_opt(1979, 1, 1).unwrap()),
            listed,
        );
        cache.put(
            RegionName::PatientsByName,
            CacheKey::name(Some("Orlov"), None, None),
            crate::cache::CacheValue::list(Vec::new()),
        );

        let report = f
            .coordinator
            .delete_cascade(EntityKind::Patient, f.patient)
            .await
            .unwrap();

        assert!(cache.region(RegionName::PatientsByBirthDate).is_empty());
        assert_eq!(cache.region(RegionName::PatientsByName).len(), 1);
        assert!(cache
            .region(RegionName::PatientsByName)
            .contains(&CacheKey::name(Some("Orlov"), None, None)));
        assert!(report.evictions >= 2);
    }

    #[tokio::test]
    async fn test_test_type_cascade_keeps_orders() {
        let f = fixture().await;
        let report = f
            .coordinator
            .delete_cascade(EntityKind::TestType, f.test_type)
            .await
            .unwrap();

        assert_eq!(report.deleted_count(EntityKind::Test), 1);
        assert_eq!(report.deleted_count(EntityKind::TestType), 1);
        assert!(Repository::<Order>::find_by_id(&*f.store, f.order)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_missing_root_is_not_found() {
        let f = fixture().await;
        let err = f
            .coordinator
            .delete_cascade(EntityKind::Order, 9_999)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: EntityKind::Order, id: 9_999 }));
    }

    #[tokio::test]
    async fn test_second_delete_is_not_found() {
        let f = fixture().await;
        f.coordinator
            .delete_cascade(EntityKind::Test, f.test)
            .await
            .unwrap();
        let err = f
            .coordinator
            .delete_cascade(EntityKind::Test, f.test)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
