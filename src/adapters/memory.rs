//! In-memory Store Adapter
//!
//! Implements all four repository ports over concurrent maps. Foreign keys
//! are enforced the way the relational schema would: children must reference
//! existing parents and a parent cannot be deleted while children exist.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tracing::trace;

use crate::domain::{
    EntityKind, Order, OrderRepository, Page, PageRequest, Patient, PatientRepository, Record,
    Repository, Test, TestRepository, TestType, TestTypeRepository,
};
use crate::error::{Error, Result};

/// One table: rows by id plus an id sequence.
#[derive(Debug)]
struct Table<T> {
    rows: DashMap<i64, T>,
    sequence: AtomicI64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: DashMap::new(),
            sequence: AtomicI64::new(0),
        }
    }
}

impl<T: Record> Table<T> {
    fn get(&self, id: i64) -> Option<T> {
        self.rows.get(&id).map(|row| row.value().clone())
    }

    fn contains(&self, id: i64) -> bool {
        self.rows.contains_key(&id)
    }

    fn upsert(&self, mut record: T) -> T {
        let id = match record.id() {
            Some(id) => {
                self.sequence.fetch_max(id, Ordering::SeqCst);
                id
            }
            None => {
                let id = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                record.set_id(id);
                id
            }
        };
        self.rows.insert(id, record.clone());
        trace!(kind = %T::KIND, id, "Row saved");
        record
    }

    fn remove(&self, id: i64) -> bool {
        self.rows.remove(&id).is_some()
    }

    fn select(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        let mut rows: Vec<T> = self
            .rows
            .iter()
            .filter(|row| predicate(row.value()))
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by_key(|row| row.id());
        rows
    }

    fn page(&self, request: PageRequest) -> Page<T> {
        let all = self.select(|_| true);
        let total = all.len();
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.size)
            .collect();
        Page {
            items,
            page: request.page,
            size: request.size,
            total,
        }
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Process-local Store for all entity kinds
#[derive(Debug, Default)]
pub struct InMemoryStore {
    patients: Table<Patient>,
    orders: Table<Order>,
    tests: Table<Test>,
    test_types: Table<TestType>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows currently stored for `kind`
    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Patient => self.patients.len(),
            EntityKind::Order => self.orders.len(),
            EntityKind::Test => self.tests.len(),
            EntityKind::TestType => self.test_types.len(),
        }
    }
}

fn constraint(message: String) -> Error {
    Error::Store(format!("constraint violation: {}", message))
}

fn matches_optional(field: Option<&str>, wanted: Option<&str>) -> bool {
    field == wanted
}

#[async_trait]
impl Repository<Patient> for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Patient>> {
        Ok(self.patients.get(id))
    }

    async fn save(&self, record: Patient) -> Result<Patient> {
        Ok(self.patients.upsert(record))
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool> {
        if self.orders.rows.iter().any(|o| o.patient_id == id) {
            return Err(constraint(format!("patient {} still has orders", id)));
        }
        Ok(self.patients.remove(id))
    }

    async fn find_all(&self, page: PageRequest) -> Result<Page<Patient>> {
        Ok(self.patients.page(page))
    }
}

#[async_trait]
impl PatientRepository for InMemoryStore {
    async fn find_by_full_name(
        &self,
        last_name: Option<&str>,
        first_name: Option<&str>,
        middle_name: Option<&str>,
    ) -> Result<Vec<Patient>> {
        Ok(self.patients.select(|p| {
            matches_optional(Some(p.last_name.as_str()), last_name)
                && matches_optional(Some(p.first_name.as_str()), first_name)
                && matches_optional(p.middle_name.as_deref(), middle_name)
        }))
    }

    async fn find_by_birth_date(&self, birth_date: NaiveDate) -> Result<Vec<Patient>> {
        Ok(self.patients.select(|p| p.birth_date == birth_date))
    }

    async fn find_by_full_name_and_birth_date(
        &self,
        last_name: &str,
        first_name: &str,
        middle_name: &str,
        birth_date: NaiveDate,
    ) -> Result<Vec<Patient>> {
        Ok(self.patients.select(|p| {
            p.last_name == last_name
                && p.first_name == first_name
                && p.middle_name.as_deref() == Some(middle_name)
                && p.birth_date == birth_date
        }))
    }
}

#[async_trait]
impl Repository<Order> for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Order>> {
        Ok(self.orders.get(id))
    }

    async fn save(&self, record: Order) -> Result<Order> {
        if !self.patients.contains(record.patient_id) {
            return Err(constraint(format!(
                "order references missing patient {}",
                record.patient_id
            )));
        }
        Ok(self.orders.upsert(record))
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool> {
        if self.tests.rows.iter().any(|t| t.order_id == id) {
            return Err(constraint(format!("order {} still has tests", id)));
        }
        Ok(self.orders.remove(id))
    }

    async fn find_all(&self, page: PageRequest) -> Result<Page<Order>> {
        Ok(self.orders.page(page))
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn find_by_patient_id(&self, patient_id: i64) -> Result<Vec<Order>> {
        Ok(self.orders.select(|o| o.patient_id == patient_id))
    }
}

#[async_trait]
impl Repository<Test> for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Test>> {
        Ok(self.tests.get(id))
    }

    async fn save(&self, record: Test) -> Result<Test> {
        if !self.orders.contains(record.order_id) {
            return Err(constraint(format!(
                "test references missing order {}",
                record.order_id
            )));
        }
        if !self.test_types.contains(record.test_type_id) {
            return Err(constraint(format!(
                "test references missing test type {}",
                record.test_type_id
            )));
        }
        Ok(self.tests.upsert(record))
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool> {
        Ok(self.tests.remove(id))
    }

    async fn find_all(&self, page: PageRequest) -> Result<Page<Test>> {
        Ok(self.tests.page(page))
    }
}

#[async_trait]
impl TestRepository for InMemoryStore {
    async fn find_by_order_id(&self, order_id: i64) -> Result<Vec<Test>> {
        Ok(self.tests.select(|t| t.order_id == order_id))
    }

    async fn find_all_by_test_type_id(&self, test_type_id: i64) -> Result<Vec<Test>> {
        Ok(self.tests.select(|t| t.test_type_id == test_type_id))
    }
}

#[async_trait]
impl Repository<TestType> for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<TestType>> {
        Ok(self.test_types.get(id))
    }

    async fn save(&self, record: TestType) -> Result<TestType> {
        Ok(self.test_types.upsert(record))
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool> {
        if self.tests.rows.iter().any(|t| t.test_type_id == id) {
            return Err(constraint(format!("test type {} is still referenced", id)));
        }
        Ok(self.test_types.remove(id))
    }

    async fn find_all(&self, page: PageRequest) -> Result<Page<TestType>> {
        Ok(self.test_types.page(page))
    }
}

impl TestTypeRepository for InMemoryStore {}
