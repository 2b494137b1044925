//! Shared integration test tooling: a call-recording Store and a harness that
//! wires it into a [`LabContext`].

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tokio::sync::Notify;

use labcore::adapters::{InMemoryEventCollector, InMemoryStore};
use labcore::domain::{
    EntityKind, Gender, Order, OrderRepository, OrderStatus, Page, PageRequest, Patient,
    PatientRepository, Record, Repository, Stores, Test, TestRepository, TestStatus, TestType,
    TestTypeRepository,
};
use labcore::{Error, LabConfig, LabContext, Result};

/// Store operation as seen by the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    FindById,
    Save,
    DeleteById,
    FindAll,
    Search,
    FindChildren,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub kind: EntityKind,
    pub id: Option<i64>,
}

/// Pauses one Store call after it has done its work, until released.
#[derive(Debug, Default)]
pub struct Gate {
    reached: Notify,
    release: Notify,
}

impl Gate {
    pub async fn wait_reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// [`InMemoryStore`] wrapper that logs every call and can inject failures.
#[derive(Default)]
pub struct RecordingStore {
    inner: InMemoryStore,
    calls: Mutex<Vec<Call>>,
    failing_deletes: Mutex<HashSet<(EntityKind, i64)>>,
    gate: Mutex<Option<(Op, EntityKind, i64, Arc<Gate>)>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    fn record(&self, op: Op, kind: EntityKind, id: Option<i64>) {
        self.calls.lock().push(Call { op, kind, id });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Number of `op` calls against `(kind, id)`
    pub fn count(&self, op: Op, kind: EntityKind, id: i64) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.op == op && c.kind == kind && c.id == Some(id))
            .count()
    }

    /// Store deletions in call order
    pub fn deletes(&self) -> Vec<(EntityKind, i64)> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.op == Op::DeleteById)
            .filter_map(|c| c.id.map(|id| (c.kind, id)))
            .collect()
    }

    pub fn fail_delete_of(&self, kind: EntityKind, id: i64) {
        self.failing_deletes.lock().insert((kind, id));
    }

    pub fn heal(&self) {
        self.failing_deletes.lock().clear();
    }

    /// Hold the next `find_by_id(kind, id)` between reading and returning.
    pub fn hold_next_find(&self, kind: EntityKind, id: i64) -> Arc<Gate> {
        self.hold_next(Op::FindById, kind, id)
    }

    /// Hold the next save of `(kind, id)` after it has been written.
    pub fn hold_next_save(&self, kind: EntityKind, id: i64) -> Arc<Gate> {
        self.hold_next(Op::Save, kind, id)
    }

    fn hold_next(&self, op: Op, kind: EntityKind, id: i64) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock() = Some((op, kind, id, gate.clone()));
        gate
    }

    async fn pass_gate(&self, op: Op, kind: EntityKind, id: i64) {
        let gate = {
            let mut slot = self.gate.lock();
            if matches!(&*slot, Some((o, k, i, _)) if *o == op && *k == kind && *i == id) {
                slot.take().map(|(_, _, _, gate)| gate)
            } else {
                None
            }
        };
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }
    }

    fn check_delete(&self, kind: EntityKind, id: i64) -> Result<()> {
        if self.failing_deletes.lock().contains(&(kind, id)) {
            return Err(Error::Store(format!("injected failure deleting {} {}", kind, id)));
        }
        Ok(())
    }
}

macro_rules! recording_repository {
    ($ty:ty, $kind:expr) => {
        #[async_trait]
        impl Repository<$ty> for RecordingStore {
            async fn find_by_id(&self, id: i64) -> Result<Option<$ty>> {
                self.record(Op::FindById, $kind, Some(id));
                let found = Repository::<$ty>::find_by_id(&self.inner, id).await?;
                self.pass_gate(Op::FindById, $kind, id).await;
                Ok(found)
            }

            async fn save(&self, record: $ty) -> Result<$ty> {
                self.record(Op::Save, $kind, record.id());
                let saved = Repository::<$ty>::save(&self.inner, record).await?;
                if let Some(id) = saved.id() {
                    self.pass_gate(Op::Save, $kind, id).await;
                }
                Ok(saved)
            }

            async fn delete_by_id(&self, id: i64) -> Result<bool> {
                self.record(Op::DeleteById, $kind, Some(id));
                self.check_delete($kind, id)?;
                Repository::<$ty>::delete_by_id(&self.inner, id).await
            }

            async fn find_all(&self, page: PageRequest) -> Result<Page<$ty>> {
                self.record(Op::FindAll, $kind, None);
                Repository::<$ty>::find_all(&self.inner, page).await
            }
        }
    };
}

recording_repository!(Patient, EntityKind::Patient);
recording_repository!(Order, EntityKind::Order);
recording_repository!(Test, EntityKind::Test);
recording_repository!(TestType, EntityKind::TestType);

#[async_trait]
impl PatientRepository for RecordingStore {
    async fn find_by_full_name(
        &self,
        last_name: Option<&str>,
        first_name: Option<&str>,
        middle_name: Option<&str>,
    ) -> Result<Vec<Patient>> {
        self.record(Op::Search, EntityKind::Patient, None);
        self.inner
            .find_by_full_name(last_name, first_name, middle_name)
            .await
    }

    async fn find_by_birth_date(&self, birth_date: NaiveDate) -> Result<Vec<Patient>> {
        self.record(Op::Search, EntityKind::Patient, None);
        self.inner.find_by_birth_date(birth_date).await
    }

    async fn find_by_full_name_and_birth_date(
        &self,
        last_name: &str,
        first_name: &str,
        middle_name: &str,
        birth_date: NaiveDate,
    ) -> Result<Vec<Patient>> {
        self.record(Op::Search, EntityKind::Patient, None);
        self.inner
            .find_by_full_name_and_birth_date(last_name, first_name, middle_name, birth_date)
            .await
    }
}

#[async_trait]
impl OrderRepository for RecordingStore {
    async fn find_by_patient_id(&self, patient_id: i64) -> Result<Vec<Order>> {
        self.record(Op::FindChildren, EntityKind::Order, Some(patient_id));
        self.inner.find_by_patient_id(patient_id).await
    }
}

#[async_trait]
impl TestRepository for RecordingStore {
    async fn find_by_order_id(&self, order_id: i64) -> Result<Vec<Test>> {
        self.record(Op::FindChildren, EntityKind::Test, Some(order_id));
        self.inner.find_by_order_id(order_id).await
    }

    async fn find_all_by_test_type_id(&self, test_type_id: i64) -> Result<Vec<Test>> {
        self.record(Op::FindChildren, EntityKind::Test, Some(test_type_id));
        self.inner.find_all_by_test_type_id(test_type_id).await
    }
}

impl TestTypeRepository for RecordingStore {}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub ctx: LabContext,
    pub store: Arc<RecordingStore>,
    pub events: Arc<InMemoryEventCollector>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(LabConfig::default())
    }

    pub fn with_config(config: LabConfig) -> Self {
        let store = Arc::new(RecordingStore::new());
        let events = Arc::new(InMemoryEventCollector::new());
        let ctx = LabContext::new(&config, Stores::from_shared(store.clone()), events.clone())
            .expect("valid test configuration");
        Self { ctx, store, events }
    }

    /// Insert a patient straight into the Store, bypassing the services.
    pub async fn patient(&self, id: i64, last: &str, first: &str, middle: Option<&str>) -> Patient {
        self.store
            .inner()
            .save(Patient {
                id: Some(id),
                last_name: last.into(),
                first_name: first.into(),
                middle_name: middle.map(Into::into),
                birth_date: birth_date(),
                gender: Gender::Female,
                phone_number: None,
                snils: None,
            })
            .await
            .expect("patient saved")
    }

    pub async fn order(&self, id: i64, patient_id: i64) -> Order {
        self.store
            .inner()
            .save(Order {
                id: Some(id),
                patient_id,
                created_at: NaiveDate::from_ymd_opt(2025, 4, 9)
                    .and_then(|d| d.and_hms_opt(16, 51, 16))
                    .expect("valid timestamp"),
                status: OrderStatus::Registered,
                comment: None,
            })
            .await
            .expect("order saved")
    }

    pub async fn test_type(&self, id: i64, code: &str) -> TestType {
        self.store
            .inner()
            .save(TestType {
                id: Some(id),
                name: format!("{} panel", code),
                code: code.into(),
                description: None,
                price: 500.0,
            })
            .await
            .expect("test type saved")
    }

    pub async fn test(&self, id: i64, order_id: i64, test_type_id: i64) -> Test {
        self.store
            .inner()
            .save(Test {
                id: Some(id),
                order_id,
                test_type_id,
                executed_at: None,
                result: None,
                reference_values: None,
                status: TestStatus::Pending,
            })
            .await
            .expect("test saved")
    }
}

pub fn birth_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1978, 6, 14).expect("valid date")
}
