//! Domain Ports (Port/Adapter Pattern)
//!
//! Abstractions the services and the cache coordinator depend on. The Store
//! is consumed only through these traits; adapters supply implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  PatientRepository │ OrderRepository │ TestRepository│    │
//! │  │  TestTypeRepository │ EventPublisher                 │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  InMemoryStore │ LoggingEventPublisher │ HttpNotification    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::dto::{Page, PageRequest};
use super::events::DomainEvent;
use super::model::{Order, Patient, Record, Test, TestType};
use crate::error::Result;

// =============================================================================
// Repository Ports
// =============================================================================

/// Key-addressable record storage for one entity kind.
#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    /// Find a record by id.
    async fn find_by_id(&self, id: i64) -> Result<Option<T>>;

    /// Insert when the record has no id, update otherwise. Returns the stored record.
    async fn save(&self, record: T) -> Result<T>;

    /// Delete by id. Returns `false` if nothing was stored under `id`.
    async fn delete_by_id(&self, id: i64) -> Result<bool>;

    /// Delete a stored record.
    async fn delete(&self, record: &T) -> Result<bool> {
        match record.id() {
            Some(id) => self.delete_by_id(id).await,
            None => Ok(false),
        }
    }

    /// Check whether a record exists.
    async fn exists_by_id(&self, id: i64) -> Result<bool> {
        Ok(self.find_by_id(id).await?.is_some())
    }

    /// One page of records ordered by id.
    async fn find_all(&self, page: PageRequest) -> Result<Page<T>>;
}

#[async_trait]
pub trait PatientRepository: Repository<Patient> {
    /// Exact match on the name triplet; `None` matches only an absent field.
    async fn find_by_full_name(
        &self,
        last_name: Option<&str>,
        first_name: Option<&str>,
        middle_name: Option<&str>,
    ) -> Result<Vec<Patient>>;

    async fn find_by_birth_date(&self, birth_date: NaiveDate) -> Result<Vec<Patient>>;

    async fn find_by_full_name_and_birth_date(
        &self,
        last_name: &str,
        first_name: &str,
        middle_name: &str,
        birth_date: NaiveDate,
    ) -> Result<Vec<Patient>>;
}

#[async_trait]
pub trait OrderRepository: Repository<Order> {
    async fn find_by_patient_id(&self, patient_id: i64) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait TestRepository: Repository<Test> {
    async fn find_by_order_id(&self, order_id: i64) -> Result<Vec<Test>>;

    async fn find_all_by_test_type_id(&self, test_type_id: i64) -> Result<Vec<Test>>;
}

#[async_trait]
pub trait TestTypeRepository: Repository<TestType> {}

/// Handles to the four repositories, shared by the coordinator and services.
#[derive(Clone)]
pub struct Stores {
    pub patients: Arc<dyn PatientRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub tests: Arc<dyn TestRepository>,
    pub test_types: Arc<dyn TestTypeRepository>,
}

impl Stores {
    /// Use a single adapter for all four repositories.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: PatientRepository + OrderRepository + TestRepository + TestTypeRepository + 'static,
    {
        Self {
            patients: store.clone(),
            orders: store.clone(),
            tests: store.clone(),
            test_types: store,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

// =============================================================================
// Event Publisher Port
// =============================================================================

/// Port for publishing domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event.
    async fn publish(&self, event: DomainEvent) -> Result<()>;

    /// Publish multiple events.
    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        (**self).publish(event).await
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        (**self).publish_all(events).await
    }
}
