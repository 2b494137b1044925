//! Patient operations
//!
//! By-id reads are cached in `patients`. Name and birth-date searches are
//! memoized in their own regions and are not refreshed by updates; they go
//! stale until TTL, capacity eviction, or deletion of a patient with the same
//! key.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, instrument};

use super::{publish, require};
use crate::cache::{CacheKey, RegionName};
use crate::coordinator::{CacheCoordinator, CascadeReport};
use crate::domain::{
    DomainEvent, EntityKind, EventPublisher, OrderDto, Page, PageRequest, PatientDto,
    PatientRequest, PatientSearch, Stores,
};
use crate::error::{Error, Result};

pub struct PatientService {
    coordinator: Arc<CacheCoordinator>,
    stores: Stores,
    events: Arc<dyn EventPublisher>,
}

impl PatientService {
    pub fn new(coordinator: Arc<CacheCoordinator>, events: Arc<dyn EventPublisher>) -> Self {
        let stores = coordinator.stores().clone();
        Self {
            coordinator,
            stores,
            events,
        }
    }

    pub async fn get_all(&self, page: PageRequest) -> Result<Page<PatientDto>> {
        let found = self.stores.patients.find_all(page).await?;
        if found.is_empty() {
            return Err(Error::no_matches(
                EntityKind::Patient,
                format!("page {} of size {}", page.page, page.size),
            ));
        }
        Ok(found.map(|p| PatientDto::from(&p)))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<PatientDto> {
        self.coordinator.get_cached(id).await
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: PatientRequest) -> Result<PatientDto> {
        validate(&request)?;
        let saved = self.stores.patients.save(request.into_record()).await?;
        let dto = PatientDto::from(&saved);
        info!(id = dto.id, "Patient created");
        publish(&*self.events, DomainEvent::record_created(EntityKind::Patient, dto.id)).await;
        Ok(dto)
    }

    /// Overwrite a patient and refresh its by-id cache entry.
    #[instrument(skip(self, request))]
    pub async fn update(&self, id: i64, request: PatientRequest) -> Result<PatientDto> {
        validate(&request)?;
        let mut patient = require(
            self.stores.patients.find_by_id(id).await?,
            EntityKind::Patient,
            id,
        )?;
        request.apply_to(&mut patient);

        let ticket = self.coordinator.begin_update(EntityKind::Patient, id);
        let saved = self.stores.patients.save(patient).await?;
        let dto = PatientDto::from(&saved);
        self.coordinator.put_on_update(ticket, &dto);
        info!(id, "Patient updated");
        publish(&*self.events, DomainEvent::record_updated(EntityKind::Patient, id)).await;
        Ok(dto)
    }

    /// Orders of a patient, straight from the Store.
    pub async fn get_orders(&self, patient_id: i64) -> Result<Vec<OrderDto>> {
        if !self.stores.patients.exists_by_id(patient_id).await? {
            return Err(Error::not_found(EntityKind::Patient, patient_id));
        }
        let orders = self.stores.orders.find_by_patient_id(patient_id).await?;
        if orders.is_empty() {
            return Err(Error::no_matches(
                EntityKind::Order,
                format!("patient {}", patient_id),
            ));
        }
        Ok(orders.iter().map(OrderDto::from).collect())
    }

    /// Exact match on the name triplet; an absent part matches only patients
    /// without that part.
    #[instrument(skip(self))]
    pub async fn search_by_name(
        &self,
        last_name: Option<&str>,
        first_name: Option<&str>,
        middle_name: Option<&str>,
    ) -> Result<Vec<PatientDto>> {
        if last_name.is_none() && first_name.is_none() && middle_name.is_none() {
            return Err(Error::InvalidArgument(
                "name search needs at least one name part".into(),
            ));
        }

        let key = CacheKey::name(last_name, first_name, middle_name);
        let stores = self.stores.clone();
        let (last, first, middle) = (
            last_name.map(str::to_owned),
            first_name.map(str::to_owned),
            middle_name.map(str::to_owned),
        );

        self.coordinator
            .search_cached(RegionName::PatientsByName, key, move || async move {
                let found = stores
                    .patients
                    .find_by_full_name(last.as_deref(), first.as_deref(), middle.as_deref())
                    .await?;
                non_empty(found.iter().map(PatientDto::from).collect(), || {
                    format!(
                        "name {} {} {}",
                        last.as_deref().unwrap_or("-"),
                        first.as_deref().unwrap_or("-"),
                        middle.as_deref().unwrap_or("-")
                    )
                })
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn search_by_birth_date(&self, birth_date: NaiveDate) -> Result<Vec<PatientDto>> {
        let stores = self.stores.clone();
        self.coordinator
            .search_cached(
                RegionName::PatientsByBirthDate,
                CacheKey::BirthDate(birth_date),
                move || async move {
                    let found = stores.patients.find_by_birth_date(birth_date).await?;
                    non_empty(found.iter().map(PatientDto::from).collect(), || {
                        format!("birth date {}", birth_date)
                    })
                },
            )
            .await
    }

    /// Combined search, never cached.
    ///
    /// All four fields select the name-and-date finder; otherwise a birth date
    /// selects the date finder, and any name part selects the name finder.
    pub async fn search(&self, criteria: &PatientSearch) -> Result<Vec<PatientDto>> {
        let found = match (
            criteria.last_name.as_deref(),
            criteria.first_name.as_deref(),
            criteria.middle_name.as_deref(),
            criteria.birth_date,
        ) {
            (Some(last), Some(first), Some(middle), Some(date)) => {
                self.stores
                    .patients
                    .find_by_full_name_and_birth_date(last, first, middle, date)
                    .await?
            }
            (_, _, _, Some(date)) => self.stores.patients.find_by_birth_date(date).await?,
            (last, first, middle, None) if criteria.has_name() => {
                self.stores
                    .patients
                    .find_by_full_name(last, first, middle)
                    .await?
            }
            _ => {
                return Err(Error::InvalidArgument(
                    "at least one search criterion is required".into(),
                ))
            }
        };

        non_empty(found.iter().map(PatientDto::from).collect(), || {
            format!("{:?}", criteria)
        })
    }

    /// Delete a patient with all orders and tests.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<CascadeReport> {
        let report = self
            .coordinator
            .delete_cascade(EntityKind::Patient, id)
            .await?;
        publish(
            &*self.events,
            DomainEvent::cascade_deleted(
                EntityKind::Patient,
                id,
                report.deleted.len(),
                report.evictions,
            ),
        )
        .await;
        Ok(report)
    }
}

fn validate(request: &PatientRequest) -> Result<()> {
    if request.last_name.trim().is_empty() || request.first_name.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "last and first name are required".into(),
        ));
    }
    Ok(())
}

fn non_empty(found: Vec<PatientDto>, criteria: impl FnOnce() -> String) -> Result<Vec<PatientDto>> {
    if found.is_empty() {
        return Err(Error::no_matches(EntityKind::Patient, criteria()));
    }
    Ok(found)
}
