//! Order operations

use std::sync::Arc;

use tracing::{info, instrument};

use super::{publish, require};
use crate::coordinator::{CacheCoordinator, CascadeReport};
use crate::domain::model::now;
use crate::domain::{
    DomainEvent, EntityKind, EventPublisher, Order, OrderDto, OrderRequest, OrderStatus, Page,
    PageRequest, Stores, TestDto,
};
use crate::error::{Error, Result};

pub struct OrderService {
    coordinator: Arc<CacheCoordinator>,
    stores: Stores,
    events: Arc<dyn EventPublisher>,
}

impl OrderService {
    pub fn new(coordinator: Arc<CacheCoordinator>, events: Arc<dyn EventPublisher>) -> Self {
        let stores = coordinator.stores().clone();
        Self {
            coordinator,
            stores,
            events,
        }
    }

    pub async fn get_all(&self, page: PageRequest) -> Result<Page<OrderDto>> {
        let found = self.stores.orders.find_all(page).await?;
        if found.is_empty() {
            return Err(Error::no_matches(
                EntityKind::Order,
                format!("page {} of size {}", page.page, page.size),
            ));
        }
        Ok(found.map(|o| OrderDto::from(&o)))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<OrderDto> {
        self.coordinator.get_cached(id).await
    }

    /// Register an order for an existing patient.
    #[instrument(skip(self, request), fields(patient_id = request.patient_id))]
    pub async fn create(&self, request: OrderRequest) -> Result<OrderDto> {
        if !self.stores.patients.exists_by_id(request.patient_id).await? {
            return Err(Error::not_found(EntityKind::Patient, request.patient_id));
        }

        let order = Order {
            id: None,
            patient_id: request.patient_id,
            created_at: now(),
            status: request.status.unwrap_or(OrderStatus::Registered),
            comment: request.comment,
        };
        let saved = self.stores.orders.save(order).await?;
        let dto = OrderDto::from(&saved);
        info!(id = dto.id, "Order created");
        publish(&*self.events, DomainEvent::record_created(EntityKind::Order, dto.id)).await;
        Ok(dto)
    }

    /// Move an order to `status` and notify downstream.
    ///
    /// A failed notification does not fail the update.
    #[instrument(skip(self), fields(status = %status))]
    pub async fn update_status(&self, id: i64, status: OrderStatus) -> Result<OrderDto> {
        let mut order = require(self.stores.orders.find_by_id(id).await?, EntityKind::Order, id)?;
        let previous = order.status;
        order.status = status;

        let ticket = self.coordinator.begin_update(EntityKind::Order, id);
        let saved = self.stores.orders.save(order).await?;
        let dto = OrderDto::from(&saved);
        self.coordinator.put_on_update(ticket, &dto);
        info!(id, from = %previous, to = %status, "Order status changed");

        publish(
            &*self.events,
            DomainEvent::order_status_changed(id, previous, status),
        )
        .await;
        Ok(dto)
    }

    pub async fn get_by_patient(&self, patient_id: i64) -> Result<Vec<OrderDto>> {
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

    pub async fn get_tests(&self, order_id: i64) -> Result<Vec<TestDto>> {
        if !self.stores.orders.exists_by_id(order_id).await? {
            return Err(Error::not_found(EntityKind::Order, order_id));
        }
        let tests = self.stores.tests.find_by_order_id(order_id).await?;
        if tests.is_empty() {
            return Err(Error::no_matches(
                EntityKind::Test,
                format!("order {}", order_id),
            ));
        }
        Ok(tests.iter().map(TestDto::from).collect())
    }

    /// Delete an order with its tests.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<CascadeReport> {
        let report = self.coordinator.delete_cascade(EntityKind::Order, id).await?;
        publish(
            &*self.events,
            DomainEvent::cascade_deleted(EntityKind::Order, id, report.deleted.len(), report.evictions),
        )
        .await;
        Ok(report)
    }
}
