//! Test type catalogue operations

use std::sync::Arc;

use tracing::{info, instrument};

use super::{publish, require};
use crate::coordinator::{CacheCoordinator, CascadeReport};
use crate::domain::{
    DomainEvent, EntityKind, EventPublisher, Page, PageRequest, Stores, TestType, TestTypeDto,
    TestTypeRequest,
};
use crate::error::{Error, Result};

pub struct TestTypeService {
    coordinator: Arc<CacheCoordinator>,
    stores: Stores,
    events: Arc<dyn EventPublisher>,
}

impl TestTypeService {
    pub fn new(coordinator: Arc<CacheCoordinator>, events: Arc<dyn EventPublisher>) -> Self {
        let stores = coordinator.stores().clone();
        Self {
            coordinator,
            stores,
            events,
        }
    }

    pub async fn get_all(&self, page: PageRequest) -> Result<Page<TestTypeDto>> {
        let found = self.stores.test_types.find_all(page).await?;
        if found.is_empty() {
            return Err(Error::no_matches(
                EntityKind::TestType,
                format!("page {} of size {}", page.page, page.size),
            ));
        }
        Ok(found.map(|t| TestTypeDto::from(&t)))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<TestTypeDto> {
        self.coordinator.get_cached(id).await
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create(&self, request: TestTypeRequest) -> Result<TestTypeDto> {
        validate(&request)?;
        let mut test_type = TestType {
            id: None,
            name: String::new(),
            code: String::new(),
            description: None,
            price: 0.0,
        };
        request.apply_to(&mut test_type);

        let saved = self.stores.test_types.save(test_type).await?;
        let dto = TestTypeDto::from(&saved);
        info!(id = dto.id, "Test type created");
        publish(&*self.events, DomainEvent::record_created(EntityKind::TestType, dto.id)).await;
        Ok(dto)
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: i64, request: TestTypeRequest) -> Result<TestTypeDto> {
        validate(&request)?;
        let mut test_type = require(
            self.stores.test_types.find_by_id(id).await?,
            EntityKind::TestType,
            id,
        )?;
        request.apply_to(&mut test_type);

        let ticket = self.coordinator.begin_update(EntityKind::TestType, id);
        let saved = self.stores.test_types.save(test_type).await?;
        let dto = TestTypeDto::from(&saved);
        self.coordinator.put_on_update(ticket, &dto);
        info!(id, "Test type updated");
        publish(&*self.events, DomainEvent::record_updated(EntityKind::TestType, id)).await;
        Ok(dto)
    }

    /// Delete a test type together with every test of that type.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<CascadeReport> {
        let report = self
            .coordinator
            .delete_cascade(EntityKind::TestType, id)
            .await?;
        publish(
            &*self.events,
            DomainEvent::cascade_deleted(
                EntityKind::TestType,
                id,
                report.deleted.len(),
                report.evictions,
            ),
        )
        .await;
        Ok(report)
    }
}

fn validate(request: &TestTypeRequest) -> Result<()> {
    if request.name.trim().is_empty() || request.code.trim().is_empty() {
        return Err(Error::InvalidArgument("test type name and code are required".into()));
    }
    if !request.price.is_finite() || request.price < 0.0 {
        return Err(Error::InvalidArgument(format!(
            "test type price must be a non-negative amount, got {}",
            request.price
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, RegionName};
    use crate::config::LabConfig;
    use crate::service::LabContext;
    use assert_matches::assert_matches;

    fn request(code: &str, price: f64) -> TestTypeRequest {
        TestTypeRequest {
            name: "Cholesterol".into(),
            code: code.into(),
            description: Some("Total serum cholesterol".into()),
            price,
        }
    }

    #[tokio::test]
    async fn test_update_refreshes_cache() {
        let (ctx, _store) = LabContext::in_memory(&LabConfig::default()).unwrap();
        let created = ctx.test_types.create(request("CHOL", 420.0)).await.unwrap();
        ctx.test_types.get(created.id).await.unwrap();

        ctx.test_types
            .update(created.id, request("CHOL", 450.0))
            .await
            .unwrap();
        let cached = ctx
            .cache
            .get(RegionName::TestTypes, &CacheKey::Id(created.id))
            .unwrap();
        assert_matches!(cached, crate::cache::CacheValue::TestType(dto) if dto.price == 450.0);
    }

    #[tokio::test]
    async fn test_negative_price_rejected() {
        let (ctx, _store) = LabContext::in_memory(&LabConfig::default()).unwrap();
        assert_matches!(
            ctx.test_types.create(request("CHOL", -1.0)).await,
            Err(Error::InvalidArgument(_))
        );
    }

    #[tokio::test]
    async fn test_get_all_empty_is_no_matches() {
        let (ctx, _store) = LabContext::in_memory(&LabConfig::default()).unwrap();
        assert_matches!(
            ctx.test_types.get_all(PageRequest::default()).await,
            Err(Error::NoMatches { kind: EntityKind::TestType, .. })
        );
    }
}
