//! Entity Services
//!
//! Application operations over patients, orders, tests and test types. Every
//! service reads and writes the Store through [`Stores`] and goes through the
//! [`CacheCoordinator`] for anything cached.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          LabContext                           │
//! │  PatientService │ OrderService │ TestService │ TestTypeService│
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//!              ┌─────────────────┴──────────────────┐
//!              ▼                                    ▼
//!      CacheCoordinator ──▶ CacheManager        EventPublisher
//!              │
//!              ▼
//!            Stores
//! ```

mod order;
mod patient;
mod test_type;

use std::sync::Arc;

use tracing::{info, warn};

use crate::adapters::{
    CompositeEventPublisher, HttpNotificationPublisher, InMemoryStore, LoggingEventPublisher,
};
use crate::cache::CacheManager;
use crate::config::LabConfig;
use crate::coordinator::CacheCoordinator;
use crate::domain::{DomainEvent, EntityKind, EventPublisher, Stores};
use crate::error::{Error, Result};

pub use order::OrderService;
pub use patient::PatientService;
pub use test::TestService;
pub use test_type::TestTypeService;

/// Publish an event; delivery failures are logged and swallowed.
async fn publish(events: &dyn EventPublisher, event: DomainEvent) {
    let event_type = event.event_type();
    if let Err(e) = events.publish(event).await {
        warn!(error = %e, event_type, "Event delivery failed");
    }
}

fn require<T>(found: Option<T>, kind: EntityKind, id: i64) -> Result<T> {
    found.ok_or_else(|| Error::not_found(kind, id))
}

/// Composition root: cache, coordinator, Store handles and services
pub struct LabContext {
    pub cache: Arc<CacheManager>,
    pub coordinator: Arc<CacheCoordinator>,
    pub stores: Stores,
    pub patients: PatientService,
    pub orders: OrderService,
    pub tests: TestService,
    pub test_types: TestTypeService,
}

impl LabContext {
    pub fn new(config: &LabConfig, stores: Stores, events: Arc<dyn EventPublisher>) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(CacheManager::with_config(config.cache_config()));
        let coordinator = Arc::new(CacheCoordinator::new(cache.clone(), stores.clone()));

        Ok(Self {
            patients: PatientService::new(coordinator.clone(), events.clone()),
            orders: OrderService::new(coordinator.clone(), events.clone()),
            tests: TestService::new(coordinator.clone(), events.clone()),
            test_types: TestTypeService::new(coordinator.clone(), events),
            cache,
            coordinator,
            stores,
        })
    }

    /// Context over a fresh [`InMemoryStore`] with the publishers `config` asks for.
    pub fn in_memory(config: &LabConfig) -> Result<(Self, Arc<InMemoryStore>)> {
        let store = Arc::new(InMemoryStore::new());
        let events = Arc::new(Self::publisher_for(config)?);
        let context = Self::new(config, Stores::from_shared(store.clone()), events)?;
        Ok((context, store))
    }

    /// Logging publisher, plus HTTP notifications when a URL is configured.
    pub fn publisher_for(config: &LabConfig) -> Result<CompositeEventPublisher> {
        let mut publisher = CompositeEventPublisher::new().with_publisher(LoggingEventPublisher::new());
        if let Some(url) = &config.notification_url {
            let notifier = HttpNotificationPublisher::new(url.clone(), config.notification_timeout)?;
            info!(endpoint = %notifier.endpoint(), "Order notifications enabled");
            publisher = publisher.with_publisher(notifier);
        }
        Ok(publisher)
    }
}

impl std::fmt::Debug for LabContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabContext")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publisher_for_adds_notifier() {
        let plain = LabContext::publisher_for(&LabConfig::default()).unwrap();
        assert_eq!(plain.len(), 1);

        let config = LabConfig::default().with_notification_url("http://localhost:9000/notify");
        let with_notify = LabContext::publisher_for(&config).unwrap();
        assert_eq!(with_notify.len(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LabConfig::default().with_capacity(0);
        assert!(matches!(LabContext::in_memory(&config), Err(Error::Config(_))));
    }
}
