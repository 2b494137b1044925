//! In-process event sinks: structured log lines, a test collector and a
//! fan-out that combines sinks.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::domain::events::DomainEvent;
use crate::domain::model::EntityKind;
use crate::domain::ports::EventPublisher;
use crate::error::Result;

/// Emits one structured `info` line per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventPublisher;

impl LoggingEventPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        match &event {
            DomainEvent::RecordCreated { kind, id, .. } => {
                info!(kind = %kind, id, "Record created");
            }
            DomainEvent::RecordUpdated { kind, id, .. } => {
                info!(kind = %kind, id, "Record updated");
            }
            DomainEvent::OrderStatusChanged {
                order_id, from, to, ..
            } => {
                info!(order_id, from = %from, to = %to, "Order status changed");
            }
            DomainEvent::CascadeDeleted {
                kind,
                id,
                deleted_records,
                evictions,
                ..
            } => {
                info!(kind = %kind, id, deleted_records, evictions, "Cascade delete finished");
            }
        }
        Ok(())
    }
}

/// Keeps every published event; used by tests to assert on side effects.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    seen: Mutex<Vec<DomainEvent>>,
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.seen.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    pub fn clear(&self) {
        self.seen.lock().clear();
    }

    /// Events named `event_type`, e.g. `"CascadeDeleted"`
    pub fn events_of_type(&self, event_type: &str) -> Vec<DomainEvent> {
        self.matching(|e| e.event_type() == event_type)
    }

    /// Create, update and cascade events about one record
    pub fn events_for(&self, kind: EntityKind, id: i64) -> Vec<DomainEvent> {
        self.matching(|e| match e {
            DomainEvent::RecordCreated { kind: k, id: i, .. }
            | DomainEvent::RecordUpdated { kind: k, id: i, .. }
            | DomainEvent::CascadeDeleted { kind: k, id: i, .. } => *k == kind && *i == id,
            DomainEvent::OrderStatusChanged { order_id, .. } => {
                kind == EntityKind::Order && *order_id == id
            }
        })
    }

    fn matching(&self, keep: impl Fn(&DomainEvent) -> bool) -> Vec<DomainEvent> {
        self.seen.lock().iter().filter(|e| keep(e)).cloned().collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        self.seen.lock().push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        self.seen.lock().extend(events);
        Ok(())
    }
}

/// Delivers each event to every sink in registration order.
///
/// A failing sink does not stop delivery to the rest; the first failure is
/// returned once all sinks have run.
#[derive(Default)]
pub struct CompositeEventPublisher {
    sinks: Vec<Box<dyn EventPublisher>>,
}

impl CompositeEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_publisher<P: EventPublisher + 'static>(mut self, publisher: P) -> Self {
        self.sinks.push(Box::new(publisher));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for CompositeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeEventPublisher")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[async_trait]
impl EventPublisher for CompositeEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let mut first_error = None;
        for (index, sink) in self.sinks.iter().enumerate() {
            if let Err(e) = sink.publish(event.clone()).await {
                warn!(sink = index, error = %e, event_type = event.event_type(), "Event sink failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderStatus;
    use crate::error::Error;
    use std::sync::Arc;

    struct Unreachable;

    #[async_trait]
    impl EventPublisher for Unreachable {
        async fn publish(&self, _event: DomainEvent) -> Result<()> {
            Err(Error::Notification("endpoint unreachable".into()))
        }
    }

    #[tokio::test]
    async fn logging_publisher_accepts_every_event() {
        let publisher = LoggingEventPublisher::new();
        publisher
            .publish_all(vec![
                DomainEvent::record_created(EntityKind::Patient, 1),
                DomainEvent::order_status_changed(2, OrderStatus::Registered, OrderStatus::Completed),
                DomainEvent::cascade_deleted(EntityKind::Patient, 1, 3, 9),
            ])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn collector_filters_by_type_and_record() {
        let collector = InMemoryEventCollector::new();
        assert!(collector.is_empty());

        collector
            .publish(DomainEvent::record_created(EntityKind::Order, 20))
            .await
            .unwrap();
        collector
            .publish(DomainEvent::order_status_changed(
                20,
                OrderStatus::Registered,
                OrderStatus::InProgress,
            ))
            .await
            .unwrap();
        collector
            .publish(DomainEvent::record_created(EntityKind::Test, 20))
            .await
            .unwrap();

        assert_eq!(collector.len(), 3);
        assert_eq!(collector.events_of_type("OrderStatusChanged").len(), 1);
        assert_eq!(collector.events_for(EntityKind::Order, 20).len(), 2);
        assert_eq!(collector.events_for(EntityKind::Test, 20).len(), 1);

        collector.clear();
        assert!(collector.is_empty());
    }

    #[tokio::test]
    async fn composite_keeps_delivering_after_a_failure() {
        let collector = Arc::new(InMemoryEventCollector::new());
        let composite = CompositeEventPublisher::new()
            .with_publisher(Unreachable)
            .with_publisher(collector.clone());
        assert_eq!(composite.len(), 2);

        let result = composite
            .publish(DomainEvent::record_updated(EntityKind::Test, 55))
            .await;

        assert!(matches!(result, Err(Error::Notification(_))));
        assert_eq!(collector.len(), 1);
    }
}
