//! Domain Events
//!
//! Immutable records of things that happened to the entity graph. Services
//! publish them through the [`EventPublisher`](super::ports::EventPublisher)
//! port; the notification adapter forwards order status changes downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{EntityKind, OrderStatus};

/// Domain event representing a significant occurrence in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// A record was created and assigned an id.
    RecordCreated {
        event_id: Uuid,
        kind: EntityKind,
        id: i64,
        timestamp: DateTime<Utc>,
    },

    /// A record was updated in place.
    RecordUpdated {
        event_id: Uuid,
        kind: EntityKind,
        id: i64,
        timestamp: DateTime<Utc>,
    },

    /// An order moved to a new status.
    OrderStatusChanged {
        event_id: Uuid,
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A delete cascade removed a record and its dependents.
    CascadeDeleted {
        event_id: Uuid,
        kind: EntityKind,
        id: i64,
        deleted_records: usize,
        evictions: usize,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn record_created(kind: EntityKind, id: i64) -> Self {
        DomainEvent::RecordCreated {
            event_id: Uuid::new_v4(),
            kind,
            id,
            timestamp: Utc::now(),
        }
    }

    pub fn record_updated(kind: EntityKind, id: i64) -> Self {
        DomainEvent::RecordUpdated {
            event_id: Uuid::new_v4(),
            kind,
            id,
            timestamp: Utc::now(),
        }
    }

    pub fn order_status_changed(order_id: i64, from: OrderStatus, to: OrderStatus) -> Self {
        DomainEvent::OrderStatusChanged {
            event_id: Uuid::new_v4(),
            order_id,
            from,
            to,
            message: format!("Order {} status changed to {}", order_id, to),
            timestamp: Utc::now(),
        }
    }

    pub fn cascade_deleted(
        kind: EntityKind,
        id: i64,
        deleted_records: usize,
        evictions: usize,
    ) -> Self {
        DomainEvent::CascadeDeleted {
            event_id: Uuid::new_v4(),
            kind,
            id,
            deleted_records,
            evictions,
            timestamp: Utc::now(),
        }
    }

    /// Short name used in logs.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::RecordCreated { .. } => "RecordCreated",
            DomainEvent::RecordUpdated { .. } => "RecordUpdated",
            DomainEvent::OrderStatusChanged { .. } => "OrderStatusChanged",
            DomainEvent::CascadeDeleted { .. } => "CascadeDeleted",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::RecordCreated { timestamp, .. }
            | DomainEvent::RecordUpdated { timestamp, .. }
            | DomainEvent::OrderStatusChanged { timestamp, .. }
            | DomainEvent::CascadeDeleted { timestamp, .. } => *timestamp,
        }
    }
}
