//! Infrastructure Adapters
//!
//! Implementations of the domain ports.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │  PatientRepository │ OrderRepository │ TestRepository      │ │
//! │  │  TestTypeRepository │ EventPublisher                       │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ InMemoryStore │ HttpNotificationPublisher                  │ │
//! │  │ LoggingEventPublisher │ InMemoryEventCollector             │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use labcore::adapters::InMemoryStore;
//! use labcore::domain::Stores;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let stores = Stores::from_shared(store);
//! ```

mod event_publisher;
mod memory;
mod notification;

pub use event_publisher::{CompositeEventPublisher, InMemoryEventCollector, LoggingEventPublisher};
pub use memory::InMemoryStore;
pub use notification::{HttpNotificationPublisher, DEFAULT_NOTIFICATION_TIMEOUT};
