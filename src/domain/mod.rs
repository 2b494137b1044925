//! Domain Layer
//!
//! Entity records, DTO snapshots, ports and events.
//!
//! - **Model** (`model.rs`) - Stored records and their status enums
//! - **DTOs** (`dto.rs`) - Cached snapshots, requests and pagination
//! - **Ports** (`ports.rs`) - Store and publisher abstractions
//! - **Events** (`events.rs`) - Domain events for notifications and audit

pub mod dto;
pub mod events;
pub mod model;
pub mod ports;

pub use dto::{
    OrderDto, OrderRequest, Page, PageRequest, PatientDto, PatientRequest, PatientSearch, TestDto,
    TestRequest, TestTypeDto, TestTypeRequest,
};
pub use events::DomainEvent;
pub use model::{
    EntityKind, Gender, Order, OrderStatus, Patient, Record, Test, TestStatus, TestType,
};
pub use ports::{
    EventPublisher, OrderRepository, PatientRepository, Repository, Stores, TestRepository,
    TestTypeRepository,
};
