//! LabCore - Laboratory Information System Core
//!
//! Patient, order, lab test and test type services over a relational-style
//! Store, fronted by an in-process read-through cache that stays consistent
//! across creates, updates and cascading deletes.
//!
//! # Architecture
//!
//! ```text
//! Entity Services → Cache Coordinator → { Region Cache, Store }
//! ```
//!
//! Reads check the cache first and populate it on a miss. Updates write the
//! Store and then refresh the cache entry. Deletes walk the ownership graph
//! (patient → orders → tests, test type → tests), evicting every key that could
//! reference a deleted record before and after the Store delete.
//!
//! # Modules
//!
//! - [`adapters`] - Store and event publisher implementations
//! - [`cache`] - Sharded, bounded, TTL-expiring cache regions
//! - [`config`] - Configuration loading and validation
//! - [`coordinator`] - Read-through, write-through and delete cascades
//! - [`domain`] - Records, snapshots, ports and events
//! - [`error`] - Error types
//! - [`service`] - Entity services and the composition root
//! - [`telemetry`] - Prometheus export of cache statistics

pub mod adapters;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod service;
pub mod telemetry;

// Re-export commonly used types
pub use cache::{CacheManager, RegionName};
pub use config::LabConfig;
pub use coordinator::{CacheCoordinator, CascadeReport};
pub use error::{Error, Result};
pub use service::LabContext;

/// Crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
