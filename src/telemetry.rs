//! Cache Telemetry
//!
//! Mirrors [`RegionStats`] snapshots into Prometheus metrics labelled by
//! region. Counters only move forward; each observation adds the delta since
//! the previous one.

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::cache::RegionStats;
use crate::error::{Error, Result};

const NAMESPACE: &str = "labcore_cache";

/// Prometheus view of the cache regions
pub struct CacheMetrics {
    registry: Registry,
    entries: IntGaugeVec,
    capacity: IntGaugeVec,
    hits: IntCounterVec,
    misses: IntCounterVec,
    inserts: IntCounterVec,
    rejected_loads: IntCounterVec,
    evictions: IntCounterVec,
    invalidations: IntCounterVec,
    expirations: IntCounterVec,
}

fn metric_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics registry: {}", e))
}

impl CacheMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let gauge = |name: &str, help: &str| -> Result<IntGaugeVec> {
            let g = IntGaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), &["region"])
                .map_err(metric_error)?;
            registry.register(Box::new(g.clone())).map_err(metric_error)?;
            Ok(g)
        };
        let counter = |name: &str, help: &str| -> Result<IntCounterVec> {
            let c = IntCounterVec::new(Opts::new(name, help).namespace(NAMESPACE), &["region"])
                .map_err(metric_error)?;
            registry.register(Box::new(c.clone())).map_err(metric_error)?;
            Ok(c)
        };

        Ok(Self {
            entries: gauge("entries", "Live entries per region")?,
            capacity: gauge("capacity", "Maximum entries per region")?,
            hits: counter("hits_total", "Lookups answered from the cache")?,
            misses: counter("misses_total", "Lookups that fell through to the store")?,
            inserts: counter("inserts_total", "Entries written")?,
            rejected_loads: counter(
                "rejected_loads_total",
                "Read-through populates dropped after a concurrent write or evict",
            )?,
            evictions: counter("evictions_total", "Entries removed for capacity")?,
            invalidations: counter("invalidations_total", "Explicit evictions")?,
            expirations: counter("expirations_total", "Entries removed after their TTL")?,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Fold a set of region snapshots into the metrics.
    pub fn observe(&self, stats: &[RegionStats]) {
        for s in stats {
            let region = [s.region.as_str()];
            self.entries.with_label_values(&region).set(s.entries as i64);
            self.capacity.with_label_values(&region).set(s.capacity as i64);

            advance(&self.hits, &region, s.hits);
            advance(&self.misses, &region, s.misses);
            advance(&self.inserts, &region, s.inserts);
            advance(&self.rejected_loads, &region, s.rejected_loads);
            advance(&self.evictions, &region, s.evictions);
            advance(&self.invalidations, &region, s.invalidations);
            advance(&self.expirations, &region, s.expirations);
        }
    }

    /// Text exposition format
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

fn advance(counter: &IntCounterVec, region: &[&str; 1], total: u64) {
    let c = counter.with_label_values(region);
    let delta = total.saturating_sub(c.get());
    if delta > 0 {
        c.inc_by(delta);
    }
}

impl std::fmt::Debug for CacheMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMetrics").finish_non_exhaustive()
    }
}
