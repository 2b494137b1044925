//! Configuration
//!
//! Settings for the cache and the notification adapter. Loaded from YAML and
//! overridden from the command line in the binary.
//!
//! ```yaml
//! cache:
//!   capacity_per_region: 500
//!   ttl_seconds: 600
//!   shards_per_region: 16
//!   eviction_policy: lru
//! notification_url: http://notify.local/api/notifications
//! notification_timeout_seconds: 5
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapters::DEFAULT_NOTIFICATION_TIMEOUT;
use crate::cache::{
    CacheConfig, PolicyKind, DEFAULT_REGION_CAPACITY, DEFAULT_SHARDS_PER_REGION, DEFAULT_TTL,
};
use crate::error::{Error, Result};

/// Cache bounds applied to every region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub capacity_per_region: usize,
    #[serde(rename = "ttl_seconds", with = "seconds")]
    pub ttl: Duration,
    /// Must be a power of two
    pub shards_per_region: usize,
    pub eviction_policy: PolicyKind,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity_per_region: DEFAULT_REGION_CAPACITY,
            ttl: DEFAULT_TTL,
            shards_per_region: DEFAULT_SHARDS_PER_REGION,
            eviction_policy: PolicyKind::default(),
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        CacheConfig {
            capacity_per_region: settings.capacity_per_region,
            ttl: settings.ttl,
            shards_per_region: settings.shards_per_region,
            eviction_policy: settings.eviction_policy.into(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    pub cache: CacheSettings,
    /// Endpoint receiving order status notifications; disabled when unset
    pub notification_url: Option<String>,
    #[serde(rename = "notification_timeout_seconds", with = "seconds")]
    pub notification_timeout: Duration,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            notification_url: None,
            notification_timeout: DEFAULT_NOTIFICATION_TIMEOUT,
        }
    }
}

impl LabConfig {
    /// Parse a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: LabConfig = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loading configuration");
        Self::from_yaml_str(&yaml)
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.cache.capacity_per_region = capacity;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = ttl;
        self
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.cache.shards_per_region = shards;
        self
    }

    pub fn with_eviction_policy(mut self, policy: PolicyKind) -> Self {
        self.cache.eviction_policy = policy;
        self
    }

    pub fn with_notification_url(mut self, url: impl Into<String>) -> Self {
        self.notification_url = Some(url.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity_per_region == 0 {
            return Err(Error::Config("cache capacity must be positive".into()));
        }
        if self.cache.ttl.is_zero() {
            return Err(Error::Config("cache TTL must be positive".into()));
        }
        if !self.cache.shards_per_region.is_power_of_two() {
            return Err(Error::Config(format!(
                "shards per region must be a power of two, got {}",
                self.cache.shards_per_region
            )));
        }
        if self.notification_timeout.is_zero() {
            return Err(Error::Config("notification timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::from(&self.cache)
    }
}

/// Durations stored as whole seconds
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
