//! Cache Eviction Policies
//!
//! Decide which entry a full region gives up when a new key arrives.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Named eviction strategies selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Least recently used
    #[default]
    Lru,
    /// Least frequently used
    Lfu,
    /// Recency and frequency blended
    LruK,
}

impl FromStr for PolicyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(PolicyKind::Lru),
            "lfu" => Ok(PolicyKind::Lfu),
            "lru-k" | "lruk" => Ok(PolicyKind::LruK),
            other => Err(Error::Config(format!("unknown eviction policy '{}'", other))),
        }
    }
}

/// Eviction policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionPolicy {
    /// Name of the policy
    pub name: &'static str,
    /// Weight for recency in eviction score (0.0 - 1.0)
    pub recency_weight: f64,
    /// Weight for frequency in eviction score (0.0 - 1.0)
    pub frequency_weight: f64,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::lru()
    }
}

impl From<PolicyKind> for EvictionPolicy {
    fn from(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::Lru => Self::lru(),
            PolicyKind::Lfu => Self::lfu(),
            PolicyKind::LruK => Self::lru_k(),
        }
    }
}

impl EvictionPolicy {
    /// Pure LRU eviction policy
    ///
    /// Evicts least recently accessed items first.
    pub fn lru() -> Self {
        Self {
            name: "LRU",
            recency_weight: 1.0,
            frequency_weight: 0.0,
        }
    }

    /// LFU eviction policy
    ///
    /// Evicts least frequently accessed items first.
    pub fn lfu() -> Self {
        Self {
            name: "LFU",
            recency_weight: 0.0,
            frequency_weight: 1.0,
        }
    }

    /// LRU-K eviction policy
    ///
    /// Balances recency and frequency, penalizing infrequently accessed items.
    pub fn lru_k() -> Self {
        Self {
            name: "LRU-K",
            recency_weight: 0.5,
            frequency_weight: 0.5,
        }
    }

    /// Calculate eviction score for an entry
    ///
    /// Higher score = more likely to evict
    pub fn calculate_score(&self, idle_secs: f64, access_count: u32) -> f64 {
        let idle_score = idle_secs / 60.0;
        let freq_score = 1.0 / (access_count as f64 + 1.0);

        self.recency_weight * idle_score + self.frequency_weight * freq_score
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_weights() {
        let lru = EvictionPolicy::lru();
        assert_eq!(lru.recency_weight, 1.0);
        assert_eq!(lru.frequency_weight, 0.0);

        let lfu = EvictionPolicy::from(PolicyKind::Lfu);
        assert_eq!(lfu.name, "LFU");
        assert_eq!(lfu.frequency_weight, 1.0);
    }

    #[test]
    fn test_lru_prefers_idle_entries() {
        let policy = EvictionPolicy::lru();
        let recent = policy.calculate_score(1.0, 1);
        let idle = policy.calculate_score(300.0, 1);
        assert!(idle > recent);
    }

    #[test]
    fn test_lfu_prefers_rare_entries() {
        let policy = EvictionPolicy::lfu();
        let hot = policy.calculate_score(300.0, 50);
        let rare = policy.calculate_score(1.0, 1);
        assert!(rare > hot, "Rarely used entries should be evicted first");
    }

    #[test]
    fn test_policy_kind_parsing() {
        assert_eq!("LRU".parse::<PolicyKind>().unwrap(), PolicyKind::Lru);
        assert_eq!("lru-k".parse::<PolicyKind>().unwrap(), PolicyKind::LruK);
        assert!("fifo".parse::<PolicyKind>().is_err());
    }
}
