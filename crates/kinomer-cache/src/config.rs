use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::FeatureCache`] instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of stored entries (default: 4096).
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Byte budget across all stored payloads (default: 256 MiB).
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    /// Timeout applied to each computation; elapsed computations fail with
    /// a timeout error and release their in-flight slot (default: none).
    #[serde(default)]
    pub compute_timeout_secs: Option<u64>,
    /// Treat stored failure markers as misses, recomputing them. Set after
    /// a featurizer version change (default: false).
    #[serde(default)]
    pub force_recompute: bool,
}

fn default_max_entries() -> usize {
    4096
}

fn default_max_bytes() -> usize {
    256 * 1024 * 1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_bytes: default_max_bytes(),
            compute_timeout_secs: None,
            force_recompute: false,
        }
    }
}

/// Aggregate cache counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheMetrics {
    /// Hit rate as a fraction in [0.0, 1.0].
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialize_empty() {
        let config: CacheConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_entries, 4096);
        assert_eq!(config.max_bytes, 256 * 1024 * 1024);
        assert!(config.compute_timeout_secs.is_none());
        assert!(!config.force_recompute);
    }

    #[test]
    fn test_hit_rate() {
        let m = CacheMetrics {
            hits: 8,
            misses: 2,
            evictions: 0,
        };
        assert!((m.hit_rate() - 0.8).abs() < 1e-9);
        assert_eq!(CacheMetrics::default().hit_rate(), 0.0);
    }
}
