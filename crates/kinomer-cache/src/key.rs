use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Composite cache key: featurizer class identifier, configuration
/// fingerprint, and the identity of the input being featurized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    featurizer: String,
    config: String,
    input: String,
}

impl CacheKey {
    pub fn new(
        featurizer: impl Into<String>,
        config: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            featurizer: featurizer.into(),
            config: config.into(),
            input: input.into(),
        }
    }

    pub fn featurizer(&self) -> &str {
        &self.featurizer
    }

    pub fn config(&self) -> &str {
        &self.config
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Content address of this key. Stable across processes, so digests can
    /// chain stage to stage and survive in the durable store.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.featurizer.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.config.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.input.as_bytes());
        let mut hex = String::with_capacity(64);
        for byte in hasher.finalize() {
            hex.push_str(&format!("{byte:02x}"));
        }
        hex
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]:{}", self.featurizer, self.config, &self.digest()[..12])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_stable() {
        let a = CacheKey::new("morgan_fingerprint", "abcd", "m-1");
        let b = CacheKey::new("morgan_fingerprint", "abcd", "m-1");
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_digest_separates_fields() {
        // "ab"+"c" must not collide with "a"+"bc"
        let a = CacheKey::new("ab", "c", "x");
        let b = CacheKey::new("a", "bc", "x");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_digest_depends_on_all_parts() {
        let base = CacheKey::new("f", "c", "i");
        assert_ne!(base.digest(), CacheKey::new("g", "c", "i").digest());
        assert_ne!(base.digest(), CacheKey::new("f", "d", "i").digest());
        assert_ne!(base.digest(), CacheKey::new("f", "c", "j").digest());
    }
}
