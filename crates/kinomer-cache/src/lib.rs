//! # kinomer-cache
//!
//! Content-addressed memoization for featurization results.
//!
//! * Composite [`CacheKey`]s over (featurizer identity, configuration
//!   fingerprint, input identity)
//! * Single-flight `get_or_compute`: concurrent requests for one key run
//!   the computation at most once
//! * Success and failure markers, so known-failing inputs are not retried
//! * LRU bounds by entry count and byte budget
//! * Durable append-only JSON-lines store with a schema tag; corrupt or
//!   incompatible entries degrade to cache misses
//!
mod config;
mod key;
mod persist;
mod store;

pub use self::config::{CacheConfig, CacheMetrics};
pub use self::key::CacheKey;
pub use self::store::{CacheGetError, FeatureCache};
