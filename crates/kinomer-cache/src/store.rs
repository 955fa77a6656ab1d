use crate::config::{CacheConfig, CacheMetrics};
use crate::key::CacheKey;
use crate::persist;
use candle_core::Tensor;
use kinomer_core::{CacheError, FeaturizeError};
use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the cache remembers for a key: the tensor, or the error the
/// computation produced (so known-failing inputs are not recomputed).
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Success(Tensor),
    Failure(FeaturizeError),
}

/// Failure modes of [`FeatureCache::get_or_compute`]: either the
/// computation itself failed (possibly replayed from a stored marker), or
/// the cache detected an integrity/persistence problem.
#[derive(Debug, thiserror::Error)]
pub enum CacheGetError {
    #[error(transparent)]
    Compute(#[from] FeaturizeError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

struct StoredEntry {
    key: CacheKey,
    outcome: Outcome,
    bytes: usize,
}

struct State {
    lru: LruCache<String, StoredEntry>,
    bytes: usize,
    metrics: CacheMetrics,
}

/// Content-addressed, single-flight memoization store for featurization
/// results.
///
/// Explicitly constructed and lifetime-scoped: pass one instance into each
/// `DatasetProvider` rather than sharing hidden process-wide state.
pub struct FeatureCache {
    config: CacheConfig,
    state: Mutex<State>,
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    store_path: Option<PathBuf>,
}

impl FeatureCache {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries.max(1)).expect("capacity is >= 1");
        Self {
            config,
            state: Mutex::new(State {
                lru: LruCache::new(capacity),
                bytes: 0,
                metrics: CacheMetrics::default(),
            }),
            inflight: Mutex::new(HashMap::new()),
            store_path: None,
        }
    }

    /// A cache backed by an append-only store at `path`. Existing entries
    /// are loaded up front; every committed outcome is written through.
    pub fn with_store(config: CacheConfig, path: impl Into<PathBuf>) -> Self {
        let mut cache = Self::new(config);
        let path = path.into();
        let loaded = cache.merge_entries(persist::read_entries(&path));
        tracing::debug!(path = %path.display(), loaded, "cache store loaded");
        cache.store_path = Some(path);
        cache
    }

    /// Look up `key`, computing and committing on a miss.
    ///
    /// Single-flight: concurrent callers for the same key share one
    /// computation; the first caller computes while the rest await the
    /// committed outcome. The per-key slot is released on every exit path,
    /// timeouts and failures included.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> Result<Tensor, CacheGetError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Tensor, FeaturizeError>>,
    {
        let digest = key.digest();
        if let Some(outcome) = self.probe(&digest) {
            return resolve(outcome);
        }

        let slot = {
            let mut inflight = self.inflight.lock().expect("inflight table lock");
            Arc::clone(
                inflight
                    .entry(digest.clone())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        let guard = slot.lock().await;

        // another caller may have committed while we awaited the slot
        if let Some(outcome) = self.probe(&digest) {
            drop(guard);
            self.release_slot(&digest);
            return resolve(outcome);
        }

        self.state.lock().expect("cache state lock").metrics.misses += 1;
        tracing::debug!(%key, "cache miss, computing");

        let result = match self.config.compute_timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), compute()).await {
                Ok(result) => result,
                Err(_elapsed) => Err(FeaturizeError::Timeout {
                    featurizer: key.featurizer().to_string(),
                    timeout_secs: secs,
                }),
            },
            None => compute().await,
        };

        let committed = match &result {
            Ok(tensor) => self.commit(key, &digest, Outcome::Success(tensor.clone()), true),
            // retryable errors (timeouts) are transient and never recorded
            Err(error) if !error.is_retryable() => {
                self.commit(key, &digest, Outcome::Failure(error.clone()), true)
            }
            Err(_) => Ok(()),
        };

        drop(guard);
        self.release_slot(&digest);

        committed?;
        result.map_err(CacheGetError::Compute)
    }

    /// Merge entries from a durable store into this cache.
    pub fn load_from(&self, path: &Path) -> usize {
        self.merge_entries(persist::read_entries(path))
    }

    /// Snapshot every stored entry to `path`, least recently used first so
    /// a reload reproduces the recency order.
    pub fn flush_to(&self, path: &Path) -> Result<(), CacheError> {
        let entries = {
            let state = self.state.lock().expect("cache state lock");
            let mut entries = Vec::with_capacity(state.lru.len());
            for (_, stored) in state.lru.iter() {
                entries.push(persist::entry_from(&stored.key, &stored.outcome)?);
            }
            entries.reverse();
            entries
        };
        persist::write_snapshot(path, &entries)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state
            .lock()
            .expect("cache state lock")
            .lru
            .contains(&key.digest())
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("cache state lock").lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.state.lock().expect("cache state lock").metrics
    }

    fn merge_entries(&self, entries: Vec<persist::PersistedEntry>) -> usize {
        let mut loaded = 0;
        for entry in entries {
            match persist::outcome_from(entry) {
                Ok((key, outcome)) => {
                    let digest = key.digest();
                    match self.commit(&key, &digest, outcome, false) {
                        Ok(()) => loaded += 1,
                        Err(CacheError::Integrity { key }) => {
                            tracing::error!(%key, "conflicting durable entry ignored");
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "durable entry dropped");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "durable entry unusable, treated as miss");
                }
            }
        }
        loaded
    }

    fn probe(&self, digest: &str) -> Option<Outcome> {
        let mut state = self.state.lock().expect("cache state lock");
        let outcome = state.lru.get(digest).map(|entry| entry.outcome.clone());
        match outcome {
            // force mode treats recorded failures as misses
            Some(Outcome::Failure(_)) if self.config.force_recompute => None,
            Some(outcome) => {
                state.metrics.hits += 1;
                Some(outcome)
            }
            None => None,
        }
    }

    fn commit(
        &self,
        key: &CacheKey,
        digest: &str,
        outcome: Outcome,
        write_through: bool,
    ) -> Result<(), CacheError> {
        {
            let mut state = self.state.lock().expect("cache state lock");
            if let Some(existing) = state.lru.peek(digest) {
                match (&existing.outcome, &outcome) {
                    (Outcome::Success(old), Outcome::Success(new)) => {
                        if tensors_equal(old, new) {
                            return Ok(());
                        }
                        if !self.config.force_recompute {
                            return Err(CacheError::Integrity {
                                key: key.to_string(),
                            });
                        }
                        // force mode: replacement sanctioned below
                    }
                    // a stored success is never displaced by a failure
                    (Outcome::Success(_), Outcome::Failure(_)) => return Ok(()),
                    (Outcome::Failure(_), _) => {}
                }
            }

            let bytes = entry_bytes(key, &outcome);
            let entry = StoredEntry {
                key: key.clone(),
                outcome: outcome.clone(),
                bytes,
            };
            state.bytes += bytes;
            if let Some((evicted_digest, evicted)) = state.lru.push(digest.to_string(), entry) {
                state.bytes = state.bytes.saturating_sub(evicted.bytes);
                if evicted_digest != digest {
                    state.metrics.evictions += 1;
                }
            }
            while state.bytes > self.config.max_bytes {
                match state.lru.pop_lru() {
                    Some((_, evicted)) => {
                        state.bytes = state.bytes.saturating_sub(evicted.bytes);
                        state.metrics.evictions += 1;
                    }
                    None => break,
                }
            }
        }

        if write_through {
            if let Some(path) = &self.store_path {
                persist::append_entry(path, &persist::entry_from(key, &outcome)?)?;
            }
        }
        Ok(())
    }

    fn release_slot(&self, digest: &str) {
        self.inflight
            .lock()
            .expect("inflight table lock")
            .remove(digest);
    }
}

fn resolve(outcome: Outcome) -> Result<Tensor, CacheGetError> {
    match outcome {
        Outcome::Success(tensor) => Ok(tensor),
        Outcome::Failure(error) => Err(CacheGetError::Compute(error)),
    }
}

fn entry_bytes(key: &CacheKey, outcome: &Outcome) -> usize {
    let key_bytes = key.featurizer().len() + key.config().len() + key.input().len();
    let payload = match outcome {
        Outcome::Success(tensor) => tensor.elem_count() * 4,
        Outcome::Failure(error) => error.to_string().len(),
    };
    key_bytes + payload
}

fn tensors_equal(a: &Tensor, b: &Tensor) -> bool {
    if a.dims() != b.dims() {
        return false;
    }
    match (persist::tensor_payload(a), persist::tensor_payload(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tensor(values: Vec<f32>) -> Tensor {
        let len = values.len();
        Tensor::from_vec(values, len, &Device::Cpu).unwrap()
    }

    fn key(input: &str) -> CacheKey {
        CacheKey::new("morgan_fingerprint", "abcd", input)
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = FeatureCache::new(CacheConfig::default());
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let out = cache
                .get_or_compute(&key("m-1"), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(tensor(vec![1.0, 2.0]))
                })
                .await
                .unwrap();
            assert_eq!(out.to_vec1::<f32>().unwrap(), vec![1.0, 2.0]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let metrics = cache.metrics();
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.hits, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_flight_dedup() {
        let cache = Arc::new(FeatureCache::new(CacheConfig::default()));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(&key("shared"), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(tensor(vec![7.0]))
                    })
                    .await
                    .unwrap()
                    .to_vec1::<f32>()
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), vec![7.0]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_marker_short_circuits() {
        let cache = FeatureCache::new(CacheConfig::default());
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            let err = cache
                .get_or_compute(&key("bad"), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(FeaturizeError::failed("morgan_fingerprint", "bad smiles"))
                })
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                CacheGetError::Compute(FeaturizeError::Failed { .. })
            ));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_recompute_retries_failures() {
        let config = CacheConfig {
            force_recompute: true,
            ..Default::default()
        };
        let cache = FeatureCache::new(config);
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            let _ = cache
                .get_or_compute(&key("flaky"), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<Tensor, _>(FeaturizeError::failed("morgan_fingerprint", "transient"))
                })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_released_for_retry() {
        let config = CacheConfig {
            compute_timeout_secs: Some(0),
            ..Default::default()
        };
        let cache = FeatureCache::new(config);
        let err = cache
            .get_or_compute(&key("slow"), || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(tensor(vec![1.0]))
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CacheGetError::Compute(FeaturizeError::Timeout { .. })
        ));
        // the timeout was not recorded: a fast retry succeeds
        let out = cache
            .get_or_compute(&key("slow"), || async { Ok(tensor(vec![3.0])) })
            .await
            .unwrap();
        assert_eq!(out.to_vec1::<f32>().unwrap(), vec![3.0]);
    }

    #[tokio::test]
    async fn test_lru_eviction_order() {
        let config = CacheConfig {
            max_entries: 2,
            ..Default::default()
        };
        let cache = FeatureCache::new(config);

        let (k1, k2, k3) = (key("k1"), key("k2"), key("k3"));
        for k in [&k1, &k2] {
            cache
                .get_or_compute(k, || async { Ok(tensor(vec![1.0])) })
                .await
                .unwrap();
        }
        // touch k1 so k2 becomes least recently used
        cache
            .get_or_compute(&k1, || async { Ok(tensor(vec![1.0])) })
            .await
            .unwrap();
        cache
            .get_or_compute(&k3, || async { Ok(tensor(vec![1.0])) })
            .await
            .unwrap();

        assert!(cache.contains(&k1));
        assert!(!cache.contains(&k2));
        assert!(cache.contains(&k3));
        assert_eq!(cache.metrics().evictions, 1);
    }

    #[tokio::test]
    async fn test_byte_budget_evicts() {
        let config = CacheConfig {
            max_bytes: 200,
            ..Default::default()
        };
        let cache = FeatureCache::new(config);
        for i in 0..10 {
            cache
                .get_or_compute(&key(&format!("m-{i}")), || async {
                    Ok(tensor(vec![0.0; 16]))
                })
                .await
                .unwrap();
        }
        assert!(cache.len() < 10);
        assert!(cache.metrics().evictions > 0);
    }

    #[tokio::test]
    async fn test_durable_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.jsonl");

        let cache = FeatureCache::with_store(CacheConfig::default(), &path);
        cache
            .get_or_compute(&key("persisted"), || async {
                Ok(tensor(vec![1.0, 0.0, 1.0]))
            })
            .await
            .unwrap();
        let _ = cache
            .get_or_compute(&key("persisted-failure"), || async {
                Err::<Tensor, _>(FeaturizeError::failed("morgan_fingerprint", "bad"))
            })
            .await;

        // a fresh cache over the same store replays both outcomes
        let reloaded = FeatureCache::with_store(CacheConfig::default(), &path);
        assert_eq!(reloaded.len(), 2);
        let calls = AtomicUsize::new(0);
        let out = reloaded
            .get_or_compute(&key("persisted"), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(tensor(vec![9.0]))
            })
            .await
            .unwrap();
        assert_eq!(out.to_vec1::<f32>().unwrap(), vec![1.0, 0.0, 1.0]);
        let err = reloaded
            .get_or_compute(&key("persisted-failure"), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(tensor(vec![9.0]))
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CacheGetError::Compute(FeaturizeError::Failed { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_flush_and_reload_snapshot() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("snapshot.jsonl");

        let cache = FeatureCache::new(CacheConfig::default());
        cache
            .get_or_compute(&key("a"), || async { Ok(tensor(vec![1.0, 2.0])) })
            .await?;
        cache.flush_to(&path)?;

        let reloaded = FeatureCache::new(CacheConfig::default());
        assert_eq!(reloaded.load_from(&path), 1);
        assert!(reloaded.contains(&key("a")));
        Ok(())
    }
}
