use crate::dataset::Dataset;
use crate::report::{BuildReport, FailedItem};
use crate::sources::{MeasurementSource, SourceError};
use candle_core::Tensor;
use futures::StreamExt;
use kinomer_cache::FeatureCache;
use kinomer_core::{CacheError, MeasurementId, PipelineFailure};
use kinomer_featurizers::{Pipeline, RunError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Whether near-duplicate measurements (same entities, same assay,
/// different source) share a cache identity or stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Identity = entities + assay + conditions. Rows re-measured by a
    /// second source reuse the first source's cache entries.
    ByIdentity,
    /// Identity additionally folds in the `source` metadata key.
    BySource,
}

/// Configuration for a [`DatasetProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Concurrent featurizations in flight (default: 4).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Escalate any per-item failure to a run-level failure (default: false).
    #[serde(default)]
    pub strict: bool,
    /// Cache-identity policy for near-duplicate measurements.
    #[serde(default = "default_dedup")]
    pub dedup: DedupPolicy,
}

fn default_workers() -> usize {
    4
}

fn default_dedup() -> DedupPolicy {
    DedupPolicy::ByIdentity
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            strict: false,
            dedup: default_dedup(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("cache error during dataset build: {0}")]
    Cache(#[from] CacheError),

    #[error("strict mode: {0}")]
    Strict(PipelineFailure),
}

/// Result of a dataset build: the assembled dataset plus the failure
/// audit for the run.
#[derive(Debug)]
pub struct DatasetBuild {
    pub dataset: Dataset,
    pub report: BuildReport,
}

enum ItemOutcome {
    Success {
        id: MeasurementId,
        label: f64,
        features: Tensor,
    },
    Failed(PipelineFailure),
    Cache(CacheError),
    NotStarted,
}

/// Orchestrates loading measurements from a source, featurizing each
/// through a pipeline backed by a shared cache, and assembling the
/// surviving (features, label) pairs into a [`Dataset`].
pub struct DatasetProvider {
    pipeline: Arc<Pipeline>,
    cache: Arc<FeatureCache>,
    config: ProviderConfig,
}

impl DatasetProvider {
    pub fn new(pipeline: Arc<Pipeline>, cache: Arc<FeatureCache>) -> Self {
        Self::with_config(pipeline, cache, ProviderConfig::default())
    }

    pub fn with_config(
        pipeline: Arc<Pipeline>,
        cache: Arc<FeatureCache>,
        config: ProviderConfig,
    ) -> Self {
        Self {
            pipeline,
            cache,
            config,
        }
    }

    /// Build a dataset from everything the source yields, in source order.
    ///
    /// Featurization runs with bounded concurrency; per-item failures are
    /// excluded from the dataset and recorded in the report (or escalated
    /// in strict mode). Cancellation is observed before each item is
    /// dispatched: work already in flight may complete, but nothing new
    /// starts once the token is cancelled.
    pub async fn build(
        &self,
        source: &dyn MeasurementSource,
        cancel: &CancellationToken,
    ) -> Result<DatasetBuild, BuildError> {
        let measurements = source.measurements()?;
        tracing::info!(
            total = measurements.len(),
            pipeline = %self.pipeline.describe(),
            "dataset build started"
        );

        let jobs = measurements.into_iter().map(|measurement| {
            let pipeline = Arc::clone(&self.pipeline);
            let cache = Arc::clone(&self.cache);
            let cancel = cancel.clone();
            let dedup = self.config.dedup;
            async move {
                if cancel.is_cancelled() {
                    return ItemOutcome::NotStarted;
                }
                let id = match dedup {
                    DedupPolicy::ByIdentity => measurement.id(),
                    DedupPolicy::BySource => measurement.id_with_source(),
                };
                let label = measurement.value().normalized();
                match pipeline.run_cached_as(&measurement, &id, &cache).await {
                    Ok(features) => ItemOutcome::Success {
                        id,
                        label,
                        features,
                    },
                    Err(RunError::Failure(failure)) => ItemOutcome::Failed(failure),
                    Err(RunError::Cache(error)) => ItemOutcome::Cache(error),
                }
            }
        });

        let outcomes: Vec<ItemOutcome> = futures::stream::iter(jobs)
            .buffered(self.config.workers.max(1))
            .collect()
            .await;

        let mut dataset = Dataset::default();
        let mut report = BuildReport::default();
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Success {
                    id,
                    label,
                    features,
                } => {
                    dataset.push(features, label, id);
                    report.succeeded += 1;
                }
                ItemOutcome::Failed(failure) => {
                    if self.config.strict {
                        return Err(BuildError::Strict(failure));
                    }
                    tracing::warn!(%failure, "measurement excluded from dataset");
                    report.failed.push(FailedItem::from(failure));
                }
                ItemOutcome::Cache(error) => return Err(BuildError::Cache(error)),
                ItemOutcome::NotStarted => report.not_started += 1,
            }
        }

        tracing::info!(%report, "dataset build complete");
        Ok(DatasetBuild { dataset, report })
    }
}
