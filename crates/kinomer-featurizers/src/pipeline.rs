use crate::featurizer::{Featurizer, StageInput, StageKind};
use candle_core::Tensor;
use kinomer_core::{
    CacheError, FeatureShape, FeaturizeError, Measurement, MeasurementId, PipelineError,
    PipelineFailure,
};
use kinomer_cache::{CacheGetError, CacheKey, FeatureCache};
use std::sync::Arc;

/// Failure modes of a cached pipeline run: a per-item stage failure, or a
/// cache integrity/persistence problem that must reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Failure(#[from] PipelineFailure),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// An ordered, type-validated composition of featurizers.
///
/// Adjacency is checked eagerly: an invalid chain fails at construction,
/// before any featurization runs. The stage sequence is immutable
/// afterwards.
pub struct Pipeline {
    stages: Vec<Arc<dyn Featurizer>>,
    output_shape: FeatureShape,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.describe())
            .field("output_shape", &self.output_shape)
            .finish()
    }
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Featurizer>>) -> Result<Self, PipelineError> {
        if stages.is_empty() {
            return Err(PipelineError::Empty);
        }

        let mut shape: Option<FeatureShape> = None;
        for (index, stage) in stages.iter().enumerate() {
            if index == 0 {
                if stage.input_kind() != StageKind::Entities {
                    return Err(PipelineError::BadHead {
                        name: stage.name().to_string(),
                    });
                }
            } else {
                let upstream = shape.as_ref().expect("set after the first stage");
                if stage.input_kind() != StageKind::Tensor || !stage.accepts_shape(upstream) {
                    return Err(PipelineError::Incompatible {
                        stage: index,
                        name: stage.name().to_string(),
                        upstream: upstream.to_string(),
                    });
                }
            }
            let next = stage.output_shape(shape.as_ref());
            shape = Some(next);
        }

        let pipeline = Self {
            output_shape: shape.expect("at least one stage"),
            stages,
        };
        tracing::debug!(
            stages = %pipeline.describe(),
            output = %pipeline.output_shape,
            "pipeline validated"
        );
        Ok(pipeline)
    }

    pub fn output_shape(&self) -> &FeatureShape {
        &self.output_shape
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Stage names joined for logs and reports.
    pub fn describe(&self) -> String {
        self.stages
            .iter()
            .map(|stage| stage.name())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Run every stage in order, threading each output into the next.
    /// The first stage consumes the measurement's entities.
    pub fn run(&self, measurement: &Measurement) -> Result<Tensor, PipelineFailure> {
        let mut input = StageInput::Entities(measurement.entities().to_vec());
        let mut output = None;
        for (index, stage) in self.stages.iter().enumerate() {
            let tensor = stage.featurize(&input).map_err(|source| PipelineFailure {
                stage: index,
                measurement: measurement.id(),
                source,
            })?;
            input = StageInput::Tensor(tensor.clone());
            output = Some(tensor);
        }
        Ok(output.expect("at least one stage"))
    }

    /// Like [`Pipeline::run`], but every stage goes through the cache.
    ///
    /// Stage 0 is keyed by the measurement identity; each later stage is
    /// keyed by its predecessor's composite key digest, so intermediate
    /// results are memoized alongside final ones.
    pub async fn run_cached(
        &self,
        measurement: &Measurement,
        cache: &FeatureCache,
    ) -> Result<Tensor, RunError> {
        self.run_cached_as(measurement, &measurement.id(), cache)
            .await
    }

    /// Cached run with an explicit input identity, for callers that fold
    /// provenance into measurement identity.
    pub async fn run_cached_as(
        &self,
        measurement: &Measurement,
        id: &MeasurementId,
        cache: &FeatureCache,
    ) -> Result<Tensor, RunError> {
        let mut input_id = id.to_string();
        let mut input = StageInput::Entities(measurement.entities().to_vec());
        let mut output = None;

        for (index, stage) in self.stages.iter().enumerate() {
            let key = CacheKey::new(stage.name(), stage.config_digest(), input_id.as_str());
            let compute = {
                let stage = Arc::clone(stage);
                let input = input.clone();
                move || async move {
                    let name = stage.name();
                    match tokio::task::spawn_blocking(move || stage.featurize(&input)).await {
                        Ok(result) => result,
                        Err(join_error) => Err(FeaturizeError::failed(name, join_error)),
                    }
                }
            };
            let tensor = cache
                .get_or_compute(&key, compute)
                .await
                .map_err(|error| match error {
                    CacheGetError::Compute(source) => RunError::Failure(PipelineFailure {
                        stage: index,
                        measurement: id.clone(),
                        source,
                    }),
                    CacheGetError::Cache(cache_error) => RunError::Cache(cache_error),
                })?;

            input_id = key.digest();
            input = StageInput::Tensor(tensor.clone());
            output = Some(tensor);
        }

        Ok(output.expect("at least one stage"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::MorganFingerprintFeaturizer;
    use crate::normalize::NormalizeFeaturizer;
    use kinomer_cache::CacheConfig;
    use kinomer_core::{ActivityValue, AssayType, Ligand, Protein};

    fn measurement(smiles: &str) -> Measurement {
        Measurement::new(
            vec![
                Protein::new("ABL1", "MGSNKSKPKDAS").into(),
                Ligand::from_smiles(smiles).into(),
            ],
            AssayType::IC50,
            ActivityValue::nanomolar(50.0),
        )
    }

    #[test]
    fn test_incompatible_chain_fails_before_any_run() {
        // a tensor stage cannot head a pipeline
        let err = Pipeline::new(vec![
            Arc::new(NormalizeFeaturizer::new()) as Arc<dyn Featurizer>
        ])
        .unwrap_err();
        assert!(matches!(err, PipelineError::BadHead { .. }));

        // an entity stage cannot follow a tensor stage
        let err = Pipeline::new(vec![
            Arc::new(MorganFingerprintFeaturizer::new(2, 512)) as Arc<dyn Featurizer>,
            Arc::new(MorganFingerprintFeaturizer::new(2, 512)),
        ])
        .unwrap_err();
        assert!(matches!(err, PipelineError::Incompatible { stage: 1, .. }));

        assert!(matches!(
            Pipeline::new(Vec::new()).unwrap_err(),
            PipelineError::Empty
        ));
    }

    #[test]
    fn test_run_is_deterministic() {
        let pipeline = Pipeline::new(vec![
            Arc::new(MorganFingerprintFeaturizer::new(2, 2048)) as Arc<dyn Featurizer>,
            Arc::new(NormalizeFeaturizer::new()),
        ])
        .unwrap();
        let m = measurement("CC(=O)Oc1ccccc1C(=O)O");
        let a: Vec<f32> = pipeline.run(&m).unwrap().to_vec1().unwrap();
        let b: Vec<f32> = pipeline.run(&m).unwrap().to_vec1().unwrap();
        assert_eq!(a, b);
        assert_eq!(pipeline.output_shape().dims(), &[2048]);
    }

    #[test]
    fn test_failure_carries_stage_and_identity() {
        let pipeline =
            Pipeline::new(vec![
                Arc::new(MorganFingerprintFeaturizer::new(2, 512)) as Arc<dyn Featurizer>
            ])
            .unwrap();
        let m = measurement("C1CC");
        let failure = pipeline.run(&m).unwrap_err();
        assert_eq!(failure.stage, 0);
        assert_eq!(failure.measurement, m.id());
        assert!(matches!(failure.source, FeaturizeError::Failed { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cached_run_matches_uncached() {
        let pipeline = Pipeline::new(vec![
            Arc::new(MorganFingerprintFeaturizer::new(2, 1024)) as Arc<dyn Featurizer>,
            Arc::new(NormalizeFeaturizer::new()),
        ])
        .unwrap();
        let cache = FeatureCache::new(CacheConfig::default());
        let m = measurement("c1ccccc1O");

        let uncached: Vec<f32> = pipeline.run(&m).unwrap().to_vec1().unwrap();
        let cached: Vec<f32> = pipeline
            .run_cached(&m, &cache)
            .await
            .unwrap()
            .to_vec1()
            .unwrap();
        assert_eq!(uncached, cached);

        // both stages were memoized
        assert_eq!(cache.len(), 2);
        let again: Vec<f32> = pipeline
            .run_cached(&m, &cache)
            .await
            .unwrap()
            .to_vec1()
            .unwrap();
        assert_eq!(cached, again);
        assert_eq!(cache.metrics().misses, 2);
    }

    #[test]
    fn test_describe() {
        let pipeline = Pipeline::new(vec![
            Arc::new(MorganFingerprintFeaturizer::default()) as Arc<dyn Featurizer>,
            Arc::new(NormalizeFeaturizer::new()),
        ])
        .unwrap();
        assert_eq!(pipeline.describe(), "morgan_fingerprint -> l2_normalize");
    }
}
