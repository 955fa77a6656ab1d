use crate::featurizer::{digest_config, Featurizer, StageInput, StageKind};
use candle_core::Tensor;
use kinomer_core::{FeatureShape, FeaturizeError};
use serde::Serialize;

const NAME: &str = "l2_normalize";

/// Shape-preserving tensor stage scaling its input to unit L2 norm.
/// All-zero inputs pass through unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizeFeaturizer {}

impl NormalizeFeaturizer {
    pub fn new() -> Self {
        Self {}
    }
}

impl Featurizer for NormalizeFeaturizer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config_digest(&self) -> String {
        digest_config(self)
    }

    fn input_kind(&self) -> StageKind {
        StageKind::Tensor
    }

    fn output_shape(&self, upstream: Option<&FeatureShape>) -> FeatureShape {
        match upstream {
            Some(shape) => shape.clone(),
            None => FeatureShape::new(Vec::new()),
        }
    }

    fn featurize(&self, input: &StageInput) -> Result<Tensor, FeaturizeError> {
        let tensor = match input {
            StageInput::Tensor(t) => t,
            StageInput::Entities(_) => {
                return Err(FeaturizeError::unsupported(NAME, "expects a tensor"))
            }
        };
        let norm = tensor
            .sqr()
            .and_then(|t| t.sum_all())
            .and_then(|t| t.sqrt())
            .and_then(|t| t.to_scalar::<f32>())
            .map_err(|e| FeaturizeError::failed(NAME, e))?;
        if norm == 0.0 {
            return Ok(tensor.clone());
        }
        tensor
            .affine(1.0 / norm as f64, 0.0)
            .map_err(|e| FeaturizeError::failed(NAME, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_unit_norm() {
        let f = NormalizeFeaturizer::new();
        let t = Tensor::from_vec(vec![3.0f32, 4.0], 2, &Device::Cpu).unwrap();
        let out = f.featurize(&StageInput::Tensor(t)).unwrap();
        let v: Vec<f32> = out.to_vec1().unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_unchanged() {
        let f = NormalizeFeaturizer::new();
        let t = Tensor::zeros(4, candle_core::DType::F32, &Device::Cpu).unwrap();
        let out = f.featurize(&StageInput::Tensor(t)).unwrap();
        let v: Vec<f32> = out.to_vec1().unwrap();
        assert_eq!(v, vec![0.0; 4]);
    }

    #[test]
    fn test_shape_preserved() {
        let f = NormalizeFeaturizer::new();
        let upstream = FeatureShape::new(vec![2048]);
        assert_eq!(f.output_shape(Some(&upstream)), upstream);
    }
}
