use candle_core::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-dimension descriptor of a feature tensor.
///
/// Featurizers declare their output shape up front so pipelines can be
/// validated before any featurization runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureShape(Vec<usize>);

impl FeatureShape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    /// Shape of an existing tensor.
    pub fn of_tensor(tensor: &Tensor) -> Self {
        Self(tensor.dims().to_vec())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total element count.
    pub fn elements(&self) -> usize {
        self.0.iter().product()
    }
}

impl fmt::Display for FeatureShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for FeatureShape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for FeatureShape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}
