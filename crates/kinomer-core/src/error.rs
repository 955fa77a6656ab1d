//! Error taxonomy shared across the featurizer, cache and dataset crates.
//!
//! Per-item failures (`FeaturizeError`, `PipelineFailure`) are recorded and
//! isolated during dataset assembly; construction-time failures
//! (`PipelineError`) abort immediately.

use crate::measurements::MeasurementId;

/// A single featurization stage failing on one input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeaturizeError {
    /// The input shape is unknown to this featurizer. Configuration or data
    /// mismatch, never retryable.
    #[error("featurizer '{featurizer}' does not accept this input: {reason}")]
    UnsupportedInput { featurizer: String, reason: String },

    /// Structurally valid input the transformation could not complete on,
    /// e.g. a structure-based featurizer finding no 3-D coordinates.
    #[error("featurization failed in '{featurizer}': {reason}")]
    Failed { featurizer: String, reason: String },

    /// The caller-supplied timeout elapsed before the stage finished.
    #[error("featurization timed out after {timeout_secs}s in '{featurizer}'")]
    Timeout { featurizer: String, timeout_secs: u64 },
}

impl FeaturizeError {
    pub fn unsupported(featurizer: &str, reason: impl Into<String>) -> Self {
        Self::UnsupportedInput {
            featurizer: featurizer.to_string(),
            reason: reason.into(),
        }
    }

    pub fn failed(featurizer: &str, reason: impl ToString) -> Self {
        Self::Failed {
            featurizer: featurizer.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Timeouts are transient; everything else reflects the data or the
    /// configuration and will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Pipeline construction failures. Always a programming error, never a data
/// issue, so these abort instead of being recorded per item.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline must contain at least one stage")]
    Empty,

    #[error("stage 0 ('{name}') must consume measurement entities, not tensors")]
    BadHead { name: String },

    #[error(
        "stage {stage} ('{name}') cannot follow its predecessor: upstream output {upstream} is not accepted"
    )]
    Incompatible {
        stage: usize,
        name: String,
        upstream: String,
    },
}

/// A pipeline run failing on one measurement, carrying the failing stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("stage {stage} failed for measurement {measurement}: {source}")]
pub struct PipelineFailure {
    pub stage: usize,
    pub measurement: MeasurementId,
    #[source]
    pub source: FeaturizeError,
}

/// Cache-level failures.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The same composite key was committed with differing results. Indicates
    /// a non-deterministic featurizer or a config-fingerprint collision;
    /// always surfaced, never silently resolved.
    #[error("cache integrity violation for key {key}: same key committed with differing results")]
    Integrity { key: String },

    #[error("cache persistence error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("tensor payload error: {0}")]
    Tensor(String),
}
