use kinomer_core::{MeasurementId, PipelineFailure};
use std::fmt;

/// One excluded measurement: its identity, the stage that failed, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub id: MeasurementId,
    pub stage: usize,
    pub reason: String,
}

impl From<PipelineFailure> for FailedItem {
    fn from(failure: PipelineFailure) -> Self {
        Self {
            id: failure.measurement,
            stage: failure.stage,
            reason: failure.source.to_string(),
        }
    }
}

/// Per-run audit of a dataset build. Failed featurizations are excluded
/// from the dataset but recorded here, so data-quality issues stay
/// visible instead of being silently dropped.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub succeeded: usize,
    pub not_started: usize,
    pub failed: Vec<FailedItem>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.not_started == 0
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded, self.failed.len())?;
        if self.not_started > 0 {
            write!(f, ", {} not started (cancelled)", self.not_started)?;
        }
        Ok(())
    }
}
