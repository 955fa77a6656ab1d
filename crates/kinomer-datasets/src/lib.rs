//! # kinomer-datasets
//!
//! Turns a stream of measurements into a labeled, ML-ready dataset.
//!
//! * [`MeasurementSource`]: lazy, finite, restartable producers of
//!   [`kinomer_core::Measurement`] records (in-memory or CSV-backed)
//! * [`DatasetProvider`]: featurizes each measurement through a pipeline
//!   with bounded concurrency, a shared cache and best-effort cancellation
//! * [`Dataset`]: ordered (features, label, source identity) triples
//! * [`BuildReport`]: per-run audit of exactly which measurements failed
//!
mod dataset;
mod provider;
mod report;
mod sources;

pub use self::dataset::Dataset;
pub use self::provider::{
    BuildError, DatasetBuild, DatasetProvider, DedupPolicy, ProviderConfig,
};
pub use self::report::{BuildReport, FailedItem};
pub use self::sources::{CsvActivitySource, MeasurementSource, SourceError, VecSource};
