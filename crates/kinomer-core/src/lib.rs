//! # kinomer-core
//!
//! Domain model for the kinomer featurization workspace.
//!
//! __kinomer-core__ provides:
//! * Typed biological entities (proteins, ligands) with canonical identities
//! * Immutable bioactivity [`Measurement`] records and their assay vocabulary
//! * Label normalization onto a common pIC50-like scale
//! * Fixed-dimension [`FeatureShape`] descriptors for ML tensors
//! * The error taxonomy shared by the featurizer, cache and dataset crates
//!
mod entities;
mod error;
mod measurements;
mod shape;

pub use self::entities::{Entity, Ligand, Protein};
pub use self::error::{CacheError, FeaturizeError, PipelineError, PipelineFailure};
pub use self::measurements::{
    ActivityValue, AssayConditions, AssayType, Measurement, MeasurementId, ValueKind,
};
pub use self::shape::FeatureShape;
