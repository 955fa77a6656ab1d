//! # kinomer-featurizers
//!
//! Transformation stages that turn [`kinomer_core::Measurement`] records
//! into fixed-shape ML tensors, and the type-validated [`Pipeline`] that
//! composes them.
//!
//! * Ligand featurizers: circular fingerprints and graph descriptors over
//!   SMILES-derived molecular graphs
//! * Protein featurizers: sequence composition
//! * Structure featurizers: protein-ligand contact histograms via an
//!   injected [`StructureResolver`]
//! * Tensor post-processing: L2 normalization
//!
mod composition;
mod featurizer;
mod fingerprint;
mod graph;
mod normalize;
mod pipeline;
mod smiles;
mod structure;

pub use self::composition::SequenceCompositionFeaturizer;
pub use self::featurizer::{Featurizer, StageInput, StageKind};
pub use self::fingerprint::MorganFingerprintFeaturizer;
pub use self::graph::MolecularGraphFeaturizer;
pub use self::normalize::NormalizeFeaturizer;
pub use self::pipeline::{Pipeline, RunError};
pub use self::smiles::{Molecule, SmilesError};
pub use self::structure::{
    PdbDirResolver, ResolveError, ResolvedStructure, StructureContactFeaturizer,
    StructureResolver,
};
