//! Structure-based featurization against an injected structure store.
//!
//! Resolution of a protein name to 3-D coordinates is an external concern:
//! featurizers only see the [`StructureResolver`] capability, which carries
//! its own caching.

use crate::featurizer::{digest_config, first_ligand, first_protein, Featurizer, StageInput, StageKind};
use candle_core::{Device, Tensor};
use itertools::{Either, Itertools};
use kinomer_core::{FeatureShape, FeaturizeError, Protein};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const NAME: &str = "contact_histogram";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no structure found for '{name}'")]
    NotFound { name: String },

    #[error("structure for '{name}' could not be parsed: {reason}")]
    Parse { name: String, reason: String },
}

/// Coordinates extracted from a resolved protein-ligand complex.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStructure {
    pub protein_coords: Vec<[f32; 3]>,
    pub ligand_coords: Vec<[f32; 3]>,
}

/// Resolves a protein entity to its structural representation.
pub trait StructureResolver: Send + Sync {
    fn resolve(&self, protein: &Protein) -> Result<Arc<ResolvedStructure>, ResolveError>;

    /// Identifier of the backing store, folded into config digests so two
    /// featurizers over different stores never share cache entries.
    fn source_id(&self) -> String;
}

/// Loads `<dir>/<name>.pdb` or `<dir>/<name>.cif` with `pdbtbx`, keeping
/// parsed structures for the lifetime of the resolver.
pub struct PdbDirResolver {
    dir: PathBuf,
    parsed: Mutex<HashMap<String, Arc<ResolvedStructure>>>,
}

impl PdbDirResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            parsed: Mutex::new(HashMap::new()),
        }
    }

    fn load(&self, name: &str) -> Result<ResolvedStructure, ResolveError> {
        let path = ["pdb", "cif"]
            .iter()
            .map(|ext| self.dir.join(format!("{name}.{ext}")))
            .find(|p| p.exists())
            .ok_or_else(|| ResolveError::NotFound {
                name: name.to_string(),
            })?;

        let (pdb, _warnings) =
            pdbtbx::open(path.to_string_lossy().as_ref()).map_err(|errors| ResolveError::Parse {
                name: name.to_string(),
                reason: format!("{errors:?}"),
            })?;

        // protein atoms to the left, ligand heavy atoms to the right;
        // waters and hydrogens contribute to neither
        let (protein_coords, ligand_coords): (Vec<[f32; 3]>, Vec<[f32; 3]>) = pdb
            .chains()
            .flat_map(|chain| {
                chain.residues().flat_map(|residue| {
                    let res_name = residue.name().unwrap_or_default();
                    let is_water = res_name == "HOH" || res_name == "WAT";
                    residue.atoms().filter_map(move |atom| {
                        let (x, y, z) = atom.pos();
                        let coord = [x as f32, y as f32, z as f32];
                        if atom.hetero() {
                            (!is_water && is_heavy(atom)).then_some(Either::Right(coord))
                        } else {
                            Some(Either::Left(coord))
                        }
                    })
                })
            })
            .partition_map(|side| side);

        Ok(ResolvedStructure {
            protein_coords,
            ligand_coords,
        })
    }
}

fn is_heavy(atom: &pdbtbx::Atom) -> bool {
    !matches!(
        atom.element(),
        Some(pdbtbx::Element::H) | Some(pdbtbx::Element::He)
    )
}

impl StructureResolver for PdbDirResolver {
    fn resolve(&self, protein: &Protein) -> Result<Arc<ResolvedStructure>, ResolveError> {
        let name = protein.name().to_string();
        if let Some(found) = self.parsed.lock().expect("resolver cache lock").get(&name) {
            return Ok(Arc::clone(found));
        }
        let resolved = Arc::new(self.load(&name)?);
        self.parsed
            .lock()
            .expect("resolver cache lock")
            .insert(name, Arc::clone(&resolved));
        Ok(resolved)
    }

    fn source_id(&self) -> String {
        self.dir.to_string_lossy().into_owned()
    }
}

#[derive(Serialize)]
struct ContactConfig<'a> {
    bins: usize,
    max_distance: f32,
    source: &'a str,
}

/// Histogram of protein-atom to ligand-heavy-atom distances, bucketed into
/// `bins` equal-width bins up to `max_distance` angstroms. Shape `[bins]`.
pub struct StructureContactFeaturizer {
    bins: usize,
    max_distance: f32,
    resolver: Arc<dyn StructureResolver>,
}

impl StructureContactFeaturizer {
    pub fn new(bins: usize, max_distance: f32, resolver: Arc<dyn StructureResolver>) -> Self {
        Self {
            bins,
            max_distance,
            resolver,
        }
    }
}

impl Featurizer for StructureContactFeaturizer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config_digest(&self) -> String {
        digest_config(&ContactConfig {
            bins: self.bins,
            max_distance: self.max_distance,
            source: &self.resolver.source_id(),
        })
    }

    fn input_kind(&self) -> StageKind {
        StageKind::Entities
    }

    fn accepts(&self, input: &StageInput) -> bool {
        matches!(input, StageInput::Entities(entities) if first_protein(entities).is_some())
    }

    fn output_shape(&self, _upstream: Option<&FeatureShape>) -> FeatureShape {
        FeatureShape::new(vec![self.bins])
    }

    fn featurize(&self, input: &StageInput) -> Result<Tensor, FeaturizeError> {
        let entities = match input {
            StageInput::Entities(entities) => entities,
            StageInput::Tensor(_) => {
                return Err(FeaturizeError::unsupported(NAME, "expects entities"))
            }
        };
        let protein = first_protein(entities)
            .ok_or_else(|| FeaturizeError::unsupported(NAME, "no protein entity"))?;
        // ligand entity required up front even though only the resolved
        // complex coordinates are measured
        if first_ligand(entities).is_none() {
            return Err(FeaturizeError::unsupported(NAME, "no ligand entity"));
        }

        let structure = self
            .resolver
            .resolve(protein)
            .map_err(|e| FeaturizeError::failed(NAME, e))?;
        if structure.protein_coords.is_empty() {
            return Err(FeaturizeError::failed(
                NAME,
                format!("no 3-D protein coordinates for '{}'", protein.name()),
            ));
        }
        if structure.ligand_coords.is_empty() {
            return Err(FeaturizeError::failed(
                NAME,
                format!("no ligand atoms in structure for '{}'", protein.name()),
            ));
        }

        let mut histogram = vec![0f32; self.bins];
        let bin_width = self.max_distance / self.bins as f32;
        for p in &structure.protein_coords {
            for l in &structure.ligand_coords {
                let d = distance(p, l);
                if d < self.max_distance {
                    histogram[(d / bin_width) as usize] += 1.0;
                }
            }
        }
        Tensor::from_vec(histogram, self.bins, &Device::Cpu)
            .map_err(|e| FeaturizeError::failed(NAME, e))
    }
}

fn distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}
