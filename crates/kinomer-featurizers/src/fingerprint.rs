use crate::featurizer::{digest_config, first_ligand, Featurizer, StageInput, StageKind};
use crate::smiles::Molecule;
use candle_core::{Device, Tensor};
use kinomer_core::{FeatureShape, FeaturizeError};
use serde::Serialize;

const NAME: &str = "morgan_fingerprint";

/// Circular (ECFP-style) fingerprint over a ligand's molecular graph.
///
/// Atom invariants are iteratively folded with their neighborhood out to
/// `radius` bonds; every invariant from every round sets one bit modulo
/// `nbits`. Output is a binary `[nbits]` tensor.
#[derive(Debug, Clone, Serialize)]
pub struct MorganFingerprintFeaturizer {
    radius: usize,
    nbits: usize,
}

impl Default for MorganFingerprintFeaturizer {
    fn default() -> Self {
        Self {
            radius: 2,
            nbits: 2048,
        }
    }
}

impl MorganFingerprintFeaturizer {
    pub fn new(radius: usize, nbits: usize) -> Self {
        Self { radius, nbits }
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn nbits(&self) -> usize {
        self.nbits
    }

    fn bits(&self, mol: &Molecule) -> Vec<u64> {
        let mut invariants: Vec<u64> = mol
            .atoms()
            .iter()
            .enumerate()
            .map(|(idx, atom)| {
                let seed = format!(
                    "{}|{}|{}|{}",
                    atom.element,
                    atom.aromatic,
                    atom.charge,
                    mol.degree(idx)
                );
                fnv1a(seed.as_bytes())
            })
            .collect();

        let mut emitted: Vec<u64> = invariants.clone();
        for _ in 0..self.radius {
            let mut next = invariants.clone();
            for idx in 0..invariants.len() {
                let mut env: Vec<(u8, u64)> = mol
                    .neighbors(idx)
                    .into_iter()
                    .map(|(n, order)| (order, invariants[n]))
                    .collect();
                env.sort_unstable();
                let mut bytes = invariants[idx].to_be_bytes().to_vec();
                for (order, inv) in env {
                    bytes.push(order);
                    bytes.extend_from_slice(&inv.to_be_bytes());
                }
                next[idx] = fnv1a(&bytes);
            }
            invariants = next;
            emitted.extend_from_slice(&invariants);
        }
        emitted
    }
}

impl Featurizer for MorganFingerprintFeaturizer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config_digest(&self) -> String {
        digest_config(self)
    }

    fn input_kind(&self) -> StageKind {
        StageKind::Entities
    }

    fn accepts(&self, input: &StageInput) -> bool {
        matches!(input, StageInput::Entities(entities) if first_ligand(entities).is_some())
    }

    fn output_shape(&self, _upstream: Option<&FeatureShape>) -> FeatureShape {
        FeatureShape::new(vec![self.nbits])
    }

    fn featurize(&self, input: &StageInput) -> Result<Tensor, FeaturizeError> {
        let entities = match input {
            StageInput::Entities(entities) => entities,
            StageInput::Tensor(_) => {
                return Err(FeaturizeError::unsupported(NAME, "expects entities"))
            }
        };
        let ligand = first_ligand(entities)
            .ok_or_else(|| FeaturizeError::unsupported(NAME, "no ligand entity"))?;
        let mol = Molecule::from_smiles(ligand.smiles())
            .map_err(|e| FeaturizeError::failed(NAME, format!("{}: {e}", ligand.smiles())))?;

        let mut data = vec![0f32; self.nbits];
        for invariant in self.bits(&mol) {
            data[(invariant % self.nbits as u64) as usize] = 1.0;
        }
        Tensor::from_vec(data, self.nbits, &Device::Cpu).map_err(|e| FeaturizeError::failed(NAME, e))
    }
}

/// FNV-1a, fixed here so fingerprints stay stable across builds and so
/// persisted cache entries remain valid between runs.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
