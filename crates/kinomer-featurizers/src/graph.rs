use crate::featurizer::{digest_config, first_ligand, Featurizer, StageInput, StageKind};
use crate::smiles::{Molecule, BOND_AROMATIC, BOND_DOUBLE, BOND_SINGLE, BOND_TRIPLE};
use candle_core::{Device, Tensor};
use kinomer_core::{FeatureShape, FeaturizeError};
use serde::Serialize;

const NAME: &str = "molecular_graph";

/// Element classes the descriptor distinguishes.
const ELEMENT_CLASSES: usize = 7; // C, N, O, S, P, halogen, other

/// Whole-graph descriptor of a ligand: element-class histogram, degree
/// histogram, bond-order histogram, aromatic atom count and global sizes.
#[derive(Debug, Clone, Serialize)]
pub struct MolecularGraphFeaturizer {
    max_degree: usize,
}

impl Default for MolecularGraphFeaturizer {
    fn default() -> Self {
        Self { max_degree: 4 }
    }
}

impl MolecularGraphFeaturizer {
    pub fn new(max_degree: usize) -> Self {
        Self { max_degree }
    }

    fn descriptor_len(&self) -> usize {
        // elements + degrees 0..=max + bond orders + aromatic count + atom/bond totals
        ELEMENT_CLASSES + (self.max_degree + 1) + 4 + 1 + 2
    }

    fn describe(&self, mol: &Molecule) -> Vec<f32> {
        let mut out = vec![0f32; self.descriptor_len()];

        for (idx, atom) in mol.atoms().iter().enumerate() {
            let class = match atom.element.as_str() {
                "C" => 0,
                "N" => 1,
                "O" => 2,
                "S" => 3,
                "P" => 4,
                "F" | "Cl" | "Br" | "I" => 5,
                _ => 6,
            };
            out[class] += 1.0;

            let degree = mol.degree(idx).min(self.max_degree);
            out[ELEMENT_CLASSES + degree] += 1.0;

            if atom.aromatic {
                out[ELEMENT_CLASSES + self.max_degree + 1 + 4] += 1.0;
            }
        }

        let bond_base = ELEMENT_CLASSES + self.max_degree + 1;
        for bond in mol.bonds() {
            let slot = match bond.order {
                BOND_SINGLE => 0,
                BOND_DOUBLE => 1,
                BOND_TRIPLE => 2,
                BOND_AROMATIC => 3,
                _ => 0,
            };
            out[bond_base + slot] += 1.0;
        }

        let len = out.len();
        out[len - 2] = mol.atoms().len() as f32;
        out[len - 1] = mol.bonds().len() as f32;
        out
    }
}

impl Featurizer for MolecularGraphFeaturizer {
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
        FeatureShape::new(vec![self.descriptor_len()])
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

        let data = self.describe(&mol);
        let len = data.len();
        Tensor::from_vec(data, len, &Device::Cpu).map_err(|e| FeaturizeError::failed(NAME, e))
    }
}
