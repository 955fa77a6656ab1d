use crate::featurizer::{digest_config, first_protein, Featurizer, StageInput, StageKind};
use candle_core::{Device, Tensor};
use kinomer_core::{FeatureShape, FeaturizeError};
use serde::Serialize;

const NAME: &str = "sequence_composition";

/// Canonical residue order; the trailing bucket collects everything else.
const ALPHABET: &str = "ACDEFGHIKLMNPQRSTVWY";
const ALPHABET_LEN: usize = 21;

/// Amino acid composition of the first protein entity: the fraction of
/// each canonical residue plus an unknown bucket, shape `[21]`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SequenceCompositionFeaturizer {}

impl SequenceCompositionFeaturizer {
    pub fn new() -> Self {
        Self {}
    }
}

fn aa_index(aa: char) -> usize {
    ALPHABET.find(aa).unwrap_or(ALPHABET_LEN - 1)
}

impl Featurizer for SequenceCompositionFeaturizer {
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
        matches!(input, StageInput::Entities(entities) if first_protein(entities).is_some())
    }

    fn output_shape(&self, _upstream: Option<&FeatureShape>) -> FeatureShape {
        FeatureShape::new(vec![ALPHABET_LEN])
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
        let sequence = protein.sequence();
        if sequence.is_empty() {
            return Err(FeaturizeError::failed(
                NAME,
                format!("protein '{}' has an empty sequence", protein.name()),
            ));
        }

        let mut counts = vec![0f32; ALPHABET_LEN];
        for aa in sequence.chars() {
            counts[aa_index(aa)] += 1.0;
        }
        let total = sequence.chars().count() as f32;
        for count in &mut counts {
            *count /= total;
        }
        Tensor::from_vec(counts, ALPHABET_LEN, &Device::Cpu)
            .map_err(|e| FeaturizeError::failed(NAME, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinomer_core::{Ligand, Protein};

    #[test]
    fn test_composition_fractions() {
        let f = SequenceCompositionFeaturizer::new();
        let input = StageInput::Entities(vec![Protein::new("toy", "AAGG").into()]);
        let v: Vec<f32> = f.featurize(&input).unwrap().to_vec1().unwrap();
        assert_eq!(v.len(), 21);
        assert!((v[aa_index('A')] - 0.5).abs() < 1e-6);
        assert!((v[aa_index('G')] - 0.5).abs() < 1e-6);
        assert!((v.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_unknown_residues_bucketed() {
        let f = SequenceCompositionFeaturizer::new();
        let input = StageInput::Entities(vec![Protein::new("toy", "AXZB").into()]);
        let v: Vec<f32> = f.featurize(&input).unwrap().to_vec1().unwrap();
        // X, Z and B all land in the final bucket
        assert!((v[20] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_ligand_only_is_unsupported() {
        let f = SequenceCompositionFeaturizer::new();
        let input = StageInput::Entities(vec![Ligand::from_smiles("CCO").into()]);
        assert!(!f.accepts(&input));
        assert!(matches!(
            f.featurize(&input),
            Err(FeaturizeError::UnsupportedInput { .. })
        ));
    }

    #[test]
    fn test_empty_sequence_fails() {
        let f = SequenceCompositionFeaturizer::new();
        let input = StageInput::Entities(vec![Protein::new("empty", "").into()]);
        assert!(matches!(
            f.featurize(&input),
            Err(FeaturizeError::Failed { .. })
        ));
    }
}
