use candle_core::Tensor;
use kinomer_core::{Entity, FeatureShape, FeaturizeError};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// What a stage consumes: measurement entities (head of a pipeline) or the
/// tensor produced by the previous stage.
#[derive(Debug, Clone)]
pub enum StageInput {
    Entities(Vec<Entity>),
    Tensor(Tensor),
}

/// Input capability declared by a featurizer, checked at pipeline
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Entities,
    Tensor,
}

/// A single transformation stage.
///
/// Implementations are pure with respect to the input and their frozen
/// configuration: the same input and config always produce a bit-identical
/// tensor. Two featurizers with equal `name()` and `config_digest()` are
/// equivalent for caching.
pub trait Featurizer: Send + Sync {
    /// Stable class identifier; part of every cache key.
    fn name(&self) -> &'static str;

    /// Fingerprint of the frozen configuration.
    fn config_digest(&self) -> String;

    fn input_kind(&self) -> StageKind;

    /// Runtime capability check, mirroring what `featurize` would reject
    /// with `UnsupportedInput`.
    fn accepts(&self, input: &StageInput) -> bool {
        matches!(
            (self.input_kind(), input),
            (StageKind::Entities, StageInput::Entities(_))
                | (StageKind::Tensor, StageInput::Tensor(_))
        )
    }

    /// Construction-time compatibility with an upstream output shape.
    /// Only consulted for tensor stages.
    fn accepts_shape(&self, upstream: &FeatureShape) -> bool {
        let _ = upstream;
        true
    }

    /// Output descriptor. Tensor stages receive their upstream shape;
    /// entity stages are passed `None`.
    fn output_shape(&self, upstream: Option<&FeatureShape>) -> FeatureShape;

    fn featurize(&self, input: &StageInput) -> Result<Tensor, FeaturizeError>;
}

/// Digest of a serde-serializable configuration struct. Field order is
/// fixed by the struct definition, so the digest is stable per config.
pub(crate) fn digest_config<T: Serialize>(config: &T) -> String {
    let json = serde_json::to_string(config).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    let mut hex = String::with_capacity(16);
    for byte in hasher.finalize().iter().take(8) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// First ligand among the entities, if any.
pub(crate) fn first_ligand(entities: &[Entity]) -> Option<&kinomer_core::Ligand> {
    entities.iter().find_map(Entity::as_ligand)
}

/// First protein among the entities, if any.
pub(crate) fn first_protein(entities: &[Entity]) -> Option<&kinomer_core::Protein> {
    entities.iter().find_map(Entity::as_protein)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Config {
        radius: usize,
        nbits: usize,
    }

    #[test]
    fn test_digest_is_stable_and_config_sensitive() {
        let a = digest_config(&Config {
            radius: 2,
            nbits: 2048,
        });
        let b = digest_config(&Config {
            radius: 2,
            nbits: 2048,
        });
        let c = digest_config(&Config {
            radius: 3,
            nbits: 2048,
        });
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
