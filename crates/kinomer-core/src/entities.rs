use serde::{Deserialize, Serialize};

/// A protein identified by name, carried as its amino acid sequence.
///
/// The name doubles as the lookup key when a structure-based featurizer
/// resolves the protein against a structure store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protein {
    name: String,
    sequence: String,
}

impl Protein {
    pub fn new(name: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sequence: sequence.into().to_uppercase(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }
}

/// A small molecule identified by its SMILES string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ligand {
    name: String,
    smiles: String,
}

impl Ligand {
    pub fn from_smiles(smiles: impl Into<String>) -> Self {
        let smiles = smiles.into();
        Self {
            name: smiles.clone(),
            smiles,
        }
    }

    pub fn named(name: impl Into<String>, smiles: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            smiles: smiles.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn smiles(&self) -> &str {
        &self.smiles
    }
}

/// One typed biological object participating in a measurement.
///
/// Closed set on purpose: featurizers declare which variants they accept
/// and the pipeline checks capability, so adding a variant means touching
/// the featurizers that care and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entity {
    Protein(Protein),
    Ligand(Ligand),
}

impl Entity {
    /// Canonical textual form used for identity hashing.
    pub fn canonical(&self) -> String {
        match self {
            Entity::Protein(p) => format!("protein:{}:{}", p.name(), p.sequence()),
            Entity::Ligand(l) => format!("ligand:{}", l.smiles()),
        }
    }

    pub fn as_protein(&self) -> Option<&Protein> {
        match self {
            Entity::Protein(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_ligand(&self) -> Option<&Ligand> {
        match self {
            Entity::Ligand(l) => Some(l),
            _ => None,
        }
    }
}

impl From<Protein> for Entity {
    fn from(p: Protein) -> Self {
        Entity::Protein(p)
    }
}

impl From<Ligand> for Entity {
    fn from(l: Ligand) -> Self {
        Entity::Ligand(l)
    }
}
