use crate::entities::Entity;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use strum::{Display, EnumIter, EnumString};

/// Assay vocabulary covered by the dataset loaders.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
pub enum AssayType {
    #[strum(serialize = "IC50")]
    IC50,
    #[strum(serialize = "Ki")]
    Ki,
    #[strum(serialize = "Kd")]
    Kd,
    #[strum(serialize = "percent_displacement")]
    PercentDisplacement,
    #[strum(serialize = "pIC50")]
    PIC50,
}

/// Unit/transform semantics of a raw assay readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum ValueKind {
    /// Concentration in nanomolar.
    #[strum(serialize = "nM")]
    Nanomolar,
    /// Already on the -log10(molar) scale (pIC50, pKi, pKd).
    #[strum(serialize = "p9")]
    PNine,
    /// Percentage in [0, 100].
    #[strum(serialize = "%")]
    Percent,
}

/// A raw numeric readout plus the transform needed to compare it with
/// readouts expressed in other units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityValue {
    value: f64,
    kind: ValueKind,
}

impl ActivityValue {
    pub fn new(value: f64, kind: ValueKind) -> Self {
        Self { value, kind }
    }

    pub fn nanomolar(value: f64) -> Self {
        Self::new(value, ValueKind::Nanomolar)
    }

    pub fn percent(value: f64) -> Self {
        Self::new(value, ValueKind::Percent)
    }

    pub fn raw(&self) -> f64 {
        self.value
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Map onto the common label scale used for dataset assembly.
    ///
    /// Concentrations land on the pIC50 scale (9 - log10(nM)); percentages
    /// become fractions; p-scale values pass through.
    pub fn normalized(&self) -> f64 {
        match self.kind {
            ValueKind::Nanomolar => 9.0 - self.value.log10(),
            ValueKind::PNine => self.value,
            ValueKind::Percent => self.value / 100.0,
        }
    }
}

/// Experimental conditions a measurement was taken under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssayConditions {
    pub ph: f64,
    pub temperature_k: Option<f64>,
}

impl Default for AssayConditions {
    fn default() -> Self {
        Self {
            ph: 7.0,
            temperature_k: None,
        }
    }
}

/// Identity of a measurement, derived from entities + assay + conditions.
///
/// The numeric value never participates, so re-measured points collapse
/// onto the same identity and the same cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasurementId(String);

impl MeasurementId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One observed bioactivity data point: the entities involved, the assay
/// performed, and the value read out. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    entities: Vec<Entity>,
    assay: AssayType,
    value: ActivityValue,
    conditions: AssayConditions,
    metadata: BTreeMap<String, String>,
}

impl Measurement {
    pub fn new(entities: Vec<Entity>, assay: AssayType, value: ActivityValue) -> Self {
        Self {
            entities,
            assay,
            value,
            conditions: AssayConditions::default(),
            metadata: BTreeMap::new(),
        }
    }

    /// Construction-time variant with explicit conditions.
    pub fn with_conditions(mut self, conditions: AssayConditions) -> Self {
        self.conditions = conditions;
        self
    }

    /// Construction-time variant attaching a metadata key.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn assay(&self) -> AssayType {
        self.assay
    }

    pub fn value(&self) -> ActivityValue {
        self.value
    }

    pub fn conditions(&self) -> &AssayConditions {
        &self.conditions
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// The `source` metadata key, when the loader recorded provenance.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(String::as_str)
    }

    /// Identity from entities + assay + conditions.
    pub fn id(&self) -> MeasurementId {
        self.digest(None)
    }

    /// Identity that additionally folds in the `source` metadata key, for
    /// corpora where provenance must keep otherwise-identical rows distinct.
    pub fn id_with_source(&self) -> MeasurementId {
        self.digest(self.source())
    }

    fn digest(&self, source: Option<&str>) -> MeasurementId {
        let mut hasher = Sha256::new();
        for entity in &self.entities {
            hasher.update(entity.canonical());
            hasher.update([0u8]);
        }
        hasher.update(self.assay.to_string());
        hasher.update([0u8]);
        hasher.update(format!("pH={}", self.conditions.ph));
        if let Some(t) = self.conditions.temperature_k {
            hasher.update(format!(";T={t}"));
        }
        if let Some(source) = source {
            hasher.update([0u8]);
            hasher.update(source);
        }
        let mut hex = String::with_capacity(64);
        for byte in hasher.finalize() {
            hex.push_str(&format!("{byte:02x}"));
        }
        MeasurementId(hex)
    }
}
