use candle_core::Tensor;
use itertools::izip;
use kinomer_core::MeasurementId;

/// An ordered collection of (feature tensor, label) pairs with a record of
/// which measurement produced each row.
///
/// The dataset owns its tensors and labels; measurements themselves are
/// referenced by identity only, since the same measurement may back rows
/// in several datasets.
#[derive(Debug, Default)]
pub struct Dataset {
    features: Vec<Tensor>,
    labels: Vec<f64>,
    ids: Vec<MeasurementId>,
}

impl Dataset {
    pub(crate) fn push(&mut self, features: Tensor, label: f64, id: MeasurementId) {
        self.features.push(features);
        self.labels.push(label);
        self.ids.push(id);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[Tensor] {
        &self.features
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    pub fn ids(&self) -> &[MeasurementId] {
        &self.ids
    }

    /// Ordered (features, label, source identity) view for training
    /// collaborators.
    pub fn iter(&self) -> impl Iterator<Item = (&Tensor, f64, &MeasurementId)> {
        izip!(&self.features, &self.labels, &self.ids).map(|(features, &label, id)| (features, label, id))
    }

    /// All feature rows stacked along a new leading axis.
    pub fn stacked_features(&self) -> candle_core::Result<Tensor> {
        Tensor::stack(&self.features, 0)
    }

    /// Labels as a `[len]` f32 tensor.
    pub fn labels_tensor(&self) -> candle_core::Result<Tensor> {
        let labels: Vec<f32> = self.labels.iter().map(|&l| l as f32).collect();
        Tensor::from_vec(labels, self.labels.len(), &candle_core::Device::Cpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use kinomer_core::{ActivityValue, AssayType, Ligand, Measurement};

    fn id(n: u32) -> MeasurementId {
        Measurement::new(
            vec![Ligand::from_smiles(format!("{}C", "C".repeat(n as usize))).into()],
            AssayType::IC50,
            ActivityValue::nanomolar(1.0),
        )
        .id()
    }

    fn row(value: f32) -> Tensor {
        Tensor::from_vec(vec![value, value], 2, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_counts_stay_aligned() {
        let mut ds = Dataset::default();
        ds.push(row(1.0), 7.3, id(1));
        ds.push(row(2.0), 6.1, id(2));
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.features().len(), ds.labels().len());
        assert_eq!(ds.labels().len(), ds.ids().len());
    }

    #[test]
    fn test_iter_preserves_order() {
        let mut ds = Dataset::default();
        ds.push(row(1.0), 7.3, id(1));
        ds.push(row(2.0), 6.1, id(2));
        let labels: Vec<f64> = ds.iter().map(|(_, label, _)| label).collect();
        assert_eq!(labels, vec![7.3, 6.1]);
    }

    #[test]
    fn test_stacking() {
        let mut ds = Dataset::default();
        ds.push(row(1.0), 7.3, id(1));
        ds.push(row(2.0), 6.1, id(2));
        let stacked = ds.stacked_features().unwrap();
        assert_eq!(stacked.dims(), &[2, 2]);
        let labels = ds.labels_tensor().unwrap();
        assert_eq!(labels.dims(), &[2]);
    }
}
