use kinomer_core::{ActivityValue, AssayType, Entity, Ligand, Measurement, Protein, ValueKind};
use polars::prelude::*;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] PolarsError),

    #[error("row {row}: {reason}")]
    Row { row: usize, reason: String },
}

/// A producer of measurements: finite, and restartable in the sense that
/// every call re-yields the full sequence from the start, in the same
/// order. Dataset assembly follows this order; there is no implicit
/// shuffling.
pub trait MeasurementSource: Send + Sync {
    fn measurements(&self) -> Result<Vec<Measurement>, SourceError>;
}

/// In-memory source for tests and programmatic dataset construction.
pub struct VecSource {
    items: Vec<Measurement>,
}

impl VecSource {
    pub fn new(items: Vec<Measurement>) -> Self {
        Self { items }
    }
}

impl MeasurementSource for VecSource {
    fn measurements(&self) -> Result<Vec<Measurement>, SourceError> {
        Ok(self.items.clone())
    }
}

/// Tidy activity table on disk: one measurement per row with columns
/// `protein_name, sequence, smiles, assay, value, unit`.
///
/// Every yielded measurement carries a `source` metadata key with the
/// file stem, so provenance-aware dedup can keep rows from different
/// spreadsheets distinct.
pub struct CsvActivitySource {
    path: PathBuf,
}

impl CsvActivitySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn source_tag(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

impl MeasurementSource for CsvActivitySource {
    fn measurements(&self) -> Result<Vec<Measurement>, SourceError> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(self.path.clone()))?
            .finish()?;

        let strings = |name: &str| -> Result<StringChunked, SourceError> {
            Ok(df
                .column(name)?
                .as_materialized_series()
                .str()?
                .clone())
        };
        let proteins = strings("protein_name")?;
        let sequences = strings("sequence")?;
        let smiles = strings("smiles")?;
        let assays = strings("assay")?;
        let units = strings("unit")?;
        let values = df
            .column("value")?
            .as_materialized_series()
            .cast(&DataType::Float64)?
            .f64()?
            .clone();

        let source_tag = self.source_tag();
        let mut out = Vec::with_capacity(df.height());
        for row in 0..df.height() {
            let field = |chunked: &StringChunked, what: &str| -> Result<String, SourceError> {
                chunked
                    .get(row)
                    .map(str::to_string)
                    .ok_or_else(|| SourceError::Row {
                        row,
                        reason: format!("missing {what}"),
                    })
            };
            let protein = Protein::new(field(&proteins, "protein_name")?, field(&sequences, "sequence")?);
            let ligand = Ligand::from_smiles(field(&smiles, "smiles")?);
            let assay_raw = field(&assays, "assay")?;
            let assay = AssayType::from_str(&assay_raw).map_err(|_| SourceError::Row {
                row,
                reason: format!("unknown assay type '{assay_raw}'"),
            })?;
            let unit_raw = field(&units, "unit")?;
            let kind = parse_unit(&unit_raw).ok_or_else(|| SourceError::Row {
                row,
                reason: format!("unknown unit '{unit_raw}'"),
            })?;
            let value = values.get(row).ok_or_else(|| SourceError::Row {
                row,
                reason: "missing value".to_string(),
            })?;

            let entities: Vec<Entity> = vec![protein.into(), ligand.into()];
            out.push(
                Measurement::new(entities, assay, ActivityValue::new(value, kind))
                    .with_metadata("source", source_tag.clone()),
            );
        }
        Ok(out)
    }
}

fn parse_unit(unit: &str) -> Option<ValueKind> {
    match unit {
        "nM" | "nm" | "nanomolar" => Some(ValueKind::Nanomolar),
        "percent" | "%" => Some(ValueKind::Percent),
        "p9" | "pIC50" | "pKi" | "pKd" => Some(ValueKind::PNine),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinomer_test_data::TestFile;

    #[test]
    fn test_csv_source_loads_rows_in_order() {
        let (csv_file, _temp) = TestFile::activity_01().create_temp().unwrap();
        let source = CsvActivitySource::new(&csv_file);
        let measurements = source.measurements().unwrap();
        assert_eq!(measurements.len(), 4);

        let first = &measurements[0];
        assert_eq!(first.assay(), AssayType::IC50);
        assert_eq!(first.value().raw(), 50.0);
        assert_eq!(
            first.entities()[0].as_protein().unwrap().name(),
            "ABL1"
        );
        assert!(first.source().is_some());

        // restartable: a second call yields the same sequence
        let again = source.measurements().unwrap();
        assert_eq!(measurements.len(), again.len());
        assert_eq!(measurements[0].id(), again[0].id());
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!(parse_unit("nM"), Some(ValueKind::Nanomolar));
        assert_eq!(parse_unit("percent"), Some(ValueKind::Percent));
        assert_eq!(parse_unit("pIC50"), Some(ValueKind::PNine));
        assert_eq!(parse_unit("furlongs"), None);
    }
}
