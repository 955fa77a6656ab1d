//! kinomer-test-data
//!
//! Embedded fixture files for use in tests across the workspace. Fixtures
//! are packaged as `TestFile` objects holding the raw bytes and able to
//! materialize temporary files for code that reads from disk.
use std::fs;
use tempfile::{Builder, NamedTempFile};

#[derive(Debug)]
/// Test File
///
/// Example usage:
///
/// ```ignore
/// // returns (filepath, _tempfile_handle).
/// // _handle keeps the tempfile alive for the duration of the test
/// use kinomer_test_data::TestFile;
/// let (csv_file, _temp) = TestFile::activity_01().create_temp().unwrap();
/// ```
pub struct TestFile {
    filebinary: &'static [u8],
    suffix: &'static str,
}

impl TestFile {
    /// Tidy bioactivity table: one measurement per row, with a deliberately
    /// malformed SMILES in the last row for failure-path tests.
    pub fn activity_01() -> Self {
        Self {
            filebinary: include_bytes!("../data/activity.csv"),
            suffix: "csv",
        }
    }

    /// Minimal kinase-ligand complex: three glycine residues, a three-heavy-
    /// atom ligand, one hydrogen (filtered) and one water (filtered).
    pub fn structure_01() -> Self {
        Self {
            filebinary: include_bytes!("../data/3gky.pdb"),
            suffix: "pdb",
        }
    }

    /// The raw bytes, for tests that need a specific filename on disk.
    pub fn bytes(&self) -> &'static [u8] {
        self.filebinary
    }

    pub fn create_temp(&self) -> std::io::Result<(String, NamedTempFile)> {
        let temp = Builder::new()
            .suffix(&format!(".{}", self.suffix))
            .tempfile()?;

        fs::write(&temp, self.filebinary)?;
        let path = temp.path().to_string_lossy().into_owned();

        Ok((path, temp))
    }
}
