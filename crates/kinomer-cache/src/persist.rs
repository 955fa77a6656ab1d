//! Durable layout: one JSON object per line, headed by a schema tag.
//!
//! The file is append-only. Readers skip lines they cannot parse, so a
//! truncated trailing write degrades to a miss instead of an error, and a
//! file written by an incompatible schema version is ignored wholesale.

use crate::key::CacheKey;
use crate::store::Outcome;
use candle_core::{DType, Device, Shape, Tensor};
use kinomer_core::{CacheError, FeaturizeError};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

pub(crate) const SCHEMA: &str = "kinomer-cache/v1";

#[derive(Serialize, Deserialize)]
struct Header {
    schema: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum PersistedStatus {
    Success,
    Failure,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct PersistedEntry {
    pub featurizer: String,
    pub config: String,
    pub input: String,
    pub status: PersistedStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub(crate) fn entry_from(key: &CacheKey, outcome: &Outcome) -> Result<PersistedEntry, CacheError> {
    let mut entry = PersistedEntry {
        featurizer: key.featurizer().to_string(),
        config: key.config().to_string(),
        input: key.input().to_string(),
        status: PersistedStatus::Success,
        shape: None,
        payload: None,
        error_kind: None,
        reason: None,
    };
    match outcome {
        Outcome::Success(tensor) => {
            entry.shape = Some(tensor.dims().to_vec());
            entry.payload = Some(tensor_payload(tensor)?);
        }
        Outcome::Failure(error) => {
            entry.status = PersistedStatus::Failure;
            let (kind, reason) = match error {
                FeaturizeError::UnsupportedInput { reason, .. } => ("unsupported", reason.clone()),
                FeaturizeError::Failed { reason, .. } => ("failed", reason.clone()),
                // timeouts are transient and never persisted
                FeaturizeError::Timeout { .. } => ("failed", error.to_string()),
            };
            entry.error_kind = Some(kind.to_string());
            entry.reason = Some(reason);
        }
    }
    Ok(entry)
}

pub(crate) fn outcome_from(entry: PersistedEntry) -> Result<(CacheKey, Outcome), CacheError> {
    let key = CacheKey::new(&entry.featurizer, &entry.config, &entry.input);
    let outcome = match entry.status {
        PersistedStatus::Success => {
            let shape = entry
                .shape
                .ok_or_else(|| CacheError::Tensor("success entry without shape".to_string()))?;
            let payload = entry
                .payload
                .ok_or_else(|| CacheError::Tensor("success entry without payload".to_string()))?;
            let tensor = Tensor::from_vec(payload, Shape::from(shape), &Device::Cpu)
                .map_err(|e| CacheError::Tensor(e.to_string()))?;
            Outcome::Success(tensor)
        }
        PersistedStatus::Failure => {
            let reason = entry.reason.unwrap_or_default();
            let error = match entry.error_kind.as_deref() {
                Some("unsupported") => FeaturizeError::UnsupportedInput {
                    featurizer: entry.featurizer.clone(),
                    reason,
                },
                _ => FeaturizeError::Failed {
                    featurizer: entry.featurizer.clone(),
                    reason,
                },
            };
            Outcome::Failure(error)
        }
    };
    Ok((key, outcome))
}

pub(crate) fn tensor_payload(tensor: &Tensor) -> Result<Vec<f32>, CacheError> {
    tensor
        .flatten_all()
        .and_then(|t| t.to_dtype(DType::F32))
        .and_then(|t| t.to_vec1::<f32>())
        .map_err(|e| CacheError::Tensor(e.to_string()))
}

/// Append one entry, creating the file (with its header) on first write.
pub(crate) fn append_entry(path: &Path, entry: &PersistedEntry) -> Result<(), CacheError> {
    let fresh = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if fresh {
        let header = serde_json::to_string(&Header {
            schema: SCHEMA.to_string(),
        })?;
        writeln!(file, "{header}")?;
    }
    writeln!(file, "{}", serde_json::to_string(entry)?)?;
    Ok(())
}

/// Rewrite the file as a snapshot of the given entries.
pub(crate) fn write_snapshot(path: &Path, entries: &[PersistedEntry]) -> Result<(), CacheError> {
    let mut file = File::create(path)?;
    let header = serde_json::to_string(&Header {
        schema: SCHEMA.to_string(),
    })?;
    writeln!(file, "{header}")?;
    for entry in entries {
        writeln!(file, "{}", serde_json::to_string(entry)?)?;
    }
    Ok(())
}

/// Read all entries. A missing or unreadable file, a foreign schema tag and
/// corrupt lines all degrade to "fewer entries", never to an error.
pub(crate) fn read_entries(path: &Path) -> Vec<PersistedEntry> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            if path.exists() {
                tracing::warn!(path = %path.display(), error = %e, "cache store unreadable; starting empty");
            }
            return Vec::new();
        }
    };
    let mut lines = BufReader::new(file).lines();

    match lines.next() {
        Some(Ok(first)) => match serde_json::from_str::<Header>(&first) {
            Ok(header) if header.schema == SCHEMA => {}
            _ => {
                tracing::warn!(
                    path = %path.display(),
                    expected = SCHEMA,
                    "cache store has an incompatible schema tag; ignoring it"
                );
                return Vec::new();
            }
        },
        _ => return Vec::new(),
    }

    let mut entries = Vec::new();
    for (lineno, line) in lines.enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "stopping cache store read");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PersistedEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = lineno + 2,
                    error = %e,
                    "skipping corrupt cache entry"
                );
            }
        }
    }
    entries
}
