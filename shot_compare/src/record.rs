//! Persisted per-directory comparison records.
//!
//! Each compared directory pair leaves a `comparison.json` in its output
//! directory: the map from screenshot suffix to classification. The record
//! is what makes re-runs idempotent, so it is written once and replaced
//! wholesale on an overwrite run, never merged in place.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::magick::PixelBounds;

/// Name of the per-directory record file.
pub const RECORD_FILE: &str = "comparison.json";

/// Terminal classification of one screenshot pair. Exactly one kind per
/// suffix per directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultKind {
    Similar,
    Different,
    Error,
    MissingBefore,
    MissingAfter,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Similar => "SIMILAR",
            ResultKind::Different => "DIFFERENT",
            ResultKind::Error => "ERROR",
            ResultKind::MissingBefore => "MISSING_BEFORE",
            ResultKind::MissingAfter => "MISSING_AFTER",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of comparing one suffix across the two trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePairResult {
    pub kind: ResultKind,
    /// Differing pixel count reported by the diff tool; absent for missing
    /// pairs and malformed inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difference: Option<i64>,
    /// Bounding box of changed pixels, when the tool could localize them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<PixelBounds>,
}

impl ImagePairResult {
    /// Record for a suffix present on only one side. No comparison ran, so
    /// there is no difference value or bounds.
    pub fn missing(kind: ResultKind) -> Self {
        Self {
            kind,
            difference: None,
            bounds: None,
        }
    }
}

/// The per-directory mapping from screenshot suffix to pair result.
/// `BTreeMap` keeps key order stable across runs.
pub type DirectoryRecord = BTreeMap<String, ImagePairResult>;

/// Whether a completed record already exists for `outdir`.
pub fn exists(outdir: &Path) -> bool {
    outdir.join(RECORD_FILE).is_file()
}

/// Load a previously persisted record; `None` means no prior record, which
/// is a normal state rather than an error.
pub fn load(outdir: &Path) -> Result<Option<DirectoryRecord>> {
    let path = outdir.join(RECORD_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(&path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Persist the record for `outdir`. Counts are integers and serde_json
/// refuses non-finite numbers, so the serialization is always portable;
/// a failure here propagates instead of leaving a half-written state
/// ambiguous.
pub fn save(outdir: &Path, record: &DirectoryRecord) -> Result<()> {
    let path = outdir.join(RECORD_FILE);
    let json = serde_json::to_vec_pretty(record)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> DirectoryRecord {
        let mut record = DirectoryRecord::new();
        record.insert(
            "login.png".to_string(),
            ImagePairResult {
                kind: ResultKind::Different,
                difference: Some(100),
                bounds: Some(PixelBounds {
                    top: 5,
                    left: 5,
                    right: 14,
                    bottom: 14,
                }),
            },
        );
        record.insert(
            "toolbar.png".to_string(),
            ImagePairResult::missing(ResultKind::MissingAfter),
        );
        record
    }

    #[test]
    fn load_of_absent_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).unwrap().is_none());
        assert!(!exists(dir.path()));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let record = sample_record();
        save(dir.path(), &record).unwrap();

        assert!(exists(dir.path()));
        assert_eq!(load(dir.path()).unwrap().unwrap(), record);
    }

    #[test]
    fn kinds_serialize_to_screaming_names() {
        let json = serde_json::to_string(&ResultKind::MissingBefore).unwrap();
        assert_eq!(json, "\"MISSING_BEFORE\"");
        let json = serde_json::to_string(&ResultKind::Similar).unwrap();
        assert_eq!(json, "\"SIMILAR\"");
    }

    #[test]
    fn missing_entries_omit_difference_and_bounds() {
        let json =
            serde_json::to_string(&ImagePairResult::missing(ResultKind::MissingAfter)).unwrap();
        assert_eq!(json, "{\"kind\":\"MISSING_AFTER\"}");
    }

    #[test]
    fn save_replaces_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), &sample_record()).unwrap();

        let mut smaller = DirectoryRecord::new();
        smaller.insert(
            "login.png".to_string(),
            ImagePairResult {
                kind: ResultKind::Similar,
                difference: Some(0),
                bounds: None,
            },
        );
        save(dir.path(), &smaller).unwrap();

        let loaded = load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, smaller);
        assert!(!loaded.contains_key("toolbar.png"));
    }

    #[test]
    fn serialization_is_byte_stable() {
        let record = sample_record();
        let first = serde_json::to_vec_pretty(&record).unwrap();
        let second = serde_json::to_vec_pretty(&record).unwrap();
        assert_eq!(first, second);
    }
}
