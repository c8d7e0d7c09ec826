//! JSON run report.
//!
//! One record per processed file plus run totals, serialized for audit
//! and regression diffing. Hashes let a regression harness compare
//! runs without storing full sources.

use serde::Serialize;

use recount_core::diag::EditRecord;
use recount_core::error::RecountError;
use recount_core::hash::ContentHash;

/// Report schema version, bumped on breaking shape changes.
pub const SCHEMA_VERSION: &str = "1";

/// Outcome class for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Output differs from input.
    Edited,
    /// Transformation was a no-op.
    Unchanged,
    /// The file was abandoned; nothing was written.
    Failed,
}

/// Per-file entry in the run report.
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub file: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_hash: Option<ContentHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<ContentHash>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub edits: Vec<EditRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u8>,
}

impl FileReport {
    /// Entry for a file that failed outright.
    pub fn failed(file: impl Into<String>, err: &RecountError) -> Self {
        FileReport {
            file: file.into(),
            status: FileStatus::Failed,
            input_hash: None,
            output_hash: None,
            edits: Vec::new(),
            error: Some(err.to_string()),
            error_code: Some(err.error_code().code()),
        }
    }
}

/// Whole-run report.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub schema_version: String,
    pub files: Vec<FileReport>,
    pub edited: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl RunReport {
    /// Assemble a report from per-file entries.
    pub fn new(files: Vec<FileReport>) -> Self {
        let count = |status| files.iter().filter(|f| f.status == status).count();
        RunReport {
            schema_version: SCHEMA_VERSION.to_string(),
            edited: count(FileStatus::Edited),
            unchanged: count(FileStatus::Unchanged),
            failed: count(FileStatus::Failed),
            files,
        }
    }

    /// Process exit code: zero on a clean run, otherwise the first
    /// failed file's error code.
    pub fn exit_code(&self) -> u8 {
        self.files
            .iter()
            .find_map(|f| f.error_code)
            .unwrap_or(0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_and_exit_code() {
        let ok = FileReport {
            file: "a.src".into(),
            status: FileStatus::Unchanged,
            input_hash: None,
            output_hash: None,
            edits: Vec::new(),
            error: None,
            error_code: None,
        };
        let bad = FileReport::failed(
            "b.src",
            &RecountError::AlignmentFailed {
                file: "b.src".into(),
                attempts: 3,
            },
        );
        let report = RunReport::new(vec![ok, bad]);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.exit_code(), 5);
    }

    #[test]
    fn empty_fields_are_omitted_from_json() {
        let entry = FileReport {
            file: "a.src".into(),
            status: FileStatus::Unchanged,
            input_hash: None,
            output_hash: None,
            edits: Vec::new(),
            error: None,
            error_code: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"file":"a.src","status":"unchanged"}"#);
    }
}
