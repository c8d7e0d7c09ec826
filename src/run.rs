//! Sequential per-file driver.
//!
//! Files are independent; each gets its own pass context and is
//! processed in order. A file that fails is reported and skipped
//! whole, never partially written.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use recount_core::config::Options;
use recount_core::error::RecountError;
use recount_engine::{transform_source, OwnershipPolicy};

use crate::report::{FileReport, FileStatus, RunReport};

/// One run's settings.
#[derive(Debug)]
pub struct RunConfig {
    pub options: Options,
    pub policy: OwnershipPolicy,
    /// Write edited files in place; otherwise report only.
    pub write: bool,
}

/// Process the given files in order and assemble the run report.
pub fn run_files(files: &[PathBuf], config: &RunConfig) -> RunReport {
    let mut reports = Vec::with_capacity(files.len());
    for file in files {
        reports.push(process_file(file, config));
    }
    RunReport::new(reports)
}

fn process_file(path: &Path, config: &RunConfig) -> FileReport {
    let name = path.display().to_string();
    match transform_file(path, &name, config) {
        Ok(report) => report,
        Err(err) => {
            warn!(file = %name, error = %err, "file abandoned");
            FileReport::failed(name, &err)
        }
    }
}

fn transform_file(path: &Path, name: &str, config: &RunConfig) -> Result<FileReport, RecountError> {
    let source = fs::read_to_string(path)?;
    let outcome = transform_source(name, &source, config.options.clone(), &config.policy)?;
    let status = if outcome.changed() {
        if config.write {
            fs::write(path, &outcome.text)?;
        }
        info!(file = %name, edits = outcome.records.len(), "edited");
        FileStatus::Edited
    } else {
        info!(file = %name, "unchanged");
        FileStatus::Unchanged
    };
    Ok(FileReport {
        file: name.to_string(),
        status,
        input_hash: Some(outcome.input_hash),
        output_hash: Some(outcome.output_hash),
        edits: outcome.records,
        error: None,
        error_code: None,
    })
}

// ============================================================================
// Tests
// ============================================================================
