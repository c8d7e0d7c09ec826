//! Source file discovery.
//!
//! Arguments may be files or directories. Directories are walked in
//! sorted order; by default only files with the `.src` extension are
//! picked up, and `--include` globs replace that filter when given.

use std::path::PathBuf;

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use recount_core::error::RecountError;

/// Extension picked up when no include globs are given.
pub const SOURCE_EXTENSION: &str = "src";

/// Compile include patterns into a matcher. Empty input means the
/// default extension filter applies.
pub fn build_include_set(patterns: &[String]) -> Result<Option<GlobSet>, RecountError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|err| {
            RecountError::invalid_args(format!("invalid include pattern '{}': {}", pattern, err))
        })?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|err| RecountError::invalid_args(format!("invalid include set: {}", err)))?;
    Ok(Some(set))
}

/// Collect the files to process, deterministically ordered.
///
/// Explicitly named files are always taken; the include filter only
/// applies while walking directories.
pub fn discover(paths: &[PathBuf], include: Option<&GlobSet>) -> Result<Vec<PathBuf>, RecountError> {
    let mut found = Vec::new();
    for path in paths {
        if path.is_file() {
            found.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            return Err(RecountError::file_not_found(path.display().to_string()));
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                RecountError::internal(format!("walking {}: {}", path.display(), err))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file = entry.into_path();
            let matched = match include {
                Some(set) => set.is_match(&file),
                None => file
                    .extension()
                    .is_some_and(|ext| ext == SOURCE_EXTENSION),
            };
            if matched {
                found.push(file);
            }
        }
    }
    found.sort();
    found.dedup();
    Ok(found)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn walks_directories_for_source_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.src"), "class A { }").unwrap();
        fs::write(dir.path().join("b.txt"), "not source").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/c.src"), "class C { }").unwrap();

        let files = discover(&[dir.path().to_path_buf()], None).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.src", "c.src"]);
    }

    #[test]
    fn include_globs_replace_the_extension_filter() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.src"), "class A { }").unwrap();
        fs::write(dir.path().join("b.gc"), "class B { }").unwrap();

        let set = build_include_set(&["**/*.gc".to_string()]).unwrap().unwrap();
        let files = discover(&[dir.path().to_path_buf()], Some(&set)).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("b.gc"));
    }

    #[test]
    fn explicit_files_bypass_the_filter() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        fs::write(&file, "class A { }").unwrap();

        let files = discover(&[file.clone()], None).unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn missing_path_is_an_error() {
        let err = discover(&[PathBuf::from("/no/such/dir")], None).unwrap_err();
        assert!(matches!(err, RecountError::FileNotFound { .. }));
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let err = build_include_set(&["[".to_string()]).unwrap_err();
        assert!(matches!(err, RecountError::InvalidArguments { .. }));
    }
}
