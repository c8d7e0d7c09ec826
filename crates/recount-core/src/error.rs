//! Unified error type and stable error codes.
//!
//! Subsystem errors (parse, index, rewrite, alignment) are bridged into a
//! single `RecountError` before reaching the CLI, which maps each variant
//! to a stable integer code for JSON output and process exit status:
//!
//! - `2`: invalid arguments (bad input from caller)
//! - `3`: resolution errors (file or binding not found)
//! - `4`: apply errors (failed to write output)
//! - `5`: alignment failed (repair bound exceeded, no partial write)
//! - `10`: internal errors (bugs, unexpected state)
//!
//! Everything recoverable (unresolved bindings, skipped edits, duplicate
//! definitions) is *not* an error here; those are warnings in the edit
//! log and the file still completes.

use std::fmt;

use thiserror::Error;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Stable error codes for JSON output and CLI exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller.
    InvalidArguments = 2,
    /// Resolution errors (file not found, parse failure).
    ResolutionError = 3,
    /// Apply errors (failed to write output).
    ApplyError = 4,
    /// Alignment repair exceeded its retry bound.
    AlignmentFailed = 5,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type surfaced by the pipeline and CLI.
#[derive(Debug, Error)]
pub enum RecountError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// Source failed to parse.
    #[error("parse error in {file}: {message}")]
    ParseError { file: String, message: String },

    /// Failed to write output.
    #[error("apply error: {message}")]
    ApplyError { message: String },

    /// Alignment repair diverged past the retry bound; the file is
    /// abandoned with no partial write.
    #[error("alignment failed for {file} after {attempts} repair attempts")]
    AlignmentFailed { file: String, attempts: u32 },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

impl RecountError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        RecountError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        RecountError::FileNotFound { path: path.into() }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        RecountError::InternalError {
            message: message.into(),
        }
    }

    /// Get the stable error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

impl From<&RecountError> for OutputErrorCode {
    fn from(err: &RecountError) -> Self {
        match err {
            RecountError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            RecountError::FileNotFound { .. } => OutputErrorCode::ResolutionError,
            RecountError::ParseError { .. } => OutputErrorCode::ResolutionError,
            RecountError::ApplyError { .. } => OutputErrorCode::ApplyError,
            RecountError::AlignmentFailed { .. } => OutputErrorCode::AlignmentFailed,
            RecountError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<RecountError> for OutputErrorCode {
    fn from(err: RecountError) -> Self {
        OutputErrorCode::from(&err)
    }
}

impl From<std::io::Error> for RecountError {
    fn from(err: std::io::Error) -> Self {
        RecountError::ApplyError {
            message: format!("IO error: {}", err),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod error_code_mapping {
        use super::*;

        #[test]
        fn alignment_failed_maps_to_code_5() {
            let err = RecountError::AlignmentFailed {
                file: "t.src".to_string(),
                attempts: 3,
            };
            assert_eq!(err.error_code(), OutputErrorCode::AlignmentFailed);
            assert_eq!(err.error_code().code(), 5);
        }

        #[test]
        fn parse_error_maps_to_resolution_error() {
            let err = RecountError::ParseError {
                file: "t.src".to_string(),
                message: "unexpected token".to_string(),
            };
            assert_eq!(err.error_code().code(), 3);
        }

        #[test]
        fn invalid_args_maps_to_code_2() {
            assert_eq!(RecountError::invalid_args("bad").error_code().code(), 2);
        }

        #[test]
        fn internal_maps_to_code_10() {
            assert_eq!(RecountError::internal("boom").error_code().code(), 10);
        }
    }

    mod error_display {
        use super::*;

        #[test]
        fn alignment_failed_display() {
            let err = RecountError::AlignmentFailed {
                file: "t.src".to_string(),
                attempts: 3,
            };
            assert_eq!(
                err.to_string(),
                "alignment failed for t.src after 3 repair attempts"
            );
        }

        #[test]
        fn file_not_found_display() {
            assert_eq!(
                RecountError::file_not_found("missing.src").to_string(),
                "file not found: missing.src"
            );
        }
    }
}
