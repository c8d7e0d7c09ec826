//! Pass options and the per-file pass context.
//!
//! The context bundles everything a pass needs besides the tree itself:
//! the recognized options, a deterministic temporary-name generator, and
//! the diagnostics sink. Passing it explicitly keeps the engine free of
//! ambient mutable state.

use serde::{Deserialize, Serialize};

use crate::diag::DiagnosticsSink;

// ============================================================================
// Options
// ============================================================================

/// Recognized engine options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Run the full instrumentation pipeline; when false, only the
    /// cleanup/normalization passes run.
    pub add_refcounting: bool,
    /// Emit per-rule diagnostic detail.
    pub verbose_logging: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            add_refcounting: true,
            verbose_logging: false,
        }
    }
}

impl Options {
    /// Cleanup-only options (strip and normalize, no instrumentation).
    pub fn cleanup_only() -> Self {
        Options {
            add_refcounting: false,
            verbose_logging: false,
        }
    }
}

// ============================================================================
// Temporary Names
// ============================================================================

/// Prefix shared by all generated temporaries.
pub const TEMP_PREFIX: &str = "__rc_tmp";

/// Deterministic generator for temporary variable names.
///
/// Names are `__rc_tmp0`, `__rc_tmp1`, ... scoped to one file, so repeated
/// runs over the same input produce identical output.
#[derive(Debug, Default)]
pub struct TempNames {
    next: u32,
}

impl TempNames {
    /// Create a generator starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next temporary name.
    pub fn fresh(&mut self) -> String {
        let name = format!("{}{}", TEMP_PREFIX, self.next);
        self.next += 1;
        name
    }

    /// True if `name` looks like a generated temporary.
    pub fn is_temp(name: &str) -> bool {
        name.strip_prefix(TEMP_PREFIX)
            .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
    }
}

// ============================================================================
// PassContext
// ============================================================================

/// Everything a pass needs besides the tree: options, name generator,
/// diagnostics sink.
#[derive(Debug)]
pub struct PassContext {
    /// Engine options.
    pub options: Options,
    /// Temporary-name generator, shared across passes of one file.
    pub names: TempNames,
    /// Structured edit log.
    pub sink: DiagnosticsSink,
}

impl PassContext {
    /// Create a context for one file run.
    pub fn new(options: Options) -> Self {
        let verbose = options.verbose_logging;
        PassContext {
            options,
            names: TempNames::new(),
            sink: DiagnosticsSink::new(verbose),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_names_are_sequential_and_deterministic() {
        let mut names = TempNames::new();
        assert_eq!(names.fresh(), "__rc_tmp0");
        assert_eq!(names.fresh(), "__rc_tmp1");
        let mut again = TempNames::new();
        assert_eq!(again.fresh(), "__rc_tmp0");
    }

    #[test]
    fn is_temp_recognizes_generated_names_only() {
        assert!(TempNames::is_temp("__rc_tmp0"));
        assert!(TempNames::is_temp("__rc_tmp17"));
        assert!(!TempNames::is_temp("__rc_tmp"));
        assert!(!TempNames::is_temp("__rc_tmpx"));
        assert!(!TempNames::is_temp("tmp0"));
    }

    #[test]
    fn context_inherits_verbosity() {
        let ctx = PassContext::new(Options {
            add_refcounting: true,
            verbose_logging: true,
        });
        assert!(ctx.sink.verbose());
    }

    #[test]
    fn cleanup_only_disables_instrumentation() {
        assert!(!Options::cleanup_only().add_refcounting);
        assert!(Options::default().add_refcounting);
    }
}
