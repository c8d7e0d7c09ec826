//! Per-file transformation pipeline.
//!
//! Every run starts from the cleanup fixpoint, so instrumentation is
//! always inserted into a bare tree and repeated runs converge. The
//! full pipeline then layers the instrumentation passes, realigning
//! between each so every pass sees accurate spans:
//!
//! ```text
//! parse -> cleanup* -> captures -> realign
//!                   -> rewrites -> realign
//!                   -> releases -> realign -> text
//! ```
//!
//! Cleanup-only mode stops after the fixpoint and prints the stripped
//! tree. A file whose alignment diverges is abandoned whole; no
//! partial output ever escapes this module.

use recount_core::config::{Options, PassContext};
use recount_core::diag::EditRecord;
use recount_core::error::RecountError;
use recount_core::hash::ContentHash;
use recount_lang::{parse, Arena};
use tracing::debug;

use crate::align::Realigner;
use crate::captures::process_captures;
use crate::cleanup::run_cleanup;
use crate::liveness::insert_releases;
use crate::ownership::OwnershipPolicy;
use crate::resolver::ProgramResolver;
use crate::rewrite::apply_rewrites;

// ============================================================================
// FileOutcome
// ============================================================================

/// Result of transforming one file.
#[derive(Debug)]
pub struct FileOutcome {
    /// Canonical transformed text.
    pub text: String,
    /// Hash of the input bytes.
    pub input_hash: ContentHash,
    /// Hash of the output bytes.
    pub output_hash: ContentHash,
    /// Structured edit log accumulated across all passes.
    pub records: Vec<EditRecord>,
}

impl FileOutcome {
    /// True when the output differs from the input.
    pub fn changed(&self) -> bool {
        self.input_hash != self.output_hash
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// Transform one file's source text.
pub fn transform_source(
    file: &str,
    source: &str,
    options: Options,
    policy: &OwnershipPolicy,
) -> Result<FileOutcome, RecountError> {
    let mut ctx = PassContext::new(options);
    let mut realigner = Realigner::new();
    let mut arena = parse(file, source).map_err(|err| RecountError::ParseError {
        file: file.to_string(),
        message: err.to_string(),
    })?;
    let text = run_passes(&mut arena, &mut realigner, policy, &mut ctx)?;
    Ok(FileOutcome {
        input_hash: ContentHash::compute(source.as_bytes()),
        output_hash: ContentHash::compute(text.as_bytes()),
        text,
        records: ctx.sink.take_records(),
    })
}

/// Run the pass sequence over an already-parsed tree.
///
/// Exposed separately so callers can install a [`Realigner`] hook or
/// inspect the arena afterwards. Returns the canonical output text.
pub fn run_passes(
    arena: &mut Arena,
    realigner: &mut Realigner,
    policy: &OwnershipPolicy,
    ctx: &mut PassContext,
) -> Result<String, RecountError> {
    run_cleanup(arena, ctx);
    realigner.mark_edited();
    if !ctx.options.add_refcounting {
        debug!(file = %arena.file, "cleanup-only run");
        return realigner.realign(arena, ctx);
    }
    // Realign after cleanup so the capture pass works with real spans.
    realigner.realign(arena, ctx)?;

    debug!(file = %arena.file, "capture pass");
    let resolver = ProgramResolver::from_arena(arena);
    process_captures(arena, &resolver, policy, ctx);
    realigner.mark_edited();
    realigner.realign(arena, ctx)?;

    debug!(file = %arena.file, "rewrite pass");
    let resolver = ProgramResolver::from_arena(arena);
    apply_rewrites(arena, &resolver, policy, ctx);
    realigner.mark_edited();
    realigner.realign(arena, ctx)?;

    debug!(file = %arena.file, "release pass");
    let resolver = ProgramResolver::from_arena(arena);
    insert_releases(arena, &resolver, policy, ctx);
    realigner.mark_edited();
    realigner.realign(arena, ctx)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LIFECYCLE: &str = "@RefCounted class V { void retain() { } void release() { } }\n";

    fn full(source: &str) -> String {
        transform_source("t.src", source, Options::default(), &OwnershipPolicy::default())
            .unwrap()
            .text
    }

    fn cleanup_only(source: &str) -> String {
        transform_source(
            "t.src",
            source,
            Options::cleanup_only(),
            &OwnershipPolicy::default(),
        )
        .unwrap()
        .text
    }

    #[test]
    fn full_run_retains_and_releases() {
        let source = format!(
            "{}class A {{ void f() {{ V v = make(); use(v); done(); }} }}",
            LIFECYCLE
        );
        let text = full(&source);
        assert!(text.contains("use(v.retain());"));
        assert!(text.contains("v.release();"));
    }

    #[test]
    fn full_run_is_idempotent() {
        let source = format!(
            "{}class A {{ void f() {{ V v = make(); use(v); done(); }} }}",
            LIFECYCLE
        );
        let once = full(&source);
        let twice = full(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn cleanup_only_strips_instrumentation() {
        let source = format!(
            "{}class A {{ void f() {{ V v = make(); use(v.retain()); v.release(); done(); }} }}",
            LIFECYCLE
        );
        let text = cleanup_only(&source);
        assert!(text.contains("use(v);"));
        assert!(!text.contains(".retain()"));
        assert!(!text.contains("v.release()"));
    }

    #[test]
    fn parse_failure_reported_with_file() {
        let err = transform_source(
            "bad.src",
            "class {",
            Options::default(),
            &OwnershipPolicy::default(),
        )
        .unwrap_err();
        match err {
            RecountError::ParseError { file, .. } => assert_eq!(file, "bad.src"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn outcome_hashes_track_change() {
        let source = format!(
            "{}class A {{ void f() {{ V v = make(); use(v); }} }}",
            LIFECYCLE
        );
        let outcome = transform_source(
            "t.src",
            &source,
            Options::default(),
            &OwnershipPolicy::default(),
        )
        .unwrap();
        assert!(outcome.changed());
        assert!(!outcome.records.is_empty());
    }
}
