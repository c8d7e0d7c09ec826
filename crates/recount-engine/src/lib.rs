//! Ownership-insertion engine for recount.
//!
//! This crate provides the analysis and transformation passes:
//! - Name resolution over the arena tree (resolver, indexer)
//! - Ownership classification and consumption policy
//! - Closure capture retention (self-managed and proxy-wrapped)
//! - Rewrite rules (retain-on-pass, field exchange, auto-release)
//! - Liveness-driven release insertion
//! - Cleanup fixpoint (strip instrumentation, inline temporaries)
//! - Alignment repair loop with bounded retries
//! - Per-file pipeline producing text, hashes, and an edit log
//!
//! Passes mutate the tree in place and realign (print, re-parse, diff)
//! between stages so every pass works with accurate spans.

pub mod align;
pub mod captures;
pub mod cleanup;
pub mod indexer;
pub mod liveness;
pub mod ownership;
pub mod pipeline;
pub mod resolver;
pub mod rewrite;

pub use align::{AlignState, AlignmentResult, Realigner, MAX_REALIGN_ATTEMPTS};
pub use ownership::OwnershipPolicy;
pub use pipeline::{run_passes, transform_source, FileOutcome};
pub use resolver::{BindingResolver, ProgramResolver};
