//! recount: static retain/release insertion
//!
//! Rewrites garbage-collected class-based source into explicitly
//! reference-counted source. The engine analyzes liveness, closure
//! captures, and ownership flow, then inserts `retain()`/`release()`
//! calls so every execution path balances each ownership-bearing
//! binding. Running the tool over its own output is a no-op.

// Core infrastructure - re-exported from recount-core
pub use recount_core::binding;
pub use recount_core::config;
pub use recount_core::diag;
pub use recount_core::error;
pub use recount_core::hash;
pub use recount_core::span;

// Language front end and transformation engine
pub use recount_engine as engine;
pub use recount_lang as lang;

// CLI plumbing
pub mod files;
pub mod report;
pub mod run;
