//! Core infrastructure for recount.
//!
//! This crate provides language-agnostic infrastructure:
//! - Source spans and scope context chains
//! - Binding identities (stable declaration keys)
//! - Symbol index (definitions, definition nodes, references)
//! - Structured edit log / diagnostics sink
//! - Unified error type with stable error codes
//! - Pass options, pass context, temporary-name generation
//! - Content hashing for audit records

pub mod binding;
pub mod config;
pub mod diag;
pub mod error;
pub mod hash;
pub mod index;
pub mod span;
