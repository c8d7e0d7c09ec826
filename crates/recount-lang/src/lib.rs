//! Source dialect support for recount.
//!
//! This crate provides the language front end and back end:
//! - Tokenizer with line/column tracking
//! - Arena CST (integer node handles, closed node-kind sum type)
//! - Recursive descent parser
//! - Canonical printer (deterministic, shape-preserving)
//!
//! The dialect is a statically-typed class-based language with fields,
//! methods, lambdas, anonymous classes, marker annotations, and
//! structured control flow. See the parser module docs for the grammar.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod token;

pub use ast::{Arena, BinOp, Node, NodeId, NodeKind, TypeRef, UnOp};
pub use parser::{parse, ParseError, ParseResult};
pub use printer::{print_expr, print_program};
