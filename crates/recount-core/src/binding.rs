//! Binding identities: stable keys for declarations and references.
//!
//! A [`BindingId`] names one declaration by its fully-qualified path plus
//! a declaration kind. Two ids are equal iff path and kind match, which
//! makes them usable as map keys across index rebuilds: the same
//! declaration keeps the same id no matter how many times the tree is
//! re-parsed.
//!
//! ## Path grammar
//!
//! ```text
//! <path>    := <type> ("::" <member>)*
//! <type>    := ident ("." ident)*
//! <member>  := ident ("(" <types>? ")")?
//! <types>   := ident ("," ident)*
//! ```
//!
//! Examples: `Outer.Inner`, `Cache::get(Key)`, `App::main()::handler`,
//! `App::run()::<lambda@3_7>`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use winnow::ascii::multispace0;
use winnow::combinator::{delimited, opt, preceded, repeat, separated};
use winnow::error::ErrMode;
use winnow::prelude::*;
use winnow::token::take_while;
use winnow::ModalResult;

// ============================================================================
// Binding Kind
// ============================================================================

/// What kind of declaration a binding names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// A class or interface declaration.
    Type,
    /// A method declaration.
    Method,
    /// A field declaration.
    Field,
    /// A method or lambda parameter.
    Parameter,
    /// A local variable.
    Variable,
    /// A lambda expression.
    Lambda,
    /// An anonymous class body.
    AnonymousClass,
}

impl BindingKind {
    /// Short lowercase label used in logs and edit records.
    pub fn label(&self) -> &'static str {
        match self {
            BindingKind::Type => "type",
            BindingKind::Method => "method",
            BindingKind::Field => "field",
            BindingKind::Parameter => "parameter",
            BindingKind::Variable => "variable",
            BindingKind::Lambda => "lambda",
            BindingKind::AnonymousClass => "anonymous_class",
        }
    }

    /// True for kinds that open a scope of their own.
    pub fn is_scope(&self) -> bool {
        matches!(
            self,
            BindingKind::Type
                | BindingKind::Method
                | BindingKind::Lambda
                | BindingKind::AnonymousClass
        )
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// BindingId
// ============================================================================

/// Stable identity of one declaration: qualified path plus kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct BindingId {
    /// Fully-qualified declaration chain, e.g. `Outer.Inner::run(V)::tmp`.
    pub path: String,
    /// Declaration kind.
    pub kind: BindingKind,
}

impl BindingId {
    /// Create a binding id from a pre-rendered path.
    pub fn new(path: impl Into<String>, kind: BindingKind) -> Self {
        BindingId {
            path: path.into(),
            kind,
        }
    }

    /// Append a member segment, producing a child id of the given kind.
    pub fn child(&self, segment: &str, kind: BindingKind) -> BindingId {
        BindingId {
            path: format!("{}::{}", self.path, segment),
            kind,
        }
    }

    /// The trailing segment of the path (the declared name itself).
    pub fn leaf(&self) -> &str {
        match self.path.rsplit_once("::") {
            Some((_, leaf)) => leaf,
            None => match self.path.rsplit_once('.') {
                Some((_, leaf)) => leaf,
                None => &self.path,
            },
        }
    }

    /// Parse and validate a path string against the binding path grammar.
    pub fn parse_path(input: &str) -> Result<BindingPath, BindingPathError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(BindingPathError::Empty);
        }
        parse_binding_path
            .parse(trimmed)
            .map_err(|e| BindingPathError::Invalid {
                input: trimmed.to_string(),
                message: format!("{:?}", e),
            })
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.path, self.kind)
    }
}

// ============================================================================
// Structured Path
// ============================================================================

/// Error parsing a binding path string.
#[derive(Debug, Error)]
pub enum BindingPathError {
    /// Empty input.
    #[error("empty binding path")]
    Empty,

    /// Syntax error in the path.
    #[error("invalid binding path '{input}': {message}")]
    Invalid { input: String, message: String },
}

/// A member segment of a binding path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMember {
    /// Member name.
    pub name: String,
    /// Parameter type names, present only for method-like members.
    pub param_types: Option<Vec<String>>,
}

/// Structured form of a binding path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPath {
    /// Dotted type qualifier segments, outermost first.
    pub type_segments: Vec<String>,
    /// `::`-separated member chain after the type qualifier.
    pub members: Vec<PathMember>,
}

impl BindingPath {
    /// Render back to the canonical string form.
    pub fn render(&self) -> String {
        let mut out = self.type_segments.join(".");
        for member in &self.members {
            out.push_str("::");
            out.push_str(&member.name);
            if let Some(types) = &member.param_types {
                out.push('(');
                out.push_str(&types.join(","));
                out.push(')');
            }
        }
        out
    }
}

// ============================================================================
// Parser implementation using winnow
// ============================================================================

fn parse_binding_path(input: &mut &str) -> ModalResult<BindingPath> {
    let type_segments: Vec<String> = separated(1.., parse_segment, '.').parse_next(input)?;

    let members: Vec<PathMember> =
        repeat(0.., preceded("::", parse_member)).parse_next(input)?;

    Ok(BindingPath {
        type_segments,
        members,
    })
}

fn parse_member(input: &mut &str) -> ModalResult<PathMember> {
    let name = parse_segment(input)?;
    let param_types = opt(delimited(
        '(',
        parse_type_list,
        (multispace0, ')'),
    ))
    .parse_next(input)?;
    Ok(PathMember { name, param_types })
}

fn parse_type_list(input: &mut &str) -> ModalResult<Vec<String>> {
    separated(0.., preceded(multispace0, parse_segment), ',').parse_next(input)
}

/// One identifier-like segment. Synthesized names for lambdas and
/// anonymous classes (`<lambda@3_7>`) are accepted as opaque segments.
fn parse_segment(input: &mut &str) -> ModalResult<String> {
    if input.starts_with('<') {
        let chunk: &str = take_while(1.., |c: char| c != '.' && c != ':' && c != '(' && c != ',')
            .parse_next(input)?;
        if !chunk.ends_with('>') {
            return Err(ErrMode::from_input(input));
        }
        return Ok(chunk.to_string());
    }
    let word: &str = take_while(1.., |c: char| {
        c.is_alphanumeric() || c == '_' || c == '[' || c == ']' || c == '@' || c == '>'
    })
    .parse_next(input)?;
    Ok(word.to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod identity {
        use super::*;

        #[test]
        fn equality_is_path_and_kind() {
            let a = BindingId::new("A::run()::v", BindingKind::Variable);
            let b = BindingId::new("A::run()::v", BindingKind::Variable);
            let c = BindingId::new("A::run()::v", BindingKind::Parameter);
            assert_eq!(a, b);
            assert_ne!(a, c);
        }

        #[test]
        fn child_appends_segment() {
            let method = BindingId::new("A::run()", BindingKind::Method);
            let local = method.child("v", BindingKind::Variable);
            assert_eq!(local.path, "A::run()::v");
            assert_eq!(local.kind, BindingKind::Variable);
        }

        #[test]
        fn leaf_strips_qualifiers() {
            assert_eq!(
                BindingId::new("Outer.Inner::run()::v", BindingKind::Variable).leaf(),
                "v"
            );
            assert_eq!(BindingId::new("Outer.Inner", BindingKind::Type).leaf(), "Inner");
            assert_eq!(BindingId::new("Solo", BindingKind::Type).leaf(), "Solo");
        }
    }

    mod path_grammar {
        use super::*;

        #[test]
        fn parses_plain_type() {
            let path = BindingId::parse_path("Outer.Inner").unwrap();
            assert_eq!(path.type_segments, vec!["Outer", "Inner"]);
            assert!(path.members.is_empty());
        }

        #[test]
        fn parses_method_with_params() {
            let path = BindingId::parse_path("Cache::get(Key,V)").unwrap();
            assert_eq!(path.type_segments, vec!["Cache"]);
            assert_eq!(path.members.len(), 1);
            assert_eq!(path.members[0].name, "get");
            assert_eq!(
                path.members[0].param_types.as_deref(),
                Some(&["Key".to_string(), "V".to_string()][..])
            );
        }

        #[test]
        fn parses_nullary_method_and_local() {
            let path = BindingId::parse_path("App::main()::handler").unwrap();
            assert_eq!(path.members.len(), 2);
            assert_eq!(path.members[0].name, "main");
            assert_eq!(path.members[0].param_types.as_deref(), Some(&[][..]));
            assert_eq!(path.members[1].name, "handler");
            assert!(path.members[1].param_types.is_none());
        }

        #[test]
        fn parses_synthetic_lambda_segment() {
            let path = BindingId::parse_path("App::run()::<lambda@3_7>").unwrap();
            assert_eq!(path.members.last().unwrap().name, "<lambda@3_7>");
        }

        #[test]
        fn round_trips_through_render() {
            for input in ["Outer.Inner", "Cache::get(Key,V)", "App::main()::handler"] {
                let path = BindingId::parse_path(input).unwrap();
                assert_eq!(path.render(), input);
            }
        }

        #[test]
        fn rejects_empty_and_garbage() {
            assert!(BindingId::parse_path("").is_err());
            assert!(BindingId::parse_path("   ").is_err());
            assert!(BindingId::parse_path("A::run( trailing").is_err());
        }
    }
}
