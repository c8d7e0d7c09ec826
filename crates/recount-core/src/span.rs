//! Source positions, spans, and scope context chains.
//!
//! Spans use 1-indexed line/column positions and are inclusive at both
//! ends. Containment is decided lexicographically by (line, col), which is
//! how the analyzers test whether a reference lies inside or outside a
//! given scope. Scope spans in a well-formed tree are properly nested:
//! two scope spans either nest or are disjoint, never partially overlap.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::binding::BindingId;

// ============================================================================
// Position
// ============================================================================

/// A position in a source file (1-indexed line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pos {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub col: u32,
}

impl Pos {
    /// Create a new position.
    pub fn new(line: u32, col: u32) -> Self {
        Pos { line, col }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

// ============================================================================
// Span
// ============================================================================

/// A source range: file plus inclusive start/end positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// File path (workspace-relative).
    pub file: String,
    /// Start position (inclusive).
    pub start: Pos,
    /// End position (inclusive).
    pub end: Pos,
}

impl Span {
    /// Create a new span.
    ///
    /// # Panics
    /// Panics if `start > end`.
    pub fn new(file: impl Into<String>, start: Pos, end: Pos) -> Self {
        assert!(
            start <= end,
            "Span start ({}) must be <= end ({})",
            start,
            end
        );
        Span {
            file: file.into(),
            start,
            end,
        }
    }

    /// Convenience constructor from raw line/col numbers.
    pub fn from_coords(
        file: impl Into<String>,
        line_start: u32,
        col_start: u32,
        line_end: u32,
        col_end: u32,
    ) -> Self {
        Span::new(
            file,
            Pos::new(line_start, col_start),
            Pos::new(line_end, col_end),
        )
    }

    /// A zero-width placeholder span for synthesized nodes.
    ///
    /// Synthesized nodes get real spans on the next print/re-parse cycle.
    pub fn synthetic(file: impl Into<String>) -> Self {
        Span::new(file, Pos::new(1, 1), Pos::new(1, 1))
    }

    /// Check whether `other` lies entirely within this span.
    ///
    /// Both ends are inclusive; positions compare lexicographically by
    /// line then column. Spans in different files never contain each
    /// other.
    pub fn contains(&self, other: &Span) -> bool {
        self.file == other.file && self.start <= other.start && other.end <= self.end
    }

    /// Check whether a single position lies within this span.
    pub fn contains_pos(&self, pos: Pos) -> bool {
        self.start <= pos && pos <= self.end
    }

    /// Check whether this span and `other` partially overlap.
    ///
    /// Partial overlap (neither contains the other, but they share
    /// positions) indicates a malformed scope tree.
    pub fn partially_overlaps(&self, other: &Span) -> bool {
        if self.file != other.file {
            return false;
        }
        let intersects = self.start <= other.end && other.start <= self.end;
        intersects && !self.contains(other) && !other.contains(self)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}..{}", self.file, self.start, self.end)
    }
}

// ============================================================================
// ContextLocation
// ============================================================================

/// A location together with its chain of enclosing scopes.
///
/// The context lists enclosing type/method/lambda scopes from outermost to
/// innermost, each paired with that scope's span. This is what makes edit
/// logs auditable: every recorded definition or reference says exactly
/// where it sits in the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLocation {
    /// The location itself.
    pub location: Span,
    /// Enclosing scopes, outermost first.
    pub context: Vec<(BindingId, Span)>,
}

impl ContextLocation {
    /// Create a context location with no enclosing scopes.
    pub fn bare(location: Span) -> Self {
        ContextLocation {
            location,
            context: Vec::new(),
        }
    }

    /// Create a context location with the given scope chain.
    pub fn with_context(location: Span, context: Vec<(BindingId, Span)>) -> Self {
        ContextLocation { location, context }
    }

    /// The innermost enclosing scope, if any.
    pub fn innermost(&self) -> Option<&(BindingId, Span)> {
        self.context.last()
    }

    /// True if this location lies inside the given span.
    pub fn is_within(&self, span: &Span) -> bool {
        span.contains(&self.location)
    }
}

impl fmt::Display for ContextLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location)?;
        if let Some((binding, _)) = self.innermost() {
            write!(f, " in {}", binding)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
