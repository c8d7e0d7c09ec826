//! Token kinds for the source dialect.

use std::fmt;

use recount_core::span::Pos;

/// Kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Identifiers and literals
    Ident,
    Int,
    Str,

    // Keywords
    KwClass,
    KwInterface,
    KwImplements,
    KwNew,
    KwIf,
    KwElse,
    KwWhile,
    KwDo,
    KwFor,
    KwTry,
    KwCatch,
    KwFinally,
    KwSynchronized,
    KwReturn,
    KwThrow,
    KwTrue,
    KwFalse,
    KwNull,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,
    At,
    Arrow, // ->

    // Operators
    Assign, // =
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    AndAnd,
    OrOr,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    /// End of input.
    Eof,
}

impl TokenKind {
    /// Keyword lookup for an identifier-shaped word.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        Some(match word {
            "class" => TokenKind::KwClass,
            "interface" => TokenKind::KwInterface,
            "implements" => TokenKind::KwImplements,
            "new" => TokenKind::KwNew,
            "if" => TokenKind::KwIf,
            "else" => TokenKind::KwElse,
            "while" => TokenKind::KwWhile,
            "do" => TokenKind::KwDo,
            "for" => TokenKind::KwFor,
            "try" => TokenKind::KwTry,
            "catch" => TokenKind::KwCatch,
            "finally" => TokenKind::KwFinally,
            "synchronized" => TokenKind::KwSynchronized,
            "return" => TokenKind::KwReturn,
            "throw" => TokenKind::KwThrow,
            "true" => TokenKind::KwTrue,
            "false" => TokenKind::KwFalse,
            "null" => TokenKind::KwNull,
            _ => return None,
        })
    }
}

impl fmt::Display for TokenKind {
    // Token kinds only appear in parse error messages.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A lexed token with its text and source positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token kind.
    pub kind: TokenKind,
    /// Source text of the token.
    pub text: String,
    /// Start position (1-indexed, inclusive).
    pub start: Pos,
    /// End position (1-indexed, inclusive).
    pub end: Pos,
}
