//! Hand-written tokenizer with line/column tracking.
//!
//! Produces a flat token vector for the backtracking parser. Line and
//! column are 1-indexed; a token's end position is the position of its
//! last character (inclusive), matching the span model used everywhere
//! else.

use recount_core::span::Pos;
use thiserror::Error;

use crate::token::{Token, TokenKind};

/// Error produced while tokenizing.
#[derive(Debug, Error)]
pub enum LexError {
    /// A character that starts no token.
    #[error("unexpected character '{ch}' at {line}:{col}")]
    UnexpectedChar { ch: char, line: u32, col: u32 },

    /// A string literal with no closing quote.
    #[error("unterminated string literal starting at {line}:{col}")]
    UnterminatedString { line: u32, col: u32 },

    /// A block comment with no closing `*/`.
    #[error("unterminated block comment starting at {line}:{col}")]
    UnterminatedComment { line: u32, col: u32 },
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn here(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    /// Position of the character just consumed.
    fn last(&self) -> Pos {
        // col is 1 only immediately after a newline or at start; the
        // previous character then sat at the end of the prior line, which
        // no token ever spans, so backing up one column is always right
        // for token text.
        Pos::new(self.line, self.col.saturating_sub(1).max(1))
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek2() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek2() == Some('*') => {
                    let (line, col) = (self.line, self.col);
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            Some('*') if self.peek2() == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => return Err(LexError::UnterminatedComment { line, col }),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_token(&mut self) -> Result<Option<Token>, LexError> {
        self.skip_trivia()?;
        let start = self.here();
        let ch = match self.peek() {
            Some(c) => c,
            None => return Ok(None),
        };

        if ch.is_ascii_alphabetic() || ch == '_' {
            let mut word = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    word.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            let kind = TokenKind::keyword(&word).unwrap_or(TokenKind::Ident);
            return Ok(Some(self.token(kind, word, start)));
        }

        if ch.is_ascii_digit() {
            let mut digits = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    digits.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            return Ok(Some(self.token(TokenKind::Int, digits, start)));
        }

        if ch == '"' {
            let (line, col) = (self.line, self.col);
            self.bump();
            let mut text = String::new();
            loop {
                match self.peek() {
                    Some('"') => {
                        self.bump();
                        break;
                    }
                    Some('\\') => {
                        // Escapes are carried through verbatim.
                        text.push('\\');
                        self.bump();
                        if let Some(c) = self.bump() {
                            text.push(c);
                        }
                    }
                    Some(c) => {
                        text.push(c);
                        self.bump();
                    }
                    None => return Err(LexError::UnterminatedString { line, col }),
                }
            }
            return Ok(Some(self.token(TokenKind::Str, text, start)));
        }

        let two = |a: char, b: Option<char>| -> Option<TokenKind> {
            match (a, b?) {
                ('-', '>') => Some(TokenKind::Arrow),
                ('=', '=') => Some(TokenKind::EqEq),
                ('!', '=') => Some(TokenKind::NotEq),
                ('<', '=') => Some(TokenKind::Le),
                ('>', '=') => Some(TokenKind::Ge),
                ('&', '&') => Some(TokenKind::AndAnd),
                ('|', '|') => Some(TokenKind::OrOr),
                _ => None,
            }
        };

        if let Some(kind) = two(ch, self.peek2()) {
            let mut text = String::new();
            text.push(self.bump().unwrap_or_default());
            text.push(self.bump().unwrap_or_default());
            return Ok(Some(self.token(kind, text, start)));
        }

        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semi,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '@' => TokenKind::At,
            '=' => TokenKind::Assign,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '!' => TokenKind::Not,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            other => {
                return Err(LexError::UnexpectedChar {
                    ch: other,
                    line: start.line,
                    col: start.col,
                })
            }
        };
        self.bump();
        Ok(Some(self.token(kind, ch.to_string(), start)))
    }

    fn token(&self, kind: TokenKind, text: String, start: Pos) -> Token {
        Token {
            kind,
            text,
            start,
            end: self.last(),
        }
    }
}

/// Tokenize a source string into a token vector ending with `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.lex_token()? {
        tokens.push(token);
    }
    let eof_pos = lexer.here();
    tokens.push(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        start: eof_pos,
        end: eof_pos,
    });
    Ok(tokens)
}

// ============================================================================
// Tests
// ============================================================================
