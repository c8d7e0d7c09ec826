//! Recursive descent parser for the source dialect.
//!
//! Parses a token vector into an [`Arena`]. The parser backtracks by
//! token index in the two genuinely ambiguous places: local declarations
//! vs expression statements, and lambdas vs parenthesized expressions.
//!
//! ## Grammar
//!
//! ```text
//! <program>   := <typeDecl>*
//! <typeDecl>  := <annot>* ("class" | "interface") ident
//!                ("implements" ident ("," ident)*)? "{" <member>* "}"
//! <member>    := <annot>* (<field> | <method>) | <block>
//! <field>     := <type> ident ("=" <expr>)? ";"
//! <method>    := <type> ident "(" <params>? ")" (<block> | ";")
//! <type>      := ident ("<" <type> ("," <type>)* ">")? ("[" "]")*
//! <stmt>      := <block> | <localDecl> | <if> | <while> | <do> | <for>
//!              | <try> | <sync> | <return> | <throw> | <expr> ";" | ";"
//! <expr>      := <assign>; precedence climbing below that
//! <lambda>    := ident "->" (<expr> | <block>)
//!              | "(" (ident ("," ident)*)? ")" "->" (<expr> | <block>)
//! ```

use recount_core::span::{Pos, Span};
use thiserror::Error;

use crate::ast::{Arena, BinOp, NodeId, NodeKind, TypeRef, UnOp};
use crate::lexer::{tokenize, LexError};
use crate::token::{Token, TokenKind};

// ============================================================================
// Error Types
// ============================================================================

/// Errors produced while parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Tokenizer error.
    #[error(transparent)]
    Lex(#[from] LexError),

    /// Unexpected token.
    #[error("expected {expected} but found {found} at {line}:{col}")]
    Unexpected {
        expected: String,
        found: String,
        line: u32,
        col: u32,
    },

    /// Assignment to something that is not a name, field, or index.
    #[error("invalid assignment target at {line}:{col}")]
    InvalidAssignTarget { line: u32, col: u32 },
}

/// Result type for parser operations.
pub type ParseResult<T> = Result<T, ParseError>;

// ============================================================================
// Entry Point
// ============================================================================

/// Parse a source string into an arena with its root set.
pub fn parse(file: &str, source: &str) -> ParseResult<Arena> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        arena: Arena::new(file),
        tokens,
        pos: 0,
    };
    let root = parser.parse_program()?;
    parser.arena.set_root(root);
    Ok(parser.arena)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    arena: Arena,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> TokenKind {
        self.tokens[self.pos].kind
    }

    fn peek_kind_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseResult<Token> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        let found = if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            format!("'{}'", token.text)
        };
        ParseError::Unexpected {
            expected: expected.to_string(),
            found,
            line: token.start.line,
            col: token.start.col,
        }
    }

    fn span_from(&self, start: Pos) -> Span {
        // End of the previously consumed token.
        let end = self
            .tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.end)
            .unwrap_or(start);
        let end = if end < start { start } else { end };
        Span::new(self.arena.file.clone(), start, end)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn parse_program(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        let mut decls = Vec::new();
        while !self.at(TokenKind::Eof) {
            decls.push(self.parse_type_decl()?);
        }
        let span = self.span_from(start);
        Ok(self.arena.alloc(NodeKind::Program { decls }, span))
    }

    fn parse_annotations(&mut self) -> ParseResult<Vec<String>> {
        let mut annotations = Vec::new();
        while self.eat(TokenKind::At) {
            let name = self.expect(TokenKind::Ident, "annotation name")?;
            annotations.push(name.text);
        }
        Ok(annotations)
    }

    fn parse_type_decl(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        let annotations = self.parse_annotations()?;
        let is_interface = match self.peek_kind() {
            TokenKind::KwClass => {
                self.bump();
                false
            }
            TokenKind::KwInterface => {
                self.bump();
                true
            }
            _ => return Err(self.unexpected("'class' or 'interface'")),
        };
        let name = self.expect(TokenKind::Ident, "type name")?.text;
        let mut interfaces = Vec::new();
        if self.eat(TokenKind::KwImplements) {
            loop {
                interfaces.push(self.expect(TokenKind::Ident, "interface name")?.text);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut members = Vec::new();
        while !self.at(TokenKind::RBrace) {
            members.push(self.parse_member()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        let span = self.span_from(start);
        Ok(self.arena.alloc(
            NodeKind::ClassDecl {
                annotations,
                is_interface,
                name,
                interfaces,
                members,
            },
            span,
        ))
    }

    fn parse_member(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        if self.at(TokenKind::LBrace) {
            let body = self.parse_block()?;
            let span = self.span_from(start);
            return Ok(self.arena.alloc(NodeKind::InitBlock { body }, span));
        }
        let annotations = self.parse_annotations()?;
        let ty = self.parse_type()?;
        let name = self.expect(TokenKind::Ident, "member name")?.text;
        if self.at(TokenKind::LParen) {
            self.bump();
            let mut params = Vec::new();
            if !self.at(TokenKind::RParen) {
                loop {
                    params.push(self.parse_param()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
            let body = if self.eat(TokenKind::Semi) {
                None
            } else {
                Some(self.parse_block()?)
            };
            let span = self.span_from(start);
            return Ok(self.arena.alloc(
                NodeKind::MethodDecl {
                    annotations,
                    ret: ty,
                    name,
                    params,
                    body,
                },
                span,
            ));
        }
        let init = if self.eat(TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semi, "';'")?;
        let span = self.span_from(start);
        Ok(self.arena.alloc(
            NodeKind::FieldDecl {
                annotations,
                ty,
                name,
                init,
            },
            span,
        ))
    }

    fn parse_param(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        let annotations = self.parse_annotations()?;
        let ty = self.parse_type()?;
        let name = self.expect(TokenKind::Ident, "parameter name")?.text;
        let span = self.span_from(start);
        Ok(self.arena.alloc(
            NodeKind::Param {
                annotations,
                ty: Some(ty),
                name,
            },
            span,
        ))
    }

    fn parse_type(&mut self) -> ParseResult<TypeRef> {
        let name = self.expect(TokenKind::Ident, "type name")?.text;
        let mut args = Vec::new();
        if self.at(TokenKind::Lt) {
            self.bump();
            loop {
                args.push(self.parse_type()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Gt, "'>'")?;
        }
        let mut dims = 0u8;
        while self.at(TokenKind::LBracket) && self.peek_kind_at(1) == TokenKind::RBracket {
            self.bump();
            self.bump();
            dims += 1;
        }
        Ok(TypeRef { name, args, dims })
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_block(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        let span = self.span_from(start);
        Ok(self.arena.alloc(NodeKind::Block { stmts }, span))
    }

    fn parse_stmt(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        match self.peek_kind() {
            TokenKind::LBrace => self.parse_block(),
            TokenKind::Semi => {
                self.bump();
                let span = self.span_from(start);
                Ok(self.arena.alloc(NodeKind::Empty, span))
            }
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwWhile => self.parse_while(),
            TokenKind::KwDo => self.parse_do_while(),
            TokenKind::KwFor => self.parse_for(),
            TokenKind::KwTry => self.parse_try(),
            TokenKind::KwSynchronized => self.parse_synchronized(),
            TokenKind::KwReturn => {
                self.bump();
                let value = if self.at(TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semi, "';'")?;
                let span = self.span_from(start);
                Ok(self.arena.alloc(NodeKind::Return { value }, span))
            }
            TokenKind::KwThrow => {
                self.bump();
                let value = self.parse_expr()?;
                self.expect(TokenKind::Semi, "';'")?;
                let span = self.span_from(start);
                Ok(self.arena.alloc(NodeKind::Throw { value }, span))
            }
            _ => self.parse_local_or_expr_stmt(),
        }
    }

    /// Disambiguate `V v = ...;` from `v.touch();` by attempting a type
    /// followed by an identifier, backtracking on failure.
    fn parse_local_or_expr_stmt(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        if self.at(TokenKind::Ident) {
            let checkpoint = self.pos;
            if let Ok(ty) = self.parse_type() {
                if self.at(TokenKind::Ident) {
                    let name = self.bump().text;
                    let init = if self.eat(TokenKind::Assign) {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    self.expect(TokenKind::Semi, "';'")?;
                    let span = self.span_from(start);
                    return Ok(self.arena.alloc(NodeKind::LocalDecl { ty, name, init }, span));
                }
            }
            self.pos = checkpoint;
        }
        let expr = self.parse_expr()?;
        self.expect(TokenKind::Semi, "';'")?;
        let span = self.span_from(start);
        Ok(self.arena.alloc(NodeKind::ExprStmt { expr }, span))
    }

    fn parse_if(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        self.expect(TokenKind::KwIf, "'if'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        let then_branch = self.parse_stmt()?;
        let else_branch = if self.eat(TokenKind::KwElse) {
            Some(self.parse_stmt()?)
        } else {
            None
        };
        let span = self.span_from(start);
        Ok(self.arena.alloc(
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            },
            span,
        ))
    }

    fn parse_while(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        self.expect(TokenKind::KwWhile, "'while'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_stmt()?;
        let span = self.span_from(start);
        Ok(self.arena.alloc(NodeKind::While { cond, body }, span))
    }

    fn parse_do_while(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        self.expect(TokenKind::KwDo, "'do'")?;
        let body = self.parse_stmt()?;
        self.expect(TokenKind::KwWhile, "'while'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::Semi, "';'")?;
        let span = self.span_from(start);
        Ok(self.arena.alloc(NodeKind::DoWhile { body, cond }, span))
    }

    fn parse_for(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        self.expect(TokenKind::KwFor, "'for'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let init = if self.eat(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_local_or_expr_stmt()?)
        };
        let cond = if self.at(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semi, "';'")?;
        let mut update = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                update.push(self.parse_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_stmt()?;
        let span = self.span_from(start);
        Ok(self.arena.alloc(
            NodeKind::For {
                init,
                cond,
                update,
                body,
            },
            span,
        ))
    }

    fn parse_try(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        self.expect(TokenKind::KwTry, "'try'")?;
        let body = self.parse_block()?;
        let mut catches = Vec::new();
        while self.at(TokenKind::KwCatch) {
            let catch_start = self.peek().start;
            self.bump();
            self.expect(TokenKind::LParen, "'('")?;
            let param = self.parse_param()?;
            self.expect(TokenKind::RParen, "')'")?;
            let catch_body = self.parse_block()?;
            let span = self.span_from(catch_start);
            catches.push(self.arena.alloc(
                NodeKind::Catch {
                    param,
                    body: catch_body,
                },
                span,
            ));
        }
        let finally = if self.eat(TokenKind::KwFinally) {
            Some(self.parse_block()?)
        } else {
            None
        };
        if catches.is_empty() && finally.is_none() {
            return Err(self.unexpected("'catch' or 'finally'"));
        }
        let span = self.span_from(start);
        Ok(self.arena.alloc(
            NodeKind::Try {
                body,
                catches,
                finally,
            },
            span,
        ))
    }

    fn parse_synchronized(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        self.expect(TokenKind::KwSynchronized, "'synchronized'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let lock = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_block()?;
        let span = self.span_from(start);
        Ok(self.arena.alloc(NodeKind::Synchronized { lock, body }, span))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expr(&mut self) -> ParseResult<NodeId> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        let lhs = self.parse_binary(1)?;
        if self.at(TokenKind::Assign) {
            match self.arena.kind(lhs) {
                NodeKind::Name { .. } | NodeKind::FieldAccess { .. } | NodeKind::Index { .. } => {}
                _ => {
                    return Err(ParseError::InvalidAssignTarget {
                        line: start.line,
                        col: start.col,
                    })
                }
            }
            self.bump();
            let value = self.parse_assign()?;
            let span = self.span_from(start);
            return Ok(self.arena.alloc(NodeKind::Assign { target: lhs, value }, span));
        }
        Ok(lhs)
    }

    fn binop_at(&self) -> Option<BinOp> {
        Some(match self.peek_kind() {
            TokenKind::OrOr => BinOp::Or,
            TokenKind::AndAnd => BinOp::And,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::NotEq => BinOp::NotEq,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Rem,
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> ParseResult<NodeId> {
        let start = self.peek().start;
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.binop_at() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.bump();
            let rhs = self.parse_binary(prec + 1)?;
            let span = self.span_from(start);
            lhs = self.arena.alloc(NodeKind::Binary { op, lhs, rhs }, span);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        let op = match self.peek_kind() {
            TokenKind::Not => Some(UnOp::Not),
            TokenKind::Minus => Some(UnOp::Neg),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary()?;
            let span = self.span_from(start);
            return Ok(self.arena.alloc(NodeKind::Unary { op, operand }, span));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(TokenKind::Dot) {
                let name = self.expect(TokenKind::Ident, "member name")?.text;
                if self.at(TokenKind::LParen) {
                    let args = self.parse_args()?;
                    let span = self.span_from(start);
                    expr = self.arena.alloc(
                        NodeKind::MethodCall {
                            object: Some(expr),
                            name,
                            args,
                        },
                        span,
                    );
                } else {
                    let span = self.span_from(start);
                    expr = self
                        .arena
                        .alloc(NodeKind::FieldAccess { object: expr, name }, span);
                }
            } else if self.at(TokenKind::LBracket) {
                self.bump();
                let index = self.parse_expr()?;
                self.expect(TokenKind::RBracket, "']'")?;
                let span = self.span_from(start);
                expr = self
                    .arena
                    .alloc(NodeKind::Index { object: expr, index }, span);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> ParseResult<Vec<NodeId>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    /// True if the tokens from the current position form a lambda head:
    /// `ident ->` or `( ident, ... ) ->` / `( ) ->`.
    fn at_lambda(&self) -> bool {
        if self.at(TokenKind::Ident) && self.peek_kind_at(1) == TokenKind::Arrow {
            return true;
        }
        if !self.at(TokenKind::LParen) {
            return false;
        }
        let mut offset = 1;
        loop {
            match self.peek_kind_at(offset) {
                TokenKind::RParen => {
                    return self.peek_kind_at(offset + 1) == TokenKind::Arrow;
                }
                TokenKind::Ident => {
                    offset += 1;
                    match self.peek_kind_at(offset) {
                        TokenKind::Comma => offset += 1,
                        TokenKind::RParen => {}
                        _ => return false,
                    }
                }
                _ => return false,
            }
        }
    }

    fn parse_lambda(&mut self) -> ParseResult<NodeId> {
        let start = self.peek().start;
        let mut params = Vec::new();
        if self.at(TokenKind::Ident) {
            let token = self.bump();
            let span = Span::new(self.arena.file.clone(), token.start, token.end);
            params.push(self.arena.alloc(
                NodeKind::Param {
                    annotations: Vec::new(),
                    ty: None,
                    name: token.text,
                },
                span,
            ));
        } else {
            self.expect(TokenKind::LParen, "'('")?;
            while self.at(TokenKind::Ident) {
                let token = self.bump();
                let span = Span::new(self.arena.file.clone(), token.start, token.end);
                params.push(self.arena.alloc(
                    NodeKind::Param {
                        annotations: Vec::new(),
                        ty: None,
                        name: token.text,
                    },
                    span,
                ));
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
        }
        self.expect(TokenKind::Arrow, "'->'")?;
        let body = if self.at(TokenKind::LBrace) {
            self.parse_block()?
        } else {
            self.parse_expr()?
        };
        let span = self.span_from(start);
        Ok(self.arena.alloc(NodeKind::Lambda { params, body }, span))
    }

    fn parse_primary(&mut self) -> ParseResult<NodeId> {
        if self.at_lambda() {
            return self.parse_lambda();
        }
        let start = self.peek().start;
        match self.peek_kind() {
            TokenKind::Int => {
                let token = self.bump();
                let value: i64 = token.text.parse().unwrap_or(0);
                let span = self.span_from(start);
                Ok(self.arena.alloc(NodeKind::LitInt(value), span))
            }
            TokenKind::Str => {
                let token = self.bump();
                let span = self.span_from(start);
                Ok(self.arena.alloc(NodeKind::LitStr(token.text), span))
            }
            TokenKind::KwTrue => {
                self.bump();
                let span = self.span_from(start);
                Ok(self.arena.alloc(NodeKind::LitBool(true), span))
            }
            TokenKind::KwFalse => {
                self.bump();
                let span = self.span_from(start);
                Ok(self.arena.alloc(NodeKind::LitBool(false), span))
            }
            TokenKind::KwNull => {
                self.bump();
                let span = self.span_from(start);
                Ok(self.arena.alloc(NodeKind::LitNull, span))
            }
            TokenKind::KwNew => {
                self.bump();
                let class = self.parse_type()?;
                let args = self.parse_args()?;
                let body = if self.at(TokenKind::LBrace) {
                    self.bump();
                    let mut members = Vec::new();
                    while !self.at(TokenKind::RBrace) {
                        members.push(self.parse_member()?);
                    }
                    self.expect(TokenKind::RBrace, "'}'")?;
                    Some(members)
                } else {
                    None
                };
                let span = self.span_from(start);
                Ok(self.arena.alloc(NodeKind::New { class, args, body }, span))
            }
            TokenKind::Ident => {
                let token = self.bump();
                if self.at(TokenKind::LParen) {
                    let args = self.parse_args()?;
                    let span = self.span_from(start);
                    Ok(self.arena.alloc(
                        NodeKind::MethodCall {
                            object: None,
                            name: token.text,
                            args,
                        },
                        span,
                    ))
                } else {
                    let span = self.span_from(start);
                    Ok(self.arena.alloc(NodeKind::Name { text: token.text }, span))
                }
            }
            TokenKind::LParen => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            _ => Err(self.unexpected("expression")),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
