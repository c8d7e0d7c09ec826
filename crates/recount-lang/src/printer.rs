//! Canonical printer: renders an arena back to source text.
//!
//! The printer is deterministic and shape-preserving: printing a tree and
//! re-parsing the output yields a structurally identical tree. That
//! property is what the alignment loop leans on, and it also makes the
//! cleanup pipeline idempotent at the byte level.
//!
//! Four-space indentation, one statement per line, parentheses re-derived
//! from operator precedence.

use crate::ast::{Arena, NodeId, NodeKind, TypeRef};

/// Render the whole arena to source text.
pub fn print_program(arena: &Arena) -> String {
    let mut printer = Printer {
        arena,
        out: String::new(),
        indent: 0,
    };
    printer.program(arena.root());
    printer.out
}

/// Render a single expression node to text (used in edit-log messages).
pub fn print_expr(arena: &Arena, id: NodeId) -> String {
    let mut printer = Printer {
        arena,
        out: String::new(),
        indent: 0,
    };
    printer.expr(id, 0);
    printer.out
}

struct Printer<'a> {
    arena: &'a Arena,
    out: String,
    indent: usize,
}

impl<'a> Printer<'a> {
    fn pad(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    fn line(&mut self, text: &str) {
        self.pad();
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn program(&mut self, root: NodeId) {
        let NodeKind::Program { decls } = self.arena.kind(root) else {
            return;
        };
        for (i, &decl) in decls.iter().enumerate() {
            if i > 0 {
                self.out.push('\n');
            }
            self.decl(decl);
        }
    }

    fn annotations(&mut self, annotations: &[String]) {
        for annotation in annotations {
            self.line(&format!("@{}", annotation));
        }
    }

    fn decl(&mut self, id: NodeId) {
        match self.arena.kind(id) {
            NodeKind::ClassDecl {
                annotations,
                is_interface,
                name,
                interfaces,
                members,
            } => {
                self.annotations(annotations);
                let keyword = if *is_interface { "interface" } else { "class" };
                let mut header = format!("{} {}", keyword, name);
                if !interfaces.is_empty() {
                    header.push_str(" implements ");
                    header.push_str(&interfaces.join(", "));
                }
                header.push_str(" {");
                self.line(&header);
                self.indent += 1;
                for &member in members {
                    self.member(member);
                }
                self.indent -= 1;
                self.line("}");
            }
            _ => self.member(id),
        }
    }

    fn member(&mut self, id: NodeId) {
        match self.arena.kind(id) {
            NodeKind::FieldDecl {
                annotations,
                ty,
                name,
                init,
            } => {
                self.annotations(annotations);
                let mut text = format!("{} {}", render_type(ty), name);
                if let Some(init) = init {
                    text.push_str(" = ");
                    text.push_str(&self.expr_text(*init));
                }
                text.push(';');
                self.line(&text);
            }
            NodeKind::MethodDecl {
                annotations,
                ret,
                name,
                params,
                body,
            } => {
                self.annotations(annotations);
                let params_text: Vec<String> = params
                    .iter()
                    .map(|&p| self.param_text(p, true))
                    .collect();
                let header = format!("{} {}({})", render_type(ret), name, params_text.join(", "));
                match body {
                    Some(body) => {
                        self.line(&format!("{} {{", header));
                        self.indent += 1;
                        self.block_contents(*body);
                        self.indent -= 1;
                        self.line("}");
                    }
                    None => self.line(&format!("{};", header)),
                }
            }
            NodeKind::InitBlock { body } => {
                self.line("{");
                self.indent += 1;
                self.block_contents(*body);
                self.indent -= 1;
                self.line("}");
            }
            other => {
                debug_assert!(false, "not a member kind: {:?}", other);
            }
        }
    }

    fn param_text(&mut self, id: NodeId, with_type: bool) -> String {
        let NodeKind::Param {
            annotations,
            ty,
            name,
        } = self.arena.kind(id)
        else {
            return String::new();
        };
        let mut out = String::new();
        for annotation in annotations {
            out.push('@');
            out.push_str(annotation);
            out.push(' ');
        }
        if with_type {
            if let Some(ty) = ty {
                out.push_str(&render_type(ty));
                out.push(' ');
            }
        }
        out.push_str(name);
        out
    }

    fn block_contents(&mut self, block: NodeId) {
        let Some(stmts) = self.arena.block_stmts(block) else {
            return;
        };
        for &stmt in &stmts.to_vec() {
            self.stmt(stmt);
        }
    }

    /// Print a statement as the body of a control-flow construct.
    ///
    /// Blocks print inline as `... { body }`; single statements print on
    /// the following line, indented.
    fn body_after(&mut self, header: &str, body: NodeId, trailer: Option<&str>) {
        if matches!(self.arena.kind(body), NodeKind::Block { .. }) {
            self.line(&format!("{} {{", header));
            self.indent += 1;
            self.block_contents(body);
            self.indent -= 1;
            match trailer {
                Some(trailer) => self.line(&format!("}} {}", trailer)),
                None => self.line("}"),
            }
        } else {
            self.line(header);
            self.indent += 1;
            self.stmt(body);
            self.indent -= 1;
            if let Some(trailer) = trailer {
                self.line(trailer);
            }
        }
    }

    fn stmt(&mut self, id: NodeId) {
        match self.arena.kind(id) {
            NodeKind::Block { .. } => {
                self.line("{");
                self.indent += 1;
                self.block_contents(id);
                self.indent -= 1;
                self.line("}");
            }
            NodeKind::LocalDecl { .. } | NodeKind::ExprStmt { .. } => {
                let text = self.stmt_inline(id);
                self.line(&text);
            }
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let (cond, then_branch, else_branch) = (*cond, *then_branch, *else_branch);
                let header = format!("if ({})", self.expr_text(cond));
                match else_branch {
                    None => self.body_after(&header, then_branch, None),
                    Some(else_branch) => {
                        if matches!(self.arena.kind(then_branch), NodeKind::Block { .. }) {
                            self.line(&format!("{} {{", header));
                            self.indent += 1;
                            self.block_contents(then_branch);
                            self.indent -= 1;
                            self.pad();
                            self.out.push_str("} else");
                            self.else_tail(else_branch);
                        } else {
                            self.body_after(&header, then_branch, None);
                            self.pad();
                            self.out.push_str("else");
                            self.else_tail(else_branch);
                        }
                    }
                }
            }
            NodeKind::While { cond, body } => {
                let (cond, body) = (*cond, *body);
                let header = format!("while ({})", self.expr_text(cond));
                self.body_after(&header, body, None);
            }
            NodeKind::DoWhile { body, cond } => {
                let (body, cond) = (*body, *cond);
                let trailer = format!("while ({});", self.expr_text(cond));
                if matches!(self.arena.kind(body), NodeKind::Block { .. }) {
                    self.line("do {");
                    self.indent += 1;
                    self.block_contents(body);
                    self.indent -= 1;
                    self.line(&format!("}} {}", trailer));
                } else {
                    self.line("do");
                    self.indent += 1;
                    self.stmt(body);
                    self.indent -= 1;
                    self.line(&trailer);
                }
            }
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let (init, cond, body) = (*init, *cond, *body);
                let update = update.clone();
                let init_text = match init {
                    Some(init) => self.stmt_inline(init),
                    None => ";".to_string(),
                };
                let cond_text = match cond {
                    Some(cond) => format!(" {}", self.expr_text(cond)),
                    None => String::new(),
                };
                let update_texts: Vec<String> =
                    update.iter().map(|&u| self.expr_text(u)).collect();
                let update_text = if update_texts.is_empty() {
                    String::new()
                } else {
                    format!(" {}", update_texts.join(", "))
                };
                let header = format!("for ({}{};{})", init_text, cond_text, update_text);
                self.body_after(&header, body, None);
            }
            NodeKind::Try {
                body,
                catches,
                finally,
            } => {
                let (body, finally) = (*body, *finally);
                let catches = catches.clone();
                self.line("try {");
                self.indent += 1;
                self.block_contents(body);
                self.indent -= 1;
                for catch in catches {
                    let NodeKind::Catch { param, body } = self.arena.kind(catch) else {
                        continue;
                    };
                    let (param, body) = (*param, *body);
                    let param_text = self.param_text(param, true);
                    self.line(&format!("}} catch ({}) {{", param_text));
                    self.indent += 1;
                    self.block_contents(body);
                    self.indent -= 1;
                }
                if let Some(finally) = finally {
                    self.line("} finally {");
                    self.indent += 1;
                    self.block_contents(finally);
                    self.indent -= 1;
                }
                self.line("}");
            }
            NodeKind::Synchronized { lock, body } => {
                let (lock, body) = (*lock, *body);
                let header = format!("synchronized ({})", self.expr_text(lock));
                // The parser requires a block body here.
                self.body_after(&header, body, None);
            }
            NodeKind::Return { value } => {
                let value = *value;
                match value {
                    Some(value) => {
                        let text = self.expr_text(value);
                        self.line(&format!("return {};", text));
                    }
                    None => self.line("return;"),
                }
            }
            NodeKind::Throw { value } => {
                let value = *value;
                let text = self.expr_text(value);
                self.line(&format!("throw {};", text));
            }
            NodeKind::Empty => self.line(";"),
            other => {
                debug_assert!(false, "not a statement kind: {:?}", other);
            }
        }
    }

    fn else_tail(&mut self, else_branch: NodeId) {
        match self.arena.kind(else_branch) {
            NodeKind::Block { .. } => {
                self.out.push_str(" {\n");
                self.indent += 1;
                self.block_contents(else_branch);
                self.indent -= 1;
                self.line("}");
            }
            NodeKind::If { .. } => {
                // `else if` chains stay on one line.
                self.out.push(' ');
                let mark = self.out.len();
                self.stmt(else_branch);
                // stmt() begins with indentation; splice it out so the
                // chain reads `} else if (...) {`.
                let indent_len = self.indent * 4;
                self.out.drain(mark..mark + indent_len);
            }
            _ => {
                self.out.push('\n');
                self.indent += 1;
                self.stmt(else_branch);
                self.indent -= 1;
            }
        }
    }

    /// One-line rendering of a simple statement (no trailing newline).
    fn stmt_inline(&mut self, id: NodeId) -> String {
        match self.arena.kind(id) {
            NodeKind::LocalDecl { ty, name, init } => {
                let (ty, name, init) = (ty.clone(), name.clone(), *init);
                let mut text = format!("{} {}", render_type(&ty), name);
                if let Some(init) = init {
                    text.push_str(" = ");
                    text.push_str(&self.expr_text(init));
                }
                text.push(';');
                text
            }
            NodeKind::ExprStmt { expr } => {
                let expr = *expr;
                format!("{};", self.expr_text(expr))
            }
            NodeKind::Empty => ";".to_string(),
            _ => {
                debug_assert!(false, "statement cannot print inline");
                ";".to_string()
            }
        }
    }

    fn expr_text(&mut self, id: NodeId) -> String {
        let mut nested = Printer {
            arena: self.arena,
            out: String::new(),
            indent: self.indent,
        };
        nested.expr(id, 0);
        nested.out
    }

    /// Precedence of an expression node for parenthesization.
    fn prec(&self, id: NodeId) -> u8 {
        match self.arena.kind(id) {
            NodeKind::Assign { .. } | NodeKind::Lambda { .. } => 0,
            NodeKind::Binary { op, .. } => op.precedence(),
            NodeKind::Unary { .. } => 7,
            _ => 8,
        }
    }

    fn expr_child(&mut self, id: NodeId, min_prec: u8) -> String {
        let mut nested = Printer {
            arena: self.arena,
            out: String::new(),
            indent: self.indent,
        };
        nested.expr(id, min_prec);
        nested.out
    }

    fn expr(&mut self, id: NodeId, min_prec: u8) {
        let needs_parens = self.prec(id) < min_prec;
        if needs_parens {
            self.out.push('(');
        }
        match self.arena.kind(id) {
            NodeKind::Name { text } => self.out.push_str(text),
            NodeKind::LitInt(v) => self.out.push_str(&v.to_string()),
            NodeKind::LitStr(s) => {
                self.out.push('"');
                self.out.push_str(s);
                self.out.push('"');
            }
            NodeKind::LitBool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            NodeKind::LitNull => self.out.push_str("null"),
            NodeKind::FieldAccess { object, name } => {
                let (object, name) = (*object, name.clone());
                let text = self.expr_child(object, 8);
                self.out.push_str(&text);
                self.out.push('.');
                self.out.push_str(&name);
            }
            NodeKind::MethodCall { object, name, args } => {
                let (object, name, args) = (*object, name.clone(), args.clone());
                if let Some(object) = object {
                    let text = self.expr_child(object, 8);
                    self.out.push_str(&text);
                    self.out.push('.');
                }
                self.out.push_str(&name);
                self.out.push('(');
                for (i, &arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    let text = self.expr_child(arg, 0);
                    self.out.push_str(&text);
                }
                self.out.push(')');
            }
            NodeKind::Index { object, index } => {
                let (object, index) = (*object, *index);
                let object_text = self.expr_child(object, 8);
                let index_text = self.expr_child(index, 0);
                self.out.push_str(&object_text);
                self.out.push('[');
                self.out.push_str(&index_text);
                self.out.push(']');
            }
            NodeKind::New { class, args, body } => {
                let (class, args) = (class.clone(), args.clone());
                let body = body.clone();
                self.out.push_str("new ");
                self.out.push_str(&render_type(&class));
                self.out.push('(');
                for (i, &arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    let text = self.expr_child(arg, 0);
                    self.out.push_str(&text);
                }
                self.out.push(')');
                if let Some(members) = body {
                    self.out.push_str(" {\n");
                    self.indent += 1;
                    for member in members {
                        self.member(member);
                    }
                    self.indent -= 1;
                    self.pad();
                    self.out.push('}');
                }
            }
            NodeKind::Lambda { params, body } => {
                let (params, body) = (params.clone(), *body);
                if params.len() == 1 {
                    let text = self.param_text(params[0], false);
                    self.out.push_str(&text);
                } else {
                    self.out.push('(');
                    for (i, &param) in params.iter().enumerate() {
                        if i > 0 {
                            self.out.push_str(", ");
                        }
                        let text = self.param_text(param, false);
                        self.out.push_str(&text);
                    }
                    self.out.push(')');
                }
                self.out.push_str(" -> ");
                if matches!(self.arena.kind(body), NodeKind::Block { .. }) {
                    self.out.push_str("{\n");
                    self.indent += 1;
                    self.block_contents(body);
                    self.indent -= 1;
                    self.pad();
                    self.out.push('}');
                } else {
                    let text = self.expr_child(body, 0);
                    self.out.push_str(&text);
                }
            }
            NodeKind::Assign { target, value } => {
                let (target, value) = (*target, *value);
                let target_text = self.expr_child(target, 8);
                let value_text = self.expr_child(value, 0);
                self.out.push_str(&target_text);
                self.out.push_str(" = ");
                self.out.push_str(&value_text);
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let lhs_text = self.expr_child(lhs, op.precedence());
                let rhs_text = self.expr_child(rhs, op.precedence() + 1);
                self.out.push_str(&lhs_text);
                self.out.push(' ');
                self.out.push_str(op.symbol());
                self.out.push(' ');
                self.out.push_str(&rhs_text);
            }
            NodeKind::Unary { op, operand } => {
                let (op, operand) = (*op, *operand);
                self.out.push_str(op.symbol());
                let text = self.expr_child(operand, 7);
                self.out.push_str(&text);
            }
            other => {
                debug_assert!(false, "not an expression kind: {:?}", other);
            }
        }
        if needs_parens {
            self.out.push(')');
        }
    }
}

fn render_type(ty: &TypeRef) -> String {
    ty.render()
}

// ============================================================================
// Tests
// ============================================================================
