//! Arena CST: integer node handles over a closed node-kind sum type.
//!
//! Nodes live in a flat `Vec` owned by the [`Arena`]; every cross-node
//! link is a [`NodeId`] index. Passes that need back-references (the
//! symbol index, the alignment loop) store plain `NodeId`s, so indices
//! can be discarded and rebuilt without touching the tree.
//!
//! Mutation happens through [`Arena::kind_mut`] plus a few structured
//! helpers for statement-list surgery. Edits never remove slots from the
//! arena; orphaned nodes are simply unreachable from the root and vanish
//! at the next print/re-parse cycle.

use recount_core::span::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// NodeId
// ============================================================================

/// Handle of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a node id.
    pub fn new(id: u32) -> Self {
        NodeId(id)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

// ============================================================================
// Types and Operators
// ============================================================================

/// A source-level type reference: name, type arguments, array dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    /// Type name.
    pub name: String,
    /// Generic type arguments, e.g. the `V` in `Optional<V>`.
    pub args: Vec<TypeRef>,
    /// Number of array dimensions (`V[]` has one).
    pub dims: u8,
}

impl TypeRef {
    /// A plain named type with no arguments or dimensions.
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef {
            name: name.into(),
            args: Vec::new(),
            dims: 0,
        }
    }

    /// The element type of an array type (one dimension stripped).
    pub fn element(&self) -> Option<TypeRef> {
        if self.dims == 0 {
            return None;
        }
        let mut inner = self.clone();
        inner.dims -= 1;
        Some(inner)
    }

    /// Render to canonical source form.
    pub fn render(&self) -> String {
        let mut out = self.name.clone();
        if !self.args.is_empty() {
            out.push('<');
            let args: Vec<String> = self.args.iter().map(TypeRef::render).collect();
            out.push_str(&args.join(", "));
            out.push('>');
        }
        for _ in 0..self.dims {
            out.push_str("[]");
        }
        out
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    /// Source text of the operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Or => "||",
            BinOp::And => "&&",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
        }
    }

    /// Precedence level; higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::NotEq => 3,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 6,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Not,
    Neg,
}

impl UnOp {
    /// Source text of the operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            UnOp::Not => "!",
            UnOp::Neg => "-",
        }
    }
}

// ============================================================================
// NodeKind
// ============================================================================

/// The closed set of node kinds. Passes match exhaustively on this enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A whole compilation unit.
    Program { decls: Vec<NodeId> },

    // ---- declarations ----
    /// Class or interface declaration.
    ClassDecl {
        annotations: Vec<String>,
        is_interface: bool,
        name: String,
        interfaces: Vec<String>,
        members: Vec<NodeId>,
    },
    /// Field declaration.
    FieldDecl {
        annotations: Vec<String>,
        ty: TypeRef,
        name: String,
        init: Option<NodeId>,
    },
    /// Method declaration; `body` is `None` for interface methods.
    MethodDecl {
        annotations: Vec<String>,
        ret: TypeRef,
        name: String,
        params: Vec<NodeId>,
        body: Option<NodeId>,
    },
    /// Method or lambda parameter; lambda parameters carry no type.
    Param {
        annotations: Vec<String>,
        ty: Option<TypeRef>,
        name: String,
    },
    /// Instance initializer block inside a class body.
    InitBlock { body: NodeId },

    // ---- statements ----
    Block {
        stmts: Vec<NodeId>,
    },
    LocalDecl {
        ty: TypeRef,
        name: String,
        init: Option<NodeId>,
    },
    ExprStmt {
        expr: NodeId,
    },
    If {
        cond: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    While {
        cond: NodeId,
        body: NodeId,
    },
    DoWhile {
        body: NodeId,
        cond: NodeId,
    },
    For {
        init: Option<NodeId>,
        cond: Option<NodeId>,
        update: Vec<NodeId>,
        body: NodeId,
    },
    Try {
        body: NodeId,
        catches: Vec<NodeId>,
        finally: Option<NodeId>,
    },
    Catch {
        param: NodeId,
        body: NodeId,
    },
    Synchronized {
        lock: NodeId,
        body: NodeId,
    },
    Return {
        value: Option<NodeId>,
    },
    Throw {
        value: NodeId,
    },
    /// Bare `;`.
    Empty,

    // ---- expressions ----
    Name {
        text: String,
    },
    FieldAccess {
        object: NodeId,
        name: String,
    },
    /// Call; `object` is `None` for unqualified calls.
    MethodCall {
        object: Option<NodeId>,
        name: String,
        args: Vec<NodeId>,
    },
    Index {
        object: NodeId,
        index: NodeId,
    },
    /// Constructor call; `body` holds anonymous-class members when present.
    New {
        class: TypeRef,
        args: Vec<NodeId>,
        body: Option<Vec<NodeId>>,
    },
    /// Lambda; body is a block or a single expression.
    Lambda {
        params: Vec<NodeId>,
        body: NodeId,
    },
    Assign {
        target: NodeId,
        value: NodeId,
    },
    Binary {
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Unary {
        op: UnOp,
        operand: NodeId,
    },
    LitInt(i64),
    LitStr(String),
    LitBool(bool),
    LitNull,
}

impl NodeKind {
    /// True for statement kinds (things that live in a block's list).
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            NodeKind::Block { .. }
                | NodeKind::LocalDecl { .. }
                | NodeKind::ExprStmt { .. }
                | NodeKind::If { .. }
                | NodeKind::While { .. }
                | NodeKind::DoWhile { .. }
                | NodeKind::For { .. }
                | NodeKind::Try { .. }
                | NodeKind::Synchronized { .. }
                | NodeKind::Return { .. }
                | NodeKind::Throw { .. }
                | NodeKind::Empty
        )
    }

    /// True for the closure-like kinds (lambda, anonymous-class `new`).
    pub fn is_closure_like(&self) -> bool {
        matches!(self, NodeKind::Lambda { .. })
            || matches!(self, NodeKind::New { body: Some(_), .. })
    }
}

/// One node: kind plus source span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Node kind with child handles.
    pub kind: NodeKind,
    /// Source span; synthesized nodes carry a placeholder until re-parse.
    pub span: Span,
}

// ============================================================================
// Arena
// ============================================================================

/// Flat node storage for one compilation unit.
#[derive(Debug, Clone)]
pub struct Arena {
    /// Workspace-relative file path of the unit.
    pub file: String,
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Arena {
    /// Create an empty arena for a file.
    pub fn new(file: impl Into<String>) -> Self {
        Arena {
            file: file.into(),
            nodes: Vec::new(),
            root: None,
        }
    }

    /// Allocate a node and return its handle.
    pub fn alloc(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(Node { kind, span });
        id
    }

    /// Allocate a synthesized node (placeholder span).
    pub fn alloc_synth(&mut self, kind: NodeKind) -> NodeId {
        let span = Span::synthetic(self.file.clone());
        self.alloc(kind, span)
    }

    /// Set the root node.
    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    /// The root node.
    ///
    /// # Panics
    /// Panics if the arena was never given a root; parsers always set one.
    pub fn root(&self) -> NodeId {
        match self.root {
            Some(root) => root,
            None => panic!("arena has no root"),
        }
    }

    /// Number of allocated slots (including orphaned nodes).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the arena holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Borrow a node's kind.
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    /// Mutably borrow a node's kind.
    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.index()].kind
    }

    /// A node's span.
    pub fn span(&self, id: NodeId) -> &Span {
        &self.nodes[id.index()].span
    }

    /// Overwrite a node's span.
    pub fn set_span(&mut self, id: NodeId, span: Span) {
        self.nodes[id.index()].span = span;
    }

    /// Direct children of a node, in source order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        match self.kind(id) {
            NodeKind::Program { decls } => out.extend(decls),
            NodeKind::ClassDecl { members, .. } => out.extend(members),
            NodeKind::FieldDecl { init, .. } => out.extend(init.iter()),
            NodeKind::MethodDecl { params, body, .. } => {
                out.extend(params);
                out.extend(body.iter());
            }
            NodeKind::Param { .. } => {}
            NodeKind::InitBlock { body } => out.push(*body),
            NodeKind::Block { stmts } => out.extend(stmts),
            NodeKind::LocalDecl { init, .. } => out.extend(init.iter()),
            NodeKind::ExprStmt { expr } => out.push(*expr),
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                out.push(*cond);
                out.push(*then_branch);
                out.extend(else_branch.iter());
            }
            NodeKind::While { cond, body } => {
                out.push(*cond);
                out.push(*body);
            }
            NodeKind::DoWhile { body, cond } => {
                out.push(*body);
                out.push(*cond);
            }
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => {
                out.extend(init.iter());
                out.extend(cond.iter());
                out.extend(update);
                out.push(*body);
            }
            NodeKind::Try {
                body,
                catches,
                finally,
            } => {
                out.push(*body);
                out.extend(catches);
                out.extend(finally.iter());
            }
            NodeKind::Catch { param, body } => {
                out.push(*param);
                out.push(*body);
            }
            NodeKind::Synchronized { lock, body } => {
                out.push(*lock);
                out.push(*body);
            }
            NodeKind::Return { value } => out.extend(value.iter()),
            NodeKind::Throw { value } => out.push(*value),
            NodeKind::Empty => {}
            NodeKind::Name { .. } => {}
            NodeKind::FieldAccess { object, .. } => out.push(*object),
            NodeKind::MethodCall { object, args, .. } => {
                out.extend(object.iter());
                out.extend(args);
            }
            NodeKind::Index { object, index } => {
                out.push(*object);
                out.push(*index);
            }
            NodeKind::New { args, body, .. } => {
                out.extend(args);
                if let Some(members) = body {
                    out.extend(members);
                }
            }
            NodeKind::Lambda { params, body } => {
                out.extend(params);
                out.push(*body);
            }
            NodeKind::Assign { target, value } => {
                out.push(*target);
                out.push(*value);
            }
            NodeKind::Binary { lhs, rhs, .. } => {
                out.push(*lhs);
                out.push(*rhs);
            }
            NodeKind::Unary { operand, .. } => out.push(*operand),
            NodeKind::LitInt(_) | NodeKind::LitStr(_) | NodeKind::LitBool(_) | NodeKind::LitNull => {
            }
        }
        out
    }

    /// Preorder walk of the subtree rooted at `id`.
    pub fn walk(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            let mut children = self.children(current);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// True if any node in the subtree is a bare `Name` equal to `name`.
    pub fn subtree_mentions_name(&self, id: NodeId, name: &str) -> bool {
        self.walk(id).into_iter().any(|n| match self.kind(n) {
            NodeKind::Name { text } => text == name,
            _ => false,
        })
    }

    /// Deep-copy a subtree from another arena into this one.
    ///
    /// Used by the alignment loop to graft an edited subtree onto a
    /// freshly parsed tree.
    pub fn import_from(&mut self, source: &Arena, id: NodeId) -> NodeId {
        let node = source.node(id);
        let kind = match &node.kind {
            NodeKind::Program { decls } => NodeKind::Program {
                decls: self.import_all(source, decls),
            },
            NodeKind::ClassDecl {
                annotations,
                is_interface,
                name,
                interfaces,
                members,
            } => NodeKind::ClassDecl {
                annotations: annotations.clone(),
                is_interface: *is_interface,
                name: name.clone(),
                interfaces: interfaces.clone(),
                members: self.import_all(source, members),
            },
            NodeKind::FieldDecl {
                annotations,
                ty,
                name,
                init,
            } => NodeKind::FieldDecl {
                annotations: annotations.clone(),
                ty: ty.clone(),
                name: name.clone(),
                init: init.map(|n| self.import_from(source, n)),
            },
            NodeKind::MethodDecl {
                annotations,
                ret,
                name,
                params,
                body,
            } => NodeKind::MethodDecl {
                annotations: annotations.clone(),
                ret: ret.clone(),
                name: name.clone(),
                params: self.import_all(source, params),
                body: body.map(|n| self.import_from(source, n)),
            },
            NodeKind::Param {
                annotations,
                ty,
                name,
            } => NodeKind::Param {
                annotations: annotations.clone(),
                ty: ty.clone(),
                name: name.clone(),
            },
            NodeKind::InitBlock { body } => NodeKind::InitBlock {
                body: self.import_from(source, *body),
            },
            NodeKind::Block { stmts } => NodeKind::Block {
                stmts: self.import_all(source, stmts),
            },
            NodeKind::LocalDecl { ty, name, init } => NodeKind::LocalDecl {
                ty: ty.clone(),
                name: name.clone(),
                init: init.map(|n| self.import_from(source, n)),
            },
            NodeKind::ExprStmt { expr } => NodeKind::ExprStmt {
                expr: self.import_from(source, *expr),
            },
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => NodeKind::If {
                cond: self.import_from(source, *cond),
                then_branch: self.import_from(source, *then_branch),
                else_branch: else_branch.map(|n| self.import_from(source, n)),
            },
            NodeKind::While { cond, body } => NodeKind::While {
                cond: self.import_from(source, *cond),
                body: self.import_from(source, *body),
            },
            NodeKind::DoWhile { body, cond } => NodeKind::DoWhile {
                body: self.import_from(source, *body),
                cond: self.import_from(source, *cond),
            },
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => NodeKind::For {
                init: init.map(|n| self.import_from(source, n)),
                cond: cond.map(|n| self.import_from(source, n)),
                update: self.import_all(source, update),
                body: self.import_from(source, *body),
            },
            NodeKind::Try {
                body,
                catches,
                finally,
            } => NodeKind::Try {
                body: self.import_from(source, *body),
                catches: self.import_all(source, catches),
                finally: finally.map(|n| self.import_from(source, n)),
            },
            NodeKind::Catch { param, body } => NodeKind::Catch {
                param: self.import_from(source, *param),
                body: self.import_from(source, *body),
            },
            NodeKind::Synchronized { lock, body } => NodeKind::Synchronized {
                lock: self.import_from(source, *lock),
                body: self.import_from(source, *body),
            },
            NodeKind::Return { value } => NodeKind::Return {
                value: value.map(|n| self.import_from(source, n)),
            },
            NodeKind::Throw { value } => NodeKind::Throw {
                value: self.import_from(source, *value),
            },
            NodeKind::Empty => NodeKind::Empty,
            NodeKind::Name { text } => NodeKind::Name { text: text.clone() },
            NodeKind::FieldAccess { object, name } => NodeKind::FieldAccess {
                object: self.import_from(source, *object),
                name: name.clone(),
            },
            NodeKind::MethodCall { object, name, args } => NodeKind::MethodCall {
                object: object.map(|n| self.import_from(source, n)),
                name: name.clone(),
                args: self.import_all(source, args),
            },
            NodeKind::Index { object, index } => NodeKind::Index {
                object: self.import_from(source, *object),
                index: self.import_from(source, *index),
            },
            NodeKind::New { class, args, body } => NodeKind::New {
                class: class.clone(),
                args: self.import_all(source, args),
                body: body.as_ref().map(|members| self.import_all(source, members)),
            },
            NodeKind::Lambda { params, body } => NodeKind::Lambda {
                params: self.import_all(source, params),
                body: self.import_from(source, *body),
            },
            NodeKind::Assign { target, value } => NodeKind::Assign {
                target: self.import_from(source, *target),
                value: self.import_from(source, *value),
            },
            NodeKind::Binary { op, lhs, rhs } => NodeKind::Binary {
                op: *op,
                lhs: self.import_from(source, *lhs),
                rhs: self.import_from(source, *rhs),
            },
            NodeKind::Unary { op, operand } => NodeKind::Unary {
                op: *op,
                operand: self.import_from(source, *operand),
            },
            NodeKind::LitInt(v) => NodeKind::LitInt(*v),
            NodeKind::LitStr(s) => NodeKind::LitStr(s.clone()),
            NodeKind::LitBool(b) => NodeKind::LitBool(*b),
            NodeKind::LitNull => NodeKind::LitNull,
        };
        self.alloc(kind, node.span.clone())
    }

    fn import_all(&mut self, source: &Arena, ids: &[NodeId]) -> Vec<NodeId> {
        ids.iter().map(|&n| self.import_from(source, n)).collect()
    }

    // ------------------------------------------------------------------
    // Statement-list surgery
    // ------------------------------------------------------------------

    /// The statement list of a block, if `id` is a block.
    pub fn block_stmts(&self, id: NodeId) -> Option<&[NodeId]> {
        match self.kind(id) {
            NodeKind::Block { stmts } => Some(stmts),
            _ => None,
        }
    }

    /// Insert a statement into a block at `index`.
    ///
    /// Returns false (leaving the tree unchanged) when `id` is not a
    /// block or the index is out of range.
    pub fn insert_stmt(&mut self, id: NodeId, index: usize, stmt: NodeId) -> bool {
        match self.kind_mut(id) {
            NodeKind::Block { stmts } if index <= stmts.len() => {
                stmts.insert(index, stmt);
                true
            }
            _ => false,
        }
    }

    /// Replace the statement at `index` of a block.
    pub fn replace_stmt(&mut self, id: NodeId, index: usize, stmt: NodeId) -> bool {
        match self.kind_mut(id) {
            NodeKind::Block { stmts } if index < stmts.len() => {
                stmts[index] = stmt;
                true
            }
            _ => false,
        }
    }

    /// Position of a statement within a block, if present.
    pub fn stmt_index(&self, block: NodeId, stmt: NodeId) -> Option<usize> {
        self.block_stmts(block)?.iter().position(|&s| s == stmt)
    }

    /// Replace every occurrence of `old` among the direct child slots of
    /// `parent` with `new`. Returns the number of slots patched.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> usize {
        fn swap(slot: &mut NodeId, old: NodeId, new: NodeId, patched: &mut usize) {
            if *slot == old {
                *slot = new;
                *patched += 1;
            }
        }
        fn swap_opt(slot: &mut Option<NodeId>, old: NodeId, new: NodeId, patched: &mut usize) {
            if *slot == Some(old) {
                *slot = Some(new);
                *patched += 1;
            }
        }
        fn swap_all(slots: &mut [NodeId], old: NodeId, new: NodeId, patched: &mut usize) {
            for slot in slots {
                swap(slot, old, new, patched);
            }
        }
        let mut patched = 0;
        let p = &mut patched;
        match self.kind_mut(parent) {
            NodeKind::Program { decls } => swap_all(decls, old, new, p),
            NodeKind::ClassDecl { members, .. } => swap_all(members, old, new, p),
            NodeKind::FieldDecl { init, .. } => swap_opt(init, old, new, p),
            NodeKind::MethodDecl { params, body, .. } => {
                swap_all(params, old, new, p);
                swap_opt(body, old, new, p);
            }
            NodeKind::Param { .. } => {}
            NodeKind::InitBlock { body } => swap(body, old, new, p),
            NodeKind::Block { stmts } => swap_all(stmts, old, new, p),
            NodeKind::LocalDecl { init, .. } => swap_opt(init, old, new, p),
            NodeKind::ExprStmt { expr } => swap(expr, old, new, p),
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                swap(cond, old, new, p);
                swap(then_branch, old, new, p);
                swap_opt(else_branch, old, new, p);
            }
            NodeKind::While { cond, body } => {
                swap(cond, old, new, p);
                swap(body, old, new, p);
            }
            NodeKind::DoWhile { body, cond } => {
                swap(body, old, new, p);
                swap(cond, old, new, p);
            }
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => {
                swap_opt(init, old, new, p);
                swap_opt(cond, old, new, p);
                swap_all(update, old, new, p);
                swap(body, old, new, p);
            }
            NodeKind::Try {
                body,
                catches,
                finally,
            } => {
                swap(body, old, new, p);
                swap_all(catches, old, new, p);
                swap_opt(finally, old, new, p);
            }
            NodeKind::Catch { param, body } => {
                swap(param, old, new, p);
                swap(body, old, new, p);
            }
            NodeKind::Synchronized { lock, body } => {
                swap(lock, old, new, p);
                swap(body, old, new, p);
            }
            NodeKind::Return { value } => swap_opt(value, old, new, p),
            NodeKind::Throw { value } => swap(value, old, new, p),
            NodeKind::Empty => {}
            NodeKind::Name { .. } => {}
            NodeKind::FieldAccess { object, .. } => swap(object, old, new, p),
            NodeKind::MethodCall { object, args, .. } => {
                swap_opt(object, old, new, p);
                swap_all(args, old, new, p);
            }
            NodeKind::Index { object, index } => {
                swap(object, old, new, p);
                swap(index, old, new, p);
            }
            NodeKind::New { args, body, .. } => {
                swap_all(args, old, new, p);
                if let Some(members) = body {
                    swap_all(members, old, new, p);
                }
            }
            NodeKind::Lambda { params, body } => {
                swap_all(params, old, new, p);
                swap(body, old, new, p);
            }
            NodeKind::Assign { target, value } => {
                swap(target, old, new, p);
                swap(value, old, new, p);
            }
            NodeKind::Binary { lhs, rhs, .. } => {
                swap(lhs, old, new, p);
                swap(rhs, old, new, p);
            }
            NodeKind::Unary { operand, .. } => swap(operand, old, new, p),
            NodeKind::LitInt(_) | NodeKind::LitStr(_) | NodeKind::LitBool(_) | NodeKind::LitNull => {
            }
        }
        patched
    }

    /// Parent of `id` within the subtree under `root`, if any.
    pub fn parent_of(&self, root: NodeId, id: NodeId) -> Option<NodeId> {
        self.walk(root)
            .into_iter()
            .find(|&candidate| self.children(candidate).contains(&id))
    }
}

// ============================================================================
// Tests
// ============================================================================
