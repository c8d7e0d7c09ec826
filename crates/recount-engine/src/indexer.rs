//! Binding index builder: definitions and references over a subtree.
//!
//! Two entry points exist:
//! - [`index_global`]: indexes a whole compilation unit, used for
//!   cross-scope containment checks in closure analysis and for the
//!   consumption test.
//! - [`index_local`]: indexes a single closure-like subtree, optionally
//!   resolving through an ancestor index, used for capture analysis.
//!
//! Unresolved references are logged and skipped; nothing here is fatal.
//! Missing bindings simply produce no entry and downstream passes treat
//! the binding conservatively.

use recount_core::binding::{BindingId, BindingKind};
use recount_core::config::PassContext;
use recount_core::index::SymbolIndex;
use recount_core::span::{ContextLocation, Span};
use recount_lang::{Arena, NodeId, NodeKind};

/// Symbol index instantiated with arena node handles.
pub type NodeIndex = SymbolIndex<NodeId>;

// ============================================================================
// Entry Points
// ============================================================================

/// Build a global index over the whole compilation unit.
pub fn index_global(arena: &Arena, ctx: &mut PassContext) -> NodeIndex {
    let mut builder = Builder {
        arena,
        ctx,
        index: NodeIndex::new(),
        scopes: Vec::new(),
        ancestor: None,
    };
    builder.visit(arena.root());
    builder.index
}

/// Build a local index over one closure-like subtree.
///
/// References whose declaration is not in the subtree are resolved
/// through `ancestor` when provided; still-unresolved names are logged
/// and skipped.
pub fn index_local(
    arena: &Arena,
    scope_node: NodeId,
    ancestor: Option<&NodeIndex>,
    ctx: &mut PassContext,
) -> NodeIndex {
    let mut builder = Builder {
        arena,
        ctx,
        index: NodeIndex::new(),
        scopes: Vec::new(),
        ancestor,
    };
    builder.visit(scope_node);
    builder.index
}

/// Find, in an index, the binding a bare name resolves to at a location:
/// the defined binding with that leaf name whose innermost scope span
/// contains the location, preferring the deepest scope chain.
pub fn resolve_by_name(index: &NodeIndex, name: &str, at: &Span) -> Option<BindingId> {
    let mut best: Option<(usize, BindingId)> = None;
    for binding in index.defined_bindings() {
        if binding.leaf() != name {
            continue;
        }
        let Some(definition) = index.definition(binding) else {
            continue;
        };
        let depth = definition.context.len();
        let in_scope = match definition.innermost() {
            Some((_, scope_span)) => scope_span.contains(at),
            // Top-level declarations are visible everywhere in the file.
            None => true,
        };
        if !in_scope {
            continue;
        }
        match &best {
            Some((best_depth, _)) if *best_depth >= depth => {}
            _ => best = Some((depth, binding.clone())),
        }
    }
    best.map(|(_, binding)| binding)
}

// ============================================================================
// Builder
// ============================================================================

struct Builder<'a, 'c> {
    arena: &'a Arena,
    ctx: &'c mut PassContext,
    index: NodeIndex,
    /// Enclosing scopes, outermost first: (binding, span, declared names).
    scopes: Vec<ScopeFrame>,
    ancestor: Option<&'a NodeIndex>,
}

struct ScopeFrame {
    binding: BindingId,
    span: Span,
    names: Vec<(String, BindingId)>,
}

impl<'a, 'c> Builder<'a, 'c> {
    fn context_chain(&self) -> Vec<(BindingId, Span)> {
        self.scopes
            .iter()
            .map(|frame| (frame.binding.clone(), frame.span.clone()))
            .collect()
    }

    fn here(&self, id: NodeId) -> ContextLocation {
        ContextLocation::with_context(self.arena.span(id).clone(), self.context_chain())
    }

    fn parent_binding(&self) -> Option<&BindingId> {
        self.scopes.last().map(|frame| &frame.binding)
    }

    fn child_binding(&self, segment: &str, kind: BindingKind) -> BindingId {
        match self.parent_binding() {
            Some(parent) => parent.child(segment, kind),
            None => BindingId::new(segment, kind),
        }
    }

    fn declare(&mut self, name: &str, binding: BindingId, id: NodeId) {
        self.index
            .record_definition(binding.clone(), self.here(id), id);
        if let Some(frame) = self.scopes.last_mut() {
            frame.names.push((name.to_string(), binding));
        }
    }

    /// Resolve a bare name: innermost declaring scope first, then the
    /// ancestor index.
    fn resolve(&self, name: &str, at: &Span) -> Option<BindingId> {
        for frame in self.scopes.iter().rev() {
            if let Some((_, binding)) = frame.names.iter().rev().find(|(n, _)| n == name) {
                return Some(binding.clone());
            }
        }
        self.ancestor
            .and_then(|ancestor| resolve_by_name(ancestor, name, at))
    }

    fn record_name_use(&mut self, id: NodeId, name: &str) {
        let location = self.here(id);
        match self.resolve(name, &location.location) {
            Some(binding) => self.index.record_reference(binding, location),
            None => {
                self.ctx.sink.detail(
                    "binding-index",
                    Some(location.location),
                    format!("unresolved reference '{}'", name),
                );
            }
        }
    }

    fn push_scope(&mut self, binding: BindingId, id: NodeId) {
        self.scopes.push(ScopeFrame {
            binding,
            span: self.arena.span(id).clone(),
            names: Vec::new(),
        });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn synth_segment(&self, prefix: &str, id: NodeId) -> String {
        let span = self.arena.span(id);
        format!("<{}@{}_{}>", prefix, span.start.line, span.start.col)
    }

    fn visit(&mut self, id: NodeId) {
        match self.arena.kind(id) {
            NodeKind::Program { decls } => {
                for &decl in &decls.clone() {
                    self.visit(decl);
                }
            }
            NodeKind::ClassDecl { name, members, .. } => {
                let (name, members) = (name.clone(), members.clone());
                let binding = self.child_binding(&name, BindingKind::Type);
                self.declare(&name, binding.clone(), id);
                self.push_scope(binding, id);
                for member in members {
                    self.visit(member);
                }
                self.pop_scope();
            }
            NodeKind::MethodDecl {
                name, params, body, ..
            } => {
                let (name, params, body) = (name.clone(), params.clone(), *body);
                let param_types: Vec<String> = params
                    .iter()
                    .map(|&p| match self.arena.kind(p) {
                        NodeKind::Param { ty: Some(ty), .. } => ty.render(),
                        _ => String::new(),
                    })
                    .collect();
                let segment = format!("{}({})", name, param_types.join(","));
                let binding = self.child_binding(&segment, BindingKind::Method);
                self.declare(&name, binding.clone(), id);
                self.push_scope(binding, id);
                for param in params {
                    self.visit(param);
                }
                if let Some(body) = body {
                    self.visit(body);
                }
                self.pop_scope();
            }
            NodeKind::FieldDecl { name, init, .. } => {
                let (name, init) = (name.clone(), *init);
                let binding = self.child_binding(&name, BindingKind::Field);
                self.declare(&name, binding, id);
                if let Some(init) = init {
                    self.visit(init);
                }
            }
            NodeKind::Param { name, .. } => {
                let name = name.clone();
                let binding = self.child_binding(&name, BindingKind::Parameter);
                self.declare(&name, binding, id);
            }
            NodeKind::LocalDecl { name, init, .. } => {
                let (name, init) = (name.clone(), *init);
                // Initializer sees the outer binding, not the new one.
                if let Some(init) = init {
                    self.visit(init);
                }
                let binding = self.child_binding(&name, BindingKind::Variable);
                self.declare(&name, binding, id);
            }
            NodeKind::Lambda { params, body } => {
                let (params, body) = (params.clone(), *body);
                let segment = self.synth_segment("lambda", id);
                let binding = self.child_binding(&segment, BindingKind::Lambda);
                self.declare(&segment, binding.clone(), id);
                self.push_scope(binding, id);
                for param in params {
                    self.visit(param);
                }
                self.visit(body);
                self.pop_scope();
            }
            NodeKind::New { args, body, .. } => {
                let args = args.clone();
                let body = body.clone();
                for arg in args {
                    self.visit(arg);
                }
                if let Some(members) = body {
                    let segment = self.synth_segment("anon", id);
                    let binding = self.child_binding(&segment, BindingKind::AnonymousClass);
                    self.declare(&segment, binding.clone(), id);
                    self.push_scope(binding, id);
                    for member in members {
                        self.visit(member);
                    }
                    self.pop_scope();
                }
            }
            NodeKind::Name { text } => {
                let text = text.clone();
                self.record_name_use(id, &text);
            }
            NodeKind::MethodCall { object, name, args } => {
                let (object, name, args) = (*object, name.clone(), args.clone());
                if let Some(object) = object {
                    self.visit(object);
                }
                // Unqualified calls also reference the method binding.
                if object.is_none() {
                    let location = self.here(id);
                    if let Some(binding) = self.resolve(&name, &location.location) {
                        self.index.record_reference(binding, location);
                    }
                }
                for arg in args {
                    self.visit(arg);
                }
            }
            _ => {
                for child in self.arena.children(id) {
                    self.visit(child);
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
