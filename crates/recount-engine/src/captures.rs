//! Closure capture analysis and retention.
//!
//! A closure-like node (lambda or anonymous class) captures every
//! binding it references whose definition lies outside its own span.
//! Ownership-bearing captures must survive the closure's lifetime, so:
//!
//! - an anonymous class whose type satisfies the lifecycle contract
//!   manages its own captures: an instance initializer retains them and
//!   the `dispose()` teardown releases them. The generated teardown
//!   carries the `@CapturesRetained` marker; seeing the marker makes
//!   re-injection a no-op.
//! - a plain functional closure is wrapped at its use site in
//!   `new RetainedClosure(closure, cap1, ...)`, the runtime's
//!   ownership-forwarding proxy. An already-wrapped node is never
//!   wrapped twice.

use recount_core::binding::{BindingId, BindingKind};
use recount_core::config::PassContext;
use recount_lang::{Arena, NodeId, NodeKind, TypeRef};

use crate::indexer::{index_global, index_local, NodeIndex};
use crate::ownership::{
    is_ownership_bearing, satisfies_lifecycle_contract, OwnershipPolicy, CLOSURE_PROXY,
    MARKER_CAPTURES_RETAINED, RELEASE_METHOD, RETAIN_METHOD, TEARDOWN_METHOD,
};
use crate::resolver::BindingResolver;

const RULE: &str = "capture-retention";

// ============================================================================
// Capture Discovery
// ============================================================================

/// Ownership-bearing bindings captured by the closure-like node
/// `closure`, in deterministic (path) order.
pub fn captured_bindings(
    arena: &Arena,
    closure: NodeId,
    global: &NodeIndex,
    resolver: &dyn BindingResolver,
    policy: &OwnershipPolicy,
    ctx: &mut PassContext,
) -> Vec<BindingId> {
    let span = arena.span(closure).clone();
    let local = index_local(arena, closure, Some(global), ctx);
    let mut captures = Vec::new();
    for binding in local.referenced_bindings() {
        if !matches!(
            binding.kind,
            BindingKind::Variable | BindingKind::Parameter | BindingKind::Field
        ) {
            continue;
        }
        if local.is_defined(binding) {
            continue;
        }
        let Some(definition) = global.definition(binding) else {
            continue;
        };
        if span.contains(&definition.location) {
            continue;
        }
        let Some(ty) = declared_type(arena, global, binding) else {
            ctx.sink.detail(
                RULE,
                Some(definition.location.clone()),
                format!("capture '{}' has no declared type, left alone", binding),
            );
            continue;
        };
        if is_ownership_bearing(&ty, resolver, policy) {
            captures.push(binding.clone());
        }
    }
    captures
}

/// Declared type of a binding, read off its definition node.
fn declared_type(arena: &Arena, index: &NodeIndex, binding: &BindingId) -> Option<TypeRef> {
    let node = index.definition_node(binding)?;
    match arena.kind(node) {
        NodeKind::LocalDecl { ty, .. } | NodeKind::FieldDecl { ty, .. } => Some(ty.clone()),
        NodeKind::Param { ty, .. } => ty.clone(),
        _ => None,
    }
}

// ============================================================================
// Pass Entry Point
// ============================================================================

/// Retain captures for every closure-like node in the tree.
pub fn process_captures(
    arena: &mut Arena,
    resolver: &dyn BindingResolver,
    policy: &OwnershipPolicy,
    ctx: &mut PassContext,
) {
    let global = index_global(arena, ctx);
    // Inner closures first, so wrapping an outer closure never moves a
    // node another iteration still needs to find by parent.
    let closures: Vec<NodeId> = arena
        .walk(arena.root())
        .into_iter()
        .filter(|&id| arena.kind(id).is_closure_like())
        .rev()
        .collect();
    for closure in closures {
        let captures = captured_bindings(arena, closure, &global, resolver, policy, ctx);
        if captures.is_empty() {
            continue;
        }
        let names: Vec<String> = captures.iter().map(|b| b.leaf().to_string()).collect();
        if is_self_managed(arena, closure, resolver) {
            inject_self_managed(arena, closure, &names, ctx);
        } else {
            wrap_in_proxy(arena, closure, &names, ctx);
        }
    }
}

/// True for anonymous classes whose type participates in the lifecycle
/// contract and can therefore carry its own retain/teardown members.
fn is_self_managed(arena: &Arena, closure: NodeId, resolver: &dyn BindingResolver) -> bool {
    match arena.kind(closure) {
        NodeKind::New {
            class,
            body: Some(_),
            ..
        } => satisfies_lifecycle_contract(&class.name, resolver),
        _ => false,
    }
}

// ============================================================================
// Self-Managed Injection
// ============================================================================

fn inject_self_managed(arena: &mut Arena, closure: NodeId, names: &[String], ctx: &mut PassContext) {
    let span = arena.span(closure).clone();
    let NodeKind::New {
        body: Some(members),
        ..
    } = arena.kind(closure)
    else {
        return;
    };
    let members = members.clone();
    if teardown_already_injected(arena, &members) {
        return;
    }

    // Instance initializer retaining each capture.
    let retains: Vec<NodeId> = names
        .iter()
        .map(|name| protocol_call_stmt(arena, name, RETAIN_METHOD))
        .collect();
    let retain_block = arena.alloc_synth(NodeKind::Block { stmts: retains });
    let init = arena.alloc_synth(NodeKind::InitBlock { body: retain_block });

    // Extend an existing teardown, or create one.
    let releases: Vec<NodeId> = names
        .iter()
        .map(|name| protocol_call_stmt(arena, name, RELEASE_METHOD))
        .collect();
    let existing = members.iter().copied().find(|&m| {
        matches!(arena.kind(m), NodeKind::MethodDecl { name, .. } if name == TEARDOWN_METHOD)
    });
    let mut new_members = vec![init];
    match existing {
        Some(teardown) => {
            let body = match arena.kind_mut(teardown) {
                NodeKind::MethodDecl {
                    annotations, body, ..
                } => {
                    annotations.push(MARKER_CAPTURES_RETAINED.to_string());
                    *body
                }
                _ => None,
            };
            match body {
                Some(body) => {
                    for release in releases {
                        let end = arena.block_stmts(body).map(|s| s.len()).unwrap_or(0);
                        arena.insert_stmt(body, end, release);
                    }
                }
                None => {
                    ctx.sink.skip(
                        RULE,
                        Some(span.clone()),
                        "teardown method has no body, captures not released",
                    );
                }
            }
        }
        None => {
            let body = arena.alloc_synth(NodeKind::Block { stmts: releases });
            let teardown = arena.alloc_synth(NodeKind::MethodDecl {
                annotations: vec![MARKER_CAPTURES_RETAINED.to_string()],
                ret: TypeRef::named("void"),
                name: TEARDOWN_METHOD.to_string(),
                params: Vec::new(),
                body: Some(body),
            });
            new_members.push(teardown);
        }
    }

    if let NodeKind::New {
        body: Some(members),
        ..
    } = arena.kind_mut(closure)
    {
        // Initializer first, so retains run before any authored code.
        for (offset, member) in new_members.into_iter().enumerate() {
            members.insert(offset, member);
        }
    }
    ctx.sink.edit(
        RULE,
        span,
        format!("self-managed closure retains captures: {}", names.join(", ")),
    );
}

/// True when a `@CapturesRetained` teardown is already present.
fn teardown_already_injected(arena: &Arena, members: &[NodeId]) -> bool {
    members.iter().any(|&m| {
        matches!(
            arena.kind(m),
            NodeKind::MethodDecl { annotations, name, .. }
                if name == TEARDOWN_METHOD
                    && annotations.iter().any(|a| a == MARKER_CAPTURES_RETAINED)
        )
    })
}

// ============================================================================
// Proxy Wrapping
// ============================================================================

fn wrap_in_proxy(arena: &mut Arena, closure: NodeId, names: &[String], ctx: &mut PassContext) {
    let span = arena.span(closure).clone();
    let root = arena.root();
    let Some(parent) = arena.parent_of(root, closure) else {
        ctx.sink.skip(
            RULE,
            Some(span),
            "closure has no parent slot, captures not retained",
        );
        return;
    };
    // Idempotence: a closure already handed to the proxy stays as is.
    if matches!(arena.kind(parent), NodeKind::New { class, .. } if class.name == CLOSURE_PROXY) {
        return;
    }
    let mut args = vec![closure];
    for name in names {
        args.push(arena.alloc_synth(NodeKind::Name { text: name.clone() }));
    }
    let proxy = arena.alloc_synth(NodeKind::New {
        class: TypeRef::named(CLOSURE_PROXY),
        args,
        body: None,
    });
    if arena.replace_child(parent, closure, proxy) == 0 {
        ctx.sink.skip(
            RULE,
            Some(span),
            "closure slot not found in parent, captures not retained",
        );
        return;
    }
    ctx.sink.edit(
        RULE,
        span,
        format!(
            "wrapped closure in {} retaining: {}",
            CLOSURE_PROXY,
            names.join(", ")
        ),
    );
}

fn protocol_call_stmt(arena: &mut Arena, name: &str, method: &str) -> NodeId {
    let object = arena.alloc_synth(NodeKind::Name {
        text: name.to_string(),
    });
    let call = arena.alloc_synth(NodeKind::MethodCall {
        object: Some(object),
        name: method.to_string(),
        args: Vec::new(),
    });
    arena.alloc_synth(NodeKind::ExprStmt { expr: call })
}

// ============================================================================
// Tests
// ============================================================================
