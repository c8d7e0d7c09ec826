//! Ownership rewrite rules.
//!
//! Three rules, each applied tree-wide and logged per application:
//!
//! - **retain-on-pass**: an ownership-bearing argument handed to a
//!   consuming callee is wrapped as `arg.retain()`, unless it is freshly
//!   produced (the caller already holds the only reference).
//! - **field exchange**: assigning an ownership-bearing field releases
//!   the previous value behind a null guard, then retains the incoming
//!   value when it is a bare reference.
//! - **auto-release**: a discarded ownership-bearing result (bare call
//!   or constructor statement, or one embedded in an infix expression
//!   statement) is materialized into a temporary and released; a
//!   chained receiver is hoisted first.
//!
//! An edit whose target slot cannot be located is skipped with a
//! warning; nothing in this module is fatal.

use recount_core::config::PassContext;
use recount_lang::{Arena, NodeId, NodeKind, TypeRef};

use crate::ownership::{
    callee_consumes, is_fresh_value, is_ownership_bearing, OwnershipPolicy, CLOSURE_PROXY,
    RELEASE_METHOD, RETAIN_METHOD, TEARDOWN_METHOD,
};
use crate::resolver::BindingResolver;

/// Apply all rewrite rules to the tree.
pub fn apply_rewrites(
    arena: &mut Arena,
    resolver: &dyn BindingResolver,
    policy: &OwnershipPolicy,
    ctx: &mut PassContext,
) {
    retain_on_pass(arena, resolver, policy, ctx);
    field_exchange(arena, resolver, policy, ctx);
    auto_release(arena, resolver, policy, ctx);
}

fn is_protocol_method(name: &str) -> bool {
    name == RETAIN_METHOD || name == RELEASE_METHOD || name == TEARDOWN_METHOD
}

/// True if `expr` is already a `.retain()` wrapper.
fn is_retain_call(arena: &Arena, expr: NodeId) -> bool {
    matches!(
        arena.kind(expr),
        NodeKind::MethodCall {
            object: Some(_),
            name,
            args,
        } if name == RETAIN_METHOD && args.is_empty()
    )
}

fn retain_wrap(arena: &mut Arena, expr: NodeId) -> NodeId {
    arena.alloc_synth(NodeKind::MethodCall {
        object: Some(expr),
        name: RETAIN_METHOD.to_string(),
        args: Vec::new(),
    })
}

// ============================================================================
// Retain-on-Pass
// ============================================================================

fn retain_on_pass(
    arena: &mut Arena,
    resolver: &dyn BindingResolver,
    policy: &OwnershipPolicy,
    ctx: &mut PassContext,
) {
    let calls: Vec<NodeId> = arena
        .walk(arena.root())
        .into_iter()
        .filter(|&id| match arena.kind(id) {
            NodeKind::MethodCall { name, args, .. } => {
                !args.is_empty() && !is_protocol_method(name)
            }
            // The closure proxy retains its own arguments at
            // construction.
            NodeKind::New { class, args, .. } => {
                !args.is_empty() && class.name != CLOSURE_PROXY
            }
            _ => false,
        })
        .collect();
    for call in calls {
        if !callee_consumes(arena, call, resolver, policy, ctx) {
            continue;
        }
        let args = match arena.kind(call) {
            NodeKind::MethodCall { args, .. } | NodeKind::New { args, .. } => args.clone(),
            _ => continue,
        };
        for arg in args {
            if is_retain_call(arena, arg) || is_fresh_value(arena, arg, resolver) {
                continue;
            }
            let Some(ty) = resolver.expr_type(arena, arg) else {
                continue;
            };
            if !is_ownership_bearing(&ty, resolver, policy) {
                continue;
            }
            let span = arena.span(arg).clone();
            let wrapped = retain_wrap(arena, arg);
            if arena.replace_child(call, arg, wrapped) == 0 {
                ctx.sink.skip(
                    "retain-on-pass",
                    Some(span),
                    "argument slot not found, not retained",
                );
                continue;
            }
            ctx.sink.edit("retain-on-pass", span, "retained argument to consuming callee");
        }
    }
}

// ============================================================================
// Field Exchange
// ============================================================================

fn field_exchange(
    arena: &mut Arena,
    resolver: &dyn BindingResolver,
    policy: &OwnershipPolicy,
    ctx: &mut PassContext,
) {
    let blocks: Vec<NodeId> = arena
        .walk(arena.root())
        .into_iter()
        .filter(|&id| arena.block_stmts(id).is_some())
        .collect();
    for block in blocks {
        let stmts = arena.block_stmts(block).map(<[NodeId]>::to_vec).unwrap_or_default();
        for stmt in stmts {
            exchange_one(arena, block, stmt, resolver, policy, ctx);
        }
    }
}

fn exchange_one(
    arena: &mut Arena,
    block: NodeId,
    stmt: NodeId,
    resolver: &dyn BindingResolver,
    policy: &OwnershipPolicy,
    ctx: &mut PassContext,
) {
    let NodeKind::ExprStmt { expr } = arena.kind(stmt) else {
        return;
    };
    let NodeKind::Assign { target, value } = arena.kind(*expr) else {
        return;
    };
    let (target, value) = (*target, *value);
    let NodeKind::FieldAccess { name: field, .. } = arena.kind(target) else {
        return;
    };
    let field = field.clone();
    let Some(field_ty) = resolver.expr_type(arena, target) else {
        return;
    };
    if !is_ownership_bearing(&field_ty, resolver, policy) {
        return;
    }
    let Some(index) = arena.stmt_index(block, stmt) else {
        ctx.sink.skip(
            "field-exchange",
            Some(arena.span(stmt).clone()),
            "assignment no longer in its block, skipped",
        );
        return;
    };
    // A guard released this field already; the statement was processed.
    if index > 0 {
        let prev = arena.block_stmts(block).map(|s| s[index - 1]);
        if prev.is_some_and(|prev| is_field_guard(arena, prev, &field)) {
            return;
        }
    }
    let span = arena.span(stmt).clone();

    // if (obj.f != null) { obj.f.release(); }
    let snapshot = arena.clone();
    let guard_access = arena.import_from(&snapshot, target);
    let release_access = arena.import_from(&snapshot, target);
    let null = arena.alloc_synth(NodeKind::LitNull);
    let cond = arena.alloc_synth(NodeKind::Binary {
        op: recount_lang::BinOp::NotEq,
        lhs: guard_access,
        rhs: null,
    });
    let release = arena.alloc_synth(NodeKind::MethodCall {
        object: Some(release_access),
        name: RELEASE_METHOD.to_string(),
        args: Vec::new(),
    });
    let release_stmt = arena.alloc_synth(NodeKind::ExprStmt { expr: release });
    let then_block = arena.alloc_synth(NodeKind::Block {
        stmts: vec![release_stmt],
    });
    let guard = arena.alloc_synth(NodeKind::If {
        cond,
        then_branch: then_block,
        else_branch: None,
    });
    arena.insert_stmt(block, index, guard);

    // Retain the incoming value when it is a bare reference.
    if matches!(arena.kind(value), NodeKind::Name { .. })
        && !is_fresh_value(arena, value, resolver)
    {
        let expr = match arena.kind(stmt) {
            NodeKind::ExprStmt { expr } => *expr,
            _ => return,
        };
        let wrapped = retain_wrap(arena, value);
        arena.replace_child(expr, value, wrapped);
    }
    ctx.sink.edit(
        "field-exchange",
        span,
        format!("released prior value of '{}' behind null guard", field),
    );
}

/// True if `stmt` is a null-guarded release of the named field.
fn is_field_guard(arena: &Arena, stmt: NodeId, field: &str) -> bool {
    let NodeKind::If {
        cond,
        else_branch: None,
        ..
    } = arena.kind(stmt)
    else {
        return false;
    };
    let NodeKind::Binary {
        op: recount_lang::BinOp::NotEq,
        lhs,
        rhs,
    } = arena.kind(*cond)
    else {
        return false;
    };
    if !matches!(arena.kind(*rhs), NodeKind::LitNull) {
        return false;
    }
    matches!(arena.kind(*lhs), NodeKind::FieldAccess { name, .. } if name == field)
}

// ============================================================================
// Auto-Release
// ============================================================================

fn auto_release(
    arena: &mut Arena,
    resolver: &dyn BindingResolver,
    policy: &OwnershipPolicy,
    ctx: &mut PassContext,
) {
    let blocks: Vec<NodeId> = arena
        .walk(arena.root())
        .into_iter()
        .filter(|&id| arena.block_stmts(id).is_some())
        .collect();
    for block in blocks {
        let stmts = arena.block_stmts(block).map(<[NodeId]>::to_vec).unwrap_or_default();
        for stmt in stmts {
            release_one(arena, block, stmt, resolver, policy, ctx);
        }
    }
}

fn release_one(
    arena: &mut Arena,
    block: NodeId,
    stmt: NodeId,
    resolver: &dyn BindingResolver,
    policy: &OwnershipPolicy,
    ctx: &mut PassContext,
) {
    let NodeKind::ExprStmt { expr } = arena.kind(stmt) else {
        return;
    };
    let expr = *expr;
    match arena.kind(expr) {
        NodeKind::MethodCall { name, .. } if is_protocol_method(name) => {}
        NodeKind::MethodCall { object, .. } => {
            let object = *object;
            if result_type(arena, expr, resolver)
                .is_some_and(|ty| is_ownership_bearing(&ty, resolver, policy))
            {
                materialize_and_release(arena, block, stmt, expr, resolver, ctx);
                return;
            }
            // Chained receiver: hoist an owned intermediate so it can
            // be released after the statement.
            let Some(object) = object else {
                return;
            };
            let Some(object_ty) = result_type(arena, object, resolver) else {
                return;
            };
            if matches!(
                arena.kind(object),
                NodeKind::MethodCall { .. } | NodeKind::New { .. }
            ) && is_ownership_bearing(&object_ty, resolver, policy)
            {
                hoist_operand(arena, block, stmt, expr, object, object_ty, ctx);
            }
        }
        NodeKind::New { class, body, .. } => {
            let ty = class.clone();
            if body.is_none() && is_ownership_bearing(&ty, resolver, policy) {
                materialize_and_release(arena, block, stmt, expr, resolver, ctx);
            }
        }
        NodeKind::Binary { .. } | NodeKind::Unary { .. } => {
            let mut found = Vec::new();
            embedded_owned_results(arena, expr, resolver, policy, &mut found);
            for (parent, operand) in found {
                let Some(ty) = result_type(arena, operand, resolver) else {
                    continue;
                };
                hoist_operand(arena, block, stmt, parent, operand, ty, ctx);
            }
        }
        _ => {}
    }
}

/// Collect owned call/constructor results embedded in an infix
/// expression, paired with the node holding each operand.
fn embedded_owned_results(
    arena: &Arena,
    expr: NodeId,
    resolver: &dyn BindingResolver,
    policy: &OwnershipPolicy,
    out: &mut Vec<(NodeId, NodeId)>,
) {
    let operands: Vec<NodeId> = match arena.kind(expr) {
        NodeKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
        NodeKind::Unary { operand, .. } => vec![*operand],
        _ => return,
    };
    for operand in operands {
        match arena.kind(operand) {
            NodeKind::Binary { .. } | NodeKind::Unary { .. } => {
                embedded_owned_results(arena, operand, resolver, policy, out);
            }
            NodeKind::MethodCall { name, .. } if is_protocol_method(name) => {}
            NodeKind::MethodCall { .. } | NodeKind::New { body: None, .. } => {
                if result_type(arena, operand, resolver)
                    .is_some_and(|ty| is_ownership_bearing(&ty, resolver, policy))
                {
                    out.push((expr, operand));
                }
            }
            _ => {}
        }
    }
}

fn result_type(arena: &Arena, expr: NodeId, resolver: &dyn BindingResolver) -> Option<TypeRef> {
    match arena.kind(expr) {
        NodeKind::MethodCall { .. } | NodeKind::New { .. } => {
            resolver.call_return_type(arena, expr)
        }
        _ => resolver.expr_type(arena, expr),
    }
}

/// `call();` becomes `T tmp = call(); tmp.release();`.
fn materialize_and_release(
    arena: &mut Arena,
    block: NodeId,
    stmt: NodeId,
    call: NodeId,
    resolver: &dyn BindingResolver,
    ctx: &mut PassContext,
) {
    let Some(index) = arena.stmt_index(block, stmt) else {
        ctx.sink.skip(
            "auto-release",
            Some(arena.span(stmt).clone()),
            "statement no longer in its block, result not released",
        );
        return;
    };
    let span = arena.span(stmt).clone();
    let ty = result_type(arena, call, resolver).unwrap_or_else(|| TypeRef::named("Object"));
    let temp = ctx.names.fresh();
    let decl = arena.alloc_synth(NodeKind::LocalDecl {
        ty,
        name: temp.clone(),
        init: Some(call),
    });
    let temp_ref = arena.alloc_synth(NodeKind::Name { text: temp.clone() });
    let release = arena.alloc_synth(NodeKind::MethodCall {
        object: Some(temp_ref),
        name: RELEASE_METHOD.to_string(),
        args: Vec::new(),
    });
    let release_stmt = arena.alloc_synth(NodeKind::ExprStmt { expr: release });
    arena.replace_stmt(block, index, decl);
    arena.insert_stmt(block, index + 1, release_stmt);
    ctx.sink.edit(
        "auto-release",
        span,
        format!("released unconsumed result via '{}'", temp),
    );
}

/// Hoist an owned subexpression out of `stmt` so it can be released:
/// `make().run();` becomes `T tmp = make(); tmp.run(); tmp.release();`,
/// and likewise for an owned result embedded in an infix expression.
fn hoist_operand(
    arena: &mut Arena,
    block: NodeId,
    stmt: NodeId,
    parent: NodeId,
    operand: NodeId,
    operand_ty: TypeRef,
    ctx: &mut PassContext,
) {
    let Some(index) = arena.stmt_index(block, stmt) else {
        ctx.sink.skip(
            "auto-release",
            Some(arena.span(stmt).clone()),
            "statement no longer in its block, result not released",
        );
        return;
    };
    let span = arena.span(stmt).clone();
    let temp = ctx.names.fresh();
    let decl = arena.alloc_synth(NodeKind::LocalDecl {
        ty: operand_ty,
        name: temp.clone(),
        init: Some(operand),
    });
    let temp_ref = arena.alloc_synth(NodeKind::Name { text: temp.clone() });
    arena.replace_child(parent, operand, temp_ref);
    let release_ref = arena.alloc_synth(NodeKind::Name { text: temp.clone() });
    let release = arena.alloc_synth(NodeKind::MethodCall {
        object: Some(release_ref),
        name: RELEASE_METHOD.to_string(),
        args: Vec::new(),
    });
    let release_stmt = arena.alloc_synth(NodeKind::ExprStmt { expr: release });
    arena.insert_stmt(block, index, decl);
    arena.insert_stmt(block, index + 2, release_stmt);
    ctx.sink.edit(
        "auto-release",
        span,
        format!("hoisted owned subexpression into '{}'", temp),
    );
}

// ============================================================================
// Tests
// ============================================================================
