//! Cleanup passes: strip inserted instrumentation and re-inline the
//! temporaries it introduced.
//!
//! Running cleanup before instrumentation makes the whole pipeline
//! idempotent: instrumenting an already-instrumented file first reduces
//! it to its plain form, so the second run reproduces the first run's
//! output byte for byte.
//!
//! The inline pass runs to a fixpoint. Every productive iteration
//! removes a statement or a nesting level, so the loop terminates.

use recount_core::config::{PassContext, TempNames};
use recount_lang::{Arena, BinOp, NodeId, NodeKind};

use crate::ownership::{
    CLOSURE_PROXY, MARKER_CAPTURES_RETAINED, RELEASE_METHOD, RETAIN_METHOD, TEARDOWN_METHOD,
};

const RULE: &str = "cleanup";

/// Run strip + inline to a fixpoint.
pub fn run_cleanup(arena: &mut Arena, ctx: &mut PassContext) {
    loop {
        let stripped = strip_instrumentation(arena, ctx);
        let inlined = inline_temporaries(arena, ctx);
        if !stripped && !inlined {
            break;
        }
    }
}

// ============================================================================
// Strip Pass
// ============================================================================

/// Remove inserted retain/release instrumentation. Returns true if the
/// tree changed.
pub fn strip_instrumentation(arena: &mut Arena, ctx: &mut PassContext) -> bool {
    let mut changed = false;
    changed |= unwrap_retain_wrappers(arena);
    changed |= unwrap_proxy_wrappers(arena);
    changed |= remove_protocol_statements(arena);
    changed |= remove_field_guards(arena);
    changed |= remove_capture_members(arena);
    if changed {
        ctx.sink
            .detail(RULE, None, "stripped retain/release instrumentation");
    }
    changed
}

/// `expr.retain()` becomes `expr` wherever it appears.
fn unwrap_retain_wrappers(arena: &mut Arena) -> bool {
    let mut changed = false;
    loop {
        let root = arena.root();
        let found = arena.walk(root).into_iter().find_map(|id| {
            let wrapped = arena.children(id).into_iter().find(|&child| {
                matches!(
                    arena.kind(child),
                    NodeKind::MethodCall { object: Some(_), name, args }
                        if name == RETAIN_METHOD && args.is_empty()
                )
            })?;
            // Statement-level retains are handled as statements.
            if matches!(arena.kind(id), NodeKind::ExprStmt { .. }) {
                return None;
            }
            let NodeKind::MethodCall {
                object: Some(object),
                ..
            } = arena.kind(wrapped)
            else {
                return None;
            };
            Some((id, wrapped, *object))
        });
        match found {
            Some((parent, wrapped, object)) => {
                arena.replace_child(parent, wrapped, object);
                changed = true;
            }
            None => return changed,
        }
    }
}

/// `new RetainedClosure(closure, ...)` becomes `closure`.
fn unwrap_proxy_wrappers(arena: &mut Arena) -> bool {
    let mut changed = false;
    loop {
        let root = arena.root();
        let found = arena.walk(root).into_iter().find_map(|id| {
            let wrapped = arena.children(id).into_iter().find(|&child| {
                matches!(
                    arena.kind(child),
                    NodeKind::New { class, args, body: None }
                        if class.name == CLOSURE_PROXY && !args.is_empty()
                )
            })?;
            let NodeKind::New { args, .. } = arena.kind(wrapped) else {
                return None;
            };
            Some((id, wrapped, args[0]))
        });
        match found {
            Some((parent, wrapped, closure)) => {
                arena.replace_child(parent, wrapped, closure);
                changed = true;
            }
            None => return changed,
        }
    }
}

/// Remove `x.retain();` and `x.release();` statements (bare-name
/// receivers only; field receivers live inside guards).
fn remove_protocol_statements(arena: &mut Arena) -> bool {
    let mut changed = false;
    let blocks: Vec<NodeId> = arena
        .walk(arena.root())
        .into_iter()
        .filter(|&id| arena.block_stmts(id).is_some())
        .collect();
    for block in blocks {
        let keep: Vec<NodeId> = arena
            .block_stmts(block)
            .map(<[NodeId]>::to_vec)
            .unwrap_or_default()
            .into_iter()
            .filter(|&stmt| !is_protocol_statement(arena, stmt))
            .collect();
        if let NodeKind::Block { stmts } = arena.kind_mut(block) {
            if stmts.len() != keep.len() {
                *stmts = keep;
                changed = true;
            }
        }
    }
    changed
}

fn is_protocol_statement(arena: &Arena, stmt: NodeId) -> bool {
    let NodeKind::ExprStmt { expr } = arena.kind(stmt) else {
        return false;
    };
    let NodeKind::MethodCall {
        object: Some(object),
        name,
        args,
    } = arena.kind(*expr)
    else {
        return false;
    };
    (name == RELEASE_METHOD || name == RETAIN_METHOD)
        && args.is_empty()
        && matches!(arena.kind(*object), NodeKind::Name { .. })
}

/// Remove `if (obj.f != null) { obj.f.release(); }` guards.
fn remove_field_guards(arena: &mut Arena) -> bool {
    let mut changed = false;
    let blocks: Vec<NodeId> = arena
        .walk(arena.root())
        .into_iter()
        .filter(|&id| arena.block_stmts(id).is_some())
        .collect();
    for block in blocks {
        let keep: Vec<NodeId> = arena
            .block_stmts(block)
            .map(<[NodeId]>::to_vec)
            .unwrap_or_default()
            .into_iter()
            .filter(|&stmt| !is_release_guard(arena, stmt))
            .collect();
        if let NodeKind::Block { stmts } = arena.kind_mut(block) {
            if stmts.len() != keep.len() {
                *stmts = keep;
                changed = true;
            }
        }
    }
    changed
}

fn is_release_guard(arena: &Arena, stmt: NodeId) -> bool {
    let NodeKind::If {
        cond,
        then_branch,
        else_branch: None,
    } = arena.kind(stmt)
    else {
        return false;
    };
    let NodeKind::Binary {
        op: BinOp::NotEq,
        lhs,
        rhs,
    } = arena.kind(*cond)
    else {
        return false;
    };
    if !matches!(arena.kind(*lhs), NodeKind::FieldAccess { .. }) {
        return false;
    }
    if !matches!(arena.kind(*rhs), NodeKind::LitNull) {
        return false;
    }
    let Some(stmts) = arena.block_stmts(*then_branch) else {
        return false;
    };
    stmts.len() == 1 && is_field_release(arena, stmts[0])
}

fn is_field_release(arena: &Arena, stmt: NodeId) -> bool {
    let NodeKind::ExprStmt { expr } = arena.kind(stmt) else {
        return false;
    };
    matches!(
        arena.kind(*expr),
        NodeKind::MethodCall { object: Some(object), name, args }
            if name == RELEASE_METHOD
                && args.is_empty()
                && matches!(arena.kind(*object), NodeKind::FieldAccess { .. })
    )
}

/// Remove generated capture members: empty instance initializers and
/// `@CapturesRetained` teardowns whose bodies are empty after the
/// release statements were stripped. An extended authored teardown
/// keeps its remaining statements, minus the marker.
fn remove_capture_members(arena: &mut Arena) -> bool {
    let mut changed = false;
    let hosts: Vec<NodeId> = arena
        .walk(arena.root())
        .into_iter()
        .filter(|&id| matches!(arena.kind(id), NodeKind::New { body: Some(_), .. }))
        .collect();
    for host in hosts {
        let members = match arena.kind(host) {
            NodeKind::New {
                body: Some(members),
                ..
            } => members.clone(),
            _ => continue,
        };
        let mut keep = Vec::with_capacity(members.len());
        for member in members {
            match arena.kind(member) {
                NodeKind::InitBlock { body } => {
                    let empty = arena.block_stmts(*body).is_some_and(<[NodeId]>::is_empty);
                    if empty {
                        changed = true;
                        continue;
                    }
                }
                NodeKind::MethodDecl {
                    annotations,
                    name,
                    body,
                    ..
                } if name == TEARDOWN_METHOD
                    && annotations.iter().any(|a| a == MARKER_CAPTURES_RETAINED) =>
                {
                    let body = *body;
                    let empty = body
                        .and_then(|b| arena.block_stmts(b))
                        .is_some_and(<[NodeId]>::is_empty);
                    if empty {
                        changed = true;
                        continue;
                    }
                    if let NodeKind::MethodDecl { annotations, .. } = arena.kind_mut(member) {
                        annotations.retain(|a| a != MARKER_CAPTURES_RETAINED);
                        changed = true;
                    }
                }
                _ => {}
            }
            keep.push(member);
        }
        if let NodeKind::New {
            body: Some(members),
            ..
        } = arena.kind_mut(host)
        {
            *members = keep;
        }
    }
    changed
}

// ============================================================================
// Inline Pass
// ============================================================================

/// Collapse generated temporaries and splice bare blocks. Returns true
/// if the tree changed.
pub fn inline_temporaries(arena: &mut Arena, ctx: &mut PassContext) -> bool {
    let mut changed = false;
    while splice_bare_blocks(arena) {
        changed = true;
    }
    while inline_one_temp(arena) {
        changed = true;
    }
    if changed {
        ctx.sink.detail(RULE, None, "inlined generated temporaries");
    }
    changed
}

/// Splice a bare block's statements into its parent's list.
fn splice_bare_blocks(arena: &mut Arena) -> bool {
    let blocks: Vec<NodeId> = arena
        .walk(arena.root())
        .into_iter()
        .filter(|&id| arena.block_stmts(id).is_some())
        .collect();
    for block in blocks {
        let stmts = arena
            .block_stmts(block)
            .map(<[NodeId]>::to_vec)
            .unwrap_or_default();
        // Control-construct bodies are node fields, never list members,
        // so any block found in a statement list is a bare block.
        let Some(inner_at) = stmts
            .iter()
            .position(|&s| matches!(arena.kind(s), NodeKind::Block { .. }))
        else {
            continue;
        };
        let inner = stmts[inner_at];
        let inner_stmts = arena
            .block_stmts(inner)
            .map(<[NodeId]>::to_vec)
            .unwrap_or_default();
        // A bare block scopes locals; splicing a block that declares a
        // name already visible afterwards would change meaning. Inserted
        // blocks never declare, so the check stays simple.
        let mut merged = stmts[..inner_at].to_vec();
        merged.extend(inner_stmts);
        merged.extend(&stmts[inner_at + 1..]);
        if let NodeKind::Block { stmts } = arena.kind_mut(block) {
            *stmts = merged;
        }
        return true;
    }
    false
}

/// Inline one generated temporary and return true, or false when none
/// qualifies. A temporary qualifies when its only use is in the
/// immediately following statement (no interference possible), or when
/// it is unused and its initializer can stand alone.
fn inline_one_temp(arena: &mut Arena) -> bool {
    let blocks: Vec<NodeId> = arena
        .walk(arena.root())
        .into_iter()
        .filter(|&id| arena.block_stmts(id).is_some())
        .collect();
    for block in blocks {
        let stmts = arena
            .block_stmts(block)
            .map(<[NodeId]>::to_vec)
            .unwrap_or_default();
        for (index, &stmt) in stmts.iter().enumerate() {
            let NodeKind::LocalDecl {
                name,
                init: Some(init),
                ..
            } = arena.kind(stmt)
            else {
                continue;
            };
            if !TempNames::is_temp(name) {
                continue;
            }
            let (name, init) = (name.clone(), *init);
            let uses: usize = stmts[index + 1..]
                .iter()
                .map(|&s| count_mentions(arena, s, &name))
                .sum();
            match uses {
                0 => {
                    // Keep the initializer's effects, drop the binding.
                    if matches!(
                        arena.kind(init),
                        NodeKind::MethodCall { .. } | NodeKind::New { .. }
                    ) {
                        let effect = arena.alloc_synth(NodeKind::ExprStmt { expr: init });
                        arena.replace_stmt(block, index, effect);
                    } else if let NodeKind::Block { stmts } = arena.kind_mut(block) {
                        stmts.remove(index);
                    }
                    return true;
                }
                1 if count_mentions(arena, stmts[index + 1], &name) == 1 => {
                    let user = stmts[index + 1];
                    let Some(site) = find_name_node(arena, user, &name) else {
                        continue;
                    };
                    let Some(parent) = arena.parent_of(user, site) else {
                        continue;
                    };
                    arena.replace_child(parent, site, init);
                    if let NodeKind::Block { stmts } = arena.kind_mut(block) {
                        stmts.remove(index);
                    }
                    return true;
                }
                _ => {}
            }
        }
    }
    false
}

fn count_mentions(arena: &Arena, subtree: NodeId, name: &str) -> usize {
    arena
        .walk(subtree)
        .into_iter()
        .filter(|&id| matches!(arena.kind(id), NodeKind::Name { text } if text == name))
        .count()
}

fn find_name_node(arena: &Arena, subtree: NodeId, name: &str) -> Option<NodeId> {
    arena
        .walk(subtree)
        .into_iter()
        .find(|&id| matches!(arena.kind(id), NodeKind::Name { text } if text == name))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use recount_core::config::Options;
    use recount_lang::{parse, print_program};

    fn run(source: &str) -> String {
        let mut arena = parse("t.src", source).unwrap();
        let mut ctx = PassContext::new(Options::cleanup_only());
        run_cleanup(&mut arena, &mut ctx);
        print_program(&arena)
    }

    mod strip {
        use super::*;

        #[test]
        fn release_statements_are_removed() {
            let text = run("class A { void f(V v) { use(v); v.release(); } }");
            assert!(!text.contains("v.release()"));
            assert!(text.contains("use(v);"));
        }

        #[test]
        fn retain_wrappers_are_unwrapped() {
            let text = run("class A { void f(V v) { put(v.retain()); } }");
            assert!(text.contains("put(v);"));
        }

        #[test]
        fn proxy_wrappers_are_unwrapped() {
            let text = run(
                "class A { void f(V v) { each(new RetainedClosure(x -> use(v, x), v)); } }",
            );
            assert!(text.contains("each(x -> use(v, x));"));
            assert!(!text.contains("RetainedClosure"));
        }

        #[test]
        fn field_guards_are_removed() {
            let text = run(
                "class A { void set(B b, V v) { if (b.f != null) { b.f.release(); } b.f = v.retain(); } }",
            );
            assert!(!text.contains("null"));
            assert!(text.contains("b.f = v;"));
        }

        #[test]
        fn generated_capture_members_are_removed() {
            let text = run(
                "class A { void f(V v) { reg(new V() { { v.retain(); } @CapturesRetained void dispose() { v.release(); } void on() { use(v); } }); } }",
            );
            assert!(!text.contains("retain"));
            assert!(!text.contains("dispose"));
            assert!(text.contains("void on() {"));
        }

        #[test]
        fn extended_teardown_keeps_authored_statements() {
            let text = run(
                "class A { void f(V v) { reg(new V() { { v.retain(); } @CapturesRetained void dispose() { done(); v.release(); } }); } }",
            );
            assert!(text.contains("void dispose() {"));
            assert!(text.contains("done();"));
            assert!(!text.contains("@CapturesRetained"));
            assert!(!text.contains("release"));
        }

        #[test]
        fn ordinary_if_statements_survive() {
            let text = run("class A { void f(B b) { if (b.f != null) { use(b.f); } } }");
            assert!(text.contains("if (b.f != null) {"));
        }
    }

    mod inline {
        use super::*;

        #[test]
        fn materialized_return_is_restored() {
            let text = run(
                "class A { V f(V v) { V __rc_tmp0 = wrap(v); v.release(); return __rc_tmp0; } }",
            );
            assert!(text.contains("return wrap(v);"));
            assert!(!text.contains("__rc_tmp0"));
        }

        #[test]
        fn unused_temp_keeps_initializer_effects() {
            let text = run(
                "class A { void f() { V __rc_tmp0 = make(); __rc_tmp0.release(); } }",
            );
            assert!(text.contains("make();"));
            assert!(!text.contains("__rc_tmp0"));
        }

        #[test]
        fn hoisted_receiver_is_restored() {
            let text = run(
                "class A { void f() { V __rc_tmp0 = make(); __rc_tmp0.run(); __rc_tmp0.release(); } }",
            );
            assert!(text.contains("make().run();"));
            assert!(!text.contains("__rc_tmp0"));
        }

        #[test]
        fn authored_locals_are_never_inlined() {
            let text = run("class A { void f() { V v = make(); use(v); } }");
            assert!(text.contains("V v = make();"));
        }

        #[test]
        fn bare_blocks_are_spliced() {
            let text = run("class A { void f() { { use(1); } use(2); } }");
            assert!(text.contains("use(1);\n        use(2);"));
        }
    }
}
