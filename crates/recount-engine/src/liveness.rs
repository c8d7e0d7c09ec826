//! Liveness analysis and release insertion.
//!
//! For every ownership-bearing local declaration the pass finds the last
//! statement that mentions the binding and plans exactly one release on
//! every execution path that does not transfer ownership out:
//!
//! - no mention after the declaration: release right after it;
//! - last mention is an ordinary statement: release right after it;
//! - last mention is `return binding;`: no release, ownership transfers;
//! - last mention is a return or throw of a larger expression: the value
//!   is materialized into a temporary, the binding released, and the
//!   temporary handed out, preserving evaluation order.
//!
//! Independently, every return or throw nested between the declaration
//! and the last mention gets a release inserted before it on its path,
//! unless its expression is a bare reference to the binding. Exit
//! discovery returns owned statement positions rather than borrowing the
//! tree, so insertion never fights the borrow checker.

use recount_core::config::{PassContext, TempNames};
use recount_lang::{Arena, NodeId, NodeKind, TypeRef};

use crate::ownership::{is_ownership_bearing, OwnershipPolicy, RELEASE_METHOD};
use crate::resolver::BindingResolver;

const RULE: &str = "release-insertion";

// ============================================================================
// Mention
// ============================================================================

/// A statement that mentions a binding, positioned in its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mention {
    /// The mentioning statement.
    pub stmt: NodeId,
    /// Its index in the containing block.
    pub index: usize,
    /// The containing block.
    pub block: NodeId,
}

impl Mention {
    /// True if the mentioning statement is a `return`.
    pub fn is_return(&self, arena: &Arena) -> bool {
        matches!(arena.kind(self.stmt), NodeKind::Return { .. })
    }

    /// True if the statement is a return of anything other than a bare
    /// reference to `name`.
    pub fn is_complex_return(&self, arena: &Arena, name: &str) -> bool {
        match arena.kind(self.stmt) {
            NodeKind::Return { value: Some(value) } => !is_bare_name(arena, *value, name),
            _ => false,
        }
    }
}

/// Last statement in `block` strictly after index `declared_at` whose
/// subtree mentions `name`.
pub fn last_mention(
    arena: &Arena,
    block: NodeId,
    name: &str,
    declared_at: usize,
) -> Option<Mention> {
    let stmts = arena.block_stmts(block)?;
    stmts
        .iter()
        .enumerate()
        .skip(declared_at + 1)
        .filter(|(_, &stmt)| arena.subtree_mentions_name(stmt, name))
        .last()
        .map(|(index, &stmt)| Mention { stmt, index, block })
}

fn is_bare_name(arena: &Arena, expr: NodeId, name: &str) -> bool {
    matches!(arena.kind(expr), NodeKind::Name { text } if text == name)
}

// ============================================================================
// Pass Entry Point
// ============================================================================

/// Insert release calls for every ownership-bearing local in the tree.
pub fn insert_releases(
    arena: &mut Arena,
    resolver: &dyn BindingResolver,
    policy: &OwnershipPolicy,
    ctx: &mut PassContext,
) {
    normalize_exit_bodies(arena);
    // Snapshot (block, decl) pairs up front; insertions below add
    // statements but never new ownership-bearing declarations.
    let mut targets = Vec::new();
    for id in arena.walk(arena.root()) {
        let Some(stmts) = arena.block_stmts(id) else {
            continue;
        };
        for &stmt in stmts {
            if let NodeKind::LocalDecl { ty, name, .. } = arena.kind(stmt) {
                if TempNames::is_temp(name) {
                    continue;
                }
                if is_ownership_bearing(ty, resolver, policy) {
                    targets.push((id, stmt));
                }
            }
        }
    }
    for (block, decl) in targets {
        release_binding(arena, block, decl, resolver, ctx);
    }
}

fn release_binding(
    arena: &mut Arena,
    block: NodeId,
    decl: NodeId,
    resolver: &dyn BindingResolver,
    ctx: &mut PassContext,
) {
    let name = match arena.kind(decl) {
        NodeKind::LocalDecl { name, .. } => name.clone(),
        _ => return,
    };
    let Some(decl_index) = arena.stmt_index(block, decl) else {
        ctx.sink.skip(
            RULE,
            Some(arena.span(decl).clone()),
            format!("declaration of '{}' no longer in its block", name),
        );
        return;
    };
    if already_released(arena, block, &name, decl_index) {
        return;
    }
    let decl_span = arena.span(decl).clone();

    let Some(last) = last_mention(arena, block, &name, decl_index) else {
        let release = release_stmt(arena, &name);
        arena.insert_stmt(block, decl_index + 1, release);
        ctx.sink.edit(
            RULE,
            decl_span,
            format!("'{}' never used, released after declaration", name),
        );
        return;
    };

    // Exits strictly between the declaration and the last mention, plus
    // exits nested inside the last-mention statement itself.
    for (exit_block, exit) in collect_exits(arena, block, decl_index + 1, last.index, last.stmt) {
        insert_release_before_exit(arena, exit_block, exit, &name, ctx);
    }

    if matches!(
        arena.kind(last.stmt),
        NodeKind::Return { .. } | NodeKind::Throw { .. }
    ) {
        let transfers = match arena.kind(last.stmt) {
            NodeKind::Return { value: Some(value) } | NodeKind::Throw { value } => {
                is_bare_name(arena, *value, &name)
            }
            _ => false,
        };
        // A bare `return name;` (or `throw name;`) hands the reference
        // out; anything larger is materialized first.
        if !transfers {
            materialize_exit(arena, &last, &name, resolver, ctx);
        }
        return;
    }

    let release = release_stmt(arena, &name);
    if let Some(index) = arena.stmt_index(last.block, last.stmt) {
        arena.insert_stmt(last.block, index + 1, release);
        ctx.sink.edit(
            RULE,
            decl_span,
            format!("released '{}' after its last use", name),
        );
    } else {
        ctx.sink.skip(
            RULE,
            Some(decl_span),
            format!("last use of '{}' no longer in its block", name),
        );
    }
}

/// True if the block already releases `name` after the declaration.
fn already_released(arena: &Arena, block: NodeId, name: &str, decl_index: usize) -> bool {
    let Some(stmts) = arena.block_stmts(block) else {
        return false;
    };
    stmts
        .iter()
        .skip(decl_index + 1)
        .any(|&stmt| is_release_of(arena, stmt, name))
}

/// True if `stmt` is exactly `name.release();`.
pub fn is_release_of(arena: &Arena, stmt: NodeId, name: &str) -> bool {
    let NodeKind::ExprStmt { expr } = arena.kind(stmt) else {
        return false;
    };
    let NodeKind::MethodCall {
        object: Some(object),
        name: method,
        args,
    } = arena.kind(*expr)
    else {
        return false;
    };
    method == RELEASE_METHOD && args.is_empty() && is_bare_name(arena, *object, name)
}

// ============================================================================
// Exit Handling
// ============================================================================

/// Exits (`return`/`throw`) on paths between the declaration and the
/// last mention: top-level exits in `block` at indices `[from, to)`, and
/// exits nested anywhere inside the statements at `[from, to]` except
/// `last_stmt` itself when it is a top-level exit.
fn collect_exits(
    arena: &Arena,
    block: NodeId,
    from: usize,
    to: usize,
    last_stmt: NodeId,
) -> Vec<(NodeId, NodeId)> {
    let mut out = Vec::new();
    let Some(stmts) = arena.block_stmts(block) else {
        return out;
    };
    for (index, &stmt) in stmts.iter().enumerate() {
        if index < from || index > to {
            continue;
        }
        match arena.kind(stmt) {
            NodeKind::Return { .. } | NodeKind::Throw { .. } => {
                if stmt != last_stmt {
                    out.push((block, stmt));
                }
            }
            _ => exits_in_stmt(arena, stmt, &mut out),
        }
    }
    out
}

/// Collect exit positions nested inside one statement. Closure bodies
/// (lambdas, anonymous classes) are separate scopes and are not entered.
fn exits_in_stmt(arena: &Arena, stmt: NodeId, out: &mut Vec<(NodeId, NodeId)>) {
    match arena.kind(stmt) {
        NodeKind::Block { stmts } => {
            for &inner in &stmts.clone() {
                match arena.kind(inner) {
                    NodeKind::Return { .. } | NodeKind::Throw { .. } => out.push((stmt, inner)),
                    _ => exits_in_stmt(arena, inner, out),
                }
            }
        }
        NodeKind::If {
            then_branch,
            else_branch,
            ..
        } => {
            exits_in_stmt(arena, *then_branch, out);
            if let Some(else_branch) = else_branch {
                exits_in_stmt(arena, *else_branch, out);
            }
        }
        NodeKind::While { body, .. }
        | NodeKind::DoWhile { body, .. }
        | NodeKind::For { body, .. }
        | NodeKind::Synchronized { body, .. }
        | NodeKind::Catch { body, .. } => exits_in_stmt(arena, *body, out),
        NodeKind::Try {
            body,
            catches,
            finally,
        } => {
            exits_in_stmt(arena, *body, out);
            for &catch in &catches.clone() {
                exits_in_stmt(arena, catch, out);
            }
            if let Some(finally) = finally {
                exits_in_stmt(arena, *finally, out);
            }
        }
        _ => {}
    }
}

fn insert_release_before_exit(
    arena: &mut Arena,
    block: NodeId,
    exit: NodeId,
    name: &str,
    ctx: &mut PassContext,
) {
    if let NodeKind::Return { value: Some(value) } | NodeKind::Throw { value } = arena.kind(exit) {
        if is_bare_name(arena, *value, name) {
            return;
        }
    }
    let exit_span = arena.span(exit).clone();
    let Some(index) = arena.stmt_index(block, exit) else {
        ctx.sink.skip(
            RULE,
            Some(exit_span),
            format!("early exit no longer in its block, '{}' not released", name),
        );
        return;
    };
    // An existing release right before the exit means this path is done.
    if index > 0 {
        let prev = arena.block_stmts(block).map(|s| s[index - 1]);
        if prev.is_some_and(|prev| is_release_of(arena, prev, name)) {
            return;
        }
    }
    let release = release_stmt(arena, name);
    arena.insert_stmt(block, index, release);
    ctx.sink.edit(
        RULE,
        exit_span,
        format!("released '{}' before early exit", name),
    );
}

/// Rewrite `return expr;` (or `throw expr;`) into a temp declaration, a
/// release of the binding, and an exit of the temp.
fn materialize_exit(
    arena: &mut Arena,
    last: &Mention,
    name: &str,
    resolver: &dyn BindingResolver,
    ctx: &mut PassContext,
) {
    let (value, is_throw) = match arena.kind(last.stmt) {
        NodeKind::Return { value: Some(value) } => (*value, false),
        NodeKind::Throw { value } => (*value, true),
        _ => return,
    };
    let exit_span = arena.span(last.stmt).clone();
    let Some(index) = arena.stmt_index(last.block, last.stmt) else {
        ctx.sink.skip(
            RULE,
            Some(exit_span),
            format!("exit no longer in its block, '{}' not released", name),
        );
        return;
    };
    let temp = ctx.names.fresh();
    let temp_ty = resolver
        .expr_type(arena, value)
        .unwrap_or_else(|| TypeRef::named("Object"));
    let decl = arena.alloc_synth(NodeKind::LocalDecl {
        ty: temp_ty,
        name: temp.clone(),
        init: Some(value),
    });
    let release = release_stmt(arena, name);
    let temp_ref = arena.alloc_synth(NodeKind::Name { text: temp.clone() });
    let exit = if is_throw {
        arena.alloc_synth(NodeKind::Throw { value: temp_ref })
    } else {
        arena.alloc_synth(NodeKind::Return {
            value: Some(temp_ref),
        })
    };
    arena.replace_stmt(last.block, index, decl);
    arena.insert_stmt(last.block, index + 1, release);
    arena.insert_stmt(last.block, index + 2, exit);
    ctx.sink.edit(
        RULE,
        exit_span,
        format!("materialized exit value into '{}' to release '{}'", temp, name),
    );
}

fn release_stmt(arena: &mut Arena, name: &str) -> NodeId {
    let object = arena.alloc_synth(NodeKind::Name {
        text: name.to_string(),
    });
    let call = arena.alloc_synth(NodeKind::MethodCall {
        object: Some(object),
        name: RELEASE_METHOD.to_string(),
        args: Vec::new(),
    });
    arena.alloc_synth(NodeKind::ExprStmt { expr: call })
}

/// Wrap exit statements used as single-statement control-flow bodies into
/// blocks, so releases have a list to land in.
fn normalize_exit_bodies(arena: &mut Arena) {
    for id in arena.walk(arena.root()) {
        match arena.kind(id) {
            NodeKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                let (then_branch, else_branch) = (*then_branch, *else_branch);
                if let Some(wrapped) = wrap_if_exit(arena, then_branch) {
                    if let NodeKind::If { then_branch, .. } = arena.kind_mut(id) {
                        *then_branch = wrapped;
                    }
                }
                if let Some(else_branch) = else_branch {
                    if let Some(wrapped) = wrap_if_exit(arena, else_branch) {
                        if let NodeKind::If { else_branch, .. } = arena.kind_mut(id) {
                            *else_branch = Some(wrapped);
                        }
                    }
                }
            }
            NodeKind::While { body, .. } => {
                let body = *body;
                if let Some(wrapped) = wrap_if_exit(arena, body) {
                    if let NodeKind::While { body, .. } = arena.kind_mut(id) {
                        *body = wrapped;
                    }
                }
            }
            NodeKind::DoWhile { body, .. } => {
                let body = *body;
                if let Some(wrapped) = wrap_if_exit(arena, body) {
                    if let NodeKind::DoWhile { body, .. } = arena.kind_mut(id) {
                        *body = wrapped;
                    }
                }
            }
            NodeKind::For { body, .. } => {
                let body = *body;
                if let Some(wrapped) = wrap_if_exit(arena, body) {
                    if let NodeKind::For { body, .. } = arena.kind_mut(id) {
                        *body = wrapped;
                    }
                }
            }
            _ => {}
        }
    }
}

fn wrap_if_exit(arena: &mut Arena, stmt: NodeId) -> Option<NodeId> {
    if !matches!(
        arena.kind(stmt),
        NodeKind::Return { .. } | NodeKind::Throw { .. }
    ) {
        return None;
    }
    let span = arena.span(stmt).clone();
    Some(arena.alloc(NodeKind::Block { stmts: vec![stmt] }, span))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ProgramResolver;
    use recount_core::config::Options;
    use recount_lang::{parse, print_program};

    const LIFECYCLE: &str = "@RefCounted class V { void retain() { } void release() { } }\n";

    fn run(body_source: &str) -> String {
        let source = format!("{}class A {{ {} }}", LIFECYCLE, body_source);
        let mut arena = parse("t.src", &source).unwrap();
        let resolver = ProgramResolver::from_arena(&arena);
        let policy = OwnershipPolicy::default();
        let mut ctx = PassContext::new(Options::default());
        insert_releases(&mut arena, &resolver, &policy, &mut ctx);
        print_program(&arena)
    }

    mod last_mention_scan {
        use super::*;

        #[test]
        fn finds_highest_mentioning_index() {
            let arena = parse(
                "t.src",
                "class A { void f() { V v = make(); use(v); other(); use(v); done(); } }",
            )
            .unwrap();
            let block = arena
                .walk(arena.root())
                .into_iter()
                .find(|&id| arena.block_stmts(id).is_some())
                .unwrap();
            let mention = last_mention(&arena, block, "v", 0).unwrap();
            assert_eq!(mention.index, 3);
            assert!(!mention.is_return(&arena));
        }

        #[test]
        fn complex_return_detected() {
            let arena = parse(
                "t.src",
                "class A { V f() { V v = make(); return wrap(v); } V g() { V v = make(); return v; } }",
            )
            .unwrap();
            let blocks: Vec<NodeId> = arena
                .walk(arena.root())
                .into_iter()
                .filter(|&id| arena.block_stmts(id).is_some())
                .collect();
            let complex = last_mention(&arena, blocks[0], "v", 0).unwrap();
            assert!(complex.is_return(&arena));
            assert!(complex.is_complex_return(&arena, "v"));
            let bare = last_mention(&arena, blocks[1], "v", 0).unwrap();
            assert!(bare.is_return(&arena));
            assert!(!bare.is_complex_return(&arena, "v"));
        }
    }

    mod straight_line {
        use super::*;

        #[test]
        fn release_after_last_use() {
            let text = run("void f() { V v = make(); use(v); done(); }");
            assert!(text.contains("use(v);\n        v.release();\n        done();"));
        }

        #[test]
        fn unused_binding_released_after_declaration() {
            let text = run("void f() { V v = make(); done(); }");
            assert!(text.contains("V v = make();\n        v.release();"));
        }

        #[test]
        fn bare_return_transfers_ownership() {
            let text = run("V f() { V v = make(); return v; }");
            assert!(!text.contains("v.release()"));
        }

        #[test]
        fn complex_return_materializes_temp() {
            let text = run("V f() { V v = make(); return wrap(v); }");
            assert!(text.contains("__rc_tmp0 = wrap(v);"));
            assert!(text.contains("v.release();"));
            assert!(text.contains("return __rc_tmp0;"));
            // Evaluation order: temp first, release second, return last.
            let temp_at = text.find("__rc_tmp0 = wrap(v)").unwrap();
            let release_at = text.find("v.release()").unwrap();
            let return_at = text.find("return __rc_tmp0").unwrap();
            assert!(temp_at < release_at && release_at < return_at);
        }

        #[test]
        fn non_owning_types_untouched() {
            let text = run("void f() { int n = 3; use(n); }");
            assert!(!text.contains(".release()"));
        }
    }

    mod branching {
        use super::*;

        #[test]
        fn early_exit_gets_release_on_its_path() {
            let text = run(
                "void f(boolean b) { V v = make(); if (b) { return; } use(v); }",
            );
            assert!(text.contains("v.release();\n            return;"));
            assert!(text.contains("use(v);\n        v.release();"));
        }

        #[test]
        fn bare_return_of_binding_on_branch_is_not_released() {
            let text = run(
                "V f(boolean b) { V v = make(); if (b) { return v; } use(v); v.retain(); return v; }",
            );
            // Neither the branch transfer nor the final transfer releases.
            assert!(!text.contains("v.release();\n            return v;"));
        }

        #[test]
        fn single_statement_exit_body_is_normalized() {
            let text = run("void f(boolean b) { V v = make(); if (b) return; use(v); }");
            assert!(text.contains("if (b) {"));
            assert!(text.contains("v.release();\n            return;"));
        }

        #[test]
        fn throw_paths_are_released() {
            let text = run(
                "void f(boolean b) { V v = make(); if (b) { throw new Err(); } use(v); }",
            );
            assert!(text.contains("v.release();\n            throw new Err();"));
        }

        #[test]
        fn exits_inside_last_mention_statement_are_covered() {
            let text = run(
                "void f(boolean b) { V v = make(); if (b) { use(v); return; } done(); }",
            );
            // The if is the last mention; the return inside it still
            // releases, and a fall-through release follows the if.
            assert!(text.contains("use(v);\n            v.release();\n            return;"));
        }
    }

    mod repeated_runs {
        use super::*;

        #[test]
        fn existing_release_is_not_duplicated() {
            let first = run("void f() { V v = make(); use(v); }");
            let body = first
                .split("class A {")
                .nth(1)
                .unwrap()
                .trim_end_matches(['}', '\n', ' ']);
            let again = run(&format!("{} }}", body.trim()));
            assert_eq!(again.matches("v.release()").count(), 1);
        }
    }
}
