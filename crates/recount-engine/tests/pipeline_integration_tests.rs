//! End-to-end pipeline tests.
//!
//! These run the whole per-file pipeline (cleanup fixpoint plus the
//! instrumentation passes) over small programs and check two global
//! properties the individual pass tests cannot see:
//!
//! - Balance: on every execution path through a method, each
//!   ownership-bearing local is released exactly once, or handed out by
//!   a bare `return`/`throw` of the binding.
//! - Convergence: running the pipeline over its own output changes
//!   nothing, and cleanup recovers the same bare program from
//!   instrumented and uninstrumented input alike.

use recount_core::config::{Options, PassContext};
use recount_core::error::RecountError;
use recount_engine::liveness::is_release_of;
use recount_engine::{run_passes, transform_source, AlignState, OwnershipPolicy, Realigner};
use recount_lang::{parse, print_program, Arena, NodeId, NodeKind};

const LIFECYCLE: &str = "@RefCounted class V { void retain() { } void release() { } }\n";

fn full(source: &str) -> String {
    transform_source("t.src", source, Options::default(), &OwnershipPolicy::default())
        .unwrap()
        .text
}

fn cleanup_only(source: &str) -> String {
    transform_source(
        "t.src",
        source,
        Options::cleanup_only(),
        &OwnershipPolicy::default(),
    )
    .unwrap()
    .text
}

fn with_lifecycle(body: &str) -> String {
    format!("{}class A {{ {} }}", LIFECYCLE, body)
}

// ============================================================================
// Path enumeration and the balance invariant
// ============================================================================

fn method_block(arena: &Arena, method: &str) -> NodeId {
    arena
        .walk(arena.root())
        .into_iter()
        .find_map(|id| match arena.kind(id) {
            NodeKind::MethodDecl {
                name,
                body: Some(body),
                ..
            } if name == method => Some(*body),
            _ => None,
        })
        .unwrap()
}

fn branch_stmts(arena: &Arena, branch: NodeId) -> Vec<NodeId> {
    match arena.block_stmts(branch) {
        Some(stmts) => stmts.to_vec(),
        None => vec![branch],
    }
}

/// Enumerate execution paths through a statement list as flat statement
/// sequences. `if` forks the path; `return` and `throw` end it. Loops
/// are taken zero times, which is enough for the shapes tested here.
fn enumerate_paths(arena: &Arena, stmts: &[NodeId], prefix: Vec<NodeId>, out: &mut Vec<Vec<NodeId>>) {
    let mut prefix = prefix;
    for (i, &stmt) in stmts.iter().enumerate() {
        match arena.kind(stmt) {
            NodeKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                let rest = &stmts[i + 1..];
                let mut taken = branch_stmts(arena, *then_branch);
                taken.extend_from_slice(rest);
                enumerate_paths(arena, &taken, prefix.clone(), out);
                match else_branch {
                    Some(els) => {
                        let mut skipped = branch_stmts(arena, *els);
                        skipped.extend_from_slice(rest);
                        enumerate_paths(arena, &skipped, prefix, out);
                    }
                    None => enumerate_paths(arena, rest, prefix, out),
                }
                return;
            }
            NodeKind::Return { .. } | NodeKind::Throw { .. } => {
                prefix.push(stmt);
                out.push(prefix);
                return;
            }
            _ => prefix.push(stmt),
        }
    }
    out.push(prefix);
}

/// A bare `return name;` or `throw name;` hands the reference out.
fn is_transfer_of(arena: &Arena, stmt: NodeId, name: &str) -> bool {
    let value = match arena.kind(stmt) {
        NodeKind::Return { value: Some(value) } => *value,
        NodeKind::Throw { value } => *value,
        _ => return false,
    };
    matches!(arena.kind(value), NodeKind::Name { text } if text == name)
}

/// Check that every path through `method` settles `name` exactly once,
/// by release or by transfer.
fn assert_balanced(text: &str, method: &str, name: &str) {
    let arena = parse("t.src", text).unwrap();
    let block = method_block(&arena, method);
    let stmts = arena.block_stmts(block).unwrap().to_vec();
    let mut paths = Vec::new();
    enumerate_paths(&arena, &stmts, Vec::new(), &mut paths);
    assert!(!paths.is_empty());
    for path in &paths {
        let releases = path
            .iter()
            .filter(|&&stmt| is_release_of(&arena, stmt, name))
            .count();
        let transferred = path
            .last()
            .is_some_and(|&stmt| is_transfer_of(&arena, stmt, name));
        assert_eq!(
            releases + usize::from(transferred),
            1,
            "path settles '{}' {} times in:\n{}",
            name,
            releases + usize::from(transferred),
            text
        );
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn straight_line_method_is_balanced() {
    let text = full(&with_lifecycle("void f() { V v = make(); use(v); done(); }"));
    assert!(text.contains("use(v.retain());"));
    assert_balanced(&text, "f", "v");
}

#[test]
fn early_exit_paths_are_balanced() {
    let text = full(&with_lifecycle(
        "void f(boolean b) { V v = make(); if (b) { use(v); return; } done(); }",
    ));
    assert_balanced(&text, "f", "v");
}

#[test]
fn else_branches_are_balanced() {
    let text = full(&with_lifecycle(
        "void f(boolean b) { V v = make(); if (b) { use(v); } else { other(v); } done(); }",
    ));
    assert_balanced(&text, "f", "v");
}

#[test]
fn bare_return_transfers_instead_of_releasing() {
    let text = full(&with_lifecycle(
        "V f(boolean b) { V v = make(); if (b) { return v; } use(v); return v; }",
    ));
    assert_balanced(&text, "f", "v");
    assert!(!text.contains("v.release();\n            return v;"));
}

#[test]
fn complex_return_is_materialized() {
    let text = full(&with_lifecycle("V f() { V v = make(); return wrap(v); }"));
    assert!(text.contains("__rc_tmp0 = wrap(v.retain());"));
    assert!(text.contains("v.release();\n        return __rc_tmp0;"));
    assert_balanced(&text, "f", "v");
}

#[test]
fn throw_paths_are_balanced() {
    let text = full(&with_lifecycle(
        "void f(boolean b) { V v = make(); if (b) { throw new Err(); } use(v); }",
    ));
    assert!(text.contains("v.release();\n            throw new Err();"));
    assert_balanced(&text, "f", "v");
}

#[test]
fn captured_local_is_proxied_and_balanced() {
    let text = full(&with_lifecycle(
        "void f() { V v = make(); run(x -> use(v)); done(); }",
    ));
    assert!(text.contains("new RetainedClosure(x -> use(v.retain()), v)"));
    assert_balanced(&text, "f", "v");
}

#[test]
fn owned_result_embedded_in_infix_statement_is_released() {
    let source = with_lifecycle(
        "V make() { return new V(); } void f(boolean flag) { flag == make(); }",
    );
    let text = full(&source);
    assert!(text.contains("V __rc_tmp0 = make();"));
    assert!(text.contains("flag == __rc_tmp0;"));
    assert!(text.contains("__rc_tmp0.release();"));
    assert_eq!(full(&text), text);
}

#[test]
fn self_managed_listener_retains_its_captures() {
    let text = full(&with_lifecycle(
        "void f() { V v = make(); run(new V() { void handle() { use(v); } }); done(); }",
    ));
    assert!(text.contains("v.retain();"));
    assert!(text.contains("@CapturesRetained"));
    assert!(text.contains("void dispose() {"));
    assert!(!text.contains("RetainedClosure"));
}

// ============================================================================
// Convergence
// ============================================================================

#[test]
fn pipeline_is_a_fixed_point_of_itself() {
    let source = with_lifecycle(
        "V f(boolean b) { V v = make(); if (b) { use(v); return v; } other(v); return wrap(v); }",
    );
    let once = full(&source);
    let twice = full(&once);
    assert_eq!(once, twice);
}

#[test]
fn cleanup_recovers_the_same_bare_program() {
    let source = with_lifecycle("void f() { V v = make(); use(v); done(); }");
    let bare = cleanup_only(&source);
    let stripped = cleanup_only(&full(&source));
    assert_eq!(bare, stripped);
}

#[test]
fn stripping_then_rerunning_reproduces_one_shot_output() {
    let source = with_lifecycle(
        "void f(boolean b) { V v = make(); if (b) { use(v); return; } other(v); }",
    );
    let once = full(&source);
    let rerun = full(&cleanup_only(&once));
    assert_eq!(once, rerun);
}

#[test]
fn cleanup_only_leaves_plain_code_alone() {
    let source = with_lifecycle("void f() { V v = make(); use(v); }");
    let bare = cleanup_only(&source);
    assert_eq!(bare, cleanup_only(&bare));
}

// ============================================================================
// Span geometry
// ============================================================================

fn scope_spans(text: &str) -> Vec<recount_core::span::Span> {
    let arena = parse("t.src", text).unwrap();
    arena
        .walk(arena.root())
        .into_iter()
        .filter(|&id| {
            matches!(
                arena.kind(id),
                NodeKind::ClassDecl { .. }
                    | NodeKind::MethodDecl { .. }
                    | NodeKind::Lambda { .. }
                    | NodeKind::Block { .. }
            )
        })
        .map(|id| arena.span(id).clone())
        .collect()
}

#[test]
fn scope_spans_nest_without_partial_overlap() {
    let source = with_lifecycle(
        "void f(boolean b) { V v = make(); if (b) { run(x -> use(v)); } run(new V() { void handle() { use(v); } }); }",
    );
    for text in [source.clone(), full(&source)] {
        let spans = scope_spans(&text);
        assert!(spans.len() > 4);
        for a in &spans {
            for b in &spans {
                assert!(!a.partially_overlaps(b), "{} straddles {}", a, b);
            }
        }
    }
}

// ============================================================================
// Failure behavior
// ============================================================================

#[test]
fn diverging_alignment_abandons_the_file() {
    let source = with_lifecycle("void f() { V v = make(); use(v); }");
    let mut arena = parse("t.src", &source).unwrap();
    let mut ctx = PassContext::new(Options::default());
    let mut realigner = Realigner::new();
    realigner.set_post_print_hook(Box::new(|text: &str| text.replace("use", "misuse")));
    let err = run_passes(&mut arena, &mut realigner, &OwnershipPolicy::default(), &mut ctx)
        .unwrap_err();
    match err {
        RecountError::AlignmentFailed { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(realigner.state(), AlignState::Failed);
    // The arena is still printable; nothing was corrupted by the
    // abandoned repair loop.
    assert!(print_program(&arena).contains("use(v);"));
}

#[test]
fn edit_log_names_the_rules_that_fired() {
    let source = with_lifecycle("void f() { V v = make(); use(v); }");
    let outcome = transform_source(
        "t.src",
        &source,
        Options::default(),
        &OwnershipPolicy::default(),
    )
    .unwrap();
    let rules: Vec<&str> = outcome.records.iter().map(|r| r.rule.as_str()).collect();
    assert!(rules.contains(&"retain-on-pass"));
    assert!(rules.contains(&"release-insertion"));
}
