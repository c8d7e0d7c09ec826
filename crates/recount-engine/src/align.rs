//! Alignment and repair loop: keeps the arena synchronized with its
//! printed form.
//!
//! After a pass mutates the tree, node spans are stale and synthesized
//! nodes carry placeholders. Realigning prints the arena, re-parses the
//! text, and structurally diffs the old tree against the new one. A
//! clean diff swaps the fresh tree in (real spans everywhere) and
//! carries node identity over through the match table. A mismatch is
//! repaired by grafting the old subtree onto the new tree and printing
//! again. Three failed repair attempts abandon the file: the error is
//! fatal for that file and nothing is written.

use std::collections::HashMap;

use recount_core::config::PassContext;
use recount_core::error::RecountError;
use recount_lang::{parse, print_program, Arena, NodeId, NodeKind};

/// Repair attempts before a file is abandoned.
pub const MAX_REALIGN_ATTEMPTS: u32 = 3;

const RULE: &str = "realign";

// ============================================================================
// State and Result
// ============================================================================

/// Synchronization state between the arena and its printed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignState {
    /// No edits since the last parse; tree and text agree.
    Clean,
    /// The tree was mutated; spans are stale.
    Edited,
    /// A repair print/re-parse cycle is in progress.
    Realigning,
    /// Print and re-parse agreed; identity carried over.
    Stable,
    /// Repair exceeded the retry bound.
    Failed,
}

/// Outcome of one structural diff between an edited tree and its
/// re-parsed print.
#[derive(Debug, Default)]
pub struct AlignmentResult {
    /// Structurally matched nodes, old handle to new handle.
    pub matches: HashMap<NodeId, NodeId>,
    /// Structurally diverged pairs, old handle to new handle.
    pub mismatches: HashMap<NodeId, NodeId>,
    /// Conditions that prevented diffing (parse failures, root loss).
    pub errors: Vec<String>,
}

impl AlignmentResult {
    /// True when the diff found no divergence.
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty() && self.errors.is_empty()
    }
}

// ============================================================================
// Realigner
// ============================================================================

type PostPrintHook = Box<dyn FnMut(&str) -> String>;

/// Print/re-parse synchronizer with bounded repair.
pub struct Realigner {
    state: AlignState,
    latest: AlignmentResult,
    post_print: Option<PostPrintHook>,
}

impl Default for Realigner {
    fn default() -> Self {
        Self::new()
    }
}

impl Realigner {
    /// Create a realigner in the clean state.
    pub fn new() -> Self {
        Realigner {
            state: AlignState::Clean,
            latest: AlignmentResult::default(),
            post_print: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> AlignState {
        self.state
    }

    /// Record that the tree was mutated.
    pub fn mark_edited(&mut self) {
        self.state = AlignState::Edited;
    }

    /// Install a transformation applied to printed text before
    /// re-parsing. Tests use this to force divergence and observe the
    /// retry bound.
    pub fn set_post_print_hook(&mut self, hook: PostPrintHook) {
        self.post_print = Some(hook);
    }

    /// Resolve a stale node handle against the latest diff: confirmed
    /// matches first, then repaired mismatches.
    pub fn lookup(&self, stale: NodeId) -> Option<NodeId> {
        self.latest
            .matches
            .get(&stale)
            .or_else(|| self.latest.mismatches.get(&stale))
            .copied()
    }

    /// Synchronize the arena with its printed form.
    ///
    /// On success the arena is replaced by the freshly parsed tree
    /// (accurate spans throughout) and the canonical text is returned.
    /// Exceeding the repair bound leaves the arena untouched and
    /// returns [`RecountError::AlignmentFailed`].
    pub fn realign(
        &mut self,
        arena: &mut Arena,
        ctx: &mut PassContext,
    ) -> Result<String, RecountError> {
        if self.state() == AlignState::Clean {
            self.state = AlignState::Stable;
            return Ok(self.render(arena));
        }
        let mut working = arena.clone();
        for attempt in 1..=MAX_REALIGN_ATTEMPTS {
            self.state = AlignState::Realigning;
            let text = self.render(&working);
            let reparsed = match parse(&arena.file, &text) {
                Ok(reparsed) => reparsed,
                Err(err) => {
                    self.latest = AlignmentResult {
                        errors: vec![err.to_string()],
                        ..AlignmentResult::default()
                    };
                    ctx.sink.skip(
                        RULE,
                        None,
                        format!("printed form failed to re-parse (attempt {})", attempt),
                    );
                    continue;
                }
            };
            let result = diff_trees(&working, &reparsed);
            if result.is_clean() {
                self.latest = result;
                self.state = AlignState::Stable;
                *arena = reparsed;
                return Ok(text);
            }
            ctx.sink.detail(
                RULE,
                None,
                format!(
                    "attempt {}: {} mismatched subtrees, grafting",
                    attempt,
                    result.mismatches.len()
                ),
            );
            working = repair(&working, reparsed, &result, ctx);
            self.latest = result;
        }
        self.state = AlignState::Failed;
        ctx.sink.skip(
            RULE,
            None,
            format!(
                "alignment diverged after {} attempts, file abandoned",
                MAX_REALIGN_ATTEMPTS
            ),
        );
        Err(RecountError::AlignmentFailed {
            file: arena.file.clone(),
            attempts: MAX_REALIGN_ATTEMPTS,
        })
    }

    fn render(&mut self, arena: &Arena) -> String {
        let text = print_program(arena);
        match self.post_print.as_mut() {
            Some(hook) => hook(&text),
            None => text,
        }
    }
}

impl std::fmt::Debug for Realigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realigner")
            .field("state", &self.state())
            .field("matches", &self.latest.matches.len())
            .field("mismatches", &self.latest.mismatches.len())
            .finish()
    }
}

// ============================================================================
// Structural Diff
// ============================================================================

/// Diff two trees by shape, pairing children positionally under matched
/// parents. Mismatched pairs are recorded without descending further.
pub fn diff_trees(old: &Arena, new: &Arena) -> AlignmentResult {
    let mut result = AlignmentResult::default();
    let mut stack = vec![(old.root(), new.root())];
    while let Some((old_id, new_id)) = stack.pop() {
        if shape_of(old, old_id) != shape_of(new, new_id) {
            result.mismatches.insert(old_id, new_id);
            continue;
        }
        result.matches.insert(old_id, new_id);
        let old_children = old.children(old_id);
        let new_children = new.children(new_id);
        for (o, n) in old_children.into_iter().zip(new_children) {
            stack.push((o, n));
        }
    }
    result
}

/// Shallow shape of a node: variant, scalar payload, child count.
/// Child identity is deliberately excluded; children are compared
/// positionally by the diff.
fn shape_of(arena: &Arena, id: NodeId) -> (String, usize) {
    let label = match arena.kind(id) {
        NodeKind::Program { .. } => "program".to_string(),
        NodeKind::ClassDecl {
            annotations,
            is_interface,
            name,
            interfaces,
            ..
        } => format!(
            "class:{}:{}:{}:{}",
            name,
            is_interface,
            annotations.join(","),
            interfaces.join(",")
        ),
        NodeKind::FieldDecl {
            annotations,
            ty,
            name,
            ..
        } => format!("field:{}:{}:{}", name, ty.render(), annotations.join(",")),
        NodeKind::MethodDecl {
            annotations,
            ret,
            name,
            ..
        } => format!("method:{}:{}:{}", name, ret.render(), annotations.join(",")),
        NodeKind::Param {
            annotations,
            ty,
            name,
        } => format!(
            "param:{}:{}:{}",
            name,
            ty.as_ref().map(|t| t.render()).unwrap_or_default(),
            annotations.join(",")
        ),
        NodeKind::InitBlock { .. } => "init-block".to_string(),
        NodeKind::Block { .. } => "block".to_string(),
        NodeKind::LocalDecl { ty, name, .. } => format!("local:{}:{}", name, ty.render()),
        NodeKind::ExprStmt { .. } => "expr-stmt".to_string(),
        NodeKind::If { .. } => "if".to_string(),
        NodeKind::While { .. } => "while".to_string(),
        NodeKind::DoWhile { .. } => "do-while".to_string(),
        NodeKind::For { .. } => "for".to_string(),
        NodeKind::Try { .. } => "try".to_string(),
        NodeKind::Catch { .. } => "catch".to_string(),
        NodeKind::Synchronized { .. } => "synchronized".to_string(),
        NodeKind::Return { .. } => "return".to_string(),
        NodeKind::Throw { .. } => "throw".to_string(),
        NodeKind::Empty => "empty".to_string(),
        NodeKind::Name { text } => format!("name:{}", text),
        NodeKind::FieldAccess { name, .. } => format!("field-access:{}", name),
        NodeKind::MethodCall { name, .. } => format!("call:{}", name),
        NodeKind::Index { .. } => "index".to_string(),
        NodeKind::New { class, .. } => format!("new:{}", class.render()),
        NodeKind::Lambda { .. } => "lambda".to_string(),
        NodeKind::Assign { .. } => "assign".to_string(),
        NodeKind::Binary { op, .. } => format!("binary:{}", op.symbol()),
        NodeKind::Unary { op, .. } => format!("unary:{}", op.symbol()),
        NodeKind::LitInt(v) => format!("int:{}", v),
        NodeKind::LitStr(s) => format!("str:{}", s),
        NodeKind::LitBool(b) => format!("bool:{}", b),
        NodeKind::LitNull => "null".to_string(),
    };
    (label, arena.children(id).len())
}

// ============================================================================
// Repair
// ============================================================================

/// Graft each mismatched old subtree over its counterpart in the new
/// tree, producing the repaired tree for the next print cycle.
fn repair(
    old: &Arena,
    mut new: Arena,
    result: &AlignmentResult,
    ctx: &mut PassContext,
) -> Arena {
    for (&old_id, &new_id) in &result.mismatches {
        if new_id == new.root() {
            // Whole-tree divergence: start the next cycle from the old
            // tree as-is.
            ctx.sink.skip(RULE, None, "root mismatch, re-printing edited tree");
            return old.clone();
        }
        let Some(parent) = new.parent_of(new.root(), new_id) else {
            ctx.sink.skip(
                RULE,
                None,
                "mismatched node has no parent in re-parsed tree",
            );
            continue;
        };
        let grafted = new.import_from(old, old_id);
        new.replace_child(parent, new_id, grafted);
    }
    new
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use recount_core::config::Options;

    fn arena_for(source: &str) -> Arena {
        parse("t.src", source).unwrap()
    }

    fn ctx() -> PassContext {
        PassContext::new(Options::default())
    }

    mod diffing {
        use super::*;

        #[test]
        fn identical_trees_match_fully() {
            let a = arena_for("class A { void f() { use(1); } }");
            let b = arena_for("class A { void f() { use(1); } }");
            let result = diff_trees(&a, &b);
            assert!(result.is_clean());
            assert_eq!(result.matches.len(), a.walk(a.root()).len());
        }

        #[test]
        fn renamed_call_is_a_mismatch() {
            let a = arena_for("class A { void f() { use(1); } }");
            let b = arena_for("class A { void f() { mangle(1); } }");
            let result = diff_trees(&a, &b);
            assert_eq!(result.mismatches.len(), 1);
            assert!(!result.is_clean());
        }

        #[test]
        fn extra_statement_mismatches_the_block() {
            let a = arena_for("class A { void f() { use(1); } }");
            let b = arena_for("class A { void f() { use(1); use(2); } }");
            let result = diff_trees(&a, &b);
            // Child counts differ at the block; diff stops there.
            assert_eq!(result.mismatches.len(), 1);
        }
    }

    mod realignment {
        use super::*;
        use recount_lang::NodeKind;

        #[test]
        fn edited_tree_stabilizes_in_one_pass() {
            let mut arena = arena_for("class A { void f(V v) { use(v); } }");
            // Synthesize a release after the use, as a pass would.
            let block = arena
                .walk(arena.root())
                .into_iter()
                .find(|&id| arena.block_stmts(id).is_some())
                .unwrap();
            let object = arena.alloc_synth(NodeKind::Name {
                text: "v".to_string(),
            });
            let call = arena.alloc_synth(NodeKind::MethodCall {
                object: Some(object),
                name: "release".to_string(),
                args: vec![],
            });
            let stmt = arena.alloc_synth(NodeKind::ExprStmt { expr: call });
            arena.insert_stmt(block, 1, stmt);

            let mut realigner = Realigner::new();
            realigner.mark_edited();
            let mut ctx = ctx();
            let text = realigner.realign(&mut arena, &mut ctx).unwrap();
            assert_eq!(realigner.state(), AlignState::Stable);
            assert!(text.contains("v.release();"));
            // The swapped-in tree carries real spans for the new node.
            let release = arena
                .walk(arena.root())
                .into_iter()
                .find(|&id| {
                    matches!(arena.kind(id), NodeKind::MethodCall { name, .. } if name == "release")
                })
                .unwrap();
            assert_eq!(arena.span(release).start.line, 4);
        }

        #[test]
        fn identity_carries_over_matches() {
            let mut arena = arena_for("class A { void f() { use(1); } }");
            let old_class = arena
                .walk(arena.root())
                .into_iter()
                .find(|&id| matches!(arena.kind(id), NodeKind::ClassDecl { .. }))
                .unwrap();
            let mut realigner = Realigner::new();
            realigner.mark_edited();
            let mut ctx = ctx();
            realigner.realign(&mut arena, &mut ctx).unwrap();
            let new_class = realigner.lookup(old_class).unwrap();
            assert!(matches!(
                arena.kind(new_class),
                NodeKind::ClassDecl { name, .. } if name == "A"
            ));
        }

        #[test]
        fn clean_state_prints_without_reparse() {
            let mut arena = arena_for("class A { }");
            let mut realigner = Realigner::new();
            let mut ctx = ctx();
            let text = realigner.realign(&mut arena, &mut ctx).unwrap();
            assert_eq!(realigner.state(), AlignState::Stable);
            assert!(text.starts_with("class A {"));
        }
    }

    mod repair_bound {
        use super::*;

        #[test]
        fn non_stabilizing_edit_fails_after_three_attempts() {
            let mut arena = arena_for("class A { void f() { use(1); } }");
            let mut realigner = Realigner::new();
            realigner.mark_edited();
            // Every print cycle mangles the text, so the re-parse never
            // agrees with the tree.
            realigner.set_post_print_hook(Box::new(|text: &str| text.replace("use(", "mangle(")));
            let mut ctx = ctx();
            let err = realigner.realign(&mut arena, &mut ctx).unwrap_err();
            assert!(matches!(
                err,
                RecountError::AlignmentFailed { attempts: 3, .. }
            ));
            assert_eq!(realigner.state(), AlignState::Failed);
            // The arena still holds the original, unswapped tree.
            assert!(print_program(&arena).contains("use(1);"));
        }

        #[test]
        fn unparseable_print_also_counts_against_the_bound() {
            let mut arena = arena_for("class A { void f() { use(1); } }");
            let mut realigner = Realigner::new();
            realigner.mark_edited();
            realigner.set_post_print_hook(Box::new(|_: &str| "not a program".to_string()));
            let mut ctx = ctx();
            let err = realigner.realign(&mut arena, &mut ctx).unwrap_err();
            assert!(matches!(err, RecountError::AlignmentFailed { .. }));
        }
    }
}
