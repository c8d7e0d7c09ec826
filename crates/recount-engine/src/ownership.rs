//! Ownership-bearing type test and consumption policy.
//!
//! A type is ownership-bearing when values of it participate in the
//! runtime's reference-count protocol. The test is deliberately
//! conservative: interfaces count unless excluded, containers count when
//! any type argument counts, and an undecidable callee is assumed to
//! consume its arguments (logged at warn so the bias is visible).

use std::collections::HashSet;

use recount_core::config::PassContext;
use recount_lang::{Arena, NodeId, NodeKind, TypeRef};
use regex::Regex;
use thiserror::Error;

use crate::resolver::BindingResolver;

// ============================================================================
// Runtime Contract Names
// ============================================================================

/// Interface implemented by reference-counted types.
pub const LIFECYCLE_INTERFACE: &str = "RefCounted";
/// Marker annotation declaring a type reference-counted.
pub const MARKER_REFCOUNTED: &str = "RefCounted";
/// Marker annotation declaring a method to consume its arguments.
pub const MARKER_CONSUMES: &str = "Consumes";
/// Marker on a generated teardown method; makes capture injection a no-op.
pub const MARKER_CAPTURES_RETAINED: &str = "CapturesRetained";
/// Ownership-forwarding proxy class for plain functional closures.
pub const CLOSURE_PROXY: &str = "RetainedClosure";
/// Teardown hook name on self-managed closures.
pub const TEARDOWN_METHOD: &str = "dispose";
/// Retain method of the runtime protocol.
pub const RETAIN_METHOD: &str = "retain";
/// Release method of the runtime protocol.
pub const RELEASE_METHOD: &str = "release";

/// Builtin value types that never participate in reference counting.
const VALUE_TYPES: &[&str] = &["int", "long", "boolean", "char", "void", "String", "Object"];

/// Container types that forward ownership to a type argument.
const CONTAINER_TYPES: &[&str] = &["Optional", "List", "Set", "Map", "Iterator", "Iterable"];

// ============================================================================
// Policy
// ============================================================================

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid exclusion pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Configurable knobs of the ownership and consumption tests.
#[derive(Debug)]
pub struct OwnershipPolicy {
    /// Callee-name patterns known not to consume their arguments.
    non_consuming: Vec<Regex>,
    /// Interface names exempted from the conservative interface rule.
    excluded_interfaces: HashSet<String>,
    /// Whether an undecidable callee is assumed to consume.
    assume_consumes_when_unknown: bool,
}

impl Default for OwnershipPolicy {
    fn default() -> Self {
        OwnershipPolicy {
            non_consuming: Vec::new(),
            excluded_interfaces: HashSet::new(),
            assume_consumes_when_unknown: true,
        }
    }
}

impl OwnershipPolicy {
    /// Build a policy from exclusion patterns and interface exemptions.
    pub fn new(
        non_consuming_patterns: &[String],
        excluded_interfaces: &[String],
        assume_consumes_when_unknown: bool,
    ) -> Result<Self, PolicyError> {
        let mut non_consuming = Vec::with_capacity(non_consuming_patterns.len());
        for pattern in non_consuming_patterns {
            let compiled = Regex::new(pattern).map_err(|e| PolicyError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            non_consuming.push(compiled);
        }
        Ok(OwnershipPolicy {
            non_consuming,
            excluded_interfaces: excluded_interfaces.iter().cloned().collect(),
            assume_consumes_when_unknown,
        })
    }

    /// True if the named callee matches a known non-consuming pattern.
    pub fn is_excluded_callee(&self, callee: &str) -> bool {
        self.non_consuming.iter().any(|re| re.is_match(callee))
    }

    /// True if the named interface is exempt from the conservative rule.
    pub fn is_excluded_interface(&self, name: &str) -> bool {
        self.excluded_interfaces.contains(name)
    }
}

// ============================================================================
// Ownership-Bearing Test
// ============================================================================

/// Decide whether values of `ty` participate in reference counting.
pub fn is_ownership_bearing(
    ty: &TypeRef,
    resolver: &dyn BindingResolver,
    policy: &OwnershipPolicy,
) -> bool {
    // Arrays carry the ownership of their element type.
    if ty.dims > 0 {
        return ty
            .element()
            .is_some_and(|elem| is_ownership_bearing(&elem, resolver, policy));
    }
    if VALUE_TYPES.contains(&ty.name.as_str()) {
        return false;
    }
    // Containers: any ownership-bearing type argument makes the
    // container ownership-bearing.
    if CONTAINER_TYPES.contains(&ty.name.as_str()) {
        return ty
            .args
            .iter()
            .any(|arg| is_ownership_bearing(arg, resolver, policy));
    }
    if resolver.type_has_marker(&ty.name, MARKER_REFCOUNTED) {
        return true;
    }
    if satisfies_lifecycle_contract(&ty.name, resolver) {
        return true;
    }
    // Interfaces are conservative: any implementation may be counted.
    if resolver.is_interface(&ty.name) {
        return !policy.is_excluded_interface(&ty.name);
    }
    false
}

/// True if the type declares or inherits the retain/release protocol.
pub fn satisfies_lifecycle_contract(type_name: &str, resolver: &dyn BindingResolver) -> bool {
    if type_name == LIFECYCLE_INTERFACE {
        return true;
    }
    if resolver
        .supertypes_of(type_name)
        .iter()
        .any(|parent| parent == LIFECYCLE_INTERFACE)
    {
        return true;
    }
    resolver.type_declares_method(type_name, RETAIN_METHOD)
        && resolver.type_declares_method(type_name, RELEASE_METHOD)
}

// ============================================================================
// Consumption Test
// ============================================================================

/// Decide whether the callee of `call` takes ownership of its arguments.
///
/// Local methods and `@Consumes`-marked methods consume; excluded
/// utility callees do not; anything else follows the policy default and
/// is logged so the conservative bias stays visible.
pub fn callee_consumes(
    arena: &Arena,
    call: NodeId,
    resolver: &dyn BindingResolver,
    policy: &OwnershipPolicy,
    ctx: &mut PassContext,
) -> bool {
    let name = match arena.kind(call) {
        NodeKind::MethodCall { name, .. } => name.clone(),
        // Constructors always take ownership of what they are given.
        NodeKind::New { .. } => return true,
        _ => return false,
    };
    if policy.is_excluded_callee(&name) {
        return false;
    }
    if resolver.method_has_marker(&name, MARKER_CONSUMES) || resolver.is_local_method(&name) {
        return true;
    }
    if policy.assume_consumes_when_unknown {
        ctx.sink.skip(
            "consumption-test",
            Some(arena.span(call).clone()),
            format!("unknown callee '{}' assumed to consume", name),
        );
    }
    policy.assume_consumes_when_unknown
}

/// True if the expression produces a fresh value the caller already owns
/// (constructor, anonymous object, inline lambda, or a local call known
/// to hand back a fresh result).
pub fn is_fresh_value(arena: &Arena, expr: NodeId, resolver: &dyn BindingResolver) -> bool {
    match arena.kind(expr) {
        NodeKind::New { .. } | NodeKind::Lambda { .. } => true,
        NodeKind::MethodCall { name, .. } => resolver.is_local_method(name),
        _ => false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ProgramResolver;
    use recount_core::config::Options;
    use recount_lang::parse;

    fn resolver_for(source: &str) -> (Arena, ProgramResolver) {
        let arena = parse("t.src", source).unwrap();
        let resolver = ProgramResolver::from_arena(&arena);
        (arena, resolver)
    }

    fn ty(name: &str) -> TypeRef {
        TypeRef::named(name)
    }

    mod ownership_bearing {
        use super::*;

        #[test]
        fn marker_annotation_counts() {
            let (_, resolver) = resolver_for("@RefCounted class V { }");
            let policy = OwnershipPolicy::default();
            assert!(is_ownership_bearing(&ty("V"), &resolver, &policy));
        }

        #[test]
        fn structural_lifecycle_counts() {
            let (_, resolver) =
                resolver_for("class V { void retain() { } void release() { } }");
            let policy = OwnershipPolicy::default();
            assert!(is_ownership_bearing(&ty("V"), &resolver, &policy));
        }

        #[test]
        fn declared_interface_implementation_counts() {
            let (_, resolver) = resolver_for(
                "interface RefCounted { void retain(); void release(); } \
                 class V implements RefCounted { }",
            );
            let policy = OwnershipPolicy::default();
            assert!(is_ownership_bearing(&ty("V"), &resolver, &policy));
        }

        #[test]
        fn value_types_never_count() {
            let (_, resolver) = resolver_for("class A { }");
            let policy = OwnershipPolicy::default();
            assert!(!is_ownership_bearing(&ty("int"), &resolver, &policy));
            assert!(!is_ownership_bearing(&ty("String"), &resolver, &policy));
            assert!(!is_ownership_bearing(&ty("A"), &resolver, &policy));
        }

        #[test]
        fn arrays_follow_element_type() {
            let (_, resolver) = resolver_for("@RefCounted class V { }");
            let policy = OwnershipPolicy::default();
            let mut arr = ty("V");
            arr.dims = 1;
            assert!(is_ownership_bearing(&arr, &resolver, &policy));
            let mut ints = ty("int");
            ints.dims = 1;
            assert!(!is_ownership_bearing(&ints, &resolver, &policy));
        }

        #[test]
        fn containers_follow_type_arguments() {
            let (_, resolver) = resolver_for("@RefCounted class V { }");
            let policy = OwnershipPolicy::default();
            let opt = TypeRef {
                name: "Optional".to_string(),
                args: vec![ty("V")],
                dims: 0,
            };
            assert!(is_ownership_bearing(&opt, &resolver, &policy));
            let opt_str = TypeRef {
                name: "Optional".to_string(),
                args: vec![ty("String")],
                dims: 0,
            };
            assert!(!is_ownership_bearing(&opt_str, &resolver, &policy));
        }

        #[test]
        fn interfaces_conservative_unless_excluded() {
            let (_, resolver) = resolver_for("interface Store { }");
            let policy = OwnershipPolicy::default();
            assert!(is_ownership_bearing(&ty("Store"), &resolver, &policy));
            let excluding =
                OwnershipPolicy::new(&[], &["Store".to_string()], true).unwrap();
            assert!(!is_ownership_bearing(&ty("Store"), &resolver, &excluding));
        }
    }

    mod consumption {
        use super::*;

        fn find_call(arena: &Arena, name: &str) -> NodeId {
            arena
                .walk(arena.root())
                .into_iter()
                .find(
                    |&id| matches!(arena.kind(id), NodeKind::MethodCall { name: n, .. } if n == name),
                )
                .unwrap()
        }

        #[test]
        fn local_methods_consume() {
            let (arena, resolver) =
                resolver_for("class A { void put(V v) { } void f(V v) { put(v); } }");
            let policy = OwnershipPolicy::default();
            let mut ctx = PassContext::new(Options::default());
            let call = find_call(&arena, "put");
            assert!(callee_consumes(&arena, call, &resolver, &policy, &mut ctx));
            assert!(ctx.sink.records().is_empty());
        }

        #[test]
        fn marked_methods_consume() {
            let (arena, resolver) = resolver_for(
                "class Sink { @Consumes void accept(V v) { } } \
                 class A { void f(Sink s, V v) { s.accept(v); } }",
            );
            let policy = OwnershipPolicy::default();
            let mut ctx = PassContext::new(Options::default());
            let call = find_call(&arena, "accept");
            assert!(callee_consumes(&arena, call, &resolver, &policy, &mut ctx));
        }

        #[test]
        fn excluded_callees_do_not_consume() {
            let (arena, resolver) = resolver_for("class A { void f(V v) { log.print(v); } }");
            let policy =
                OwnershipPolicy::new(&["^print$".to_string()], &[], true).unwrap();
            let mut ctx = PassContext::new(Options::default());
            let call = find_call(&arena, "print");
            assert!(!callee_consumes(&arena, call, &resolver, &policy, &mut ctx));
        }

        #[test]
        fn unknown_callee_assumed_to_consume_with_warning() {
            let (arena, resolver) = resolver_for("class A { void f(V v) { ext.push(v); } }");
            let policy = OwnershipPolicy::default();
            let mut ctx = PassContext::new(Options::default());
            let call = find_call(&arena, "push");
            assert!(callee_consumes(&arena, call, &resolver, &policy, &mut ctx));
            assert_eq!(ctx.sink.count(recount_core::diag::DiagLevel::Warn), 1);
        }

        #[test]
        fn invalid_exclusion_pattern_is_an_error() {
            let err = OwnershipPolicy::new(&["(".to_string()], &[], true);
            assert!(matches!(err, Err(PolicyError::InvalidPattern { .. })));
        }
    }

    mod freshness {
        use super::*;

        #[test]
        fn constructors_and_lambdas_are_fresh() {
            let (arena, resolver) =
                resolver_for("class A { V make() { return new V(); } void f() { use(make()); each(x -> x); } }");
            let ctor = arena
                .walk(arena.root())
                .into_iter()
                .find(|&id| matches!(arena.kind(id), NodeKind::New { .. }))
                .unwrap();
            assert!(is_fresh_value(&arena, ctor, &resolver));
            let lambda = arena
                .walk(arena.root())
                .into_iter()
                .find(|&id| matches!(arena.kind(id), NodeKind::Lambda { .. }))
                .unwrap();
            assert!(is_fresh_value(&arena, lambda, &resolver));
            // A local call hands back a fresh value; a bare name does not.
            let call = arena
                .walk(arena.root())
                .into_iter()
                .find(|&id| matches!(arena.kind(id), NodeKind::MethodCall { name, .. } if name == "make"))
                .unwrap();
            assert!(is_fresh_value(&arena, call, &resolver));
            let name = arena
                .walk(arena.root())
                .into_iter()
                .find(|&id| matches!(arena.kind(id), NodeKind::Name { text } if text == "x"))
                .unwrap();
            assert!(!is_fresh_value(&arena, name, &resolver));
        }
    }
}
