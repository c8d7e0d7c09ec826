//! Binding resolver seam.
//!
//! The engine never resolves bindings itself; it queries a
//! [`BindingResolver`] for static types, declaration targets, call
//! targets, supertypes, and marker annotations. [`ProgramResolver`] is
//! the in-repo implementation for single-compilation-unit runs, built on
//! the declared types visible in the arena.

use std::collections::HashMap;

use recount_lang::{Arena, NodeId, NodeKind, TypeRef};

// ============================================================================
// Trait
// ============================================================================

/// Oracle interface the engine queries for semantic facts.
pub trait BindingResolver {
    /// Static type of an expression, if known.
    fn expr_type(&self, arena: &Arena, expr: NodeId) -> Option<TypeRef>;

    /// Declared return type of the callee at a call node, if known.
    fn call_return_type(&self, arena: &Arena, call: NodeId) -> Option<TypeRef>;

    /// True if the named method is declared in the authored program.
    fn is_local_method(&self, name: &str) -> bool;

    /// Declared supertypes (implemented interfaces) of a type, if the
    /// type is declared in the program.
    fn supertypes_of(&self, type_name: &str) -> Vec<String>;

    /// True if the declaration of `type_name` carries the marker
    /// annotation `marker`.
    fn type_has_marker(&self, type_name: &str, marker: &str) -> bool;

    /// True if a method named `name` carries the marker annotation.
    fn method_has_marker(&self, name: &str, marker: &str) -> bool;

    /// True if the named type declares a method with the given name
    /// (directly or through a declared supertype).
    fn type_declares_method(&self, type_name: &str, method: &str) -> bool;

    /// True if the named type is declared as an interface.
    fn is_interface(&self, type_name: &str) -> bool;
}

// ============================================================================
// ProgramResolver
// ============================================================================

/// Facts about one declared type, collected in a single walk.
#[derive(Debug, Default, Clone)]
struct TypeFacts {
    is_interface: bool,
    annotations: Vec<String>,
    interfaces: Vec<String>,
    methods: Vec<String>,
    field_types: HashMap<String, TypeRef>,
    method_returns: HashMap<String, TypeRef>,
    method_annotations: HashMap<String, Vec<String>>,
}

/// Resolver backed by the declarations visible in one arena.
///
/// Local variable and parameter types are gathered per enclosing method
/// at query time; type-level facts are collected once at construction.
#[derive(Debug, Default)]
pub struct ProgramResolver {
    types: HashMap<String, TypeFacts>,
}

impl ProgramResolver {
    /// Collect type-level facts from an arena.
    pub fn from_arena(arena: &Arena) -> Self {
        let mut types: HashMap<String, TypeFacts> = HashMap::new();
        for id in arena.walk(arena.root()) {
            let NodeKind::ClassDecl {
                annotations,
                is_interface,
                name,
                interfaces,
                members,
            } = arena.kind(id)
            else {
                continue;
            };
            let facts = types.entry(name.clone()).or_default();
            facts.is_interface = *is_interface;
            facts.annotations = annotations.clone();
            facts.interfaces = interfaces.clone();
            for &member in members {
                match arena.kind(member) {
                    NodeKind::MethodDecl {
                        annotations,
                        ret,
                        name: method_name,
                        ..
                    } => {
                        facts.methods.push(method_name.clone());
                        facts.method_returns.insert(method_name.clone(), ret.clone());
                        facts
                            .method_annotations
                            .insert(method_name.clone(), annotations.clone());
                    }
                    NodeKind::FieldDecl {
                        ty,
                        name: field_name,
                        ..
                    } => {
                        facts.field_types.insert(field_name.clone(), ty.clone());
                    }
                    _ => {}
                }
            }
        }
        ProgramResolver { types }
    }

    /// Declared type of a name at a use site: nearest local declaration,
    /// parameter, or field walking outward from the use.
    fn name_type(&self, arena: &Arena, use_site: NodeId, name: &str) -> Option<TypeRef> {
        // Spans identify the enclosing declarations; the nearest
        // declaration whose scope covers the use wins.
        let use_span = arena.span(use_site).clone();
        let mut best: Option<(u32, TypeRef)> = None;
        for id in arena.walk(arena.root()) {
            let declared = match arena.kind(id) {
                NodeKind::LocalDecl {
                    ty,
                    name: decl_name,
                    ..
                } if decl_name == name => Some(ty.clone()),
                NodeKind::Param {
                    ty: Some(ty),
                    name: decl_name,
                    ..
                } if decl_name == name => Some(ty.clone()),
                NodeKind::FieldDecl {
                    ty,
                    name: decl_name,
                    ..
                } if decl_name == name => Some(ty.clone()),
                _ => None,
            };
            let Some(ty) = declared else { continue };
            let decl_line = arena.span(id).start.line;
            // Prefer declarations textually closest before the use.
            if decl_line <= use_span.start.line {
                match &best {
                    Some((line, _)) if *line >= decl_line => {}
                    _ => best = Some((decl_line, ty)),
                }
            } else if best.is_none() {
                best = Some((decl_line, ty));
            }
        }
        best.map(|(_, ty)| ty)
    }

    fn method_return(&self, method: &str) -> Option<TypeRef> {
        self.types
            .values()
            .find_map(|facts| facts.method_returns.get(method).cloned())
    }
}

impl BindingResolver for ProgramResolver {
    fn expr_type(&self, arena: &Arena, expr: NodeId) -> Option<TypeRef> {
        match arena.kind(expr) {
            NodeKind::New { class, .. } => Some(class.clone()),
            NodeKind::Name { text } => self.name_type(arena, expr, text),
            NodeKind::MethodCall { name, .. } => self.method_return(name),
            NodeKind::FieldAccess { object, name } => {
                let object_ty = self.expr_type(arena, *object)?;
                self.types.get(&object_ty.name)?.field_types.get(name).cloned()
            }
            NodeKind::Index { object, .. } => {
                let object_ty = self.expr_type(arena, *object)?;
                object_ty.element()
            }
            NodeKind::LitStr(_) => Some(TypeRef::named("String")),
            NodeKind::LitInt(_) => Some(TypeRef::named("int")),
            NodeKind::LitBool(_) => Some(TypeRef::named("boolean")),
            _ => None,
        }
    }

    fn call_return_type(&self, arena: &Arena, call: NodeId) -> Option<TypeRef> {
        match arena.kind(call) {
            NodeKind::MethodCall { name, .. } => self.method_return(name),
            NodeKind::New { class, .. } => Some(class.clone()),
            _ => None,
        }
    }

    fn is_local_method(&self, name: &str) -> bool {
        self.types
            .values()
            .any(|facts| facts.methods.iter().any(|m| m == name))
    }

    fn supertypes_of(&self, type_name: &str) -> Vec<String> {
        self.types
            .get(type_name)
            .map(|facts| facts.interfaces.clone())
            .unwrap_or_default()
    }

    fn type_has_marker(&self, type_name: &str, marker: &str) -> bool {
        self.types
            .get(type_name)
            .is_some_and(|facts| facts.annotations.iter().any(|a| a == marker))
    }

    fn method_has_marker(&self, name: &str, marker: &str) -> bool {
        self.types.values().any(|facts| {
            facts
                .method_annotations
                .get(name)
                .is_some_and(|annotations| annotations.iter().any(|a| a == marker))
        })
    }

    fn type_declares_method(&self, type_name: &str, method: &str) -> bool {
        let Some(facts) = self.types.get(type_name) else {
            return false;
        };
        if facts.methods.iter().any(|m| m == method) {
            return true;
        }
        facts
            .interfaces
            .iter()
            .any(|parent| parent != type_name && self.type_declares_method(parent, method))
    }

    fn is_interface(&self, type_name: &str) -> bool {
        self.types
            .get(type_name)
            .is_some_and(|facts| facts.is_interface)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use recount_lang::parse;

    fn setup(source: &str) -> (Arena, ProgramResolver) {
        let arena = parse("t.src", source).unwrap();
        let resolver = ProgramResolver::from_arena(&arena);
        (arena, resolver)
    }

    fn find_name(arena: &Arena, name: &str) -> NodeId {
        arena
            .walk(arena.root())
            .into_iter()
            .find(|&id| matches!(arena.kind(id), NodeKind::Name { text } if text == name))
            .unwrap()
    }

    #[test]
    fn resolves_local_parameter_and_field_types() {
        let (arena, resolver) = setup(
            "class A { V slot; void run(W w) { X x = make(); use(x); use(w); use(slot); } }",
        );
        let x = find_name(&arena, "x");
        assert_eq!(resolver.expr_type(&arena, x).unwrap().name, "X");
        let w = find_name(&arena, "w");
        assert_eq!(resolver.expr_type(&arena, w).unwrap().name, "W");
        let slot = find_name(&arena, "slot");
        assert_eq!(resolver.expr_type(&arena, slot).unwrap().name, "V");
    }

    #[test]
    fn resolves_call_and_constructor_types() {
        let (arena, resolver) = setup("class A { V make() { return new V(); } void f() { use(make()); } }");
        let call = arena
            .walk(arena.root())
            .into_iter()
            .find(|&id| matches!(arena.kind(id), NodeKind::MethodCall { name, .. } if name == "make"))
            .unwrap();
        assert_eq!(resolver.call_return_type(&arena, call).unwrap().name, "V");
        let ctor = arena
            .walk(arena.root())
            .into_iter()
            .find(|&id| matches!(arena.kind(id), NodeKind::New { .. }))
            .unwrap();
        assert_eq!(resolver.expr_type(&arena, ctor).unwrap().name, "V");
    }

    #[test]
    fn markers_and_interfaces_are_visible() {
        let (_, resolver) = setup(
            "@RefCounted class V { @Consumes void put(V v) { } } interface Store { V get(); }",
        );
        assert!(resolver.type_has_marker("V", "RefCounted"));
        assert!(!resolver.type_has_marker("V", "Other"));
        assert!(resolver.method_has_marker("put", "Consumes"));
        assert!(resolver.is_interface("Store"));
        assert!(!resolver.is_interface("V"));
    }

    #[test]
    fn method_lookup_follows_declared_supertypes() {
        let (_, resolver) = setup(
            "interface RefCounted { void retain(); void release(); } \
             class V implements RefCounted { void retain() { } void release() { } } \
             class W implements RefCounted { }",
        );
        assert!(resolver.type_declares_method("V", "retain"));
        assert!(resolver.type_declares_method("W", "release"));
        assert!(!resolver.type_declares_method("V", "missing"));
        assert_eq!(resolver.supertypes_of("V"), vec!["RefCounted".to_string()]);
    }

    #[test]
    fn is_local_method_only_sees_program_declarations() {
        let (_, resolver) = setup("class A { void helper() { } }");
        assert!(resolver.is_local_method("helper"));
        assert!(!resolver.is_local_method("println"));
    }

    #[test]
    fn field_access_resolves_through_object_type() {
        let (arena, resolver) = setup(
            "class B { V inner; } class A { void f(B b) { use(b.inner); } }",
        );
        let access = arena
            .walk(arena.root())
            .into_iter()
            .find(|&id| matches!(arena.kind(id), NodeKind::FieldAccess { .. }))
            .unwrap();
        assert_eq!(resolver.expr_type(&arena, access).unwrap().name, "V");
    }
}
