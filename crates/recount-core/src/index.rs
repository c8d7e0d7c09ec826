//! Symbol index: definitions, definition nodes, and references per binding.
//!
//! The index is rebuilt per analysis scope and discarded when the pass
//! that requested it completes; it is never persisted across files. Node
//! handles are stored as plain copyable values (arena indices), never as
//! owning references, so a stale index can be dropped or rebuilt cheaply.
//!
//! Duplicate definitions are a recoverable condition: both locations are
//! logged and the newer entry overwrites the older one.

use std::collections::HashMap;

use tracing::warn;

use crate::binding::BindingId;
use crate::span::ContextLocation;

// ============================================================================
// SymbolIndex
// ============================================================================

/// Index of definitions and references, keyed by [`BindingId`].
///
/// Generic over the node handle type `H` so the core crate stays
/// language-agnostic; the engine instantiates it with its arena node id.
#[derive(Debug, Clone)]
pub struct SymbolIndex<H: Copy> {
    /// One definition location per binding.
    definitions: HashMap<BindingId, ContextLocation>,
    /// Arena handle of each definition node (back-reference only).
    definition_nodes: HashMap<BindingId, H>,
    /// All recorded references per binding, append-only.
    references: HashMap<BindingId, Vec<ContextLocation>>,
}

impl<H: Copy> Default for SymbolIndex<H> {
    fn default() -> Self {
        SymbolIndex {
            definitions: HashMap::new(),
            definition_nodes: HashMap::new(),
            references: HashMap::new(),
        }
    }
}

impl<H: Copy> SymbolIndex<H> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a definition.
    ///
    /// A second write for the same binding is a duplicate-declaration
    /// condition: logged, not fatal, newer entry wins.
    pub fn record_definition(&mut self, binding: BindingId, location: ContextLocation, node: H) {
        if let Some(previous) = self.definitions.get(&binding) {
            warn!(
                binding = %binding,
                previous = %previous.location,
                duplicate = %location.location,
                "duplicate definition; keeping newer entry"
            );
        }
        self.definitions.insert(binding.clone(), location);
        self.definition_nodes.insert(binding, node);
    }

    /// Record a reference to a binding.
    pub fn record_reference(&mut self, binding: BindingId, location: ContextLocation) {
        self.references.entry(binding).or_default().push(location);
    }

    /// Look up the definition location of a binding.
    pub fn definition(&self, binding: &BindingId) -> Option<&ContextLocation> {
        self.definitions.get(binding)
    }

    /// Look up the definition node handle of a binding.
    pub fn definition_node(&self, binding: &BindingId) -> Option<H> {
        self.definition_nodes.get(binding).copied()
    }

    /// Replace the node handle of an existing definition.
    ///
    /// Used by the alignment loop when node identities move to a freshly
    /// parsed tree.
    pub fn remap_definition_node(&mut self, binding: &BindingId, node: H) {
        if let Some(slot) = self.definition_nodes.get_mut(binding) {
            *slot = node;
        }
    }

    /// References recorded for a binding (empty slice if none).
    pub fn references(&self, binding: &BindingId) -> &[ContextLocation] {
        self.references.get(binding).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if the binding has a recorded definition.
    pub fn is_defined(&self, binding: &BindingId) -> bool {
        self.definitions.contains_key(binding)
    }

    /// All bindings with a recorded definition, in deterministic order.
    pub fn defined_bindings(&self) -> Vec<&BindingId> {
        let mut bindings: Vec<&BindingId> = self.definitions.keys().collect();
        bindings.sort();
        bindings
    }

    /// All bindings with at least one recorded reference, in deterministic order.
    pub fn referenced_bindings(&self) -> Vec<&BindingId> {
        let mut bindings: Vec<&BindingId> = self.references.keys().collect();
        bindings.sort();
        bindings
    }

    /// Number of recorded definitions.
    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    /// Total number of recorded references.
    pub fn reference_count(&self) -> usize {
        self.references.values().map(Vec::len).sum()
    }

    /// Merge another index into this one.
    ///
    /// Definitions from `other` overwrite (duplicate handling applies);
    /// references are appended.
    pub fn absorb(&mut self, other: SymbolIndex<H>) {
        for (binding, location) in other.definitions {
            let node = other.definition_nodes.get(&binding).copied();
            match node {
                Some(node) => self.record_definition(binding, location, node),
                None => {
                    self.definitions.insert(binding, location);
                }
            }
        }
        for (binding, mut locations) in other.references {
            self.references
                .entry(binding)
                .or_default()
                .append(&mut locations);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingKind;
    use crate::span::Span;

    fn loc(line: u32) -> ContextLocation {
        ContextLocation::bare(Span::from_coords("t.src", line, 1, line, 5))
    }

    fn binding(name: &str) -> BindingId {
        BindingId::new(format!("T::m()::{}", name), BindingKind::Variable)
    }

    mod definitions {
        use super::*;

        #[test]
        fn records_and_looks_up_definition() {
            let mut index: SymbolIndex<u32> = SymbolIndex::new();
            index.record_definition(binding("v"), loc(3), 7);
            assert!(index.is_defined(&binding("v")));
            assert_eq!(index.definition(&binding("v")).unwrap().location.start.line, 3);
            assert_eq!(index.definition_node(&binding("v")), Some(7));
        }

        #[test]
        fn duplicate_definition_keeps_newer() {
            let mut index: SymbolIndex<u32> = SymbolIndex::new();
            index.record_definition(binding("v"), loc(3), 7);
            index.record_definition(binding("v"), loc(9), 11);
            assert_eq!(index.definition(&binding("v")).unwrap().location.start.line, 9);
            assert_eq!(index.definition_node(&binding("v")), Some(11));
            assert_eq!(index.definition_count(), 1);
        }

        #[test]
        fn remap_updates_node_handle_only() {
            let mut index: SymbolIndex<u32> = SymbolIndex::new();
            index.record_definition(binding("v"), loc(3), 7);
            index.remap_definition_node(&binding("v"), 42);
            assert_eq!(index.definition_node(&binding("v")), Some(42));
            assert_eq!(index.definition(&binding("v")).unwrap().location.start.line, 3);
        }
    }

    mod references {
        use super::*;

        #[test]
        fn references_append_in_order() {
            let mut index: SymbolIndex<u32> = SymbolIndex::new();
            index.record_reference(binding("v"), loc(4));
            index.record_reference(binding("v"), loc(6));
            let refs = index.references(&binding("v"));
            assert_eq!(refs.len(), 2);
            assert_eq!(refs[0].location.start.line, 4);
            assert_eq!(refs[1].location.start.line, 6);
        }

        #[test]
        fn missing_binding_has_no_references() {
            let index: SymbolIndex<u32> = SymbolIndex::new();
            assert!(index.references(&binding("ghost")).is_empty());
        }
    }

    mod absorb {
        use super::*;

        #[test]
        fn absorb_merges_definitions_and_references() {
            let mut global: SymbolIndex<u32> = SymbolIndex::new();
            global.record_definition(binding("a"), loc(1), 1);
            global.record_reference(binding("a"), loc(2));

            let mut local: SymbolIndex<u32> = SymbolIndex::new();
            local.record_definition(binding("b"), loc(5), 5);
            local.record_reference(binding("a"), loc(6));

            global.absorb(local);
            assert!(global.is_defined(&binding("b")));
            assert_eq!(global.references(&binding("a")).len(), 2);
            assert_eq!(global.reference_count(), 2);
        }

        #[test]
        fn defined_bindings_are_sorted() {
            let mut index: SymbolIndex<u32> = SymbolIndex::new();
            index.record_definition(binding("z"), loc(1), 1);
            index.record_definition(binding("a"), loc(2), 2);
            let names: Vec<&str> = index.defined_bindings().iter().map(|b| b.leaf()).collect();
            assert_eq!(names, vec!["a", "z"]);
        }
    }
}
