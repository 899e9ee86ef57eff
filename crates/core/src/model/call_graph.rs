use std::collections::HashMap;

use callgraph_protocol::SharedStr;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{AggregatedCalledFunction, Symbol};

/// Identifier of a grouping element (process, thread, ...) within a call graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u32);

/// A grouping element as known by a call graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphElement {
    pub id: ElementId,
    pub name: SharedStr,
    pub parent: Option<ElementId>,
    /// Level in the grouping hierarchy, 0 for top-level elements.
    pub level: usize,
}

#[derive(Debug, Default)]
struct Forests {
    elements: Vec<GraphElement>,
    trees: HashMap<ElementId, HashMap<Symbol, AggregatedCalledFunction>>,
}

/// Call-graph roots observed for each grouping element.
///
/// Trees are built privately by the analysis and only published here, one
/// complete root at a time, under the write lock. Readers get copies taken
/// under the read lock: they may see a graph that is still growing but never
/// a node that is halfway through a merge.
#[derive(Debug, Default)]
pub struct CallGraph {
    inner: RwLock<Forests>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an element known to this graph. Registering the same id twice
    /// keeps the first registration.
    pub fn register_element(&self, element: GraphElement) {
        let mut inner = self.inner.write();
        if inner.elements.iter().all(|e| e.id != element.id) {
            inner.elements.push(element);
        }
    }

    /// Add a root-level tree to the forest of `element`, merging it with an
    /// existing root of the same symbol.
    pub fn add_aggregated_call_site(&self, element: ElementId, tree: AggregatedCalledFunction) {
        let mut inner = self.inner.write();
        let roots = inner.trees.entry(element).or_default();
        match roots.get_mut(tree.object()) {
            Some(existing) => existing.absorb(tree),
            None => {
                roots.insert(tree.object().clone(), tree);
            }
        }
    }

    /// Copy of the root forest of `element`, heaviest root first.
    pub fn calling_context_tree(&self, element: ElementId) -> Vec<AggregatedCalledFunction> {
        let inner = self.inner.read();
        let mut roots: Vec<_> = inner
            .trees
            .get(&element)
            .map(|roots| roots.values().cloned().collect())
            .unwrap_or_default();
        roots.sort_by(|a, b| b.cmp_by_weight(a));
        roots
    }

    /// Every registered element, in registration order.
    pub fn all_elements(&self) -> Vec<GraphElement> {
        self.inner.read().elements.clone()
    }

    pub fn element(&self, id: ElementId) -> Option<GraphElement> {
        self.inner.read().elements.iter().find(|e| e.id == id).cloned()
    }

    /// Top-level elements; descendants are reached through [`Self::children_of`].
    pub fn elements(&self) -> Vec<GraphElement> {
        self.inner
            .read()
            .elements
            .iter()
            .filter(|e| e.parent.is_none())
            .cloned()
            .collect()
    }

    pub fn children_of(&self, id: ElementId) -> Vec<GraphElement> {
        self.inner
            .read()
            .elements
            .iter()
            .filter(|e| e.parent == Some(id))
            .cloned()
            .collect()
    }

    /// Elements that actually own a forest.
    pub fn elements_with_trees(&self) -> Vec<GraphElement> {
        let inner = self.inner.read();
        inner
            .elements
            .iter()
            .filter(|e| inner.trees.get(&e.id).is_some_and(|t| !t.is_empty()))
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().trees.values().all(HashMap::is_empty)
    }

    /// All forests merged into one, regardless of element.
    pub fn merged_roots(&self) -> Vec<AggregatedCalledFunction> {
        let inner = self.inner.read();
        let mut merged: HashMap<Symbol, AggregatedCalledFunction> = HashMap::new();
        for tree in inner.trees.values().flat_map(HashMap::values) {
            match merged.get_mut(tree.object()) {
                Some(existing) => existing.absorb(tree.copy_of()),
                None => {
                    merged.insert(tree.object().clone(), tree.copy_of());
                }
            }
        }
        let mut roots: Vec<_> = merged.into_values().collect();
        roots.sort_by(|a, b| b.cmp_by_weight(a));
        roots
    }
}
