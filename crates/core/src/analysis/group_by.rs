//! Rolling a call graph up to a coarser grouping level.

use std::collections::HashMap;

use crate::callstack::Grouping;
use crate::model::{CallGraph, ElementId, GraphElement};

/// Name of the single element of a graph grouped with [`Grouping::All`].
pub const ALL_ELEMENT: &str = "All";

/// A new call graph where the forests of elements deeper than `grouping` are
/// merged into their ancestor at that level. Elements down to that level
/// keep their id, name and parent. `graph` is left untouched.
pub fn group_call_graph_by(grouping: Grouping, graph: &CallGraph) -> CallGraph {
    let grouped = CallGraph::new();
    match grouping {
        Grouping::All => {
            let all = ElementId(0);
            grouped.register_element(GraphElement {
                id: all,
                name: ALL_ELEMENT.into(),
                parent: None,
                level: 0,
            });
            for tree in graph.merged_roots() {
                grouped.add_aggregated_call_site(all, tree);
            }
        }
        Grouping::Level(level) => {
            let elements = graph.all_elements();
            let by_id: HashMap<ElementId, &GraphElement> = elements.iter().map(|e| (e.id, e)).collect();
            for element in elements.iter().filter(|e| e.level <= level) {
                grouped.register_element(element.clone());
            }
            for element in graph.elements_with_trees() {
                let target = ancestor_at(&by_id, &element, level);
                grouped.register_element(target.clone());
                for tree in graph.calling_context_tree(element.id) {
                    grouped.add_aggregated_call_site(target.id, tree);
                }
            }
        }
    }
    grouped
}

// Falls back to the deepest known ancestor when the chain is broken.
fn ancestor_at<'a>(
    by_id: &HashMap<ElementId, &'a GraphElement>,
    element: &'a GraphElement,
    level: usize,
) -> &'a GraphElement {
    let mut current = element;
    while current.level > level {
        match current.parent.and_then(|p| by_id.get(&p)) {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current
}
