//! Conversion of engine trees into the serializable snapshot types of
//! `callgraph-protocol`, with symbols resolved to labels.

use callgraph_protocol::{DiffSnapshot, ElementSnapshot, ExtraDataSnapshot, TreeSnapshot};

use crate::diff::DifferentialWeightedTree;
use crate::model::{AggregatedCalledFunction, CallGraph, EXTRA_DATA_SETS, Symbol, SymbolProvider, WeightedTree};

/// Snapshot of an aggregated call site and its callees, heaviest first.
/// Non-empty extra data sets are carried along in index order.
pub fn function_snapshot(function: &AggregatedCalledFunction, symbols: &[&dyn SymbolProvider]) -> TreeSnapshot {
    TreeSnapshot {
        label: function.object().resolve(symbols).into(),
        weight: function.duration(),
        self_time: Some(function.self_time()),
        cpu_time: function.cpu_time(),
        calls: Some(function.call_count()),
        children: function
            .sorted_children()
            .into_iter()
            .map(|child| function_snapshot(child, symbols))
            .collect(),
        extra: extra_data(function, symbols),
    }
}

fn extra_data(function: &AggregatedCalledFunction, symbols: &[&dyn SymbolProvider]) -> Vec<ExtraDataSnapshot> {
    EXTRA_DATA_SETS
        .iter()
        .enumerate()
        .filter_map(|(index, name)| {
            let mut trees = function.extra_data_trees(index);
            if trees.is_empty() {
                return None;
            }
            trees.sort_by(|a, b| b.cmp_by_weight(a).then_with(|| a.object().cmp(b.object())));
            Some(ExtraDataSnapshot {
                name: (*name).into(),
                trees: trees.iter().map(|tree| plain_snapshot(tree, symbols)).collect(),
            })
        })
        .collect()
}

/// Snapshot of a plain weighted tree, such as a sampled or kernel status tree.
pub fn plain_snapshot(tree: &WeightedTree<Symbol>, symbols: &[&dyn SymbolProvider]) -> TreeSnapshot {
    TreeSnapshot {
        label: tree.object().resolve(symbols).into(),
        weight: tree.weight(),
        self_time: None,
        cpu_time: None,
        calls: None,
        children: tree
            .sorted_children()
            .into_iter()
            .map(|child| plain_snapshot(child, symbols))
            .collect(),
        extra: Vec::new(),
    }
}

/// One snapshot per element of `graph` that owns a forest.
pub fn element_snapshots(graph: &CallGraph, symbols: &[&dyn SymbolProvider]) -> Vec<ElementSnapshot> {
    graph
        .elements_with_trees()
        .into_iter()
        .map(|element| ElementSnapshot {
            roots: graph
                .calling_context_tree(element.id)
                .iter()
                .map(|root| function_snapshot(root, symbols))
                .collect(),
            name: element.name,
        })
        .collect()
}

pub fn diff_snapshot(tree: &DifferentialWeightedTree<Symbol>, symbols: &[&dyn SymbolProvider]) -> DiffSnapshot {
    DiffSnapshot {
        label: tree.object.resolve(symbols).into(),
        weight: tree.weight,
        diff: tree.has_counterpart().then_some(tree.diff_weight),
        children: tree.children.iter().map(|child| diff_snapshot(child, symbols)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff_trees;
    use crate::model::{
        CalledFunction, ElementId, GraphElement, MapSymbolProvider, ProcessStatus, ProcessStatusInterval,
    };

    #[test]
    fn function_snapshot_resolves_addresses() {
        let mut call = CalledFunction::new(0, 10, 1, Symbol::Address(0x10), 1, 1);
        let callee = CalledFunction::new(2, 6, 2, Symbol::name("leaf"), 1, 1);
        call.add_child(&callee);
        let mut root = AggregatedCalledFunction::for_symbol(Symbol::Address(0x10));
        root.add_callee(&callee, AggregatedCalledFunction::for_symbol(Symbol::name("leaf")));
        root.add_function_call(&call);

        let mut provider = MapSymbolProvider::new();
        provider.insert(0x10, "main");
        let snapshot = function_snapshot(&root, &[&provider]);
        assert_eq!(snapshot.label, "main");
        assert_eq!((snapshot.weight, snapshot.self_time, snapshot.calls), (10, Some(6), Some(1)));
        assert_eq!(snapshot.children[0].label, "leaf");
        assert_eq!(snapshot.node_count(), 2);

        assert_eq!(function_snapshot(&root, &[]).label, "0x10");
    }

    #[test]
    fn element_snapshots_skip_empty_elements() {
        let graph = CallGraph::new();
        for (id, name) in [(0, "1"), (1, "2")] {
            graph.register_element(GraphElement {
                id: ElementId(id),
                name: name.into(),
                parent: None,
                level: 0,
            });
        }
        graph.add_aggregated_call_site(ElementId(1), AggregatedCalledFunction::for_symbol(Symbol::name("a")));
        let snapshots = element_snapshots(&graph, &[]);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].name, "2");
    }

    #[test]
    fn unmatched_diff_nodes_have_no_ratio() {
        let first: WeightedTree<Symbol> = WeightedTree::with_weight(Symbol::name("x"), 100);
        let mut second: WeightedTree<Symbol> = WeightedTree::with_weight(Symbol::name("x"), 150);
        second.add_child(WeightedTree::with_weight(Symbol::name("y"), 10));
        let diff = diff_trees(&[&first], &[&second]);
        let snapshot = diff_snapshot(&diff[0], &[]);
        assert_eq!(snapshot.diff, Some(0.5));
        assert_eq!(snapshot.children[0].diff, None);
        assert!(plain_snapshot(&second, &[]).calls.is_none());
    }

    #[test]
    fn extra_data_sets_are_carried_in_index_order() {
        let mut root = AggregatedCalledFunction::for_symbol(Symbol::name("main"));
        root.add_function_call(&CalledFunction::new(0, 10, 1, Symbol::name("main"), 1, 1));
        root.add_kernel_status(&ProcessStatusInterval::new(0, 4, ProcessStatus::WaitBlocked));
        root.add_kernel_status(&ProcessStatusInterval::new(4, 10, ProcessStatus::Run));
        root.add_sampled_tree(WeightedTree::with_weight(Symbol::Address(0x10), 2));

        let mut provider = MapSymbolProvider::new();
        provider.insert(0x10, "memcpy");
        let snapshot = function_snapshot(&root, &[&provider]);
        let names: Vec<_> = snapshot.extra.iter().map(|set| set.name.to_string()).collect();
        assert_eq!(names, EXTRA_DATA_SETS);
        let statuses = &snapshot.extra[0].trees;
        assert_eq!((statuses[0].label.as_str(), statuses[0].weight), ("Running", 6));
        assert_eq!(statuses[1].weight, 4);
        assert_eq!(snapshot.extra[1].trees[0].label, "memcpy");

        let bare = AggregatedCalledFunction::for_symbol(Symbol::name("main"));
        assert!(function_snapshot(&bare, &[]).extra.is_empty());
    }
}
