//! Differential comparison of weighted-tree forests.
//!
//! A diff walks the *compared* forest and looks up each node's counterpart,
//! by symbol, among the siblings of the *baseline* forest. Every node of the
//! compared forest appears in the result, matched or not; baseline nodes with
//! no counterpart do not.

use std::fmt;
use std::hash::Hash;

use crate::model::{AggregatedCalledFunction, CallGraph, GraphElement, Symbol, TreeData, WeightedTree};

/// One node of a differential tree.
#[derive(Debug)]
pub struct DifferentialWeightedTree<T> {
    pub object: T,
    /// Weight of the compared node.
    pub weight: i64,
    /// `(weight - baseline) / baseline`, NaN when the node has no baseline.
    pub diff_weight: f64,
    pub children: Vec<DifferentialWeightedTree<T>>,
}

impl<T> DifferentialWeightedTree<T> {
    pub fn has_counterpart(&self) -> bool {
        !self.diff_weight.is_nan()
    }

    /// Pre-order walk over this node and its descendants.
    pub fn iter(&self) -> impl Iterator<Item = &DifferentialWeightedTree<T>> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

impl<T> Drop for DifferentialWeightedTree<T> {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Quantity compared by [`diff_trees_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffMetric {
    #[default]
    Weight,
    Duration,
    SelfTime,
}

impl DiffMetric {
    fn value(self, function: &AggregatedCalledFunction) -> i64 {
        match self {
            Self::Weight => function.weight(),
            Self::Duration => function.duration(),
            Self::SelfTime => function.self_time(),
        }
    }
}

/// Diff `second` against the baseline `first`, comparing node weights.
pub fn diff_trees<T, D>(first: &[&WeightedTree<T, D>], second: &[&WeightedTree<T, D>]) -> Vec<DifferentialWeightedTree<T>>
where
    T: Clone + Eq + Hash + fmt::Debug,
    D: TreeData,
{
    diff_with(first, second, &WeightedTree::<T, D>::weight, &|base, other| {
        (base - other) as f64 / other as f64
    })
}

/// Diff two forests of aggregated functions on `metric`. A zero baseline
/// yields NaN, like a missing one.
pub fn diff_trees_by(
    first: &[&AggregatedCalledFunction],
    second: &[&AggregatedCalledFunction],
    metric: DiffMetric,
) -> Vec<DifferentialWeightedTree<Symbol>> {
    diff_with(first, second, &|f: &AggregatedCalledFunction| metric.value(f), &|base, other| {
        if other == 0 {
            f64::NAN
        } else {
            (base - other) as f64 / other as f64
        }
    })
}

// Built level by level: each compared node is emitted, then its children
// are queued with the children of its baseline counterpart.
fn diff_with<'a, T, D>(
    first: &[&'a WeightedTree<T, D>],
    second: &[&'a WeightedTree<T, D>],
    value: &dyn Fn(&WeightedTree<T, D>) -> i64,
    ratio: &dyn Fn(i64, i64) -> f64,
) -> Vec<DifferentialWeightedTree<T>>
where
    T: Clone + Eq + Hash + fmt::Debug,
    D: TreeData,
{
    let mut forest = Vec::new();
    let mut work = vec![(&mut forest, first.to_vec(), second.to_vec())];
    while let Some((out, baseline, compared)) = work.pop() {
        let mut levels = Vec::with_capacity(compared.len());
        for &node in &compared {
            let counterpart = baseline.iter().find(|o| o.object() == node.object()).copied();
            out.push(DifferentialWeightedTree {
                object: node.object().clone(),
                weight: value(node),
                diff_weight: counterpart.map_or(f64::NAN, |o| ratio(value(node), value(o))),
                children: Vec::new(),
            });
            levels.push((
                counterpart.map(WeightedTree::sorted_children).unwrap_or_default(),
                node.sorted_children(),
            ));
        }
        for (tree, (baseline, compared)) in out.iter_mut().zip(levels) {
            work.push((&mut tree.children, baseline, compared));
        }
    }
    forest
}

/// The differential forest of one pair of elements.
#[derive(Debug)]
pub struct ElementDiff {
    /// Element of the compared graph.
    pub element: GraphElement,
    /// Element of the baseline graph it was paired with.
    pub baseline: GraphElement,
    pub trees: Vec<DifferentialWeightedTree<Symbol>>,
}

/// Diff the forests of `second` against those of the baseline `first`,
/// element by element.
///
/// When each graph has a single element owning trees, the two are paired
/// whatever their names, as for two runs of the same program. Otherwise
/// elements equal on both sides (same id and name) are paired, and only if
/// there are none, elements are paired by name. Elements left unpaired are
/// not reported.
pub fn diff_call_graphs(first: &CallGraph, second: &CallGraph, metric: DiffMetric) -> Vec<ElementDiff> {
    pair_elements(&first.elements_with_trees(), &second.elements_with_trees())
        .into_iter()
        .map(|(baseline, element)| {
            let baseline_trees = first.calling_context_tree(baseline.id);
            let compared_trees = second.calling_context_tree(element.id);
            let baseline_trees: Vec<_> = baseline_trees.iter().collect();
            let compared_trees: Vec<_> = compared_trees.iter().collect();
            ElementDiff {
                trees: diff_trees_by(&baseline_trees, &compared_trees, metric),
                element,
                baseline,
            }
        })
        .collect()
}

fn pair_elements(first: &[GraphElement], second: &[GraphElement]) -> Vec<(GraphElement, GraphElement)> {
    if let ([baseline], [compared]) = (first, second) {
        return vec![(baseline.clone(), compared.clone())];
    }
    let equal = pair_on(first, second, |a, b| a == b);
    if !equal.is_empty() {
        return equal;
    }
    pair_on(first, second, |a, b| a.name == b.name)
}

fn pair_on<F>(first: &[GraphElement], second: &[GraphElement], same: F) -> Vec<(GraphElement, GraphElement)>
where
    F: Fn(&GraphElement, &GraphElement) -> bool,
{
    second
        .iter()
        .filter_map(|compared| {
            first
                .iter()
                .find(|baseline| same(baseline, compared))
                .map(|baseline| (baseline.clone(), compared.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CalledFunction, ElementId};

    type Tree = WeightedTree<&'static str>;

    fn tree(name: &'static str, weight: i64, children: Vec<Tree>) -> Tree {
        let mut node = Tree::with_weight(name, weight);
        for child in children {
            node.add_child(child);
        }
        node
    }

    #[test]
    fn baseline_100_compared_150_is_half() {
        let first = tree("X", 100, vec![]);
        let second = tree("X", 150, vec![]);
        let diff = diff_trees(&[&first], &[&second]);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].weight, 150);
        assert!((diff[0].diff_weight - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn identical_forests_diff_to_zero() {
        let x = tree("A", 10, vec![tree("B", 6, vec![tree("C", 2, vec![])]), tree("D", 3, vec![])]);
        let y = tree("E", 4, vec![]);
        let diff = diff_trees(&[&x, &y], &[&x, &y]);
        let nodes: Vec<_> = diff.iter().flat_map(DifferentialWeightedTree::iter).collect();
        assert_eq!(nodes.len(), 5);
        assert!(nodes.iter().all(|n| n.diff_weight == 0.0));
    }

    #[test]
    fn missing_counterparts_are_nan() {
        let first = tree("A", 10, vec![tree("B", 5, vec![])]);
        let second = tree("A", 20, vec![tree("B", 5, vec![]), tree("C", 5, vec![])]);
        let diff = diff_trees(&[&first], &[&second]);
        assert!((diff[0].diff_weight - 1.0).abs() < f64::EPSILON);
        let c = diff[0].children.iter().find(|c| c.object == "C").unwrap();
        assert!(!c.has_counterpart());
        let b = diff[0].children.iter().find(|c| c.object == "B").unwrap();
        assert!(b.has_counterpart());

        // Nodes only present on the baseline side are not reported.
        let reverse = diff_trees(&[&second], &[&first]);
        assert_eq!(reverse[0].children.len(), 1);
        assert!(diff_trees(&[&first], &[]).is_empty());
    }

    fn function(name: &str, start: i64, end: i64, callee: Option<(&str, i64, i64)>) -> AggregatedCalledFunction {
        let mut call = CalledFunction::new(start, end, 1, Symbol::name(name), 1, 1);
        let mut aggregate = AggregatedCalledFunction::for_symbol(Symbol::name(name));
        if let Some((callee, s, e)) = callee {
            let child_call = CalledFunction::new(s, e, 2, Symbol::name(callee), 1, 1);
            call.add_child(&child_call);
            aggregate.add_callee(&child_call, AggregatedCalledFunction::for_symbol(Symbol::name(callee)));
        }
        aggregate.add_function_call(&call);
        aggregate
    }

    #[test]
    fn self_time_metric_and_zero_baseline() {
        let first = function("main", 0, 100, Some(("work", 10, 60)));
        let second = function("main", 0, 100, Some(("work", 10, 30)));
        let diff = diff_trees_by(&[&first], &[&second], DiffMetric::SelfTime);
        // Self time went from 50 to 80.
        assert_eq!(diff[0].weight, 80);
        assert!((diff[0].diff_weight - 0.6).abs() < 1e-9);
        let by_duration = diff_trees_by(&[&first], &[&second], DiffMetric::Duration);
        assert!(by_duration[0].diff_weight.abs() < f64::EPSILON);

        let empty = function("main", 0, 0, None);
        let diff = diff_trees_by(&[&empty], &[&second], DiffMetric::Duration);
        assert!(diff[0].diff_weight.is_nan());
    }

    fn element(id: u32, name: &str) -> GraphElement {
        GraphElement {
            id: ElementId(id),
            name: name.into(),
            parent: None,
            level: 0,
        }
    }

    fn graph(elements: &[(u32, &str, AggregatedCalledFunction)]) -> CallGraph {
        let graph = CallGraph::new();
        for (id, name, root) in elements {
            graph.register_element(element(*id, name));
            graph.add_aggregated_call_site(ElementId(*id), root.copy_of());
        }
        graph
    }

    #[test]
    fn single_threads_of_two_runs_are_paired() {
        let first = graph(&[(1, "101", function("main", 0, 100, None))]);
        let second = graph(&[(7, "201", function("main", 0, 150, None))]);
        let diffs = diff_call_graphs(&first, &second, DiffMetric::Duration);
        assert_eq!(diffs.len(), 1);
        assert_eq!(&*diffs[0].baseline.name, "101");
        assert_eq!(&*diffs[0].element.name, "201");
        assert!((diffs[0].trees[0].diff_weight - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn equal_elements_take_precedence_over_names() {
        let first = graph(&[
            (0, "worker", function("main", 0, 100, None)),
            (1, "io", function("poll", 0, 10, None)),
        ]);
        let second = graph(&[
            (0, "worker", function("main", 0, 150, None)),
            (5, "io", function("poll", 0, 20, None)),
        ]);
        let diffs = diff_call_graphs(&first, &second, DiffMetric::Duration);
        // "io" changed id, so only "worker" pairs as an equal element.
        assert_eq!(diffs.len(), 1);
        assert_eq!(&*diffs[0].element.name, "worker");
        assert!((diffs[0].trees[0].diff_weight - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn elements_pair_by_name_when_ids_differ() {
        let first = graph(&[
            (0, "worker", function("main", 0, 100, None)),
            (1, "io", function("poll", 0, 10, None)),
        ]);
        let second = graph(&[
            (4, "gc", function("sweep", 0, 5, None)),
            (5, "io", function("poll", 0, 20, None)),
            (6, "worker", function("main", 0, 150, None)),
        ]);
        let diffs = diff_call_graphs(&first, &second, DiffMetric::Duration);
        assert_eq!(diffs.len(), 2);
        let worker = diffs.iter().find(|d| &*d.element.name == "worker").unwrap();
        assert_eq!(worker.baseline.id, ElementId(0));
        assert!((worker.trees[0].diff_weight - 0.5).abs() < f64::EPSILON);
        let io = diffs.iter().find(|d| &*d.element.name == "io").unwrap();
        assert!((io.trees[0].diff_weight - 1.0).abs() < f64::EPSILON);
        assert!(diffs.iter().all(|d| &*d.element.name != "gc"));
    }

    #[test]
    fn deep_trees_are_diffed_without_recursion() {
        let depth = 50_000;
        let mut chain = Tree::with_weight("r", 1);
        for _ in 1..depth {
            let mut parent = Tree::with_weight("r", 1);
            parent.add_child(chain);
            chain = parent;
        }
        let diff = diff_trees(&[&chain], &[&chain]);
        assert_eq!(diff[0].iter().count(), depth);
    }
}
