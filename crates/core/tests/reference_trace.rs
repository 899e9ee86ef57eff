//! Integration test: load the four-thread reference trace from JSON, build
//! its call graph and check the aggregated trees at every grouping level.

use std::sync::Arc;

use callgraph_core::analysis::{ALL_ELEMENT, AnalysisMonitor, CallGraphAnalysis, group_call_graph_by};
use callgraph_core::callstack::{CallStackStateProvider, Grouping, load_events};
use callgraph_core::diff::{DiffMetric, DifferentialWeightedTree, diff_call_graphs};
use callgraph_core::model::{AggregatedCalledFunction, CallGraph, GraphElement, Symbol};
use callgraph_core::views::{RankedSort, element_snapshots, ranked_entries};

fn analysis() -> CallGraphAnalysis {
    let json = include_str!("fixtures/reference_trace.json");
    let events = load_events(json.as_bytes()).unwrap();
    let state_system = CallStackStateProvider::build(&events).unwrap();
    let series = CallStackStateProvider::series(state_system).unwrap();
    CallGraphAnalysis::new(vec![series])
}

fn executed() -> (CallGraphAnalysis, Arc<CallGraph>) {
    let analysis = analysis();
    assert!(analysis.execute(&AnalysisMonitor::new()).is_complete());
    let graph = analysis.call_graph();
    (analysis, graph)
}

fn named(elements: &[GraphElement], name: &str) -> GraphElement {
    elements.iter().find(|e| &*e.name == name).cloned().unwrap()
}

fn root<'a>(forest: &'a [AggregatedCalledFunction], name: &str) -> &'a AggregatedCalledFunction {
    forest.iter().find(|t| *t.object() == Symbol::name(name)).unwrap()
}

/// Follow `path` down from a root and return (duration, self time).
fn at(forest: &[AggregatedCalledFunction], path: &[&str]) -> (i64, i64) {
    let mut node = root(forest, path[0]);
    for name in &path[1..] {
        node = node.child(&Symbol::name(name)).unwrap();
    }
    (node.duration(), node.self_time())
}

fn assert_consistent(forest: &[AggregatedCalledFunction]) {
    for tree in forest {
        for (_, node) in tree.iter_depth_first() {
            assert!(node.children_weight() <= node.weight());
            assert_eq!(node.self_time(), node.duration() - node.children_weight());
        }
    }
}

#[test]
fn group_by_all() {
    let (_, graph) = executed();
    let grouped = group_call_graph_by(Grouping::All, &graph);
    let elements = grouped.elements();
    assert_eq!(elements.len(), 1);
    assert_eq!(&*elements[0].name, ALL_ELEMENT);

    let forest = grouped.calling_context_tree(elements[0].id);
    assert_eq!(forest.len(), 4);
    assert_consistent(&forest);
    assert_eq!(at(&forest, &["op1"]), (28, 8));
    assert_eq!(root(&forest, "op1").call_count(), 2);
    assert_eq!(at(&forest, &["op1", "op2"]), (7, 5));
    assert_eq!(at(&forest, &["op1", "op2", "op3"]), (2, 2));
    assert_eq!(at(&forest, &["op1", "op3"]), (5, 3));
    assert_eq!(at(&forest, &["op1", "op3", "op1"]), (2, 2));
    assert_eq!(at(&forest, &["op1", "op4"]), (8, 8));
    assert_eq!(at(&forest, &["op4"]), (8, 8));
    assert_eq!(at(&forest, &["op2"]), (17, 10));
    assert_eq!(at(&forest, &["op2", "op3"]), (1, 1));
    assert_eq!(at(&forest, &["op2", "op2"]), (6, 6));
    assert_eq!(at(&forest, &["op5"]), (19, 7));
    assert_eq!(at(&forest, &["op5", "op2"]), (12, 11));
    assert_eq!(at(&forest, &["op5", "op2", "op3"]), (1, 1));
}

#[test]
fn group_by_process() {
    let (analysis, graph) = executed();
    let descriptors = analysis.group_descriptors();
    let processes = descriptors[0].find("Processes").unwrap();
    let grouped = group_call_graph_by(processes.into(), &graph);

    let elements = grouped.elements();
    assert_eq!(elements.len(), 2);
    for element in &elements {
        assert!(grouped.children_of(element.id).is_empty());
    }

    let process1 = grouped.calling_context_tree(named(&elements, "1").id);
    assert_eq!(process1.len(), 3);
    assert_consistent(&process1);
    assert_eq!(at(&process1, &["op1"]), (9, 5));
    assert_eq!(at(&process1, &["op1", "op2"]), (4, 3));
    assert_eq!(at(&process1, &["op1", "op2", "op3"]), (1, 1));
    assert_eq!(at(&process1, &["op4"]), (8, 8));
    assert_eq!(at(&process1, &["op2"]), (17, 10));
    assert_eq!(at(&process1, &["op2", "op3"]), (1, 1));
    assert_eq!(at(&process1, &["op2", "op2"]), (6, 6));

    let process5 = grouped.calling_context_tree(named(&elements, "5").id);
    assert_eq!(process5.len(), 2);
    assert_consistent(&process5);
    assert_eq!(at(&process5, &["op1"]), (19, 3));
    assert_eq!(at(&process5, &["op1", "op3"]), (5, 3));
    assert_eq!(at(&process5, &["op1", "op3", "op1"]), (2, 2));
    assert_eq!(at(&process5, &["op1", "op2"]), (3, 2));
    assert_eq!(at(&process5, &["op1", "op2", "op3"]), (1, 1));
    assert_eq!(at(&process5, &["op1", "op4"]), (8, 8));
    assert_eq!(at(&process5, &["op5"]), (19, 7));
    assert_eq!(at(&process5, &["op5", "op2"]), (12, 11));
    assert_eq!(at(&process5, &["op5", "op2", "op3"]), (1, 1));
}

#[test]
fn group_by_thread() {
    let (analysis, graph) = executed();
    let threads = analysis.group_descriptors()[0].leaf().grouping();
    let grouped = group_call_graph_by(threads, &graph);

    let processes = grouped.elements();
    assert_eq!(processes.len(), 2);
    for process in &processes {
        assert_eq!(grouped.children_of(process.id).len(), 2);
        assert!(grouped.calling_context_tree(process.id).is_empty());
    }

    let threads = grouped.all_elements();
    let thread = |name: &str| grouped.calling_context_tree(named(&threads, name).id);

    let thread2 = thread("2");
    assert_eq!(thread2.len(), 2);
    assert_eq!(at(&thread2, &["op1"]), (9, 5));
    assert_eq!(at(&thread2, &["op1", "op2"]), (4, 3));
    assert_eq!(at(&thread2, &["op1", "op2", "op3"]), (1, 1));
    assert_eq!(at(&thread2, &["op4"]), (8, 8));

    let thread3 = thread("3");
    assert_eq!(thread3.len(), 1);
    assert_eq!(at(&thread3, &["op2"]), (17, 10));
    assert_eq!(at(&thread3, &["op2", "op3"]), (1, 1));
    assert_eq!(at(&thread3, &["op2", "op2"]), (6, 6));

    let thread6 = thread("6");
    assert_eq!(thread6.len(), 1);
    assert_eq!(at(&thread6, &["op1"]), (19, 3));
    assert_eq!(root(&thread6, "op1").child_count(), 3);

    let thread7 = thread("7");
    assert_eq!(thread7.len(), 1);
    assert_eq!(at(&thread7, &["op5"]), (19, 7));
    assert_eq!(at(&thread7, &["op5", "op2", "op3"]), (1, 1));
}

#[test]
fn windowed_graph_clips_calls() {
    let analysis = analysis();
    let window = analysis.call_graph_for_range(12, 20).unwrap();
    let forest = window.merged_roots();
    assert_consistent(&forest);
    assert_eq!(at(&forest, &["op4"]), (8, 8));
    assert_eq!(at(&forest, &["op1"]), (8, 0));
    assert_eq!(at(&forest, &["op1", "op4"]), (8, 8));
    assert_eq!(at(&forest, &["op2"]), (8, 7));
    assert_eq!(at(&forest, &["op2", "op2"]), (1, 1));
    assert_eq!(at(&forest, &["op5"]), (8, 6));
    assert_eq!(at(&forest, &["op5", "op2"]), (2, 2));
    // The whole-trace graph was never built.
    assert!(analysis.call_graph().is_empty());
}

#[test]
fn graph_diffed_with_itself_is_unchanged() {
    let (_, graph) = executed();
    let diffs = diff_call_graphs(&graph, &graph, DiffMetric::Duration);
    assert_eq!(diffs.len(), 4);
    for diff in &diffs {
        assert_eq!(diff.baseline, diff.element);
        let nodes: Vec<_> = diff.trees.iter().flat_map(DifferentialWeightedTree::iter).collect();
        assert!(!nodes.is_empty());
        assert!(nodes.iter().all(|n| n.diff_weight.abs() < f64::EPSILON));
    }
}

#[test]
fn views_of_the_whole_trace() {
    let (_, graph) = executed();
    let ranked = ranked_entries(&graph.merged_roots(), RankedSort::TotalTime, false);
    let op1 = ranked.iter().find(|e| e.symbol == Symbol::name("op1")).unwrap();
    // op1 nested in op3 nested in op1 only counts once towards total time.
    assert_eq!((op1.total_time, op1.self_time, op1.count), (28, 10, 3));

    let snapshots = element_snapshots(&graph, &[]);
    assert_eq!(snapshots.len(), 4);
    let json = serde_json::to_string(&snapshots).unwrap();
    assert!(json.contains(r#""label":"op5""#));
}

#[test]
fn readers_see_a_growing_graph_during_execution() {
    let analysis = analysis();
    std::thread::scope(|scope| {
        scope.spawn(|| analysis.execute(&AnalysisMonitor::new()));
        scope.spawn(|| {
            for _ in 0..100 {
                let graph = analysis.call_graph();
                for root in graph.merged_roots() {
                    assert!(root.children_weight() <= root.weight());
                }
            }
        });
    });
    assert_eq!(analysis.call_graph().merged_roots().len(), 4);
}
