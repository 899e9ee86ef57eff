//! Weighted-tree aggregation and call-graph construction.
//!
//! Call/return events are recorded into a [`statesystem`] as one attribute per
//! stack depth. [`analysis::CallGraphAnalysis`] walks those call stacks depth
//! first and aggregates every call into [`model::AggregatedCalledFunction`]
//! trees, published per grouping element in a [`model::CallGraph`]. Consumers
//! read snapshots of that graph, regroup it ([`analysis::group_by`]), compare
//! two graphs ([`diff`]) or flatten it into tables ([`views`]).

pub mod analysis;
pub mod callstack;
pub mod diff;
pub mod model;
pub mod statesystem;
pub mod views;
