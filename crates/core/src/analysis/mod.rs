//! Call-graph construction from call stack series.

mod builder;
pub mod group_by;

pub use group_by::{ALL_ELEMENT, group_call_graph_by};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::callstack::{CallStackSeries, GroupDescriptor, HostModel, NullHostModel, SamplingSource};
use crate::model::CallGraph;
use builder::Traversal;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("invalid time range [{start}, {end}]")]
    InvalidRange { start: i64, end: i64 },
}

/// Cooperative cancellation token shared between an analysis run and whoever
/// may want to stop it.
#[derive(Debug, Clone, Default)]
pub struct AnalysisMonitor {
    cancelled: Arc<AtomicBool>,
}

impl AnalysisMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Outcome of an analysis run. An incomplete run leaves whatever was
/// published before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStatus {
    Complete,
    Incomplete,
}

impl AnalysisStatus {
    pub fn is_complete(self) -> bool {
        self == AnalysisStatus::Complete
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Deepest stack level aggregated; deeper calls count as self time.
    pub max_depth: Option<usize>,
    /// Fold sampled-profiling trees into the aggregates.
    pub sampling_enabled: bool,
    /// Attach thread scheduling states to root aggregates.
    pub kernel_statuses: bool,
    /// Restrict the whole-trace graph to `[start, end]`.
    pub window: Option<[i64; 2]>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            sampling_enabled: true,
            kernel_statuses: true,
            window: None,
        }
    }
}

/// Builds aggregated call graphs from the call stacks of one or more series.
pub struct CallGraphAnalysis {
    series: Vec<CallStackSeries>,
    host: Arc<dyn HostModel>,
    sampling: Option<Arc<dyn SamplingSource>>,
    config: AnalysisConfig,
    call_graph: RwLock<Arc<CallGraph>>,
}

impl CallGraphAnalysis {
    /// Element ids of the series are renumbered so that they do not collide.
    pub fn new(mut series: Vec<CallStackSeries>) -> Self {
        let mut offset = 0;
        for s in &mut series {
            s.offset_ids(offset);
            offset += s.element_count();
        }
        Self {
            series,
            host: Arc::new(NullHostModel),
            sampling: None,
            config: AnalysisConfig::default(),
            call_graph: RwLock::new(Arc::new(CallGraph::new())),
        }
    }

    pub fn with_host_model(mut self, host: Arc<dyn HostModel>) -> Self {
        self.host = host;
        self
    }

    pub fn with_sampling_source(mut self, sampling: Arc<dyn SamplingSource>) -> Self {
        self.sampling = Some(sampling);
        self
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn series(&self) -> &[CallStackSeries] {
        &self.series
    }

    /// Build the whole-trace call graph (or the configured window of it),
    /// replacing the cached one. Readers holding the graph through
    /// [`Self::call_graph`] during the run see it grow root by root.
    pub fn execute(&self, monitor: &AnalysisMonitor) -> AnalysisStatus {
        let graph = Arc::new(CallGraph::new());
        *self.call_graph.write() = Arc::clone(&graph);

        let (start, end) = match self.config.window {
            Some([start, end]) => (start, end),
            None => (i64::MIN, i64::MAX),
        };
        if start > end {
            warn!(start, end, "configured window is empty, nothing to analyse");
            return AnalysisStatus::Incomplete;
        }
        info!(series = self.series.len(), "call graph analysis started");
        let status = self.traversal(monitor, &graph, start, end).run(&self.series);
        match status {
            AnalysisStatus::Complete => info!(elements = graph.all_elements().len(), "call graph analysis complete"),
            AnalysisStatus::Incomplete => info!("call graph analysis cancelled"),
        }
        status
    }

    /// The whole-trace call graph of the last [`Self::execute`].
    pub fn call_graph(&self) -> Arc<CallGraph> {
        Arc::clone(&self.call_graph.read())
    }

    /// A fresh call graph of the calls clipped to `[start, end]`, independent
    /// of the cached whole-trace graph.
    pub fn call_graph_for_range(&self, start: i64, end: i64) -> Result<CallGraph, AnalysisError> {
        if start > end {
            return Err(AnalysisError::InvalidRange { start, end });
        }
        let graph = CallGraph::new();
        let monitor = AnalysisMonitor::new();
        self.traversal(&monitor, &graph, start, end).run(&self.series);
        Ok(graph)
    }

    /// The grouping chain of each series, top level first.
    pub fn group_descriptors(&self) -> Vec<GroupDescriptor> {
        self.series.iter().filter_map(CallStackSeries::root_group).cloned().collect()
    }

    fn traversal<'a>(
        &'a self,
        monitor: &'a AnalysisMonitor,
        graph: &'a CallGraph,
        start: i64,
        end: i64,
    ) -> Traversal<'a> {
        Traversal {
            host: self.host.as_ref(),
            sampling: self.sampling.as_deref(),
            config: &self.config,
            monitor,
            graph,
            start,
            end,
        }
    }
}

#[cfg(test)]
mod tests {
    use callgraph_protocol::CallEvent;

    use super::*;
    use crate::callstack::CallStackStateProvider;
    use crate::model::{AggregatedCalledFunction, Symbol};

    fn analysis(events: &[CallEvent]) -> CallGraphAnalysis {
        let ss = CallStackStateProvider::build(events).unwrap();
        let series = CallStackStateProvider::series(ss).unwrap();
        CallGraphAnalysis::new(vec![series])
    }

    // foo [0, 100) calls bar at [20, 40) and [45, 80).
    fn foo_bar() -> Vec<CallEvent> {
        vec![
            CallEvent::entry(0, 1, 1, "foo"),
            CallEvent::entry(20, 1, 1, "bar"),
            CallEvent::exit(40, 1, 1, "bar"),
            CallEvent::entry(45, 1, 1, "bar"),
            CallEvent::exit(80, 1, 1, "bar"),
            CallEvent::exit(100, 1, 1, "foo"),
        ]
    }

    #[test]
    fn two_level_scenario() {
        let analysis = analysis(&foo_bar());
        assert_eq!(analysis.execute(&AnalysisMonitor::new()), AnalysisStatus::Complete);
        let graph = analysis.call_graph();
        let thread = graph.all_elements().into_iter().find(|e| e.level == 1).unwrap();
        let forest = graph.calling_context_tree(thread.id);
        assert_eq!(forest.len(), 1);
        let foo = &forest[0];
        assert_eq!(foo.duration(), 100);
        assert_eq!(foo.self_time(), 45);
        assert_eq!(foo.call_count(), 1);
        let bar = foo.child(&Symbol::name("bar")).unwrap();
        assert_eq!(bar.duration(), 55);
        assert_eq!(bar.call_count(), 2);
    }

    #[test]
    fn cancelled_before_start_publishes_nothing() {
        let analysis = analysis(&foo_bar());
        let monitor = AnalysisMonitor::new();
        monitor.cancel();
        assert_eq!(analysis.execute(&monitor), AnalysisStatus::Incomplete);
        assert!(analysis.call_graph().is_empty());
    }

    #[test]
    fn range_query_is_clipped_and_independent() {
        let analysis = analysis(&foo_bar());
        analysis.execute(&AnalysisMonitor::new());
        let windowed = analysis.call_graph_for_range(30, 50).unwrap();
        let roots = windowed.merged_roots();
        assert_eq!(roots[0].duration(), 20);
        assert_eq!(roots[0].child(&Symbol::name("bar")).map(AggregatedCalledFunction::duration), Some(15));
        assert_eq!(analysis.call_graph().merged_roots()[0].duration(), 100);
        assert_eq!(
            analysis.call_graph_for_range(50, 30).err(),
            Some(AnalysisError::InvalidRange { start: 50, end: 30 })
        );
    }

    #[test]
    fn max_depth_limits_aggregation() {
        let analysis = analysis(&foo_bar()).with_config(AnalysisConfig {
            max_depth: Some(1),
            ..AnalysisConfig::default()
        });
        analysis.execute(&AnalysisMonitor::new());
        let roots = analysis.call_graph().merged_roots();
        assert_eq!(roots[0].child_count(), 0);
        assert_eq!(roots[0].self_time(), 100);
    }

    #[test]
    fn empty_window_is_reported() {
        let analysis = analysis(&foo_bar()).with_config(AnalysisConfig {
            window: Some([10, 5]),
            ..AnalysisConfig::default()
        });
        assert_eq!(analysis.execute(&AnalysisMonitor::new()), AnalysisStatus::Incomplete);
    }

    #[test]
    fn config_fields_default_when_absent() {
        let config: AnalysisConfig = serde_json::from_str(r#"{"max_depth": 4}"#).unwrap();
        assert_eq!(config.max_depth, Some(4));
        assert!(config.sampling_enabled);
        assert!(config.kernel_statuses);
        assert_eq!(config.window, None);
    }
}
