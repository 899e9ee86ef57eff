use tracing::{debug, debug_span, warn};

use super::{AnalysisConfig, AnalysisMonitor, AnalysisStatus};
use crate::callstack::{CallStack, CallStackSeries, HostModel, SamplingSource};
use crate::model::{AggregatedCalledFunction, CallGraph, CalledFunction, ElementId};

/// One depth-first walk over the call stacks of some series, publishing root
/// aggregates into `graph`.
pub(super) struct Traversal<'a> {
    pub(super) host: &'a dyn HostModel,
    pub(super) sampling: Option<&'a dyn SamplingSource>,
    pub(super) config: &'a AnalysisConfig,
    pub(super) monitor: &'a AnalysisMonitor,
    pub(super) graph: &'a CallGraph,
    pub(super) start: i64,
    pub(super) end: i64,
}

/// A call whose callees are still being visited.
struct Frame {
    function: CalledFunction,
    aggregate: AggregatedCalledFunction,
    /// Where the search for the next callee starts.
    next_time: i64,
    /// End of the previous callee, start of the current sampling gap.
    gap_start: i64,
}

impl Frame {
    fn new(function: CalledFunction) -> Self {
        Self {
            aggregate: AggregatedCalledFunction::for_symbol(function.symbol().clone()),
            next_time: function.start(),
            gap_start: function.start(),
            function,
        }
    }
}

impl Traversal<'_> {
    pub(super) fn run(&self, series: &[CallStackSeries]) -> AnalysisStatus {
        for element in series.iter().flat_map(CallStackSeries::root_elements) {
            for node in element.descendants() {
                if self.monitor.is_cancelled() {
                    return AnalysisStatus::Incomplete;
                }
                self.graph.register_element(node.graph_element());
                if let Some(stack) = node.call_stack()
                    && !self.iterate_call_stack(node.id(), stack).is_complete()
                {
                    return AnalysisStatus::Incomplete;
                }
            }
        }
        AnalysisStatus::Complete
    }

    fn iterate_call_stack(&self, element: ElementId, stack: &CallStack) -> AnalysisStatus {
        let _span = debug_span!("call_stack", element = element.0, thread_id = stack.thread_id()).entered();
        let mut time = stack.start_time();
        let mut roots = 0usize;
        loop {
            if self.monitor.is_cancelled() {
                return AnalysisStatus::Incomplete;
            }
            let root = match stack.next_function_at(time, 1, None, self.host, self.start, self.end) {
                Ok(Some(root)) => root,
                Ok(None) => break,
                Err(error) => {
                    warn!(%error, time, "call stack unreadable, skipping its remaining calls");
                    break;
                }
            };
            time = root.end();
            let Some(aggregate) = self.aggregate(stack, root) else {
                return AnalysisStatus::Incomplete;
            };
            self.graph.add_aggregated_call_site(element, aggregate);
            roots += 1;
        }
        debug!(roots, "call stack aggregated");
        AnalysisStatus::Complete
    }

    /// Aggregate `root` and every call nested in it. Returns `None` when the
    /// run is cancelled midway; nothing of this root is published then.
    fn aggregate(&self, stack: &CallStack, root: CalledFunction) -> Option<AggregatedCalledFunction> {
        let thread_id = stack.thread_id();
        let mut frames = vec![Frame::new(root)];
        loop {
            if self.monitor.is_cancelled() {
                return None;
            }
            let depth = frames.len() + 1;
            let top = frames.last_mut()?;
            let callee = if self.descends_to(stack, depth) {
                self.next_callee(stack, top, depth)
            } else {
                None
            };

            if let Some(callee) = callee {
                top.function.add_child(&callee);
                self.fold_samples(&mut top.aggregate, thread_id, top.gap_start, callee.start());
                top.next_time = callee.end();
                top.gap_start = callee.end();
                frames.push(Frame::new(callee));
                continue;
            }

            let mut done = frames.pop()?;
            self.fold_samples(&mut done.aggregate, thread_id, done.gap_start, done.function.end());
            match frames.last_mut() {
                Some(parent) => parent.aggregate.add_callee(&done.function, done.aggregate),
                None => {
                    self.attach_kernel_statuses(stack, &done.function, &mut done.aggregate);
                    done.aggregate.add_function_call(&done.function);
                    return Some(done.aggregate);
                }
            }
        }
    }

    fn descends_to(&self, stack: &CallStack, depth: usize) -> bool {
        depth <= stack.max_depth() && self.config.max_depth.is_none_or(|max| depth <= max)
    }

    // Missing data ends the branch; the rest of the tree is still built.
    fn next_callee(&self, stack: &CallStack, caller: &Frame, depth: usize) -> Option<CalledFunction> {
        let start = caller.function.start().max(self.start);
        let end = caller.function.end().min(self.end);
        match stack.next_function_at(caller.next_time, depth, Some(&caller.function), self.host, start, end) {
            Ok(callee) => callee,
            Err(error) => {
                warn!(%error, depth, time = caller.next_time, "missing call stack data, branch left incomplete");
                None
            }
        }
    }

    fn fold_samples(&self, aggregate: &mut AggregatedCalledFunction, thread_id: i32, from: i64, to: i64) {
        if !self.config.sampling_enabled || thread_id <= 0 || from >= to {
            return;
        }
        let Some(sampling) = self.sampling else {
            return;
        };
        for tree in sampling.sampling_data(thread_id, from, to) {
            aggregate.add_sampled_tree(tree);
        }
    }

    fn attach_kernel_statuses(
        &self,
        stack: &CallStack,
        function: &CalledFunction,
        aggregate: &mut AggregatedCalledFunction,
    ) {
        if !self.config.kernel_statuses || !self.host.is_thread_status_available() {
            return;
        }
        for interval in stack.kernel_statuses(function, self.host) {
            aggregate.add_kernel_status(&interval);
        }
    }
}
