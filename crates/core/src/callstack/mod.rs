//! Call stacks recorded in a state system and the collaborators that enrich
//! the calls read back from them.

mod element;
mod provider;
mod sampling;
mod series;

pub use element::{CallStackElement, GroupDescriptor, Grouping};
pub use provider::{CALL_STACK, CallStackStateProvider, PROCESSES, ProviderError, load_events};
pub use sampling::{SampledStacks, load_samples, stack_trace_tree};
pub use series::{CallStackSeries, SeriesLevel};

use std::sync::Arc;

use crate::model::{CalledFunction, ProcessStatusInterval, Symbol, WeightedTree};
use crate::statesystem::{Quark, StateSystem, StateSystemError, StateValue};

/// Operating-system level information about the host a call stack ran on.
pub trait HostModel: Send + Sync {
    /// CPU time spent by `thread_id` in `[start, end)`, if known.
    fn cpu_time(&self, thread_id: i32, start: i64, end: i64) -> Option<i64>;

    fn thread_status_intervals(&self, thread_id: i32, start: i64, end: i64) -> Vec<ProcessStatusInterval>;

    fn is_thread_status_available(&self) -> bool;
}

/// Host model of a trace without any kernel data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHostModel;

impl HostModel for NullHostModel {
    fn cpu_time(&self, _thread_id: i32, _start: i64, _end: i64) -> Option<i64> {
        None
    }

    fn thread_status_intervals(&self, _thread_id: i32, _start: i64, _end: i64) -> Vec<ProcessStatusInterval> {
        Vec::new()
    }

    fn is_thread_status_available(&self) -> bool {
        false
    }
}

/// Source of pre-aggregated sampled-profiling trees, such as
/// [`SampledStacks`].
pub trait SamplingSource: Send + Sync {
    fn sampling_data(&self, thread_id: i32, from: i64, to: i64) -> Vec<WeightedTree<Symbol>>;
}

pub(crate) fn symbol_of(value: &StateValue) -> Option<Symbol> {
    match value {
        StateValue::Null => None,
        StateValue::Int(address) => Some(Symbol::Address(*address as u64)),
        StateValue::Str(name) => Some(Symbol::Name(name.clone())),
    }
}

/// The call stack of one thread: one attribute per stack depth, depth 1
/// first.
#[derive(Debug, Clone)]
pub struct CallStack {
    state_system: Arc<dyn StateSystem>,
    quarks: Vec<Quark>,
    process_id: i32,
    thread_id: i32,
}

impl CallStack {
    pub fn new(state_system: Arc<dyn StateSystem>, quarks: Vec<Quark>, process_id: i32, thread_id: i32) -> Self {
        Self {
            state_system,
            quarks,
            process_id,
            thread_id,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.quarks.len()
    }

    pub fn start_time(&self) -> i64 {
        self.state_system.start_time()
    }

    pub fn end_time(&self) -> i64 {
        self.state_system.current_end_time()
    }

    pub fn process_id(&self) -> i32 {
        self.process_id
    }

    pub fn thread_id(&self) -> i32 {
        self.thread_id
    }

    fn quark_at(&self, depth: usize) -> Result<Quark, StateSystemError> {
        depth
            .checked_sub(1)
            .and_then(|i| self.quarks.get(i))
            .copied()
            .ok_or_else(|| StateSystemError::AttributeNotFound {
                path: format!("call stack depth {depth}"),
            })
    }

    /// The first call at `depth` found from `time` on that ends after `start`
    /// and begins before `end`, clipped to `[start, end]`.
    ///
    /// With a `parent`, the search stops at the end of the parent call. The
    /// CPU time of the call is taken from `host` when it knows it.
    pub fn next_function_at(
        &self,
        time: i64,
        depth: usize,
        parent: Option<&CalledFunction>,
        host: &dyn HostModel,
        start: i64,
        end: i64,
    ) -> Result<Option<CalledFunction>, StateSystemError> {
        let quark = self.quark_at(depth)?;
        let end_time = parent.map_or_else(|| self.state_system.current_end_time(), |p| p.end() - 1);
        if time > end_time || time >= end {
            return Ok(None);
        }
        let mut interval = self.state_system.query_single_state(time, quark)?;
        while (interval.value.is_null() || interval.end < start) && interval.end + 1 < end_time {
            interval = self.state_system.query_single_state(interval.end + 1, quark)?;
        }
        let Some(symbol) = symbol_of(&interval.value) else {
            return Ok(None);
        };
        if interval.start >= end || interval.end < start {
            return Ok(None);
        }
        let call_start = start.max(interval.start);
        let call_end = end.min(interval.end + 1);
        let cpu_time = host.cpu_time(self.thread_id, call_start, call_end);
        let function = CalledFunction::new(call_start, call_end, depth, symbol, self.process_id, self.thread_id)
            .with_cpu_time(cpu_time);
        Ok(Some(function))
    }

    /// Scheduling states of the thread during `function`, clipped to it.
    pub fn kernel_statuses(&self, function: &CalledFunction, host: &dyn HostModel) -> Vec<ProcessStatusInterval> {
        host.thread_status_intervals(function.thread_id(), function.start(), function.end())
            .into_iter()
            .filter_map(|interval| {
                let start = interval.start.max(function.start());
                let end = interval.end.min(function.end());
                (start < end).then(|| ProcessStatusInterval::new(start, end, interval.status))
            })
            .collect()
    }
}
