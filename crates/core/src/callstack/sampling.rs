//! Sampled stack traces served to the call graph builder as pre-aggregated
//! trees.

use std::collections::HashMap;
use std::io::Read;

use callgraph_protocol::SampleEvent;
use tracing::debug;

use super::{ProviderError, SamplingSource};
use crate::model::{Symbol, WeightedTree};

/// The tree of one stack trace, one unit of weight per frame. `stack` lists
/// the innermost frame first; the returned root is the outermost caller.
pub fn stack_trace_tree(stack: &[Symbol]) -> Option<WeightedTree<Symbol>> {
    let (innermost, callers) = stack.split_first()?;
    let mut tree = WeightedTree::with_weight(innermost.clone(), 1);
    for caller in callers {
        let mut node = WeightedTree::with_weight(caller.clone(), 1);
        node.add_child(tree);
        tree = node;
    }
    Some(tree)
}

/// Stack traces of every sampled thread, kept in timestamp order.
#[derive(Debug, Default)]
pub struct SampledStacks {
    threads: HashMap<i32, Vec<(i64, WeightedTree<Symbol>)>>,
}

impl SampledStacks {
    pub fn new(samples: &[SampleEvent]) -> Self {
        let mut stacks = Self::default();
        for sample in samples {
            let stack: Vec<Symbol> = sample.stack.iter().map(Symbol::from).collect();
            stacks.add_stack_trace(sample.thread_id, sample.timestamp, &stack);
        }
        debug!(threads = stacks.threads.len(), samples = stacks.sample_count(), "sampled stacks indexed");
        stacks
    }

    /// Record the stack trace sampled on `thread_id` at `timestamp`. Empty
    /// traces are ignored.
    pub fn add_stack_trace(&mut self, thread_id: i32, timestamp: i64, stack: &[Symbol]) {
        let Some(tree) = stack_trace_tree(stack) else {
            return;
        };
        let samples = self.threads.entry(thread_id).or_default();
        let at = samples.partition_point(|(time, _)| *time <= timestamp);
        samples.insert(at, (timestamp, tree));
    }

    pub fn sample_count(&self) -> usize {
        self.threads.values().map(Vec::len).sum()
    }
}

impl SamplingSource for SampledStacks {
    /// Samples of `thread_id` taken in `[from, to)`, merged by outermost
    /// frame.
    fn sampling_data(&self, thread_id: i32, from: i64, to: i64) -> Vec<WeightedTree<Symbol>> {
        let Some(samples) = self.threads.get(&thread_id) else {
            return Vec::new();
        };
        if from >= to {
            return Vec::new();
        }
        let first = samples.partition_point(|(time, _)| *time < from);
        let last = samples.partition_point(|(time, _)| *time < to);
        let mut merged: Vec<WeightedTree<Symbol>> = Vec::new();
        for (_, tree) in &samples[first..last] {
            match merged.iter_mut().find(|site| site.object() == tree.object()) {
                Some(site) => site.absorb(tree.copy_of()),
                None => merged.push(tree.copy_of()),
            }
        }
        merged
    }
}

/// Read a JSON array of sampled stack traces.
pub fn load_samples<R: Read>(reader: R) -> Result<Vec<SampleEvent>, ProviderError> {
    Ok(serde_json::from_reader(reader)?)
}
