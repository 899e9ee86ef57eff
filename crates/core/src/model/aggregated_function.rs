use std::collections::HashMap;
use std::collections::hash_map::Entry;

use super::{
    AggregatedThreadStatus, CalledFunction, FunctionStatistics, ProcessStatus,
    ProcessStatusInterval, Symbol, TreeData, WeightedTree,
};

/// Index of the kernel-status extra data set.
pub const KERNEL_STATUS_SET: usize = 0;
/// Index of the sampled-profiling extra data set.
pub const SAMPLED_SET: usize = 1;
/// Names of the extra data sets, in index order.
pub const EXTRA_DATA_SETS: [&str; 2] = ["Kernel statuses", "Sampled"];

/// Call-site payload of an [`AggregatedCalledFunction`].
#[derive(Debug, Clone)]
pub struct FunctionData {
    self_time: i64,
    cpu_time: Option<i64>,
    process_id: i32,
    statistics: FunctionStatistics,
    statuses: HashMap<ProcessStatus, AggregatedThreadStatus>,
    samples: HashMap<Symbol, WeightedTree<Symbol>>,
}

impl Default for FunctionData {
    fn default() -> Self {
        Self {
            self_time: 0,
            cpu_time: None,
            process_id: -1,
            statistics: FunctionStatistics::default(),
            statuses: HashMap::new(),
            samples: HashMap::new(),
        }
    }
}

impl FunctionData {
    // Unknown CPU time contributes nothing; the first known value switches
    // the total from unknown to numeric.
    fn add_cpu_time(&mut self, cpu_time: Option<i64>) {
        if let Some(cpu) = cpu_time {
            *self.cpu_time.get_or_insert(0) += cpu;
        }
    }

    fn merge_statuses(&mut self, statuses: &HashMap<ProcessStatus, AggregatedThreadStatus>) {
        for (status, tree) in statuses {
            match self.statuses.entry(*status) {
                Entry::Vacant(slot) => {
                    slot.insert(tree.copy_of());
                }
                Entry::Occupied(mut slot) => slot.get_mut().absorb(tree.copy_of()),
            }
        }
    }

    fn merge_samples(&mut self, samples: &HashMap<Symbol, WeightedTree<Symbol>>) {
        for tree in samples.values() {
            insert_sample(&mut self.samples, tree.copy_of());
        }
    }
}

fn insert_sample(samples: &mut HashMap<Symbol, WeightedTree<Symbol>>, tree: WeightedTree<Symbol>) {
    match samples.entry(tree.object().clone()) {
        Entry::Vacant(slot) => {
            slot.insert(tree);
        }
        Entry::Occupied(mut slot) => slot.get_mut().absorb(tree),
    }
}

impl TreeData for FunctionData {
    fn merge_data(&mut self, other: &Self) {
        self.self_time += other.self_time;
        self.add_cpu_time(other.cpu_time);
        self.statistics.merge(&other.statistics);
        self.merge_statuses(&other.statuses);
        self.merge_samples(&other.samples);
    }
}

/// Aggregation of every call of one symbol at one position of a call tree.
///
/// The weight of the tree is the cumulative duration of the calls.
pub type AggregatedCalledFunction = WeightedTree<Symbol, FunctionData>;

impl WeightedTree<Symbol, FunctionData> {
    pub fn for_symbol(symbol: Symbol) -> Self {
        Self::new(symbol)
    }

    pub fn duration(&self) -> i64 {
        self.weight()
    }

    pub fn self_time(&self) -> i64 {
        self.data().self_time
    }

    /// Cumulative CPU time, `None` while no contributing call had a known
    /// CPU time.
    pub fn cpu_time(&self) -> Option<i64> {
        self.data().cpu_time
    }

    pub fn process_id(&self) -> i32 {
        self.data().process_id
    }

    pub fn call_count(&self) -> u64 {
        self.data().statistics.duration.count()
    }

    pub fn statistics(&self) -> &FunctionStatistics {
        &self.data().statistics
    }

    /// Attach the aggregate of a call made by this function.
    ///
    /// This node's self time is first reduced by the duration `child` had
    /// before `observation` is folded into it, then the observation is
    /// recorded on the child and the child is merged into this node's
    /// callees. A child aggregate created for a single observation therefore
    /// leaves the self time untouched here; the nested time has already been
    /// removed from the observation's own self time.
    pub fn add_callee(&mut self, observation: &CalledFunction, mut child: AggregatedCalledFunction) {
        self.data_mut().self_time -= child.duration();
        child.add_function_call(observation);
        self.add_child(child);
    }

    /// Record one call of this function.
    pub fn add_function_call(&mut self, observation: &CalledFunction) {
        self.add_to_weight(observation.length());
        let data = self.data_mut();
        data.self_time += observation.self_time();
        data.add_cpu_time(observation.cpu_time());
        data.process_id = observation.process_id();
        data.statistics.update(
            observation.length(),
            observation.self_time(),
            observation.cpu_time(),
        );
    }

    pub fn add_kernel_status(&mut self, interval: &ProcessStatusInterval) {
        self.data_mut()
            .statuses
            .entry(interval.status)
            .or_insert_with(|| AggregatedThreadStatus::for_status(interval.status))
            .update(interval);
    }

    /// Fold a pre-aggregated sampled tree into the sampled extra data set.
    pub fn add_sampled_tree(&mut self, tree: WeightedTree<Symbol>) {
        insert_sample(&mut self.data_mut().samples, tree);
    }

    pub fn kernel_statuses(&self) -> impl Iterator<Item = &AggregatedThreadStatus> {
        self.data().statuses.values()
    }

    pub fn sampled_trees(&self) -> impl Iterator<Item = &WeightedTree<Symbol>> {
        self.data().samples.values()
    }

    /// Trees of the extra data set `index` (see [`EXTRA_DATA_SETS`]), as plain
    /// weighted trees. Unknown indices yield nothing.
    pub fn extra_data_trees(&self, index: usize) -> Vec<WeightedTree<Symbol>> {
        match index {
            KERNEL_STATUS_SET => self.kernel_statuses().map(WeightedTree::to_plain).collect(),
            SAMPLED_SET => self.sampled_trees().cloned().collect(),
            _ => Vec::new(),
        }
    }
}
