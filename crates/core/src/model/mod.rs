pub mod aggregated_function;
pub mod call_graph;
pub mod called_function;
pub mod statistics;
pub mod symbol;
pub mod thread_status;
pub mod weighted_tree;

pub use aggregated_function::{
    AggregatedCalledFunction, EXTRA_DATA_SETS, FunctionData, KERNEL_STATUS_SET, SAMPLED_SET,
};
pub use call_graph::{CallGraph, ElementId, GraphElement};
pub use called_function::CalledFunction;
pub use statistics::{FunctionStatistics, Statistics};
pub use symbol::{MapSymbolProvider, ProcessStatus, Symbol, SymbolProvider};
pub use thread_status::{AggregatedThreadStatus, ProcessStatusInterval, StatusData};
pub use weighted_tree::{TreeData, TreeError, WeightedTree};
