use super::{ProcessStatus, Statistics, Symbol, TreeData, WeightedTree};

/// A span of time during which a thread stayed in one scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStatusInterval {
    pub start: i64,
    pub end: i64,
    pub status: ProcessStatus,
}

impl ProcessStatusInterval {
    pub fn new(start: i64, end: i64, status: ProcessStatus) -> Self {
        Self { start, end, status }
    }

    pub fn length(&self) -> i64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusData {
    pub statistics: Statistics,
}

impl TreeData for StatusData {
    fn merge_data(&mut self, other: &Self) {
        self.statistics.merge(&other.statistics);
    }
}

/// Total time spent in one scheduling state while inside a function.
pub type AggregatedThreadStatus = WeightedTree<Symbol, StatusData>;

impl WeightedTree<Symbol, StatusData> {
    pub fn for_status(status: ProcessStatus) -> Self {
        Self::new(Symbol::Status(status))
    }

    pub fn update(&mut self, interval: &ProcessStatusInterval) {
        self.add_to_weight(interval.length());
        self.data_mut().statistics.update(interval.length());
    }

    pub fn interval_count(&self) -> u64 {
        self.data().statistics.count()
    }
}
