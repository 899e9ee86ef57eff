use serde::{Deserialize, Serialize};

/// Running statistics over a stream of `i64` samples.
///
/// Mean and variance are maintained with Welford's update, and two instances
/// are combined with the parallel form of the same recurrence, so merging the
/// statistics of two aggregates gives the same result as feeding all samples
/// into one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    count: u64,
    min: i64,
    max: i64,
    total: i64,
    mean: f64,
    m2: f64,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            count: 0,
            min: i64::MAX,
            max: i64::MIN,
            total: 0,
            mean: 0.0,
            m2: 0.0,
        }
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: i64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.total += value;
        let delta = value as f64 - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value as f64 - self.mean);
    }

    pub fn merge(&mut self, other: &Statistics) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        self.mean += delta * other.count as f64 / count as f64;
        self.m2 += other.m2 + delta * delta * (self.count as f64 * other.count as f64) / count as f64;
        self.count = count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.total += other.total;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> Option<i64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<i64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample standard deviation; NaN with fewer than two samples.
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            return f64::NAN;
        }
        (self.m2 / (self.count - 1) as f64).sqrt()
    }
}

/// Per-call statistics kept by an aggregated function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionStatistics {
    pub duration: Statistics,
    pub self_time: Statistics,
    /// Only updated for calls whose CPU time is known.
    pub cpu_time: Statistics,
}

impl FunctionStatistics {
    pub fn update(&mut self, duration: i64, self_time: i64, cpu_time: Option<i64>) {
        self.duration.update(duration);
        self.self_time.update(self_time);
        if let Some(cpu) = cpu_time {
            self.cpu_time.update(cpu);
        }
    }

    pub fn merge(&mut self, other: &FunctionStatistics) {
        self.duration.merge(&other.duration);
        self.self_time.merge(&other.self_time);
        self.cpu_time.merge(&other.cpu_time);
    }
}
