//! Indexed interval store the call stacks are read from.
//!
//! Every attribute (addressed by a [`Quark`]) has a history of contiguous,
//! non-overlapping [`StateInterval`]s. Interval ends are inclusive: a value set
//! at `t0` and replaced at `t1` yields the interval `[t0, t1 - 1]`.

mod memory;

pub use memory::InMemoryStateSystem;

use callgraph_protocol::SharedStr;
use thiserror::Error;

/// Index of an attribute in a state system.
pub type Quark = usize;

/// Wildcard segment of an attribute path pattern.
pub const WILDCARD: &str = "*";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateSystemError {
    #[error("attribute not found: {path}")]
    AttributeNotFound { path: String },
    #[error("time {time} is outside of [{start}, {end}]")]
    TimeRange { time: i64, start: i64, end: i64 },
    #[error("state system has been disposed")]
    Disposed,
    #[error("invalid quark {0}")]
    InvalidQuark(Quark),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StateValue {
    #[default]
    Null,
    Int(i64),
    Str(SharedStr),
}

impl StateValue {
    pub fn is_null(&self) -> bool {
        matches!(self, StateValue::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            StateValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateInterval {
    pub start: i64,
    /// Inclusive.
    pub end: i64,
    pub quark: Quark,
    pub value: StateValue,
}

/// Read side of a state system.
pub trait StateSystem: Send + Sync + std::fmt::Debug {
    fn start_time(&self) -> i64;

    fn current_end_time(&self) -> i64;

    fn quark_absolute(&self, path: &[&str]) -> Result<Quark, StateSystemError>;

    fn quark_relative(&self, parent: Quark, name: &str) -> Result<Quark, StateSystemError>;

    /// Children of `parent`, or the top-level attributes for `None`.
    fn sub_attributes(&self, parent: Option<Quark>) -> Result<Vec<Quark>, StateSystemError>;

    fn attribute_name(&self, quark: Quark) -> Result<SharedStr, StateSystemError>;

    fn query_single_state(&self, time: i64, quark: Quark) -> Result<StateInterval, StateSystemError>;

    /// Every interval of `quark` intersecting `[start, end]`, clamped to the
    /// range of the state system.
    fn query_history_range(
        &self,
        quark: Quark,
        start: i64,
        end: i64,
    ) -> Result<Vec<StateInterval>, StateSystemError>;

    /// The state of every attribute at `time`, indexed by quark.
    fn query_full_state(&self, time: i64) -> Result<Vec<StateInterval>, StateSystemError>;

    fn is_disposed(&self) -> bool;

    /// Attributes below `parent` matching `pattern`, where a [`WILDCARD`]
    /// segment matches any name.
    fn quarks_matching(
        &self,
        parent: Option<Quark>,
        pattern: &[&str],
    ) -> Result<Vec<Quark>, StateSystemError> {
        let mut current = match parent {
            Some(quark) => vec![Some(quark)],
            None => vec![None],
        };
        for segment in pattern {
            let mut next = Vec::new();
            for quark in current {
                for child in self.sub_attributes(quark)? {
                    if *segment == WILDCARD || &*self.attribute_name(child)? == *segment {
                        next.push(Some(child));
                    }
                }
            }
            current = next;
        }
        Ok(current.into_iter().flatten().collect())
    }
}
