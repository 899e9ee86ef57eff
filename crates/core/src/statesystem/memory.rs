use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use callgraph_protocol::SharedStr;

use super::{Quark, StateInterval, StateSystem, StateSystemError, StateValue};

#[derive(Debug)]
struct Attribute {
    name: SharedStr,
    children: Vec<Quark>,
    // Call stacks add one child per depth, so lookups by name must not scan.
    children_by_name: HashMap<SharedStr, Quark>,
    /// Closed intervals, sorted by start time.
    history: Vec<StateInterval>,
    ongoing_start: i64,
    ongoing_value: StateValue,
}

/// State system held entirely in memory.
///
/// Built single-threaded through the `&mut self` operations, then shared
/// read-only (typically behind an `Arc`).
#[derive(Debug)]
pub struct InMemoryStateSystem {
    start_time: i64,
    end_time: i64,
    attributes: Vec<Attribute>,
    roots: Vec<Quark>,
    roots_by_name: HashMap<SharedStr, Quark>,
    closed: bool,
    disposed: AtomicBool,
}

impl InMemoryStateSystem {
    pub fn new(start_time: i64) -> Self {
        Self {
            start_time,
            end_time: start_time,
            attributes: Vec::new(),
            roots: Vec::new(),
            roots_by_name: HashMap::new(),
            closed: false,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn quark_absolute_and_add(&mut self, path: &[&str]) -> Quark {
        let mut parent = None;
        for name in path {
            parent = Some(self.child_or_add(parent, name));
        }
        // An empty path addresses nothing; give it a nameless top-level attribute.
        match parent {
            Some(quark) => quark,
            None => self.child_or_add(None, ""),
        }
    }

    pub fn quark_relative_and_add(&mut self, parent: Quark, name: &str) -> Result<Quark, StateSystemError> {
        self.attribute(parent)?;
        Ok(self.child_or_add(Some(parent), name))
    }

    fn child_or_add(&mut self, parent: Option<Quark>, name: &str) -> Quark {
        if let Some(existing) = self.child_named(parent, name) {
            return existing;
        }
        let quark = self.attributes.len();
        let name = SharedStr::from(name);
        self.attributes.push(Attribute {
            name: name.clone(),
            children: Vec::new(),
            children_by_name: HashMap::new(),
            history: Vec::new(),
            ongoing_start: self.start_time,
            ongoing_value: StateValue::Null,
        });
        match parent {
            Some(p) => {
                let parent = &mut self.attributes[p];
                parent.children.push(quark);
                parent.children_by_name.insert(name, quark);
            }
            None => {
                self.roots.push(quark);
                self.roots_by_name.insert(name, quark);
            }
        }
        quark
    }

    fn child_named(&self, parent: Option<Quark>, name: &str) -> Option<Quark> {
        let siblings = match parent {
            Some(quark) => &self.attributes.get(quark)?.children_by_name,
            None => &self.roots_by_name,
        };
        siblings.get(name).copied()
    }

    fn attribute(&self, quark: Quark) -> Result<&Attribute, StateSystemError> {
        self.attributes.get(quark).ok_or(StateSystemError::InvalidQuark(quark))
    }

    fn check_writable(&self, time: i64) -> Result<(), StateSystemError> {
        if self.is_disposed() {
            return Err(StateSystemError::Disposed);
        }
        if self.closed || time < self.start_time {
            return Err(self.time_range(time));
        }
        Ok(())
    }

    fn time_range(&self, time: i64) -> StateSystemError {
        StateSystemError::TimeRange {
            time,
            start: self.start_time,
            end: self.end_time,
        }
    }

    /// Current (not yet closed) value of `quark`.
    pub fn ongoing_value(&self, quark: Quark) -> Result<&StateValue, StateSystemError> {
        Ok(&self.attribute(quark)?.ongoing_value)
    }

    /// Set the value of `quark` from `time` on, closing its previous interval
    /// at `time - 1`. A second change at the same time replaces the first.
    pub fn modify_attribute(&mut self, time: i64, value: StateValue, quark: Quark) -> Result<(), StateSystemError> {
        self.check_writable(time)?;
        let range_error = self.time_range(time);
        let attribute = self
            .attributes
            .get_mut(quark)
            .ok_or(StateSystemError::InvalidQuark(quark))?;
        if time < attribute.ongoing_start {
            return Err(range_error);
        }
        if time > attribute.ongoing_start {
            let previous = std::mem::take(&mut attribute.ongoing_value);
            attribute.history.push(StateInterval {
                start: attribute.ongoing_start,
                end: time - 1,
                quark,
                value: previous,
            });
            attribute.ongoing_start = time;
        }
        attribute.ongoing_value = value;
        self.end_time = self.end_time.max(time);
        Ok(())
    }

    fn stack_depth(&self, stack: Quark) -> Result<i64, StateSystemError> {
        Ok(self.ongoing_value(stack)?.as_int().unwrap_or(0))
    }

    /// Push `value` on the stack attribute `stack`: its value becomes the new
    /// depth and the sub-attribute named after that depth holds `value`.
    pub fn push_attribute(&mut self, time: i64, value: StateValue, stack: Quark) -> Result<(), StateSystemError> {
        let depth = self.stack_depth(stack)? + 1;
        self.modify_attribute(time, StateValue::Int(depth), stack)?;
        let slot = self.quark_relative_and_add(stack, &depth.to_string())?;
        self.modify_attribute(time, value, slot)
    }

    /// Pop the top of the stack attribute `stack`, returning the popped value,
    /// or `None` if the stack was empty.
    pub fn pop_attribute(&mut self, time: i64, stack: Quark) -> Result<Option<StateValue>, StateSystemError> {
        let depth = self.stack_depth(stack)?;
        if depth <= 0 {
            return Ok(None);
        }
        let slot = self.quark_relative(stack, &depth.to_string())?;
        let popped = self.ongoing_value(slot)?.clone();
        self.modify_attribute(time, StateValue::Null, slot)?;
        let remaining = if depth == 1 {
            StateValue::Null
        } else {
            StateValue::Int(depth - 1)
        };
        self.modify_attribute(time, remaining, stack)?;
        Ok(Some(popped))
    }

    /// Close every ongoing interval at `end` (inclusive). No modification is
    /// accepted afterwards.
    pub fn close_history(&mut self, end: i64) -> Result<(), StateSystemError> {
        if self.is_disposed() {
            return Err(StateSystemError::Disposed);
        }
        if self.closed || end < self.end_time {
            return Err(self.time_range(end));
        }
        for (quark, attribute) in self.attributes.iter_mut().enumerate() {
            attribute.history.push(StateInterval {
                start: attribute.ongoing_start,
                end,
                quark,
                value: std::mem::take(&mut attribute.ongoing_value),
            });
            attribute.ongoing_start = end + 1;
        }
        self.end_time = end;
        self.closed = true;
        Ok(())
    }

    /// Release the state system. Every later query fails with
    /// [`StateSystemError::Disposed`].
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    fn check_readable(&self, time: i64) -> Result<(), StateSystemError> {
        if self.is_disposed() {
            return Err(StateSystemError::Disposed);
        }
        if time < self.start_time || time > self.end_time {
            return Err(self.time_range(time));
        }
        Ok(())
    }
}

impl StateSystem for InMemoryStateSystem {
    fn start_time(&self) -> i64 {
        self.start_time
    }

    fn current_end_time(&self) -> i64 {
        self.end_time
    }

    fn quark_absolute(&self, path: &[&str]) -> Result<Quark, StateSystemError> {
        let not_found = || StateSystemError::AttributeNotFound { path: path.join("/") };
        let mut current: Option<Quark> = None;
        for name in path {
            current = Some(self.child_named(current, name).ok_or_else(not_found)?);
        }
        current.ok_or_else(not_found)
    }

    fn quark_relative(&self, parent: Quark, name: &str) -> Result<Quark, StateSystemError> {
        let attribute = self.attribute(parent)?;
        self.child_named(Some(parent), name)
            .ok_or_else(|| StateSystemError::AttributeNotFound {
                path: format!("{}/{name}", attribute.name),
            })
    }

    fn sub_attributes(&self, parent: Option<Quark>) -> Result<Vec<Quark>, StateSystemError> {
        match parent {
            Some(quark) => Ok(self.attribute(quark)?.children.clone()),
            None => Ok(self.roots.clone()),
        }
    }

    fn attribute_name(&self, quark: Quark) -> Result<SharedStr, StateSystemError> {
        Ok(self.attribute(quark)?.name.clone())
    }

    fn query_single_state(&self, time: i64, quark: Quark) -> Result<StateInterval, StateSystemError> {
        self.check_readable(time)?;
        let attribute = self.attribute(quark)?;
        let idx = attribute.history.partition_point(|i| i.end < time);
        if let Some(interval) = attribute.history.get(idx)
            && interval.start <= time
        {
            return Ok(interval.clone());
        }
        if time >= attribute.ongoing_start {
            return Ok(StateInterval {
                start: attribute.ongoing_start,
                end: self.end_time,
                quark,
                value: attribute.ongoing_value.clone(),
            });
        }
        Err(self.time_range(time))
    }

    fn query_history_range(
        &self,
        quark: Quark,
        start: i64,
        end: i64,
    ) -> Result<Vec<StateInterval>, StateSystemError> {
        let start = start.max(self.start_time);
        let end = end.min(self.end_time);
        if start > end {
            return Err(self.time_range(start));
        }
        let mut intervals = Vec::new();
        let mut time = start;
        loop {
            let interval = self.query_single_state(time, quark)?;
            let next = interval.end + 1;
            let done = interval.end >= end;
            intervals.push(interval);
            if done {
                return Ok(intervals);
            }
            time = next;
        }
    }

    fn query_full_state(&self, time: i64) -> Result<Vec<StateInterval>, StateSystemError> {
        (0..self.attributes.len())
            .map(|quark| self.query_single_state(time, quark))
            .collect()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}
