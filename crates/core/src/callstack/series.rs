use std::sync::Arc;

use callgraph_protocol::SharedStr;

use super::{CALL_STACK, CallStack, CallStackElement, GroupDescriptor};
use crate::model::ElementId;
use crate::statesystem::{Quark, StateSystem, StateSystemError};

/// One grouping level of a series: a name and the attribute path pattern of
/// its elements, relative to the elements of the level above.
#[derive(Debug, Clone)]
pub struct SeriesLevel {
    pub name: SharedStr,
    pub pattern: Vec<SharedStr>,
}

impl SeriesLevel {
    pub fn new(name: &str, pattern: &[&str]) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.iter().map(|s| SharedStr::from(*s)).collect(),
        }
    }
}

/// The call stacks of a state system, organized as a hierarchy of grouping
/// elements. Elements of the last level hold a [`CALL_STACK`] attribute.
#[derive(Debug, Clone)]
pub struct CallStackSeries {
    name: SharedStr,
    root_group: Option<GroupDescriptor>,
    roots: Vec<CallStackElement>,
    element_count: u32,
}

impl CallStackSeries {
    pub fn new(
        name: &str,
        state_system: Arc<dyn StateSystem>,
        levels: &[SeriesLevel],
    ) -> Result<Self, StateSystemError> {
        let names: Vec<&str> = levels.iter().map(|l| &*l.name).collect();
        let mut builder = Builder {
            state_system,
            levels,
            next_id: 0,
        };
        let roots = builder.elements(None, None, 0, None)?;
        Ok(Self {
            name: name.into(),
            root_group: GroupDescriptor::chain(&names),
            roots,
            element_count: builder.next_id,
        })
    }

    pub fn name(&self) -> &SharedStr {
        &self.name
    }

    pub fn root_elements(&self) -> &[CallStackElement] {
        &self.roots
    }

    /// First descriptor of the grouping chain, `None` for a series without
    /// levels.
    pub fn root_group(&self) -> Option<&GroupDescriptor> {
        self.root_group.as_ref()
    }

    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    /// Shift every element id by `offset`, so that several series can share
    /// one id space.
    pub(crate) fn offset_ids(&mut self, offset: u32) {
        for root in &mut self.roots {
            root.offset_ids(offset);
        }
    }
}

struct Builder<'a> {
    state_system: Arc<dyn StateSystem>,
    levels: &'a [SeriesLevel],
    next_id: u32,
}

impl Builder<'_> {
    fn elements(
        &mut self,
        parent_quark: Option<Quark>,
        parent: Option<ElementId>,
        level: usize,
        process_id: Option<i32>,
    ) -> Result<Vec<CallStackElement>, StateSystemError> {
        let levels = self.levels;
        let Some(current) = levels.get(level) else {
            return Ok(Vec::new());
        };
        let pattern: Vec<&str> = current.pattern.iter().map(|s| &**s).collect();
        let mut elements = Vec::new();
        for quark in self.state_system.quarks_matching(parent_quark, &pattern)? {
            let name = self.state_system.attribute_name(quark)?;
            let id = ElementId(self.next_id);
            self.next_id += 1;
            let mut element = CallStackElement::new(id, name.clone(), level, parent);
            let numeric = name.parse::<i32>().ok();
            let process_id = process_id.or(numeric);

            if level + 1 < levels.len() {
                for child in self.elements(Some(quark), Some(id), level + 1, process_id)? {
                    element.push_child(child);
                }
            } else if let Ok(stack) = self.state_system.quark_relative(quark, CALL_STACK) {
                let thread_id = numeric.unwrap_or(-1);
                let depths = self.depth_quarks(stack)?;
                element.set_call_stack(CallStack::new(
                    Arc::clone(&self.state_system),
                    depths,
                    process_id.unwrap_or(thread_id),
                    thread_id,
                ));
            }
            elements.push(element);
        }
        Ok(elements)
    }

    // Depth attributes are named "1", "2", ...; anything else below the stack
    // attribute is ignored.
    fn depth_quarks(&self, stack: Quark) -> Result<Vec<Quark>, StateSystemError> {
        let mut depths = Vec::new();
        for quark in self.state_system.sub_attributes(Some(stack))? {
            if let Ok(depth) = self.state_system.attribute_name(quark)?.parse::<usize>() {
                depths.push((depth, quark));
            }
        }
        depths.sort_unstable();
        Ok(depths.into_iter().map(|(_, quark)| quark).collect())
    }
}
