use callgraph_protocol::SharedStr;

use super::CallStack;
use crate::model::{ElementId, GraphElement};

/// One level of the grouping hierarchy of a call stack series (process,
/// thread, ...), linked to the level below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescriptor {
    name: SharedStr,
    level: usize,
    next: Option<Box<GroupDescriptor>>,
}

impl GroupDescriptor {
    /// Chain of descriptors named after `names`, top level first.
    pub fn chain<S: AsRef<str>>(names: &[S]) -> Option<Self> {
        names.iter().enumerate().rev().fold(None, |next, (level, name)| {
            Some(Self {
                name: name.as_ref().into(),
                level,
                next: next.map(Box::new),
            })
        })
    }

    pub fn name(&self) -> &SharedStr {
        &self.name
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn next(&self) -> Option<&GroupDescriptor> {
        self.next.as_deref()
    }

    /// The deepest descriptor of the chain starting here.
    pub fn leaf(&self) -> &GroupDescriptor {
        let mut current = self;
        while let Some(next) = current.next() {
            current = next;
        }
        current
    }

    /// The descriptor of this chain named `name`.
    pub fn find(&self, name: &str) -> Option<&GroupDescriptor> {
        let mut current = Some(self);
        while let Some(descriptor) = current {
            if descriptor.name.eq_ignore_ascii_case(name) {
                return Some(descriptor);
            }
            current = descriptor.next();
        }
        None
    }

    pub fn grouping(&self) -> Grouping {
        Grouping::Level(self.level)
    }
}

/// Level at which a call graph is rolled up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grouping {
    /// Everything merged into a single element.
    All,
    /// Keep the elements down to this level of the hierarchy, merging deeper
    /// elements into their ancestor at that level.
    Level(usize),
}

impl From<&GroupDescriptor> for Grouping {
    fn from(descriptor: &GroupDescriptor) -> Self {
        descriptor.grouping()
    }
}

/// A node of the element hierarchy of a call stack series. Leaf elements
/// carry the call stack of one thread.
#[derive(Debug, Clone)]
pub struct CallStackElement {
    id: ElementId,
    name: SharedStr,
    level: usize,
    parent: Option<ElementId>,
    children: Vec<CallStackElement>,
    call_stack: Option<CallStack>,
}

impl CallStackElement {
    pub(crate) fn new(id: ElementId, name: SharedStr, level: usize, parent: Option<ElementId>) -> Self {
        Self {
            id,
            name,
            level,
            parent,
            children: Vec::new(),
            call_stack: None,
        }
    }

    pub(crate) fn push_child(&mut self, child: CallStackElement) {
        self.children.push(child);
    }

    pub(crate) fn set_call_stack(&mut self, call_stack: CallStack) {
        self.call_stack = Some(call_stack);
    }

    pub(crate) fn offset_ids(&mut self, offset: u32) {
        self.id = ElementId(self.id.0 + offset);
        self.parent = self.parent.map(|p| ElementId(p.0 + offset));
        for child in &mut self.children {
            child.offset_ids(offset);
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn name(&self) -> &SharedStr {
        &self.name
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub fn children(&self) -> &[CallStackElement] {
        &self.children
    }

    pub fn call_stack(&self) -> Option<&CallStack> {
        self.call_stack.as_ref()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn graph_element(&self) -> GraphElement {
        GraphElement {
            id: self.id,
            name: self.name.clone(),
            parent: self.parent,
            level: self.level,
        }
    }

    /// This element and all its descendants, parents before children.
    pub fn descendants(&self) -> Vec<&CallStackElement> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(element) = stack.pop() {
            out.push(element);
            stack.extend(element.children.iter().rev());
        }
        out
    }

    /// Leaf elements below (or equal to) this one, in hierarchy order.
    pub fn leaves(&self) -> Vec<&CallStackElement> {
        self.descendants().into_iter().filter(|e| e.is_leaf()).collect()
    }
}
