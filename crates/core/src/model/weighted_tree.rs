use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::hash::Hash;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("cannot merge tree of {other} into tree of {target}")]
    SymbolMismatch { target: String, other: String },
}

/// Per-variant payload carried by every node of a [`WeightedTree`].
///
/// `merge_data` is called when two nodes with the same symbol are merged. It
/// must only combine the payload; weights and children are handled by the
/// tree itself.
pub trait TreeData: Clone + Default + fmt::Debug {
    fn merge_data(&mut self, other: &Self);
}

impl TreeData for () {
    fn merge_data(&mut self, _other: &Self) {}
}

/// Hierarchical aggregation node.
///
/// A node owns its children, keyed by their symbol: adding a child whose
/// symbol is already present merges it into the existing one, so the number
/// of children is bounded by the number of distinct symbols rather than by
/// the number of observations.
///
/// The weight of a node accounts for the weight of its children, which
/// therefore never sum to more than their parent's weight. This is not
/// checked here; producers are responsible for it.
#[derive(Debug)]
pub struct WeightedTree<T, D = ()> {
    object: T,
    weight: i64,
    data: D,
    children: HashMap<T, WeightedTree<T, D>>,
}

impl<T, D> WeightedTree<T, D>
where
    T: Clone + Eq + Hash + fmt::Debug,
    D: TreeData,
{
    pub fn new(object: T) -> Self {
        Self::with_weight(object, 0)
    }

    pub fn with_weight(object: T, weight: i64) -> Self {
        Self {
            object,
            weight,
            data: D::default(),
            children: HashMap::new(),
        }
    }

    pub fn object(&self) -> &T {
        &self.object
    }

    pub fn weight(&self) -> i64 {
        self.weight
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut D {
        &mut self.data
    }

    pub fn add_to_weight(&mut self, delta: i64) {
        self.weight += delta;
    }

    pub fn children(&self) -> impl Iterator<Item = &WeightedTree<T, D>> {
        self.children.values()
    }

    pub fn child(&self, object: &T) -> Option<&WeightedTree<T, D>> {
        self.children.get(object)
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Sum of the weights of the direct children.
    pub fn children_weight(&self) -> i64 {
        self.children.values().map(WeightedTree::weight).sum()
    }

    /// Direct children, heaviest first.
    pub fn sorted_children(&self) -> Vec<&WeightedTree<T, D>> {
        let mut children: Vec<_> = self.children.values().collect();
        children.sort_by(|a, b| b.cmp_by_weight(a));
        children
    }

    /// Attach `child` under this node, merging it into an existing child with
    /// the same symbol.
    pub fn add_child(&mut self, child: WeightedTree<T, D>) {
        match self.children.entry(child.object.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(child);
            }
            Entry::Occupied(mut slot) => slot.get_mut().absorb(child),
        }
    }

    /// Merge `other` into this node: weights are added, the payloads merged,
    /// then children are merged recursively by symbol.
    pub fn merge(&mut self, other: &WeightedTree<T, D>) -> Result<(), TreeError> {
        if self.object != other.object {
            return Err(TreeError::SymbolMismatch {
                target: format!("{:?}", self.object),
                other: format!("{:?}", other.object),
            });
        }
        self.merge_same(other);
        Ok(())
    }

    fn merge_same(&mut self, other: &WeightedTree<T, D>) {
        let mut work = vec![(self, other)];
        while let Some((target, source)) = work.pop() {
            target.weight += source.weight;
            target.data.merge_data(&source.data);
            let mut shared = HashMap::new();
            for (object, source_child) in &source.children {
                if target.children.contains_key(object) {
                    shared.insert(object, source_child);
                } else {
                    target.children.insert(object.clone(), source_child.copy_of());
                }
            }
            for (object, child) in target.children.iter_mut() {
                if let Some(source_child) = shared.remove(object) {
                    work.push((child, source_child));
                }
            }
        }
    }

    // Same as `merge` for a node that is already known to share our symbol,
    // reusing its children instead of copying them.
    pub(crate) fn absorb(&mut self, other: WeightedTree<T, D>) {
        let mut work = vec![(self, other)];
        while let Some((target, mut source)) = work.pop() {
            target.weight += source.weight;
            target.data.merge_data(&source.data);
            let mut shared = HashMap::new();
            for (object, source_child) in source.children.drain() {
                match target.children.entry(object) {
                    Entry::Vacant(slot) => {
                        slot.insert(source_child);
                    }
                    Entry::Occupied(slot) => {
                        shared.insert(slot.key().clone(), source_child);
                    }
                }
            }
            for (object, child) in target.children.iter_mut() {
                if let Some(source_child) = shared.remove(object) {
                    work.push((child, source_child));
                }
            }
        }
    }

    /// Deep copy of this node and its subtree.
    pub fn copy_of(&self) -> Self {
        self.map_nodes(|node| WeightedTree {
            object: node.object.clone(),
            weight: node.weight,
            data: node.data.clone(),
            children: HashMap::new(),
        })
    }

    // Rebuild the tree shape level by level, `convert` producing each node
    // without its children.
    fn map_nodes<E, F>(&self, convert: F) -> WeightedTree<T, E>
    where
        F: Fn(&Self) -> WeightedTree<T, E>,
    {
        let mut root = convert(self);
        let mut work = vec![(&mut root, self)];
        while let Some((target, source)) = work.pop() {
            for (object, source_child) in &source.children {
                target.children.insert(object.clone(), convert(source_child));
            }
            for (object, child) in target.children.iter_mut() {
                if let Some(source_child) = source.children.get(object) {
                    work.push((child, source_child));
                }
            }
        }
        root
    }

    /// Number of levels under and including this node; 1 for a leaf.
    pub fn max_depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((node, depth)) = stack.pop() {
            max = max.max(depth);
            stack.extend(node.children.values().map(|c| (c, depth + 1)));
        }
        max
    }

    /// Pre-order iterator over this node and its descendants, with their depth
    /// relative to this node (0 for this node).
    pub fn iter_depth_first(&self) -> DepthFirst<'_, T, D> {
        DepthFirst {
            stack: vec![(0, self)],
        }
    }

    /// Visit this node and its descendants in pre-order, passing each node
    /// with the path of its ancestors, outermost first. Trees keep no parent
    /// links; this is how a node's callers are known.
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(&[&WeightedTree<T, D>], &WeightedTree<T, D>),
    {
        let mut path: Vec<&WeightedTree<T, D>> = Vec::new();
        let mut stack = vec![(0usize, self)];
        while let Some((depth, node)) = stack.pop() {
            path.truncate(depth);
            visit(&path, node);
            path.push(node);
            stack.extend(node.children.values().map(|c| (depth + 1, c)));
        }
    }

    pub fn cmp_by_weight(&self, other: &Self) -> Ordering {
        self.weight.cmp(&other.weight)
    }

    /// Convert into a plain tree keeping symbols and weights only.
    pub fn to_plain(&self) -> WeightedTree<T> {
        self.map_nodes(|node| WeightedTree::with_weight(node.object.clone(), node.weight))
    }
}

impl<T, D> Clone for WeightedTree<T, D>
where
    T: Clone + Eq + Hash + fmt::Debug,
    D: TreeData,
{
    fn clone(&self) -> Self {
        self.copy_of()
    }
}

// Children are unlinked into a flat list first so that dropping a deep tree
// does not recurse once per level.
impl<T, D> Drop for WeightedTree<T, D> {
    fn drop(&mut self) {
        let mut pending: Vec<_> = self.children.drain().map(|(_, child)| child).collect();
        while let Some(mut node) = pending.pop() {
            pending.extend(node.children.drain().map(|(_, child)| child));
        }
    }
}

pub struct DepthFirst<'a, T, D> {
    stack: Vec<(usize, &'a WeightedTree<T, D>)>,
}

impl<'a, T, D> Iterator for DepthFirst<'a, T, D> {
    type Item = (usize, &'a WeightedTree<T, D>);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        self.stack
            .extend(node.children.values().map(|c| (depth + 1, c)));
        Some((depth, node))
    }
}

impl<T: fmt::Display, D> fmt::Display for WeightedTree<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeightedTree: {} ({})", self.object, self.weight)
    }
}
