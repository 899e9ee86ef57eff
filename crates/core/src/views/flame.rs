use serde::{Deserialize, Serialize};

use crate::model::{Symbol, TreeData, WeightedTree};

/// One box of a left-heavy flame graph. Offsets and widths are in weight
/// units; a consumer scales them to its own width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlameBox {
    pub symbol: Symbol,
    pub depth: usize,
    pub offset: i64,
    pub weight: i64,
}

/// Lay a forest out as a left-heavy flame graph: siblings are placed side
/// by side heaviest first, each child starting at its parent's offset.
/// Boxes lighter than `min_weight` are dropped together with their subtree.
pub fn flame_layout<D: TreeData>(forest: &[WeightedTree<Symbol, D>], min_weight: i64) -> Vec<FlameBox> {
    let mut roots: Vec<_> = forest.iter().collect();
    sort_heaviest_first(&mut roots);

    let mut boxes = Vec::new();
    let mut stack = Vec::new();
    push_row(&mut stack, &roots, 0, 0);
    while let Some((node, depth, offset)) = stack.pop() {
        if node.weight() < min_weight.max(1) {
            continue;
        }
        boxes.push(FlameBox {
            symbol: node.object().clone(),
            depth,
            offset,
            weight: node.weight(),
        });
        let mut children = node.sorted_children();
        sort_heaviest_first(&mut children);
        push_row(&mut stack, &children, depth + 1, offset);
    }
    boxes
}

// Equal weights fall back to symbol order so the layout is stable.
fn sort_heaviest_first<D: TreeData>(nodes: &mut [&WeightedTree<Symbol, D>]) {
    nodes.sort_by(|a, b| b.cmp_by_weight(a).then_with(|| a.object().cmp(b.object())));
}

// Pushed in reverse so that the heaviest sibling is popped first.
fn push_row<'a, D: TreeData>(
    stack: &mut Vec<(&'a WeightedTree<Symbol, D>, usize, i64)>,
    row: &[&'a WeightedTree<Symbol, D>],
    depth: usize,
    mut offset: i64,
) {
    let start = stack.len();
    for &node in row {
        stack.push((node, depth, offset));
        offset += node.weight();
    }
    stack[start..].reverse();
}
