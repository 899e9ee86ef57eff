use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{AggregatedCalledFunction, Symbol};

/// A single row in the ranked table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub symbol: Symbol,
    pub self_time: i64,
    /// Time spent inside the symbol, nested recursive calls counted once.
    pub total_time: i64,
    pub count: u64,
}

/// Sort field for the ranked view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankedSort {
    #[default]
    #[serde(rename = "self")]
    SelfTime,
    #[serde(rename = "total")]
    TotalTime,
    Name,
    Count,
}

/// Flatten a forest into one row per symbol, wherever it occurs in the trees.
///
/// Rows are sorted descending on `sort` (alphabetically for
/// [`RankedSort::Name`]) and reversed when `ascending` is set.
pub fn ranked_entries(forest: &[AggregatedCalledFunction], sort: RankedSort, ascending: bool) -> Vec<RankedEntry> {
    let mut by_symbol: HashMap<&Symbol, RankedEntry> = HashMap::new();
    // Symbols on the current path; a node whose symbol is already open is
    // nested in a call of itself and its duration is already accounted for.
    let mut open: HashMap<&Symbol, usize> = HashMap::new();
    let mut stack: Vec<Visit<'_>> = forest.iter().rev().map(Visit::Enter).collect();

    while let Some(visit) = stack.pop() {
        let node = match visit {
            Visit::Enter(node) => node,
            Visit::Leave(symbol) => {
                if let Some(depth) = open.get_mut(symbol) {
                    *depth -= 1;
                }
                continue;
            }
        };
        let symbol = node.object();
        let entry = by_symbol.entry(symbol).or_insert_with(|| RankedEntry {
            symbol: symbol.clone(),
            self_time: 0,
            total_time: 0,
            count: 0,
        });
        entry.self_time += node.self_time();
        entry.count += node.call_count();
        let depth = open.entry(symbol).or_default();
        if *depth == 0 {
            entry.total_time += node.duration();
        }
        *depth += 1;
        stack.push(Visit::Leave(symbol));
        stack.extend(node.children().map(Visit::Enter));
    }

    let mut entries: Vec<RankedEntry> = by_symbol.into_values().collect();
    entries.sort_by(|a, b| match sort {
        RankedSort::SelfTime => b.self_time.cmp(&a.self_time),
        RankedSort::TotalTime => b.total_time.cmp(&a.total_time),
        RankedSort::Name => a.symbol.to_string().cmp(&b.symbol.to_string()),
        RankedSort::Count => b.count.cmp(&a.count),
    }
    .then_with(|| a.symbol.cmp(&b.symbol)));

    if ascending {
        entries.reverse();
    }

    entries
}

enum Visit<'a> {
    Enter(&'a AggregatedCalledFunction),
    Leave(&'a Symbol),
}
