//! Plain-text output of the `callgraph` subcommands.

use std::io::{self, Write};

use callgraph_core::views::{FlameBox, RankedEntry};
use callgraph_protocol::{DiffSnapshot, ElementSnapshot, ExtraDataSnapshot, TimeUnit, TreeSnapshot};

const INDENT: &str = "  ";

pub fn write_elements(out: &mut dyn Write, elements: &[ElementSnapshot], unit: TimeUnit) -> io::Result<()> {
    for element in elements {
        writeln!(out, "{}", element.name)?;
        let mut stack: Vec<(usize, &TreeSnapshot)> = element.roots.iter().rev().map(|r| (1, r)).collect();
        while let Some((depth, node)) = stack.pop() {
            write!(out, "{}{}  {}", INDENT.repeat(depth), node.label, unit.format_duration(node.weight))?;
            if let Some(self_time) = node.self_time {
                write!(out, "  self {}", unit.format_duration(self_time))?;
            }
            if let Some(cpu_time) = node.cpu_time {
                write!(out, "  cpu {}", unit.format_duration(cpu_time))?;
            }
            if let Some(calls) = node.calls {
                write!(out, "  x{calls}")?;
            }
            writeln!(out)?;
            for set in &node.extra {
                write_extra_data(out, set, depth + 1)?;
            }
            stack.extend(node.children.iter().rev().map(|c| (depth + 1, c)));
        }
    }
    Ok(())
}

// Extra data weights are printed raw: sampled trees count samples, not time.
fn write_extra_data(out: &mut dyn Write, set: &ExtraDataSnapshot, depth: usize) -> io::Result<()> {
    writeln!(out, "{}[{}]", INDENT.repeat(depth), set.name)?;
    let mut stack: Vec<(usize, &TreeSnapshot)> = set.trees.iter().rev().map(|t| (depth + 1, t)).collect();
    while let Some((depth, node)) = stack.pop() {
        writeln!(out, "{}{}  {}", INDENT.repeat(depth), node.label, node.weight)?;
        stack.extend(node.children.iter().rev().map(|c| (depth + 1, c)));
    }
    Ok(())
}

pub fn write_ranked(out: &mut dyn Write, entries: &[(String, &RankedEntry)], unit: TimeUnit) -> io::Result<()> {
    let width = entries.iter().map(|(name, _)| name.len()).max().unwrap_or(0).max("Symbol Name".len());
    writeln!(out, "{:<width$}  {:>10}  {:>10}  {:>8}", "Symbol Name", "Self", "Total", "Count")?;
    for (name, entry) in entries {
        writeln!(
            out,
            "{name:<width$}  {:>10}  {:>10}  {:>8}",
            unit.format_duration(entry.self_time),
            unit.format_duration(entry.total_time),
            entry.count,
        )?;
    }
    Ok(())
}

pub fn write_diff(out: &mut dyn Write, element: &str, trees: &[DiffSnapshot], unit: TimeUnit) -> io::Result<()> {
    writeln!(out, "{element}")?;
    let mut stack: Vec<(usize, &DiffSnapshot)> = trees.iter().rev().map(|t| (1, t)).collect();
    while let Some((depth, node)) = stack.pop() {
        let change = match node.diff {
            Some(ratio) if ratio.is_finite() => format!("{:+.1}%", ratio * 100.0),
            Some(_) => "n/a".to_owned(),
            None => "new".to_owned(),
        };
        writeln!(
            out,
            "{}{}  {}  {change}",
            INDENT.repeat(depth),
            node.label,
            unit.format_duration(node.weight)
        )?;
        stack.extend(node.children.iter().rev().map(|c| (depth + 1, c)));
    }
    Ok(())
}

/// One line per box: depth, offset and width, then the label.
pub fn write_flame(out: &mut dyn Write, boxes: &[(String, &FlameBox)]) -> io::Result<()> {
    for (label, flame_box) in boxes {
        writeln!(out, "{}\t{}\t{}\t{label}", flame_box.depth, flame_box.offset, flame_box.weight)?;
    }
    Ok(())
}
