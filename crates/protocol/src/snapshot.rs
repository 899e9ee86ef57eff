use serde::{Deserialize, Serialize};

use crate::SharedStr;

/// Immutable, serializable copy of one aggregated tree node.
///
/// Statistics are only present for call-site nodes; plain weighted trees
/// (sampled data, kernel statuses) leave them empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub label: SharedStr,
    pub weight: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calls: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeSnapshot>,
    /// Secondary data attached to a call site next to its callees, such as
    /// the time spent per scheduling state or the sampled stacks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<ExtraDataSnapshot>,
}

/// One named extra data set of a call-site node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraDataSnapshot {
    pub name: SharedStr,
    pub trees: Vec<TreeSnapshot>,
}

/// The forest built for one grouping element (process, thread, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub name: SharedStr,
    pub roots: Vec<TreeSnapshot>,
}

/// One node of a differential tree.
///
/// `diff` is `None` when the node has no counterpart on the compared side;
/// JSON has no NaN, so the engine's NaN is mapped to a missing value here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffSnapshot {
    pub label: SharedStr,
    pub weight: i64,
    pub diff: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DiffSnapshot>,
}

impl TreeSnapshot {
    /// Number of nodes in this snapshot, including itself.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TreeSnapshot::node_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fields_are_skipped() {
        let node = TreeSnapshot {
            label: "op1".into(),
            weight: 9,
            self_time: None,
            cpu_time: None,
            calls: None,
            children: vec![],
            extra: vec![],
        };
        let json = serde_json::to_string(&node).unwrap_or_default();
        assert_eq!(json, r#"{"label":"op1","weight":9}"#);
    }

    #[test]
    fn node_count_includes_descendants() {
        let leaf = TreeSnapshot {
            label: "op3".into(),
            weight: 1,
            self_time: Some(1),
            cpu_time: None,
            calls: Some(1),
            children: vec![],
            extra: vec![],
        };
        let root = TreeSnapshot {
            label: "op2".into(),
            weight: 4,
            self_time: Some(3),
            cpu_time: None,
            calls: Some(1),
            children: vec![leaf.clone(), leaf],
            extra: vec![],
        };
        assert_eq!(root.node_count(), 3);
    }

    #[test]
    fn missing_diff_serializes_as_null() {
        let node = DiffSnapshot {
            label: "x".into(),
            weight: 1,
            diff: None,
            children: vec![],
        };
        let json = serde_json::to_string(&node).unwrap_or_default();
        assert_eq!(json, r#"{"label":"x","weight":1,"diff":null}"#);
    }
}
