//! Derived, render-agnostic views over call-graph forests.

pub mod flame;
pub mod ranked;
pub mod snapshot;

pub use flame::{FlameBox, flame_layout};
pub use ranked::{RankedEntry, RankedSort, ranked_entries};
pub use snapshot::{diff_snapshot, element_snapshots, function_snapshot, plain_snapshot};
