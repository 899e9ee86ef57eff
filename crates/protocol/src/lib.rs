pub mod events;
pub mod shared_str;
pub mod snapshot;
pub mod units;

pub use events::{CallEvent, EventKind, EventSymbol, SampleEvent};
pub use shared_str::SharedStr;
pub use snapshot::{DiffSnapshot, ElementSnapshot, ExtraDataSnapshot, TreeSnapshot};
pub use units::TimeUnit;
