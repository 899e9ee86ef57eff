use serde::{Deserialize, Serialize};

/// Unit of the timestamps fed to the engine, used only for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    Nanoseconds,
    Microseconds,
    Milliseconds,
}

impl TimeUnit {
    fn to_nanos(self, value: f64) -> f64 {
        match self {
            Self::Nanoseconds => value,
            Self::Microseconds => value * 1_000.0,
            Self::Milliseconds => value * 1_000_000.0,
        }
    }

    /// Format a duration expressed in this unit with the largest readable suffix.
    pub fn format_duration(self, value: i64) -> String {
        let ns = self.to_nanos(value as f64);
        let abs = ns.abs();
        if abs >= 1_000_000_000.0 {
            format!("{:.2}s", ns / 1_000_000_000.0)
        } else if abs >= 1_000_000.0 {
            format!("{:.1}ms", ns / 1_000_000.0)
        } else if abs >= 1_000.0 {
            format!("{:.1}µs", ns / 1_000.0)
        } else {
            format!("{ns:.0}ns")
        }
    }
}
