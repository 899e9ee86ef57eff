use serde::{Deserialize, Serialize};

use crate::SharedStr;

/// Whether a call event opens or closes a function on its thread's stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Entry,
    Exit,
}

/// The call-site identifier carried by an event, as recorded by the tracer.
///
/// Instrumented traces usually carry names, sampled or binary traces carry
/// addresses that are resolved later through symbol providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventSymbol {
    Address(u64),
    Name(SharedStr),
}

/// One time-stamped call or return observed on a thread.
///
/// Events of a given thread must be ordered by timestamp; an `Exit` closes the
/// innermost open `Entry` of the same thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEvent {
    pub timestamp: i64,
    pub thread_id: i32,
    /// Owning process. Defaults to the thread id for single-threaded traces.
    #[serde(default)]
    pub process_id: Option<i32>,
    pub symbol: EventSymbol,
    pub kind: EventKind,
}

impl CallEvent {
    pub fn entry(timestamp: i64, process_id: i32, thread_id: i32, symbol: impl Into<EventSymbol>) -> Self {
        Self {
            timestamp,
            thread_id,
            process_id: Some(process_id),
            symbol: symbol.into(),
            kind: EventKind::Entry,
        }
    }

    pub fn exit(timestamp: i64, process_id: i32, thread_id: i32, symbol: impl Into<EventSymbol>) -> Self {
        Self {
            timestamp,
            thread_id,
            process_id: Some(process_id),
            symbol: symbol.into(),
            kind: EventKind::Exit,
        }
    }

    pub fn process_id(&self) -> i32 {
        self.process_id.unwrap_or(self.thread_id)
    }
}

/// One stack trace captured by a sampling profiler on a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEvent {
    pub timestamp: i64,
    pub thread_id: i32,
    /// Innermost frame (the function running when sampled) first.
    pub stack: Vec<EventSymbol>,
}

impl SampleEvent {
    pub fn new(timestamp: i64, thread_id: i32, stack: Vec<EventSymbol>) -> Self {
        Self {
            timestamp,
            thread_id,
            stack,
        }
    }
}

impl From<&str> for EventSymbol {
    fn from(name: &str) -> Self {
        Self::Name(SharedStr::from(name))
    }
}

impl From<u64> for EventSymbol {
    fn from(address: u64) -> Self {
        Self::Address(address)
    }
}
