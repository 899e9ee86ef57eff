use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use callgraph_protocol::{CallEvent, EventKind, EventSymbol};
use thiserror::Error;
use tracing::debug;

use super::{CallStackSeries, SeriesLevel, symbol_of};
use crate::model::Symbol;
use crate::statesystem::{InMemoryStateSystem, Quark, StateSystemError, StateValue};

/// Top-level attribute holding one sub-attribute per process.
pub const PROCESSES: &str = "Processes";
/// Stack attribute of a thread; its sub-attributes are the stack depths.
pub const CALL_STACK: &str = "CallStack";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("event at {timestamp} arrived after {previous}")]
    OutOfOrder { timestamp: i64, previous: i64 },
    #[error("thread {thread_id} returned at {timestamp} with an empty call stack")]
    UnbalancedReturn { thread_id: i32, timestamp: i64 },
    #[error("state system: {0}")]
    StateSystem(#[from] StateSystemError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Records call events into a state system laid out as
/// `Processes/<pid>/<tid>/CallStack/<depth>`.
#[derive(Debug)]
pub struct CallStackStateProvider {
    state_system: InMemoryStateSystem,
    stacks: HashMap<(i32, i32), Quark>,
    last_timestamp: i64,
}

impl CallStackStateProvider {
    pub fn new(start_time: i64) -> Self {
        Self {
            state_system: InMemoryStateSystem::new(start_time),
            stacks: HashMap::new(),
            last_timestamp: start_time,
        }
    }

    /// Build and close a state system from time-ordered `events`. The history
    /// spans from the first to the last event.
    pub fn build(events: &[CallEvent]) -> Result<Arc<InMemoryStateSystem>, ProviderError> {
        let start = events.first().map_or(0, |e| e.timestamp);
        let mut provider = Self::new(start);
        for event in events {
            provider.process_event(event)?;
        }
        let end = provider.last_timestamp;
        provider.close(end)
    }

    fn stack_quark(&mut self, process_id: i32, thread_id: i32) -> Quark {
        *self.stacks.entry((process_id, thread_id)).or_insert_with(|| {
            self.state_system.quark_absolute_and_add(&[
                PROCESSES,
                &process_id.to_string(),
                &thread_id.to_string(),
                CALL_STACK,
            ])
        })
    }

    pub fn process_event(&mut self, event: &CallEvent) -> Result<(), ProviderError> {
        if event.timestamp < self.last_timestamp {
            return Err(ProviderError::OutOfOrder {
                timestamp: event.timestamp,
                previous: self.last_timestamp,
            });
        }
        self.last_timestamp = event.timestamp;
        let stack = self.stack_quark(event.process_id(), event.thread_id);
        match event.kind {
            EventKind::Entry => {
                let value = match &event.symbol {
                    EventSymbol::Address(address) => StateValue::Int(*address as i64),
                    EventSymbol::Name(name) => StateValue::Str(name.clone()),
                };
                self.state_system.push_attribute(event.timestamp, value, stack)?;
            }
            EventKind::Exit => {
                let popped = self.state_system.pop_attribute(event.timestamp, stack)?;
                let Some(popped) = popped else {
                    return Err(ProviderError::UnbalancedReturn {
                        thread_id: event.thread_id,
                        timestamp: event.timestamp,
                    });
                };
                let expected = Symbol::from(&event.symbol);
                if symbol_of(&popped).as_ref() != Some(&expected) {
                    debug!(
                        thread_id = event.thread_id,
                        timestamp = event.timestamp,
                        %expected,
                        "exit does not match the innermost open call"
                    );
                }
            }
        }
        Ok(())
    }

    /// Close the history at `end` and hand out the finished state system.
    pub fn close(mut self, end: i64) -> Result<Arc<InMemoryStateSystem>, ProviderError> {
        self.state_system.close_history(end)?;
        debug!(
            attributes = self.state_system.attribute_count(),
            threads = self.stacks.len(),
            "call stack state system closed"
        );
        Ok(Arc::new(self.state_system))
    }

    /// The `Processes > Threads` series of a state system built by this
    /// provider.
    pub fn series(state_system: Arc<InMemoryStateSystem>) -> Result<CallStackSeries, StateSystemError> {
        let levels = [
            SeriesLevel::new("Processes", &[PROCESSES, "*"]),
            SeriesLevel::new("Threads", &["*"]),
        ];
        CallStackSeries::new("Call stacks", state_system, &levels)
    }
}

/// Read a JSON array of call events.
pub fn load_events<R: Read>(reader: R) -> Result<Vec<CallEvent>, ProviderError> {
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statesystem::StateSystem;

    #[test]
    fn entries_and_exits_become_stack_intervals() {
        let events = [
            CallEvent::entry(1, 1, 2, "op1"),
            CallEvent::entry(3, 1, 2, "op2"),
            CallEvent::exit(7, 1, 2, "op2"),
            CallEvent::exit(10, 1, 2, "op1"),
        ];
        let ss = CallStackStateProvider::build(&events).unwrap();
        assert_eq!(ss.start_time(), 1);
        assert_eq!(ss.current_end_time(), 10);

        let depth2 = ss.quark_absolute(&[PROCESSES, "1", "2", CALL_STACK, "2"]).unwrap();
        let op2 = ss.query_single_state(5, depth2).unwrap();
        assert_eq!((op2.start, op2.end), (3, 6));
        assert_eq!(op2.value, StateValue::Str("op2".into()));
    }

    #[test]
    fn out_of_order_events_are_rejected() {
        let mut provider = CallStackStateProvider::new(0);
        provider.process_event(&CallEvent::entry(5, 1, 1, "a")).unwrap();
        let err = provider.process_event(&CallEvent::entry(4, 1, 1, "b"));
        assert!(matches!(err, Err(ProviderError::OutOfOrder { timestamp: 4, previous: 5 })));
    }

    #[test]
    fn unbalanced_exit_is_rejected() {
        let events = [CallEvent::entry(0, 1, 1, "a"), CallEvent::exit(1, 1, 1, "a"), CallEvent::exit(2, 1, 1, "a")];
        let err = CallStackStateProvider::build(&events);
        assert!(matches!(err, Err(ProviderError::UnbalancedReturn { thread_id: 1, timestamp: 2 })));
    }

    #[test]
    fn addresses_are_stored_as_integers() {
        let events = [CallEvent::entry(0, 3, 4, 0xdead_u64), CallEvent::exit(9, 3, 4, 0xdead_u64)];
        let ss = CallStackStateProvider::build(&events).unwrap();
        let series = CallStackSeries::new(
            "s",
            ss.clone(),
            &[SeriesLevel::new("Processes", &[PROCESSES, "*"]), SeriesLevel::new("Threads", &["*"])],
        )
        .unwrap();
        let stack = series.root_elements()[0].children()[0].call_stack().unwrap();
        assert_eq!((stack.process_id(), stack.thread_id()), (3, 4));
        let depth1 = ss.quark_absolute(&[PROCESSES, "3", "4", CALL_STACK, "1"]).unwrap();
        let value = ss.query_single_state(0, depth1).unwrap().value;
        assert_eq!(symbol_of(&value), Some(Symbol::Address(0xdead)));
    }

    #[test]
    fn loads_events_from_json() {
        let json = r#"[
            {"timestamp": 1, "thread_id": 2, "process_id": 1, "symbol": "op1", "kind": "entry"},
            {"timestamp": 4, "thread_id": 2, "symbol": 4096, "kind": "exit"}
        ]"#;
        let events = load_events(json.as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].process_id(), 2);
        assert_eq!(events[1].symbol, EventSymbol::Address(4096));
        assert!(matches!(load_events("{".as_bytes()), Err(ProviderError::Json(_))));
    }

    #[test]
    fn empty_trace_builds_an_empty_state_system() {
        let ss = CallStackStateProvider::build(&[]).unwrap();
        let series = CallStackStateProvider::series(ss).unwrap();
        assert!(series.root_elements().is_empty());
        assert_eq!(series.element_count(), 0);
    }
}
