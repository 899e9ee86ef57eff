use std::collections::HashMap;
use std::fmt;

use callgraph_protocol::{EventSymbol, SharedStr};
use serde::{Deserialize, Serialize};

/// Scheduling state of a thread, as reported by a kernel analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProcessStatus {
    Unknown,
    WaitBlocked,
    Run,
    RunSyscall,
    Interrupted,
    WaitForCpu,
    WaitUnknown,
    NotAlive,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unknown => "Unknown",
            Self::WaitBlocked => "Blocked",
            Self::Run => "Running",
            Self::RunSyscall => "System call",
            Self::Interrupted => "Interrupted",
            Self::WaitForCpu => "Wait for CPU",
            Self::WaitUnknown => "Wait",
            Self::NotAlive => "Not alive",
        };
        f.write_str(label)
    }
}

/// Identifier of a call site or of a non-call tree node.
///
/// Symbols are compared and hashed by value; they only become human readable
/// through [`Symbol::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Symbol {
    Address(u64),
    Name(SharedStr),
    Status(ProcessStatus),
}

impl Symbol {
    pub fn name(name: &str) -> Self {
        Self::Name(SharedStr::from(name))
    }

    /// Render this symbol for display, asking each provider in turn for
    /// addresses. Unresolved addresses are printed in hexadecimal.
    pub fn resolve(&self, providers: &[&dyn SymbolProvider]) -> String {
        match self {
            Self::Address(address) => providers
                .iter()
                .find_map(|p| p.resolve(*address))
                .map_or_else(|| format!("{address:#x}"), |name| name.to_string()),
            Self::Name(name) => name.to_string(),
            Self::Status(status) => status.to_string(),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) => write!(f, "{address:#x}"),
            Self::Name(name) => f.write_str(name),
            Self::Status(status) => write!(f, "{status}"),
        }
    }
}

impl From<&EventSymbol> for Symbol {
    fn from(symbol: &EventSymbol) -> Self {
        match symbol {
            EventSymbol::Address(address) => Self::Address(*address),
            EventSymbol::Name(name) => Self::Name(name.clone()),
        }
    }
}

impl From<ProcessStatus> for Symbol {
    fn from(status: ProcessStatus) -> Self {
        Self::Status(status)
    }
}

/// Lookup table turning addresses into function names.
pub trait SymbolProvider: Send + Sync {
    fn resolve(&self, address: u64) -> Option<SharedStr>;
}

/// Symbol provider backed by an in-memory address map, e.g. loaded from a
/// configuration file.
#[derive(Debug, Clone, Default)]
pub struct MapSymbolProvider {
    symbols: HashMap<u64, SharedStr>,
}

impl MapSymbolProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: u64, name: impl Into<SharedStr>) {
        self.symbols.insert(address, name.into());
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl FromIterator<(u64, SharedStr)> for MapSymbolProvider {
    fn from_iter<I: IntoIterator<Item = (u64, SharedStr)>>(iter: I) -> Self {
        Self {
            symbols: iter.into_iter().collect(),
        }
    }
}

impl SymbolProvider for MapSymbolProvider {
    fn resolve(&self, address: u64) -> Option<SharedStr> {
        self.symbols.get(&address).cloned()
    }
}
