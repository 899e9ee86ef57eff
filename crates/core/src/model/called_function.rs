use super::Symbol;

/// One call of a function as read back from a call stack: the observation the
/// aggregation is built from.
///
/// `self_time` starts equal to the length of the call and is reduced by the
/// length of every nested call reported through [`CalledFunction::add_child`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalledFunction {
    start: i64,
    end: i64,
    depth: usize,
    symbol: Symbol,
    thread_id: i32,
    process_id: i32,
    cpu_time: Option<i64>,
    self_time: i64,
}

impl CalledFunction {
    pub fn new(start: i64, end: i64, depth: usize, symbol: Symbol, process_id: i32, thread_id: i32) -> Self {
        Self {
            start,
            end,
            depth,
            symbol,
            thread_id,
            process_id,
            cpu_time: None,
            self_time: end - start,
        }
    }

    pub fn with_cpu_time(mut self, cpu_time: Option<i64>) -> Self {
        self.cpu_time = cpu_time;
        self
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn length(&self) -> i64 {
        self.end - self.start
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn thread_id(&self) -> i32 {
        self.thread_id
    }

    pub fn process_id(&self) -> i32 {
        self.process_id
    }

    pub fn cpu_time(&self) -> Option<i64> {
        self.cpu_time
    }

    pub fn self_time(&self) -> i64 {
        self.self_time
    }

    /// Account for a call nested directly inside this one.
    pub fn add_child(&mut self, child: &CalledFunction) {
        self.self_time -= child.length();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_time_excludes_nested_calls() {
        let mut foo = CalledFunction::new(0, 100, 1, Symbol::name("foo"), 1, 1);
        foo.add_child(&CalledFunction::new(20, 40, 2, Symbol::name("bar"), 1, 1));
        foo.add_child(&CalledFunction::new(45, 80, 2, Symbol::name("bar"), 1, 1));
        assert_eq!(foo.length(), 100);
        assert_eq!(foo.self_time(), 45);
        assert_eq!(foo.cpu_time(), None);
    }
}
