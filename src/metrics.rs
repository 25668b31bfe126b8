//! Per-thread runtime counters.
//!
//! The whole point of [`ValueTask`](crate::task::ValueTask) is that the
//! synchronous path allocates nothing. These counters make that checkable:
//! every completion signal allocation, every state machine moved to the heap
//! and every continuation registration bumps a counter on the thread where it
//! happened. Counters are thread-local so parallel tests never see each
//! other's traffic.

use core::fmt;
use std::cell::RefCell;

/// A monotonically increasing counter.
#[derive(Debug, Clone)]
pub struct Counter {
    name: &'static str,
    value: u64,
}

impl Counter {
    /// Creates a new counter with the given name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name, value: 0 }
    }

    /// Returns the counter name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the current value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.value
    }

    /// Increments the counter by 1.
    pub fn inc(&mut self) {
        self.value = self.value.saturating_add(1);
    }

    /// Resets the counter to zero.
    pub fn reset(&mut self) {
        self.value = 0;
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

#[derive(Debug)]
struct ThreadCounters {
    signals_allocated: Counter,
    machines_boxed: Counter,
    continuations_registered: Counter,
    continuations_dispatched: Counter,
}

impl ThreadCounters {
    const fn new() -> Self {
        Self {
            signals_allocated: Counter::new("signals_allocated"),
            machines_boxed: Counter::new("machines_boxed"),
            continuations_registered: Counter::new("continuations_registered"),
            continuations_dispatched: Counter::new("continuations_dispatched"),
        }
    }
}

thread_local! {
    static COUNTERS: RefCell<ThreadCounters> = const { RefCell::new(ThreadCounters::new()) };
}

/// A point-in-time copy of the calling thread's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Completion signals allocated on this thread.
    pub signals_allocated: u64,
    /// State machines moved to heap storage on this thread.
    pub machines_boxed: u64,
    /// Continuations registered against a signal on this thread.
    pub continuations_registered: u64,
    /// Continuations handed to a captured executor instead of running inline.
    pub continuations_dispatched: u64,
}

impl Snapshot {
    /// Counter deltas since an earlier snapshot.
    #[must_use]
    pub const fn since(&self, earlier: &Self) -> Self {
        Self {
            signals_allocated: self.signals_allocated - earlier.signals_allocated,
            machines_boxed: self.machines_boxed - earlier.machines_boxed,
            continuations_registered: self.continuations_registered
                - earlier.continuations_registered,
            continuations_dispatched: self.continuations_dispatched
                - earlier.continuations_dispatched,
        }
    }

    /// True when nothing was allocated and nothing was registered.
    #[must_use]
    pub const fn is_allocation_free(&self) -> bool {
        self.signals_allocated == 0 && self.machines_boxed == 0
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "signals_allocated={} machines_boxed={} continuations_registered={} continuations_dispatched={}",
            self.signals_allocated,
            self.machines_boxed,
            self.continuations_registered,
            self.continuations_dispatched
        )
    }
}

/// Copies the calling thread's counters.
#[must_use]
pub fn snapshot() -> Snapshot {
    COUNTERS.with(|c| {
        let c = c.borrow();
        Snapshot {
            signals_allocated: c.signals_allocated.value(),
            machines_boxed: c.machines_boxed.value(),
            continuations_registered: c.continuations_registered.value(),
            continuations_dispatched: c.continuations_dispatched.value(),
        }
    })
}

/// Resets the calling thread's counters.
pub fn reset() {
    COUNTERS.with(|c| {
        let mut c = c.borrow_mut();
        c.signals_allocated.reset();
        c.machines_boxed.reset();
        c.continuations_registered.reset();
        c.continuations_dispatched.reset();
    });
}

pub(crate) fn record_signal_allocated() {
    COUNTERS.with(|c| c.borrow_mut().signals_allocated.inc());
}

pub(crate) fn record_machine_boxed() {
    COUNTERS.with(|c| c.borrow_mut().machines_boxed.inc());
}

pub(crate) fn record_continuation_registered() {
    COUNTERS.with(|c| c.borrow_mut().continuations_registered.inc());
}

pub(crate) fn record_continuation_dispatched() {
    COUNTERS.with(|c| c.borrow_mut().continuations_dispatched.inc());
}
