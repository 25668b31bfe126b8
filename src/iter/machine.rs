use crate::error::Result;
use crate::machine::MachineContext;
use core::fmt;
use std::ops::{Deref, DerefMut};

/// Outcome of one [`AsyncIteratorMachine::advance`] call.
///
/// `Yield` and `Suspend` carry the index of the point the body stopped at.
/// Points are numbered in source order, shared by awaits and yields, so a
/// yield inside a loop reports the same index on every pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterStep<T> {
    /// Produced one element at yield point `.0`; control returns to the
    /// consumer.
    Yield(u32, T),
    /// Waiting on an operand at await point `.0`; a registration was
    /// recorded.
    Suspend(u32),
    /// The body ran to its end (or finished its cleanup while disposing).
    Complete,
}

/// How an async enumerator finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Completion {
    /// The body ran to its end or failed.
    Natural,
    /// The consumer disposed it before the end.
    Disposed,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Natural => write!(f, "natural"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}

/// The body of an async iterator.
///
/// Like [`AsyncStateMachine`](crate::machine::AsyncStateMachine), plus yield
/// points. When [`IteratorContext::is_disposing`] is true the body must skip
/// straight to its outstanding cleanup blocks from wherever it is suspended
/// at a yield, and must not yield again.
pub trait AsyncIteratorMachine: Send + 'static {
    /// Element type.
    type Item: Send + 'static;

    /// Runs the body until it yields, suspends, completes or fails.
    fn advance(&mut self, cx: &mut IteratorContext<'_>) -> Result<IterStep<Self::Item>>;
}

/// The context handed to an iterator body: the await protocol of
/// [`MachineContext`] plus the disposing flag.
pub struct IteratorContext<'a> {
    inner: MachineContext<'a>,
    disposing: bool,
}

impl<'a> IteratorContext<'a> {
    pub(crate) fn new(inner: MachineContext<'a>, disposing: bool) -> Self {
        Self { inner, disposing }
    }

    /// True once the consumer asked for disposal.
    #[must_use]
    pub const fn is_disposing(&self) -> bool {
        self.disposing
    }
}

impl<'a> Deref for IteratorContext<'a> {
    type Target = MachineContext<'a>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for IteratorContext<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl fmt::Debug for IteratorContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IteratorContext")
            .field("inner", &self.inner)
            .field("disposing", &self.disposing)
            .finish()
    }
}
