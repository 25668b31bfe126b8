//! The await-facing view a state machine gets while it runs.

use crate::error::Result;
use crate::signal::Continuation;
use crate::task::{Awaiter, CompletionHandle};
use core::fmt;

/// A continuation registration recorded during one `advance` call.
///
/// The driver performs it only after the machine has been moved to its
/// final (heap) location, so the continuation always targets that copy.
pub(crate) struct Registration {
    handle: CompletionHandle,
    capture: bool,
}

impl Registration {
    pub(crate) fn perform(self, continuation: Continuation) {
        if self.capture {
            self.handle.on_completed(continuation);
        } else {
            self.handle.on_completed_unsafe(continuation);
        }
    }
}

/// Result of [`MachineContext::try_await`].
pub enum AwaitPoll<A: Awaiter> {
    /// The operand was already complete; here is its result.
    Ready(Result<A::Output>),
    /// The operand is pending. A resumption is registered; stash the awaiter
    /// in the machine and return [`Step::Suspend`](super::Step::Suspend).
    Suspended(A),
}

impl<A: Awaiter> fmt::Debug for AwaitPoll<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(result) => f
                .debug_tuple("AwaitPoll::Ready")
                .field(&result.is_ok())
                .finish(),
            Self::Suspended(_) => f.write_str("AwaitPoll::Suspended"),
        }
    }
}

/// Handed to [`AsyncStateMachine::advance`](super::AsyncStateMachine::advance).
///
/// At most one registration may be recorded per `advance` call; a machine
/// suspends at exactly one await.
pub struct MachineContext<'a> {
    registration: &'a mut Option<Registration>,
}

impl<'a> MachineContext<'a> {
    pub(crate) fn new(registration: &'a mut Option<Registration>) -> Self {
        Self { registration }
    }

    fn record(&mut self, handle: CompletionHandle, capture: bool) {
        assert!(
            self.registration.is_none(),
            "a state machine may register only one continuation per advance"
        );
        *self.registration = Some(Registration { handle, capture });
    }

    /// Arranges for the machine to be advanced again once `awaiter`
    /// completes, honouring the awaiter's captured-context policy.
    ///
    /// # Panics
    ///
    /// Panics if a registration was already recorded in this advance.
    pub fn await_on_completed<A: Awaiter>(&mut self, awaiter: &A) {
        let capture = awaiter.continue_on_captured_context();
        self.record(awaiter.completion_handle(), capture);
    }

    /// Like [`await_on_completed`](Self::await_on_completed) but resumes on
    /// the completing thread regardless of the awaiter's policy.
    ///
    /// # Panics
    ///
    /// Panics if a registration was already recorded in this advance.
    pub fn await_on_completed_unsafe<A: Awaiter>(&mut self, awaiter: &A) {
        self.record(awaiter.completion_handle(), false);
    }

    /// The await hot path: takes the result of a completed operand inline,
    /// or registers the unsafe flavour and hands the awaiter back.
    pub fn try_await<A: Awaiter>(&mut self, awaiter: A) -> AwaitPoll<A> {
        if awaiter.is_completed() {
            return AwaitPoll::Ready(awaiter.get_result());
        }
        self.await_on_completed_unsafe(&awaiter);
        AwaitPoll::Suspended(awaiter)
    }

    /// [`try_await`](Self::try_await) with the context-capturing flavour.
    pub fn try_await_captured<A: Awaiter>(&mut self, awaiter: A) -> AwaitPoll<A> {
        if awaiter.is_completed() {
            return AwaitPoll::Ready(awaiter.get_result());
        }
        self.await_on_completed(&awaiter);
        AwaitPoll::Suspended(awaiter)
    }

    /// Returns true once a registration has been recorded.
    #[must_use]
    pub fn has_registration(&self) -> bool {
        self.registration.is_some()
    }

    pub(crate) fn reborrow(&mut self) -> MachineContext<'_> {
        MachineContext {
            registration: &mut *self.registration,
        }
    }
}

impl fmt::Debug for MachineContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineContext")
            .field("registered", &self.has_registration())
            .finish()
    }
}
