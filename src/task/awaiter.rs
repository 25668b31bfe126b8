//! The awaiting protocol.
//!
//! A state machine that reaches an await asks the operand's [`Awaiter`]
//! three things: is it already complete (the hot path: take the result and
//! keep running), what is the result, and, if it is not complete, to call a
//! continuation once it is. Registration comes in two flavours:
//!
//! - [`Awaiter::on_completed`] captures the ambient executor
//!   ([`runtime::current`](crate::runtime::current)) and re-dispatches the
//!   continuation onto it.
//! - [`Awaiter::on_completed_unsafe`] skips the capture and runs the
//!   continuation on the completing thread. Only the driver uses it.

use crate::error::Result;
use crate::metrics;
use crate::runtime;
use crate::signal::{Continuation, Notify};
use std::sync::Arc;

/// The awaiting protocol consumed by state machines.
pub trait Awaiter: Send + 'static {
    /// The awaited value.
    type Output;

    /// True when the result can be fetched without suspending.
    fn is_completed(&self) -> bool;

    /// Fetches the result, propagating the operand's error unchanged.
    ///
    /// Blocks if called before completion.
    fn get_result(self) -> Result<Self::Output>;

    /// A detached handle that can register continuations later.
    fn completion_handle(&self) -> CompletionHandle;

    /// Whether [`on_completed`](Self::on_completed) resumes on the captured
    /// executor.
    fn continue_on_captured_context(&self) -> bool {
        true
    }

    /// Registers `continuation`, honouring the captured-context policy.
    fn on_completed(&self, continuation: Continuation) {
        let handle = self.completion_handle();
        if self.continue_on_captured_context() {
            handle.on_completed(continuation);
        } else {
            handle.on_completed_unsafe(continuation);
        }
    }

    /// Registers `continuation` to run on the completing thread.
    fn on_completed_unsafe(&self, continuation: Continuation) {
        self.completion_handle().on_completed_unsafe(continuation);
    }
}

/// A type-erased registration handle for an awaited operand.
///
/// Handles for operands that are already complete run continuations
/// immediately.
#[derive(Clone)]
pub struct CompletionHandle {
    notify: Option<Arc<dyn Notify>>,
}

impl CompletionHandle {
    /// A handle for an operand that is already complete.
    #[must_use]
    pub const fn ready() -> Self {
        Self { notify: None }
    }

    /// A handle registering on `notify`.
    #[must_use]
    pub fn new(notify: Arc<dyn Notify>) -> Self {
        Self {
            notify: Some(notify),
        }
    }

    /// Registers with context capture.
    pub fn on_completed(&self, continuation: Continuation) {
        self.on_completed_unsafe(capture_context(continuation));
    }

    /// Registers without context capture.
    pub fn on_completed_unsafe(&self, continuation: Continuation) {
        match &self.notify {
            Some(notify) => notify.register(continuation),
            None => continuation.run(),
        }
    }
}

impl std::fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("ready", &self.notify.is_none())
            .finish()
    }
}

/// Wraps `continuation` so it runs on the executor current right now.
///
/// Without a current executor the continuation is returned unchanged.
pub(crate) fn capture_context(continuation: Continuation) -> Continuation {
    match runtime::current() {
        Some(executor) => Continuation::new(move || {
            metrics::record_continuation_dispatched();
            executor.spawn(move || continuation.run());
        }),
        None => continuation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{LocalExecutor, enter};
    use crate::signal::signal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn ready_handle_runs_inline() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        CompletionHandle::ready().on_completed_unsafe(Continuation::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn captured_continuation_lands_on_executor() {
        let local = LocalExecutor::new();
        let (writer, reader) = signal::<u8>();
        let handle = CompletionHandle::new(reader.notifier());
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let _guard = enter(local.handle());
            let h = Arc::clone(&hits);
            handle.on_completed(Continuation::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }));
        }
        writer.set_result(1);
        assert_eq!(hits.load(Ordering::SeqCst), 0, "queued, not run inline");
        assert_eq!(local.run_until_idle(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
