//! The general-purpose, always-allocated task.

use super::awaiter::{Awaiter, CompletionHandle};
use super::value_task::ValueTask;
use crate::error::Result;
use crate::signal::CompletionSignal;
use crate::types::CompletionStatus;
use core::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A cloneable handle on a completion signal.
///
/// Unlike [`ValueTask`], a `Task` always refers to a heap signal, can be
/// cloned and observed by many parties, and is itself a [`Future`]. Reads
/// through a `Task` copy the value out, so every clone sees it; converting to
/// a [`ValueTask`] is the single-consumer, move-out path.
pub struct Task<T> {
    signal: CompletionSignal<T>,
}

impl<T> Task<T> {
    /// Wraps an existing signal.
    #[must_use]
    pub const fn from_signal(signal: CompletionSignal<T>) -> Self {
        Self { signal }
    }

    /// A task that already completed with `result`.
    #[must_use]
    pub fn from_result(result: Result<T>) -> Self {
        Self::from_signal(CompletionSignal::completed(result))
    }

    /// The backing signal.
    #[must_use]
    pub const fn signal(&self) -> &CompletionSignal<T> {
        &self.signal
    }

    /// Unwraps the backing signal.
    #[must_use]
    pub fn into_signal(self) -> CompletionSignal<T> {
        self.signal
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> CompletionStatus {
        self.signal.status()
    }

    /// Side-effect-free completion poll.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.signal.is_completed()
    }

    /// Blocks until complete.
    pub fn wait(&self) {
        self.signal.wait();
    }

    /// Blocks until complete and returns a copy of the result.
    pub fn get_result(&self) -> Result<T>
    where
        T: Clone,
    {
        self.signal.read_result()
    }

    /// Views this task as a lightweight wrapper over the same signal.
    pub fn into_value_task(self) -> ValueTask<T> {
        ValueTask::from_signal(self.signal)
    }

    /// The awaiter used by state machines.
    #[must_use]
    pub fn get_awaiter(self) -> TaskAwaiter<T> {
        TaskAwaiter {
            signal: self.signal,
            capture: true,
        }
    }

    /// Chooses the captured-context policy of the awaiter.
    #[must_use]
    pub fn configure_await(self, continue_on_captured_context: bool) -> TaskAwaiter<T> {
        TaskAwaiter {
            signal: self.signal,
            capture: continue_on_captured_context,
        }
    }
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

impl<T> PartialEq for Task<T> {
    fn eq(&self, other: &Self) -> bool {
        CompletionSignal::same_signal(&self.signal, &other.signal)
    }
}

impl<T> Eq for Task<T> {}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("status", &self.status())
            .finish()
    }
}

impl<T: Clone> Future for Task<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.signal.poll_read(cx)
    }
}

/// The awaiter of a [`Task`].
#[derive(Debug)]
pub struct TaskAwaiter<T> {
    signal: CompletionSignal<T>,
    capture: bool,
}

impl<T: Clone + Send + 'static> Awaiter for TaskAwaiter<T> {
    type Output = T;

    fn is_completed(&self) -> bool {
        self.signal.is_completed()
    }

    fn get_result(self) -> Result<T> {
        self.signal.read_result()
    }

    fn completion_handle(&self) -> CompletionHandle {
        CompletionHandle::new(self.signal.notifier())
    }

    fn continue_on_captured_context(&self) -> bool {
        self.capture
    }
}
