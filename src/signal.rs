//! Single-writer completion signal.
//!
//! A [`CompletionSignal`] is the promise behind every truly asynchronous
//! computation: a value or an error will eventually be available. It is split
//! into two halves:
//!
//! - [`SignalWriter`]: the single writer. It is not `Clone` and
//!   [`SignalWriter::complete`] consumes it, so completing twice cannot be
//!   expressed. Dropping it uncompleted cancels the signal
//!   ([`CancelKind::Abandoned`](crate::types::CancelKind::Abandoned)) so no
//!   observer waits forever.
//! - [`CompletionSignal`]: the cloneable read side. Observers poll it,
//!   block on it, poll it as a future, or register continuations.
//!
//! # Continuation policy
//!
//! Continuations registered before completion run synchronously, in
//! registration order, on whichever thread calls `complete`, after the
//! signal's lock has been released. A continuation registered after
//! completion runs immediately on the registering thread; registration never
//! fails. Capturing a different resumption context is the caller's job (see
//! [`Awaiter::on_completed`](crate::task::Awaiter::on_completed)).

use crate::error::{Error, Result};
use crate::metrics;
use crate::tracing_compat::trace;
use crate::types::{CancelReason, CompletionStatus};
use core::fmt;
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Waker};

/// A one-shot callback run when a signal completes.
pub struct Continuation {
    callback: Box<dyn FnOnce() + Send + 'static>,
}

impl Continuation {
    /// Wraps a closure.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// A continuation that wakes a task.
    #[must_use]
    pub fn from_waker(waker: Waker) -> Self {
        Self::new(move || waker.wake())
    }

    /// Runs the callback.
    pub fn run(self) {
        (self.callback)();
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation").finish_non_exhaustive()
    }
}

enum State<T> {
    Pending {
        continuations: SmallVec<[Continuation; 1]>,
        /// One entry per distinct polling task.
        wakers: SmallVec<[Waker; 1]>,
    },
    Complete {
        /// `None` once a successful value has been taken.
        result: Option<Result<T>>,
        status: CompletionStatus,
        observed: bool,
    },
}

struct Inner<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
    completed: AtomicBool,
}

impl<T> Inner<T> {
    fn pending() -> Self {
        Self {
            state: Mutex::new(State::Pending {
                continuations: SmallVec::new(),
                wakers: SmallVec::new(),
            }),
            ready: Condvar::new(),
            completed: AtomicBool::new(false),
        }
    }

    fn completed(result: Result<T>) -> Self {
        let status = CompletionStatus::of(&result);
        Self {
            state: Mutex::new(State::Complete {
                result: Some(result),
                status,
                observed: false,
            }),
            ready: Condvar::new(),
            completed: AtomicBool::new(true),
        }
    }

    fn finish(&self, result: Result<T>) {
        let status = CompletionStatus::of(&result);
        let (continuations, wakers) = {
            let mut state = self.state.lock();
            let previous = std::mem::replace(
                &mut *state,
                State::Complete {
                    result: Some(result),
                    status,
                    observed: false,
                },
            );
            match previous {
                State::Pending {
                    continuations,
                    wakers,
                } => (continuations, wakers),
                State::Complete { .. } => {
                    unreachable!("completion signal completed twice by a single writer")
                }
            }
        };
        self.completed.store(true, Ordering::Release);
        self.ready.notify_all();
        trace!(%status, continuations = continuations.len(), "completion signal completed");
        for waker in wakers {
            waker.wake();
        }
        for continuation in continuations {
            continuation.run();
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if let State::Complete {
            status: CompletionStatus::Faulted,
            observed: false,
            ..
        } = self.state.get_mut()
        {
            trace!("faulted completion signal dropped without being observed");
        }
    }
}

/// Type-erased continuation registration on some completion source.
///
/// Lets an awaiting state machine keep a handle that can register a
/// continuation later, after the machine itself has moved, without knowing
/// the source's result type.
pub trait Notify: Send + Sync {
    /// Registers `continuation`; runs it right away if already complete.
    fn register(&self, continuation: Continuation);
}

impl<T: Send> Notify for Inner<T> {
    fn register(&self, continuation: Continuation) {
        metrics::record_continuation_registered();
        {
            let mut state = self.state.lock();
            if let State::Pending { continuations, .. } = &mut *state {
                continuations.push(continuation);
                return;
            }
        }
        continuation.run();
    }
}

/// Creates a pending signal and its single writer.
#[must_use]
pub fn signal<T>() -> (SignalWriter<T>, CompletionSignal<T>) {
    metrics::record_signal_allocated();
    let inner = Arc::new(Inner::pending());
    (
        SignalWriter {
            inner: Some(Arc::clone(&inner)),
        },
        CompletionSignal { inner },
    )
}

/// The write half of a completion signal.
#[must_use = "dropping a writer cancels its signal"]
pub struct SignalWriter<T> {
    inner: Option<Arc<Inner<T>>>,
}

impl<T> SignalWriter<T> {
    /// Completes the signal and runs every registered continuation on the
    /// calling thread.
    pub fn complete(mut self, result: Result<T>) {
        if let Some(inner) = self.inner.take() {
            inner.finish(result);
        }
    }

    /// Completes the signal with a value.
    pub fn set_result(self, value: T) {
        self.complete(Ok(value));
    }

    /// Completes the signal with an error.
    pub fn set_error(self, error: Error) {
        self.complete(Err(error));
    }

    /// Completes the signal as canceled.
    pub fn cancel(self, reason: CancelReason) {
        self.complete(Err(Error::Canceled(reason)));
    }

    /// Returns a reader for the signal this writer completes.
    #[must_use]
    pub fn signal(&self) -> Option<CompletionSignal<T>> {
        self.inner.as_ref().map(|inner| CompletionSignal {
            inner: Arc::clone(inner),
        })
    }
}

impl<T> Drop for SignalWriter<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            trace!("signal writer dropped uncompleted; canceling");
            inner.finish(Err(Error::Canceled(CancelReason::abandoned())));
        }
    }
}

impl<T> fmt::Debug for SignalWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalWriter")
            .field("completed", &self.inner.is_none())
            .finish()
    }
}

/// The read half of a completion signal.
pub struct CompletionSignal<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for CompletionSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> CompletionSignal<T> {
    /// Creates a signal that is already complete.
    #[must_use]
    pub fn completed(result: Result<T>) -> Self {
        metrics::record_signal_allocated();
        Self {
            inner: Arc::new(Inner::completed(result)),
        }
    }

    /// Side-effect-free completion poll.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> CompletionStatus {
        if !self.is_completed() {
            return CompletionStatus::Pending;
        }
        match &*self.inner.state.lock() {
            State::Pending { .. } => CompletionStatus::Pending,
            State::Complete { status, .. } => *status,
        }
    }

    /// Returns true if both handles observe the same signal.
    #[must_use]
    pub fn same_signal(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Registers a continuation.
    ///
    /// If the signal already completed the continuation runs right away on
    /// the calling thread.
    pub fn register_continuation(&self, continuation: Continuation)
    where
        T: Send,
    {
        self.inner.register(continuation);
    }

    /// A type-erased registration handle sharing this signal.
    #[must_use]
    pub fn notifier(&self) -> Arc<dyn Notify>
    where
        T: Send + 'static,
    {
        Arc::clone(&self.inner) as Arc<dyn Notify>
    }

    /// Blocks the calling thread until the signal completes.
    pub fn wait(&self) {
        if self.is_completed() {
            return;
        }
        let mut state = self.inner.state.lock();
        while matches!(&*state, State::Pending { .. }) {
            self.inner.ready.wait(&mut state);
        }
    }

    /// Blocks until complete, then moves the result out.
    ///
    /// A successful value can be taken once; later takes return
    /// [`Error::ResultConsumed`]. Errors are handed to every taker.
    pub fn take_result(&self) -> Result<T> {
        self.wait();
        let mut state = self.inner.state.lock();
        take_completed(&mut state).unwrap_or(Err(Error::ResultConsumed))
    }

    /// Non-blocking take: `None` while pending.
    pub fn try_take_result(&self) -> Option<Result<T>> {
        if !self.is_completed() {
            return None;
        }
        let mut state = self.inner.state.lock();
        Some(take_completed(&mut state).unwrap_or(Err(Error::ResultConsumed)))
    }

    /// Returns the error this signal completed with, without consuming
    /// anything.
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        if !self.is_completed() {
            return None;
        }
        match &*self.inner.state.lock() {
            State::Complete {
                result: Some(Err(err)),
                ..
            } => Some(err.clone()),
            _ => None,
        }
    }

    /// Blocks until complete, then returns a copy of the result.
    ///
    /// Unlike [`take_result`](Self::take_result) this leaves the value in
    /// place, so every observer reads it.
    pub fn read_result(&self) -> Result<T>
    where
        T: Clone,
    {
        self.wait();
        let mut state = self.inner.state.lock();
        read_completed(&mut state).unwrap_or(Err(Error::ResultConsumed))
    }

    /// Polls for the result, moving it out once ready.
    ///
    /// While pending the task's waker is registered. Every polling task gets
    /// its own slot; a task re-polling with a waker that would wake the same
    /// task does not add another.
    pub fn poll_result(&self, cx: &mut Context<'_>) -> Poll<Result<T>> {
        self.poll_with(cx, take_completed)
    }

    /// Like [`poll_result`](Self::poll_result), but copies the value out.
    pub fn poll_read(&self, cx: &mut Context<'_>) -> Poll<Result<T>>
    where
        T: Clone,
    {
        self.poll_with(cx, read_completed)
    }

    fn poll_with(
        &self,
        cx: &mut Context<'_>,
        read: fn(&mut State<T>) -> Option<Result<T>>,
    ) -> Poll<Result<T>> {
        let mut state = self.inner.state.lock();
        if let State::Pending { wakers, .. } = &mut *state {
            if !wakers.iter().any(|existing| existing.will_wake(cx.waker())) {
                wakers.push(cx.waker().clone());
            }
            return Poll::Pending;
        }
        Poll::Ready(read(&mut state).unwrap_or(Err(Error::ResultConsumed)))
    }
}

fn read_completed<T: Clone>(state: &mut State<T>) -> Option<Result<T>> {
    match state {
        State::Pending { .. } => None,
        State::Complete {
            result, observed, ..
        } => {
            *observed = true;
            result.clone()
        }
    }
}

fn take_completed<T>(state: &mut State<T>) -> Option<Result<T>> {
    match state {
        State::Pending { .. } => None,
        State::Complete {
            result, observed, ..
        } => {
            *observed = true;
            match result {
                Some(Err(err)) => Some(Err(err.clone())),
                Some(Ok(_)) => result.take(),
                None => None,
            }
        }
    }
}

impl<T> fmt::Debug for CompletionSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("status", &self.status())
            .finish()
    }
}
