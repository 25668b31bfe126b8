//! The low-overhead result wrapper.
//!
//! A [`ValueTask<T>`] is either an already-known value, stored inline, or a
//! reference to a pending [`CompletionSignal`]. The common case for an
//! asynchronous-looking call that actually finishes synchronously (cache hit,
//! buffered data, zero-length delay) is the inline form and costs nothing
//! beyond the enum tag. Only a computation that really suspends pays for one
//! heap allocation, the signal.
//!
//! A wrapper never changes representation after construction. Turning an
//! inline wrapper into the heavier [`Task<T>`] allocates a fresh completed
//! signal, and only when [`ValueTask::into_task`] is called.

use super::awaiter::{Awaiter, CompletionHandle};
use super::task::Task;
use crate::error::{Error, Result};
use crate::signal::CompletionSignal;
use crate::types::{CancelReason, CompletionStatus};
use core::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::task::{Context, Poll};

enum Repr<T> {
    Inline(T),
    Pending(CompletionSignal<T>),
}

/// A value that is either available now or will be once a signal completes.
///
/// `ValueTask<()>` is the non-generic form.
#[must_use = "a ValueTask does nothing unless its result is observed"]
pub struct ValueTask<T> {
    repr: Repr<T>,
}

impl<T> ValueTask<T> {
    /// Wraps an already-known value. Allocates nothing.
    pub const fn new(value: T) -> Self {
        Self {
            repr: Repr::Inline(value),
        }
    }

    /// Alias of [`ValueTask::new`].
    pub const fn from_value(value: T) -> Self {
        Self::new(value)
    }

    /// Wraps a pending (or completed) signal.
    pub const fn from_signal(signal: CompletionSignal<T>) -> Self {
        Self {
            repr: Repr::Pending(signal),
        }
    }

    /// Wraps an optional signal; an absent signal is rejected.
    pub fn try_from_signal(signal: Option<CompletionSignal<T>>) -> Result<Self> {
        signal
            .map(Self::from_signal)
            .ok_or(Error::InvalidArgument("a pending ValueTask needs a completion signal"))
    }

    /// Wraps the signal behind a full task.
    pub fn from_task(task: Task<T>) -> Self {
        Self::from_signal(task.into_signal())
    }

    /// A wrapper completed with `error`.
    pub fn faulted(error: Error) -> Self {
        Self::from_signal(CompletionSignal::completed(Err(error)))
    }

    /// A wrapper completed as canceled.
    pub fn canceled(reason: CancelReason) -> Self {
        Self::faulted(Error::Canceled(reason))
    }

    /// True for the inline representation.
    #[must_use]
    pub const fn is_inline(&self) -> bool {
        matches!(self.repr, Repr::Inline(_))
    }

    /// The backing signal of a pending wrapper.
    #[must_use]
    pub const fn as_signal(&self) -> Option<&CompletionSignal<T>> {
        match &self.repr {
            Repr::Inline(_) => None,
            Repr::Pending(signal) => Some(signal),
        }
    }

    /// Current status; inline wrappers are always succeeded.
    #[must_use]
    pub fn status(&self) -> CompletionStatus {
        match &self.repr {
            Repr::Inline(_) => CompletionStatus::Succeeded,
            Repr::Pending(signal) => signal.status(),
        }
    }

    /// True if inline, or if the signal completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        match &self.repr {
            Repr::Inline(_) => true,
            Repr::Pending(signal) => signal.is_completed(),
        }
    }

    /// True if completed with a value.
    #[must_use]
    pub fn is_completed_successfully(&self) -> bool {
        self.status().is_succeeded()
    }

    /// True if completed with a fault.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        self.status().is_faulted()
    }

    /// True if completed as canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.status().is_canceled()
    }

    /// Returns the value, blocking the calling thread until a pending
    /// wrapper's signal completes.
    ///
    /// A fault is returned as the very same error the computation raised.
    pub fn get_result(self) -> Result<T> {
        match self.repr {
            Repr::Inline(value) => Ok(value),
            Repr::Pending(signal) => signal.take_result(),
        }
    }

    /// Converts into the general-purpose task type.
    ///
    /// A pending wrapper hands over its signal unchanged; an inline one
    /// allocates a completed signal now.
    pub fn into_task(self) -> Task<T> {
        match self.repr {
            Repr::Inline(value) => Task::from_result(Ok(value)),
            Repr::Pending(signal) => Task::from_signal(signal),
        }
    }

    /// The awaiter used by state machines.
    pub fn get_awaiter(self) -> ValueTaskAwaiter<T> {
        ValueTaskAwaiter {
            repr: self.repr,
            capture: true,
        }
    }

    /// Chooses whether a continuation registered through the safe
    /// `on_completed` resumes on the captured executor.
    pub fn configure_await(self, continue_on_captured_context: bool) -> ConfiguredValueTask<T> {
        ConfiguredValueTask {
            task: self,
            continue_on_captured_context,
        }
    }
}

impl ValueTask<()> {
    /// The completed non-generic wrapper.
    pub const fn completed() -> Self {
        Self::new(())
    }
}

impl<T: Default> Default for ValueTask<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: PartialEq> PartialEq for ValueTask<T> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.repr, &other.repr) {
            (Repr::Inline(a), Repr::Inline(b)) => a == b,
            (Repr::Pending(a), Repr::Pending(b)) => CompletionSignal::same_signal(a, b),
            _ => false,
        }
    }
}

impl<T: Clone> Clone for ValueTask<T> {
    fn clone(&self) -> Self {
        match &self.repr {
            Repr::Inline(value) => Self::new(value.clone()),
            Repr::Pending(signal) => Self::from_signal(signal.clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Inline(value) => f.debug_tuple("ValueTask::Inline").field(value).finish(),
            Repr::Pending(signal) => f.debug_tuple("ValueTask::Pending").field(signal).finish(),
        }
    }
}

impl<T> From<CompletionSignal<T>> for ValueTask<T> {
    fn from(signal: CompletionSignal<T>) -> Self {
        Self::from_signal(signal)
    }
}

impl<T> From<Task<T>> for ValueTask<T> {
    fn from(task: Task<T>) -> Self {
        Self::from_task(task)
    }
}

/// The awaiter of a [`ValueTask`].
pub struct ValueTaskAwaiter<T> {
    repr: Repr<T>,
    capture: bool,
}

impl<T: Send + 'static> Awaiter for ValueTaskAwaiter<T> {
    type Output = T;

    fn is_completed(&self) -> bool {
        match &self.repr {
            Repr::Inline(_) => true,
            Repr::Pending(signal) => signal.is_completed(),
        }
    }

    fn get_result(self) -> Result<T> {
        match self.repr {
            Repr::Inline(value) => Ok(value),
            Repr::Pending(signal) => signal.take_result(),
        }
    }

    fn completion_handle(&self) -> CompletionHandle {
        match &self.repr {
            Repr::Inline(_) => CompletionHandle::ready(),
            Repr::Pending(signal) => CompletionHandle::new(signal.notifier()),
        }
    }

    fn continue_on_captured_context(&self) -> bool {
        self.capture
    }
}

impl<T> fmt::Debug for ValueTaskAwaiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueTaskAwaiter")
            .field("inline", &matches!(self.repr, Repr::Inline(_)))
            .field("capture", &self.capture)
            .finish()
    }
}

/// A [`ValueTask`] with an explicit captured-context policy.
#[must_use = "a ValueTask does nothing unless its result is observed"]
pub struct ConfiguredValueTask<T> {
    task: ValueTask<T>,
    continue_on_captured_context: bool,
}

impl<T> ConfiguredValueTask<T> {
    /// The awaiter, carrying the configured policy.
    pub fn get_awaiter(self) -> ValueTaskAwaiter<T> {
        ValueTaskAwaiter {
            repr: self.task.repr,
            capture: self.continue_on_captured_context,
        }
    }

    /// The wrapped task.
    pub fn into_inner(self) -> ValueTask<T> {
        self.task
    }
}

impl<T: fmt::Debug> fmt::Debug for ConfiguredValueTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfiguredValueTask")
            .field("task", &self.task)
            .field(
                "continue_on_captured_context",
                &self.continue_on_captured_context,
            )
            .finish()
    }
}

/// Future returned by awaiting a [`ValueTask`] from native async code.
pub struct ValueTaskFuture<T> {
    state: FutureState<T>,
}

enum FutureState<T> {
    Ready(Option<T>),
    Pending(CompletionSignal<T>),
}

// No field is ever pinned structurally.
impl<T> Unpin for ValueTaskFuture<T> {}

impl<T> Future for ValueTaskFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            FutureState::Ready(value) => {
                Poll::Ready(value.take().ok_or(Error::ResultConsumed))
            }
            FutureState::Pending(signal) => signal.poll_result(cx),
        }
    }
}

impl<T> IntoFuture for ValueTask<T> {
    type Output = Result<T>;
    type IntoFuture = ValueTaskFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        let state = match self.repr {
            Repr::Inline(value) => FutureState::Ready(Some(value)),
            Repr::Pending(signal) => FutureState::Pending(signal),
        };
        ValueTaskFuture { state }
    }
}

impl<T> fmt::Debug for ValueTaskFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueTaskFuture")
            .field("ready", &matches!(self.state, FutureState::Ready(_)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics;
    use crate::signal::{Continuation, signal};
    use crate::test_utils::{CountingWaker, init_test_logging};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn inline_round_trip_allocates_nothing() {
        init_test("inline_round_trip_allocates_nothing");
        let before = metrics::snapshot();
        let task = ValueTask::new(10);
        crate::assert_with_log!(
            task.is_completed(),
            "inline is completed",
            true,
            task.is_completed()
        );
        crate::assert_with_log!(
            task.is_completed_successfully(),
            "inline is success",
            true,
            task.status()
        );
        let value = task.get_result().expect("inline value");
        crate::assert_with_log!(value == 10, "value", 10, value);
        let delta = metrics::snapshot().since(&before);
        crate::assert_with_log!(delta.is_allocation_free(), "no allocation", "0 signals", delta);
        crate::test_complete!("inline_round_trip_allocates_nothing");
    }

    #[test]
    fn pending_round_trip_both_orderings() {
        init_test("pending_round_trip_both_orderings");
        let (writer, reader) = signal::<u32>();
        writer.set_result(5);
        assert_eq!(ValueTask::from_signal(reader).get_result().expect("before"), 5);

        let (writer, reader) = signal::<u32>();
        let task = ValueTask::from_signal(reader);
        assert!(!task.is_completed());
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            writer.set_result(6);
        });
        assert_eq!(task.get_result().expect("after"), 6);
        handle.join().expect("writer thread");
        crate::test_complete!("pending_round_trip_both_orderings");
    }

    #[test]
    fn absent_signal_is_rejected() {
        init_test("absent_signal_is_rejected");
        let result = ValueTask::<u8>::try_from_signal(None);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        crate::test_complete!("absent_signal_is_rejected");
    }

    #[test]
    fn fault_identity_is_preserved() {
        init_test("fault_identity_is_preserved");
        let err = Error::msg("leaf failed");
        let task = ValueTask::<u8>::faulted(err.clone());
        assert!(task.is_faulted());
        assert!(!task.is_canceled());
        let observed = task.get_result().expect_err("faulted");
        assert!(observed.same_error(&err));

        let task = ValueTask::<u8>::canceled(CancelReason::timeout());
        assert!(task.is_canceled());
        assert!(!task.is_faulted());
        crate::test_complete!("fault_identity_is_preserved");
    }

    #[test]
    fn equality_rules() {
        init_test("equality_rules");
        assert_eq!(ValueTask::new(3), ValueTask::new(3));
        assert_ne!(ValueTask::new(3), ValueTask::new(4));

        let (_writer, reader) = signal::<u8>();
        let a = ValueTask::from_signal(reader.clone());
        let b = ValueTask::from_signal(reader);
        assert_eq!(a, b);

        let (_other_writer, other) = signal::<u8>();
        assert_ne!(a, ValueTask::from_signal(other));
        assert_ne!(a, ValueTask::new(0));
        assert_eq!(ValueTask::<u8>::default(), ValueTask::new(0));
        crate::test_complete!("equality_rules");
    }

    #[test]
    fn into_task_allocates_only_for_inline() {
        init_test("into_task_allocates_only_for_inline");
        let before = metrics::snapshot();
        let task = ValueTask::new(1_u8).into_task();
        assert_eq!(metrics::snapshot().since(&before).signals_allocated, 1);
        assert!(task.is_completed());

        let (_writer, reader) = signal::<u8>();
        let before = metrics::snapshot();
        let task = ValueTask::from_signal(reader.clone()).into_task();
        assert_eq!(metrics::snapshot().since(&before).signals_allocated, 0);
        assert!(CompletionSignal::same_signal(task.signal(), &reader));
        crate::test_complete!("into_task_allocates_only_for_inline");
    }

    #[test]
    fn configured_awaiter_skips_capture() {
        init_test("configured_awaiter_skips_capture");
        let local = crate::runtime::LocalExecutor::new();
        let (writer, reader) = signal::<u8>();
        let awaiter = ValueTask::from_signal(reader).configure_await(false).get_awaiter();
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let _guard = crate::runtime::enter(local.handle());
            let h = Arc::clone(&hits);
            awaiter.on_completed(Continuation::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }));
        }
        writer.set_result(1);
        assert_eq!(hits.load(Ordering::SeqCst), 1, "ran on completing thread");
        assert_eq!(local.run_until_idle(), 0);
        assert_eq!(awaiter.get_result().expect("value"), 1);
        crate::test_complete!("configured_awaiter_skips_capture");
    }

    #[test]
    fn native_await_of_pending_wrapper() {
        init_test("native_await_of_pending_wrapper");
        let (writer, reader) = signal::<u8>();
        let mut fut = ValueTask::from_signal(reader).into_future();
        let (counter, waker) = CountingWaker::new();
        let mut cx = Context::from_waker(&waker);
        assert!(Pin::new(&mut fut).poll(&mut cx).is_pending());
        writer.set_result(8);
        assert_eq!(counter.wakes(), 1);
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Ready(Ok(8))));

        let value = futures_lite::future::block_on(ValueTask::new(4_u8).into_future());
        assert_eq!(value.expect("inline"), 4);
        crate::test_complete!("native_await_of_pending_wrapper");
    }
}
