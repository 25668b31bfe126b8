//! Test harness helpers.
//!
//! Shared by unit tests and (through the `test-internals` feature) by the
//! integration tests under `tests/`:
//!
//! - [`init_test_logging`] installs a `tracing-subscriber` fmt subscriber once
//! - [`test_phase!`](crate::test_phase), [`test_complete!`](crate::test_complete)
//!   and [`assert_with_log!`](crate::assert_with_log) log test progress
//! - [`CountingWaker`] counts wakeups for `Future`/`Stream` polling tests
//! - [`ManualLeaf`] is an asynchronous operand completed by hand

use crate::error::Error;
use crate::signal::{CompletionSignal, SignalWriter, signal};
use crate::task::ValueTask;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Wake, Waker};

static INIT_LOGGING: Once = Once::new();

/// Installs the test log subscriber. Safe to call from every test.
///
/// Honors `RUST_LOG`; defaults to `tasklike=debug`.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "tasklike=debug".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

#[doc(hidden)]
pub fn log_phase(name: &str) {
    tracing::info!(test = name, "test phase started");
}

#[doc(hidden)]
pub fn log_complete(name: &str) {
    tracing::info!(test = name, "test phase complete");
}

#[doc(hidden)]
pub fn log_assert(ok: bool, what: &str, expected: &str, actual: &str) {
    if ok {
        tracing::debug!(what, expected, actual, "assertion passed");
    } else {
        tracing::error!(what, expected, actual, "assertion failed");
    }
}

/// Logs the start of a named test phase.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        $crate::test_utils::log_phase($name)
    };
}

/// Logs the completion of a named test phase.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        $crate::test_utils::log_complete($name)
    };
}

/// Asserts a condition, logging expected and actual values either way.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $what:expr, $expected:expr, $actual:expr) => {{
        let ok: bool = $cond;
        let expected = format!("{:?}", $expected);
        let actual = format!("{:?}", $actual);
        $crate::test_utils::log_assert(ok, $what, &expected, &actual);
        assert!(ok, "{}: expected {}, got {}", $what, expected, actual);
    }};
}

/// A waker that counts how many times it was woken.
#[derive(Debug, Default)]
pub struct CountingWaker {
    wakes: AtomicUsize,
}

impl CountingWaker {
    /// Creates a counting waker and the `Waker` handle pointing at it.
    #[must_use]
    pub fn new() -> (Arc<Self>, Waker) {
        let counter = Arc::new(Self::default());
        let waker = Waker::from(Arc::clone(&counter));
        (counter, waker)
    }

    /// Number of wakes observed so far.
    #[must_use]
    pub fn wakes(&self) -> usize {
        self.wakes.load(Ordering::SeqCst)
    }
}

impl Wake for CountingWaker {
    fn wake(self: Arc<Self>) {
        self.wakes.fetch_add(1, Ordering::SeqCst);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.wakes.fetch_add(1, Ordering::SeqCst);
    }
}

/// An asynchronous operand that completes only when the test says so.
///
/// Each call to [`ManualLeaf::start`] hands out a pending [`ValueTask`] and
/// keeps its writer; [`ManualLeaf::complete_next`] finishes the oldest one.
#[derive(Debug)]
pub struct ManualLeaf<T> {
    writers: Mutex<Vec<SignalWriter<T>>>,
    started: AtomicUsize,
}

impl<T: Send + 'static> ManualLeaf<T> {
    /// Creates an idle leaf.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            writers: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
        })
    }

    /// Starts one operation and returns its pending wrapper.
    pub fn start(&self) -> ValueTask<T> {
        let (writer, reader): (SignalWriter<T>, CompletionSignal<T>) = signal();
        self.writers.lock().push(writer);
        self.started.fetch_add(1, Ordering::SeqCst);
        ValueTask::from_signal(reader)
    }

    /// Number of operations started so far.
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Number of operations started but not completed.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.writers.lock().len()
    }

    /// Completes the oldest outstanding operation with `value`.
    ///
    /// Returns false when nothing is outstanding.
    pub fn complete_next(&self, value: T) -> bool {
        let writer = {
            let mut writers = self.writers.lock();
            if writers.is_empty() {
                return false;
            }
            writers.remove(0)
        };
        writer.set_result(value);
        true
    }

    /// Fails the oldest outstanding operation with `error`.
    pub fn fail_next(&self, error: Error) -> bool {
        let writer = {
            let mut writers = self.writers.lock();
            if writers.is_empty() {
                return false;
            }
            writers.remove(0)
        };
        writer.set_error(error);
        true
    }
}
