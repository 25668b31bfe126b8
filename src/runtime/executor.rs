//! Executor abstraction and the ambient "current executor".
//!
//! Nothing in the driver needs a scheduler: state machines run synchronously
//! and resume on whatever thread completes the operand they wait on. An
//! executor only matters when an awaiter captures the ambient execution
//! context ([`Awaiter::on_completed`](crate::task::Awaiter::on_completed)):
//! the continuation is then handed to the executor that was current at
//! registration time instead of running on the completing thread.

use std::cell::RefCell;
use std::sync::Arc;

/// A unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs jobs, now or later, on some thread.
pub trait Executor: Send + Sync + 'static {
    /// Schedules `job`.
    fn execute(&self, job: Job);

    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "executor"
    }
}

/// A cheaply cloneable, shareable executor reference.
#[derive(Clone)]
pub struct ExecutorHandle {
    inner: Arc<dyn Executor>,
}

impl ExecutorHandle {
    /// Wraps a shared executor.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { inner: executor }
    }

    /// Schedules a closure.
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.execute(Box::new(f));
    }

    /// Schedules a boxed job.
    pub fn execute(&self, job: Job) {
        self.inner.execute(job);
    }

    /// The executor's log name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    /// Returns true if both handles refer to the same executor.
    #[must_use]
    pub fn same_executor(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }
}

impl std::fmt::Debug for ExecutorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorHandle")
            .field("name", &self.name())
            .finish()
    }
}

/// Runs every job immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

impl InlineExecutor {
    /// A handle to a fresh inline executor.
    #[must_use]
    pub fn handle() -> ExecutorHandle {
        ExecutorHandle::new(Arc::new(Self))
    }
}

thread_local! {
    static CURRENT: RefCell<Option<ExecutorHandle>> = const { RefCell::new(None) };
}

/// The executor current on this thread, if any.
#[must_use]
pub fn current() -> Option<ExecutorHandle> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Makes `executor` current on this thread until the guard is dropped.
///
/// Guards nest: dropping one restores whatever was current before it.
pub fn enter(executor: ExecutorHandle) -> EnterGuard {
    let previous = CURRENT.with(|c| c.borrow_mut().replace(executor));
    EnterGuard { previous }
}

/// Restores the previously current executor on drop.
#[must_use = "the executor stays current only while the guard lives"]
#[derive(Debug)]
pub struct EnterGuard {
    previous: Option<ExecutorHandle>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|c| *c.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn inline_runs_immediately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        InlineExecutor::handle().spawn(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn enter_guards_nest() {
        assert!(current().is_none());
        let outer = InlineExecutor::handle();
        let inner = InlineExecutor::handle();
        {
            let _outer = enter(outer.clone());
            assert!(current().expect("outer").same_executor(&outer));
            {
                let _inner = enter(inner.clone());
                assert!(current().expect("inner").same_executor(&inner));
            }
            assert!(current().expect("outer again").same_executor(&outer));
        }
        assert!(current().is_none());
    }
}
