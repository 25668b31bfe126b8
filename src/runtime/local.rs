//! Single-threaded cooperative executor.
//!
//! Jobs may be pushed from any thread (a continuation captured on this
//! executor is pushed by whichever thread completes the awaited signal), but
//! they only ever run on the thread that drives the executor through
//! [`LocalExecutor::run_until_idle`] or [`LocalExecutor::block_on`].

use super::executor::{Executor, ExecutorHandle, Job, enter};
use super::queue::JobQueue;
use crate::tracing_compat::trace;
use parking_lot::{Condvar, Mutex};
use std::future::{Future, IntoFuture};
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Wake, Waker};

struct Shared {
    queue: JobQueue,
    lock: Mutex<()>,
    ready: Condvar,
    woken: AtomicBool,
}

impl Shared {
    fn notify(&self) {
        let _guard = self.lock.lock();
        self.ready.notify_one();
    }
}

impl Executor for Shared {
    fn execute(&self, job: Job) {
        self.queue.push(job);
        self.notify();
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

impl Wake for Shared {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.woken.store(true, Ordering::Release);
        self.notify();
    }
}

/// A job queue drained on the calling thread.
#[derive(Clone)]
pub struct LocalExecutor {
    shared: Arc<Shared>,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalExecutor {
    /// Creates an idle executor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: JobQueue::new(),
                lock: Mutex::new(()),
                ready: Condvar::new(),
                woken: AtomicBool::new(false),
            }),
        }
    }

    /// A handle that schedules onto this executor.
    #[must_use]
    pub fn handle(&self) -> ExecutorHandle {
        ExecutorHandle::new(Arc::clone(&self.shared) as Arc<dyn Executor>)
    }

    /// Number of queued jobs.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Runs queued jobs, including ones they enqueue, until the queue is
    /// empty. Returns how many jobs ran.
    ///
    /// The executor is current while its jobs run.
    pub fn run_until_idle(&self) -> usize {
        let _guard = enter(self.handle());
        let mut ran = 0;
        while let Some(job) = self.shared.queue.pop() {
            job();
            ran += 1;
        }
        if ran > 0 {
            trace!(ran, "local executor drained");
        }
        ran
    }

    /// Drives `future` to completion on the calling thread, running queued
    /// jobs whenever it is not ready and parking when there is nothing to do.
    pub fn block_on<F: IntoFuture>(&self, future: F) -> F::Output {
        let waker = Waker::from(Arc::clone(&self.shared));
        let mut cx = Context::from_waker(&waker);
        let mut future = pin!(future.into_future());
        loop {
            self.shared.woken.store(false, Ordering::Release);
            let polled = {
                let _guard = enter(self.handle());
                future.as_mut().poll(&mut cx)
            };
            if let Poll::Ready(output) = polled {
                return output;
            }
            self.run_until_idle();
            let mut guard = self.shared.lock.lock();
            while self.shared.queue.is_empty() && !self.shared.woken.swap(false, Ordering::AcqRel)
            {
                self.shared.ready.wait(&mut guard);
            }
        }
    }
}

impl std::fmt::Debug for LocalExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}
