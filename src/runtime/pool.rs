//! Multi-threaded executor.
//!
//! Workers share one injection queue and park on a condition variable when it
//! is empty. Each worker makes the pool its current executor, so a
//! continuation captured inside a pool job resumes on the pool.

use super::executor::{Executor, ExecutorHandle, Job, enter};
use super::queue::JobQueue;
use crate::config::{ConfigError, PoolConfig};
use crate::tracing_compat::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct Shared {
    queue: JobQueue,
    lock: Mutex<()>,
    ready: Condvar,
    shutdown: AtomicBool,
    park_timeout: Duration,
}

impl Executor for Shared {
    fn execute(&self, job: Job) {
        // Checked under the lock so a job never lands after shutdown drained.
        let _guard = self.lock.lock();
        if self.shutdown.load(Ordering::Acquire) {
            warn!("job submitted to a shut-down pool was dropped");
            return;
        }
        self.queue.push(job);
        self.ready.notify_one();
    }

    fn name(&self) -> &'static str {
        "pool"
    }
}

/// A fixed-size pool of worker threads.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: PoolConfig,
}

impl ThreadPool {
    /// Starts a pool with `config`.
    pub fn new(config: PoolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let shared = Arc::new(Shared {
            queue: JobQueue::new(),
            lock: Mutex::new(()),
            ready: Condvar::new(),
            shutdown: AtomicBool::new(false),
            park_timeout: config.park_timeout_duration(),
        });
        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("{}-{index}", config.thread_name_prefix))
                .spawn(move || worker_loop(&shared))?;
            workers.push(handle);
        }
        info!(workers = config.workers, "thread pool started");
        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            config,
        })
    }

    /// Starts a pool with `workers` threads and default settings otherwise.
    pub fn with_workers(workers: usize) -> Result<Self, ConfigError> {
        Self::new(PoolConfig::default().workers(workers))
    }

    /// A handle that schedules onto this pool.
    #[must_use]
    pub fn handle(&self) -> ExecutorHandle {
        ExecutorHandle::new(Arc::clone(&self.shared) as Arc<dyn Executor>)
    }

    /// Schedules a closure.
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.execute(Box::new(f));
    }

    /// The configuration the pool was started with.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns true once [`shutdown`](Self::shutdown) has begun.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Stops accepting jobs, lets workers drain the queue, and joins them.
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        {
            let _guard = self.shared.lock.lock();
            if self.shared.shutdown.swap(true, Ordering::AcqRel) {
                return;
            }
            self.shared.ready.notify_all();
        }
        let me = thread::current().id();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.thread().id() == me {
                continue;
            }
            if worker.join().is_err() {
                error!("pool worker exited by panic");
            }
        }
        let mut stranded = 0_usize;
        while self.shared.queue.pop().is_some() {
            stranded += 1;
        }
        if stranded > 0 {
            warn!(stranded, "jobs left after pool shutdown were dropped");
        }
        info!("thread pool stopped");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.config.workers)
            .field("queued", &self.shared.queue.len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

fn worker_loop(shared: &Arc<Shared>) {
    let _current = enter(ExecutorHandle::new(Arc::clone(shared) as Arc<dyn Executor>));
    debug!("pool worker started");
    loop {
        if let Some(job) = shared.queue.pop() {
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!("pool job panicked");
            }
            continue;
        }
        let mut guard = shared.lock.lock();
        if !shared.queue.is_empty() {
            continue;
        }
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        let _ = shared.ready.wait_for(&mut guard, shared.park_timeout);
    }
    debug!("pool worker stopped");
}
