//! Injection queue.
//!
//! A thread-safe unbounded FIFO of jobs, shared by the local executor and the
//! thread pool. Any thread may push; the owning executor pops.

use super::executor::Job;
use crossbeam_queue::SegQueue;
use core::fmt;

/// A queue of pending jobs.
#[derive(Default)]
pub struct JobQueue {
    inner: SegQueue<Job>,
}

impl JobQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: SegQueue::new(),
        }
    }

    /// Pushes a job to the back.
    pub fn push(&self, job: Job) {
        self.inner.push(job);
    }

    /// Pops the oldest job.
    pub fn pop(&self) -> Option<Job> {
        self.inner.pop()
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue").field("len", &self.len()).finish()
    }
}
