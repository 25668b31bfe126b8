//! Timer heap and the shared delay thread.
//!
//! [`TimerHeap`] is a min-heap of `(deadline, writer)` pairs. One lazily
//! started background thread owns a heap behind a mutex, sleeps until the
//! earliest deadline and completes every expired writer outside the lock.

use crate::signal::{SignalWriter, signal};
use crate::task::ValueTask;
use crate::tracing_compat::{debug, error, trace};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

struct TimerEntry {
    deadline: Instant,
    generation: u64,
    writer: SignalWriter<()>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Eq for TimerEntry {}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the earliest deadline sits on top.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of pending delays ordered by deadline.
#[derive(Default)]
pub struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    next_generation: u64,
}

impl TimerHeap {
    /// An empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending delays.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True when no delay is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Adds a writer to complete at `deadline`.
    ///
    /// Writers with equal deadlines fire in insertion order.
    pub fn insert(&mut self, deadline: Instant, writer: SignalWriter<()>) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.heap.push(TimerEntry {
            deadline,
            generation,
            writer,
        });
    }

    /// The next deadline to fire.
    #[must_use]
    pub fn peek_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.deadline)
    }

    /// Pops every writer whose deadline is `<= now`, earliest first.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<SignalWriter<()>> {
        let mut expired = Vec::new();
        while self.heap.peek().is_some_and(|entry| entry.deadline <= now) {
            if let Some(entry) = self.heap.pop() {
                expired.push(entry.writer);
            }
        }
        expired
    }
}

impl std::fmt::Debug for TimerHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHeap")
            .field("len", &self.len())
            .field("next_deadline", &self.peek_deadline())
            .finish()
    }
}

struct TimerService {
    heap: Mutex<TimerHeap>,
    changed: Condvar,
}

impl TimerService {
    fn global() -> Option<&'static Self> {
        static SERVICE: OnceLock<Option<&'static TimerService>> = OnceLock::new();
        *SERVICE.get_or_init(|| {
            let service: &'static Self = Box::leak(Box::new(Self {
                heap: Mutex::new(TimerHeap::new()),
                changed: Condvar::new(),
            }));
            match std::thread::Builder::new()
                .name("tasklike-timer".to_string())
                .spawn(move || service.run())
            {
                Ok(_) => {
                    debug!("timer thread started");
                    Some(service)
                }
                Err(_err) => {
                    error!(error = %_err, "failed to start timer thread");
                    None
                }
            }
        })
    }

    fn schedule(&self, deadline: Instant, writer: SignalWriter<()>) {
        let mut heap = self.heap.lock();
        let earliest = heap.peek_deadline().is_none_or(|d| deadline < d);
        heap.insert(deadline, writer);
        if earliest {
            self.changed.notify_one();
        }
    }

    fn run(&self) {
        loop {
            let expired = {
                let mut heap = self.heap.lock();
                loop {
                    let now = Instant::now();
                    let expired = heap.pop_expired(now);
                    if !expired.is_empty() {
                        break expired;
                    }
                    match heap.peek_deadline() {
                        Some(deadline) => {
                            let _ = self.changed.wait_until(&mut heap, deadline);
                        }
                        None => self.changed.wait(&mut heap),
                    }
                }
            };
            trace!(count = expired.len(), "timers fired");
            for writer in expired {
                writer.set_result(());
            }
        }
    }
}

/// A wrapper that completes after `duration`.
///
/// A zero duration completes inline without touching the timer thread.
/// A duration whose deadline the clock cannot represent yields a wrapper
/// faulted with [`Error::InvalidArgument`](crate::error::Error::InvalidArgument).
/// Continuations registered without context capture run on the timer thread.
pub fn delay(duration: Duration) -> ValueTask<()> {
    if duration.is_zero() {
        return ValueTask::completed();
    }
    let Some(deadline) = Instant::now().checked_add(duration) else {
        return ValueTask::faulted(crate::error::Error::InvalidArgument(
            "delay deadline overflows the clock",
        ));
    };
    let Some(service) = TimerService::global() else {
        return ValueTask::faulted(crate::error::Error::InvalidState(
            "timer thread is unavailable",
        ));
    };
    let (writer, reader) = signal();
    service.schedule(deadline, writer);
    ValueTask::from_signal(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::CompletionSignal;

    fn entry() -> (SignalWriter<()>, CompletionSignal<()>) {
        signal()
    }

    #[test]
    fn empty_heap_has_no_deadline() {
        let heap = TimerHeap::new();
        assert!(heap.is_empty());
        assert_eq!(heap.peek_deadline(), None);
    }

    #[test]
    fn pop_expired_returns_due_writers_in_deadline_order() {
        let base = Instant::now();
        let mut heap = TimerHeap::new();
        let (w1, r1) = entry();
        let (w2, r2) = entry();
        let (w3, r3) = entry();
        heap.insert(base + Duration::from_millis(100), w1);
        heap.insert(base + Duration::from_millis(200), w2);
        heap.insert(base + Duration::from_millis(50), w3);
        assert_eq!(heap.peek_deadline(), Some(base + Duration::from_millis(50)));

        let expired = heap.pop_expired(base + Duration::from_millis(125));
        assert_eq!(expired.len(), 2);
        for writer in expired {
            writer.set_result(());
        }
        assert!(r1.is_completed());
        assert!(r3.is_completed());
        assert!(!r2.is_completed());
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn zero_delay_is_inline() {
        let task = delay(Duration::ZERO);
        assert!(task.is_inline());
    }

    #[test]
    fn unrepresentable_deadline_is_an_argument_error() {
        let task = delay(Duration::MAX);
        assert!(task.is_faulted());
        assert!(matches!(
            task.get_result(),
            Err(crate::error::Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn delay_completes_after_deadline() {
        let start = Instant::now();
        let task = delay(Duration::from_millis(30));
        assert!(!task.is_completed());
        task.get_result().expect("delay");
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
