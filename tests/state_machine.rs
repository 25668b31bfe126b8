//! End-to-end behaviour of hand-lowered async methods.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tasklike::machine::{
    AsyncStateMachine, AwaitPoll, Finally, MachineContext, Step, run_task, run_value_task,
};
use tasklike::runtime::{self, LocalExecutor, ThreadPool};
use tasklike::signal::signal;
use tasklike::task::{ConfiguredValueTask, ValueTask, ValueTaskAwaiter};
use tasklike::test_utils::{ManualLeaf, init_test_logging};
use tasklike::{Error, PoolConfig, Result, assert_with_log, metrics, test_complete, test_phase};

fn init_test(name: &str) {
    init_test_logging();
    test_phase!(name);
}

fn thread_name() -> Option<String> {
    thread::current().name().map(str::to_owned)
}

/// `return await operand;`, reporting the thread it finished on.
struct AwaitOnce<T: Send + 'static> {
    operand: Option<ConfiguredValueTask<T>>,
    waiting: Option<ValueTaskAwaiter<T>>,
}

impl<T: Send + 'static> AwaitOnce<T> {
    fn new(operand: ConfiguredValueTask<T>) -> Self {
        Self {
            operand: Some(operand),
            waiting: None,
        }
    }
}

impl<T: Send + 'static> AsyncStateMachine for AwaitOnce<T> {
    type Output = (T, Option<String>);

    fn advance(&mut self, cx: &mut MachineContext<'_>) -> Result<Step<Self::Output>> {
        let awaiter = match (self.waiting.take(), self.operand.take()) {
            (Some(awaiter), _) => awaiter,
            (None, Some(operand)) => operand.get_awaiter(),
            (None, None) => unreachable!("advanced after completion"),
        };
        match cx.try_await_captured(awaiter) {
            AwaitPoll::Ready(result) => Ok(Step::Complete((result?, thread_name()))),
            AwaitPoll::Suspended(awaiter) => {
                self.waiting = Some(awaiter);
                Ok(Step::Suspend)
            }
        }
    }
}

/// `await delay(d); return value;`
struct AfterDelay {
    delay: Option<Duration>,
    waiting: Option<ValueTaskAwaiter<()>>,
    value: u32,
}

impl AsyncStateMachine for AfterDelay {
    type Output = u32;

    fn advance(&mut self, cx: &mut MachineContext<'_>) -> Result<Step<u32>> {
        let awaiter = match (self.waiting.take(), self.delay.take()) {
            (Some(awaiter), _) => awaiter,
            (None, Some(delay)) => runtime::delay(delay).get_awaiter(),
            (None, None) => unreachable!("advanced after completion"),
        };
        match cx.try_await(awaiter) {
            AwaitPoll::Ready(result) => {
                result?;
                Ok(Step::Complete(self.value))
            }
            AwaitPoll::Suspended(awaiter) => {
                self.waiting = Some(awaiter);
                Ok(Step::Suspend)
            }
        }
    }
}

enum Stage {
    Start,
    First(ValueTaskAwaiter<u32>),
    Second { first: u32, awaiter: ValueTaskAwaiter<u32> },
    Done,
}

/// ```text
/// try {
///     let first = await leaf.start();
///     let second = await leaf.start();
///     return first + second;
/// } finally { cleanups += 1; }
/// ```
struct SumTwo {
    leaf: Arc<ManualLeaf<u32>>,
    stage: Stage,
    finally: Finally,
    cleanups: Arc<AtomicUsize>,
}

impl SumTwo {
    fn new(leaf: &Arc<ManualLeaf<u32>>, cleanups: &Arc<AtomicUsize>) -> Self {
        Self {
            leaf: Arc::clone(leaf),
            stage: Stage::Start,
            finally: Finally::new(),
            cleanups: Arc::clone(cleanups),
        }
    }

    fn exit(&mut self, result: Result<u32>) -> Result<Step<u32>> {
        let cleanups = Arc::clone(&self.cleanups);
        self.finally.run(0, move || {
            cleanups.fetch_add(1, Ordering::SeqCst);
        });
        result.map(Step::Complete)
    }
}

impl AsyncStateMachine for SumTwo {
    type Output = u32;

    fn advance(&mut self, cx: &mut MachineContext<'_>) -> Result<Step<u32>> {
        loop {
            match std::mem::replace(&mut self.stage, Stage::Done) {
                Stage::Start => self.stage = Stage::First(self.leaf.start().get_awaiter()),
                Stage::First(awaiter) => match cx.try_await(awaiter) {
                    AwaitPoll::Ready(Ok(first)) => {
                        self.stage = Stage::Second {
                            first,
                            awaiter: self.leaf.start().get_awaiter(),
                        };
                    }
                    AwaitPoll::Ready(Err(err)) => return self.exit(Err(err)),
                    AwaitPoll::Suspended(awaiter) => {
                        self.stage = Stage::First(awaiter);
                        return Ok(Step::Suspend);
                    }
                },
                Stage::Second { first, awaiter } => match cx.try_await(awaiter) {
                    AwaitPoll::Ready(second) => return self.exit(second.map(|s| first + s)),
                    AwaitPoll::Suspended(awaiter) => {
                        self.stage = Stage::Second { first, awaiter };
                        return Ok(Step::Suspend);
                    }
                },
                Stage::Done => unreachable!("advanced after completion"),
            }
        }
    }
}

#[test]
fn synchronous_leaf_completes_inline_without_allocating() {
    init_test("synchronous_leaf_completes_inline_without_allocating");
    let before = metrics::snapshot();
    let task = run_value_task(AwaitOnce::new(ValueTask::new(10_u32).configure_await(true)));
    let delta = metrics::snapshot().since(&before);

    assert!(task.is_inline());
    assert_with_log!(delta.is_allocation_free(), "allocations", "none", delta);
    assert_eq!(delta.continuations_registered, 0);
    let (value, _) = task.get_result().expect("inline result");
    assert_eq!(value, 10);
    test_complete!("synchronous_leaf_completes_inline_without_allocating");
}

#[test]
fn delayed_leaf_registers_exactly_one_continuation() {
    init_test("delayed_leaf_registers_exactly_one_continuation");
    let started = Instant::now();
    let before = metrics::snapshot();
    let task = run_value_task(AfterDelay {
        delay: Some(Duration::from_millis(100)),
        waiting: None,
        value: 10,
    });
    let delta = metrics::snapshot().since(&before);

    assert!(!task.is_inline());
    assert_with_log!(
        delta.continuations_registered == 1,
        "continuations registered",
        1,
        delta.continuations_registered
    );
    assert_eq!(delta.machines_boxed, 1);
    assert_eq!(task.get_result().expect("delayed result"), 10);
    assert!(started.elapsed() >= Duration::from_millis(100));
    test_complete!("delayed_leaf_registers_exactly_one_continuation");
}

#[test]
fn locals_survive_suspension_and_finally_runs_once() {
    init_test("locals_survive_suspension_and_finally_runs_once");
    let leaf = ManualLeaf::new();
    let cleanups = Arc::new(AtomicUsize::new(0));
    let task = run_value_task(SumTwo::new(&leaf, &cleanups));

    assert!(!task.is_completed());
    assert_eq!(leaf.outstanding(), 1);
    assert_eq!(cleanups.load(Ordering::SeqCst), 0, "no finally while suspended");

    assert!(leaf.complete_next(2));
    assert!(!task.is_completed());
    assert_eq!(leaf.outstanding(), 1);
    assert_eq!(cleanups.load(Ordering::SeqCst), 0, "no finally while suspended");

    assert!(leaf.complete_next(40));
    assert!(task.is_completed_successfully());
    assert_eq!(task.get_result().expect("sum"), 42);
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    test_complete!("locals_survive_suspension_and_finally_runs_once");
}

#[test]
fn operand_fault_keeps_identity_and_runs_finally() {
    init_test("operand_fault_keeps_identity_and_runs_finally");
    let leaf = ManualLeaf::new();
    let cleanups = Arc::new(AtomicUsize::new(0));
    let task = run_task(SumTwo::new(&leaf, &cleanups));

    assert!(leaf.complete_next(1));
    let err = Error::msg("second operand failed");
    assert!(leaf.fail_next(err.clone()));

    let first = task.get_result().expect_err("faulted");
    let second = task.get_result().expect_err("still faulted");
    assert!(first.same_error(&err));
    assert!(second.same_error(&err));
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    test_complete!("operand_fault_keeps_identity_and_runs_finally");
}

#[test]
fn task_builder_result_can_be_awaited_natively() {
    init_test("task_builder_result_can_be_awaited_natively");
    let leaf = ManualLeaf::new();
    let task = run_task(AwaitOnce::new(leaf.start().configure_await(false)));
    let completer = {
        let leaf = Arc::clone(&leaf);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            assert!(leaf.complete_next(7));
        })
    };
    let (value, _) = futures_lite::future::block_on(task).expect("awaited");
    completer.join().expect("completer thread");
    assert_eq!(value, 7);
    test_complete!("task_builder_result_can_be_awaited_natively");
}

#[test]
fn captured_context_dispatches_onto_local_executor() {
    init_test("captured_context_dispatches_onto_local_executor");
    let local = LocalExecutor::new();
    let leaf = ManualLeaf::new();
    let task = {
        let _guard = runtime::enter(local.handle());
        run_value_task(AwaitOnce::new(leaf.start().configure_await(true)))
    };

    let before = metrics::snapshot();
    assert!(leaf.complete_next(5));
    let delta = metrics::snapshot().since(&before);
    assert_eq!(delta.continuations_dispatched, 1);
    assert!(!task.is_completed(), "resumption waits for the executor");
    assert_eq!(local.pending(), 1);

    assert_eq!(local.run_until_idle(), 1);
    assert!(task.is_completed());
    assert_eq!(task.get_result().expect("value").0, 5);
    test_complete!("captured_context_dispatches_onto_local_executor");
}

#[test]
fn configure_await_false_resumes_on_completing_thread() {
    init_test("configure_await_false_resumes_on_completing_thread");
    let local = LocalExecutor::new();
    let leaf = ManualLeaf::new();
    let task = {
        let _guard = runtime::enter(local.handle());
        run_value_task(AwaitOnce::new(leaf.start().configure_await(false)))
    };

    assert!(leaf.complete_next(5));
    assert!(task.is_completed());
    assert_eq!(local.pending(), 0);
    assert_eq!(task.get_result().expect("value").0, 5);
    test_complete!("configure_await_false_resumes_on_completing_thread");
}

#[test]
fn captured_pool_resumes_on_a_worker() {
    init_test("captured_pool_resumes_on_a_worker");
    let pool = ThreadPool::new(PoolConfig::default().workers(2).thread_name_prefix("sm-pool"))
        .expect("pool");
    let leaf = ManualLeaf::new();
    let task = {
        let _guard = runtime::enter(pool.handle());
        run_value_task(AwaitOnce::new(leaf.start().configure_await(true)))
    };

    assert!(leaf.complete_next(9));
    let (value, resumed_on) = task.get_result().expect("value");
    assert_eq!(value, 9);
    let resumed_on = resumed_on.expect("workers are named");
    assert_with_log!(
        resumed_on.starts_with("sm-pool-"),
        "resumption thread",
        "sm-pool-*",
        resumed_on
    );
    pool.shutdown();
    test_complete!("captured_pool_resumes_on_a_worker");
}

/// Panics on its first advance after resumption.
struct PanicsAfterAwait {
    leaf: Arc<ManualLeaf<u32>>,
    resumed: bool,
}

impl AsyncStateMachine for PanicsAfterAwait {
    type Output = u32;

    fn advance(&mut self, cx: &mut MachineContext<'_>) -> Result<Step<u32>> {
        if self.resumed {
            panic!("body exploded");
        }
        let awaiter = self.leaf.start().get_awaiter();
        cx.await_on_completed_unsafe(&awaiter);
        self.resumed = true;
        Ok(Step::Suspend)
    }
}

#[test]
fn panic_after_resumption_becomes_a_fault() {
    init_test("panic_after_resumption_becomes_a_fault");
    let leaf = ManualLeaf::new();
    let task = run_value_task(PanicsAfterAwait {
        leaf: Arc::clone(&leaf),
        resumed: false,
    });
    assert!(!task.is_completed());

    assert!(leaf.complete_next(1));
    assert!(task.is_faulted());
    let err = task.get_result().expect_err("panicked body");
    let fault = err.as_fault().expect("fault");
    assert!(fault.is_panic());
    assert!(err.to_string().contains("body exploded"));
    test_complete!("panic_after_resumption_becomes_a_fault");
}

#[test]
fn dropped_writer_cancels_the_method() {
    init_test("dropped_writer_cancels_the_method");
    let (writer, reader) = signal::<u32>();
    let task = run_value_task(AwaitOnce::new(
        ValueTask::from_signal(reader).configure_await(false),
    ));
    assert!(!task.is_completed());

    drop(writer);
    assert!(task.is_canceled());
    assert!(task.get_result().expect_err("canceled").is_canceled());
    test_complete!("dropped_writer_cancels_the_method");
}

#[test]
fn concurrent_completions_each_resume_their_own_machine() {
    init_test("concurrent_completions_each_resume_their_own_machine");
    let leaf = ManualLeaf::new();
    let completed = Arc::new(Mutex::new(Vec::new()));
    let tasks: Vec<_> = (0..8)
        .map(|_| run_task(AwaitOnce::new(leaf.start().configure_await(false))))
        .collect();

    let completers: Vec<_> = (0..8_u32)
        .map(|n| {
            let leaf = Arc::clone(&leaf);
            let completed = Arc::clone(&completed);
            thread::spawn(move || {
                assert!(leaf.complete_next(n));
                completed.lock().push(n);
            })
        })
        .collect();
    for completer in completers {
        completer.join().expect("completer");
    }

    let mut values: Vec<u32> = tasks
        .iter()
        .map(|task| task.get_result().expect("value").0)
        .collect();
    values.sort_unstable();
    assert_eq!(values, (0..8).collect::<Vec<_>>());
    assert_eq!(completed.lock().len(), 8);
    test_complete!("concurrent_completions_each_resume_their_own_machine");
}
