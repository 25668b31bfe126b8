//! Cooperative yielding to the current executor.

use super::executor::current;
use crate::signal::signal;
use crate::task::ValueTask;

/// Gives other jobs on the current executor a chance to run.
///
/// Returns a pending wrapper completed by a job queued on the current
/// executor, so an awaiting state machine suspends and is resumed after the
/// jobs queued ahead of it. With no current executor there is nothing to
/// yield to and the wrapper is completed inline.
pub fn yield_now() -> ValueTask<()> {
    let Some(executor) = current() else {
        return ValueTask::completed();
    };
    let (writer, reader) = signal();
    executor.spawn(move || writer.set_result(()));
    ValueTask::from_signal(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{LocalExecutor, enter};

    #[test]
    fn yield_now_pending_until_executor_runs() {
        crate::test_utils::init_test_logging();
        crate::test_phase!("yield_now_pending_until_executor_runs");

        let local = LocalExecutor::new();
        let task = {
            let _guard = enter(local.handle());
            yield_now()
        };
        assert!(!task.is_completed());
        assert_eq!(local.run_until_idle(), 1);
        assert!(task.is_completed_successfully());
        crate::test_complete!("yield_now_pending_until_executor_runs");
    }

    #[test]
    fn yield_now_without_executor_is_inline() {
        let task = yield_now();
        assert!(task.is_inline());
    }
}
