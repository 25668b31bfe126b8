//! Resumable state machines and the builders that drive them.
//!
//! An async method is lowered into a type implementing
//! [`AsyncStateMachine`]: a state tag, one field per local that lives across
//! a suspension, the awaiter of the current suspension, and an
//! [`advance`](AsyncStateMachine::advance) entry point that dispatches on the
//! state tag and runs until the method returns, fails, or reaches an await
//! whose operand is not complete yet.
//!
//! ```
//! use tasklike::machine::{AsyncStateMachine, MachineContext, Step, run_value_task};
//! use tasklike::task::{Awaiter, ValueTask, ValueTaskAwaiter};
//! use tasklike::Result;
//!
//! enum AddOne {
//!     Start(ValueTask<u32>),
//!     Awaiting(ValueTaskAwaiter<u32>),
//!     Finished,
//! }
//!
//! impl AsyncStateMachine for AddOne {
//!     type Output = u32;
//!
//!     fn advance(&mut self, cx: &mut MachineContext<'_>) -> Result<Step<u32>> {
//!         let awaiter = match std::mem::replace(self, AddOne::Finished) {
//!             AddOne::Start(operand) => operand.get_awaiter(),
//!             AddOne::Awaiting(awaiter) => awaiter,
//!             AddOne::Finished => unreachable!("advanced after finishing"),
//!         };
//!         if !awaiter.is_completed() {
//!             cx.await_on_completed_unsafe(&awaiter);
//!             *self = AddOne::Awaiting(awaiter);
//!             return Ok(Step::Suspend);
//!         }
//!         Ok(Step::Complete(awaiter.get_result()? + 1))
//!     }
//! }
//!
//! let task = run_value_task(AddOne::Start(ValueTask::new(41)));
//! assert!(task.is_inline());
//! assert_eq!(task.get_result().unwrap(), 42);
//! ```

mod boxed;
mod builder;
mod context;
mod state;

pub use boxed::{BoxedMachine, MachineHandle, Resumable};
pub(crate) use boxed::{SUSPENDED_WITHOUT_AWAIT, advance_guarded};
pub use builder::{
    AsyncMethodBuilder, BuilderPhase, TaskMethodBuilder, ValueTaskMethodBuilder, run_task,
    run_value_task,
};
pub(crate) use context::Registration;
pub use context::{AwaitPoll, MachineContext};
pub use state::{Finally, MachineState};

use crate::error::Result;

/// Outcome of one [`AsyncStateMachine::advance`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    /// The method returned.
    Complete(T),
    /// The method is waiting on an operand and recorded a registration.
    Suspend,
}

/// A resumable async method body.
///
/// `advance` is never entered concurrently with itself. It must leave the
/// machine in a state from which the next call continues right after the
/// suspension point it stopped at, and it must run every `finally` block
/// exactly once on return and on failure, never on suspension.
pub trait AsyncStateMachine: Send + 'static {
    /// Value the method returns.
    type Output: Send + 'static;

    /// Runs the body from the current state until it returns, fails, or
    /// suspends.
    ///
    /// To suspend, record a registration through `cx` and return
    /// [`Step::Suspend`]. Errors and panics are delivered to the method's
    /// result, never to the caller of `advance`.
    fn advance(&mut self, cx: &mut MachineContext<'_>) -> Result<Step<Self::Output>>;
}
