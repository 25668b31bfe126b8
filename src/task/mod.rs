//! Result wrappers and the awaiting protocol.
//!
//! - [`ValueTask`]: inline value or pending signal, allocation-free when the
//!   result is known up front
//! - [`Task`]: the always-allocated, cloneable, `Future` form
//! - [`Awaiter`]: what a state machine asks of the thing it awaits

mod awaiter;
#[allow(clippy::module_inception)]
mod task;
mod value_task;

pub use awaiter::{Awaiter, CompletionHandle};
pub use task::{Task, TaskAwaiter};
pub use value_task::{ConfiguredValueTask, ValueTask, ValueTaskAwaiter, ValueTaskFuture};
