//! Executors and time.
//!
//! The state machine driver needs no scheduler; these are the places a
//! captured continuation can be sent to, plus two leaf operations that
//! produce genuinely pending wrappers:
//!
//! - [`InlineExecutor`], [`LocalExecutor`], [`ThreadPool`]
//! - [`enter`] / [`current`]: the ambient executor captured by
//!   [`Awaiter::on_completed`](crate::task::Awaiter::on_completed)
//! - [`yield_now`] and [`delay`]

mod executor;
mod local;
mod pool;
mod queue;
pub mod timer;
mod yield_now;

pub use executor::{EnterGuard, Executor, ExecutorHandle, InlineExecutor, Job, current, enter};
pub use local::LocalExecutor;
pub use pool::ThreadPool;
pub use queue::JobQueue;
pub use timer::delay;
pub use yield_now::yield_now;
