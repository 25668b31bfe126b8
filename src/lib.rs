//! Tasklike: low-overhead async results, resumable state machines and async
//! enumerators.
//!
//! # Overview
//!
//! An async method that usually finishes synchronously should not pay for a
//! heap allocation. This crate provides the pieces an async-method lowering
//! needs to make that true:
//!
//! - [`ValueTask`] holds either an inline result or a pending
//!   [`CompletionSignal`], so a synchronous result costs nothing.
//! - [`machine`] drives a resumable state machine and only moves it to the
//!   heap at its first real suspension.
//! - [`iter`] runs bodies that both await and yield, with cooperative
//!   disposal that runs outstanding cleanup exactly once.
//!
//! # Module Structure
//!
//! - [`signal`]: Single-writer completion signal and continuations
//! - [`task`]: [`ValueTask`], [`Task`] and the [`Awaiter`](task::Awaiter) protocol
//! - [`machine`]: State machine trait, builders and the boxed driver
//! - [`iter`]: Async iterator bodies and the enumerator that steps them
//! - [`runtime`]: Executors a continuation can be dispatched to, plus
//!   [`delay`](runtime::delay) and [`yield_now`](runtime::yield_now)
//! - [`types`]: Completion status and cancellation reasons
//! - [`error`](mod@error): Error types
//! - [`config`]: Thread pool configuration
//! - [`metrics`]: Allocation and registration counters
//! - [`tracing_compat`]: Optional tracing integration (requires `tracing-integration` feature)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod iter;
pub mod machine;
pub mod metrics;
pub mod runtime;
pub mod signal;
pub mod task;
pub mod tracing_compat;
pub mod types;

#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

pub use config::{ConfigError, PoolConfig};
pub use error::{Error, Fault, Result};
pub use iter::{AsyncEnumerator, AsyncIteratorMachine, IterStep, IteratorContext};
pub use machine::{
    AsyncMethodBuilder, AsyncStateMachine, MachineContext, Step, TaskMethodBuilder,
    ValueTaskMethodBuilder,
};
pub use signal::{CompletionSignal, SignalWriter};
pub use task::{Task, ValueTask};
pub use types::CompletionStatus;
