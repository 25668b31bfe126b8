//! Core value types shared by the signal, wrapper and driver layers.
//!
//! - [`cancel`]: Cancellation reason and kind types
//! - [`status`]: Completion status of an asynchronous computation

pub mod cancel;
pub mod status;

pub use cancel::{CancelKind, CancelReason};
pub use status::CompletionStatus;
