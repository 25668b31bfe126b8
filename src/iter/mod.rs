//! Async iterators: bodies that both await and yield.
//!
//! A body implements [`AsyncIteratorMachine`]; [`AsyncEnumerator`] steps it
//! for a consumer. Disposal is cooperative: when the consumer stops early,
//! the body is advanced one more time with
//! [`IteratorContext::is_disposing`] set and runs its outstanding cleanup.

mod consume;
mod enumerator;
mod machine;

pub use consume::for_each;
pub use enumerator::AsyncEnumerator;
pub use machine::{AsyncIteratorMachine, Completion, IterStep, IteratorContext};
