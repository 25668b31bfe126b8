//! Optional tracing integration.
//!
//! With the `tracing-integration` feature enabled, the logging macros in this
//! module are re-exports of the [`tracing`] crate's macros. Without it they
//! expand to nothing, so instrumented hot paths (continuation registration,
//! machine resumption) cost nothing in builds that do not ask for logs.
//!
//! Call sites always import from here:
//!
//! ```ignore
//! use crate::tracing_compat::debug;
//!
//! debug!(state = ?state, "state machine boxed at first suspension");
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    #[doc(hidden)]
    #[macro_export]
    macro_rules! __tasklike_noop_trace {
        ($($arg:tt)*) => {};
    }

    #[doc(hidden)]
    #[macro_export]
    macro_rules! __tasklike_noop_debug {
        ($($arg:tt)*) => {};
    }

    #[doc(hidden)]
    #[macro_export]
    macro_rules! __tasklike_noop_info {
        ($($arg:tt)*) => {};
    }

    #[doc(hidden)]
    #[macro_export]
    macro_rules! __tasklike_noop_warn {
        ($($arg:tt)*) => {};
    }

    #[doc(hidden)]
    #[macro_export]
    macro_rules! __tasklike_noop_error {
        ($($arg:tt)*) => {};
    }
}

#[cfg(not(feature = "tracing-integration"))]
pub use crate::{
    __tasklike_noop_debug as debug, __tasklike_noop_error as error, __tasklike_noop_info as info,
    __tasklike_noop_trace as trace, __tasklike_noop_warn as warn,
};

/// Returns true when log events are actually emitted.
#[must_use]
pub const fn enabled() -> bool {
    cfg!(feature = "tracing-integration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_accept_structured_fields() {
        let state = 3_i32;
        trace!(state, "trace");
        debug!(state = ?state, "debug");
        info!(name = %"pool", "info");
        warn!("warn without fields");
        error!(state, reason = "test", "error");
        assert_eq!(enabled(), cfg!(feature = "tracing-integration"));
    }
}
