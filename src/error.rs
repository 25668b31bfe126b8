//! Error types.
//!
//! Every failure an asynchronous computation can complete with is an
//! [`Error`]. Errors are `Clone`: a faulted completion signal hands the same
//! error to every observer, and the [`Fault`] payload inside keeps its
//! identity across those clones so callers can tell "the original error"
//! apart from a look-alike.

use crate::types::CancelReason;
use core::fmt;
use std::any::Any;
use std::sync::Arc;

/// Boxed error accepted by [`Fault::new`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A body fault: the error raised by an asynchronous method's own logic or by
/// an operand it awaited.
///
/// Cloning a `Fault` shares the underlying error; [`Fault::ptr_eq`] tells
/// whether two faults are the same raised error.
#[derive(Clone)]
pub struct Fault {
    source: Arc<dyn std::error::Error + Send + Sync + 'static>,
}

impl Fault {
    /// Wraps an error raised by user code.
    pub fn new(error: impl Into<BoxError>) -> Self {
        let boxed: BoxError = error.into();
        Self {
            source: Arc::from(boxed),
        }
    }

    /// Wraps a message as a fault.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(FaultMessage(message.into()))
    }

    /// Converts a panic payload caught by the driver into a fault.
    #[must_use]
    pub fn panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&'static str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with non-string payload".to_string());
        Self::new(Panicked(message))
    }

    /// Returns true if both faults carry the very same raised error.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.source, &other.source)
    }

    /// Returns true if this fault came from a caught panic.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        self.source.is::<Panicked>()
    }

    /// Attempts to view the wrapped error as a concrete type.
    #[must_use]
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }

    /// The wrapped error.
    #[must_use]
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.source
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fault").field(&self.source).finish()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, f)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct FaultMessage(String);

#[derive(Debug, thiserror::Error)]
#[error("panicked: {0}")]
struct Panicked(String);

/// The error an asynchronous computation completed with, or a protocol
/// violation reported as a value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The computation faulted.
    #[error("faulted: {0}")]
    Faulted(Fault),
    /// The computation was canceled.
    #[error("canceled: {0}")]
    Canceled(CancelReason),
    /// A constructor was handed an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// An operation was invoked in a state where the protocol forbids it.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// The successful value of a pending computation was already taken.
    #[error("result already consumed")]
    ResultConsumed,
}

impl Error {
    /// Wraps an arbitrary error as a fault.
    pub fn fault(error: impl Into<BoxError>) -> Self {
        Self::Faulted(Fault::new(error))
    }

    /// Builds a fault from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Faulted(Fault::msg(message))
    }

    /// Returns true for [`Error::Canceled`].
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }

    /// Returns the fault payload, if this is a body fault.
    #[must_use]
    pub const fn as_fault(&self) -> Option<&Fault> {
        match self {
            Self::Faulted(fault) => Some(fault),
            _ => None,
        }
    }

    /// Returns true if both errors are the same observation of one raised
    /// error: identical faults, or structurally equal protocol errors.
    #[must_use]
    pub fn same_error(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Faulted(a), Self::Faulted(b)) => a.ptr_eq(b),
            (Self::Canceled(a), Self::Canceled(b)) => a == b,
            (Self::InvalidArgument(a), Self::InvalidArgument(b))
            | (Self::InvalidState(a), Self::InvalidState(b)) => a == b,
            (Self::ResultConsumed, Self::ResultConsumed) => true,
            _ => false,
        }
    }
}

impl From<Fault> for Error {
    fn from(fault: Fault) -> Self {
        Self::Faulted(fault)
    }
}

impl From<CancelReason> for Error {
    fn from(reason: CancelReason) -> Self {
        Self::Canceled(reason)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CancelKind;

    #[derive(Debug, thiserror::Error)]
    #[error("disk on fire")]
    struct DiskError;

    #[test]
    fn fault_identity_survives_clone() {
        let err = Error::fault(DiskError);
        let copy = err.clone();
        assert!(err.same_error(&copy));
        assert!(!err.same_error(&Error::fault(DiskError)));
    }

    #[test]
    fn fault_downcasts_to_original_type() {
        let fault = Fault::new(DiskError);
        assert!(fault.downcast_ref::<DiskError>().is_some());
        assert_eq!(fault.to_string(), "disk on fire");
    }

    #[test]
    fn panic_payloads_become_faults() {
        let fault = Fault::panic(Box::new("boom"));
        assert!(fault.is_panic());
        assert_eq!(fault.to_string(), "panicked: boom");

        let fault = Fault::panic(Box::new(String::from("owned boom")));
        assert_eq!(fault.to_string(), "panicked: owned boom");

        let fault = Fault::panic(Box::new(17_u8));
        assert!(fault.to_string().contains("non-string"));
    }

    #[test]
    fn display_messages() {
        let err = Error::Canceled(CancelReason::new(CancelKind::Abandoned));
        assert!(err.is_canceled());
        assert_eq!(err.to_string(), "canceled: abandoned");
        assert_eq!(
            Error::InvalidArgument("signal").to_string(),
            "invalid argument: signal"
        );
        assert_eq!(Error::msg("bad").to_string(), "faulted: bad");
    }
}
