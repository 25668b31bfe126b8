//! Completion status of an asynchronous computation.

use core::fmt;

/// Where an asynchronous computation stands.
///
/// `Pending` is the only non-terminal status; the other three are final and
/// mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionStatus {
    /// Not completed yet.
    Pending,
    /// Completed with a value.
    Succeeded,
    /// Completed with a fault (or a protocol error reported as a value).
    Faulted,
    /// Completed as canceled.
    Canceled,
}

impl CompletionStatus {
    /// Returns true for any terminal status.
    #[must_use]
    pub const fn is_completed(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns true for [`CompletionStatus::Succeeded`].
    #[must_use]
    pub const fn is_succeeded(self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true for [`CompletionStatus::Faulted`].
    #[must_use]
    pub const fn is_faulted(self) -> bool {
        matches!(self, Self::Faulted)
    }

    /// Returns true for [`CompletionStatus::Canceled`].
    #[must_use]
    pub const fn is_canceled(self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Classifies a completed result.
    #[must_use]
    pub fn of<T>(result: &crate::error::Result<T>) -> Self {
        match result {
            Ok(_) => Self::Succeeded,
            Err(err) if err.is_canceled() => Self::Canceled,
            Err(_) => Self::Faulted,
        }
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Faulted => write!(f, "faulted"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}
