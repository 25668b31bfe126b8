//! Why a completion was canceled.
//!
//! The core signal and wrapper types never originate cancellation. A
//! canceled completion is just another way an awaited operand can finish, and
//! the driver propagates it exactly like a fault. These types describe why it
//! happened.

use core::fmt;

/// What canceled a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelKind {
    /// Requested by the code that owns the operation.
    User,
    /// The operation's deadline passed.
    Timeout,
    /// The writer of a completion signal was dropped without completing it.
    Abandoned,
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Timeout => write!(f, "timeout"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Carried by [`Error::Canceled`](crate::error::Error::Canceled).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    /// What canceled it.
    pub kind: CancelKind,
    /// Context for logs and `Display`.
    pub message: Option<&'static str>,
}

impl CancelReason {
    /// A reason of `kind` with no message.
    #[must_use]
    pub const fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// A [`CancelKind::User`] reason with a message.
    #[must_use]
    pub const fn user(message: &'static str) -> Self {
        Self {
            kind: CancelKind::User,
            message: Some(message),
        }
    }

    /// A [`CancelKind::Timeout`] reason.
    #[must_use]
    pub const fn timeout() -> Self {
        Self::new(CancelKind::Timeout)
    }

    /// The reason a signal carries when its writer is dropped uncompleted.
    #[must_use]
    pub const fn abandoned() -> Self {
        Self {
            kind: CancelKind::Abandoned,
            message: Some("completion signal dropped before completing"),
        }
    }

    /// What canceled it.
    #[must_use]
    pub const fn kind(&self) -> CancelKind {
        self.kind
    }
}

impl Default for CancelReason {
    fn default() -> Self {
        Self::new(CancelKind::User)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}
