//! Resume-point bookkeeping for state machines.

use core::fmt;

/// Where a resumable state machine stands.
///
/// Suspension points are numbered in source order and reported by the body
/// itself; awaits and yields share one numbering space, the variant tells
/// which kind of point it is. The raw integer encoding mirrors that: `-1` not started, `-2`
/// finished, `-3` disposing, `n >= 0` suspended at point `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineState {
    /// The body has not run yet.
    NotStarted,
    /// Suspended at await point `n`, waiting for an operand.
    SuspendedAtAwait(u32),
    /// Suspended at yield point `n`, waiting for the consumer.
    SuspendedAtYield(u32),
    /// Running cleanup after a dispose request.
    Disposing,
    /// Done. Further advances are no-ops.
    Finished,
}

impl MachineState {
    /// Raw encoding of [`MachineState::NotStarted`].
    pub const NOT_STARTED: i32 = -1;
    /// Raw encoding of [`MachineState::Finished`].
    pub const FINISHED: i32 = -2;
    /// Raw encoding of [`MachineState::Disposing`].
    pub const DISPOSING: i32 = -3;

    /// Raw integer encoding.
    #[must_use]
    pub const fn raw(self) -> i32 {
        match self {
            Self::NotStarted => Self::NOT_STARTED,
            Self::Finished => Self::FINISHED,
            Self::Disposing => Self::DISPOSING,
            #[allow(clippy::cast_possible_wrap)]
            Self::SuspendedAtAwait(n) | Self::SuspendedAtYield(n) => (n & 0x7fff_ffff) as i32,
        }
    }

    /// Returns true while suspended at an await or a yield.
    #[must_use]
    pub const fn is_suspended(self) -> bool {
        matches!(self, Self::SuspendedAtAwait(_) | Self::SuspendedAtYield(_))
    }

    /// Returns true once finished.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Finished)
    }

    /// The legal transition table.
    ///
    /// Progress is monotone: nothing leads back to `NotStarted`, and
    /// `Finished` leads nowhere. The jump to `Disposing` is legal only from a
    /// yield suspension. Cleanup may itself await, hence
    /// `Disposing -> SuspendedAtAwait`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Finished | Self::Disposing, Self::SuspendedAtYield(_))
            | (_, Self::NotStarted)
            | (Self::Finished, _)
            | (Self::Disposing, Self::Disposing) => false,
            (Self::SuspendedAtYield(_), Self::Disposing) => true,
            (_, Self::Disposing) => false,
            _ => true,
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not-started"),
            Self::SuspendedAtAwait(n) => write!(f, "suspended-at-await({n})"),
            Self::SuspendedAtYield(n) => write!(f, "suspended-at-yield({n})"),
            Self::Disposing => write!(f, "disposing"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// Tracks which cleanup blocks of a machine have run.
///
/// A compiled `finally` block must run exactly once on every exit path. The
/// machine keeps one `Finally` among its fields and routes each cleanup
/// through [`Finally::run`], so the normal exit path, the fault path and the
/// dispose path cannot run the same block twice. Blocks are indexed `0..32`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Finally {
    ran: u32,
}

impl Finally {
    /// No cleanup has run.
    #[must_use]
    pub const fn new() -> Self {
        Self { ran: 0 }
    }

    /// Runs cleanup block `index` unless it already ran.
    ///
    /// Returns true if `cleanup` was invoked.
    ///
    /// # Panics
    ///
    /// Panics if `index >= 32`.
    pub fn run<F: FnOnce()>(&mut self, index: u8, cleanup: F) -> bool {
        assert!(index < 32, "cleanup block index out of range");
        let bit = 1_u32 << index;
        if self.ran & bit != 0 {
            return false;
        }
        self.ran |= bit;
        cleanup();
        true
    }

    /// Returns true if block `index` ran.
    #[must_use]
    pub const fn has_run(&self, index: u8) -> bool {
        index < 32 && self.ran & (1_u32 << index) != 0
    }

    /// Number of blocks that ran.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.ran.count_ones()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_encoding() {
        assert_eq!(MachineState::NotStarted.raw(), -1);
        assert_eq!(MachineState::Finished.raw(), -2);
        assert_eq!(MachineState::Disposing.raw(), -3);
        assert_eq!(MachineState::SuspendedAtAwait(0).raw(), 0);
        assert_eq!(MachineState::SuspendedAtYield(4).raw(), 4);
    }

    #[test]
    fn dispose_jump_only_from_yield() {
        use MachineState::*;
        assert!(SuspendedAtYield(1).can_transition_to(Disposing));
        assert!(!SuspendedAtAwait(0).can_transition_to(Disposing));
        assert!(!NotStarted.can_transition_to(Disposing));
        assert!(!Finished.can_transition_to(Disposing));
        assert!(!Disposing.can_transition_to(Disposing));
    }

    #[test]
    fn progress_is_monotone() {
        use MachineState::*;
        assert!(NotStarted.can_transition_to(SuspendedAtAwait(0)));
        assert!(NotStarted.can_transition_to(Finished));
        assert!(SuspendedAtAwait(0).can_transition_to(SuspendedAtYield(1)));
        assert!(SuspendedAtYield(1).can_transition_to(SuspendedAtAwait(2)));
        assert!(Disposing.can_transition_to(SuspendedAtAwait(3)));
        assert!(Disposing.can_transition_to(Finished));
        assert!(!Disposing.can_transition_to(SuspendedAtYield(2)));
        assert!(!SuspendedAtAwait(0).can_transition_to(NotStarted));
        assert!(!Finished.can_transition_to(Finished));
        assert!(!Finished.can_transition_to(SuspendedAtAwait(0)));
    }

    #[test]
    fn finally_runs_each_block_once() {
        let mut finally = Finally::new();
        let mut hits = 0;
        assert!(finally.run(0, || hits += 1));
        assert!(!finally.run(0, || hits += 1));
        assert!(finally.run(3, || hits += 1));
        assert_eq!(hits, 2);
        assert!(finally.has_run(3));
        assert!(!finally.has_run(1));
        assert_eq!(finally.count(), 2);
    }

    #[test]
    fn display() {
        assert_eq!(MachineState::SuspendedAtYield(2).to_string(), "suspended-at-yield(2)");
        assert_eq!(MachineState::NotStarted.to_string(), "not-started");
    }
}
