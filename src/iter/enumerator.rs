//! The consumer-facing async enumerator.
//!
//! [`AsyncEnumerator`] owns an iterator body and steps it on request:
//! [`move_next`](AsyncEnumerator::move_next) runs the body up to its next
//! yield, and [`dispose`](AsyncEnumerator::dispose) runs its outstanding
//! cleanup when the consumer stops early. A step that finishes synchronously
//! (a yield or the end of the body reached without a pending await) returns
//! an inline wrapper; only a step that suspends allocates a signal.

use super::machine::{AsyncIteratorMachine, Completion, IterStep, IteratorContext};
use crate::error::{Error, Result};
use crate::machine::{MachineState, Registration, SUSPENDED_WITHOUT_AWAIT, advance_guarded};
use crate::signal::{Continuation, SignalWriter, signal};
use crate::task::ValueTask;
use crate::tracing_compat::{debug, trace};
use core::fmt;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::sync::Arc;

const STEP_IN_FLIGHT: &str = "move_next called while a previous step is in flight";
const DISPOSE_IN_FLIGHT: &str = "dispose called while an await is in flight";
const YIELD_WHILE_DISPOSING: &str = "iterator body yielded while disposing";

/// The outstanding consumer request while the body waits on an operand.
enum InFlight {
    MoveNext(SignalWriter<bool>),
    Dispose(SignalWriter<()>),
}

enum Resolution {
    Yielded,
    Finished,
    Faulted(Error),
    Suspended(Registration),
}

struct Core<M: AsyncIteratorMachine> {
    machine: Option<M>,
    state: MachineState,
    completion: Option<Completion>,
    current: Option<M::Item>,
    disposing: bool,
    in_flight: Option<InFlight>,
}

impl<M: AsyncIteratorMachine> Core<M> {
    fn transition(&mut self, next: MachineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal state transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }

    fn finish(&mut self) {
        let completion = if self.disposing {
            Completion::Disposed
        } else {
            Completion::Natural
        };
        self.machine = None;
        self.current = None;
        self.transition(MachineState::Finished);
        self.completion = Some(completion);
        debug!(%completion, "async enumerator finished");
    }

    /// Advances the body once and settles the bookkeeping.
    fn drive(&mut self) -> Resolution {
        let disposing = self.disposing;
        let Some(machine) = self.machine.as_mut() else {
            return Resolution::Finished;
        };
        let (outcome, registration) = advance_guarded(|cx| {
            let mut cx = IteratorContext::new(cx.reborrow(), disposing);
            machine.advance(&mut cx)
        });
        match (outcome, registration) {
            (Ok(IterStep::Yield(..)), _) if disposing => {
                self.finish();
                Resolution::Faulted(Error::InvalidState(YIELD_WHILE_DISPOSING))
            }
            (Ok(IterStep::Yield(point, item)), _) => {
                self.current = Some(item);
                self.transition(MachineState::SuspendedAtYield(point));
                Resolution::Yielded
            }
            (Ok(IterStep::Suspend(point)), Some(registration)) => {
                self.transition(MachineState::SuspendedAtAwait(point));
                Resolution::Suspended(registration)
            }
            (Ok(IterStep::Suspend(_)), None) => {
                self.finish();
                Resolution::Faulted(Error::InvalidState(SUSPENDED_WITHOUT_AWAIT))
            }
            (Ok(IterStep::Complete), _) => {
                self.finish();
                Resolution::Finished
            }
            (Err(err), _) => {
                self.finish();
                Resolution::Faulted(err)
            }
        }
    }
}

struct Shared<M: AsyncIteratorMachine> {
    core: Mutex<Core<M>>,
}

impl<M: AsyncIteratorMachine> Shared<M> {
    fn continuation(this: &Arc<Self>) -> Continuation {
        let this = Arc::clone(this);
        Continuation::new(move || Self::resume(&this))
    }

    /// Continues the body after the operand it was waiting on completed.
    fn resume(this: &Arc<Self>) {
        let mut core = this.core.lock();
        let Some(request) = core.in_flight.take() else {
            trace!("async enumerator resumed with no step in flight");
            return;
        };
        let resolution = core.drive();
        if let Resolution::Suspended(registration) = resolution {
            core.in_flight = Some(request);
            drop(core);
            registration.perform(Self::continuation(this));
            return;
        }
        drop(core);
        match (request, resolution) {
            (InFlight::MoveNext(writer), Resolution::Yielded) => writer.set_result(true),
            (InFlight::MoveNext(writer), Resolution::Finished) => writer.set_result(false),
            (InFlight::MoveNext(writer), Resolution::Faulted(err)) => writer.set_error(err),
            (InFlight::Dispose(writer), Resolution::Finished) => writer.set_result(()),
            (InFlight::Dispose(writer), Resolution::Faulted(err)) => writer.set_error(err),
            (InFlight::Dispose(writer), Resolution::Yielded) => {
                writer.set_error(Error::InvalidState(YIELD_WHILE_DISPOSING));
            }
            (_, Resolution::Suspended(_)) => unreachable!("suspension handled above"),
        }
    }
}

/// An async iterator: yields elements, may await between them, and supports
/// cooperative early disposal.
///
/// The legal consumption sequence is: call `move_next` until it produces
/// `false` or a fault, then call `dispose` exactly once. [`for_each`] does
/// exactly that.
///
/// [`for_each`]: super::for_each
pub struct AsyncEnumerator<M: AsyncIteratorMachine> {
    shared: Arc<Shared<M>>,
    pub(super) pending: Option<crate::task::ValueTaskFuture<bool>>,
}

impl<M: AsyncIteratorMachine> AsyncEnumerator<M> {
    /// Wraps an iterator body. Nothing runs until the first `move_next`.
    pub fn new(machine: M) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    machine: Some(machine),
                    state: MachineState::NotStarted,
                    completion: None,
                    current: None,
                    disposing: false,
                    in_flight: None,
                }),
            }),
            pending: None,
        }
    }

    /// Runs the body up to its next yield.
    ///
    /// Produces `true` when a new element is available through
    /// [`current`](Self::current), `false` once the body has finished.
    /// A call made while a previous step is still in flight is rejected with
    /// [`Error::InvalidState`] and leaves the body untouched.
    pub fn move_next(&mut self) -> ValueTask<bool> {
        let Some(mut core) = self.shared.core.try_lock() else {
            return ValueTask::faulted(Error::InvalidState(STEP_IN_FLIGHT));
        };
        if core.in_flight.is_some() {
            return ValueTask::faulted(Error::InvalidState(STEP_IN_FLIGHT));
        }
        core.current = None;
        match core.drive() {
            Resolution::Yielded => ValueTask::new(true),
            Resolution::Finished => ValueTask::new(false),
            Resolution::Faulted(err) => ValueTask::faulted(err),
            Resolution::Suspended(registration) => {
                let (writer, reader) = signal();
                core.in_flight = Some(InFlight::MoveNext(writer));
                drop(core);
                registration.perform(Shared::continuation(&self.shared));
                ValueTask::from_signal(reader)
            }
        }
    }

    /// Stops the iteration early, running the body's outstanding cleanup.
    ///
    /// A no-op when the body never started or already finished. From a
    /// yield suspension the body is advanced once in disposing mode; if its
    /// cleanup awaits, the returned wrapper is pending. Disposal while an
    /// await is in flight is rejected with [`Error::InvalidState`] and leaves
    /// the body untouched.
    pub fn dispose(&mut self) -> ValueTask<()> {
        let Some(mut core) = self.shared.core.try_lock() else {
            return ValueTask::faulted(Error::InvalidState(DISPOSE_IN_FLIGHT));
        };
        if core.in_flight.is_some() {
            return ValueTask::faulted(Error::InvalidState(DISPOSE_IN_FLIGHT));
        }
        match core.state {
            MachineState::Finished => ValueTask::completed(),
            MachineState::NotStarted => {
                core.disposing = true;
                core.finish();
                ValueTask::completed()
            }
            MachineState::SuspendedAtYield(_) => {
                debug!(state = %core.state, "async enumerator disposing");
                core.disposing = true;
                core.current = None;
                core.transition(MachineState::Disposing);
                match core.drive() {
                    Resolution::Finished => ValueTask::completed(),
                    Resolution::Faulted(err) => ValueTask::faulted(err),
                    Resolution::Yielded => {
                        ValueTask::faulted(Error::InvalidState(YIELD_WHILE_DISPOSING))
                    }
                    Resolution::Suspended(registration) => {
                        let (writer, reader) = signal();
                        core.in_flight = Some(InFlight::Dispose(writer));
                        drop(core);
                        registration.perform(Shared::continuation(&self.shared));
                        ValueTask::from_signal(reader)
                    }
                }
            }
            MachineState::SuspendedAtAwait(_) | MachineState::Disposing => {
                ValueTask::faulted(Error::InvalidState(DISPOSE_IN_FLIGHT))
            }
        }
    }

    /// The element produced by the last successful `move_next`.
    #[must_use]
    pub fn current(&self) -> Option<MappedMutexGuard<'_, M::Item>> {
        MutexGuard::try_map(self.shared.core.lock(), |core| core.current.as_mut()).ok()
    }

    /// Moves the current element out.
    pub fn take_current(&mut self) -> Option<M::Item> {
        self.shared.core.lock().current.take()
    }

    /// Where the body stands.
    ///
    /// Suspended states carry the point index the body reported.
    #[must_use]
    pub fn state(&self) -> MachineState {
        self.shared.core.lock().state
    }

    /// How the body finished, once it has.
    #[must_use]
    pub fn completion(&self) -> Option<Completion> {
        self.shared.core.lock().completion
    }

    /// True while a `move_next` or `dispose` waits on an operand.
    #[must_use]
    pub fn is_step_in_flight(&self) -> bool {
        self.shared.core.lock().in_flight.is_some()
    }
}

impl<M: AsyncIteratorMachine> fmt::Debug for AsyncEnumerator<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.core.lock();
        f.debug_struct("AsyncEnumerator")
            .field("state", &core.state)
            .field("completion", &core.completion)
            .field("in_flight", &core.in_flight.is_some())
            .finish()
    }
}
