//! Heap storage for a suspended state machine, and the advance driver.
//!
//! A machine starts on the caller's stack. The first time `advance` returns
//! [`Step::Suspend`] the builder moves it, together with the writer of the
//! method's completion signal, into a [`BoxedMachine`]. Every later
//! resumption goes through [`BoxedMachine::resume`], which advances the
//! machine once and either registers the next resumption or publishes the
//! result.

use super::builder::BuilderPhase;
use super::context::{MachineContext, Registration};
use super::{AsyncStateMachine, Step};
use crate::error::{Error, Fault, Result};
use crate::metrics;
use crate::signal::{Continuation, SignalWriter};
use crate::tracing_compat::{error, trace};
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// A type-erased handle on a boxed state machine.
pub type MachineHandle = Arc<dyn Resumable>;

/// What a builder needs from a boxed machine.
pub trait Resumable: Send + Sync {
    /// Advances the machine once more. Called by the registered continuation.
    fn resume(self: Arc<Self>);

    /// Builder-level lifecycle phase of the boxed machine.
    fn phase(&self) -> BuilderPhase;
}

/// Runs `advance` with a fresh context, turning a panic into a fault.
///
/// Returns the outcome and the registration the machine recorded, if any.
pub(crate) fn advance_guarded<R>(
    advance: impl FnOnce(&mut MachineContext<'_>) -> Result<R>,
) -> (Result<R>, Option<Registration>) {
    let mut registration = None;
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut cx = MachineContext::new(&mut registration);
        advance(&mut cx)
    }));
    let outcome = outcome.unwrap_or_else(|payload| {
        let fault = Fault::panic(payload);
        error!(%fault, "state machine panicked inside advance");
        Err(Error::Faulted(fault))
    });
    (outcome, registration)
}

pub(crate) const SUSPENDED_WITHOUT_AWAIT: &str =
    "state machine suspended without registering a continuation";

/// How one advance ended, from the driver's point of view.
pub(crate) enum Advanced<T> {
    Complete(Result<T>),
    Suspended(Registration),
}

pub(crate) fn advance_machine<M: AsyncStateMachine>(machine: &mut M) -> Advanced<M::Output> {
    match advance_guarded(|cx| machine.advance(cx)) {
        (Ok(Step::Complete(value)), _) => Advanced::Complete(Ok(value)),
        (Ok(Step::Suspend), Some(registration)) => Advanced::Suspended(registration),
        (Ok(Step::Suspend), None) => {
            Advanced::Complete(Err(Error::InvalidState(SUSPENDED_WITHOUT_AWAIT)))
        }
        (Err(err), _) => Advanced::Complete(Err(err)),
    }
}

struct Slot<M: AsyncStateMachine> {
    machine: Option<M>,
    writer: Option<SignalWriter<M::Output>>,
}

/// A state machine moved to the heap at its first true suspension.
pub struct BoxedMachine<M: AsyncStateMachine> {
    slot: Mutex<Slot<M>>,
    phase: AtomicU8,
}

impl<M: AsyncStateMachine> BoxedMachine<M> {
    /// Boxes a suspended machine with the writer it completes when done.
    pub fn new(machine: M, writer: SignalWriter<M::Output>) -> Arc<Self> {
        metrics::record_machine_boxed();
        trace!("state machine boxed at first suspension");
        Arc::new(Self {
            slot: Mutex::new(Slot {
                machine: Some(machine),
                writer: Some(writer),
            }),
            phase: AtomicU8::new(BuilderPhase::Suspended as u8),
        })
    }

    /// A continuation that resumes this machine.
    #[must_use]
    pub fn continuation(this: &Arc<Self>) -> Continuation {
        let this = Arc::clone(this);
        Continuation::new(move || this.resume_once())
    }

    fn set_phase(&self, phase: BuilderPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn resume_once(self: Arc<Self>) {
        let Some(mut slot) = self.slot.try_lock() else {
            #[cfg(debug_assertions)]
            panic!("state machine resumed while already running");
            #[cfg(not(debug_assertions))]
            {
                error!("state machine resumed while already running; resumption ignored");
                return;
            }
        };
        let Some(machine) = slot.machine.as_mut() else {
            trace!("resumption of a finished state machine ignored");
            return;
        };
        self.set_phase(BuilderPhase::Running);
        let result = match advance_machine(machine) {
            Advanced::Suspended(registration) => {
                self.set_phase(BuilderPhase::Suspended);
                drop(slot);
                registration.perform(Self::continuation(&self));
                return;
            }
            Advanced::Complete(result) => result,
        };
        slot.machine = None;
        let writer = slot.writer.take();
        drop(slot);
        self.set_phase(BuilderPhase::Completed);
        if let Some(writer) = writer {
            writer.complete(result);
        }
    }
}

impl<M: AsyncStateMachine> Resumable for BoxedMachine<M> {
    fn resume(self: Arc<Self>) {
        self.resume_once();
    }

    fn phase(&self) -> BuilderPhase {
        BuilderPhase::from_u8(self.phase.load(Ordering::Acquire))
    }
}

impl<M: AsyncStateMachine> std::fmt::Debug for BoxedMachine<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxedMachine")
            .field("phase", &Resumable::phase(self))
            .finish()
    }
}
