//! Async method builders.
//!
//! A builder is what compiled code talks to: `create` a builder, `start` the
//! machine (which runs it synchronously up to its first true suspension),
//! then hand out `task()` to the caller. The builder is selected statically
//! through the [`AsyncMethodBuilder`] trait.
//!
//! Lifecycle: `Uninitialized -> Started -> (Suspended <-> Running)* ->
//! Completed`.

use super::AsyncStateMachine;
use super::boxed::{Advanced, BoxedMachine, MachineHandle, advance_machine};
use crate::error::{Error, Result};
use crate::signal::{CompletionSignal, SignalWriter, signal};
use crate::task::{Task, ValueTask};
use crate::tracing_compat::debug;
use core::fmt;

/// Builder lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BuilderPhase {
    /// Created, machine not started.
    Uninitialized = 0,
    /// `start` is running the first advance.
    Started = 1,
    /// Waiting on an operand.
    Suspended = 2,
    /// Resumed by a continuation and advancing.
    Running = 3,
    /// Result published.
    Completed = 4,
}

impl BuilderPhase {
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Uninitialized,
            1 => Self::Started,
            2 => Self::Suspended,
            3 => Self::Running,
            _ => Self::Completed,
        }
    }
}

impl fmt::Display for BuilderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Started => write!(f, "started"),
            Self::Suspended => write!(f, "suspended"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// The builder capability compiled code is written against.
pub trait AsyncMethodBuilder: Sized {
    /// Result type of the async method.
    type Output: Send + 'static;
    /// Publishable result wrapper.
    type Task;

    /// A fresh builder with no machine attached.
    fn create() -> Self;

    /// Advances `machine` exactly once, synchronously, before returning.
    ///
    /// # Panics
    ///
    /// Panics if a machine was already started on this builder.
    fn start<M>(&mut self, machine: M)
    where
        M: AsyncStateMachine<Output = Self::Output>;

    /// Publishes success.
    ///
    /// # Panics
    ///
    /// Panics if a result was already published.
    fn set_result(&mut self, value: Self::Output);

    /// Publishes a fault.
    ///
    /// # Panics
    ///
    /// Panics if a result was already published.
    fn set_exception(&mut self, error: Error);

    /// The publishable result wrapper.
    fn task(&mut self) -> Self::Task;
}

/// State shared by every concrete builder.
struct BuilderCore<T> {
    phase: BuilderPhase,
    writer: Option<SignalWriter<T>>,
    signal: Option<CompletionSignal<T>>,
    /// Synchronous result nobody has observed yet.
    ready: Option<Result<T>>,
    result_set: bool,
    machine: Option<MachineHandle>,
}

impl<T: Send + 'static> BuilderCore<T> {
    const fn new() -> Self {
        Self {
            phase: BuilderPhase::Uninitialized,
            writer: None,
            signal: None,
            ready: None,
            result_set: false,
            machine: None,
        }
    }

    fn phase(&self) -> BuilderPhase {
        self.machine
            .as_ref()
            .map_or(self.phase, |machine| machine.phase())
    }

    fn start<M>(&mut self, mut machine: M)
    where
        M: AsyncStateMachine<Output = T>,
    {
        assert!(
            self.phase == BuilderPhase::Uninitialized && self.machine.is_none(),
            "state machine already started"
        );
        self.phase = BuilderPhase::Started;
        match advance_machine(&mut machine) {
            Advanced::Complete(result) => self.complete(result),
            Advanced::Suspended(registration) => {
                let writer = self.writer_for_boxing();
                let boxed = BoxedMachine::new(machine, writer);
                self.set_state_machine(boxed.clone());
                registration.perform(BoxedMachine::continuation(&boxed));
            }
        }
    }

    fn set_state_machine(&mut self, handle: MachineHandle) {
        if self.machine.is_some() {
            debug!("state machine handle replaced");
        }
        self.phase = BuilderPhase::Suspended;
        self.machine = Some(handle);
    }

    fn writer_for_boxing(&mut self) -> SignalWriter<T> {
        if let Some(writer) = self.writer.take() {
            return writer;
        }
        let (writer, reader) = signal();
        self.signal = Some(reader);
        writer
    }

    fn complete(&mut self, result: Result<T>) {
        assert!(!self.result_set, "async method result already set");
        assert!(
            self.machine.is_none(),
            "async method result is owned by the suspended state machine"
        );
        self.result_set = true;
        self.phase = BuilderPhase::Completed;
        match self.writer.take() {
            Some(writer) => writer.complete(result),
            None => self.ready = Some(result),
        }
    }

    /// The lightweight wrapper: inline when the result was produced
    /// synchronously and nothing observed a pending wrapper before.
    fn value_task(&mut self) -> ValueTask<T> {
        if self.signal.is_none() {
            match self.ready.take() {
                Some(Ok(value)) => return ValueTask::new(value),
                Some(Err(err)) => self.signal = Some(CompletionSignal::completed(Err(err))),
                None if self.result_set => return ValueTask::faulted(Error::ResultConsumed),
                None => self.allocate(),
            }
        }
        self.signal
            .clone()
            .map_or_else(|| ValueTask::faulted(Error::ResultConsumed), ValueTask::from_signal)
    }

    /// The signal behind the method, materialized if needed.
    fn signal(&mut self) -> CompletionSignal<T> {
        if self.signal.is_none() {
            match self.ready.take() {
                Some(result) => self.signal = Some(CompletionSignal::completed(result)),
                None if self.result_set => {
                    self.signal = Some(CompletionSignal::completed(Err(Error::ResultConsumed)));
                }
                None => self.allocate(),
            }
        }
        match &self.signal {
            Some(signal) => signal.clone(),
            None => CompletionSignal::completed(Err(Error::ResultConsumed)),
        }
    }

    fn allocate(&mut self) {
        let (writer, reader) = signal();
        self.writer = Some(writer);
        self.signal = Some(reader);
    }
}

impl<T> fmt::Debug for BuilderCore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderCore")
            .field("phase", &self.phase)
            .field("boxed", &self.machine.is_some())
            .field("result_set", &self.result_set)
            .finish()
    }
}

/// Builder for methods returning [`ValueTask<T>`].
///
/// A method that completes synchronously publishes an inline wrapper and
/// allocates nothing. Once the machine suspends, every `task()` call returns
/// a wrapper over the same signal.
#[derive(Debug)]
pub struct ValueTaskMethodBuilder<T> {
    core: BuilderCore<T>,
}

impl<T: Send + 'static> ValueTaskMethodBuilder<T> {
    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> BuilderPhase {
        self.core.phase()
    }

    /// Records the heap handle of the machine. Repeat calls replace it.
    pub fn set_state_machine(&mut self, handle: MachineHandle) {
        self.core.set_state_machine(handle);
    }
}

impl<T: Send + 'static> AsyncMethodBuilder for ValueTaskMethodBuilder<T> {
    type Output = T;
    type Task = ValueTask<T>;

    fn create() -> Self {
        Self {
            core: BuilderCore::new(),
        }
    }

    fn start<M>(&mut self, machine: M)
    where
        M: AsyncStateMachine<Output = T>,
    {
        self.core.start(machine);
    }

    fn set_result(&mut self, value: T) {
        self.core.complete(Ok(value));
    }

    fn set_exception(&mut self, error: Error) {
        self.core.complete(Err(error));
    }

    fn task(&mut self) -> ValueTask<T> {
        self.core.value_task()
    }
}

/// Builder for methods returning [`Task<T>`]. Always signal-backed.
#[derive(Debug)]
pub struct TaskMethodBuilder<T> {
    core: BuilderCore<T>,
}

impl<T: Send + 'static> TaskMethodBuilder<T> {
    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> BuilderPhase {
        self.core.phase()
    }

    /// Records the heap handle of the machine. Repeat calls replace it.
    pub fn set_state_machine(&mut self, handle: MachineHandle) {
        self.core.set_state_machine(handle);
    }
}

impl<T: Send + 'static> AsyncMethodBuilder for TaskMethodBuilder<T> {
    type Output = T;
    type Task = Task<T>;

    fn create() -> Self {
        Self {
            core: BuilderCore::new(),
        }
    }

    fn start<M>(&mut self, machine: M)
    where
        M: AsyncStateMachine<Output = T>,
    {
        self.core.start(machine);
    }

    fn set_result(&mut self, value: T) {
        self.core.complete(Ok(value));
    }

    fn set_exception(&mut self, error: Error) {
        self.core.complete(Err(error));
    }

    fn task(&mut self) -> Task<T> {
        Task::from_signal(self.core.signal())
    }
}

/// Runs `machine` as an async method returning [`ValueTask`].
pub fn run_value_task<M: AsyncStateMachine>(machine: M) -> ValueTask<M::Output> {
    let mut builder = ValueTaskMethodBuilder::create();
    builder.start(machine);
    builder.task()
}

/// Runs `machine` as an async method returning [`Task`].
pub fn run_task<M: AsyncStateMachine>(machine: M) -> Task<M::Output> {
    let mut builder = TaskMethodBuilder::create();
    builder.start(machine);
    builder.task()
}
