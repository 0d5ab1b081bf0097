//! Components: the opaque simulation units the engine drives, and the lifecycle state machine
//! that governs which foreign teardown calls are legal.

use crate::error::{Error, ForeignStatus, Result};
use crate::port::Port;
use crate::value::ChannelId;

/// Lifecycle states a [`Component`] passes through. Only the transitions drawn in the design
/// notes are legal; anything else is a logic error in the engine, not a recoverable condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Configured,
    Instantiated,
    Initializing,
    Running,
    Terminated,
    Destroyed,
}

/// The bucket a set/get call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetKind {
    Params,
    InitialValues,
    Inputs,
    Tunables,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetKind {
    Outputs,
    Locals,
}

/// Outcome of a `do_step` call, after interpreting the foreign status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Ok,
    /// Logged and treated as `Ok` by callers; kept distinct so the scheduler can count them.
    Warning,
    /// The component deliberately finished early (confirmed via `get_terminated`).
    Finished,
}

/// Version-agnostic operations surface over a black-box FMI instance. Implemented once per FMI
/// major version (see [`crate::adapter`]); the rest of the engine never matches on version.
pub trait ForeignAdapter {
    /// Write every channel of `kind` to the instance, skipping channels whose
    /// `defined_during_init` flag is false outside initialization.
    fn set_values(&mut self, kind: SetKind, channels: &[(ChannelId, crate::value::Value)]) -> Result<()>;

    /// Read every channel of `kind` back from the instance.
    fn get_values(&mut self, kind: GetKind, channels: &[ChannelId]) -> Result<Vec<(ChannelId, crate::value::Value)>>;

    fn enter_initialization(&mut self, start_time: f64, tolerance: Option<f64>, stop_time: Option<f64>) -> Result<()>;

    fn exit_initialization(&mut self) -> Result<()>;

    /// Advance to `t + dt`. Interprets the foreign status, turning `discard` into `Finished` only
    /// if the instance confirms it deliberately terminated; otherwise it is a `ForeignFailure`.
    fn step(&mut self, t: f64, dt: f64) -> Result<StepResult>;

    /// Sparse initial-dependency matrix: for each in-channel, the out-channels it feeds at
    /// initialization. An instance with no declared structure is treated as fully dense by the
    /// caller, not by the adapter.
    fn initial_dependencies(&self) -> Option<&[(ChannelId, Vec<ChannelId>)]>;

    fn terminate(&mut self) -> Result<()>;

    fn free(&mut self) -> Result<()>;
}

/// A component's current teardown eligibility, tracked independently of [`State`] because a
/// failure can leave a component instantiated-but-not-running, or running-but-not-yet-terminated.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeardownFlags {
    pub instantiated_ok: bool,
    pub run_ok: bool,
}

/// An opaque simulation unit: its ports, its foreign adapter, and the bookkeeping needed to tear
/// it down safely from any failure point.
pub struct Component {
    pub name: String,
    pub ports: Vec<Port>,
    pub adapter: Box<dyn ForeignAdapter>,
    pub state: State,
    pub teardown: TeardownFlags,
    pub last_communication_point: f64,
    pub finished: bool,
}

impl Component {
    pub fn new(name: impl Into<String>, adapter: Box<dyn ForeignAdapter>) -> Self {
        Self {
            name: name.into(),
            ports: Vec::new(),
            adapter,
            state: State::Created,
            teardown: TeardownFlags::default(),
            last_communication_point: 0.0,
            finished: false,
        }
    }

    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// Transition into `Instantiated`, recording that `free` is now a legal teardown call
    /// regardless of what happens afterwards.
    pub fn mark_instantiated(&mut self) {
        self.state = State::Instantiated;
        self.teardown.instantiated_ok = true;
    }

    pub fn mark_running(&mut self) {
        self.state = State::Running;
        self.teardown.run_ok = true;
    }

    /// Tear down in reverse creation order, honouring which foreign calls are legal. Always
    /// attempted, including on the error path; errors during teardown are logged, not
    /// propagated, since the caller is already unwinding a failure.
    pub fn teardown(&mut self) {
        if self.teardown.run_ok {
            if let Err(e) = self.adapter.terminate() {
                log::warn!("component '{}' failed to terminate cleanly: {e}", self.name);
            }
        }
        if self.teardown.instantiated_ok {
            if let Err(e) = self.adapter.free() {
                log::warn!("component '{}' failed to free cleanly: {e}", self.name);
            }
        }
        self.state = State::Destroyed;
    }

    pub fn do_step(&mut self, t: f64, dt: f64, phase: &str) -> Result<StepResult> {
        match self.adapter.step(t, dt) {
            Ok(StepResult::Finished) => {
                self.finished = true;
                Ok(StepResult::Finished)
            }
            Ok(other) => {
                self.last_communication_point = t + dt;
                Ok(other)
            }
            Err(Error::ForeignFailure { status, .. }) => Err(Error::ForeignFailure {
                component: self.name.clone(),
                phase: phase.to_string(),
                status,
            }),
            Err(other) => Err(other),
        }
    }

    /// Used when a foreign adapter reports `discard` without confirming termination: the
    /// scheduler treats this as an unrecoverable failure rather than silently finishing.
    pub fn spurious_discard(&self, phase: &str) -> Error {
        Error::ForeignFailure {
            component: self.name.clone(),
            phase: phase.to_string(),
            status: ForeignStatus::SpuriousDiscard,
        }
    }
}
