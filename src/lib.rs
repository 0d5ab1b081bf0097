#![deny(clippy::all)]

//! A co-simulation master that composes FMI 1.0/2.0 Co-Simulation components into a coupled
//! system and drives them through synchronized communication steps.
//!
//! A run has three phases: [`Model`] construction (component instantiation and port/connection
//! wiring, external to this crate), [`init::initialize`] (bring every component to a consistent
//! state at the start time), and [`scheduler::run`] (advance on a fixed synchronization step).
//! [`run_to_completion`] drives all three and guarantees component teardown exactly once
//! regardless of how the run ends.

pub mod adapter;
pub mod component;
pub mod config;
pub mod error;
pub mod graph;
pub mod init;
pub mod model;
pub mod package;
pub mod port;
pub mod scheduler;
pub mod storage;
pub mod value;

pub use config::{Config, Task};
pub use error::{Error, Result};
pub use model::Model;
pub use scheduler::RunOutcome;
pub use storage::StorageSink;

/// Run a fully-wired [`Model`] end to end: initialize, step to `task.stop_time`, then tear down
/// every component exactly once regardless of how the run ended.
///
/// This is the orchestration the CLI wrapper and any embedding host call; it exists so the
/// teardown guarantee in the error handling design (every component whose `instantiatedOk` ever
/// became true has `free` called exactly once) holds whether the failure came from
/// initialization or from stepping.
pub fn run_to_completion(
    model: &mut Model,
    task: &Task,
    storage: &mut dyn StorageSink,
    track_real_time_factor: bool,
    cancellation: impl FnMut() -> bool,
) -> Result<RunOutcome> {
    let result = init::initialize(model, task).and_then(|()| {
        scheduler::run(model, task, storage, track_real_time_factor, cancellation)
    });

    for component in model.components.iter_mut().rev() {
        component.teardown();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ForeignAdapter, GetKind, SetKind, StepResult};
    use crate::config::NanCheckPolicy;
    use crate::port::{Direction, Port, PortMode};
    use crate::storage::RecordingSink;
    use crate::value::{Channel, ChannelId, Value, ValueBus, ValueKind};

    struct GainAdapter {
        gain: f64,
        input: f64,
        teardown_calls: std::rc::Rc<std::cell::Cell<u32>>,
    }

    impl ForeignAdapter for GainAdapter {
        fn set_values(&mut self, _kind: SetKind, channels: &[(ChannelId, Value)]) -> Result<()> {
            for (_, v) in channels {
                if let Value::Real(x) = v {
                    self.input = *x;
                }
            }
            Ok(())
        }
        fn get_values(&mut self, _kind: GetKind, channels: &[ChannelId]) -> Result<Vec<(ChannelId, Value)>> {
            Ok(channels.iter().map(|&id| (id, Value::Real(self.gain * self.input))).collect())
        }
        fn enter_initialization(&mut self, _s: f64, _t: Option<f64>, _e: Option<f64>) -> Result<()> {
            Ok(())
        }
        fn exit_initialization(&mut self) -> Result<()> {
            Ok(())
        }
        fn step(&mut self, _t: f64, _dt: f64) -> Result<StepResult> {
            Ok(StepResult::Ok)
        }
        fn initial_dependencies(&self) -> Option<&[(ChannelId, Vec<ChannelId>)]> {
            None
        }
        fn terminate(&mut self) -> Result<()> {
            Ok(())
        }
        fn free(&mut self) -> Result<()> {
            self.teardown_calls.set(self.teardown_calls.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn run_to_completion_tears_down_every_instantiated_component_once() {
        let mut bus = ValueBus::new(NanCheckPolicy::Off, 10);
        let out = bus.add_channel(Channel::new("a.out", ValueKind::Real));
        bus.set(out, Value::Real(1.0));

        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut a = Component::new(
            "a",
            Box::new(GainAdapter { gain: 2.0, input: 0.0, teardown_calls: calls.clone() }),
        );
        a.ports.push(Port::scalar("out", Direction::Out, PortMode::Required, out));
        a.mark_instantiated();

        let mut model = Model::new(vec![a], bus);
        let task = Task {
            start_time: 0.0,
            stop_time: 0.3,
            step_size: 0.1,
            ..Task::default()
        };
        let mut sink = RecordingSink::default();
        let outcome = run_to_completion(&mut model, &task, &mut sink, false, || false).unwrap();

        assert!(!outcome.cancelled);
        assert_eq!(calls.get(), 1);
        assert!(sink.finished);
    }
}
