//! A component that fails during initialization must still be freed exactly once, and must not
//! have `terminate` called since it never reached the running state.

use std::cell::Cell;
use std::rc::Rc;

use cosim_master::component::{Component, ForeignAdapter, GetKind, SetKind, StepResult};
use cosim_master::config::{NanCheckPolicy, Task};
use cosim_master::error::{Error, Result};
use cosim_master::model::Model;
use cosim_master::port::{Direction, Port, PortMode};
use cosim_master::storage::RecordingSink;
use cosim_master::value::{Channel, ChannelId, Value, ValueBus, ValueKind};

#[derive(Default)]
struct Calls {
    terminate: Rc<Cell<u32>>,
    free: Rc<Cell<u32>>,
}

struct FailsToEnterInit {
    calls: Calls,
}

impl ForeignAdapter for FailsToEnterInit {
    fn set_values(&mut self, _kind: SetKind, _channels: &[(ChannelId, Value)]) -> Result<()> {
        Ok(())
    }
    fn get_values(&mut self, _kind: GetKind, _channels: &[ChannelId]) -> Result<Vec<(ChannelId, Value)>> {
        Ok(Vec::new())
    }
    fn enter_initialization(&mut self, _s: f64, _tol: Option<f64>, _e: Option<f64>) -> Result<()> {
        Err(Error::ConfigInvalid("simulated failure entering initialization mode".into()))
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
        self.calls.terminate.set(self.calls.terminate.get() + 1);
        Ok(())
    }
    fn free(&mut self) -> Result<()> {
        self.calls.free.set(self.calls.free.get() + 1);
        Ok(())
    }
}

#[test]
fn a_component_that_fails_to_initialize_is_still_freed_exactly_once() {
    let mut bus = ValueBus::new(NanCheckPolicy::Off, 10);
    let out = bus.add_channel(Channel::new("a.out", ValueKind::Real));

    let calls = Calls::default();
    let terminate_calls = calls.terminate.clone();
    let free_calls = calls.free.clone();

    let mut a = Component::new("a", Box::new(FailsToEnterInit { calls }));
    a.ports.push(Port::scalar("out", Direction::Out, PortMode::Required, out));
    a.mark_instantiated();

    let mut model = Model::new(vec![a], bus);
    let task = Task::default();
    let mut sink = RecordingSink::default();

    let result = cosim_master::run_to_completion(&mut model, &task, &mut sink, false, || false);

    assert!(result.is_err());
    assert_eq!(free_calls.get(), 1, "free must be called exactly once");
    assert_eq!(terminate_calls.get(), 0, "terminate must not be called: the component never ran");
}
