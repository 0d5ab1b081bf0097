//! End-to-end coverage of a two-component feedback loop: initialization must resolve the
//! algebraic loop by fixed-point iteration, and the runtime scheduler must keep it converged at
//! every communication point.

use cosim_master::component::{Component, ForeignAdapter, GetKind, SetKind, StepResult};
use cosim_master::config::{NanCheckPolicy, Task};
use cosim_master::error::Result;
use cosim_master::model::Model;
use cosim_master::port::{Direction, Port, PortMode};
use cosim_master::storage::RecordingSink;
use cosim_master::value::{Channel, ChannelId, Value, ValueBus, ValueKind};

/// `out = gain * in + bias`, evaluated fresh on every `get_values` call so the fixed-point
/// resolvers actually exercise repeated evaluation rather than a cached result.
struct AffineAdapter {
    gain: f64,
    bias: f64,
    input: f64,
    in_id: ChannelId,
    out_id: ChannelId,
}

impl ForeignAdapter for AffineAdapter {
    fn set_values(&mut self, _kind: SetKind, channels: &[(ChannelId, Value)]) -> Result<()> {
        for (id, value) in channels {
            if *id == self.in_id {
                if let Value::Real(v) = value {
                    self.input = *v;
                }
            }
        }
        Ok(())
    }

    fn get_values(&mut self, _kind: GetKind, channels: &[ChannelId]) -> Result<Vec<(ChannelId, Value)>> {
        Ok(channels
            .iter()
            .filter(|&&id| id == self.out_id)
            .map(|&id| (id, Value::Real(self.gain * self.input + self.bias)))
            .collect())
    }

    fn enter_initialization(&mut self, _s: f64, _tol: Option<f64>, _e: Option<f64>) -> Result<()> {
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
        Ok(())
    }
}

/// `a.out = 0.5 * b.out + 1`, `b.out = 0.5 * a.out`, wired a.out -> b.in -> (via a's feedback
/// loop) a.in. The fixed point is a=4/3, b=2/3.
fn build_loop_model() -> (Model, ChannelId, ChannelId) {
    let mut bus = ValueBus::new(NanCheckPolicy::Off, 10);
    let a_in = bus.add_channel(Channel::new("a.in", ValueKind::Real));
    let a_out = bus.add_channel(Channel::new("a.out", ValueKind::Real));
    let b_in = bus.add_channel(Channel::new("b.in", ValueKind::Real));
    let b_out = bus.add_channel(Channel::new("b.out", ValueKind::Real));
    bus.connect(a_out, b_in, Default::default()).unwrap();
    bus.connect(b_out, a_in, Default::default()).unwrap();

    let mut a = Component::new(
        "a",
        Box::new(AffineAdapter { gain: 0.5, bias: 1.0, input: 0.0, in_id: a_in, out_id: a_out }),
    );
    a.ports.push(Port::scalar("in", Direction::In, PortMode::Required, a_in));
    a.ports.push(Port::scalar("out", Direction::Out, PortMode::Required, a_out));
    a.mark_instantiated();

    let mut b = Component::new(
        "b",
        Box::new(AffineAdapter { gain: 0.5, bias: 0.0, input: 0.0, in_id: b_in, out_id: b_out }),
    );
    b.ports.push(Port::scalar("in", Direction::In, PortMode::Required, b_in));
    b.ports.push(Port::scalar("out", Direction::Out, PortMode::Required, b_out));
    b.mark_instantiated();

    (Model::new(vec![a, b], bus), a_out, b_out)
}

#[test]
fn initialization_converges_the_feedback_loop() {
    let (mut model, a_out, b_out) = build_loop_model();
    let task = Task::default();
    cosim_master::init::initialize(&mut model, &task).unwrap();

    let a = model.bus.sample(a_out).unwrap().as_real().unwrap();
    let b = model.bus.sample(b_out).unwrap().as_real().unwrap();
    assert!((a - 4.0 / 3.0).abs() < 1e-4, "a={a}");
    assert!((b - 2.0 / 3.0).abs() < 1e-4, "b={b}");
}

#[test]
fn run_to_completion_keeps_the_loop_converged_at_every_point() {
    let (mut model, a_out, b_out) = build_loop_model();
    let task = Task { stop_time: 0.3, step_size: 0.1, ..Task::default() };
    let mut sink = RecordingSink::default();
    let outcome =
        cosim_master::run_to_completion(&mut model, &task, &mut sink, false, || false).unwrap();

    assert!(!outcome.cancelled);
    let a = model.bus.sample(a_out).unwrap().as_real().unwrap();
    let b = model.bus.sample(b_out).unwrap().as_real().unwrap();
    assert!((a - 4.0 / 3.0).abs() < 1e-4, "a={a}");
    assert!((b - 2.0 / 3.0).abs() < 1e-4, "b={b}");
    assert!(sink.finished);
}
