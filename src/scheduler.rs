//! The step scheduler: advances the coupled system from `start_time` to `stop_time` on a fixed
//! synchronization step, storing one row per enabled channel-store kind at each communication
//! point.

use std::collections::HashMap;
use std::time::Instant;

use crate::component::{GetKind, SetKind, StepResult};
use crate::config::Task;
use crate::error::{Error, Result};
use crate::graph::Group;
use crate::model::Model;
use crate::port::Direction;
use crate::storage::{StorageSink, StoreKind};
use crate::value::{ChannelId, Value};

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOutcome {
    pub end_time: f64,
    pub cancelled: bool,
}

/// Advance `model` to `task.stop_time`, calling `storage` once per communication point per
/// enabled kind and `cancellation` once per communication point. `model.compute_step_order` is
/// called first; callers must not have stepped the model's components beforehand.
pub fn run(
    model: &mut Model,
    task: &Task,
    storage: &mut dyn StorageSink,
    track_real_time_factor: bool,
    mut cancellation: impl FnMut() -> bool,
) -> Result<RunOutcome> {
    model.compute_step_order();
    let order = model.step_order().to_vec();

    let mut discrete_cache: HashMap<ChannelId, Value> = HashMap::new();
    // Computed from `k * step_size` rather than accumulated by repeated addition, so floating
    // error never drifts the communication points away from their nominal grid.
    let mut k: u32 = 0;
    let mut t = task.start_time;
    let mut cancelled = false;

    while t < task.stop_time - 1e-9 {
        if cancellation() {
            cancelled = true;
            break;
        }

        let dt = task.step_size.min(task.stop_time - t);

        model.bus.propagate(t)?;

        for (group_index, group) in order.iter().enumerate() {
            if group.is_loop {
                step_loop_group(model, task, group_index, group, t, dt, &mut discrete_cache, track_real_time_factor)?;
            } else {
                step_group(model, &group.nodes, t, dt, &mut discrete_cache, track_real_time_factor)?;
            }
        }

        if k % task.output_interval.max(1) == 0 {
            store_point(model, storage, t)?;
        }

        k += 1;
        t = task.start_time + k as f64 * task.step_size;
    }

    if !cancelled {
        // Final truncated step is folded into the loop above via `dt`'s `.min`; make sure the
        // last point at exactly `stop_time` is stored when the interval didn't already cover it.
        if k == 0 || (k - 1) % task.output_interval.max(1) != 0 {
            store_point(model, storage, task.stop_time)?;
        }
    }

    storage.finished()?;

    Ok(RunOutcome {
        end_time: t,
        cancelled,
    })
}

fn step_group(
    model: &mut Model,
    nodes: &[usize],
    t: f64,
    dt: f64,
    discrete_cache: &mut HashMap<ChannelId, Value>,
    track_real_time_factor: bool,
) -> Result<()> {
    for &index in nodes {
        step_component(model, index, t, dt, discrete_cache, track_real_time_factor)?;
    }
    Ok(())
}

/// Fixed-point resolution of a runtime algebraic loop, identical in shape to the initialization
/// engine's, but with a tighter iteration budget. Each iteration re-invokes every component's
/// `step`; a component with no way to roll back internal state between iterations is only
/// actually correct here if its step function is idempotent for a fixed `(t, dt)` — FMI
/// state-save/restore is out of scope, so this is a known limitation of iterative loop resolution
/// at runtime.
fn step_loop_group(
    model: &mut Model,
    task: &Task,
    group_index: usize,
    group: &Group,
    t: f64,
    dt: f64,
    discrete_cache: &mut HashMap<ChannelId, Value>,
    track_real_time_factor: bool,
) -> Result<()> {
    let cut_components: Vec<usize> = group.cut_nodes.clone();
    let budget = task.step_iteration_budget;

    for iteration in 0..budget {
        let snapshot: Vec<Vec<(ChannelId, Value)>> = cut_components
            .iter()
            .map(|&index| sample_out_channels(model, index))
            .collect();

        model.bus.propagate(t)?;
        step_group(model, &group.nodes, t, dt, discrete_cache, track_real_time_factor)?;

        let converged = cut_components.iter().zip(snapshot.iter()).all(|(&index, before)| {
            let after = sample_out_channels(model, index);
            channels_converge(before, &after, task.loop_tolerance_abs, task.loop_tolerance_rel)
        });
        if converged {
            return Ok(());
        }
        let _ = iteration;
    }

    Err(Error::StepLoopDiverged {
        group: group_index,
        time: t,
        iterations: budget,
    })
}

fn sample_out_channels(model: &Model, component_index: usize) -> Vec<(ChannelId, Value)> {
    model.components[component_index]
        .ports
        .iter()
        .filter(|p| p.direction == Direction::Out)
        .flat_map(|p| p.channels.iter().copied())
        .filter_map(|id| model.bus.sample(id).cloned().map(|v| (id, v)))
        .collect()
}

fn channels_converge(before: &[(ChannelId, Value)], after: &[(ChannelId, Value)], abs: f64, rel: f64) -> bool {
    before.iter().zip(after.iter()).all(|((_, b), (_, a))| match (b, a) {
        (Value::Real(b), Value::Real(a)) => (a - b).abs() <= abs + rel * a.abs(),
        (b, a) => b == a,
    })
}

fn step_component(
    model: &mut Model,
    index: usize,
    t: f64,
    dt: f64,
    discrete_cache: &mut HashMap<ChannelId, Value>,
    track_real_time_factor: bool,
) -> Result<()> {
    if model.components[index].finished {
        return Ok(());
    }

    let inputs: Vec<(ChannelId, Value)> = {
        let component = &model.components[index];
        let bus = &model.bus;
        component
            .ports
            .iter()
            .filter(|p| p.direction == Direction::In)
            .flat_map(|p| p.channels.iter().copied())
            .filter_map(|id| {
                let value = bus.sample(id)?.clone();
                if bus.channel(id).discrete {
                    if discrete_cache.get(&id) == Some(&value) {
                        return None;
                    }
                    discrete_cache.insert(id, value.clone());
                }
                Some((id, value))
            })
            .collect()
    };
    if !inputs.is_empty() {
        model.components[index].adapter.set_values(SetKind::Inputs, &inputs)?;
    }

    let started = track_real_time_factor.then(Instant::now);
    let result = model.components[index].do_step(t, dt, "do_step")?;
    if let Some(started) = started {
        let factor = started.elapsed().as_secs_f64() / dt.max(f64::EPSILON);
        if let Some(rtf_id) = real_time_factor_channel(model, index) {
            model.bus.set(rtf_id, Value::Real(factor));
        }
    }
    if result == StepResult::Warning {
        log::warn!("component '{}' returned a warning at t={t}", model.components[index].name);
    }

    let out_ids: Vec<ChannelId> = model.components[index]
        .ports
        .iter()
        .filter(|p| p.direction == Direction::Out)
        .flat_map(|p| p.channels.iter().copied())
        .collect();
    if !out_ids.is_empty() {
        let outputs = model.components[index].adapter.get_values(GetKind::Outputs, &out_ids)?;
        for (id, value) in outputs {
            model.bus.set(id, value);
        }
    }

    let local_ids: Vec<ChannelId> = model.components[index]
        .ports
        .iter()
        .filter(|p| p.direction == Direction::Local)
        .flat_map(|p| p.channels.iter().copied())
        .collect();
    if !local_ids.is_empty() {
        let locals = model.components[index].adapter.get_values(GetKind::Locals, &local_ids)?;
        for (id, value) in locals {
            model.bus.set(id, value);
        }
    }
    Ok(())
}

/// Locate the synthetic real-time-factor output channel for a component, if its ports declare one
/// under the conventional `__realTimeFactor` port name.
fn real_time_factor_channel(model: &Model, component_index: usize) -> Option<ChannelId> {
    model.components[component_index]
        .port("__realTimeFactor")
        .and_then(|p| p.channels.first().copied())
}

fn store_point(model: &Model, storage: &mut dyn StorageSink, t: f64) -> Result<()> {
    for index in 0..model.components.len() {
        let in_values = gather(model, index, Direction::In);
        let out_values = gather(model, index, Direction::Out);
        let local_values = gather(model, index, Direction::Local);
        if !in_values.is_empty() {
            storage.store(StoreKind::In, index, t, &in_values)?;
        }
        if !out_values.is_empty() {
            storage.store(StoreKind::Out, index, t, &out_values)?;
        }
        if !local_values.is_empty() {
            storage.store(StoreKind::Local, index, t, &local_values)?;
        }
        if let Some(rtf_id) = real_time_factor_channel(model, index) {
            if let Some(value) = model.bus.sample(rtf_id) {
                storage.store(StoreKind::RealTimeFactor, index, t, &[(rtf_id, value.clone())])?;
            }
        }
    }
    Ok(())
}

fn gather(model: &Model, component_index: usize, direction: Direction) -> Vec<(ChannelId, Value)> {
    model.components[component_index]
        .ports
        .iter()
        .filter(|p| p.direction == direction)
        .flat_map(|p| p.channels.iter().copied())
        .filter_map(|id| model.bus.sample(id).cloned().map(|v| (id, v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ForeignAdapter};
    use crate::config::NanCheckPolicy;
    use crate::port::{Port, PortMode};
    use crate::storage::RecordingSink;
    use crate::value::{Channel, ValueBus, ValueKind};

    struct CounterAdapter {
        count: f64,
        finish_after: Option<f64>,
    }

    impl ForeignAdapter for CounterAdapter {
        fn set_values(&mut self, _kind: SetKind, _channels: &[(ChannelId, Value)]) -> Result<()> {
            Ok(())
        }
        fn get_values(&mut self, _kind: GetKind, channels: &[ChannelId]) -> Result<Vec<(ChannelId, Value)>> {
            Ok(channels.iter().map(|&id| (id, Value::Real(self.count))).collect())
        }
        fn enter_initialization(&mut self, _s: f64, _tol: Option<f64>, _e: Option<f64>) -> Result<()> {
            Ok(())
        }
        fn exit_initialization(&mut self) -> Result<()> {
            Ok(())
        }
        fn step(&mut self, t: f64, _dt: f64) -> Result<StepResult> {
            self.count += 1.0;
            if matches!(self.finish_after, Some(x) if t >= x) {
                Ok(StepResult::Finished)
            } else {
                Ok(StepResult::Ok)
            }
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

    #[test]
    fn run_produces_one_store_row_per_component_per_point() {
        let mut bus = ValueBus::new(NanCheckPolicy::Off, 10);
        let out = bus.add_channel(Channel::new("a.out", ValueKind::Real));
        let mut a = Component::new("a", Box::new(CounterAdapter { count: 0.0, finish_after: None }));
        a.ports.push(Port::scalar("out", Direction::Out, PortMode::Required, out));
        a.mark_instantiated();
        a.mark_running();

        let mut model = Model::new(vec![a], bus);
        let task = Task {
            start_time: 0.0,
            stop_time: 1.0,
            step_size: 0.1,
            ..Task::default()
        };
        let mut sink = RecordingSink::default();
        let outcome = run(&mut model, &task, &mut sink, false, || false).unwrap();

        assert!(!outcome.cancelled);
        assert_eq!(sink.rows.iter().filter(|(kind, _, _, _)| *kind == StoreKind::Out).count(), 10);
        assert!(sink.finished);
    }

    struct LocalsAdapter;

    impl ForeignAdapter for LocalsAdapter {
        fn set_values(&mut self, _kind: SetKind, _channels: &[(ChannelId, Value)]) -> Result<()> {
            Ok(())
        }
        fn get_values(&mut self, kind: GetKind, channels: &[ChannelId]) -> Result<Vec<(ChannelId, Value)>> {
            let v = match kind {
                GetKind::Outputs => 1.0,
                GetKind::Locals => 2.0,
            };
            Ok(channels.iter().map(|&id| (id, Value::Real(v))).collect())
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

    #[test]
    fn local_channels_are_read_back_and_stored_separately_from_outputs() {
        let mut bus = ValueBus::new(NanCheckPolicy::Off, 10);
        let out = bus.add_channel(Channel::new("a.out", ValueKind::Real));
        let local = bus.add_channel(Channel::new("a.local", ValueKind::Real));
        let mut a = Component::new("a", Box::new(LocalsAdapter));
        a.ports.push(Port::scalar("out", Direction::Out, PortMode::Required, out));
        a.ports.push(Port::scalar("local", Direction::Local, PortMode::Required, local));
        a.mark_instantiated();
        a.mark_running();

        let mut model = Model::new(vec![a], bus);
        let task = Task {
            start_time: 0.0,
            stop_time: 0.2,
            step_size: 0.1,
            ..Task::default()
        };
        let mut sink = RecordingSink::default();
        run(&mut model, &task, &mut sink, false, || false).unwrap();

        assert_eq!(model.bus.sample(out), Some(&Value::Real(1.0)));
        assert_eq!(model.bus.sample(local), Some(&Value::Real(2.0)));
        assert!(sink.rows.iter().any(|(kind, _, _, values)| {
            *kind == StoreKind::Local && values.iter().any(|(id, _)| *id == local)
        }));
    }

    #[test]
    fn cancellation_stops_the_run_cleanly() {
        let mut bus = ValueBus::new(NanCheckPolicy::Off, 10);
        let out = bus.add_channel(Channel::new("a.out", ValueKind::Real));
        let mut a = Component::new("a", Box::new(CounterAdapter { count: 0.0, finish_after: None }));
        a.ports.push(Port::scalar("out", Direction::Out, PortMode::Required, out));
        a.mark_instantiated();
        a.mark_running();

        let mut model = Model::new(vec![a], bus);
        let task = Task {
            start_time: 0.0,
            stop_time: 1.0,
            step_size: 0.1,
            ..Task::default()
        };
        let mut sink = RecordingSink::default();
        let mut calls = 0;
        let outcome = run(&mut model, &task, &mut sink, false, || {
            calls += 1;
            calls > 7
        })
        .unwrap();

        assert!(outcome.cancelled);
        assert!(sink.finished);
    }
}
