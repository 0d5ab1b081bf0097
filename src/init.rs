//! The initialization engine: drives every already-instantiated component to a consistent state
//! at `t = start_time`, following the five-step protocol over the initial-dependency graph.

use std::collections::{HashMap, HashSet};

use crate::component::{GetKind, SetKind, State};
use crate::config::Task;
use crate::error::{Error, Result};
use crate::graph::{self, Adjacency, Group};
use crate::model::Model;
use crate::port::Direction;
use crate::value::{ChannelId, Value, ValueBus};

/// Run the full protocol: pre-init assignment, enter-init, re-assertion, group propagation (with
/// fixed-point resolution of any algebraic loops), then exit-init. Every component is expected to
/// already be in [`State::Instantiated`] when this is called.
pub fn initialize(model: &mut Model, task: &Task) -> Result<()> {
    pre_init_assignment(model)?;

    for component in model.components.iter_mut() {
        component.adapter.enter_initialization(
            task.start_time,
            Some(task.loop_tolerance_rel),
            Some(task.stop_time),
        )?;
        component.state = State::Initializing;
    }

    // Some components only accept parameters/initial values once initialization mode has been
    // entered; re-assert unconditionally rather than guess which ones require it.
    pre_init_assignment(model)?;

    let owners = channel_owners(model);
    let mut groups = graph::solve(&initial_dependency_adjacency(model));
    graph::assign_cut_nodes(&mut groups);

    for (group_index, group) in groups.iter().enumerate() {
        model.bus.propagate(task.start_time)?;
        if group.is_loop && task.init_mode != crate::config::InitMode::NoLoopResolution {
            resolve_loop_group(model, task, &owners, group_index, group)?;
        } else {
            evaluate_group(model, &owners, &group.nodes)?;
        }
    }

    let mut exited = HashSet::new();
    for &owner in owners.values() {
        if exited.insert(owner) {
            let component = &mut model.components[owner];
            component.adapter.exit_initialization()?;
            component.mark_running();
        }
    }

    Ok(())
}

/// Write parameters, initial values, and current inputs into every component from their
/// bus-resident values. The three `SetKind`s differ in which foreign call they trigger, not in
/// which channels participate — the bus does not distinguish a "parameter" value from an
/// "initial" one once both are loaded.
fn pre_init_assignment(model: &mut Model) -> Result<()> {
    for component in model.components.iter_mut() {
        let inputs = gather_channels(component, &model.bus, Direction::In);
        component.adapter.set_values(SetKind::Params, &inputs)?;
        component.adapter.set_values(SetKind::InitialValues, &inputs)?;
        component.adapter.set_values(SetKind::Inputs, &inputs)?;
    }
    Ok(())
}

fn gather_channels(
    component: &crate::component::Component,
    bus: &ValueBus,
    direction: Direction,
) -> Vec<(ChannelId, Value)> {
    component
        .ports
        .iter()
        .filter(|p| p.direction == direction)
        .flat_map(|p| p.channels.iter().copied())
        .filter(|&id| bus.channel(id).defined_during_init)
        .filter_map(|id| bus.sample(id).cloned().map(|v| (id, v)))
        .collect()
}

fn channel_owners(model: &Model) -> HashMap<ChannelId, usize> {
    let mut owners = HashMap::new();
    for (index, component) in model.components.iter().enumerate() {
        for port in &component.ports {
            for &channel in &port.channels {
                owners.insert(channel, index);
            }
        }
    }
    owners
}

/// Channel-granularity adjacency: connection edges, plus each component's declared
/// initial-dependency relation (in-channel precedes the out-channel(s) it feeds). A component
/// that declares no structure is treated as fully dense, per the adapter contract.
fn initial_dependency_adjacency(model: &Model) -> Adjacency {
    let n = model.bus.len();
    let mut adjacency = Adjacency::new(n);
    for (source, sink) in model.bus.connections() {
        adjacency.add_edge(source.0, sink.0);
    }
    for component in &model.components {
        let out_channels: Vec<ChannelId> = component
            .ports
            .iter()
            .filter(|p| p.direction == Direction::Out)
            .flat_map(|p| p.channels.iter().copied())
            .collect();
        let in_channels: Vec<ChannelId> = component
            .ports
            .iter()
            .filter(|p| p.direction == Direction::In)
            .flat_map(|p| p.channels.iter().copied())
            .collect();
        match component.adapter.initial_dependencies() {
            Some(deps) => {
                for (out_channel, ins) in deps {
                    for in_channel in ins {
                        adjacency.add_edge(in_channel.0, out_channel.0);
                    }
                }
            }
            None => {
                for &out_channel in &out_channels {
                    for &in_channel in &in_channels {
                        adjacency.add_edge(in_channel.0, out_channel.0);
                    }
                }
            }
        }
    }
    adjacency
}

/// Set inputs and pull fresh outputs for every component touched by this group's channels.
fn evaluate_group(
    model: &mut Model,
    owners: &HashMap<ChannelId, usize>,
    nodes: &[usize],
) -> Result<()> {
    let members: HashSet<ChannelId> = nodes.iter().map(|&i| ChannelId(i)).collect();
    let mut component_indices: Vec<usize> = members.iter().filter_map(|c| owners.get(c).copied()).collect();
    component_indices.sort_unstable();
    component_indices.dedup();

    for index in component_indices {
        let inputs: Vec<(ChannelId, Value)> = {
            let component = &model.components[index];
            let bus = &model.bus;
            component
                .ports
                .iter()
                .filter(|p| p.direction == Direction::In)
                .flat_map(|p| p.channels.iter().copied())
                .filter(|id| members.contains(id) && bus.channel(*id).defined_during_init)
                .filter_map(|id| bus.sample(id).cloned().map(|v| (id, v)))
                .collect()
        };
        model.components[index].adapter.set_values(SetKind::Inputs, &inputs)?;

        let out_ids: Vec<ChannelId> = model.components[index]
            .ports
            .iter()
            .filter(|p| p.direction == Direction::Out)
            .flat_map(|p| p.channels.iter().copied())
            .filter(|id| members.contains(id))
            .collect();
        if !out_ids.is_empty() {
            let outputs = model.components[index]
                .adapter
                .get_values(GetKind::Outputs, &out_ids)?;
            for (id, value) in outputs {
                model.bus.set(id, value);
            }
        }
    }
    Ok(())
}

/// Fixed-point resolution of an algebraic loop: seed cut nodes with their initial values, then
/// repeatedly evaluate the group and compare cut-node values against the previous iteration until
/// they agree within `ε_abs + ε_rel·|x|`, or the iteration budget is exhausted.
fn resolve_loop_group(
    model: &mut Model,
    task: &Task,
    owners: &HashMap<ChannelId, usize>,
    group_index: usize,
    group: &Group,
) -> Result<()> {
    let cut_nodes: Vec<ChannelId> = group.cut_nodes.iter().map(|&i| ChannelId(i)).collect();

    for &cut in &cut_nodes {
        let channel = model.bus.channel(cut);
        if let Some(seed) = channel.initial.clone().or_else(|| channel.default.clone()) {
            model.bus.set(cut, seed);
        }
    }

    for _ in 0..task.init_iteration_budget {
        let snapshot: Vec<Option<Value>> = cut_nodes.iter().map(|&id| model.bus.sample(id).cloned()).collect();

        model.bus.propagate(task.start_time)?;
        evaluate_group(model, owners, &group.nodes)?;

        let converged = cut_nodes.iter().zip(snapshot.iter()).all(|(&id, before)| {
            match (before.as_ref(), model.bus.sample(id)) {
                (Some(Value::Real(b)), Some(Value::Real(a))) => {
                    (a - b).abs() <= task.loop_tolerance_abs + task.loop_tolerance_rel * a.abs()
                }
                (before, after) => before == after,
            }
        });
        if converged {
            return Ok(());
        }
    }

    Err(Error::InitialLoopDiverged {
        group: group_index,
        iterations: task.init_iteration_budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ForeignAdapter, StepResult};
    use crate::config::NanCheckPolicy;
    use crate::port::{Port, PortMode};
    use crate::value::{Channel, ValueKind};

    /// Adapter standing in for a component whose output is a fixed affine function of its input:
    /// `out = gain * in + bias`. Enough to exercise both the straight-through and loop paths.
    struct LinearAdapter {
        gain: f64,
        bias: f64,
        input: f64,
        in_id: ChannelId,
        out_id: ChannelId,
    }

    impl ForeignAdapter for LinearAdapter {
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
            Ok(())
        }
    }

    #[test]
    fn straight_through_chain_converges_without_iteration() {
        let mut bus = ValueBus::new(NanCheckPolicy::Off, 10);
        let a_in = bus.add_channel(Channel::new("a.in", ValueKind::Real));
        let a_out = bus.add_channel(Channel::new("a.out", ValueKind::Real));
        let b_in = bus.add_channel(Channel::new("b.in", ValueKind::Real));
        let b_out = bus.add_channel(Channel::new("b.out", ValueKind::Real));
        bus.connect(a_out, b_in, Default::default()).unwrap();
        bus.set(a_in, Value::Real(1.0));

        let mut a = Component::new(
            "a",
            Box::new(LinearAdapter { gain: 2.0, bias: 0.0, input: 0.0, in_id: a_in, out_id: a_out }),
        );
        a.ports.push(Port::scalar("in", Direction::In, PortMode::Required, a_in));
        a.ports.push(Port::scalar("out", Direction::Out, PortMode::Required, a_out));
        a.mark_instantiated();

        let mut b = Component::new(
            "b",
            Box::new(LinearAdapter { gain: 1.0, bias: 1.0, input: 0.0, in_id: b_in, out_id: b_out }),
        );
        b.ports.push(Port::scalar("in", Direction::In, PortMode::Required, b_in));
        b.ports.push(Port::scalar("out", Direction::Out, PortMode::Required, b_out));
        b.mark_instantiated();

        let mut model = Model::new(vec![a, b], bus);
        let task = Task::default();
        initialize(&mut model, &task).unwrap();

        assert_eq!(model.bus.sample(a_out), Some(&Value::Real(2.0)));
        assert_eq!(model.bus.sample(b_out), Some(&Value::Real(3.0)));
        assert_eq!(model.components[0].state, State::Running);
        assert_eq!(model.components[1].state, State::Running);
    }
}
