//! The model: the set of components and the value bus wiring them together, plus the
//! once-per-run dependency analysis used to order component steps.

use std::collections::HashMap;

use crate::component::Component;
use crate::error::Result;
use crate::graph::{self, Adjacency, Group};
use crate::value::{ChannelId, ValueBus};

/// Components, their shared value bus, and the step ordering derived from the connection graph.
///
/// The model owns every [`Component`]; the bus holds only channel values and connection edges, no
/// ownership over the components that declared those channels.
pub struct Model {
    pub components: Vec<Component>,
    pub bus: ValueBus,
    /// Groups over component indices, in topological order, computed once at run setup from the
    /// connection graph alone (not the initial-dependency graph, which the initialization engine
    /// builds separately at channel granularity).
    step_order: Vec<Group>,
}

impl Model {
    pub fn new(components: Vec<Component>, bus: ValueBus) -> Self {
        Self {
            components,
            bus,
            step_order: Vec::new(),
        }
    }

    pub fn step_order(&self) -> &[Group] {
        &self.step_order
    }

    /// Map every channel to the index of the component that declared it, by scanning each
    /// component's ports.
    fn channel_owners(&self) -> HashMap<ChannelId, usize> {
        let mut owners = HashMap::new();
        for (index, component) in self.components.iter().enumerate() {
            for port in &component.ports {
                for &channel in &port.channels {
                    owners.insert(channel, index);
                }
            }
        }
        owners
    }

    /// Build the component-granularity adjacency implied by the connection set, run the
    /// dependency resolver over it, and assign cut nodes to any loop groups. Called once at run
    /// setup; the result is immutable for the remainder of the run.
    pub fn compute_step_order(&mut self) {
        let owners = self.channel_owners();
        let n = self.components.len();
        let mut adjacency = Adjacency::new(n);
        for (source, sink) in self.bus.connections() {
            if let (Some(&from), Some(&to)) = (owners.get(&source), owners.get(&sink)) {
                if from != to {
                    adjacency.add_edge(from, to);
                }
            }
        }
        let mut groups = graph::solve(&adjacency);
        graph::assign_cut_nodes(&mut groups);
        self.step_order = groups;
    }

    pub fn component(&self, index: usize) -> &Component {
        &self.components[index]
    }

    pub fn component_mut(&mut self, index: usize) -> &mut Component {
        &mut self.components[index]
    }

    /// True once every component has signalled it finished early (the scheduler's outer loop
    /// exits early in that case too, via the normal time bound, but this lets callers detect an
    /// all-finished run distinctly from a cancellation).
    pub fn all_finished(&self) -> bool {
        !self.components.is_empty() && self.components.iter().all(|c| c.finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ForeignAdapter, GetKind, SetKind, StepResult};
    use crate::config::NanCheckPolicy;
    use crate::port::{Direction, Port, PortMode};
    use crate::value::{Channel, ValueKind};

    struct NullAdapter;
    impl ForeignAdapter for NullAdapter {
        fn set_values(&mut self, _kind: SetKind, _channels: &[(ChannelId, crate::value::Value)]) -> Result<()> {
            Ok(())
        }
        fn get_values(&mut self, _kind: GetKind, _channels: &[ChannelId]) -> Result<Vec<(ChannelId, crate::value::Value)>> {
            Ok(Vec::new())
        }
        fn enter_initialization(&mut self, _start_time: f64, _tolerance: Option<f64>, _stop_time: Option<f64>) -> Result<()> {
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
    fn step_order_follows_connections_across_components() {
        let mut bus = ValueBus::new(NanCheckPolicy::Off, 10);
        let a_out = bus.add_channel(Channel::new("a.out", ValueKind::Real));
        let b_in = bus.add_channel(Channel::new("b.in", ValueKind::Real));
        let b_out = bus.add_channel(Channel::new("b.out", ValueKind::Real));
        let c_in = bus.add_channel(Channel::new("c.in", ValueKind::Real));
        bus.connect(a_out, b_in, Default::default()).unwrap();
        bus.connect(b_out, c_in, Default::default()).unwrap();

        let mut a = Component::new("a", Box::new(NullAdapter));
        a.ports.push(Port::scalar("out", Direction::Out, PortMode::Required, a_out));
        let mut b = Component::new("b", Box::new(NullAdapter));
        b.ports.push(Port::scalar("in", Direction::In, PortMode::Required, b_in));
        b.ports.push(Port::scalar("out", Direction::Out, PortMode::Required, b_out));
        let mut c = Component::new("c", Box::new(NullAdapter));
        c.ports.push(Port::scalar("in", Direction::In, PortMode::Required, c_in));

        let mut model = Model::new(vec![a, b, c], bus);
        model.compute_step_order();

        let position_of = |idx: usize| {
            model
                .step_order()
                .iter()
                .position(|g| g.nodes.contains(&idx))
                .unwrap()
        };
        assert!(position_of(0) < position_of(1));
        assert!(position_of(1) < position_of(2));
    }
}
