//! The dependency resolver: strongly-connected-components analysis over a dense adjacency
//! matrix, producing groups in topological order.
//!
//! This is a Rust port of Tarjan's algorithm as implemented by the source system's
//! `libs/tarjan` module, with one deliberate correction: the original appends finished
//! components to its result array in DFS-completion order, which is the *reverse* of topological
//! order (a node's group finishes, and is appended, only after all of its successors' groups
//! have). [`solve`] reverses that order before returning, so that for every edge `u -> v` with
//! `u` and `v` in different groups, `u`'s group precedes `v`'s.

/// One strongly-connected group of node indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub nodes: Vec<usize>,
    pub is_loop: bool,
    /// Break points chosen for iterative resolution of this group, if it is a loop. Populated by
    /// the initialization engine / scheduler, not by the resolver itself.
    pub cut_nodes: Vec<usize>,
}

impl Group {
    fn singleton(node: usize, self_loop: bool) -> Self {
        Self {
            nodes: vec![node],
            is_loop: self_loop,
            cut_nodes: Vec::new(),
        }
    }
}

/// A dense `n*n` adjacency matrix: `adjacency[v * n + w]` is true iff there is an edge `v -> w`.
pub struct Adjacency {
    n: usize,
    edges: Vec<bool>,
}

impl Adjacency {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            edges: vec![false; n * n],
        }
    }

    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.edges[from * self.n + to] = true;
    }

    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        self.edges[from * self.n + to]
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}

struct TarjanState<'a> {
    adjacency: &'a Adjacency,
    index: usize,
    vindex: Vec<Option<usize>>,
    vlowlink: Vec<usize>,
    stack: Vec<usize>,
    on_stack: Vec<bool>,
    result: Vec<Group>,
}

impl<'a> TarjanState<'a> {
    fn new(adjacency: &'a Adjacency) -> Self {
        let n = adjacency.len();
        Self {
            adjacency,
            index: 0,
            vindex: vec![None; n],
            vlowlink: vec![0; n],
            stack: Vec::with_capacity(n),
            on_stack: vec![false; n],
            result: Vec::new(),
        }
    }

    fn connect(&mut self, v: usize) {
        self.vindex[v] = Some(self.index);
        self.vlowlink[v] = self.index;
        self.index += 1;

        self.stack.push(v);
        self.on_stack[v] = true;

        let n = self.adjacency.len();
        for w in 0..n {
            if !self.adjacency.has_edge(v, w) {
                continue;
            }
            match self.vindex[w] {
                None => {
                    self.connect(w);
                    self.vlowlink[v] = self.vlowlink[v].min(self.vlowlink[w]);
                }
                Some(w_index) if self.on_stack[w] => {
                    self.vlowlink[v] = self.vlowlink[v].min(w_index);
                }
                _ => {}
            }
        }

        if self.vlowlink[v] == self.vindex[v].unwrap() {
            let mut nodes = Vec::new();
            loop {
                let w = self.stack.pop().expect("component root must be on stack");
                self.on_stack[w] = false;
                nodes.push(w);
                if w == v {
                    break;
                }
            }
            let is_loop = if nodes.len() == 1 {
                let idx = nodes[0];
                self.adjacency.has_edge(idx, idx)
            } else {
                true
            };
            self.result.push(Group {
                nodes,
                is_loop,
                cut_nodes: Vec::new(),
            });
        }
    }
}

/// Compute strongly-connected groups of `adjacency`, returned in topological order (for edge
/// `u -> v` with `u`, `v` in distinct groups, `u`'s group precedes `v`'s). Groups with more than
/// one node, or a single node with a self-edge, have `is_loop = true`.
pub fn solve(adjacency: &Adjacency) -> Vec<Group> {
    if adjacency.is_empty() {
        return Vec::new();
    }
    let mut state = TarjanState::new(adjacency);
    for v in 0..adjacency.len() {
        if state.vindex[v].is_none() {
            state.connect(v);
        }
    }
    state.result.reverse();
    state.result
}

/// Assign cut nodes to every loop group, using the lowest-index-node-in-the-SCC heuristic (see
/// the design notes on algebraic-loop resolution).
pub fn assign_cut_nodes(groups: &mut [Group]) {
    for group in groups.iter_mut() {
        if group.is_loop {
            let min = *group.nodes.iter().min().expect("group is never empty");
            group.cut_nodes = vec![min];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_node_no_self_loop() {
        let adj = Adjacency::new(1);
        let groups = solve(&adj);
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].is_loop);
        assert_eq!(groups[0].nodes, vec![0]);
    }

    #[test]
    fn single_node_self_loop() {
        let mut adj = Adjacency::new(1);
        adj.add_edge(0, 0);
        let groups = solve(&adj);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_loop);
    }

    #[test]
    fn linear_chain_is_topologically_ordered() {
        // 0 -> 1 -> 2
        let mut adj = Adjacency::new(3);
        adj.add_edge(0, 1);
        adj.add_edge(1, 2);
        let groups = solve(&adj);
        assert_eq!(groups.len(), 3);
        let position_of = |node: usize| groups.iter().position(|g| g.nodes.contains(&node)).unwrap();
        assert!(position_of(0) < position_of(1));
        assert!(position_of(1) < position_of(2));
        assert!(groups.iter().all(|g| !g.is_loop));
    }

    #[test]
    fn three_cycle_is_one_loop_group() {
        // 0 -> 1 -> 2 -> 0
        let mut adj = Adjacency::new(3);
        adj.add_edge(0, 1);
        adj.add_edge(1, 2);
        adj.add_edge(2, 0);
        let groups = solve(&adj);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_loop);
        let mut nodes = groups[0].nodes.clone();
        nodes.sort();
        assert_eq!(nodes, vec![0, 1, 2]);
    }

    #[test]
    fn loop_feeding_a_sink_precedes_it() {
        // {0,1} cycle -> 2
        let mut adj = Adjacency::new(3);
        adj.add_edge(0, 1);
        adj.add_edge(1, 0);
        adj.add_edge(1, 2);
        let groups = solve(&adj);
        assert_eq!(groups.len(), 2);
        let loop_pos = groups.iter().position(|g| g.is_loop).unwrap();
        let sink_pos = groups.iter().position(|g| g.nodes == vec![2]).unwrap();
        assert!(loop_pos < sink_pos);
    }

    #[test]
    fn cut_nodes_use_lowest_index_in_scc() {
        let mut adj = Adjacency::new(3);
        adj.add_edge(0, 1);
        adj.add_edge(1, 2);
        adj.add_edge(2, 0);
        let mut groups = solve(&adj);
        assign_cut_nodes(&mut groups);
        assert_eq!(groups[0].cut_nodes, vec![0]);
    }
}
