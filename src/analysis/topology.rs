use crate::store::{VariableId, VariableRegistry};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use std::collections::{HashSet, VecDeque};

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    None,
    Visiting,
    Visited,
}

/// Searches the `requires` closure of `start` for a cycle.
///
/// Returns the cycle as a path that begins and ends with the same variable.
/// Probed dependencies are not edges: a probe never forces evaluation.
pub fn find_cycle_from(registry: &VariableRegistry, start: VariableId) -> Option<Vec<VariableId>> {
    let mut state = vec![VisitState::None; registry.count()];
    let mut path = Vec::new();
    visit(start, registry, &mut state, &mut path)
}

fn visit(
    node: VariableId,
    registry: &VariableRegistry,
    state: &mut [VisitState],
    path: &mut Vec<VariableId>,
) -> Option<Vec<VariableId>> {
    let idx = node.index();

    match state[idx] {
        VisitState::Visited => return None,
        VisitState::Visiting => {
            let from = path.iter().position(|&n| n == node).unwrap_or(0);
            let mut cycle = path[from..].to_vec();
            cycle.push(node);
            return Some(cycle);
        }
        VisitState::None => state[idx] = VisitState::Visiting,
    }

    path.push(node);
    for &parent in registry.get_parents(node) {
        if let Some(cycle) = visit(parent, registry, state, path) {
            return Some(cycle);
        }
    }
    path.pop();

    state[idx] = VisitState::Visited;
    None
}

/// Every strongly connected group of variables on `requires` edges that
/// forms a cycle, including self-loops.
pub fn cycles(registry: &VariableRegistry) -> Vec<Vec<VariableId>> {
    let mut graph = DiGraph::<VariableId, ()>::with_capacity(registry.count(), registry.parents_flat.len());
    let nodes: Vec<_> = registry.definitions().map(|(id, _)| graph.add_node(id)).collect();
    for (id, _) in registry.definitions() {
        for &parent in registry.get_parents(id) {
            graph.add_edge(nodes[parent.index()], nodes[id.index()], ());
        }
    }

    tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .map(|scc| {
            let mut ids: Vec<VariableId> = scc.into_iter().map(|n| graph[n]).collect();
            ids.sort();
            ids
        })
        .collect()
}

/// Identifies every variable downstream of the given ones, through both
/// dependency kinds. The start variables are included.
/// Used for incremental invalidation.
pub fn downstream_from(registry: &VariableRegistry, start: &[VariableId]) -> HashSet<VariableId> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from(start.to_vec());

    while let Some(node) = queue.pop_front() {
        if visited.insert(node) {
            let mut edge_idx = registry.first_child[node.index()];
            while edge_idx != u32::MAX {
                queue.push_back(registry.child_targets[edge_idx as usize]);
                edge_idx = registry.next_child[edge_idx as usize];
            }
        }
    }
    visited
}
