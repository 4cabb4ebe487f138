//! Property-based tests for the topology engine.
//!
//! Random connection sequences must keep the graph acyclic, keep every
//! node's level exact and keep the connection table consistent with the
//! nodes' provider lists.

use std::collections::{HashMap, HashSet, VecDeque};

use proptest::prelude::*;

use patchbay_core::graph::{ComponentId, GraphState, ParamKind, ParamOptions};
use patchbay_core::GraphError;

const NODES: u64 = 8;

fn id(raw: u64) -> ComponentId {
    ComponentId::from(raw)
}

fn graph() -> GraphState {
    let mut state = GraphState::new();
    for raw in 0..NODES {
        state.register(id(raw), format!("n{raw}")).unwrap();
        for param in ["a", "b"] {
            state
                .add_param(id(raw), param, ParamOptions::new(), ParamKind::Input)
                .unwrap();
            state
                .add_param(id(raw), param, ParamOptions::new(), ParamKind::Output)
                .unwrap();
        }
    }
    state
}

/// Consumer edges, derived only from the connection list.
fn adjacency(state: &GraphState) -> HashMap<ComponentId, HashSet<ComponentId>> {
    let mut edges: HashMap<_, HashSet<_>> = HashMap::new();
    for connection in state.connections() {
        edges
            .entry(connection.spec.output_component)
            .or_default()
            .insert(connection.spec.input_component);
    }
    edges
}

fn reachable(
    edges: &HashMap<ComponentId, HashSet<ComponentId>>,
    from: ComponentId,
    to: ComponentId,
) -> bool {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([from]);
    while let Some(current) = queue.pop_front() {
        if current == to {
            return true;
        }
        if seen.insert(current) {
            queue.extend(edges.get(&current).into_iter().flatten().copied());
        }
    }
    false
}

/// Kahn's algorithm; returns false if a cycle remains.
fn is_acyclic(state: &GraphState) -> bool {
    let edges = adjacency(state);
    let mut indegree: HashMap<ComponentId, usize> =
        state.component_ids().into_iter().map(|c| (c, 0)).collect();
    for targets in edges.values() {
        for target in targets {
            *indegree.entry(*target).or_default() += 1;
        }
    }
    let mut ready: Vec<_> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(c, _)| *c)
        .collect();
    let mut visited = 0;
    while let Some(node) = ready.pop() {
        visited += 1;
        for target in edges.get(&node).into_iter().flatten() {
            let degree = indegree.entry(*target).or_default();
            *degree -= 1;
            if *degree == 0 {
                ready.push(*target);
            }
        }
    }
    visited == indegree.len()
}

/// Levels recomputed from scratch must match the maintained ones.
fn assert_levels(state: &GraphState) -> Result<(), TestCaseError> {
    for component in state.component_ids() {
        let node = state.node(component).unwrap();
        let expected = node
            .provider_components()
            .iter()
            .map(|p| state.level(*p).unwrap() + 1)
            .max()
            .unwrap_or(0);
        prop_assert_eq!(node.level(), expected, "level of {}", component);
    }
    Ok(())
}

fn param(flag: bool) -> &'static str {
    if flag {
        "a"
    } else {
        "b"
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Any sequence of additions leaves an acyclic graph with exact levels;
    /// every rejected edge really would have closed a cycle.
    #[test]
    fn additions_keep_graph_acyclic(
        edges in prop::collection::vec((0..NODES, any::<bool>(), 0..NODES, any::<bool>()), 0..40),
    ) {
        let mut state = graph();
        let mut rejected = Vec::new();

        for (input, input_param, output, output_param) in edges {
            match state.add_connection(
                (id(input), param(input_param)),
                (id(output), param(output_param)),
            ) {
                Ok(_) => {}
                Err(GraphError::CycleDetected { .. }) => rejected.push((input, output)),
                Err(other) => prop_assert!(false, "unexpected error {}", other),
            }
        }

        prop_assert!(is_acyclic(&state));
        assert_levels(&state)?;

        let adjacency = adjacency(&state);
        for (input, output) in rejected {
            prop_assert!(reachable(&adjacency, id(input), id(output)));
        }
    }

    /// Removing connections keeps levels exact and back-references in sync.
    #[test]
    fn removals_keep_levels_exact(
        edges in prop::collection::vec((0..NODES, 0..NODES), 1..30),
        keep in prop::collection::vec(any::<bool>(), 30),
    ) {
        let mut state = graph();
        for (input, output) in edges {
            let _ = state.add_connection((id(input), "a"), (id(output), "a"));
        }

        for (connection, keep) in state.connections().into_iter().zip(keep) {
            if !keep {
                state.remove_connection_by_id(connection.id).unwrap();
            }
        }

        assert_levels(&state)?;
        let linked: usize = state
            .component_ids()
            .into_iter()
            .map(|c| state.node(c).unwrap().inputs()["a"].providers.len())
            .sum();
        prop_assert_eq!(linked, state.connections().len());
    }
}
