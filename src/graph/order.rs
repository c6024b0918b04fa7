//! Deterministic topological ordering.
//!
//! Kahn's algorithm with a min-heap of ready node indices: among steps whose
//! dependencies are all satisfied, the one added first runs first. Node
//! indices are insertion positions, so the result depends only on insertion
//! order and the edge set, never on hash iteration.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use super::ProtocolGraph;
use crate::error::{DiagnosticValue, ErrorKind, LabResult, PhysicsError};

/// Order `dag` topologically. On a cycle, returns the nodes that could not be
/// scheduled, in index order.
pub fn kahn_order<N, E>(dag: &DiGraph<N, E>) -> Result<Vec<NodeIndex>, Vec<NodeIndex>> {
    let mut indegree: Vec<usize> = dag
        .node_indices()
        .map(|n| dag.neighbors_directed(n, Direction::Incoming).count())
        .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(indegree.len());
    while let Some(Reverse(i)) = ready.pop() {
        let node = NodeIndex::new(i);
        order.push(node);
        for next in dag.neighbors_directed(node, Direction::Outgoing) {
            let d = &mut indegree[next.index()];
            *d -= 1;
            if *d == 0 {
                ready.push(Reverse(next.index()));
            }
        }
    }

    if order.len() == indegree.len() {
        Ok(order)
    } else {
        Err(indegree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d > 0)
            .map(|(i, _)| NodeIndex::new(i))
            .collect())
    }
}

impl ProtocolGraph {
    pub(crate) fn topological_order(&self) -> LabResult<Vec<NodeIndex>> {
        kahn_order(self.dag()).map_err(|stuck| {
            let ids: Vec<String> = stuck.iter().map(|&i| self.dag()[i].id.clone()).collect();
            PhysicsError::new(
                ErrorKind::CyclicDependency,
                format!("Steps [{}] form a dependency cycle.", ids.join(", ")),
                DiagnosticValue::ids(ids.iter().cloned()),
                DiagnosticValue::text("acyclic dependencies"),
                format!("remove one dependency among [{}]", ids.join(", ")),
            )
        })
    }

    /// Step ids in evaluation order.
    pub fn evaluation_order(&self) -> LabResult<Vec<&str>> {
        Ok(self
            .topological_order()?
            .into_iter()
            .map(|i| self.dag()[i].id.as_str())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dag(n: usize, edges: &[(usize, usize)]) -> DiGraph<(), ()> {
        let mut g = DiGraph::new();
        let nodes: Vec<_> = (0..n).map(|_| g.add_node(())).collect();
        for &(a, b) in edges {
            g.add_edge(nodes[a], nodes[b], ());
        }
        g
    }

    fn indices(order: Vec<NodeIndex>) -> Vec<usize> {
        order.into_iter().map(|n| n.index()).collect()
    }

    #[test]
    fn independent_nodes_keep_insertion_order() {
        assert_eq!(indices(kahn_order(&dag(4, &[])).unwrap()), vec![0, 1, 2, 3]);
    }

    #[test]
    fn ties_break_by_index() {
        // 0 -> 3, 1 -> 2: both 0 and 1 are ready first, 2 before 3 after that.
        let order = kahn_order(&dag(4, &[(0, 3), (1, 2)])).unwrap();
        assert_eq!(indices(order), vec![0, 1, 2, 3]);
    }

    #[test]
    fn dependencies_respected_when_added_out_of_order() {
        let order = kahn_order(&dag(3, &[(2, 0)])).unwrap();
        assert_eq!(indices(order), vec![1, 2, 0]);
    }

    #[test]
    fn cycle_reports_stuck_nodes() {
        let stuck = kahn_order(&dag(3, &[(0, 1), (1, 2), (2, 1)])).unwrap_err();
        assert_eq!(indices(stuck), vec![1, 2]);
    }

    #[test]
    fn order_is_repeatable() {
        let g = dag(6, &[(0, 5), (2, 1), (4, 3), (1, 5)]);
        let first = kahn_order(&g).unwrap();
        for _ in 0..10 {
            assert_eq!(kahn_order(&g).unwrap(), first);
        }
    }
}
