//! DAG validation via Kahn's algorithm (spec §9 "Cyclic graphs").
//!
//! Workflow `nodes`/`edges` may be submitted in any order and could
//! describe a cyclic graph; this module rejects cycles with
//! [`TopologyError::Cyclic`] before the workflow is persisted.

use std::collections::{HashMap, VecDeque};

use crate::node::{Edge, WorkflowNode};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("workflow graph contains a cycle among nodes: {0:?}")]
    Cyclic(Vec<String>),
}

/// Validates that `(nodes, edges)` forms a DAG. Dangling-edge and
/// duplicate-id checks are the caller's responsibility (see
/// `Workflow::validate_shape`); this function only rejects cycles.
pub fn validate_dag(nodes: &[WorkflowNode], edges: &[Edge]) -> Result<(), TopologyError> {
    let mut indegree: HashMap<&str, usize> = nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in edges {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
        if let Some(count) = indegree.get_mut(edge.to.as_str()) {
            *count += 1;
        }
    }

    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0usize;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        if let Some(targets) = adjacency.get(id) {
            for &target in targets {
                if let Some(count) = indegree.get_mut(target) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(target);
                    }
                }
            }
        }
    }

    if visited != nodes.len() {
        let residual: Vec<String> = indegree
            .iter()
            .filter(|(_, &deg)| deg > 0)
            .map(|(&id, _)| id.to_string())
            .collect();
        return Err(TopologyError::Cyclic(residual));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    fn node(id: &str) -> WorkflowNode {
        WorkflowNode {
            id: id.to_string(),
            node_type: NodeType::Transformer,
            ref_id: None,
            config: serde_json::json!({}),
            x: 0.0,
            y: 0.0,
        }
    }

    fn edge(from: &str, to: &str) -> Edge {
        Edge {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    #[test]
    fn accepts_linear_chain() {
        let nodes = vec![node("a"), node("b"), node("c")];
        let edges = vec![edge("a", "b"), edge("b", "c")];
        assert!(validate_dag(&nodes, &edges).is_ok());
    }

    #[test]
    fn accepts_fan_in_fan_out() {
        let nodes = vec![node("s1"), node("s2"), node("t"), node("k1"), node("k2")];
        let edges = vec![
            edge("s1", "t"),
            edge("s2", "t"),
            edge("t", "k1"),
            edge("t", "k2"),
        ];
        assert!(validate_dag(&nodes, &edges).is_ok());
    }

    #[test]
    fn rejects_direct_cycle() {
        let nodes = vec![node("a"), node("b")];
        let edges = vec![edge("a", "b"), edge("b", "a")];
        assert!(validate_dag(&nodes, &edges).is_err());
    }

    #[test]
    fn rejects_self_loop() {
        let nodes = vec![node("a")];
        let edges = vec![edge("a", "a")];
        assert!(validate_dag(&nodes, &edges).is_err());
    }

    #[test]
    fn rejects_cycle_downstream_of_acyclic_prefix() {
        let nodes = vec![node("a"), node("b"), node("c"), node("d")];
        let edges = vec![edge("a", "b"), edge("b", "c"), edge("c", "d"), edge("d", "b")];
        let err = validate_dag(&nodes, &edges).unwrap_err();
        match err {
            TopologyError::Cyclic(mut residual) => {
                residual.sort();
                assert_eq!(residual, vec!["b", "c", "d"]);
            }
        }
    }

    #[test]
    fn accepts_disconnected_nodes() {
        let nodes = vec![node("a"), node("isolated")];
        let edges = vec![];
        assert!(validate_dag(&nodes, &edges).is_ok());
    }
}
