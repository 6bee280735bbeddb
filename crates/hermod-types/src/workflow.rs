//! The user-authored workflow DAG (spec §3 "Workflow").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::node::{Edge, WorkflowNode};

/// Lifecycle state of a workflow instance, mirrored from spec §4.4's state
/// machine diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Stopped,
    Starting,
    Running,
    Reconnecting,
    Failed,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Dead-letter policy: which sink absorbs terminal failures, and how many
/// before the workflow itself is marked `failed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DlqPolicy {
    pub dlq_sink_id: Option<Uuid>,
    pub dlq_threshold: u32,
    pub prioritize_dlq: bool,
}

impl Default for DlqPolicy {
    fn default() -> Self {
        Self {
            dlq_sink_id: None,
            dlq_threshold: 100,
            prioritize_dlq: false,
        }
    }
}

/// Declared CPU/memory/throughput budget, consulted by the Lease Manager's
/// fair-share candidate selection (spec §4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ResourceRequest {
    pub cpu_millis: u32,
    pub memory_mb: u32,
    pub throughput_per_sec: u32,
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self {
            cpu_millis: 100,
            memory_mb: 128,
            throughput_per_sec: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub vhost: String,
    pub workspace_id: Option<Uuid>,
    pub active: bool,
    pub status: WorkflowStatus,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<Edge>,

    pub max_retries: u32,
    pub retry_interval: std::time::Duration,
    pub reconnect_interval: std::time::Duration,

    pub dlq: DlqPolicy,

    pub dry_run: bool,
    pub schema_type: Option<String>,
    pub schema: Option<String>,
    pub cron: Option<String>,
    pub idle_timeout: std::time::Duration,
    pub tier: String,
    pub trace_sample_rate: f64,

    pub resources: ResourceRequest,

    pub owner_id: Option<String>,
    pub lease_until: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// spec §3: "A workflow is *owned* iff `owner_id≠null ∧ lease_until>now`".
    pub fn is_owned_at(&self, now: DateTime<Utc>) -> bool {
        matches!((&self.owner_id, self.lease_until), (Some(_), Some(until)) if until > now)
    }

    /// spec §3 invariants: edges reference existing nodes, at least one
    /// source node, node ids unique within the workflow.
    pub fn validate_shape(&self) -> Result<(), WorkflowShapeError> {
        use std::collections::HashSet;

        let mut seen = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(WorkflowShapeError::DuplicateNodeId(node.id.clone()));
            }
        }

        if !self
            .nodes
            .iter()
            .any(|n| n.node_type == crate::node::NodeType::Source)
        {
            return Err(WorkflowShapeError::NoSourceNode);
        }

        for edge in &self.edges {
            if !seen.contains(edge.from.as_str()) {
                return Err(WorkflowShapeError::DanglingEdge(edge.from.clone()));
            }
            if !seen.contains(edge.to.as_str()) {
                return Err(WorkflowShapeError::DanglingEdge(edge.to.clone()));
            }
        }

        crate::topology::validate_dag(&self.nodes, &self.edges)
            .map_err(WorkflowShapeError::Cyclic)?;

        Ok(())
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum WorkflowShapeError {
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),
    #[error("no source node present")]
    NoSourceNode,
    #[error("edge references unknown node: {0}")]
    DanglingEdge(String),
    #[error(transparent)]
    Cyclic(#[from] crate::topology::TopologyError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    fn node(id: &str, ty: NodeType) -> WorkflowNode {
        WorkflowNode {
            id: id.to_string(),
            node_type: ty,
            ref_id: None,
            config: serde_json::json!({}),
            x: 0.0,
            y: 0.0,
        }
    }

    fn base_workflow(nodes: Vec<WorkflowNode>, edges: Vec<Edge>) -> Workflow {
        Workflow {
            id: Uuid::nil(),
            name: "wf".into(),
            vhost: "/".into(),
            workspace_id: None,
            active: true,
            status: WorkflowStatus::Stopped,
            nodes,
            edges,
            max_retries: 5,
            retry_interval: std::time::Duration::from_secs(1),
            reconnect_interval: std::time::Duration::from_secs(5),
            dlq: DlqPolicy::default(),
            dry_run: false,
            schema_type: None,
            schema: None,
            cron: None,
            idle_timeout: std::time::Duration::from_secs(60),
            tier: "standard".into(),
            trace_sample_rate: 1.0,
            resources: ResourceRequest::default(),
            owner_id: None,
            lease_until: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn owned_requires_both_fields_and_future_lease() {
        let mut wf = base_workflow(vec![node("s", NodeType::Source)], vec![]);
        let now = Utc::now();
        assert!(!wf.is_owned_at(now));

        wf.owner_id = Some("w1".into());
        assert!(!wf.is_owned_at(now));

        wf.lease_until = Some(now - chrono::Duration::seconds(1));
        assert!(!wf.is_owned_at(now));

        wf.lease_until = Some(now + chrono::Duration::seconds(1));
        assert!(wf.is_owned_at(now));
    }

    #[test]
    fn requires_a_source_node() {
        let wf = base_workflow(vec![node("t", NodeType::Transformer)], vec![]);
        assert_eq!(wf.validate_shape(), Err(WorkflowShapeError::NoSourceNode));
    }

    #[test]
    fn rejects_duplicate_node_ids() {
        let wf = base_workflow(
            vec![
                node("a", NodeType::Source),
                node("a", NodeType::Sink),
            ],
            vec![],
        );
        assert_eq!(
            wf.validate_shape(),
            Err(WorkflowShapeError::DuplicateNodeId("a".into()))
        );
    }

    #[test]
    fn rejects_dangling_edges() {
        let wf = base_workflow(
            vec![node("a", NodeType::Source)],
            vec![Edge {
                from: "a".into(),
                to: "missing".into(),
            }],
        );
        assert_eq!(
            wf.validate_shape(),
            Err(WorkflowShapeError::DanglingEdge("missing".into()))
        );
    }

    #[test]
    fn accepts_valid_dag() {
        let wf = base_workflow(
            vec![node("a", NodeType::Source), node("b", NodeType::Sink)],
            vec![Edge {
                from: "a".into(),
                to: "b".into(),
            }],
        );
        assert!(wf.validate_shape().is_ok());
    }
}
