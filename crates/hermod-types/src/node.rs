//! Workflow DAG nodes and edges (spec §3 "WorkflowNode").

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Source,
    Sink,
    Transformer,
    Condition,
    Approval,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Points into the Source or Sink table for connector nodes; `None`
    /// for transformer/condition/approval nodes.
    pub ref_id: Option<Uuid>,
    pub config: serde_json::Value,
    pub x: f64,
    pub y: f64,
}

/// A directed edge between two node ids within the same workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: String,
    pub to: String,
}
