//! Per-(workflow, node) checkpoint state (spec §3 "NodeState", §4.4
//! "node-state checkpointing").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque checkpoint a node persists between restarts (e.g. a CDC
/// cursor, a batching window boundary). The runtime treats `state` as
/// an uninterpreted blob owned by the node implementation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeState {
    pub workflow_id: Uuid,
    pub node_id: String,
    pub state: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}
