//! Per-node execution trace records (spec §3 "TraceStep", §8 property 9
//! "Trace completeness").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceStep {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub instance_run_id: Uuid,
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub duration_micros: u64,
    /// Snapshot of the message state entering or leaving this node,
    /// bounded by the workflow's `trace_sample_rate`.
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl TraceStep {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
