//! Append-only event records (spec §3 "Audit log / Webhook request /
//! Form submission / Approval / WorkflowVersion").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only record of a mutation made through the metadata store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub detail: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Received webhook call, recorded before dispatch into the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookRequest {
    pub id: Uuid,
    pub connector_id: Uuid,
    pub headers: std::collections::HashMap<String, String>,
    pub body: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// spec §4.4: an Approval node suspends its message until an external
/// resolution writes back a status; resumed messages continue
/// downstream. On worker restart the registry re-emits a
/// resume-pending signal for every row still `Pending`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Approval {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub node_id: String,
    pub message_id: Uuid,
    pub status: ApprovalStatus,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

impl Approval {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }
}

/// Immutable snapshot of a workflow's nodes/edges/config, written on
/// every `reload` (spec Open Question (b): rollback is out of scope —
/// rows are write-only history, nothing reads them back).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowVersionSnapshot {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub version: u32,
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
