//! Outbox item entity (spec §3 "OutboxItem", §4.6 "Outbox + Retry
//! Pipeline").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FailureClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    InFlight,
    Failed,
    Dead,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxItem {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub sink_id: Uuid,
    pub node_id: String,
    pub payload: Vec<u8>,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub last_failure_class: Option<FailureClass>,
    pub available_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutboxItem {
    /// spec §4.6: items exhausting `max_attempts` move to `Dead` rather
    /// than cycling back to `Pending`.
    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// spec §9 "stuck in_flight items": an item claimed longer than
    /// `claim_ttl` ago is eligible for reclamation back to `Pending`.
    pub fn is_stale_claim_at(&self, now: DateTime<Utc>, claim_ttl: chrono::Duration) -> bool {
        self.status == OutboxStatus::InFlight
            && self
                .claimed_at
                .map(|claimed| now - claimed > claim_ttl)
                .unwrap_or(false)
    }
}
