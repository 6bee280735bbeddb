//! Source/Sink entities (spec §3 "Source/Sink").
//!
//! `type` distinguishes the concrete connector variant (CDC, webhook,
//! GraphQL, relational store, vector store, social API, failover group,
//! ...); the capability traits in [`crate::capability`] are what the
//! runtime actually drives — this struct is only the persisted
//! configuration record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorType {
    Source,
    Sink,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connector {
    pub id: Uuid,
    pub name: String,
    pub kind: ConnectorType,
    /// Connector variant discriminator, e.g. "postgres_cdc", "webhook",
    /// "graphql", "vector_store", "failover_group".
    pub connector_type: String,
    pub vhost: String,
    pub active: bool,
    pub status: String,
    pub worker_id: Option<String>,
    /// Config map; sensitive keys are stored `enc:`-prefixed by
    /// `hermod-store` on write and transparently decrypted on read.
    pub config: serde_json::Map<String, serde_json::Value>,
    /// Sample record, sources only.
    pub sample: Option<serde_json::Value>,
    /// Connector-owned opaque checkpoint (e.g. CDC LSN), sources only.
    pub state: Option<serde_json::Value>,
}

impl Connector {
    pub fn is_source(&self) -> bool {
        self.kind == ConnectorType::Source
    }
}
