//! Schema registry entities (spec §3 "Schema", §4.3 "Schema Registry").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Json,
    Avro,
    Protobuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    pub id: Uuid,
    pub name: String,
    /// Monotonically increasing per `name`, starting at 1.
    pub version: u32,
    pub schema_type: SchemaType,
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
