//! Schema Registry (spec §4.3, capability C3).
//!
//! Grounded on `everruns-core::llm_driver_registry::DriverRegistry`'s
//! registry-over-a-store-plus-cache pattern: a thin front door that
//! reads/writes through the metadata store and keeps a `DashMap` cache
//! of the expensive-to-rebuild objects (there: driver instances; here:
//! [`Validator`]s) keyed the same way the store keys its rows.

use std::sync::Arc;

use dashmap::DashMap;
use hermod_store::MetadataStore;
use hermod_types::{Schema, SchemaType};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::compat::{avro_or_protobuf_flagged, check_json_compatible};
use crate::error::SchemaError;
use crate::validator::Validator;

/// Result of a successful `Register` call. `flagged` is set when an
/// Avro/Protobuf schema diverged from its predecessor without being
/// strictly checked (spec §C Open Question a).
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub schema: Schema,
    pub flagged: bool,
}

pub struct SchemaRegistry {
    store: Arc<dyn MetadataStore>,
    cache: DashMap<(String, u32), Arc<Validator>>,
}

impl SchemaRegistry {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    fn parse_content(schema_type: SchemaType, content: &str) -> Result<Value, SchemaError> {
        match schema_type {
            SchemaType::Json => serde_json::from_str(content)
                .map_err(|e| SchemaError::InvalidSchema(e.to_string())),
            // Avro/Protobuf parsing is out of scope (spec §C Open
            // Question a); the raw IDL/schema text is stored verbatim
            // and compared structurally as a string.
            SchemaType::Avro | SchemaType::Protobuf => {
                if content.trim().is_empty() {
                    Err(SchemaError::InvalidSchema("empty schema content".into()))
                } else {
                    Ok(Value::String(content.to_string()))
                }
            }
        }
    }

    #[instrument(skip(self, content))]
    pub async fn register(
        &self,
        name: &str,
        schema_type: SchemaType,
        content: &str,
    ) -> Result<RegisterOutcome, SchemaError> {
        let definition = Self::parse_content(schema_type, content)?;

        let previous = self.store.get_latest_schema(name).await?;
        let mut flagged = false;
        let next_version = match &previous {
            None => 1,
            Some(prev) => {
                if prev.schema_type != schema_type {
                    return Err(SchemaError::TypeChanged(name.to_string()));
                }
                match schema_type {
                    SchemaType::Json => check_json_compatible(&prev.definition, &definition)?,
                    SchemaType::Avro | SchemaType::Protobuf => {
                        flagged = avro_or_protobuf_flagged(&prev.definition, &definition);
                        if flagged {
                            warn!(name, "schema content diverged without a strict compatibility check");
                        }
                    }
                }
                prev.version + 1
            }
        };

        let schema = Schema {
            id: Uuid::new_v4(),
            name: name.to_string(),
            version: next_version,
            schema_type,
            definition,
            created_at: chrono::Utc::now(),
        };

        self.store.create_schema_version(schema.clone()).await?;
        self.cache.insert(
            (schema.name.clone(), schema.version),
            Arc::new(Validator::new(
                schema.name.clone(),
                schema.version,
                schema.schema_type,
                schema.definition.clone(),
            )),
        );
        info!(name, version = schema.version, "schema registered");

        Ok(RegisterOutcome { schema, flagged })
    }

    pub async fn get_validator(
        &self,
        name: &str,
        version: u32,
    ) -> Result<Arc<Validator>, SchemaError> {
        let key = (name.to_string(), version);
        if let Some(v) = self.cache.get(&key) {
            return Ok(v.clone());
        }

        let schema = self.store.get_schema_version(name, version).await?;
        let validator = Arc::new(Validator::new(
            schema.name,
            schema.version,
            schema.schema_type,
            schema.definition,
        ));
        self.cache.insert(key, validator.clone());
        Ok(validator)
    }

    pub async fn get_latest_validator(&self, name: &str) -> Result<Arc<Validator>, SchemaError> {
        let schema = self
            .store
            .get_latest_schema(name)
            .await?
            .ok_or_else(|| SchemaError::NotFound(name.to_string()))?;
        self.get_validator(name, schema.version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermod_store::InMemoryMetadataStore;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(Arc::new(InMemoryMetadataStore::new()))
    }

    #[tokio::test]
    async fn first_registration_is_version_one() {
        let r = registry();
        let outcome = r
            .register("orders", SchemaType::Json, r#"{"required": ["id"]}"#)
            .await
            .unwrap();
        assert_eq!(outcome.schema.version, 1);
        assert!(!outcome.flagged);
    }

    #[tokio::test]
    async fn subsequent_registration_increments_version() {
        let r = registry();
        r.register("orders", SchemaType::Json, r#"{"required": ["id"]}"#)
            .await
            .unwrap();
        let outcome = r
            .register("orders", SchemaType::Json, r#"{"required": []}"#)
            .await
            .unwrap();
        assert_eq!(outcome.schema.version, 2);
    }

    #[tokio::test]
    async fn new_required_field_is_rejected() {
        let r = registry();
        r.register("orders", SchemaType::Json, r#"{"required": ["id"]}"#)
            .await
            .unwrap();
        let err = r
            .register("orders", SchemaType::Json, r#"{"required": ["id", "amount"]}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::IncompatibleSchema(_)));
    }

    #[tokio::test]
    async fn type_change_is_rejected() {
        let r = registry();
        r.register("orders", SchemaType::Json, r#"{"required": []}"#)
            .await
            .unwrap();
        let err = r
            .register("orders", SchemaType::Avro, "some avro idl")
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::TypeChanged(_)));
    }

    #[tokio::test]
    async fn invalid_json_content_is_rejected() {
        let r = registry();
        let err = r
            .register("orders", SchemaType::Json, "{not valid json")
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidSchema(_)));
    }

    #[tokio::test]
    async fn divergent_avro_content_is_flagged_not_rejected() {
        let r = registry();
        r.register("events", SchemaType::Avro, "schema v1").await.unwrap();
        let outcome = r
            .register("events", SchemaType::Avro, "schema v2 - different")
            .await
            .unwrap();
        assert!(outcome.flagged);
        assert_eq!(outcome.schema.version, 2);
    }

    #[tokio::test]
    async fn get_latest_validator_validates_against_newest_version() {
        let r = registry();
        r.register("orders", SchemaType::Json, r#"{"required": ["id"]}"#)
            .await
            .unwrap();
        let validator = r.get_latest_validator("orders").await.unwrap();
        assert!(validator.validate(&serde_json::json!({"id": "1"})).is_ok());
        assert!(validator.validate(&serde_json::json!({})).is_err());
    }
}
