//! Validators produced by the registry (spec §4.3: "`GetValidator`
//! returns a validator object with `Validate(record) → error`").
//!
//! JSON Schema validation covers the subset the spec actually exercises
//! — `type`, `required`, and per-property `type` — rather than the full
//! JSON Schema vocabulary; there is no general-purpose schema crate in
//! the example pack to ground a fuller implementation on, and spec §4.3
//! only ever inspects `required`. Avro/Protobuf validation is the same
//! placeholder the compatibility check uses: always passes, since full
//! binary-schema validation is out of scope (spec §C Open Question a).

use hermod_types::SchemaType;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    MissingRequired(String),

    #[error("field `{field}` expected type `{expected}`, found `{actual}`")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },
}

#[derive(Debug, Clone)]
pub struct Validator {
    pub name: String,
    pub version: u32,
    schema_type: SchemaType,
    definition: Value,
}

impl Validator {
    pub fn new(name: String, version: u32, schema_type: SchemaType, definition: Value) -> Self {
        Self {
            name,
            version,
            schema_type,
            definition,
        }
    }

    pub fn validate(&self, record: &Value) -> Result<(), ValidationError> {
        match self.schema_type {
            SchemaType::Json => validate_json(&self.definition, record),
            SchemaType::Avro | SchemaType::Protobuf => Ok(()),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_matches(declared: &str, actual: &Value) -> bool {
    match declared {
        "integer" => matches!(actual, Value::Number(n) if n.is_i64() || n.is_u64()),
        "number" => matches!(actual, Value::Number(_)),
        "string" => matches!(actual, Value::String(_)),
        "boolean" => matches!(actual, Value::Bool(_)),
        "array" => matches!(actual, Value::Array(_)),
        "object" => matches!(actual, Value::Object(_)),
        "null" => matches!(actual, Value::Null),
        _ => true,
    }
}

fn validate_json(schema: &Value, record: &Value) -> Result<(), ValidationError> {
    let Value::Object(record_map) = record else {
        return Err(ValidationError::NotAnObject);
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required {
            if let Some(name) = field.as_str() {
                if !record_map.contains_key(name) {
                    return Err(ValidationError::MissingRequired(name.to_string()));
                }
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (field, field_schema) in properties {
            let Some(actual) = record_map.get(field) else {
                continue;
            };
            if let Some(expected) = field_schema.get("type").and_then(Value::as_str) {
                if !type_matches(expected, actual) {
                    return Err(ValidationError::TypeMismatch {
                        field: field.clone(),
                        expected: expected.to_string(),
                        actual: json_type_name(actual).to_string(),
                    });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator(def: Value) -> Validator {
        Validator::new("orders".into(), 1, SchemaType::Json, def)
    }

    #[test]
    fn passes_when_required_fields_present() {
        let v = validator(json!({"required": ["id", "amount"]}));
        assert!(v.validate(&json!({"id": "1", "amount": 5})).is_ok());
    }

    #[test]
    fn fails_when_required_field_missing() {
        let v = validator(json!({"required": ["id", "amount"]}));
        assert_eq!(
            v.validate(&json!({"id": "1"})),
            Err(ValidationError::MissingRequired("amount".into()))
        );
    }

    #[test]
    fn rejects_non_object_records() {
        let v = validator(json!({"required": []}));
        assert_eq!(v.validate(&json!([1, 2, 3])), Err(ValidationError::NotAnObject));
    }

    #[test]
    fn flags_type_mismatch_on_declared_properties() {
        let v = validator(json!({
            "properties": {"amount": {"type": "integer"}}
        }));
        let err = v.validate(&json!({"amount": "not-a-number"})).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn avro_and_protobuf_validators_always_pass() {
        let v = Validator::new("orders".into(), 1, SchemaType::Avro, json!({"anything": true}));
        assert!(v.validate(&json!({"whatever": 1})).is_ok());
    }
}
