//! Compatibility checking for `Register` (spec §4.3 step 3).

use serde_json::Value;

use crate::error::SchemaError;

fn required_set(schema: &Value) -> std::collections::HashSet<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// JSON Schema compatibility: the new schema's `required` set must be a
/// subset of the previous version's. Adding a new required field would
/// break consumers validating against the old data.
pub fn check_json_compatible(previous: &Value, new: &Value) -> Result<(), SchemaError> {
    let prev_required = required_set(previous);
    let new_required = required_set(new);

    let added: Vec<&String> = new_required.difference(&prev_required).collect();
    if added.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::IncompatibleSchema(format!(
            "new required field(s) not present in previous version: {}",
            added
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}

/// Avro/Protobuf compatibility is the literal placeholder from spec §C
/// Open Question (a): equal content passes, divergent content is
/// allowed but the caller should flag it. Never fails.
pub fn avro_or_protobuf_flagged(previous: &Value, new: &Value) -> bool {
    previous != new
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subset_required_is_compatible() {
        let prev = json!({"required": ["id", "amount", "currency"]});
        let new = json!({"required": ["id", "amount"]});
        assert!(check_json_compatible(&prev, &new).is_ok());
    }

    #[test]
    fn new_required_field_is_incompatible() {
        let prev = json!({"required": ["id"]});
        let new = json!({"required": ["id", "amount"]});
        assert!(check_json_compatible(&prev, &new).is_err());
    }

    #[test]
    fn identical_avro_content_is_not_flagged() {
        let def = json!({"type": "record", "name": "Order"});
        assert!(!avro_or_protobuf_flagged(&def, &def));
    }

    #[test]
    fn divergent_avro_content_is_flagged_not_rejected() {
        let prev = json!({"type": "record", "name": "Order"});
        let new = json!({"type": "record", "name": "OrderV2"});
        assert!(avro_or_protobuf_flagged(&prev, &new));
    }
}
