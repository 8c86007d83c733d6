//! SchemaBinder seam
//!
//! The engine never inspects a handler's argument types itself. At
//! registration it asks the binder to `describe()` the input schema for list
//! responses, and per invocation it asks the binder to `bind()` the raw JSON
//! arguments into the map handed to the handler. Language-specific
//! implementations (derive macros, code-gen) plug in behind this trait; the
//! engine relies only on the schema being a JSON-Schema-compatible object
//! whose `required` is always an array, never null.

use serde_json::{Value, json};
use std::collections::HashMap;

use crate::core::error::{McpError, McpResult};

/// Binds raw JSON arguments to a handler's argument map
pub trait SchemaBinder: Send + Sync {
    /// The JSON-Schema object advertised in list responses
    fn describe(&self) -> Value;

    /// Validate and bind raw arguments for one invocation
    fn bind(&self, raw: Option<Value>) -> McpResult<HashMap<String, Value>>;
}

/// A binder around a caller-supplied JSON-Schema object.
///
/// `describe` normalizes the schema (missing/null `required` becomes an empty
/// array); `bind` checks only the presence of required keys, leaving deeper
/// validation to richer binder implementations.
pub struct StaticSchemaBinder {
    schema: Value,
    required: Vec<String>,
}

impl StaticSchemaBinder {
    /// Wrap a JSON-Schema object. Non-object schemas are replaced with the
    /// empty object schema.
    pub fn new(schema: Value) -> Self {
        let mut schema = if schema.is_object() {
            schema
        } else {
            json!({"type": "object", "properties": {}})
        };
        let required: Vec<String> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        // `required` must be an array on the wire, never null.
        if let Some(obj) = schema.as_object_mut() {
            obj.insert("required".to_string(), json!(required));
            if !obj.contains_key("type") {
                obj.insert("type".to_string(), json!("object"));
            }
        }
        Self { schema, required }
    }

    /// The empty object schema (no properties, nothing required)
    pub fn empty() -> Self {
        Self::new(json!({"type": "object", "properties": {}}))
    }
}

impl SchemaBinder for StaticSchemaBinder {
    fn describe(&self) -> Value {
        self.schema.clone()
    }

    fn bind(&self, raw: Option<Value>) -> McpResult<HashMap<String, Value>> {
        let map = match raw {
            None => HashMap::new(),
            Some(Value::Object(obj)) => obj.into_iter().collect(),
            Some(other) => {
                return Err(McpError::InvalidParams(format!(
                    "arguments must be an object, got {other}"
                )));
            }
        };
        for key in &self.required {
            if !map.contains_key(key) {
                return Err(McpError::InvalidParams(format!(
                    "missing required argument '{key}'"
                )));
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_normalized_to_array() {
        let binder = StaticSchemaBinder::new(json!({
            "type": "object",
            "properties": {"message": {"type": "string"}}
        }));
        let schema = binder.describe();
        assert_eq!(schema["required"], json!([]));
    }

    #[test]
    fn test_null_required_normalized() {
        let binder = StaticSchemaBinder::new(json!({
            "type": "object",
            "properties": {},
            "required": null
        }));
        assert_eq!(binder.describe()["required"], json!([]));
    }

    #[test]
    fn test_bind_checks_required() {
        let binder = StaticSchemaBinder::new(json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": ["message"]
        }));
        assert!(binder.bind(Some(json!({"message": "hi"}))).is_ok());
        let err = binder.bind(Some(json!({}))).unwrap_err();
        assert!(matches!(err, McpError::InvalidParams(_)));
        assert!(binder.bind(None).is_err());
    }

    #[test]
    fn test_bind_rejects_non_object() {
        let binder = StaticSchemaBinder::empty();
        assert!(binder.bind(Some(json!([1, 2]))).is_err());
        assert!(binder.bind(None).is_ok());
    }

    #[test]
    fn test_non_object_schema_replaced() {
        let binder = StaticSchemaBinder::new(json!("bogus"));
        assert_eq!(binder.describe()["type"], json!("object"));
    }
}
