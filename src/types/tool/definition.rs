//! Tool definition types.

use serde::{Deserialize, Serialize};

/// Tool schema as sent to the model: `{name, description, input_schema}`.
///
/// No other fields are serialized; the transport rejects unknown keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: normalize_schema(input_schema),
        }
    }

    /// Build an `{type: "object", properties, required}` schema.
    pub fn object(
        name: impl Into<String>,
        description: impl Into<String>,
        properties: serde_json::Value,
        required: &[&str],
    ) -> Self {
        Self::new(
            name,
            description,
            serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        )
    }
}

/// Ensure `type`, `properties` and `required` are present on object schemas.
fn normalize_schema(mut schema: serde_json::Value) -> serde_json::Value {
    if let Some(obj) = schema.as_object_mut() {
        obj.entry("type")
            .or_insert_with(|| serde_json::Value::String("object".into()));
        obj.entry("properties")
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        obj.entry("required")
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
    }
    schema
}
