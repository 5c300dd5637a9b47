//! Tool descriptors and the recursive parameter tree.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// The JSON Schema primitive a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParameterKind {
    /// The JSON Schema `type` keyword for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ParameterKind::String => "string",
            ParameterKind::Number => "number",
            ParameterKind::Integer => "integer",
            ParameterKind::Boolean => "boolean",
            ParameterKind::Array => "array",
            ParameterKind::Object => "object",
        }
    }

    fn from_type_str(s: &str) -> Option<Self> {
        match s {
            "string" => Some(ParameterKind::String),
            "number" => Some(ParameterKind::Number),
            "integer" => Some(ParameterKind::Integer),
            "boolean" => Some(ParameterKind::Boolean),
            "array" => Some(ParameterKind::Array),
            "object" => Some(ParameterKind::Object),
            _ => None,
        }
    }
}

/// One parameter of a tool.
///
/// `items` is populated only for arrays (the raw `items` schema fragment,
/// kept verbatim); `properties` only for objects (recursively parsed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub kind: ParameterKind,
    pub description: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Parameter>>,
}

impl Parameter {
    /// Parse one property schema into a Parameter.
    ///
    /// Unknown or missing `type` values fall back to `string` with a warning
    /// rather than failing the whole tool listing.
    pub fn from_schema(schema: &Value, required: bool) -> Self {
        let kind = match schema.get("type").and_then(Value::as_str) {
            Some(s) => ParameterKind::from_type_str(s).unwrap_or_else(|| {
                tracing::warn!("Unknown parameter type '{s}', treating as string");
                ParameterKind::String
            }),
            None => ParameterKind::String,
        };

        let description = schema
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_owned);

        let items = match kind {
            ParameterKind::Array => schema.get("items").cloned(),
            _ => None,
        };

        let properties = match kind {
            ParameterKind::Object if schema.get("properties").is_some() => {
                Some(parse_properties(schema))
            }
            _ => None,
        };

        Self {
            kind,
            description,
            required,
            items,
            properties,
        }
    }
}

/// Host-neutral description of one tool: name, description, and the
/// parameter tree parsed from the server's `inputSchema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: BTreeMap<String, Parameter>,
}

impl ToolDescriptor {
    /// Build a descriptor from a `tools/list` entry's `inputSchema`.
    ///
    /// The schema is expected to be `{type: "object", properties: {...},
    /// required?: [...]}`; anything missing is treated as empty.
    pub fn from_input_schema(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: &Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: parse_properties(input_schema),
        }
    }
}

/// Parse an object schema's `properties` map, marking each entry required
/// when it appears in the sibling `required` array.
fn parse_properties(schema: &Value) -> BTreeMap<String, Parameter> {
    let required: HashSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut parameters = BTreeMap::new();
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (key, prop) in props {
            parameters.insert(
                key.clone(),
                Parameter::from_schema(prop, required.contains(key.as_str())),
            );
        }
    }
    parameters
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitive_properties_map_across() {
        let schema = json!({
            "type": "object",
            "properties": {
                "text": {"type": "string", "description": "t"},
                "count": {"type": "integer"}
            },
            "required": ["text"]
        });
        let desc = ToolDescriptor::from_input_schema("echo", "d", &schema);
        assert_eq!(desc.name, "echo");
        assert_eq!(desc.parameters.len(), 2);

        let text = &desc.parameters["text"];
        assert_eq!(text.kind, ParameterKind::String);
        assert_eq!(text.description.as_deref(), Some("t"));
        assert!(text.required);

        let count = &desc.parameters["count"];
        assert_eq!(count.kind, ParameterKind::Integer);
        assert!(count.description.is_none());
        assert!(!count.required);
    }

    #[test]
    fn array_keeps_raw_items_fragment() {
        let schema = json!({
            "type": "object",
            "properties": {
                "tags": {
                    "type": "array",
                    "items": {"type": "string", "enum": ["a", "b"]}
                }
            }
        });
        let desc = ToolDescriptor::from_input_schema("tag", "", &schema);
        let tags = &desc.parameters["tags"];
        assert_eq!(tags.kind, ParameterKind::Array);
        assert_eq!(
            tags.items,
            Some(json!({"type": "string", "enum": ["a", "b"]}))
        );
        assert!(tags.properties.is_none());
    }

    #[test]
    fn nested_object_recurses() {
        let schema = json!({
            "type": "object",
            "properties": {
                "user": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "integer"},
                        "name": {"type": "string"}
                    },
                    "required": ["id"]
                }
            }
        });
        let desc = ToolDescriptor::from_input_schema("lookup", "", &schema);
        let user = &desc.parameters["user"];
        assert_eq!(user.kind, ParameterKind::Object);

        let props = user.properties.as_ref().unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(props["id"].kind, ParameterKind::Integer);
        assert!(props["id"].required);
        assert_eq!(props["name"].kind, ParameterKind::String);
        assert!(!props["name"].required);
    }

    #[test]
    fn unknown_type_falls_back_to_string() {
        let param = Parameter::from_schema(&json!({"type": "null"}), false);
        assert_eq!(param.kind, ParameterKind::String);
    }

    #[test]
    fn missing_type_defaults_to_string() {
        let param = Parameter::from_schema(&json!({"description": "d"}), false);
        assert_eq!(param.kind, ParameterKind::String);
        assert_eq!(param.description.as_deref(), Some("d"));
    }

    #[test]
    fn empty_schema_yields_no_parameters() {
        let desc = ToolDescriptor::from_input_schema("noop", "", &json!({"type": "object"}));
        assert!(desc.parameters.is_empty());
    }

    #[test]
    fn required_names_not_in_properties_are_ignored() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "required": ["a", "ghost"]
        });
        let desc = ToolDescriptor::from_input_schema("t", "", &schema);
        assert_eq!(desc.parameters.len(), 1);
        assert!(desc.parameters["a"].required);
    }
}
