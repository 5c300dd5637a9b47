//! Provider-specific schema emitters.
//!
//! Both emitters are pure functions of the parameter tree and omit fields
//! that are absent rather than emitting nulls.

use crate::parameter::Parameter;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Emit one parameter as an OpenAI-style function schema fragment:
/// `{type, description?, items?, properties?}`.
pub fn openai_schema(param: &Parameter) -> Value {
    let mut out = Map::new();
    out.insert("type".into(), Value::String(param.kind.as_str().into()));
    if let Some(desc) = &param.description {
        out.insert("description".into(), Value::String(desc.clone()));
    }
    if let Some(items) = &param.items {
        out.insert("items".into(), items.clone());
    }
    if let Some(props) = &param.properties {
        let mut members = Map::new();
        for (key, child) in props {
            members.insert(key.clone(), openai_schema(child));
        }
        out.insert("properties".into(), Value::Object(members));
    }
    Value::Object(out)
}

/// Emit a top-level parameter map as the `properties` object of an
/// Anthropic tool `input_schema`. Same fragment shape as [`openai_schema`],
/// applied to each entry of the map.
pub fn anthropic_properties(parameters: &BTreeMap<String, Parameter>) -> Value {
    let mut members = Map::new();
    for (key, param) in parameters {
        members.insert(key.clone(), openai_schema(param));
    }
    Value::Object(members)
}
