//! Tool specs and calls, routed by the `<server>__<tool>` name convention.
//!
//! Grounded on `tool/entities.rs`'s `ToolDefinition`/`ToolCall` pair,
//! generalized to the MCP-derived spec shape (`input_schema` as a JSON
//! schema value rather than a typed parameter list) and the qualified
//! naming the orchestrator routes calls by.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DomainError;

/// A tool spec as derived from MCP discovery, ready to hand to the LLM
/// client as a function spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// `<server>__<tool>`.
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolSpec {
    pub fn new(server: &str, tool: &str, description: impl Into<String>, input_schema: Option<Value>) -> Self {
        Self {
            name: qualify(server, tool),
            description: description.into(),
            input_schema: input_schema.unwrap_or_else(default_schema),
        }
    }
}

fn default_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}, "additionalProperties": true})
}

/// Join a server and bare tool name into the qualified routing name.
pub fn qualify(server: &str, tool: &str) -> String {
    format!("{server}__{tool}")
}

/// Split a qualified name back into `(server, tool)`. Tests must cover
/// model-emitted names that only contain the separator once, and names
/// with no separator at all (treated as `(name, name)` so a lookup still
/// fails cleanly rather than panicking).
pub fn split_qualified(name: &str) -> Result<(String, String), DomainError> {
    match name.split_once("__") {
        Some((server, tool)) if !server.is_empty() && !tool.is_empty() => {
            Ok((server.to_string(), tool.to_string()))
        }
        _ => Err(DomainError::InvalidToolName(name.to_string())),
    }
}

/// One call the model asked to make. `arguments` is always a JSON string
/// for round-trip stability with the LLM API (stored verbatim in
/// [`crate::message::ToolCallRef`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallRequest {
    /// Parse `arguments` into a JSON object, tolerant of malformed input:
    /// any parse failure or non-object value yields an empty map rather
    /// than an error.
    pub fn parsed_arguments(&self) -> serde_json::Map<String, Value> {
        serde_json::from_str::<Value>(&self.arguments)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default()
    }
}

/// The result of executing one tool call, ready to append as a `tool`
/// message.
#[derive(Debug, Clone)]
pub struct ToolExecutionResult {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolExecutionResult {
    pub fn ok(tool_call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: message.into(),
            is_error: true,
        }
    }

    pub fn denied(tool_call_id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            content: format!("Denied by user: {name}"),
            tool_call_id: tool_call_id.into(),
            name,
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualify_and_split_round_trip() {
        let name = qualify("fs", "read");
        assert_eq!(name, "fs__read");
        assert_eq!(split_qualified(&name).unwrap(), ("fs".into(), "read".into()));
    }

    #[test]
    fn split_rejects_unqualified_names() {
        assert!(split_qualified("read").is_err());
        assert!(split_qualified("__read").is_err());
        assert!(split_qualified("fs__").is_err());
    }

    #[test]
    fn malformed_arguments_become_empty_object() {
        let call = ToolCallRequest {
            id: "1".into(),
            name: "fs__read".into(),
            arguments: "{not json".into(),
        };
        assert!(call.parsed_arguments().is_empty());
    }

    #[test]
    fn arguments_round_trip_through_json_string() {
        let original = serde_json::json!({"path": "/x", "n": 3});
        let as_string = serde_json::to_string(&original).unwrap();
        let call = ToolCallRequest {
            id: "1".into(),
            name: "fs__read".into(),
            arguments: as_string,
        };
        let parsed = Value::Object(call.parsed_arguments());
        assert_eq!(parsed, original);
    }

    #[test]
    fn denied_message_matches_contract() {
        let result = ToolExecutionResult::denied("1", "fs__write");
        assert_eq!(result.content, "Denied by user: fs__write");
        assert!(result.is_error);
    }
}
