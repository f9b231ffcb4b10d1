use serde::{Deserialize, Serialize};

/// A function invocation requested by a model.
///
/// `args` stays a raw JSON string end to end: streaming deltas are
/// syntactic fragments that must not be parsed until the call completes.
/// When `args` is non-empty and the call is complete it is valid JSON
/// (parsers normalise empty args to `"{}"`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub args: String,
    /// Incomplete argument fragment from a streaming chunk. Never
    /// normalised or validated.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partial_args: String,
    /// Responses-API internal output item id (`fc_…`), distinct from the
    /// client-facing `call_id`. The stream state machine reconciles the two.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
    /// Freeform-input tool (Responses API `custom_tool_call`).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_custom: bool,
    /// Set on the closing streaming event for a call.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_complete: bool,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args: args.into(),
            ..Default::default()
        }
    }
}

/// A tool made available to the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// JSON Schema for the arguments. `None` marks a freeform tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    /// Provider-hosted tool (web_search, code_interpreter); passed through
    /// as a named type with no schema.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_built_in: bool,
    /// Freeform-text tool (Responses API `custom` type).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_custom: bool,
    /// Grammar/format descriptor for custom tools (e.g. apply_patch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<serde_json::Value>,
}

/// Gemini-style function-calling config carried through the IR verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionCallingConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_function_names: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream_function_call_arguments: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_minimal_serde() {
        let tc = ToolCall::new("search-1a2b3c4d", "search", "{\"q\":\"cats\"}");
        let json = serde_json::to_string(&tc).unwrap();
        assert!(!json.contains("partial_args"));
        assert!(!json.contains("is_custom"));
        let back: ToolCall = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "search");
        assert!(!back.is_complete);
    }

    #[test]
    fn test_tool_definition_freeform_marker() {
        let def = ToolDefinition {
            name: "apply_patch".into(),
            is_custom: true,
            ..Default::default()
        };
        assert!(def.parameters.is_none());
        let json = serde_json::to_string(&def).unwrap();
        assert!(json.contains("\"is_custom\":true"));
    }
}
