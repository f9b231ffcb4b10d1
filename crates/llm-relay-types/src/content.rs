use serde::{Deserialize, Serialize};

/// A single content part within a message.
///
/// Every variant that can originate from a model response carries an
/// optional `thought_signature`: the opaque provider-issued token that binds
/// a reasoning block (or the part emitted alongside it) to its author.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thought_signature: Option<String>,
    },
    Reasoning {
        reasoning: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thought_signature: Option<String>,
    },
    Image {
        image: ImagePart,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thought_signature: Option<String>,
    },
    File {
        file: FilePart,
    },
    ToolResult {
        tool_result: ToolResultPart,
    },
}

impl ContentPart {
    pub fn text(s: impl Into<String>) -> Self {
        ContentPart::Text {
            text: s.into(),
            thought_signature: None,
        }
    }

    pub fn reasoning(s: impl Into<String>, thought_signature: Option<String>) -> Self {
        ContentPart::Reasoning {
            reasoning: s.into(),
            thought_signature,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, result: impl Into<String>) -> Self {
        ContentPart::ToolResult {
            tool_result: ToolResultPart {
                tool_call_id: tool_call_id.into(),
                result: result.into(),
                thought_signature: None,
            },
        }
    }

    pub fn is_reasoning(&self) -> bool {
        matches!(self, ContentPart::Reasoning { .. })
    }

    /// The signature attached to this part, if any.
    pub fn thought_signature(&self) -> Option<&str> {
        match self {
            ContentPart::Text {
                thought_signature, ..
            }
            | ContentPart::Reasoning {
                thought_signature, ..
            }
            | ContentPart::Image {
                thought_signature, ..
            } => thought_signature.as_deref(),
            ContentPart::ToolResult { tool_result } => tool_result.thought_signature.as_deref(),
            ContentPart::File { .. } => None,
        }
    }
}

/// Inline image payload: base64 data plus MIME type, or a remote URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagePart {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mime_type: String,
    /// Base64-encoded bytes. Never re-encoded by the core; passed through.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

/// File attachment payload (Responses API input_file).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilePart {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filename: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_data: String,
}

/// The result of a tool execution, keyed back to the call that produced it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResultPart {
    pub tool_call_id: String,
    /// Result text; may be a JSON document or plain prose.
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_serde() {
        let part = ContentPart::text("hello");
        let json = serde_json::to_string(&part).unwrap();
        assert!(json.contains("\"kind\":\"text\""));
        assert!(!json.contains("thought_signature"));
        let back: ContentPart = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ContentPart::Text { text, .. } if text == "hello"));
    }

    #[test]
    fn test_reasoning_signature_accessor() {
        let part = ContentPart::reasoning("let me think", Some("sig".into()));
        assert_eq!(part.thought_signature(), Some("sig"));
        assert!(part.is_reasoning());
    }

    #[test]
    fn test_tool_result_roundtrip() {
        let part = ContentPart::tool_result("call_9", "{\"ok\":true}");
        let json = serde_json::to_string(&part).unwrap();
        let back: ContentPart = serde_json::from_str(&json).unwrap();
        match back {
            ContentPart::ToolResult { tool_result } => {
                assert_eq!(tool_result.tool_call_id, "call_9");
                assert_eq!(tool_result.result, "{\"ok\":true}");
            }
            other => panic!("expected ToolResult, got {other:?}"),
        }
    }
}
