use serde::{Deserialize, Serialize};

use crate::content::ContentPart;
use crate::tool::ToolCall;

/// The four roles the translation core distinguishes.
///
/// `developer` on the wire is folded into `System` by the parsers; the IR
/// never carries it as a separate role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Map a standard wire role string to an IR role. Unknown strings fall
    /// back to `User`, which is the safest role to forward.
    pub fn from_wire(role: &str) -> Self {
        match role {
            "system" | "developer" => Role::System,
            "assistant" | "model" => Role::Assistant,
            "tool" => Role::Tool,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One conversation turn.
///
/// Invariants: a `tool` message carries only `ToolResult` parts; a `system`
/// message carries only `Text` parts; an assistant message may mix
/// `Reasoning`, `Text` and `Image` parts and carry `tool_calls`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentPart::text(text)],
            tool_calls: Vec::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::text(text)],
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentPart::text(text)],
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: vec![ContentPart::tool_result(tool_call_id, result)],
            tool_calls: Vec::new(),
        }
    }

    /// Concatenate the text of all `Text` parts.
    pub fn combined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Concatenate the text of all `Reasoning` parts.
    pub fn combined_reasoning(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Reasoning { reasoning, .. } => Some(reasoning.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// The signature of the first signed `Reasoning` part, if any.
    pub fn first_reasoning_signature(&self) -> Option<&str> {
        self.content.iter().find_map(|p| match p {
            ContentPart::Reasoning {
                thought_signature: Some(sig),
                ..
            } if !sig.is_empty() => Some(sig.as_str()),
            _ => None,
        })
    }

    /// Whether the first content part is a reasoning block.
    pub fn starts_with_reasoning(&self) -> bool {
        matches!(self.content.first(), Some(ContentPart::Reasoning { .. }))
    }

    pub fn has_tool_result(&self) -> bool {
        self.content
            .iter()
            .any(|p| matches!(p, ContentPart::ToolResult { .. }))
    }
}
