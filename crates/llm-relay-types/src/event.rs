use serde::{Deserialize, Serialize};

use crate::content::ImagePart;
use crate::tool::ToolCall;
use crate::usage::Usage;

/// Why a response ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Unknown,
}

impl FinishReason {
    /// Gemini `finishReason` -> IR.
    ///
    /// `MALFORMED_FUNCTION_CALL` is recoverable and `UNEXPECTED_TOOL_CALL`
    /// is intermediate; both map to `Unknown` so the stream layer can skip
    /// or repair them instead of finishing.
    pub fn from_gemini(reason: &str) -> Self {
        match reason.to_ascii_uppercase().as_str() {
            "STOP" | "FINISH_REASON_UNSPECIFIED" | "UNKNOWN" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::Length,
            "SAFETY" | "RECITATION" => FinishReason::ContentFilter,
            "MALFORMED_FUNCTION_CALL" | "UNEXPECTED_TOOL_CALL" => FinishReason::Unknown,
            _ => FinishReason::Unknown,
        }
    }

    pub fn to_gemini(self) -> &'static str {
        match self {
            FinishReason::Stop | FinishReason::ToolCalls => "STOP",
            FinishReason::Length => "MAX_TOKENS",
            FinishReason::ContentFilter => "SAFETY",
            FinishReason::Unknown => "OTHER",
        }
    }

    /// Claude `stop_reason` -> IR.
    pub fn from_claude(reason: &str) -> Self {
        match reason {
            "end_turn" | "stop_sequence" => FinishReason::Stop,
            "max_tokens" => FinishReason::Length,
            "tool_use" => FinishReason::ToolCalls,
            _ => FinishReason::Unknown,
        }
    }

    pub fn to_claude(self) -> &'static str {
        match self {
            FinishReason::Length => "max_tokens",
            FinishReason::ToolCalls => "tool_use",
            _ => "end_turn",
        }
    }

    /// OpenAI `finish_reason` -> IR.
    pub fn from_openai(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_calls" | "function_call" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        }
    }

    pub fn to_openai(self) -> &'static str {
        match self {
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::ContentFilter => "content_filter",
            _ => "stop",
        }
    }
}

/// Discriminator for streaming events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Token,
    Reasoning,
    ReasoningSummary,
    ToolCall,
    ToolCallDelta,
    Image,
    Finish,
    Error,
}

/// One streaming event in the IR.
///
/// A flat struct with a discriminator rather than a payload-per-variant
/// enum: most fields are shared across kinds (signatures, usage, indices)
/// and the state machine mutates events in place as it relabels them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedEvent {
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reasoning_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImagePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
    /// Source-side output index; the state machine linearises it.
    #[serde(default)]
    pub tool_call_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refusal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_filter: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system_fingerprint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl Default for UnifiedEvent {
    fn default() -> Self {
        Self {
            kind: EventKind::Token,
            content: String::new(),
            reasoning: String::new(),
            reasoning_summary: String::new(),
            tool_call: None,
            image: None,
            usage: None,
            finish_reason: None,
            thought_signature: None,
            tool_call_index: 0,
            logprobs: None,
            refusal: String::new(),
            content_filter: None,
            system_fingerprint: String::new(),
            error: String::new(),
        }
    }
}

impl UnifiedEvent {
    pub fn token(content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Token,
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Reasoning,
            reasoning: text.into(),
            ..Default::default()
        }
    }

    pub fn tool_call(tc: ToolCall) -> Self {
        Self {
            kind: EventKind::ToolCall,
            tool_call: Some(tc),
            ..Default::default()
        }
    }

    pub fn finish(reason: FinishReason, usage: Option<Usage>) -> Self {
        Self {
            kind: EventKind::Finish,
            finish_reason: Some(reason),
            usage,
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            error: message.into(),
            ..Default::default()
        }
    }

    /// Whether the event carries anything a client would see.
    pub fn has_visible_content(&self) -> bool {
        !self.content.is_empty() || !self.reasoning.is_empty() || self.tool_call.is_some()
    }
}
