// Emitters: IR -> provider wire formats.
//
// One module per protocol. Each exposes request conversion
// (UnifiedRequest -> bytes), a non-streaming response builder
// (messages + usage -> bytes) and a chunk builder (event -> bytes),
// with explicit per-stream state where the wire format needs it.

pub mod antigravity;
pub mod claude;
pub mod codex;
pub mod gemini;
pub mod kiro;
pub mod ollama;
pub mod openai;

use serde_json::{json, Value};

use llm_relay_types::{FinishReason, Message, Role, ToolCall, Usage};

use crate::util::ids::encode_tool_id_with_signature;

/// Read-only view over parsed response messages used by the non-streaming
/// response builders.
pub struct ResponseBuilder<'a> {
    messages: &'a [Message],
    usage: Option<&'a Usage>,
}

impl<'a> ResponseBuilder<'a> {
    pub fn new(messages: &'a [Message], usage: Option<&'a Usage>) -> Self {
        Self { messages, usage }
    }

    pub fn has_content(&self) -> bool {
        self.messages
            .iter()
            .any(|m| !m.content.is_empty() || !m.tool_calls.is_empty())
    }

    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    pub fn text_content(&self) -> String {
        self.last_assistant()
            .map(Message::combined_text)
            .unwrap_or_default()
    }

    pub fn reasoning_content(&self) -> String {
        self.last_assistant()
            .map(Message::combined_reasoning)
            .unwrap_or_default()
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        self.last_assistant()
            .map(|m| m.tool_calls.as_slice())
            .unwrap_or(&[])
    }

    /// OpenAI-shaped tool_calls array, signatures encoded into the IDs.
    pub fn openai_tool_calls(&self) -> Option<Value> {
        let calls = self.tool_calls();
        if calls.is_empty() {
            return None;
        }
        Some(Value::Array(
            calls
                .iter()
                .map(|tc| {
                    let id = encode_tool_id_with_signature(
                        &tc.id,
                        tc.thought_signature.as_deref().unwrap_or(""),
                    );
                    json!({
                        "id": id,
                        "type": "function",
                        "function": {"name": tc.name, "arguments": tc.args}
                    })
                })
                .collect(),
        ))
    }

    pub fn finish_reason(&self) -> FinishReason {
        if self.tool_calls().is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        }
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.usage
    }

    /// OpenAI-shaped usage object.
    pub fn openai_usage(&self) -> Option<Value> {
        let usage = self.usage?;
        Some(json!({
            "prompt_tokens": usage.prompt_tokens,
            "completion_tokens": usage.completion_tokens,
            "total_tokens": usage.total_tokens,
        }))
    }
}

/// Current unix time in seconds.
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_relay_types::ContentPart;

    #[test]
    fn test_builder_last_assistant_views() {
        let mut assistant = Message::assistant("body");
        assistant
            .content
            .insert(0, ContentPart::reasoning("think", None));
        assistant.tool_calls.push(ToolCall::new("f-1", "f", "{}"));
        let messages = vec![Message::user("q"), assistant];
        let usage = Usage {
            prompt_tokens: 1,
            completion_tokens: 2,
            total_tokens: 3,
            ..Default::default()
        };
        let builder = ResponseBuilder::new(&messages, Some(&usage));
        assert!(builder.has_content());
        assert_eq!(builder.text_content(), "body");
        assert_eq!(builder.reasoning_content(), "think");
        assert_eq!(builder.finish_reason(), FinishReason::ToolCalls);
        assert_eq!(builder.openai_usage().unwrap()["total_tokens"], 3);
    }

    #[test]
    fn test_builder_encodes_signature_into_tool_id() {
        let mut assistant = Message::assistant("");
        assistant.tool_calls.push(ToolCall {
            id: "f-1".into(),
            name: "f".into(),
            args: "{}".into(),
            thought_signature: Some("sig".into()),
            ..Default::default()
        });
        let messages = vec![assistant];
        let builder = ResponseBuilder::new(&messages, None);
        let calls = builder.openai_tool_calls().unwrap();
        assert_eq!(calls[0]["id"], "f-1|sig:sig");
    }
}
