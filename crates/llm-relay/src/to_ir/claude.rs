// Claude Messages parsers: requests, responses, and the typed SSE stream.
// Streaming needs cross-chunk state: content blocks are index-addressed
// and tool-argument JSON arrives as fragments.

use std::collections::HashMap;

use serde_json::Value;

use llm_relay_types::{
    ContentPart, Error, EventKind, FinishReason, ImagePart, Message, Role, ThinkingConfig,
    ToolCall, ToolDefinition, ToolResultPart, UnifiedEvent, UnifiedRequest, Usage,
};

use super::openai::{int_at, str_at};
use crate::util::text::validate_and_normalize_json;

static NULL: Value = Value::Null;

/// Parse a Claude Messages request.
pub fn parse_claude_request(raw: &[u8]) -> Result<UnifiedRequest, Error> {
    let root: Value = serde_json::from_slice(raw)?;
    let mut req = UnifiedRequest {
        model: str_at(&root, "model").to_string(),
        temperature: root.get("temperature").and_then(Value::as_f64),
        top_p: root.get("top_p").and_then(Value::as_f64),
        top_k: root.get("top_k").and_then(Value::as_i64),
        max_tokens: root.get("max_tokens").and_then(Value::as_i64),
        ..Default::default()
    };

    if let Some(Value::Array(stops)) = root.get("stop_sequences") {
        req.stop_sequences
            .extend(stops.iter().filter_map(Value::as_str).map(str::to_string));
    }

    match root.get("system") {
        Some(Value::String(text)) if !text.is_empty() => {
            req.messages.push(Message::system(text.clone()));
        }
        Some(Value::Array(blocks)) => {
            let text: String = blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n");
            if !text.is_empty() {
                req.messages.push(Message::system(text));
            }
        }
        _ => {}
    }

    if let Some(thinking) = root.get("thinking") {
        if str_at(thinking, "type") == "enabled" {
            req.thinking = Some(ThinkingConfig {
                budget: thinking
                    .get("budget_tokens")
                    .and_then(Value::as_i64)
                    .unwrap_or(-1),
                include_thoughts: true,
                ..Default::default()
            });
        }
    }

    if let Some(Value::Array(tools)) = root.get("tools") {
        for tool in tools {
            let name = str_at(tool, "name");
            if name.is_empty() {
                continue;
            }
            let tool_type = str_at(tool, "type");
            let built_in = !tool_type.is_empty() && tool_type != "custom";
            req.tools.push(ToolDefinition {
                name: name.to_string(),
                description: str_at(tool, "description").to_string(),
                parameters: tool.get("input_schema").cloned(),
                is_built_in: built_in,
                ..Default::default()
            });
        }
    }

    if let Some(choice) = root.get("tool_choice") {
        req.tool_choice = match str_at(choice, "type") {
            "any" => "any".to_string(),
            "none" => "none".to_string(),
            "tool" => str_at(choice, "name").to_string(),
            _ => "auto".to_string(),
        };
    }

    if let Some(Value::Array(messages)) = root.get("messages") {
        for msg in messages {
            parse_claude_message(msg, &mut req.messages);
        }
    }

    Ok(req)
}

fn parse_claude_message(msg: &Value, out: &mut Vec<Message>) {
    let role = Role::from_wire(str_at(msg, "role"));
    let mut message = Message {
        role,
        ..Default::default()
    };
    let mut tool_results: Vec<ContentPart> = Vec::new();

    match msg.get("content") {
        Some(Value::String(text)) => {
            if !text.is_empty() {
                message.content.push(ContentPart::text(text.clone()));
            }
        }
        Some(Value::Array(blocks)) => {
            for block in blocks {
                match str_at(block, "type") {
                    "text" => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            if !text.is_empty() {
                                message.content.push(ContentPart::text(text));
                            }
                        }
                    }
                    "thinking" => {
                        message.content.push(ContentPart::Reasoning {
                            reasoning: str_at(block, "thinking").to_string(),
                            thought_signature: block
                                .get("signature")
                                .and_then(Value::as_str)
                                .filter(|s| !s.is_empty())
                                .map(str::to_string),
                        });
                    }
                    "tool_use" => {
                        let args = block
                            .get("input")
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "{}".to_string());
                        message.tool_calls.push(ToolCall {
                            id: str_at(block, "id").to_string(),
                            name: str_at(block, "name").to_string(),
                            args: validate_and_normalize_json(&args),
                            ..Default::default()
                        });
                    }
                    "tool_result" => {
                        tool_results.push(ContentPart::ToolResult {
                            tool_result: ToolResultPart {
                                tool_call_id: str_at(block, "tool_use_id").to_string(),
                                result: claude_tool_result_text(block.get("content")),
                                thought_signature: None,
                            },
                        });
                    }
                    "image" => {
                        if let Some(source) = block.get("source") {
                            message.content.push(ContentPart::Image {
                                image: ImagePart {
                                    mime_type: str_at(source, "media_type").to_string(),
                                    data: str_at(source, "data").to_string(),
                                    url: str_at(source, "url").to_string(),
                                },
                                thought_signature: None,
                            });
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }

    // Tool results ride on user messages in Claude; the IR keeps them on a
    // dedicated tool turn.
    if !tool_results.is_empty() {
        out.push(Message {
            role: Role::Tool,
            content: tool_results,
            ..Default::default()
        });
    }
    if !message.content.is_empty() || !message.tool_calls.is_empty() {
        out.push(message);
    }
}

fn claude_tool_result_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Parse a non-streaming Claude response.
pub fn parse_claude_response(raw: &[u8]) -> Result<(Vec<Message>, Option<Usage>), Error> {
    let root: Value = serde_json::from_slice(raw)?;
    let mut message = Message {
        role: Role::Assistant,
        ..Default::default()
    };

    if let Some(Value::Array(blocks)) = root.get("content") {
        for block in blocks {
            match str_at(block, "type") {
                "text" => {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        if !text.is_empty() {
                            message.content.push(ContentPart::text(text));
                        }
                    }
                }
                "thinking" => {
                    message.content.push(ContentPart::Reasoning {
                        reasoning: str_at(block, "thinking").to_string(),
                        thought_signature: block
                            .get("signature")
                            .and_then(Value::as_str)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string),
                    });
                }
                "tool_use" => {
                    let args = block
                        .get("input")
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "{}".to_string());
                    message.tool_calls.push(ToolCall {
                        id: str_at(block, "id").to_string(),
                        name: str_at(block, "name").to_string(),
                        args: validate_and_normalize_json(&args),
                        ..Default::default()
                    });
                }
                _ => {}
            }
        }
    }

    let usage = root.get("usage").map(|u| Usage {
        prompt_tokens: int_at(u, "input_tokens"),
        completion_tokens: int_at(u, "output_tokens"),
        total_tokens: int_at(u, "input_tokens") + int_at(u, "output_tokens"),
        cached_tokens: int_at(u, "cache_read_input_tokens"),
        ..Default::default()
    });

    let messages = if message.content.is_empty() && message.tool_calls.is_empty() {
        Vec::new()
    } else {
        vec![message]
    };
    Ok((messages, usage))
}

/// Cross-chunk state for the Claude SSE stream: block index -> block type,
/// block index -> linear tool index, and usage carried from message_start.
#[derive(Debug, Default)]
pub struct ClaudeChunkState {
    block_types: HashMap<usize, String>,
    block_tool_index: HashMap<usize, usize>,
    next_tool_index: usize,
    input_tokens: i64,
    pub message_id: String,
}

impl ClaudeChunkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one SSE frame (`event_type` from the `event:` field may be
    /// empty; the `type` inside the data wins).
    pub fn process_chunk(&mut self, raw: &[u8]) -> Result<Vec<UnifiedEvent>, Error> {
        let data = crate::util::text::extract_sse_data(raw);
        if data.is_empty() {
            return Ok(Vec::new());
        }
        if data == b"[DONE]" {
            return Ok(Vec::new());
        }
        let root: Value = serde_json::from_slice(data)?;
        let mut events = Vec::new();

        match str_at(&root, "type") {
            "message_start" => {
                if let Some(message) = root.get("message") {
                    self.message_id = str_at(message, "id").to_string();
                    if let Some(usage) = message.get("usage") {
                        self.input_tokens = int_at(usage, "input_tokens");
                    }
                }
            }
            "content_block_start" => {
                let index = root.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                let block = root.get("content_block").unwrap_or(&NULL);
                let block_type = str_at(block, "type").to_string();
                if block_type == "tool_use" {
                    let tool_index = self.next_tool_index;
                    self.next_tool_index += 1;
                    self.block_tool_index.insert(index, tool_index);
                    events.push(UnifiedEvent {
                        kind: EventKind::ToolCall,
                        tool_call: Some(ToolCall {
                            id: str_at(block, "id").to_string(),
                            name: str_at(block, "name").to_string(),
                            ..Default::default()
                        }),
                        tool_call_index: tool_index,
                        ..Default::default()
                    });
                }
                self.block_types.insert(index, block_type);
            }
            "content_block_delta" => {
                let index = root.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                let delta = root.get("delta").unwrap_or(&NULL);
                match str_at(delta, "type") {
                    "text_delta" => {
                        let text = str_at(delta, "text");
                        if !text.is_empty() {
                            events.push(UnifiedEvent::token(text));
                        }
                    }
                    "thinking_delta" => {
                        let text = str_at(delta, "thinking");
                        if !text.is_empty() {
                            events.push(UnifiedEvent::reasoning(text));
                        }
                    }
                    "signature_delta" => {
                        let sig = str_at(delta, "signature");
                        if !sig.is_empty() {
                            let mut event = UnifiedEvent::reasoning("");
                            event.thought_signature = Some(sig.to_string());
                            events.push(event);
                        }
                    }
                    "input_json_delta" => {
                        let fragment = str_at(delta, "partial_json");
                        if !fragment.is_empty() {
                            let tool_index =
                                self.block_tool_index.get(&index).copied().unwrap_or(0);
                            events.push(UnifiedEvent {
                                kind: EventKind::ToolCallDelta,
                                tool_call: Some(ToolCall {
                                    args: fragment.to_string(),
                                    ..Default::default()
                                }),
                                tool_call_index: tool_index,
                                ..Default::default()
                            });
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                let index = root.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                if let Some(tool_index) = self.block_tool_index.get(&index) {
                    events.push(UnifiedEvent {
                        kind: EventKind::ToolCallDelta,
                        tool_call: Some(ToolCall {
                            is_complete: true,
                            ..Default::default()
                        }),
                        tool_call_index: *tool_index,
                        ..Default::default()
                    });
                }
            }
            "message_delta" => {
                let reason = root
                    .get("delta")
                    .map(|d| str_at(d, "stop_reason"))
                    .unwrap_or("");
                if !reason.is_empty() {
                    let output_tokens = root
                        .get("usage")
                        .map(|u| int_at(u, "output_tokens"))
                        .unwrap_or(0);
                    let usage = Usage {
                        prompt_tokens: self.input_tokens,
                        completion_tokens: output_tokens,
                        total_tokens: self.input_tokens + output_tokens,
                        ..Default::default()
                    };
                    events.push(UnifiedEvent::finish(
                        FinishReason::from_claude(reason),
                        Some(usage),
                    ));
                }
            }
            "error" => {
                let message = root
                    .get("error")
                    .map(|e| str_at(e, "message").to_string())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "upstream stream error".to_string());
                events.push(UnifiedEvent::error(message));
            }
            // message_stop and ping carry nothing the IR needs.
            _ => {}
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request_full_surface() {
        let raw = json!({
            "model": "claude-sonnet-4",
            "max_tokens": 1024,
            "system": "be helpful",
            "thinking": {"type": "enabled", "budget_tokens": 2048},
            "tools": [{"name": "get_weather", "description": "d",
                "input_schema": {"type": "object", "properties": {}}}],
            "tool_choice": {"type": "tool", "name": "get_weather"},
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": [
                    {"type": "thinking", "thinking": "hmm", "signature": "sig"},
                    {"type": "text", "text": "checking"},
                    {"type": "tool_use", "id": "toolu-1", "name": "get_weather",
                     "input": {"city": "SF"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu-1", "content": "sunny"}
                ]}
            ]
        });
        let req = parse_claude_request(raw.to_string().as_bytes()).unwrap();
        assert_eq!(req.model, "claude-sonnet-4");
        assert_eq!(req.thinking.as_ref().unwrap().budget, 2048);
        assert_eq!(req.tool_choice, "get_weather");
        assert_eq!(req.messages.len(), 4);
        let assistant = &req.messages[2];
        assert_eq!(assistant.combined_reasoning(), "hmm");
        assert_eq!(assistant.tool_calls[0].id, "toolu-1");
        assert_eq!(req.messages[3].role, Role::Tool);
    }

    #[test]
    fn test_parse_response_blocks() {
        let raw = json!({
            "content": [
                {"type": "thinking", "thinking": "let me see", "signature": "s"},
                {"type": "text", "text": "42"},
                {"type": "tool_use", "id": "toolu-2", "name": "f", "input": {}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 9, "output_tokens": 3}
        });
        let (messages, usage) = parse_claude_response(raw.to_string().as_bytes()).unwrap();
        assert_eq!(messages[0].combined_text(), "42");
        assert_eq!(messages[0].tool_calls.len(), 1);
        let usage = usage.unwrap();
        assert_eq!(usage.total_tokens, 12);
    }

    #[test]
    fn test_stream_text_flow() {
        let mut state = ClaudeChunkState::new();
        let start = json!({"type": "message_start", "message":
            {"id": "msg_1", "usage": {"input_tokens": 5}}});
        assert!(state.process_chunk(start.to_string().as_bytes()).unwrap().is_empty());
        assert_eq!(state.message_id, "msg_1");

        let block = json!({"type": "content_block_start", "index": 0,
            "content_block": {"type": "text"}});
        assert!(state.process_chunk(block.to_string().as_bytes()).unwrap().is_empty());

        let delta = json!({"type": "content_block_delta", "index": 0,
            "delta": {"type": "text_delta", "text": "hi"}});
        let events = state.process_chunk(delta.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].content, "hi");

        let fin = json!({"type": "message_delta",
            "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 2}});
        let events = state.process_chunk(fin.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].kind, EventKind::Finish);
        assert_eq!(events[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(events[0].usage.as_ref().unwrap().total_tokens, 7);
    }

    #[test]
    fn test_stream_tool_use_flow() {
        let mut state = ClaudeChunkState::new();
        let start = json!({"type": "content_block_start", "index": 1,
            "content_block": {"type": "tool_use", "id": "toolu-3", "name": "f"}});
        let events = state.process_chunk(start.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].kind, EventKind::ToolCall);
        assert_eq!(events[0].tool_call_index, 0);

        let delta = json!({"type": "content_block_delta", "index": 1,
            "delta": {"type": "input_json_delta", "partial_json": "{\"a\":"}});
        let events = state.process_chunk(delta.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].kind, EventKind::ToolCallDelta);
        assert_eq!(events[0].tool_call.as_ref().unwrap().args, "{\"a\":");
        assert_eq!(events[0].tool_call_index, 0);

        let stop = json!({"type": "content_block_stop", "index": 1});
        let events = state.process_chunk(stop.to_string().as_bytes()).unwrap();
        assert!(events[0].tool_call.as_ref().unwrap().is_complete);
    }

    #[test]
    fn test_stream_thinking_and_signature() {
        let mut state = ClaudeChunkState::new();
        let delta = json!({"type": "content_block_delta", "index": 0,
            "delta": {"type": "thinking_delta", "thinking": "mull"}});
        let events = state.process_chunk(delta.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].reasoning, "mull");

        let sig = json!({"type": "content_block_delta", "index": 0,
            "delta": {"type": "signature_delta", "signature": "abc"}});
        let events = state.process_chunk(sig.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].thought_signature.as_deref(), Some("abc"));
    }

    #[test]
    fn test_stream_error_event() {
        let mut state = ClaudeChunkState::new();
        let err = json!({"type": "error", "error": {"message": "overloaded"}});
        let events = state.process_chunk(err.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].kind, EventKind::Error);
        assert_eq!(events[0].error, "overloaded");
    }
}
