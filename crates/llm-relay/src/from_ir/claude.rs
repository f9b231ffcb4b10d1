// Claude emitters: Messages request, non-streaming response, and the SSE
// event taxonomy (message_start, content_block_start/delta/stop,
// message_delta, message_stop) driven by ClaudeStreamState.

use serde_json::{json, Map, Value};

use llm_relay_types::{
    ContentPart, Error, EventKind, FinishReason, Message, Role, ToolDefinition, UnifiedEvent,
    UnifiedRequest, Usage,
};

use super::ResponseBuilder;
use crate::util::schema::clean_json_schema_for_claude;

const DEFAULT_MAX_TOKENS: i64 = 4096;

/// Convert a unified request to Claude Messages JSON.
pub fn convert_claude_request(req: &UnifiedRequest) -> Result<Vec<u8>, Error> {
    let mut body = Map::new();
    body.insert("model".into(), json!(req.model));
    // max_tokens is mandatory on this API.
    body.insert(
        "max_tokens".into(),
        json!(req.max_tokens.filter(|m| *m > 0).unwrap_or(DEFAULT_MAX_TOKENS)),
    );

    if let Some(t) = req.temperature {
        body.insert("temperature".into(), json!(t));
    }
    if let Some(p) = req.top_p {
        body.insert("top_p".into(), json!(p));
    }
    if let Some(k) = req.top_k {
        body.insert("top_k".into(), json!(k));
    }
    if !req.stop_sequences.is_empty() {
        body.insert("stop_sequences".into(), json!(req.stop_sequences));
    }

    let system: String = req
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(Message::combined_text)
        .collect::<Vec<_>>()
        .join("\n\n");
    if !system.is_empty() {
        body.insert("system".into(), json!(system));
    }

    if let Some(thinking) = req.thinking.as_ref() {
        if thinking.budget > 0 {
            body.insert(
                "thinking".into(),
                json!({"type": "enabled", "budget_tokens": thinking.budget}),
            );
        }
    }

    let mut messages: Vec<Value> = Vec::new();
    for msg in &req.messages {
        match msg.role {
            Role::System => {}
            Role::User => {
                if let Some(blocks) = build_claude_user_blocks(msg) {
                    messages.push(json!({"role": "user", "content": blocks}));
                }
            }
            Role::Assistant => {
                if let Some(blocks) = build_claude_assistant_blocks(msg) {
                    messages.push(json!({"role": "assistant", "content": blocks}));
                }
            }
            Role::Tool => {
                let blocks = build_claude_tool_result_blocks(msg);
                if !blocks.is_empty() {
                    messages.push(json!({"role": "user", "content": blocks}));
                }
            }
        }
    }
    body.insert("messages".into(), Value::Array(messages));

    if !req.tools.is_empty() {
        body.insert("tools".into(), build_claude_tools(&req.tools));
    }
    if !req.tool_choice.is_empty() {
        let choice = match req.tool_choice.as_str() {
            "auto" => json!({"type": "auto"}),
            "none" => json!({"type": "none"}),
            "required" | "any" => json!({"type": "any"}),
            name => json!({"type": "tool", "name": name}),
        };
        body.insert("tool_choice".into(), choice);
    }

    Ok(serde_json::to_vec(&Value::Object(body))?)
}

fn build_claude_tools(tools: &[ToolDefinition]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|t| {
                if t.is_built_in {
                    return json!({"type": t.name, "name": t.name});
                }
                let schema = match t.parameters.as_ref().and_then(Value::as_object) {
                    Some(schema) => {
                        let mut cleaned = schema.clone();
                        clean_json_schema_for_claude(&mut cleaned);
                        Value::Object(cleaned)
                    }
                    None => json!({"type": "object", "properties": {},
                        "additionalProperties": false,
                        "$schema": "http://json-schema.org/draft-07/schema#"}),
                };
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": schema,
                })
            })
            .collect(),
    )
}

fn build_claude_user_blocks(msg: &Message) -> Option<Vec<Value>> {
    let mut blocks: Vec<Value> = Vec::new();
    for part in &msg.content {
        match part {
            ContentPart::Text { text, .. } if !text.is_empty() => {
                blocks.push(json!({"type": "text", "text": text}));
            }
            ContentPart::Image { image, .. } => {
                blocks.push(json!({
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": image.mime_type,
                        "data": image.data,
                    }
                }));
            }
            _ => {}
        }
    }
    (!blocks.is_empty()).then_some(blocks)
}

fn build_claude_assistant_blocks(msg: &Message) -> Option<Vec<Value>> {
    let mut blocks: Vec<Value> = Vec::new();
    for part in &msg.content {
        match part {
            ContentPart::Reasoning {
                reasoning,
                thought_signature,
            } => {
                let mut block = json!({"type": "thinking", "thinking": reasoning});
                if let Some(sig) = thought_signature.as_deref().filter(|s| !s.is_empty()) {
                    block["signature"] = json!(sig);
                }
                blocks.push(block);
            }
            ContentPart::Text { text, .. } if !text.is_empty() => {
                blocks.push(json!({"type": "text", "text": text}));
            }
            _ => {}
        }
    }
    for tc in &msg.tool_calls {
        let input: Value = serde_json::from_str(&tc.args).unwrap_or_else(|_| json!({}));
        blocks.push(json!({
            "type": "tool_use",
            "id": tc.id,
            "name": tc.name,
            "input": input,
        }));
    }
    (!blocks.is_empty()).then_some(blocks)
}

fn build_claude_tool_result_blocks(msg: &Message) -> Vec<Value> {
    msg.content
        .iter()
        .filter_map(|part| match part {
            ContentPart::ToolResult { tool_result } => Some(json!({
                "type": "tool_result",
                "tool_use_id": tool_result.tool_call_id,
                "content": tool_result.result,
            })),
            _ => None,
        })
        .collect()
}

/// Build a non-streaming Claude Messages response.
pub fn to_claude_response(
    messages: &[Message],
    usage: Option<&Usage>,
    model: &str,
    message_id: &str,
) -> Result<Vec<u8>, Error> {
    let builder = ResponseBuilder::new(messages, usage);
    let mut content: Vec<Value> = Vec::new();

    if let Some(msg) = builder.last_assistant() {
        for part in &msg.content {
            match part {
                ContentPart::Reasoning {
                    reasoning,
                    thought_signature,
                } => {
                    let mut block = json!({"type": "thinking", "thinking": reasoning});
                    if let Some(sig) = thought_signature.as_deref() {
                        block["signature"] = json!(sig);
                    }
                    content.push(block);
                }
                ContentPart::Text { text, .. } if !text.is_empty() => {
                    content.push(json!({"type": "text", "text": text}));
                }
                _ => {}
            }
        }
        for tc in &msg.tool_calls {
            let input: Value = serde_json::from_str(&tc.args).unwrap_or_else(|_| json!({}));
            let id = if tc.id.is_empty() {
                crate::util::ids::gen_claude_tool_call_id()
            } else {
                tc.id.clone()
            };
            content.push(json!({
                "type": "tool_use",
                "id": id,
                "name": tc.name,
                "input": input,
            }));
        }
    }

    let response = json!({
        "id": message_id,
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": content,
        "stop_reason": builder.finish_reason().to_claude(),
        "stop_sequence": Value::Null,
        "usage": {
            "input_tokens": usage.map(|u| u.prompt_tokens).unwrap_or(0),
            "output_tokens": usage.map(|u| u.completion_tokens).unwrap_or(0),
        },
    });

    Ok(serde_json::to_vec(&response)?)
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    Text,
    Thinking,
    Tool,
}

/// Per-stream state for emitting the Claude SSE taxonomy.
#[derive(Debug, Default)]
pub struct ClaudeStreamState {
    pub model: String,
    pub message_id: String,
    started: bool,
    /// Index of the most recently opened block; valid once `block_opened`.
    block_index: usize,
    block_opened: bool,
    open_block: Option<OpenBlock>,
    /// Linear tool index -> SSE block index for that tool.
    tool_blocks: std::collections::HashMap<usize, usize>,
    finish_sent: bool,
}

impl ClaudeStreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close any open block and open a fresh one, returning its index.
    fn start_block(&mut self, kind: OpenBlock, content_block: Value, out: &mut String) -> usize {
        close_open_block(self, out);
        if self.block_opened {
            self.block_index += 1;
        }
        self.block_opened = true;
        self.open_block = Some(kind);
        let start = json!({
            "type": "content_block_start",
            "index": self.block_index,
            "content_block": content_block,
        });
        out.push_str(&claude_sse_frame("content_block_start", &start));
        self.block_index
    }
}

fn claude_sse_frame(event_type: &str, data: &Value) -> String {
    format!("event: {event_type}\ndata: {data}\n\n")
}

/// Convert one IR event into Claude SSE frames.
pub fn to_claude_sse(
    event: &UnifiedEvent,
    model: &str,
    message_id: &str,
    state: &mut ClaudeStreamState,
) -> Result<String, Error> {
    let mut out = String::new();

    if state.model.is_empty() {
        state.model = model.to_string();
    }
    if state.message_id.is_empty() {
        state.message_id = message_id.to_string();
    }

    if !state.started && event.kind != EventKind::Error {
        state.started = true;
        let start = json!({
            "type": "message_start",
            "message": {
                "id": state.message_id,
                "type": "message",
                "role": "assistant",
                "model": state.model,
                "content": [],
                "stop_reason": Value::Null,
                "usage": {"input_tokens": 0, "output_tokens": 0},
            },
        });
        out.push_str(&claude_sse_frame("message_start", &start));
    }

    match event.kind {
        EventKind::Token => {
            if state.open_block != Some(OpenBlock::Text) {
                state.start_block(OpenBlock::Text, json!({"type": "text", "text": ""}), &mut out);
            }
            let delta = json!({
                "type": "content_block_delta",
                "index": state.block_index,
                "delta": {"type": "text_delta", "text": event.content},
            });
            out.push_str(&claude_sse_frame("content_block_delta", &delta));
        }
        EventKind::Reasoning | EventKind::ReasoningSummary => {
            if state.open_block != Some(OpenBlock::Thinking) {
                state.start_block(
                    OpenBlock::Thinking,
                    json!({"type": "thinking", "thinking": ""}),
                    &mut out,
                );
            }
            let text = if event.kind == EventKind::Reasoning {
                &event.reasoning
            } else {
                &event.reasoning_summary
            };
            if !text.is_empty() {
                let delta = json!({
                    "type": "content_block_delta",
                    "index": state.block_index,
                    "delta": {"type": "thinking_delta", "thinking": text},
                });
                out.push_str(&claude_sse_frame("content_block_delta", &delta));
            }
            if let Some(sig) = event.thought_signature.as_deref().filter(|s| !s.is_empty()) {
                let delta = json!({
                    "type": "content_block_delta",
                    "index": state.block_index,
                    "delta": {"type": "signature_delta", "signature": sig},
                });
                out.push_str(&claude_sse_frame("content_block_delta", &delta));
            }
        }
        EventKind::ToolCall => {
            let Some(tc) = event.tool_call.as_ref() else {
                return Ok(out);
            };
            let tool_index = event.tool_call_index;
            if !state.tool_blocks.contains_key(&tool_index) {
                let block_index = state.start_block(
                    OpenBlock::Tool,
                    json!({"type": "tool_use", "id": tc.id, "name": tc.name, "input": {}}),
                    &mut out,
                );
                state.tool_blocks.insert(tool_index, block_index);
            }
            if !tc.args.is_empty() {
                let block_index = state.tool_blocks[&tool_index];
                let delta = json!({
                    "type": "content_block_delta",
                    "index": block_index,
                    "delta": {"type": "input_json_delta", "partial_json": tc.args},
                });
                out.push_str(&claude_sse_frame("content_block_delta", &delta));
            }
        }
        EventKind::ToolCallDelta => {
            let Some(tc) = event.tool_call.as_ref() else {
                return Ok(out);
            };
            let tool_index = event.tool_call_index;
            let block_index = state
                .tool_blocks
                .get(&tool_index)
                .copied()
                .unwrap_or(state.block_index);
            if !tc.args.is_empty() {
                let delta = json!({
                    "type": "content_block_delta",
                    "index": block_index,
                    "delta": {"type": "input_json_delta", "partial_json": tc.args},
                });
                out.push_str(&claude_sse_frame("content_block_delta", &delta));
            }
            if tc.is_complete {
                let stop = json!({"type": "content_block_stop", "index": block_index});
                out.push_str(&claude_sse_frame("content_block_stop", &stop));
                if state.open_block == Some(OpenBlock::Tool) && block_index == state.block_index {
                    state.open_block = None;
                }
            }
        }
        EventKind::Finish => {
            if state.finish_sent {
                return Ok(out);
            }
            state.finish_sent = true;
            close_open_block(state, &mut out);
            let reason = event.finish_reason.unwrap_or(FinishReason::Stop);
            let delta = json!({
                "type": "message_delta",
                "delta": {"stop_reason": reason.to_claude(), "stop_sequence": Value::Null},
                "usage": {
                    "output_tokens": event
                        .usage
                        .as_ref()
                        .map(|u| u.completion_tokens)
                        .unwrap_or(0),
                },
            });
            out.push_str(&claude_sse_frame("message_delta", &delta));
            out.push_str(&claude_sse_frame("message_stop", &json!({"type": "message_stop"})));
        }
        EventKind::Error => {
            let data = json!({
                "type": "error",
                "error": {"type": "api_error", "message": event.error},
            });
            out.push_str(&claude_sse_frame("error", &data));
        }
        _ => {}
    }

    Ok(out)
}

fn close_open_block(state: &mut ClaudeStreamState, out: &mut String) {
    if state.open_block.is_some() {
        let stop = json!({"type": "content_block_stop", "index": state.block_index});
        out.push_str(&claude_sse_frame("content_block_stop", &stop));
        state.open_block = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_relay_types::{ThinkingConfig, ToolCall};

    #[test]
    fn test_request_shape() {
        let mut req = UnifiedRequest {
            model: "claude-sonnet-4".into(),
            messages: vec![Message::system("be kind"), Message::user("hi")],
            max_tokens: Some(512),
            ..Default::default()
        };
        req.thinking = Some(ThinkingConfig {
            budget: 2048,
            include_thoughts: true,
            ..Default::default()
        });
        req.tools.push(ToolDefinition {
            name: "f".into(),
            description: "d".into(),
            parameters: Some(json!({"type": "object", "properties": {
                "mode": {"const": "fast"}}})),
            ..Default::default()
        });
        let bytes = convert_claude_request(&req).unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["model"], "claude-sonnet-4");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["system"], "be kind");
        assert_eq!(body["thinking"]["budget_tokens"], 2048);
        let schema = &body["tools"][0]["input_schema"];
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["properties"]["mode"]["enum"], json!(["fast"]));
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_request_tool_round_blocks() {
        let mut assistant = Message::assistant("checking");
        assistant
            .content
            .insert(0, ContentPart::reasoning("think", Some("sig".into())));
        assistant
            .tool_calls
            .push(ToolCall::new("toolu-1", "f", "{\"a\":1}"));
        let req = UnifiedRequest {
            model: "claude-sonnet-4".into(),
            messages: vec![
                Message::user("go"),
                assistant,
                Message::tool_result("toolu-1", "ok"),
            ],
            ..Default::default()
        };
        let bytes = convert_claude_request(&req).unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        let blocks = messages[1]["content"].as_array().unwrap();
        assert_eq!(blocks[0]["type"], "thinking");
        assert_eq!(blocks[0]["signature"], "sig");
        assert_eq!(blocks[2]["type"], "tool_use");
        assert_eq!(blocks[2]["input"]["a"], 1);
        let result = &messages[2]["content"][0];
        assert_eq!(result["type"], "tool_result");
        assert_eq!(result["tool_use_id"], "toolu-1");
    }

    #[test]
    fn test_response_stop_reason_tool_use() {
        let mut assistant = Message {
            role: Role::Assistant,
            ..Default::default()
        };
        assistant.tool_calls.push(ToolCall::new("toolu-2", "f", "{}"));
        let bytes = to_claude_response(&[assistant], None, "m", "msg_1").unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["stop_reason"], "tool_use");
        assert_eq!(body["content"][0]["type"], "tool_use");
    }

    #[test]
    fn test_sse_text_stream() {
        let mut state = ClaudeStreamState::new();
        let first = to_claude_sse(&UnifiedEvent::token("he"), "m", "msg_1", &mut state).unwrap();
        assert!(first.contains("message_start"));
        assert!(first.contains("content_block_start"));
        assert!(first.contains("text_delta"));

        let second = to_claude_sse(&UnifiedEvent::token("llo"), "m", "msg_1", &mut state).unwrap();
        // Same block: only a delta, message_start not repeated.
        assert!(!second.contains("message_start"));
        assert!(!second.contains("content_block_start"));
        assert!(second.contains("llo"));
    }

    #[test]
    fn test_sse_block_transitions() {
        let mut state = ClaudeStreamState::new();
        to_claude_sse(&UnifiedEvent::reasoning("mull"), "m", "msg_1", &mut state).unwrap();
        let text = to_claude_sse(&UnifiedEvent::token("out"), "m", "msg_1", &mut state).unwrap();
        // Thinking block closes before the text block opens.
        assert!(text.contains("content_block_stop"));
        assert!(text.contains("\"index\":1"));

        let tool = UnifiedEvent {
            kind: EventKind::ToolCall,
            tool_call: Some(ToolCall::new("toolu-3", "f", "{\"a\":1}")),
            ..Default::default()
        };
        let frames = to_claude_sse(&tool, "m", "msg_1", &mut state).unwrap();
        assert!(frames.contains("tool_use"));
        assert!(frames.contains("\"index\":2"));
        assert!(frames.contains("input_json_delta"));
    }

    #[test]
    fn test_sse_finish_closes_and_stops() {
        let mut state = ClaudeStreamState::new();
        to_claude_sse(&UnifiedEvent::token("x"), "m", "msg_1", &mut state).unwrap();
        let finish = to_claude_sse(
            &UnifiedEvent::finish(
                FinishReason::Stop,
                Some(Usage {
                    completion_tokens: 5,
                    ..Default::default()
                }),
            ),
            "m",
            "msg_1",
            &mut state,
        )
        .unwrap();
        assert!(finish.contains("content_block_stop"));
        assert!(finish.contains("\"stop_reason\":\"end_turn\""));
        assert!(finish.contains("\"output_tokens\":5"));
        assert!(finish.contains("message_stop"));

        // Duplicate finish suppressed.
        let again = to_claude_sse(
            &UnifiedEvent::finish(FinishReason::Stop, None),
            "m",
            "msg_1",
            &mut state,
        )
        .unwrap();
        assert!(!again.contains("message_delta"));
    }
}
