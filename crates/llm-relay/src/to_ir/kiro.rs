// Kiro (Amazon Q) parsers. Kiro responses arrive as JSON documents or
// EventStream frames; reasoning may come as dedicated events, inline
// <thinking> tags that straddle chunk boundaries, or bracketed
// `[Called name with args: {...}]` spans embedded in free text.

use std::collections::HashSet;

use serde_json::Value;

use llm_relay_types::{
    ContentPart, Error, EventKind, FinishReason, Message, Role, ToolCall, UnifiedEvent, Usage,
};

use super::openai::{int_at, str_at};
use crate::util::ids::generate_uuid;
use crate::util::text::{find_matching_bracket, repair_json};

const THINKING_START_TAG: &str = "<thinking>";
const THINKING_END_TAG: &str = "</thinking>";

/// Rewrite Kiro `tooluse_…` IDs into the `call_…` shape clients expect.
fn convert_tool_id(id: &str) -> String {
    match id.strip_prefix("tooluse_") {
        Some(rest) => format!("call_{rest}"),
        None => id.to_string(),
    }
}

/// Parse a non-streaming Kiro response.
pub fn parse_kiro_response(raw: &[u8]) -> Result<(Vec<Message>, Option<Usage>), Error> {
    let root: Value = serde_json::from_slice(raw)?;

    let resp = root
        .get("conversationState")
        .and_then(|cs| cs.get("currentMessage"))
        .and_then(|cm| cm.get("assistantResponseMessage"))
        .or_else(|| root.get("assistantResponseMessage"));
    let Some(resp) = resp else {
        return Ok((Vec::new(), None));
    };

    let mut message = Message {
        role: Role::Assistant,
        ..Default::default()
    };

    let content = str_at(resp, "content");
    if !content.is_empty() {
        let (clean, thinking) = extract_thinking_from_content(content);
        if !thinking.is_empty() {
            message.content.push(ContentPart::reasoning(thinking, None));
        }
        if !clean.is_empty() {
            message.content.push(ContentPart::text(clean));
        }
    }

    if let Some(Value::Array(tools)) = resp.get("toolUsages") {
        for tool in tools {
            message.tool_calls.push(ToolCall {
                id: convert_tool_id(str_at(tool, "toolUseId")),
                name: str_at(tool, "name").to_string(),
                args: kiro_input_string(tool.get("input")),
                ..Default::default()
            });
        }
    }

    if message.content.is_empty() && message.tool_calls.is_empty() {
        return Ok((Vec::new(), None));
    }
    Ok((vec![message], None))
}

fn kiro_input_string(input: Option<&Value>) -> String {
    match input {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(_)) | Some(Value::Array(_)) => {
            input.map(|v| v.to_string()).unwrap_or_default()
        }
        _ => String::new(),
    }
}

/// Split content into (clean text, thinking text) around complete
/// `<thinking>` tag pairs; an unterminated tag swallows the tail.
fn extract_thinking_from_content(content: &str) -> (String, String) {
    if !content.contains(THINKING_START_TAG) {
        return (content.to_string(), String::new());
    }
    let mut clean = String::new();
    let mut thinking = String::new();
    let mut remaining = content;

    while !remaining.is_empty() {
        let Some(start) = remaining.find(THINKING_START_TAG) else {
            clean.push_str(remaining);
            break;
        };
        clean.push_str(&remaining[..start]);
        remaining = &remaining[start + THINKING_START_TAG.len()..];
        match remaining.find(THINKING_END_TAG) {
            Some(end) => {
                thinking.push_str(&remaining[..end]);
                remaining = &remaining[end + THINKING_END_TAG.len()..];
            }
            None => {
                thinking.push_str(remaining);
                break;
            }
        }
    }

    (clean.trim().to_string(), thinking.trim().to_string())
}

/// Cross-chunk streaming state.
#[derive(Debug, Default)]
pub struct KiroStreamState {
    pub usage: Option<Usage>,
    current_tool_id: String,
    current_tool_input: String,
    tool_calls: Vec<ToolCall>,
    seen_tool_ids: HashSet<String>,
    in_thinking_block: bool,
    pub accumulated_content: String,
    pub accumulated_thinking: String,
}

impl KiroStreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one Kiro stream frame.
    pub fn process_chunk(&mut self, raw: &[u8]) -> Result<Vec<UnifiedEvent>, Error> {
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        let Ok(root) = serde_json::from_slice::<Value>(raw) else {
            // EventStream framing noise between JSON payloads.
            return Ok(Vec::new());
        };

        self.parse_usage(&root);

        if let Some(events) = self.process_reasoning_event(&root) {
            return Ok(events);
        }
        if root.get("toolUseId").is_some() && root.get("name").is_some() {
            return Ok(self.process_tool_event(&root));
        }
        Ok(self.process_regular_events(&root))
    }

    /// Tool calls seen so far; drives finish-reason synthesis.
    pub fn determine_finish_reason(&self) -> FinishReason {
        if self.tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        }
    }

    fn parse_usage(&mut self, root: &Value) {
        let node = match root.get("supplementaryWebLinksEvent") {
            Some(node) => node,
            None if root.get("inputTokens").is_some() || root.get("outputTokens").is_some() => {
                root
            }
            None => return,
        };
        let input = int_at(node, "inputTokens");
        let output = int_at(node, "outputTokens");
        if input > 0 || output > 0 {
            self.usage = Some(Usage {
                prompt_tokens: input,
                completion_tokens: output,
                total_tokens: input + output,
                ..Default::default()
            });
        }
    }

    fn process_reasoning_event(&mut self, root: &Value) -> Option<Vec<UnifiedEvent>> {
        let content = if let Some(reasoning) = root.get("reasoningContentEvent") {
            str_at(reasoning, "content").to_string()
        } else if let Some(reasoning) = root.get("reasoningContent") {
            reasoning.as_str().unwrap_or("").to_string()
        } else {
            return None;
        };
        let mut events = Vec::new();
        if !content.is_empty() {
            self.accumulated_thinking.push_str(&content);
            events.push(UnifiedEvent::reasoning(content));
        }
        Some(events)
    }

    fn process_tool_event(&mut self, root: &Value) -> Vec<UnifiedEvent> {
        let id = convert_tool_id(str_at(root, "toolUseId"));
        let name = str_at(root, "name").to_string();
        let mut events = Vec::new();

        let is_new_tool = self.current_tool_id != id;
        let tool_index = self.tool_calls.len();
        if is_new_tool {
            self.current_tool_id = id.clone();
            self.current_tool_input.clear();
        }

        let input_delta = kiro_input_string(root.get("input"));
        self.current_tool_input.push_str(&input_delta);

        if is_new_tool {
            events.push(UnifiedEvent {
                kind: EventKind::ToolCall,
                tool_call: Some(ToolCall::new(id.clone(), name.clone(), input_delta)),
                tool_call_index: tool_index,
                ..Default::default()
            });
        } else if !input_delta.is_empty() {
            events.push(UnifiedEvent {
                kind: EventKind::ToolCallDelta,
                tool_call: Some(ToolCall {
                    args: input_delta,
                    ..Default::default()
                }),
                tool_call_index: tool_index,
                ..Default::default()
            });
        }

        if root.get("stop").and_then(Value::as_bool) == Some(true) {
            let mut args = std::mem::take(&mut self.current_tool_input);
            if args.is_empty() {
                args = "{}".to_string();
            }
            self.tool_calls.push(ToolCall::new(id, name, args));
            events.push(UnifiedEvent {
                kind: EventKind::ToolCallDelta,
                tool_call: Some(ToolCall {
                    is_complete: true,
                    ..Default::default()
                }),
                tool_call_index: tool_index,
                ..Default::default()
            });
            self.current_tool_id.clear();
        }

        events
    }

    fn process_regular_events(&mut self, root: &Value) -> Vec<UnifiedEvent> {
        let mut events = Vec::new();
        let data = root
            .get("assistantResponseEvent")
            .or_else(|| root.get("completionEvent"))
            .or_else(|| root.get("chatResponseEvent"))
            .or_else(|| root.get("message"))
            .unwrap_or(root);

        let content = str_at(data, "content");
        if !content.is_empty() {
            let (text_events, thinking_events) = self.process_content_with_thinking(content);
            events.extend(thinking_events);
            events.extend(text_events);
        }

        if let Some(Value::Array(tools)) = data.get("toolUsages") {
            for tool in tools {
                let tc = ToolCall {
                    id: convert_tool_id(str_at(tool, "toolUseId")),
                    name: str_at(tool, "name").to_string(),
                    args: kiro_input_string(tool.get("input")),
                    ..Default::default()
                };
                if self.seen_tool_ids.insert(tc.id.clone()) {
                    self.tool_calls.push(tc.clone());
                    events.push(UnifiedEvent::tool_call(tc));
                }
            }
        }
        events
    }

    /// Split content into text and thinking events, honouring a
    /// `<thinking>` tag left open by a previous chunk.
    fn process_content_with_thinking(
        &mut self,
        content: &str,
    ) -> (Vec<UnifiedEvent>, Vec<UnifiedEvent>) {
        let mut text_events = Vec::new();
        let mut thinking_events = Vec::new();
        let mut remaining = content;

        while !remaining.is_empty() {
            if self.in_thinking_block {
                match remaining.find(THINKING_END_TAG) {
                    Some(end) => {
                        let thinking = &remaining[..end];
                        if !thinking.is_empty() {
                            self.accumulated_thinking.push_str(thinking);
                            thinking_events.push(UnifiedEvent::reasoning(thinking));
                        }
                        self.in_thinking_block = false;
                        remaining = &remaining[end + THINKING_END_TAG.len()..];
                    }
                    None => {
                        self.accumulated_thinking.push_str(remaining);
                        thinking_events.push(UnifiedEvent::reasoning(remaining));
                        break;
                    }
                }
            } else {
                match remaining.find(THINKING_START_TAG) {
                    Some(start) => {
                        let before = &remaining[..start];
                        self.emit_text_span(before, &mut text_events);
                        self.in_thinking_block = true;
                        remaining = &remaining[start + THINKING_START_TAG.len()..];
                    }
                    None => {
                        self.emit_text_span(remaining, &mut text_events);
                        break;
                    }
                }
            }
        }

        (text_events, thinking_events)
    }

    fn emit_text_span(&mut self, span: &str, events: &mut Vec<UnifiedEvent>) {
        if span.is_empty() {
            return;
        }
        let (clean, embedded) = parse_embedded_tool_calls(span);
        if !clean.is_empty() {
            self.accumulated_content.push_str(&clean);
            events.push(UnifiedEvent::token(clean));
        }
        for tc in embedded {
            if self.seen_tool_ids.insert(tc.id.clone()) {
                self.tool_calls.push(tc.clone());
                events.push(UnifiedEvent::tool_call(tc));
            }
        }
    }
}

/// Extract `[Called <name> with args: {...}]` spans from text. Returns the
/// cleaned text plus the recovered tool calls, deduped by (name, args).
pub fn parse_embedded_tool_calls(text: &str) -> (String, Vec<ToolCall>) {
    if !text.contains("[Called") {
        return (text.to_string(), Vec::new());
    }

    let mut tool_calls = Vec::new();
    let mut clean_text = text.to_string();
    let mut processed: HashSet<String> = HashSet::new();

    let matches = find_called_spans(text);
    for (match_start, name, json_start) in matches.into_iter().rev() {
        let Some(json_end) = find_matching_bracket(text, json_start) else {
            continue;
        };
        let json_str = &text[json_start..=json_end];

        // The span runs to the closing ']' after the JSON body.
        let Some(rel_close) = text[json_end + 1..].find(']') else {
            continue;
        };
        let close = json_end + 1 + rel_close;
        let full_match = &text[match_start..=close];

        let repaired = repair_json(json_str);
        if serde_json::from_str::<Value>(&repaired).is_err() {
            continue;
        }

        let dedupe_key = format!("{name}:{repaired}");
        if !processed.insert(dedupe_key) {
            clean_text = clean_text.replacen(full_match, "", 1);
            continue;
        }

        tool_calls.push(ToolCall::new(
            format!("call_{}", &generate_uuid()[..12]),
            name,
            repaired,
        ));
        clean_text = clean_text.replacen(full_match, "", 1);
    }

    tool_calls.reverse();
    (clean_text.trim().to_string(), tool_calls)
}

/// Locate `[Called <name> with args:` heads. Returns
/// (match start, tool name, JSON start) per occurrence.
fn find_called_spans(text: &str) -> Vec<(usize, String, usize)> {
    let mut spans = Vec::new();
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find("[Called") {
        let match_start = search_from + rel;
        let after_head = match_start + "[Called".len();
        search_from = after_head;

        let rest = &text[after_head..];
        let name_start = match rest.find(|c: char| !c.is_whitespace()) {
            Some(off) => after_head + off,
            None => break,
        };
        let name_end = text[name_start..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .map(|off| name_start + off)
            .unwrap_or(text.len());
        if name_end == name_start {
            continue;
        }
        let name = &text[name_start..name_end];

        let tail = &text[name_end..];
        let Some(with_off) = tail.find("with") else { continue };
        let after_with = &tail[with_off + "with".len()..];
        let Some(args_off) = after_with.find("args:") else { continue };
        let mut json_start = name_end + with_off + "with".len() + args_off + "args:".len();
        while json_start < text.len()
            && matches!(text.as_bytes()[json_start], b' ' | b'\t')
        {
            json_start += 1;
        }
        if json_start >= text.len() || text.as_bytes()[json_start] != b'{' {
            continue;
        }
        spans.push((match_start, name.to_string(), json_start));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_embedded_tool_call_extraction() {
        let text = "OK. [Called search with args: {q: 'cats', limit: 3}] done.";
        let (clean, calls) = parse_embedded_tool_calls(text);
        assert_eq!(clean, "OK.  done.");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
        let args: Value = serde_json::from_str(&calls[0].args).unwrap();
        assert_eq!(args["q"], "cats");
        assert_eq!(args["limit"], 3);
        assert!(calls[0].id.starts_with("call_"));
    }

    #[test]
    fn test_embedded_tool_call_dedupe() {
        let text = "[Called f with args: {a: 1}] and again [Called f with args: {a: 1}]";
        let (_, calls) = parse_embedded_tool_calls(text);
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn test_embedded_tool_call_no_match_passthrough() {
        let (clean, calls) = parse_embedded_tool_calls("plain text");
        assert_eq!(clean, "plain text");
        assert!(calls.is_empty());
    }

    #[test]
    fn test_response_with_thinking_tags() {
        let raw = json!({
            "assistantResponseMessage": {
                "content": "<thinking>plan it</thinking>the answer",
                "toolUsages": [{"toolUseId": "tooluse_ab12", "name": "run",
                    "input": {"x": 1}}]
            }
        });
        let (messages, _) = parse_kiro_response(raw.to_string().as_bytes()).unwrap();
        let msg = &messages[0];
        assert_eq!(msg.combined_reasoning(), "plan it");
        assert_eq!(msg.combined_text(), "the answer");
        assert_eq!(msg.tool_calls[0].id, "call_ab12");
    }

    #[test]
    fn test_stream_thinking_across_chunks() {
        let mut state = KiroStreamState::new();
        let first = json!({"assistantResponseEvent": {"content": "before <thinking>part one"}});
        let events = state.process_chunk(first.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].content, "before ");
        assert_eq!(events[0].reasoning, "part one");

        let second = json!({"assistantResponseEvent": {"content": " part two</thinking>after"}});
        let events = state.process_chunk(second.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].reasoning, " part two");
        assert_eq!(events[1].content, "after");
        assert_eq!(state.accumulated_thinking, "part one part two");
    }

    #[test]
    fn test_stream_tool_event_accumulation() {
        let mut state = KiroStreamState::new();
        let first = json!({"toolUseId": "tooluse_1", "name": "f", "input": "{\"a\":"});
        let events = state.process_chunk(first.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].kind, EventKind::ToolCall);
        assert_eq!(events[0].tool_call.as_ref().unwrap().id, "call_1");

        let second = json!({"toolUseId": "tooluse_1", "name": "f", "input": "1}", "stop": true});
        let events = state.process_chunk(second.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::ToolCallDelta);
        assert!(events[1].tool_call.as_ref().unwrap().is_complete);
        assert_eq!(state.determine_finish_reason(), FinishReason::ToolCalls);
    }

    #[test]
    fn test_stream_reasoning_content_event() {
        let mut state = KiroStreamState::new();
        let chunk = json!({"reasoningContentEvent": {"content": "deep thought"}});
        let events = state.process_chunk(chunk.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].kind, EventKind::Reasoning);
        assert_eq!(state.accumulated_thinking, "deep thought");
    }

    #[test]
    fn test_stream_usage_capture() {
        let mut state = KiroStreamState::new();
        let chunk = json!({"inputTokens": 10, "outputTokens": 4});
        state.process_chunk(chunk.to_string().as_bytes()).unwrap();
        let usage = state.usage.as_ref().unwrap();
        assert_eq!(usage.total_tokens, 14);
    }
}
