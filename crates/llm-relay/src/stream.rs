// The per-stream state machine gluing upstream IR events to client
// chunks. One instance per upstream response; single-threaded by
// construction (the pipeline owns it).

use std::collections::HashMap;

use llm_relay_types::{Error, EventKind, FinishReason, UnifiedEvent, Usage};

use crate::from_ir;
use crate::from_ir::claude::ClaudeStreamState;
use crate::from_ir::openai::ResponsesStreamState;
use crate::translate::Format;

/// Cross-chunk state shared by every target protocol.
#[derive(Debug, Default)]
pub struct UnifiedStreamState {
    /// Claude SSE sub-state, used when the target is Claude.
    pub claude: ClaudeStreamState,
    /// Responses API sub-state, used when the target is the Responses API.
    pub responses: ResponsesStreamState,
    /// Accumulated reasoning characters for token estimation.
    reasoning_chars: usize,
    /// Whether any visible content has been observed.
    has_content: bool,
    /// Next linear tool-call index.
    next_tool_call_index: usize,
    /// Upstream output index -> linear tool-call index.
    output_index_map: HashMap<usize, usize>,
    /// Linear indices whose {id,name,type} header has been emitted.
    sent_header: HashMap<usize, bool>,
    /// Responses-API item_id -> client call_id.
    tool_call_id_map: HashMap<String, String>,
    finish_sent: bool,
}

impl UnifiedStreamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish_sent(&self) -> bool {
        self.finish_sent
    }

    /// Translate a batch of IR events into client chunks for `target`.
    ///
    /// Applies, in order: content tracking, reasoning accumulation,
    /// item_id/call_id reconciliation, output-index linearisation, finish
    /// normalisation (dedup, empty suppression, Stop->ToolCalls rewrite,
    /// reasoning-token estimation), and header dedup, then hands each
    /// event to the target's chunk builder.
    pub fn convert_events(
        &mut self,
        events: Vec<UnifiedEvent>,
        target: Format,
        model: &str,
        message_id: &str,
    ) -> Result<Vec<Vec<u8>>, Error> {
        let mut chunks: Vec<Vec<u8>> = Vec::new();

        for mut event in events {
            if event.has_visible_content() {
                self.has_content = true;
            }
            if event.kind == EventKind::Reasoning {
                self.reasoning_chars += event.reasoning.len();
            }

            // Reconcile Responses-API item ids with client call ids.
            if let Some(tc) = event.tool_call.as_mut() {
                if !tc.item_id.is_empty() && !tc.id.is_empty() {
                    self.tool_call_id_map
                        .insert(tc.item_id.clone(), tc.id.clone());
                } else if !tc.item_id.is_empty() && tc.id.is_empty() {
                    if let Some(call_id) = self.tool_call_id_map.get(&tc.item_id) {
                        tc.id = call_id.clone();
                    }
                }
            }

            // Linearise tool-call indices: upstream output indices count
            // reasoning/message items, clients expect 0,1,2,...
            let mut effective_index = event.tool_call_index;
            if matches!(event.kind, EventKind::ToolCall | EventKind::ToolCallDelta) {
                if let Some(mapped) = self.output_index_map.get(&event.tool_call_index) {
                    effective_index = *mapped;
                } else if event.kind == EventKind::ToolCall {
                    effective_index = self.next_tool_call_index;
                    self.output_index_map
                        .insert(event.tool_call_index, effective_index);
                    self.next_tool_call_index += 1;
                }
                event.tool_call_index = effective_index;
            }

            if event.kind == EventKind::Finish {
                if self.finish_sent {
                    continue;
                }
                if !self.has_content {
                    // Never emit an empty STOP.
                    continue;
                }
                self.finish_sent = true;

                if self.next_tool_call_index > 0
                    && event.finish_reason == Some(FinishReason::Stop)
                {
                    // Clients execute tools only on a tool_calls finish.
                    event.finish_reason = Some(FinishReason::ToolCalls);
                }

                if self.reasoning_chars > 0 {
                    let usage = event.usage.get_or_insert_with(Usage::default);
                    if usage.thoughts_token_count == 0 {
                        usage.thoughts_token_count = ((self.reasoning_chars + 2) / 3) as i64;
                    }
                }
            }

            // Headers {id, name, type} go out once per linear index;
            // deltas never carry them.
            match event.kind {
                EventKind::ToolCallDelta => {
                    if let Some(tc) = event.tool_call.as_mut() {
                        tc.id.clear();
                        tc.name.clear();
                    }
                }
                EventKind::ToolCall => {
                    let sent = self.sent_header.get(&effective_index).copied().unwrap_or(false);
                    if sent {
                        // Claude and the Responses family track blocks by
                        // index internally and still need names on reopen.
                        if !matches!(
                            target,
                            Format::Claude | Format::Responses | Format::Codex
                        ) {
                            if let Some(tc) = event.tool_call.as_mut() {
                                tc.id.clear();
                                tc.name.clear();
                            }
                        }
                    } else {
                        self.sent_header.insert(effective_index, true);
                    }
                }
                _ => {}
            }

            self.emit_chunk(&event, target, model, message_id, &mut chunks)?;
        }

        Ok(chunks)
    }

    fn emit_chunk(
        &mut self,
        event: &UnifiedEvent,
        target: Format,
        model: &str,
        message_id: &str,
        chunks: &mut Vec<Vec<u8>>,
    ) -> Result<(), Error> {
        match target {
            Format::OpenAI | Format::Cline => {
                if let Some(chunk) = from_ir::openai::to_openai_chunk(
                    event,
                    model,
                    message_id,
                    event.tool_call_index,
                    None,
                )? {
                    chunks.push(chunk);
                }
            }
            Format::Responses | Format::Codex => {
                for frame in
                    from_ir::openai::to_responses_api_chunk(event, &mut self.responses)?
                {
                    chunks.push(frame.into_bytes());
                }
            }
            Format::Claude => {
                let frames =
                    from_ir::claude::to_claude_sse(event, model, message_id, &mut self.claude)?;
                if !frames.is_empty() {
                    chunks.push(frames.into_bytes());
                }
            }
            Format::Ollama => {
                if let Some(chunk) = from_ir::ollama::to_ollama_chat_chunk(event, model)? {
                    chunks.push(chunk);
                }
            }
            Format::Gemini | Format::GeminiCli | Format::Antigravity | Format::AiStudio => {
                if let Some(chunk) = from_ir::gemini::to_gemini_chunk(event, model)? {
                    chunks.push(chunk);
                }
            }
            other => {
                return Err(Error::unsupported_translation("events", other.as_str()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_relay_types::ToolCall;
    use serde_json::Value;

    fn chunk_json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_streaming_finish_correctness() {
        // Token("hi") -> ToolCall -> Finish(Stop) on an OpenAI target:
        // the finish reason is rewritten to tool_calls and exactly one
        // finish chunk is produced.
        let mut state = UnifiedStreamState::new();
        let events = vec![
            UnifiedEvent::token("hi"),
            UnifiedEvent {
                kind: EventKind::ToolCall,
                tool_call: Some(ToolCall::new("f-1", "f", "{\"a\":1}")),
                ..Default::default()
            },
            UnifiedEvent::finish(
                FinishReason::Stop,
                Some(Usage {
                    prompt_tokens: 2,
                    completion_tokens: 3,
                    total_tokens: 5,
                    ..Default::default()
                }),
            ),
        ];
        let chunks = state
            .convert_events(events, Format::OpenAI, "m", "id")
            .unwrap();
        assert_eq!(chunks.len(), 3);

        let content = chunk_json(&chunks[0]);
        assert_eq!(content["choices"][0]["delta"]["content"], "hi");

        let tool = chunk_json(&chunks[1]);
        let tc = &tool["choices"][0]["delta"]["tool_calls"][0];
        assert_eq!(tc["id"], "f-1");
        assert_eq!(tc["type"], "function");
        assert_eq!(tc["function"]["name"], "f");
        assert_eq!(tc["function"]["arguments"], "{\"a\":1}");
        assert_eq!(tc["index"], 0);

        let finish = chunk_json(&chunks[2]);
        assert_eq!(finish["choices"][0]["finish_reason"], "tool_calls");
        assert_eq!(finish["usage"]["total_tokens"], 5);
    }

    #[test]
    fn test_duplicate_finish_suppressed() {
        let mut state = UnifiedStreamState::new();
        let chunks = state
            .convert_events(
                vec![
                    UnifiedEvent::token("x"),
                    UnifiedEvent::finish(FinishReason::Stop, None),
                    UnifiedEvent::finish(FinishReason::Stop, None),
                ],
                Format::OpenAI,
                "m",
                "id",
            )
            .unwrap();
        let finish_count = chunks
            .iter()
            .filter(|c| chunk_json(c)["choices"][0].get("finish_reason").map(|f| !f.is_null()).unwrap_or(false))
            .count();
        assert_eq!(finish_count, 1);
    }

    #[test]
    fn test_empty_stop_suppressed() {
        let mut state = UnifiedStreamState::new();
        let chunks = state
            .convert_events(
                vec![UnifiedEvent::finish(FinishReason::Stop, None)],
                Format::OpenAI,
                "m",
                "id",
            )
            .unwrap();
        assert!(chunks.is_empty());
        assert!(!state.finish_sent());
    }

    #[test]
    fn test_output_indices_linearised() {
        // Responses API output indices skip over reasoning/message items;
        // clients must see 0,1,2...
        let mut state = UnifiedStreamState::new();
        let events = vec![
            UnifiedEvent {
                kind: EventKind::ToolCall,
                tool_call: Some(ToolCall::new("a-1", "a", "")),
                tool_call_index: 2,
                ..Default::default()
            },
            UnifiedEvent {
                kind: EventKind::ToolCallDelta,
                tool_call: Some(ToolCall {
                    args: "{}".into(),
                    ..Default::default()
                }),
                tool_call_index: 2,
                ..Default::default()
            },
            UnifiedEvent {
                kind: EventKind::ToolCall,
                tool_call: Some(ToolCall::new("b-1", "b", "")),
                tool_call_index: 5,
                ..Default::default()
            },
        ];
        let chunks = state
            .convert_events(events, Format::OpenAI, "m", "id")
            .unwrap();
        let first = chunk_json(&chunks[0]);
        assert_eq!(first["choices"][0]["delta"]["tool_calls"][0]["index"], 0);
        let delta = chunk_json(&chunks[1]);
        assert_eq!(delta["choices"][0]["delta"]["tool_calls"][0]["index"], 0);
        let second = chunk_json(&chunks[2]);
        assert_eq!(second["choices"][0]["delta"]["tool_calls"][0]["index"], 1);
    }

    #[test]
    fn test_item_id_reconciliation() {
        let mut state = UnifiedStreamState::new();
        let register = UnifiedEvent {
            kind: EventKind::ToolCall,
            tool_call: Some(ToolCall {
                id: "call_1".into(),
                name: "f".into(),
                item_id: "fc_9".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        state
            .convert_events(vec![register], Format::OpenAI, "m", "id")
            .unwrap();

        // A later header-bearing event with only the item id resolves to
        // the registered call id.
        let lookup = UnifiedEvent {
            kind: EventKind::ToolCall,
            tool_call: Some(ToolCall {
                item_id: "fc_9".into(),
                args: "{\"a\":1}".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let chunks = state
            .convert_events(vec![lookup], Format::OpenAI, "m", "id")
            .unwrap();
        let tc = &chunk_json(&chunks[0])["choices"][0]["delta"]["tool_calls"][0];
        // Header already sent for index 0, so id/name are stripped.
        assert!(tc.get("id").is_none());
        assert_eq!(tc["function"]["arguments"], "{\"a\":1}");
    }

    #[test]
    fn test_header_sent_once_per_tool() {
        let mut state = UnifiedStreamState::new();
        let header = UnifiedEvent {
            kind: EventKind::ToolCall,
            tool_call: Some(ToolCall::new("f-1", "f", "")),
            ..Default::default()
        };
        let repeat = UnifiedEvent {
            kind: EventKind::ToolCall,
            tool_call: Some(ToolCall::new("f-1", "f", "{\"x\":1}")),
            ..Default::default()
        };
        let chunks = state
            .convert_events(vec![header, repeat], Format::OpenAI, "m", "id")
            .unwrap();
        let first = &chunk_json(&chunks[0])["choices"][0]["delta"]["tool_calls"][0];
        assert_eq!(first["id"], "f-1");
        let second = &chunk_json(&chunks[1])["choices"][0]["delta"]["tool_calls"][0];
        assert!(second.get("id").is_none());
        assert!(second["function"].get("name").is_none());
    }

    #[test]
    fn test_reasoning_token_estimation() {
        let mut state = UnifiedStreamState::new();
        let chunks = state
            .convert_events(
                vec![
                    UnifiedEvent::reasoning("123456789"),
                    UnifiedEvent::finish(FinishReason::Stop, None),
                ],
                Format::OpenAI,
                "m",
                "id",
            )
            .unwrap();
        let finish = chunk_json(chunks.last().unwrap());
        // ceil(9 chars / 3) = 3 estimated reasoning tokens.
        assert_eq!(
            finish["usage"]["completion_tokens_details"]["reasoning_tokens"],
            3
        );
    }

    #[test]
    fn test_claude_target_opens_message_once() {
        let mut state = UnifiedStreamState::new();
        let chunks = state
            .convert_events(
                vec![UnifiedEvent::token("a"), UnifiedEvent::token("b")],
                Format::Claude,
                "claude-sonnet-4",
                "msg_1",
            )
            .unwrap();
        let first = String::from_utf8(chunks[0].clone()).unwrap();
        let second = String::from_utf8(chunks[1].clone()).unwrap();
        assert!(first.contains("message_start"));
        assert!(!second.contains("message_start"));
    }
}
