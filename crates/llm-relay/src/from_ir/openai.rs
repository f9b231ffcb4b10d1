// OpenAI emitters: Chat Completions and Responses API requests, responses
// and streaming chunks.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use llm_relay_types::{
    ContentPart, Error, EventKind, FinishReason, Message, ResponseMeta, Role, ThinkingConfig,
    ToolDefinition, UnifiedEvent, UnifiedRequest, Usage,
};

use super::{unix_now, ResponseBuilder};
use crate::util::ids::encode_tool_id_with_signature;

/// Which OpenAI request surface to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIRequestFormat {
    ChatCompletions,
    ResponsesApi,
}

/// Convert a unified request to Chat Completions JSON.
pub fn convert_openai_request(req: &UnifiedRequest) -> Result<Vec<u8>, Error> {
    convert_openai_request_fmt(req, OpenAIRequestFormat::ChatCompletions)
}

/// Convert a unified request to the chosen OpenAI surface.
pub fn convert_openai_request_fmt(
    req: &UnifiedRequest,
    format: OpenAIRequestFormat,
) -> Result<Vec<u8>, Error> {
    let body = match format {
        OpenAIRequestFormat::ChatCompletions => build_chat_completions_request(req),
        OpenAIRequestFormat::ResponsesApi => build_responses_request(req),
    };
    Ok(serde_json::to_vec(&body)?)
}

fn build_chat_completions_request(req: &UnifiedRequest) -> Value {
    let mut body = Map::new();
    body.insert("model".into(), json!(req.model));

    if let Some(t) = req.temperature {
        body.insert("temperature".into(), json!(t));
    }
    if let Some(p) = req.top_p {
        body.insert("top_p".into(), json!(p));
    }
    if let Some(m) = req.max_tokens {
        body.insert("max_tokens".into(), json!(m));
    }
    if !req.stop_sequences.is_empty() {
        body.insert("stop".into(), json!(req.stop_sequences));
    }
    if let Some(thinking) = req.thinking.as_ref() {
        if thinking.include_thoughts {
            body.insert(
                "reasoning_effort".into(),
                json!(ThinkingConfig::budget_to_effort(thinking.budget, "auto")),
            );
        }
    }

    let mut messages: Vec<Value> = Vec::new();
    for msg in &req.messages {
        if let Some(obj) = convert_message_to_openai(msg) {
            messages.push(obj);
        }
    }
    body.insert("messages".into(), Value::Array(messages));

    if !req.tools.is_empty() {
        body.insert("tools".into(), build_openai_tools(&req.tools));
    }
    if !req.tool_choice.is_empty() {
        body.insert("tool_choice".into(), encode_tool_choice(&req.tool_choice));
    }
    if let Some(ptc) = req.parallel_tool_calls {
        body.insert("parallel_tool_calls".into(), json!(ptc));
    }
    if !req.response_modality.is_empty() {
        body.insert("modalities".into(), json!(req.response_modality));
    }

    Value::Object(body)
}

fn encode_tool_choice(choice: &str) -> Value {
    match choice {
        "auto" | "none" | "required" => json!(choice),
        "any" => json!("required"),
        name => json!({"type": "function", "function": {"name": name}}),
    }
}

fn build_openai_tools(tools: &[ToolDefinition]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|t| {
                if t.is_built_in {
                    return json!({"type": t.name});
                }
                let params = t
                    .parameters
                    .clone()
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}}));
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": params,
                    }
                })
            })
            .collect(),
    )
}

fn convert_message_to_openai(msg: &Message) -> Option<Value> {
    match msg.role {
        Role::System => {
            let text = msg.combined_text();
            (!text.is_empty()).then(|| json!({"role": "system", "content": text}))
        }
        Role::User => build_openai_user_message(msg),
        Role::Assistant => Some(build_openai_assistant_message(msg)),
        Role::Tool => build_openai_tool_message(msg),
    }
}

fn build_openai_user_message(msg: &Message) -> Option<Value> {
    let mut parts: Vec<Value> = Vec::new();
    for part in &msg.content {
        match part {
            ContentPart::Text { text, .. } if !text.is_empty() => {
                parts.push(json!({"type": "text", "text": text}));
            }
            ContentPart::Image { image, .. } => {
                let url = if image.url.is_empty() {
                    format!("data:{};base64,{}", image.mime_type, image.data)
                } else {
                    image.url.clone()
                };
                parts.push(json!({"type": "image_url", "image_url": {"url": url}}));
            }
            _ => {}
        }
    }
    if parts.is_empty() {
        return None;
    }
    if parts.len() == 1 && parts[0]["type"] == "text" {
        return Some(json!({"role": "user", "content": parts[0]["text"]}));
    }
    Some(json!({"role": "user", "content": parts}))
}

fn build_openai_assistant_message(msg: &Message) -> Value {
    let mut result = json!({"role": "assistant"});
    let text = msg.combined_text();
    if !text.is_empty() {
        result["content"] = json!(text);
    }
    let reasoning = msg.combined_reasoning();
    if !reasoning.is_empty() {
        result["reasoning_content"] = json!(reasoning);
    }
    if !msg.tool_calls.is_empty() {
        let calls: Vec<Value> = msg
            .tool_calls
            .iter()
            .map(|tc| {
                // Signatures ride inside the ID so they survive clients
                // that strip custom fields.
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
            .collect();
        result["tool_calls"] = Value::Array(calls);
    }
    result
}

fn build_openai_tool_message(msg: &Message) -> Option<Value> {
    msg.content.iter().find_map(|part| match part {
        ContentPart::ToolResult { tool_result } => Some(json!({
            "role": "tool",
            "tool_call_id": tool_result.tool_call_id,
            "content": tool_result.result,
        })),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Responses API request
// ---------------------------------------------------------------------------

fn build_responses_request(req: &UnifiedRequest) -> Value {
    let mut body = Map::new();
    body.insert("model".into(), json!(req.model));

    // role:system is invalid inside input[]; system text is hoisted here.
    let instructions = if req.instructions.is_empty() {
        req.messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(Message::combined_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    } else {
        req.instructions.clone()
    };
    if !instructions.is_empty() {
        body.insert("instructions".into(), json!(instructions));
    }

    let custom_tools = custom_tool_names(req);
    let mut input: Vec<Value> = Vec::new();
    for msg in &req.messages {
        if msg.role == Role::System {
            continue;
        }
        input.extend(convert_message_to_responses_input(msg, &custom_tools));
    }
    if !input.is_empty() {
        body.insert("input".into(), Value::Array(input));
    }

    if let Some(thinking) = req.thinking.as_ref() {
        apply_responses_thinking(&mut body, thinking);
    }
    if !req.tools.is_empty() {
        body.insert("tools".into(), build_responses_tools(&req.tools));
    }
    if !req.tool_choice.is_empty() {
        body.insert("tool_choice".into(), encode_tool_choice(&req.tool_choice));
    }
    if !req.previous_response_id.is_empty() {
        body.insert("previous_response_id".into(), json!(req.previous_response_id));
    }
    if !req.prompt_id.is_empty() {
        apply_prompt_config(&mut body, req);
    }
    if !req.prompt_cache_key.is_empty() {
        body.insert("prompt_cache_key".into(), json!(req.prompt_cache_key));
    }

    if let Some(t) = req.temperature {
        body.insert("temperature".into(), json!(t));
    }
    if let Some(p) = req.top_p {
        body.insert("top_p".into(), json!(p));
    }
    if let Some(m) = req.max_tokens {
        body.insert("max_output_tokens".into(), json!(m));
    }
    if let Some(store) = req.store {
        body.insert("store".into(), json!(store));
    }
    if let Some(ptc) = req.parallel_tool_calls {
        body.insert("parallel_tool_calls".into(), json!(ptc));
    }

    Value::Object(body)
}

pub(crate) fn custom_tool_names(req: &UnifiedRequest) -> Vec<String> {
    let mut names: Vec<String> = req
        .tools
        .iter()
        .filter(|t| t.is_custom || t.parameters.is_none())
        .filter(|t| !t.is_built_in)
        .map(|t| t.name.clone())
        .collect();
    // apply_patch is always freeform.
    if !names.iter().any(|n| n == "apply_patch") {
        names.push("apply_patch".to_string());
    }
    names
}

pub(crate) fn apply_responses_thinking(body: &mut Map<String, Value>, thinking: &ThinkingConfig) {
    if !thinking.include_thoughts && thinking.effort.is_empty() && thinking.summary.is_empty() {
        return;
    }
    let mut reasoning = Map::new();
    if !thinking.effort.is_empty() {
        reasoning.insert("effort".into(), json!(thinking.effort));
    } else if thinking.include_thoughts {
        reasoning.insert(
            "effort".into(),
            json!(ThinkingConfig::budget_to_effort(thinking.budget, "low")),
        );
    }
    if !thinking.summary.is_empty() {
        reasoning.insert("summary".into(), json!(thinking.summary));
    }
    if !reasoning.is_empty() {
        body.insert("reasoning".into(), Value::Object(reasoning));
    }
}

pub(crate) fn apply_prompt_config(body: &mut Map<String, Value>, req: &UnifiedRequest) {
    let mut prompt = Map::new();
    prompt.insert("id".into(), json!(req.prompt_id));
    if !req.prompt_version.is_empty() {
        prompt.insert("version".into(), json!(req.prompt_version));
    }
    if let Some(vars) = req.prompt_variables.as_ref() {
        prompt.insert("variables".into(), vars.clone());
    }
    body.insert("prompt".into(), Value::Object(prompt));
}

pub(crate) fn build_responses_tools(tools: &[ToolDefinition]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|t| {
                if t.is_built_in {
                    return json!({"type": t.name});
                }
                if t.is_custom || t.parameters.is_none() {
                    let mut tool = json!({
                        "type": "custom",
                        "name": t.name,
                        "description": t.description,
                    });
                    if let Some(format) = t.format.as_ref() {
                        tool["format"] = format.clone();
                    }
                    return tool;
                }
                json!({
                    "type": "function",
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect(),
    )
}

/// Convert one message to Responses API input items. Assistant turns with
/// several tool calls fan out into one item per call.
pub(crate) fn convert_message_to_responses_input(
    msg: &Message,
    custom_tools: &[String],
) -> Vec<Value> {
    match msg.role {
        Role::System => Vec::new(),
        Role::User => build_responses_user_message(msg).into_iter().collect(),
        Role::Assistant => {
            let mut items = Vec::new();
            let text = msg.combined_text();
            if !text.is_empty() {
                items.push(json!({
                    "type": "message",
                    "role": "assistant",
                    "content": [{"type": "output_text", "text": text}],
                }));
            }
            for tc in &msg.tool_calls {
                let custom = tc.is_custom || custom_tools.iter().any(|n| n == &tc.name);
                if custom {
                    items.push(json!({
                        "type": "custom_tool_call",
                        "call_id": tc.id,
                        "name": tc.name,
                        "input": tc.args,
                    }));
                } else {
                    items.push(json!({
                        "type": "function_call",
                        "call_id": tc.id,
                        "name": tc.name,
                        "arguments": tc.args,
                    }));
                }
            }
            items
        }
        Role::Tool => msg
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolResult { tool_result } => {
                    // Tool names are unknown on the result side; label by
                    // whether the call id matches a known custom call.
                    Some(json!({
                        "type": "function_call_output",
                        "call_id": tool_result.tool_call_id,
                        "output": tool_result.result,
                    }))
                }
                _ => None,
            })
            .collect(),
    }
}

fn build_responses_user_message(msg: &Message) -> Option<Value> {
    let mut content: Vec<Value> = Vec::new();
    for part in &msg.content {
        match part {
            ContentPart::Text { text, .. } if !text.is_empty() => {
                content.push(json!({"type": "input_text", "text": text}));
            }
            ContentPart::Image { image, .. } => {
                let url = if image.url.is_empty() {
                    format!("data:{};base64,{}", image.mime_type, image.data)
                } else {
                    image.url.clone()
                };
                content.push(json!({"type": "input_image", "image_url": url}));
            }
            ContentPart::File { file } => {
                let mut item = json!({"type": "input_file"});
                if !file.file_id.is_empty() {
                    item["file_id"] = json!(file.file_id);
                }
                if !file.file_url.is_empty() {
                    item["file_url"] = json!(file.file_url);
                }
                if !file.filename.is_empty() {
                    item["filename"] = json!(file.filename);
                }
                if !file.file_data.is_empty() {
                    item["file_data"] = json!(file.file_data);
                }
                content.push(item);
            }
            _ => {}
        }
    }
    if content.is_empty() {
        return None;
    }
    Some(json!({"type": "message", "role": "user", "content": content}))
}

// ---------------------------------------------------------------------------
// Non-streaming responses
// ---------------------------------------------------------------------------

/// Build a `chat.completion` response from IR messages.
pub fn to_openai_chat_completion(
    messages: &[Message],
    usage: Option<&Usage>,
    model: &str,
    message_id: &str,
    meta: Option<&ResponseMeta>,
) -> Result<Vec<u8>, Error> {
    let builder = ResponseBuilder::new(messages, usage);
    let (response_id, created) = response_identity(message_id, meta);

    let mut response = json!({
        "id": response_id,
        "object": "chat.completion",
        "created": created,
        "model": model,
        "choices": [],
    });

    if builder.last_assistant().is_some() {
        let mut message = json!({"role": "assistant"});
        let text = builder.text_content();
        if !text.is_empty() {
            message["content"] = json!(text);
        }
        let reasoning = builder.reasoning_content();
        if !reasoning.is_empty() {
            message["reasoning_content"] = json!(reasoning);
        }
        if let Some(calls) = builder.openai_tool_calls() {
            message["tool_calls"] = calls;
        }

        let mut choice = json!({
            "index": 0,
            "finish_reason": builder.finish_reason().to_openai(),
            "message": message,
        });
        if let Some(native) = meta.map(|m| m.native_finish_reason.as_str()) {
            if !native.is_empty() {
                choice["native_finish_reason"] = json!(native);
            }
        }
        response["choices"] = json!([choice]);
    }

    if let Some(mut usage_obj) = builder.openai_usage() {
        let thoughts = meta
            .map(|m| m.thoughts_token_count)
            .filter(|t| *t > 0)
            .or_else(|| usage.map(|u| u.thoughts_token_count))
            .unwrap_or(0);
        if thoughts > 0 {
            usage_obj["completion_tokens_details"] = json!({"reasoning_tokens": thoughts});
        }
        response["usage"] = usage_obj;
    }

    Ok(serde_json::to_vec(&response)?)
}

fn response_identity(message_id: &str, meta: Option<&ResponseMeta>) -> (String, i64) {
    let mut id = message_id.to_string();
    let mut created = unix_now();
    if let Some(meta) = meta {
        if !meta.response_id.is_empty() {
            id = meta.response_id.clone();
        }
        if meta.create_time > 0 {
            created = meta.create_time;
        }
    }
    (id, created)
}

/// Build one `chat.completion.chunk` for an IR event. `tool_call_index` is
/// the linearised index assigned by the stream state machine.
pub fn to_openai_chunk(
    event: &UnifiedEvent,
    model: &str,
    message_id: &str,
    tool_call_index: usize,
    meta: Option<&ResponseMeta>,
) -> Result<Option<Vec<u8>>, Error> {
    let (response_id, created) = response_identity(message_id, meta);
    let mut chunk = json!({
        "id": response_id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [],
    });
    if !event.system_fingerprint.is_empty() {
        chunk["system_fingerprint"] = json!(event.system_fingerprint);
    }

    let mut choice = json!({"index": 0, "delta": {}});

    match event.kind {
        EventKind::Token => {
            let mut delta = json!({"role": "assistant"});
            if !event.content.is_empty() {
                delta["content"] = json!(event.content);
            }
            if !event.refusal.is_empty() {
                delta["refusal"] = json!(event.refusal);
            }
            choice["delta"] = delta;
        }
        EventKind::Reasoning | EventKind::ReasoningSummary => {
            let text = if event.kind == EventKind::Reasoning {
                &event.reasoning
            } else {
                &event.reasoning_summary
            };
            choice["delta"] = json!({"role": "assistant", "reasoning_content": text});
        }
        EventKind::ToolCall | EventKind::ToolCallDelta => {
            let Some(tc) = event.tool_call.as_ref() else {
                return Ok(None);
            };
            let mut tc_chunk = json!({"index": tool_call_index});
            if !tc.id.is_empty() {
                tc_chunk["id"] = json!(tc.id);
                tc_chunk["type"] = json!("function");
            }
            let mut function = json!({"arguments": tc.args});
            if !tc.name.is_empty() {
                function["name"] = json!(tc.name);
            }
            tc_chunk["function"] = function;
            choice["delta"] = json!({"tool_calls": [tc_chunk]});
        }
        EventKind::Image => {
            let Some(image) = event.image.as_ref() else {
                return Ok(None);
            };
            choice["delta"] = json!({
                "role": "assistant",
                "images": [{
                    "index": 0,
                    "type": "image_url",
                    "image_url": {"url": format!("data:{};base64,{}", image.mime_type, image.data)},
                }],
            });
        }
        EventKind::Finish => {
            choice["finish_reason"] =
                json!(event.finish_reason.unwrap_or(FinishReason::Stop).to_openai());
            if let Some(native) = meta.map(|m| m.native_finish_reason.as_str()) {
                if !native.is_empty() {
                    choice["native_finish_reason"] = json!(native);
                }
            }
            if let Some(logprobs) = event.logprobs.as_ref() {
                choice["logprobs"] = logprobs.clone();
            }
            if let Some(filter) = event.content_filter.as_ref() {
                choice["content_filter_results"] = filter.clone();
            }
            if let Some(usage) = event.usage.as_ref() {
                chunk["usage"] = build_chunk_usage(usage, meta);
            }
        }
        EventKind::Error => {
            return Err(Error::upstream(format!("stream error: {}", event.error)));
        }
    }

    if event.logprobs.is_some() && event.kind != EventKind::Finish {
        choice["logprobs"] = event.logprobs.clone().unwrap_or(Value::Null);
    }

    chunk["choices"] = json!([choice]);
    Ok(Some(serde_json::to_vec(&chunk)?))
}

fn build_chunk_usage(usage: &Usage, meta: Option<&ResponseMeta>) -> Value {
    let mut out = json!({
        "prompt_tokens": usage.prompt_tokens,
        "completion_tokens": usage.completion_tokens,
        "total_tokens": usage.total_tokens,
    });

    let mut prompt_details = Map::new();
    if usage.cached_tokens > 0 {
        prompt_details.insert("cached_tokens".into(), json!(usage.cached_tokens));
    }
    if usage.audio_tokens > 0 {
        prompt_details.insert("audio_tokens".into(), json!(usage.audio_tokens));
    }
    if !prompt_details.is_empty() {
        out["prompt_tokens_details"] = Value::Object(prompt_details);
    }

    let mut completion_details = Map::new();
    let thoughts = meta
        .map(|m| m.thoughts_token_count)
        .filter(|t| *t > 0)
        .unwrap_or(usage.thoughts_token_count);
    if thoughts > 0 {
        completion_details.insert("reasoning_tokens".into(), json!(thoughts));
    }
    if usage.accepted_prediction_tokens > 0 {
        completion_details.insert(
            "accepted_prediction_tokens".into(),
            json!(usage.accepted_prediction_tokens),
        );
    }
    if usage.rejected_prediction_tokens > 0 {
        completion_details.insert(
            "rejected_prediction_tokens".into(),
            json!(usage.rejected_prediction_tokens),
        );
    }
    if !completion_details.is_empty() {
        out["completion_tokens_details"] = Value::Object(completion_details);
    }

    out
}

// ---------------------------------------------------------------------------
// Responses API output
// ---------------------------------------------------------------------------

/// Build a non-streaming Responses API `response` object.
pub fn to_responses_api_response(
    messages: &[Message],
    usage: Option<&Usage>,
    model: &str,
    meta: Option<&ResponseMeta>,
) -> Result<Vec<u8>, Error> {
    let fallback_id = format!("resp_{}", unix_now());
    let (response_id, created) = response_identity(&fallback_id, meta);

    let mut response = json!({
        "id": response_id,
        "object": "response",
        "created_at": created,
        "status": "completed",
        "model": model,
    });

    let mut output: Vec<Value> = Vec::new();
    let mut output_text = String::new();
    for msg in messages {
        if msg.role != Role::Assistant {
            continue;
        }
        let reasoning = msg.combined_reasoning();
        if !reasoning.is_empty() {
            output.push(json!({
                "id": format!("rs_{response_id}"),
                "type": "reasoning",
                "summary": [{"type": "summary_text", "text": reasoning}],
            }));
        }
        let text = msg.combined_text();
        if !text.is_empty() {
            output_text = text.clone();
            output.push(json!({
                "id": format!("msg_{response_id}"),
                "type": "message",
                "status": "completed",
                "role": "assistant",
                "content": [{"type": "output_text", "text": text, "annotations": []}],
            }));
        }
        for tc in &msg.tool_calls {
            output.push(json!({
                "id": format!("fc_{}", tc.id),
                "type": "function_call",
                "status": "completed",
                "call_id": tc.id,
                "name": tc.name,
                "arguments": tc.args,
            }));
        }
    }
    if !output.is_empty() {
        response["output"] = Value::Array(output);
    }
    if !output_text.is_empty() {
        response["output_text"] = json!(output_text);
    }

    if let Some(usage) = usage {
        response["usage"] = responses_usage_object(Some(usage));
    }

    Ok(serde_json::to_vec(&response)?)
}

fn responses_usage_object(usage: Option<&Usage>) -> Value {
    let Some(usage) = usage else { return json!({}) };
    let mut out = json!({
        "input_tokens": usage.prompt_tokens,
        "output_tokens": usage.completion_tokens,
        "total_tokens": usage.total_tokens,
    });
    if usage.cached_tokens > 0 {
        out["input_tokens_details"] = json!({"cached_tokens": usage.cached_tokens});
    }
    if usage.thoughts_token_count > 0 {
        out["output_tokens_details"] = json!({"reasoning_tokens": usage.thoughts_token_count});
    }
    out
}

/// Per-stream state for Responses API SSE emission.
#[derive(Debug, Default)]
pub struct ResponsesStreamState {
    seq: u64,
    response_id: String,
    created: i64,
    started: bool,
    reasoning_id: String,
    msg_id: String,
    text_buffer: String,
    reasoning_buffer: String,
    func_call_ids: HashMap<usize, String>,
    func_names: HashMap<usize, String>,
    func_call_client_ids: HashMap<usize, String>,
    func_args_buffer: HashMap<usize, String>,
    func_is_custom: HashMap<usize, bool>,
    func_done: HashMap<usize, bool>,
    args_done: HashMap<usize, bool>,
}

impl ResponsesStreamState {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

fn sse_frame(event_type: &str, data: &Value) -> String {
    format!("event: {event_type}\ndata: {data}\n\n")
}

/// Convert one IR event to zero or more Responses API SSE frames.
pub fn to_responses_api_chunk(
    event: &UnifiedEvent,
    state: &mut ResponsesStreamState,
) -> Result<Vec<String>, Error> {
    if state.response_id.is_empty() {
        state.response_id = format!("resp_{}", unix_now());
        state.created = unix_now();
    }

    let mut out: Vec<String> = Vec::new();

    if !state.started {
        for event_type in ["response.created", "response.in_progress"] {
            let seq = state.next_seq();
            let data = json!({
                "type": event_type,
                "sequence_number": seq,
                "response": {
                    "id": state.response_id,
                    "object": "response",
                    "created_at": state.created,
                    "status": "in_progress",
                    "output": [],
                },
            });
            out.push(sse_frame(event_type, &data));
        }
        state.started = true;
    }

    match event.kind {
        EventKind::Token => handle_responses_token(event, state, &mut out),
        EventKind::Reasoning | EventKind::ReasoningSummary => {
            handle_responses_reasoning(event, state, &mut out)
        }
        EventKind::ToolCall => handle_responses_tool_call(event, state, &mut out, false),
        EventKind::ToolCallDelta => handle_responses_tool_call(event, state, &mut out, true),
        EventKind::Finish => handle_responses_finish(event, state, &mut out),
        EventKind::Error => {
            return Err(Error::upstream(format!("stream error: {}", event.error)));
        }
        _ => {}
    }

    Ok(out)
}

fn handle_responses_token(
    event: &UnifiedEvent,
    state: &mut ResponsesStreamState,
    out: &mut Vec<String>,
) {
    if state.msg_id.is_empty() {
        state.msg_id = format!("msg_{}", state.response_id);
        let seq = state.next_seq();
        let added = json!({
            "type": "response.output_item.added",
            "sequence_number": seq,
            "output_index": 0,
            "item": {
                "id": state.msg_id,
                "type": "message",
                "status": "in_progress",
                "role": "assistant",
                "content": [],
            },
        });
        out.push(sse_frame("response.output_item.added", &added));
        let seq = state.next_seq();
        let part = json!({
            "type": "response.content_part.added",
            "sequence_number": seq,
            "item_id": state.msg_id,
            "output_index": 0,
            "content_index": 0,
            "part": {"type": "output_text", "text": ""},
        });
        out.push(sse_frame("response.content_part.added", &part));
    }
    state.text_buffer.push_str(&event.content);
    let seq = state.next_seq();
    let delta = json!({
        "type": "response.output_text.delta",
        "sequence_number": seq,
        "item_id": state.msg_id,
        "output_index": 0,
        "content_index": 0,
        "delta": event.content,
    });
    out.push(sse_frame("response.output_text.delta", &delta));
}

fn handle_responses_reasoning(
    event: &UnifiedEvent,
    state: &mut ResponsesStreamState,
    out: &mut Vec<String>,
) {
    let text = if event.kind == EventKind::ReasoningSummary {
        &event.reasoning_summary
    } else {
        &event.reasoning
    };
    if state.reasoning_id.is_empty() {
        state.reasoning_id = format!("rs_{}", state.response_id);
        let seq = state.next_seq();
        let added = json!({
            "type": "response.output_item.added",
            "sequence_number": seq,
            "output_index": 0,
            "item": {
                "id": state.reasoning_id,
                "type": "reasoning",
                "status": "in_progress",
                "summary": [],
            },
        });
        out.push(sse_frame("response.output_item.added", &added));
    }
    state.reasoning_buffer.push_str(text);
    let seq = state.next_seq();
    let delta = json!({
        "type": "response.reasoning_summary_text.delta",
        "sequence_number": seq,
        "item_id": state.reasoning_id,
        "output_index": 0,
        "content_index": 0,
        "delta": text,
    });
    out.push(sse_frame("response.reasoning_summary_text.delta", &delta));
}

fn handle_responses_tool_call(
    event: &UnifiedEvent,
    state: &mut ResponsesStreamState,
    out: &mut Vec<String>,
    is_delta: bool,
) {
    let Some(tc) = event.tool_call.as_ref() else { return };
    let idx = event.tool_call_index;
    let is_custom = tc.is_custom || *state.func_is_custom.get(&idx).unwrap_or(&false);

    if !state.func_call_ids.contains_key(&idx) {
        // Internal item id reuses the upstream ItemID when present so the
        // item_id -> call_id mapping survives the round trip.
        let item_id = if !tc.item_id.is_empty() {
            tc.item_id.clone()
        } else {
            format!("fc_{}", tc.id)
        };
        state.func_call_ids.insert(idx, item_id);
        state.func_names.insert(idx, tc.name.clone());
        state.func_call_client_ids.insert(idx, tc.id.clone());
        state.func_is_custom.insert(idx, is_custom);

        let item_type = if is_custom { "custom_tool_call" } else { "function_call" };
        let mut item = json!({
            "id": state.func_call_ids[&idx],
            "type": item_type,
            "status": "in_progress",
            "call_id": tc.id,
            "name": tc.name,
        });
        if is_custom {
            item["input"] = json!("");
        } else {
            item["arguments"] = json!("");
        }
        let seq = state.next_seq();
        let added = json!({
            "type": "response.output_item.added",
            "sequence_number": seq,
            "output_index": idx,
            "item": item,
        });
        out.push(sse_frame("response.output_item.added", &added));
    }

    if !is_custom && !tc.args.is_empty() {
        state
            .func_args_buffer
            .entry(idx)
            .or_default()
            .push_str(&tc.args);
    }

    if !tc.args.is_empty() {
        let event_type = if is_custom {
            "response.custom_tool_call_input.delta"
        } else {
            "response.function_call_arguments.delta"
        };
        let seq = state.next_seq();
        let delta = json!({
            "type": event_type,
            "sequence_number": seq,
            "item_id": state.func_call_ids[&idx],
            "output_index": idx,
            "delta": tc.args,
        });
        out.push(sse_frame(event_type, &delta));
    }

    // Deltas never close items; full ToolCall events may, once arguments
    // have accumulated.
    if is_delta && !tc.is_complete {
        return;
    }

    // arguments.done fires once, only with a non-empty buffer; an empty
    // done makes clients finalise the call with empty args.
    if !is_custom && !state.args_done.get(&idx).copied().unwrap_or(false) {
        let args = state.func_args_buffer.get(&idx).cloned().unwrap_or_default();
        if !args.is_empty() {
            let seq = state.next_seq();
            let done = json!({
                "type": "response.function_call_arguments.done",
                "sequence_number": seq,
                "item_id": state.func_call_ids[&idx],
                "output_index": idx,
                "arguments": args,
            });
            out.push(sse_frame("response.function_call_arguments.done", &done));
            state.args_done.insert(idx, true);
        }
    }

    if !state.func_done.get(&idx).copied().unwrap_or(false) {
        if !is_custom && !state.args_done.get(&idx).copied().unwrap_or(false) {
            return;
        }
        let item_type = if is_custom { "custom_tool_call" } else { "function_call" };
        let mut item = json!({
            "id": state.func_call_ids[&idx],
            "type": item_type,
            "status": "completed",
            "call_id": state.func_call_client_ids.get(&idx).cloned().unwrap_or_default(),
            "name": state.func_names.get(&idx).cloned().unwrap_or_default(),
        });
        if is_custom {
            item["input"] = json!(tc.args);
        } else {
            item["arguments"] = json!(state
                .func_args_buffer
                .get(&idx)
                .cloned()
                .unwrap_or_default());
        }
        let seq = state.next_seq();
        let done = json!({
            "type": "response.output_item.done",
            "sequence_number": seq,
            "item_id": state.func_call_ids[&idx],
            "output_index": idx,
            "item": item,
        });
        out.push(sse_frame("response.output_item.done", &done));
        state.func_done.insert(idx, true);
    }
}

fn handle_responses_finish(
    event: &UnifiedEvent,
    state: &mut ResponsesStreamState,
    out: &mut Vec<String>,
) {
    if !state.msg_id.is_empty() {
        let seq = state.next_seq();
        let part_done = json!({
            "type": "response.content_part.done",
            "sequence_number": seq,
            "item_id": state.msg_id,
            "output_index": 0,
            "content_index": 0,
            "part": {"type": "output_text", "text": state.text_buffer},
        });
        out.push(sse_frame("response.content_part.done", &part_done));
        let seq = state.next_seq();
        let item_done = json!({
            "type": "response.output_item.done",
            "sequence_number": seq,
            "output_index": 0,
            "item": {
                "id": state.msg_id,
                "type": "message",
                "status": "completed",
                "role": "assistant",
                "content": [{"type": "output_text", "text": state.text_buffer}],
            },
        });
        out.push(sse_frame("response.output_item.done", &item_done));
    }
    if !state.reasoning_id.is_empty() {
        let seq = state.next_seq();
        let item_done = json!({
            "type": "response.output_item.done",
            "sequence_number": seq,
            "output_index": 0,
            "item": {
                "id": state.reasoning_id,
                "type": "reasoning",
                "status": "completed",
                "summary": [{"type": "summary_text", "text": state.reasoning_buffer}],
            },
        });
        out.push(sse_frame("response.output_item.done", &item_done));
    }

    let seq = state.next_seq();
    let done = json!({
        "type": "response.done",
        "sequence_number": seq,
        "response": {
            "id": state.response_id,
            "object": "response",
            "created_at": state.created,
            "status": "completed",
            "usage": responses_usage_object(event.usage.as_ref()),
        },
    });
    out.push(sse_frame("response.done", &done));
}
