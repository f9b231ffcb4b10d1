// OpenAI parsers: Chat Completions and Responses API requests, plus
// responses and stream chunks in either framing.

use serde_json::Value;

use llm_relay_types::{
    ContentPart, Error, EventKind, FilePart, FinishReason, ImagePart, Message, Role,
    ThinkingConfig, ToolCall, ToolDefinition, UnifiedEvent, UnifiedRequest, Usage,
};

use crate::util::ids::decode_tool_id_and_signature;
use crate::util::text::{extract_sse_data, validate_and_normalize_json};

static NULL: Value = Value::Null;

/// Parse an OpenAI Chat Completions request.
pub fn parse_openai_request(raw: &[u8]) -> Result<UnifiedRequest, Error> {
    let root: Value = serde_json::from_slice(raw)?;
    let mut req = UnifiedRequest {
        model: str_at(&root, "model").to_string(),
        temperature: root.get("temperature").and_then(Value::as_f64),
        top_p: root.get("top_p").and_then(Value::as_f64),
        max_tokens: root
            .get("max_tokens")
            .or_else(|| root.get("max_completion_tokens"))
            .and_then(Value::as_i64),
        parallel_tool_calls: root.get("parallel_tool_calls").and_then(Value::as_bool),
        ..Default::default()
    };

    match root.get("stop") {
        Some(Value::String(s)) => req.stop_sequences.push(s.clone()),
        Some(Value::Array(arr)) => {
            req.stop_sequences
                .extend(arr.iter().filter_map(Value::as_str).map(str::to_string));
        }
        _ => {}
    }
    if let Some(Value::Array(mods)) = root.get("modalities") {
        req.response_modality
            .extend(mods.iter().filter_map(Value::as_str).map(str::to_string));
    }
    if let Some(effort) = root.get("reasoning_effort").and_then(Value::as_str) {
        let (budget, include) = ThinkingConfig::effort_to_budget(effort);
        req.thinking = Some(ThinkingConfig {
            budget,
            include_thoughts: include,
            effort: effort.to_string(),
            ..Default::default()
        });
    }

    req.tool_choice = parse_tool_choice(root.get("tool_choice"));
    if let Some(Value::Array(tools)) = root.get("tools") {
        for tool in tools {
            if let Some(def) = parse_chat_tool(tool) {
                req.tools.push(def);
            }
        }
    }

    if let Some(Value::Array(messages)) = root.get("messages") {
        for msg in messages {
            parse_chat_message(msg, &mut req.messages);
        }
    }

    Ok(req)
}

fn parse_tool_choice(choice: Option<&Value>) -> String {
    match choice {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(obj)) => obj
            .get("function")
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        _ => String::new(),
    }
}

fn parse_chat_tool(tool: &Value) -> Option<ToolDefinition> {
    let tool_type = str_at(tool, "type");
    if tool_type == "function" || tool_type.is_empty() {
        let function = tool.get("function").unwrap_or(tool);
        let name = str_at(function, "name");
        if name.is_empty() {
            return None;
        }
        return Some(ToolDefinition {
            name: name.to_string(),
            description: str_at(function, "description").to_string(),
            parameters: function.get("parameters").cloned(),
            ..Default::default()
        });
    }
    // Built-in tools (web_search, code_interpreter, ...) pass through by
    // type name only.
    Some(ToolDefinition {
        name: tool_type.to_string(),
        is_built_in: true,
        ..Default::default()
    })
}

fn parse_chat_message(msg: &Value, out: &mut Vec<Message>) {
    let role = Role::from_wire(str_at(msg, "role"));
    match role {
        Role::System => {
            let text = collect_chat_text(msg.get("content"));
            if !text.is_empty() {
                out.push(Message::system(text));
            }
        }
        Role::User => {
            let mut message = Message {
                role: Role::User,
                ..Default::default()
            };
            parse_chat_content(msg.get("content"), &mut message.content);
            if !message.content.is_empty() {
                out.push(message);
            }
        }
        Role::Assistant => {
            let mut message = Message {
                role: Role::Assistant,
                ..Default::default()
            };
            if let Some(reasoning) = msg
                .get("reasoning_content")
                .or_else(|| msg.get("reasoning"))
                .and_then(Value::as_str)
            {
                if !reasoning.is_empty() {
                    message
                        .content
                        .push(ContentPart::reasoning(reasoning, None));
                }
            }
            parse_chat_content(msg.get("content"), &mut message.content);
            if let Some(Value::Array(calls)) = msg.get("tool_calls") {
                for call in calls {
                    let function = call.get("function").unwrap_or(call);
                    let (id, sig) = decode_tool_id_and_signature(str_at(call, "id"));
                    message.tool_calls.push(ToolCall {
                        id,
                        name: str_at(function, "name").to_string(),
                        args: validate_and_normalize_json(str_at(function, "arguments")),
                        thought_signature: (!sig.is_empty()).then_some(sig),
                        ..Default::default()
                    });
                }
            }
            if !message.content.is_empty() || !message.tool_calls.is_empty() {
                out.push(message);
            }
        }
        Role::Tool => {
            let (id, sig) = decode_tool_id_and_signature(str_at(msg, "tool_call_id"));
            let result = collect_chat_text(msg.get("content"));
            out.push(Message {
                role: Role::Tool,
                content: vec![ContentPart::ToolResult {
                    tool_result: llm_relay_types::ToolResultPart {
                        tool_call_id: id,
                        result,
                        thought_signature: (!sig.is_empty()).then_some(sig),
                    },
                }],
                ..Default::default()
            });
        }
    }
}

fn collect_chat_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| {
                if str_at(p, "type") == "text" || p.get("text").is_some() {
                    p.get("text").and_then(Value::as_str)
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

fn parse_chat_content(content: Option<&Value>, out: &mut Vec<ContentPart>) {
    match content {
        Some(Value::String(s)) => {
            if !s.is_empty() {
                out.push(ContentPart::text(s.clone()));
            }
        }
        Some(Value::Array(parts)) => {
            for part in parts {
                match str_at(part, "type") {
                    "text" => {
                        if let Some(text) = part.get("text").and_then(Value::as_str) {
                            if !text.is_empty() {
                                out.push(ContentPart::text(text));
                            }
                        }
                    }
                    "image_url" => {
                        let url = part
                            .get("image_url")
                            .and_then(|i| i.get("url"))
                            .and_then(Value::as_str)
                            .unwrap_or("");
                        if let Some(image) = parse_data_url(url) {
                            out.push(ContentPart::Image {
                                image,
                                thought_signature: None,
                            });
                        } else if !url.is_empty() {
                            out.push(ContentPart::Image {
                                image: ImagePart {
                                    url: url.to_string(),
                                    ..Default::default()
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
}

/// Split a `data:<mime>;base64,<data>` URL into an inline image part.
pub(crate) fn parse_data_url(url: &str) -> Option<ImagePart> {
    let rest = url.strip_prefix("data:")?;
    let (mime, data) = rest.split_once(";base64,")?;
    Some(ImagePart {
        mime_type: mime.to_string(),
        data: data.to_string(),
        url: String::new(),
    })
}

// ---------------------------------------------------------------------------
// Responses API request
// ---------------------------------------------------------------------------

/// Parse an OpenAI Responses API request.
pub fn parse_responses_request(raw: &[u8]) -> Result<UnifiedRequest, Error> {
    let root: Value = serde_json::from_slice(raw)?;
    let mut req = UnifiedRequest {
        model: str_at(&root, "model").to_string(),
        instructions: str_at(&root, "instructions").to_string(),
        temperature: root.get("temperature").and_then(Value::as_f64),
        top_p: root.get("top_p").and_then(Value::as_f64),
        max_tokens: root.get("max_output_tokens").and_then(Value::as_i64),
        store: root.get("store").and_then(Value::as_bool),
        parallel_tool_calls: root.get("parallel_tool_calls").and_then(Value::as_bool),
        previous_response_id: str_at(&root, "previous_response_id").to_string(),
        prompt_cache_key: str_at(&root, "prompt_cache_key").to_string(),
        ..Default::default()
    };

    if !req.instructions.is_empty() {
        req.messages.push(Message::system(req.instructions.clone()));
    }

    if let Some(prompt) = root.get("prompt") {
        req.prompt_id = str_at(prompt, "id").to_string();
        req.prompt_version = str_at(prompt, "version").to_string();
        req.prompt_variables = prompt.get("variables").cloned();
    }

    if let Some(reasoning) = root.get("reasoning") {
        let effort = str_at(reasoning, "effort");
        let summary = str_at(reasoning, "summary");
        if !effort.is_empty() || !summary.is_empty() {
            let (budget, include) = ThinkingConfig::effort_to_budget(effort);
            req.thinking = Some(ThinkingConfig {
                budget,
                include_thoughts: include,
                effort: effort.to_string(),
                summary: summary.to_string(),
            });
        }
    }

    req.tool_choice = parse_tool_choice(root.get("tool_choice"));
    if let Some(Value::Array(tools)) = root.get("tools") {
        for tool in tools {
            if let Some(def) = parse_responses_tool(tool) {
                req.tools.push(def);
            }
        }
    }

    // Custom tool names, for labelling custom_tool_call input items.
    let custom_names: Vec<&str> = req
        .tools
        .iter()
        .filter(|t| t.is_custom)
        .map(|t| t.name.as_str())
        .collect();

    if let Some(Value::Array(input)) = root.get("input") {
        for item in input {
            parse_responses_input_item(item, &custom_names, &mut req.messages);
        }
    } else if let Some(Value::String(text)) = root.get("input") {
        if !text.is_empty() {
            req.messages.push(Message::user(text.clone()));
        }
    }

    Ok(req)
}

fn parse_responses_tool(tool: &Value) -> Option<ToolDefinition> {
    match str_at(tool, "type") {
        "function" => {
            let name = str_at(tool, "name");
            if name.is_empty() {
                return None;
            }
            Some(ToolDefinition {
                name: name.to_string(),
                description: str_at(tool, "description").to_string(),
                parameters: tool.get("parameters").cloned(),
                ..Default::default()
            })
        }
        "custom" => Some(ToolDefinition {
            name: str_at(tool, "name").to_string(),
            description: str_at(tool, "description").to_string(),
            is_custom: true,
            format: tool.get("format").cloned(),
            ..Default::default()
        }),
        "" => None,
        built_in => Some(ToolDefinition {
            name: built_in.to_string(),
            is_built_in: true,
            ..Default::default()
        }),
    }
}

fn parse_responses_input_item(item: &Value, custom_names: &[&str], out: &mut Vec<Message>) {
    match str_at(item, "type") {
        "message" | "" => {
            let role = Role::from_wire(str_at(item, "role"));
            let mut message = Message {
                role,
                ..Default::default()
            };
            match item.get("content") {
                Some(Value::String(text)) => {
                    if !text.is_empty() {
                        message.content.push(ContentPart::text(text.clone()));
                    }
                }
                Some(Value::Array(parts)) => {
                    for part in parts {
                        parse_responses_content_part(part, &mut message.content);
                    }
                }
                _ => {}
            }
            if !message.content.is_empty() {
                out.push(message);
            }
        }
        "function_call" | "custom_tool_call" => {
            let is_custom = str_at(item, "type") == "custom_tool_call"
                || custom_names.contains(&str_at(item, "name"));
            let args_field = if str_at(item, "type") == "custom_tool_call" {
                str_at(item, "input")
            } else {
                str_at(item, "arguments")
            };
            let call = ToolCall {
                id: str_at(item, "call_id").to_string(),
                name: str_at(item, "name").to_string(),
                args: if is_custom {
                    args_field.to_string()
                } else {
                    validate_and_normalize_json(args_field)
                },
                item_id: str_at(item, "id").to_string(),
                is_custom,
                ..Default::default()
            };
            // Attach to a trailing assistant message so parallel calls
            // stay on one turn, as Chat Completions frames them.
            if let Some(last) = out.last_mut() {
                if last.role == Role::Assistant {
                    last.tool_calls.push(call);
                    return;
                }
            }
            out.push(Message {
                role: Role::Assistant,
                tool_calls: vec![call],
                ..Default::default()
            });
        }
        "function_call_output" | "custom_tool_call_output" => {
            out.push(Message {
                role: Role::Tool,
                content: vec![ContentPart::ToolResult {
                    tool_result: llm_relay_types::ToolResultPart {
                        tool_call_id: str_at(item, "call_id").to_string(),
                        result: str_at(item, "output").to_string(),
                        thought_signature: None,
                    },
                }],
                ..Default::default()
            });
        }
        "reasoning" => {
            let summary = item
                .get("summary")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|s| s.get("text").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join("")
                })
                .unwrap_or_default();
            if summary.is_empty() {
                return;
            }
            if let Some(last) = out.last_mut() {
                if last.role == Role::Assistant {
                    last.content.insert(0, ContentPart::reasoning(summary, None));
                    return;
                }
            }
            out.push(Message {
                role: Role::Assistant,
                content: vec![ContentPart::reasoning(summary, None)],
                ..Default::default()
            });
        }
        _ => {}
    }
}

fn parse_responses_content_part(part: &Value, out: &mut Vec<ContentPart>) {
    match str_at(part, "type") {
        "input_text" | "output_text" | "text" => {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                if !text.is_empty() {
                    out.push(ContentPart::text(text));
                }
            }
        }
        "input_image" => {
            let url = str_at(part, "image_url");
            if let Some(image) = parse_data_url(url) {
                out.push(ContentPart::Image {
                    image,
                    thought_signature: None,
                });
            } else if !url.is_empty() {
                out.push(ContentPart::Image {
                    image: ImagePart {
                        url: url.to_string(),
                        ..Default::default()
                    },
                    thought_signature: None,
                });
            }
        }
        "input_file" => {
            out.push(ContentPart::File {
                file: FilePart {
                    file_id: str_at(part, "file_id").to_string(),
                    file_url: str_at(part, "file_url").to_string(),
                    filename: str_at(part, "filename").to_string(),
                    file_data: str_at(part, "file_data").to_string(),
                },
            });
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Parse a non-streaming OpenAI response: either a Chat Completions
/// `chat.completion` object or a Responses API `response` object.
pub fn parse_openai_response(raw: &[u8]) -> Result<(Vec<Message>, Option<Usage>), Error> {
    let root: Value = serde_json::from_slice(raw)?;

    if root.get("choices").is_some() {
        return parse_chat_completion(&root);
    }
    if root.get("output").is_some() || str_at(&root, "object") == "response" {
        return parse_responses_object(&root);
    }
    Err(Error::parse("unrecognised OpenAI response shape"))
}

fn parse_chat_completion(root: &Value) -> Result<(Vec<Message>, Option<Usage>), Error> {
    let mut message = Message {
        role: Role::Assistant,
        ..Default::default()
    };
    if let Some(msg) = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .and_then(|c| c.get("message"))
    {
        if let Some(reasoning) = msg
            .get("reasoning_content")
            .or_else(|| msg.get("reasoning"))
            .and_then(Value::as_str)
        {
            if !reasoning.is_empty() {
                message.content.push(ContentPart::reasoning(reasoning, None));
            }
        }
        if let Some(text) = msg.get("content").and_then(Value::as_str) {
            if !text.is_empty() {
                message.content.push(ContentPart::text(text));
            }
        }
        if let Some(Value::Array(calls)) = msg.get("tool_calls") {
            for call in calls {
                let function = call.get("function").unwrap_or(call);
                let (id, sig) = decode_tool_id_and_signature(str_at(call, "id"));
                message.tool_calls.push(ToolCall {
                    id,
                    name: str_at(function, "name").to_string(),
                    args: validate_and_normalize_json(str_at(function, "arguments")),
                    thought_signature: (!sig.is_empty()).then_some(sig),
                    ..Default::default()
                });
            }
        }
    }

    let usage = parse_openai_usage(root.get("usage"));
    let messages = if message.content.is_empty() && message.tool_calls.is_empty() {
        Vec::new()
    } else {
        vec![message]
    };
    Ok((messages, usage))
}

fn parse_responses_object(root: &Value) -> Result<(Vec<Message>, Option<Usage>), Error> {
    let mut message = Message {
        role: Role::Assistant,
        ..Default::default()
    };
    if let Some(Value::Array(output)) = root.get("output") {
        for item in output {
            match str_at(item, "type") {
                "message" => {
                    if let Some(Value::Array(parts)) = item.get("content") {
                        for part in parts {
                            if let Some(text) = part.get("text").and_then(Value::as_str) {
                                if !text.is_empty() {
                                    message.content.push(ContentPart::text(text));
                                }
                            }
                        }
                    }
                }
                "reasoning" => {
                    let text = item
                        .get("summary")
                        .and_then(Value::as_array)
                        .map(|arr| {
                            arr.iter()
                                .filter_map(|s| s.get("text").and_then(Value::as_str))
                                .collect::<Vec<_>>()
                                .join("")
                        })
                        .unwrap_or_default();
                    if !text.is_empty() {
                        message.content.push(ContentPart::reasoning(text, None));
                    }
                }
                "function_call" | "custom_tool_call" => {
                    let is_custom = str_at(item, "type") == "custom_tool_call";
                    let args = if is_custom {
                        str_at(item, "input").to_string()
                    } else {
                        validate_and_normalize_json(str_at(item, "arguments"))
                    };
                    message.tool_calls.push(ToolCall {
                        id: str_at(item, "call_id").to_string(),
                        name: str_at(item, "name").to_string(),
                        args,
                        item_id: str_at(item, "id").to_string(),
                        is_custom,
                        ..Default::default()
                    });
                }
                _ => {}
            }
        }
    }

    let usage = parse_responses_usage(root.get("usage"));
    let messages = if message.content.is_empty() && message.tool_calls.is_empty() {
        Vec::new()
    } else {
        vec![message]
    };
    Ok((messages, usage))
}

fn parse_openai_usage(usage: Option<&Value>) -> Option<Usage> {
    let usage = usage?;
    Some(Usage {
        prompt_tokens: int_at(usage, "prompt_tokens"),
        completion_tokens: int_at(usage, "completion_tokens"),
        total_tokens: int_at(usage, "total_tokens"),
        cached_tokens: usage
            .get("prompt_tokens_details")
            .map(|d| int_at(d, "cached_tokens"))
            .unwrap_or(0),
        audio_tokens: usage
            .get("prompt_tokens_details")
            .map(|d| int_at(d, "audio_tokens"))
            .unwrap_or(0),
        thoughts_token_count: usage
            .get("completion_tokens_details")
            .map(|d| int_at(d, "reasoning_tokens"))
            .unwrap_or(0),
        accepted_prediction_tokens: usage
            .get("completion_tokens_details")
            .map(|d| int_at(d, "accepted_prediction_tokens"))
            .unwrap_or(0),
        rejected_prediction_tokens: usage
            .get("completion_tokens_details")
            .map(|d| int_at(d, "rejected_prediction_tokens"))
            .unwrap_or(0),
    })
}

fn parse_responses_usage(usage: Option<&Value>) -> Option<Usage> {
    let usage = usage?;
    Some(Usage {
        prompt_tokens: int_at(usage, "input_tokens"),
        completion_tokens: int_at(usage, "output_tokens"),
        total_tokens: int_at(usage, "total_tokens"),
        cached_tokens: usage
            .get("input_tokens_details")
            .map(|d| int_at(d, "cached_tokens"))
            .unwrap_or(0),
        thoughts_token_count: usage
            .get("output_tokens_details")
            .map(|d| int_at(d, "reasoning_tokens"))
            .unwrap_or(0),
        ..Default::default()
    })
}

// ---------------------------------------------------------------------------
// Stream chunks
// ---------------------------------------------------------------------------

/// Parse one OpenAI streaming frame: a `chat.completion.chunk` data line
/// or a typed Responses API `response.*` event.
pub fn parse_openai_chunk(raw: &[u8]) -> Result<Vec<UnifiedEvent>, Error> {
    let data = extract_sse_data(raw);
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data == b"[DONE]" {
        return Ok(vec![UnifiedEvent::finish(FinishReason::Stop, None)]);
    }
    let root: Value = serde_json::from_slice(data)?;

    let event_type = str_at(&root, "type");
    if event_type.starts_with("response.") || event_type == "error" {
        return Ok(parse_responses_event(&root));
    }
    Ok(parse_chat_completion_chunk(&root))
}

fn parse_chat_completion_chunk(root: &Value) -> Vec<UnifiedEvent> {
    let mut events = Vec::new();
    let choice = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|a| a.first());
    let usage = parse_openai_usage(root.get("usage"));
    let fingerprint = str_at(root, "system_fingerprint").to_string();

    let Some(choice) = choice else {
        // Usage-only trailer chunk (stream_options.include_usage).
        if let Some(usage) = usage {
            events.push(UnifiedEvent::finish(FinishReason::Stop, Some(usage)));
        }
        return events;
    };

    if let Some(delta) = choice.get("delta") {
        if let Some(reasoning) = delta
            .get("reasoning_content")
            .or_else(|| delta.get("reasoning"))
            .and_then(Value::as_str)
        {
            if !reasoning.is_empty() {
                events.push(UnifiedEvent::reasoning(reasoning));
            }
        }
        let content = str_at(delta, "content");
        let refusal = str_at(delta, "refusal");
        if !content.is_empty() || !refusal.is_empty() {
            let mut event = UnifiedEvent::token(content);
            event.refusal = refusal.to_string();
            event.system_fingerprint = fingerprint.clone();
            events.push(event);
        }
        if let Some(Value::Array(calls)) = delta.get("tool_calls") {
            for (pos, call) in calls.iter().enumerate() {
                let index = call
                    .get("index")
                    .and_then(Value::as_u64)
                    .map(|v| v as usize)
                    .unwrap_or(pos);
                let function = call.get("function").unwrap_or(call);
                let (id, sig) = decode_tool_id_and_signature(str_at(call, "id"));
                let name = str_at(function, "name").to_string();
                let args = str_at(function, "arguments").to_string();
                let header = !id.is_empty() || !name.is_empty();
                let mut event = UnifiedEvent {
                    kind: if header {
                        EventKind::ToolCall
                    } else {
                        EventKind::ToolCallDelta
                    },
                    tool_call: Some(ToolCall {
                        id,
                        name,
                        args,
                        thought_signature: (!sig.is_empty()).then_some(sig),
                        ..Default::default()
                    }),
                    tool_call_index: index,
                    ..Default::default()
                };
                event.system_fingerprint = fingerprint.clone();
                events.push(event);
            }
        }
    }

    if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
        let mut event = UnifiedEvent::finish(FinishReason::from_openai(reason), usage);
        event.logprobs = choice.get("logprobs").cloned().filter(|v| !v.is_null());
        event.content_filter = choice
            .get("content_filter_results")
            .cloned()
            .filter(|v| !v.is_null());
        events.push(event);
    } else if let Some(usage) = usage {
        // Usage delivered alongside a non-final chunk: hold it on a
        // finish event; the state machine suppresses duplicates.
        if events.is_empty() {
            events.push(UnifiedEvent::finish(FinishReason::Stop, Some(usage)));
        }
    }

    events
}

fn parse_responses_event(root: &Value) -> Vec<UnifiedEvent> {
    let mut events = Vec::new();
    match str_at(root, "type") {
        "response.output_text.delta" => {
            let delta = str_at(root, "delta");
            if !delta.is_empty() {
                events.push(UnifiedEvent::token(delta));
            }
        }
        "response.reasoning_text.delta" => {
            let delta = str_at(root, "delta");
            if !delta.is_empty() {
                events.push(UnifiedEvent::reasoning(delta));
            }
        }
        "response.reasoning_summary_text.delta" => {
            let delta = str_at(root, "delta");
            if !delta.is_empty() {
                events.push(UnifiedEvent {
                    kind: EventKind::ReasoningSummary,
                    reasoning_summary: delta.to_string(),
                    ..Default::default()
                });
            }
        }
        "response.output_item.added" => {
            let item = root.get("item").unwrap_or(&NULL);
            let item_type = str_at(item, "type");
            if item_type == "function_call" || item_type == "custom_tool_call" {
                let index = root
                    .get("output_index")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as usize;
                events.push(UnifiedEvent {
                    kind: EventKind::ToolCall,
                    tool_call: Some(ToolCall {
                        id: str_at(item, "call_id").to_string(),
                        name: str_at(item, "name").to_string(),
                        args: str_at(item, "arguments").to_string(),
                        item_id: str_at(item, "id").to_string(),
                        is_custom: item_type == "custom_tool_call",
                        ..Default::default()
                    }),
                    tool_call_index: index,
                    ..Default::default()
                });
            }
        }
        "response.function_call_arguments.delta" | "response.custom_tool_call_input.delta" => {
            let index = root
                .get("output_index")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;
            let delta = str_at(root, "delta");
            if !delta.is_empty() {
                events.push(UnifiedEvent {
                    kind: EventKind::ToolCallDelta,
                    tool_call: Some(ToolCall {
                        args: delta.to_string(),
                        item_id: str_at(root, "item_id").to_string(),
                        is_custom: str_at(root, "type")
                            == "response.custom_tool_call_input.delta",
                        ..Default::default()
                    }),
                    tool_call_index: index,
                    ..Default::default()
                });
            }
        }
        "response.output_item.done" => {
            let item = root.get("item").unwrap_or(&NULL);
            let item_type = str_at(item, "type");
            if item_type == "function_call" || item_type == "custom_tool_call" {
                let index = root
                    .get("output_index")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as usize;
                events.push(UnifiedEvent {
                    kind: EventKind::ToolCallDelta,
                    tool_call: Some(ToolCall {
                        item_id: str_at(item, "id").to_string(),
                        is_complete: true,
                        is_custom: item_type == "custom_tool_call",
                        ..Default::default()
                    }),
                    tool_call_index: index,
                    ..Default::default()
                });
            }
        }
        "response.completed" | "response.done" => {
            let response = root.get("response").unwrap_or(&NULL);
            let usage = parse_responses_usage(response.get("usage"));
            events.push(UnifiedEvent::finish(FinishReason::Stop, usage));
        }
        "response.failed" | "error" => {
            let message = root
                .get("response")
                .and_then(|r| r.get("error"))
                .or_else(|| root.get("error"))
                .map(|e| str_at(e, "message").to_string())
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "upstream response failed".to_string());
            events.push(UnifiedEvent::error(message));
        }
        _ => {}
    }
    events
}

pub(crate) fn str_at<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

pub(crate) fn int_at(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_chat_request_basics() {
        let raw = json!({
            "model": "gpt-4o",
            "temperature": 0.3,
            "max_tokens": 256,
            "stop": ["END"],
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "hi"}
            ]
        });
        let req = parse_openai_request(raw.to_string().as_bytes()).unwrap();
        assert_eq!(req.model, "gpt-4o");
        assert_eq!(req.temperature, Some(0.3));
        assert_eq!(req.max_tokens, Some(256));
        assert_eq!(req.stop_sequences, vec!["END"]);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1].combined_text(), "hi");
    }

    #[test]
    fn test_parse_chat_request_tool_round() {
        let raw = json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "tool_calls": [
                    {"id": "call_1|sig:abc", "type": "function",
                     "function": {"name": "get_weather", "arguments": "{\"city\":\"SF\"}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_1", "content": "sunny"}
            ],
            "tools": [
                {"type": "function", "function": {
                    "name": "get_weather", "description": "d",
                    "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
                }}
            ]
        });
        let req = parse_openai_request(raw.to_string().as_bytes()).unwrap();
        assert_eq!(req.tools.len(), 1);
        let assistant = &req.messages[1];
        assert_eq!(assistant.tool_calls[0].id, "call_1");
        assert_eq!(
            assistant.tool_calls[0].thought_signature.as_deref(),
            Some("abc")
        );
        let tool = &req.messages[2];
        assert_eq!(tool.role, Role::Tool);
        assert!(tool.has_tool_result());
    }

    #[test]
    fn test_parse_chat_request_image_part() {
        let raw = json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "what is this"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,QUJD"}}
            ]}]
        });
        let req = parse_openai_request(raw.to_string().as_bytes()).unwrap();
        let parts = &req.messages[0].content;
        assert_eq!(parts.len(), 2);
        match &parts[1] {
            ContentPart::Image { image, .. } => {
                assert_eq!(image.mime_type, "image/png");
                assert_eq!(image.data, "QUJD");
            }
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_responses_request_items() {
        let raw = json!({
            "model": "gpt-5",
            "instructions": "be safe",
            "reasoning": {"effort": "medium"},
            "input": [
                {"type": "message", "role": "user",
                 "content": [{"type": "input_text", "text": "run it"}]},
                {"type": "function_call", "call_id": "call_2", "name": "run",
                 "arguments": "{\"x\":1}", "id": "fc_9"},
                {"type": "function_call_output", "call_id": "call_2", "output": "done"}
            ]
        });
        let req = parse_responses_request(raw.to_string().as_bytes()).unwrap();
        assert_eq!(req.instructions, "be safe");
        assert_eq!(req.thinking.as_ref().unwrap().budget, 8192);
        // system (from instructions) + user + assistant(call) + tool
        assert_eq!(req.messages.len(), 4);
        assert_eq!(req.messages[2].tool_calls[0].item_id, "fc_9");
        assert_eq!(req.messages[3].role, Role::Tool);
    }

    #[test]
    fn test_parse_chat_completion_response() {
        let raw = json!({
            "object": "chat.completion",
            "choices": [{"index": 0, "finish_reason": "tool_calls", "message": {
                "role": "assistant",
                "content": "checking",
                "tool_calls": [{"id": "call_3", "type": "function",
                    "function": {"name": "f", "arguments": "{}"}}]
            }}],
            "usage": {"prompt_tokens": 7, "completion_tokens": 5, "total_tokens": 12,
                      "completion_tokens_details": {"reasoning_tokens": 2}}
        });
        let (messages, usage) = parse_openai_response(raw.to_string().as_bytes()).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].tool_calls.len(), 1);
        let usage = usage.unwrap();
        assert_eq!(usage.total_tokens, 12);
        assert_eq!(usage.thoughts_token_count, 2);
    }

    #[test]
    fn test_parse_responses_object_response() {
        let raw = json!({
            "object": "response",
            "output": [
                {"type": "reasoning", "summary": [{"type": "summary_text", "text": "hmm"}]},
                {"type": "message", "content": [{"type": "output_text", "text": "hi"}]},
                {"type": "function_call", "call_id": "call_4", "name": "f", "arguments": "{}"}
            ],
            "usage": {"input_tokens": 3, "output_tokens": 4, "total_tokens": 7}
        });
        let (messages, usage) = parse_openai_response(raw.to_string().as_bytes()).unwrap();
        assert_eq!(messages[0].combined_reasoning(), "hmm");
        assert_eq!(messages[0].combined_text(), "hi");
        assert_eq!(messages[0].tool_calls[0].id, "call_4");
        assert_eq!(usage.unwrap().total_tokens, 7);
    }

    #[test]
    fn test_parse_chunk_done_marker() {
        let events = parse_openai_chunk(b"data: [DONE]").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Finish);
    }

    #[test]
    fn test_parse_chat_chunk_content_and_finish() {
        let chunk = json!({
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": "hel"}}]
        });
        let events =
            parse_openai_chunk(format!("data: {chunk}").as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].content, "hel");

        let fin = json!({
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
        });
        let events = parse_openai_chunk(fin.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].kind, EventKind::Finish);
        assert_eq!(events[0].usage.as_ref().unwrap().total_tokens, 3);
    }

    #[test]
    fn test_parse_chat_chunk_tool_call_delta() {
        let header = json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "call_5", "type": "function",
                 "function": {"name": "f", "arguments": ""}}
            ]}}]
        });
        let events = parse_openai_chunk(header.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].kind, EventKind::ToolCall);
        assert_eq!(events[0].tool_call.as_ref().unwrap().name, "f");

        let delta = json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "{\"a\":"}}
            ]}}]
        });
        let events = parse_openai_chunk(delta.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].kind, EventKind::ToolCallDelta);
        assert_eq!(events[0].tool_call.as_ref().unwrap().args, "{\"a\":");
    }

    #[test]
    fn test_parse_responses_stream_events() {
        let added = json!({
            "type": "response.output_item.added",
            "output_index": 2,
            "item": {"id": "fc_1", "type": "function_call", "call_id": "call_6", "name": "f"}
        });
        let events = parse_openai_chunk(added.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].kind, EventKind::ToolCall);
        let tc = events[0].tool_call.as_ref().unwrap();
        assert_eq!(tc.item_id, "fc_1");
        assert_eq!(tc.id, "call_6");
        assert_eq!(events[0].tool_call_index, 2);

        let delta = json!({
            "type": "response.function_call_arguments.delta",
            "output_index": 2, "item_id": "fc_1", "delta": "{\"x\""
        });
        let events = parse_openai_chunk(delta.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].kind, EventKind::ToolCallDelta);
        assert_eq!(events[0].tool_call.as_ref().unwrap().item_id, "fc_1");

        let done = json!({
            "type": "response.completed",
            "response": {"usage": {"input_tokens": 1, "output_tokens": 2, "total_tokens": 3}}
        });
        let events = parse_openai_chunk(done.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].kind, EventKind::Finish);
        assert_eq!(events[0].usage.as_ref().unwrap().total_tokens, 3);
    }

    #[test]
    fn test_invalid_json_is_typed_error() {
        let err = parse_openai_chunk(b"data: {broken").unwrap_err();
        assert_eq!(err.kind, llm_relay_types::ErrorKind::Parse);
    }
}
