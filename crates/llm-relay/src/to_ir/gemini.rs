// Gemini AI Studio parsers: requests, responses and stream chunks.

use serde_json::Value;

use llm_relay_types::{
    ContentPart, Error, EventKind, FinishReason, FunctionCallingConfig, ImagePart, Message,
    ResponseMeta, Role, SafetySetting, ThinkingConfig, ToolCall, ToolDefinition, UnifiedEvent,
    UnifiedRequest, Usage,
};

use super::openai::{int_at, str_at};
use crate::to_ir::antigravity::ToolSchemaContext;
use crate::util::ids::gen_tool_call_id_with_name;
use crate::util::text::{
    extract_sse_data, parse_malformed_function_call, validate_and_normalize_json,
};

/// Parse a Gemini generateContent request.
pub fn parse_gemini_request(raw: &[u8]) -> Result<UnifiedRequest, Error> {
    let root: Value = serde_json::from_slice(raw)?;
    let mut req = UnifiedRequest::default();

    if let Some(si) = root.get("systemInstruction").or_else(|| root.get("system_instruction")) {
        let text = collect_parts_text(si.get("parts"));
        if !text.is_empty() {
            req.messages.push(Message::system(text));
        }
    }

    if let Some(Value::Array(contents)) = root.get("contents") {
        for content in contents {
            parse_gemini_content(content, &mut req.messages);
        }
    }

    if let Some(config) = root.get("generationConfig") {
        req.temperature = config.get("temperature").and_then(Value::as_f64);
        req.top_p = config.get("topP").and_then(Value::as_f64);
        req.top_k = config.get("topK").and_then(Value::as_i64);
        req.max_tokens = config.get("maxOutputTokens").and_then(Value::as_i64);
        if let Some(Value::Array(stops)) = config.get("stopSequences") {
            req.stop_sequences
                .extend(stops.iter().filter_map(Value::as_str).map(str::to_string));
        }
        if let Some(Value::Array(mods)) = config.get("responseModalities") {
            req.response_modality
                .extend(mods.iter().filter_map(Value::as_str).map(str::to_string));
        }
        req.response_schema = config
            .get("responseJsonSchema")
            .or_else(|| config.get("responseSchema"))
            .cloned();
        if let Some(thinking) = config.get("thinkingConfig") {
            req.thinking = Some(ThinkingConfig {
                budget: thinking
                    .get("thinkingBudget")
                    .or_else(|| thinking.get("thinking_budget"))
                    .and_then(Value::as_i64)
                    .unwrap_or(-1),
                include_thoughts: thinking
                    .get("includeThoughts")
                    .or_else(|| thinking.get("include_thoughts"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                ..Default::default()
            });
        }
        if let Some(img) = config.get("imageConfig") {
            req.image_config = Some(llm_relay_types::ImageConfig {
                aspect_ratio: str_at(img, "aspectRatio").to_string(),
                image_size: str_at(img, "imageSize").to_string(),
            });
        }
    }

    if let Some(Value::Array(tools)) = root.get("tools") {
        for tool in tools {
            if let Some(Value::Array(decls)) = tool.get("functionDeclarations") {
                for decl in decls {
                    let name = str_at(decl, "name");
                    if name.is_empty() {
                        continue;
                    }
                    req.tools.push(ToolDefinition {
                        name: name.to_string(),
                        description: str_at(decl, "description").to_string(),
                        parameters: decl.get("parameters").cloned(),
                        ..Default::default()
                    });
                }
            } else if let Some(gs) = tool.get("googleSearch") {
                req.metadata.insert("google_search".into(), gs.clone());
            }
        }
    }

    if let Some(fc) = root
        .get("toolConfig")
        .and_then(|tc| tc.get("functionCallingConfig"))
    {
        let mode = str_at(fc, "mode").to_string();
        req.tool_choice = match mode.as_str() {
            "NONE" => "none".to_string(),
            "ANY" => "any".to_string(),
            _ => "auto".to_string(),
        };
        req.function_calling = Some(FunctionCallingConfig {
            mode,
            allowed_function_names: fc
                .get("allowedFunctionNames")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            stream_function_call_arguments: fc
                .get("streamFunctionCallArguments")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        });
    }

    if let Some(Value::Array(settings)) = root.get("safetySettings") {
        for setting in settings {
            req.safety_settings.push(SafetySetting {
                category: str_at(setting, "category").to_string(),
                threshold: str_at(setting, "threshold").to_string(),
            });
        }
    }

    Ok(req)
}

fn collect_parts_text(parts: Option<&Value>) -> String {
    parts
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

fn parse_gemini_content(content: &Value, out: &mut Vec<Message>) {
    let role = Role::from_wire(str_at(content, "role"));
    let Some(Value::Array(parts)) = content.get("parts") else {
        return;
    };

    let mut message = Message {
        role,
        ..Default::default()
    };
    let mut tool_results: Vec<ContentPart> = Vec::new();

    for part in parts {
        let sig = part_signature(part);
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            if part.get("thought").and_then(Value::as_bool) == Some(true) {
                message.content.push(ContentPart::Reasoning {
                    reasoning: text.to_string(),
                    thought_signature: sig,
                });
            } else if !text.is_empty() {
                message.content.push(ContentPart::Text {
                    text: text.to_string(),
                    thought_signature: sig,
                });
            }
        } else if let Some(fc) = part.get("functionCall") {
            let name = str_at(fc, "name");
            if name.is_empty() {
                continue;
            }
            let id = {
                let explicit = str_at(fc, "id");
                if explicit.is_empty() {
                    gen_tool_call_id_with_name(name)
                } else {
                    explicit.to_string()
                }
            };
            message.tool_calls.push(ToolCall {
                id,
                name: name.to_string(),
                args: normalize_args_value(fc.get("args")),
                thought_signature: sig,
                ..Default::default()
            });
        } else if let Some(fr) = part.get("functionResponse") {
            let result = fr
                .get("response")
                .map(|r| r.to_string())
                .unwrap_or_else(|| "{}".to_string());
            tool_results.push(ContentPart::ToolResult {
                tool_result: llm_relay_types::ToolResultPart {
                    tool_call_id: str_at(fr, "id").to_string(),
                    result,
                    thought_signature: sig,
                },
            });
        } else if let Some(image) = parse_inline_image(part) {
            message.content.push(ContentPart::Image {
                image,
                thought_signature: sig,
            });
        }
    }

    if !message.content.is_empty() || !message.tool_calls.is_empty() {
        out.push(message);
    }
    if !tool_results.is_empty() {
        out.push(Message {
            role: Role::Tool,
            content: tool_results,
            ..Default::default()
        });
    }
}

fn normalize_args_value(args: Option<&Value>) -> String {
    match args {
        Some(Value::Object(_)) | Some(Value::Array(_)) => args
            .map(|a| a.to_string())
            .unwrap_or_else(|| "{}".to_string()),
        Some(Value::String(s)) => validate_and_normalize_json(s),
        _ => "{}".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Parse a non-streaming Gemini response.
pub fn parse_gemini_response(raw: &[u8]) -> Result<(Vec<Message>, Option<Usage>), Error> {
    let (messages, usage, _) = parse_gemini_response_meta(raw, None)?;
    Ok((messages, usage))
}

/// Parse a non-streaming Gemini response with per-turn metadata. An
/// optional schema context normalises tool-call names and argument types
/// against the original client request.
pub fn parse_gemini_response_meta(
    raw: &[u8],
    schema_ctx: Option<&ToolSchemaContext>,
) -> Result<(Vec<Message>, Option<Usage>, ResponseMeta), Error> {
    let root: Value = serde_json::from_slice(raw)?;
    let meta = parse_gemini_meta(&root);
    let usage = parse_gemini_usage(&root);

    let Some(parts) = candidate_parts(&root) else {
        return Ok((Vec::new(), usage, meta));
    };

    let mut message = Message {
        role: Role::Assistant,
        ..Default::default()
    };
    for part in parts {
        append_response_part(part, &mut message, schema_ctx);
    }

    if message.content.is_empty() && message.tool_calls.is_empty() {
        return Ok((Vec::new(), usage, meta));
    }

    let messages = crate::util::thinking::remove_trailing_unsigned_thinking(
        crate::util::thinking::filter_invalid_thinking_blocks(vec![message], ""),
        "",
    );
    Ok((messages, usage, meta))
}

fn candidate_parts(root: &Value) -> Option<&Vec<Value>> {
    root.get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()
}

fn part_signature(part: &Value) -> Option<String> {
    part.get("thoughtSignature")
        .or_else(|| part.get("thought_signature"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn append_response_part(
    part: &Value,
    message: &mut Message,
    schema_ctx: Option<&ToolSchemaContext>,
) {
    let sig = part_signature(part);
    if let Some(text) = part.get("text").and_then(Value::as_str).filter(|t| !t.is_empty()) {
        if part.get("thought").and_then(Value::as_bool) == Some(true) {
            message.content.push(ContentPart::Reasoning {
                reasoning: text.to_string(),
                thought_signature: sig,
            });
        } else {
            message.content.push(ContentPart::Text {
                text: text.to_string(),
                thought_signature: sig,
            });
        }
        return;
    }
    if let Some(fc) = part.get("functionCall") {
        let name = str_at(fc, "name");
        if name.is_empty() {
            return;
        }
        if let Some(tc) = build_tool_call(fc, name, sig, schema_ctx) {
            message.tool_calls.push(tc);
        }
        return;
    }
    if let Some(image) = parse_inline_image(part) {
        message.content.push(ContentPart::Image {
            image,
            thought_signature: sig,
        });
        return;
    }
    if sig.is_some() {
        // A part carrying only a signature: keep it as empty reasoning so
        // the signature survives the turn.
        message.content.push(ContentPart::Reasoning {
            reasoning: String::new(),
            thought_signature: sig,
        });
    }
}

fn build_tool_call(
    fc: &Value,
    name: &str,
    sig: Option<String>,
    schema_ctx: Option<&ToolSchemaContext>,
) -> Option<ToolCall> {
    let mut name = name.to_string();
    let mut args = normalize_args_value(fc.get("args"));

    if let Some(ctx) = schema_ctx {
        name = ctx.resolve_name(&name);
        args = ctx.fix_args(&name, &args);
    }

    let id = {
        let explicit = str_at(fc, "id");
        if explicit.is_empty() {
            gen_tool_call_id_with_name(&name)
        } else {
            explicit.to_string()
        }
    };

    Some(ToolCall {
        id,
        name,
        args,
        thought_signature: sig,
        ..Default::default()
    })
}

// ---------------------------------------------------------------------------
// Stream chunks
// ---------------------------------------------------------------------------

/// Parse one Gemini streaming chunk (raw JSON or a single SSE data line).
pub fn parse_gemini_chunk(raw: &[u8]) -> Result<Vec<UnifiedEvent>, Error> {
    parse_gemini_chunk_with_context(raw, None)
}

/// Parse one Gemini streaming chunk with a tool schema context.
pub fn parse_gemini_chunk_with_context(
    raw: &[u8],
    schema_ctx: Option<&ToolSchemaContext>,
) -> Result<Vec<UnifiedEvent>, Error> {
    let data = extract_sse_data(raw);
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data == b"[DONE]" {
        return Ok(vec![UnifiedEvent::finish(FinishReason::Stop, None)]);
    }
    let root: Value = serde_json::from_slice(data)?;

    let mut events = Vec::new();
    let usage = parse_gemini_usage(&root);
    let mut finish: Option<FinishReason> = None;

    if let Some(candidate) = root
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
    {
        if let Some(parts) = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
        {
            for part in parts {
                append_chunk_part(part, &mut events, schema_ctx);
            }
        }

        if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
            if reason == "MALFORMED_FUNCTION_CALL" {
                // Best-effort recovery: the offending call text rides in
                // finishMessage; a successful repair becomes a normal
                // tool-call event, failure degrades to a clean stop.
                let msg = str_at(candidate, "finishMessage");
                if let Some((name, args)) = parse_malformed_function_call(msg) {
                    let mut tc = ToolCall::new(gen_tool_call_id_with_name(&name), name, args);
                    if let Some(ctx) = schema_ctx {
                        tc.name = ctx.resolve_name(&tc.name);
                        tc.args = ctx.fix_args(&tc.name, &tc.args);
                    }
                    events.push(UnifiedEvent::tool_call(tc));
                    finish = Some(FinishReason::ToolCalls);
                } else {
                    tracing::warn!("unrecoverable MALFORMED_FUNCTION_CALL, finishing stream");
                    finish = Some(FinishReason::Stop);
                }
            } else {
                let mapped = FinishReason::from_gemini(reason);
                if mapped != FinishReason::Unknown || !reason.is_empty() {
                    finish = Some(mapped);
                }
            }
        }
    }

    // Finish fires only on an explicit upstream signal: Gemini sends
    // usageMetadata with a non-zero total in every chunk.
    if let Some(reason) = finish {
        events.push(UnifiedEvent::finish(reason, usage));
    }

    Ok(events)
}

fn append_chunk_part(
    part: &Value,
    events: &mut Vec<UnifiedEvent>,
    schema_ctx: Option<&ToolSchemaContext>,
) {
    let sig = part_signature(part);
    if let Some(text) = part.get("text").and_then(Value::as_str).filter(|t| !t.is_empty()) {
        let mut event = if part.get("thought").and_then(Value::as_bool) == Some(true) {
            UnifiedEvent::reasoning(text)
        } else {
            UnifiedEvent::token(text)
        };
        event.thought_signature = sig;
        events.push(event);
        return;
    }
    if let Some(fc) = part.get("functionCall") {
        let name = str_at(fc, "name");
        if name.is_empty() {
            return;
        }
        if let Some(mut tc) = build_tool_call(fc, name, sig.clone(), schema_ctx) {
            // Incomplete fragments must not be normalised.
            if let Some(pa) = fc.get("partialArgs") {
                tc.partial_args = pa
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| pa.to_string());
            }
            let mut event = UnifiedEvent::tool_call(tc);
            event.thought_signature = sig;
            events.push(event);
        }
        return;
    }
    if let Some(image) = parse_inline_image(part) {
        let mut event = UnifiedEvent {
            kind: EventKind::Image,
            image: Some(image),
            ..Default::default()
        };
        event.thought_signature = sig;
        events.push(event);
        return;
    }
    if let Some(sig) = sig {
        let mut event = UnifiedEvent::reasoning("");
        event.thought_signature = Some(sig);
        events.push(event);
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn parse_gemini_meta(root: &Value) -> ResponseMeta {
    ResponseMeta {
        response_id: str_at(root, "responseId").to_string(),
        native_finish_reason: root
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .map(|c| str_at(c, "finishReason").to_string())
            .unwrap_or_default(),
        ..Default::default()
    }
}

fn parse_gemini_usage(root: &Value) -> Option<Usage> {
    let u = root.get("usageMetadata")?;
    let thoughts = int_at(u, "thoughtsTokenCount");
    let cached = int_at(u, "cachedContentTokenCount");
    // Prompt tokens exclude the cached prefix.
    let prompt = (int_at(u, "promptTokenCount") - cached).max(0);
    Some(Usage {
        prompt_tokens: prompt + thoughts,
        completion_tokens: int_at(u, "candidatesTokenCount"),
        total_tokens: int_at(u, "totalTokenCount"),
        thoughts_token_count: thoughts,
        cached_tokens: cached,
        ..Default::default()
    })
}

pub(crate) fn parse_inline_image(part: &Value) -> Option<ImagePart> {
    let inline = part.get("inlineData").or_else(|| part.get("inline_data"))?;
    let data = str_at(inline, "data");
    if data.is_empty() {
        return None;
    }
    let mut mime = str_at(inline, "mimeType");
    if mime.is_empty() {
        mime = str_at(inline, "mime_type");
    }
    if mime.is_empty() {
        mime = "image/png";
    }
    Some(ImagePart {
        mime_type: mime.to_string(),
        data: data.to_string(),
        url: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request_system_and_contents() {
        let raw = json!({
            "systemInstruction": {"role": "user", "parts": [{"text": "be terse"}]},
            "contents": [
                {"role": "user", "parts": [{"text": "hi"}]},
                {"role": "model", "parts": [{"text": "hello"}]}
            ],
            "generationConfig": {"temperature": 0.5, "topK": 40,
                "thinkingConfig": {"thinkingBudget": 2048, "includeThoughts": true}}
        });
        let req = parse_gemini_request(raw.to_string().as_bytes()).unwrap();
        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[2].role, Role::Assistant);
        assert_eq!(req.top_k, Some(40));
        assert_eq!(req.thinking.as_ref().unwrap().budget, 2048);
    }

    #[test]
    fn test_parse_request_function_round() {
        let raw = json!({
            "contents": [
                {"role": "user", "parts": [{"text": "do"}]},
                {"role": "model", "parts": [
                    {"functionCall": {"name": "run", "args": {"x": 1}, "id": "run-1"}}]},
                {"role": "user", "parts": [
                    {"functionResponse": {"name": "run", "id": "run-1",
                        "response": {"ok": true}}}]}
            ],
            "tools": [{"functionDeclarations": [{"name": "run", "parameters":
                {"type": "object", "properties": {"x": {"type": "integer"}}}}]}]
        });
        let req = parse_gemini_request(raw.to_string().as_bytes()).unwrap();
        assert_eq!(req.tools.len(), 1);
        assert_eq!(req.messages[1].tool_calls[0].id, "run-1");
        assert_eq!(req.messages[2].role, Role::Tool);
        assert!(req.messages[2].has_tool_result());
    }

    #[test]
    fn test_parse_response_thought_and_text() {
        let raw = json!({
            "responseId": "r1",
            "candidates": [{"content": {"role": "model", "parts": [
                {"text": "thinking", "thought": true, "thoughtSignature": "s".repeat(64)},
                {"text": "answer"}
            ]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 4,
                "totalTokenCount": 14, "thoughtsTokenCount": 2, "cachedContentTokenCount": 3}
        });
        let (messages, usage, meta) =
            parse_gemini_response_meta(raw.to_string().as_bytes(), None).unwrap();
        assert_eq!(meta.response_id, "r1");
        assert_eq!(meta.native_finish_reason, "STOP");
        let usage = usage.unwrap();
        // 10 prompt - 3 cached + 2 thoughts
        assert_eq!(usage.prompt_tokens, 9);
        assert_eq!(usage.cached_tokens, 3);
        assert_eq!(messages[0].combined_reasoning(), "thinking");
        assert_eq!(messages[0].combined_text(), "answer");
    }

    #[test]
    fn test_parse_response_trims_unsigned_trailing_reasoning() {
        let raw = json!({
            "candidates": [{"content": {"parts": [
                {"text": "answer"},
                {"text": "tail thought", "thought": true}
            ]}}]
        });
        let (messages, _, _) =
            parse_gemini_response_meta(raw.to_string().as_bytes(), None).unwrap();
        // Unsigned reasoning is demoted to text, not lost.
        assert_eq!(messages[0].combined_text(), "answertail thought");
        assert!(messages[0].combined_reasoning().is_empty());
    }

    #[test]
    fn test_parse_chunk_no_finish_on_usage_only() {
        let raw = json!({
            "candidates": [{"content": {"parts": [{"text": "hi"}]}}],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 1,
                "totalTokenCount": 6}
        });
        let events = parse_gemini_chunk(raw.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Token);
    }

    #[test]
    fn test_parse_chunk_finish_with_usage() {
        let raw = json!({
            "candidates": [{"content": {"parts": [{"text": "bye"}]},
                "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 2,
                "totalTokenCount": 7}
        });
        let events = parse_gemini_chunk(raw.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, EventKind::Finish);
        assert_eq!(events[1].finish_reason, Some(FinishReason::Stop));
        assert_eq!(events[1].usage.as_ref().unwrap().total_tokens, 7);
    }

    #[test]
    fn test_parse_chunk_sse_line() {
        let raw = br#"data: {"candidates":[{"content":{"parts":[{"text":"x"}]}}]}"#;
        let events = parse_gemini_chunk(raw).unwrap();
        assert_eq!(events[0].content, "x");
    }

    #[test]
    fn test_parse_chunk_malformed_function_call_recovered() {
        let raw = json!({
            "candidates": [{
                "finishReason": "MALFORMED_FUNCTION_CALL",
                "finishMessage": "unparsable call:default_api:search{q: 'cats', limit: 3,}"
            }]
        });
        let events = parse_gemini_chunk(raw.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        let tc = events[0].tool_call.as_ref().unwrap();
        assert_eq!(tc.name, "search");
        let args: Value = serde_json::from_str(&tc.args).unwrap();
        assert_eq!(args["q"], "cats");
        assert_eq!(events[1].finish_reason, Some(FinishReason::ToolCalls));
    }

    #[test]
    fn test_parse_chunk_malformed_function_call_unrecoverable() {
        let raw = json!({
            "candidates": [{
                "finishReason": "MALFORMED_FUNCTION_CALL",
                "finishMessage": "hopeless"
            }]
        });
        let events = parse_gemini_chunk(raw.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn test_tool_call_id_generated_when_missing() {
        let raw = json!({
            "candidates": [{"content": {"parts": [
                {"functionCall": {"name": "search", "args": {"q": "x"}}}]}}]
        });
        let events = parse_gemini_chunk(raw.to_string().as_bytes()).unwrap();
        let tc = events[0].tool_call.as_ref().unwrap();
        assert!(tc.id.starts_with("search-"));
    }
}
