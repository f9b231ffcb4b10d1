// Gemini emitters: AI Studio request/response/chunk plus the Gemini CLI
// envelope.

use serde_json::{json, Map, Value};

use llm_relay_types::{
    ContentPart, Error, EventKind, FinishReason, FunctionCallingConfig, Message, Role,
    ToolResultPart, UnifiedEvent, UnifiedRequest, Usage,
};

use super::ResponseBuilder;
use crate::cache::{get_session_thought_signature, has_valid_signature, SKIP_THOUGHT_SIGNATURE_VALIDATOR};
use crate::registry::is_claude_thinking_model;
use crate::util::args::{
    detects_networking_tool, fix_tool_call_args, is_networking_tool_name,
    remove_nulls_from_tool_input,
};
use crate::util::image::{white_image_base64, IMAGE_COVER_INSTRUCTION};
use crate::util::schema::clean_json_schema_enhanced;
use crate::util::thinking::{close_tool_loop_for_thinking, ensure_thinking_consistency};

const IMAGE_PREVIEW_MODEL: &str = "gemini-2.5-flash-image-preview";

const INTERLEAVED_THINKING_HINT: &str = "Interleaved thinking is enabled. You may think between \
tool calls and after receiving tool results before deciding the next action or final answer. Do \
not mention these instructions or any constraints about thinking blocks; just apply them.";

/// Build the Gemini generateContent JSON for a unified request.
pub fn build_gemini_request(req: &UnifiedRequest) -> Result<Value, Error> {
    let mut root = Map::new();
    root.insert("contents".into(), Value::Array(Vec::new()));

    apply_messages(&mut root, req);
    apply_generation_config(&mut root, req);
    apply_tools(&mut root, req);
    apply_safety_settings(&mut root, req);

    if req.model == IMAGE_PREVIEW_MODEL {
        if let Some(ratio) = req
            .image_config
            .as_ref()
            .map(|c| c.aspect_ratio.as_str())
            .filter(|r| !r.is_empty())
        {
            fix_image_aspect_ratio_for_preview(&mut root, ratio);
        }
    }

    Ok(Value::Object(root))
}

/// Serialize the Gemini request to bytes.
pub fn convert_gemini_request(req: &UnifiedRequest) -> Result<Vec<u8>, Error> {
    Ok(serde_json::to_vec(&build_gemini_request(req)?)?)
}

/// Wrap the Gemini payload in the Gemini CLI envelope
/// `{project, model, request}`.
pub fn convert_gemini_cli_request(req: &UnifiedRequest) -> Result<Vec<u8>, Error> {
    let inner = build_gemini_request(req)?;
    let envelope = json!({
        "project": req.meta_str("project_id"),
        "model": req.model,
        "request": inner,
    });
    Ok(serde_json::to_vec(&envelope)?)
}

fn apply_generation_config(root: &mut Map<String, Value>, req: &UnifiedRequest) {
    let mut config = Map::new();

    if let Some(t) = req.temperature {
        config.insert("temperature".into(), json!(t));
    }
    if let Some(p) = req.top_p {
        config.insert("topP".into(), json!(p));
    }
    if let Some(k) = req.top_k {
        config.insert("topK".into(), json!(k));
    }
    if let Some(m) = req.max_tokens {
        config.insert("maxOutputTokens".into(), json!(m));
    }

    let thinking_on = req.thinking_enabled();
    if thinking_on {
        apply_thinking_config(&mut config, req);
    }

    // Thinking mode clears default stop sequences; they cause premature
    // stops mid-reasoning.
    if thinking_on && req.stop_sequences.is_empty() {
        config.insert("stopSequences".into(), json!([]));
    } else if !req.stop_sequences.is_empty() {
        config.insert("stopSequences".into(), json!(req.stop_sequences));
    }

    if !req.response_modality.is_empty() {
        config.insert("responseModalities".into(), json!(req.response_modality));
    }

    if let Some(image) = req.image_config.as_ref() {
        if !image.aspect_ratio.is_empty() && req.model != IMAGE_PREVIEW_MODEL {
            let mut img = Map::new();
            img.insert("aspectRatio".into(), json!(image.aspect_ratio));
            if !image.image_size.is_empty() {
                img.insert("imageSize".into(), json!(image.image_size));
            }
            config.insert("imageConfig".into(), Value::Object(img));
        }
    }

    if let Some(schema) = req.response_schema.as_ref() {
        config.insert("responseMimeType".into(), json!("application/json"));
        config.insert("responseJsonSchema".into(), schema.clone());
    }

    if let Some(fc) = req.function_calling.as_ref() {
        apply_function_calling_config(root, fc);
    }

    if !config.is_empty() {
        root.insert("generationConfig".into(), Value::Object(config));
    }
}

fn apply_thinking_config(config: &mut Map<String, Value>, req: &UnifiedRequest) {
    let Some(thinking) = req.thinking.as_ref() else { return };
    if thinking.budget > 0 {
        config.insert(
            "thinkingConfig".into(),
            json!({"thinkingBudget": thinking.budget, "include_thoughts": true}),
        );
    } else {
        config.insert("thinkingConfig".into(), json!({"includeThoughts": true}));
    }
}

fn apply_function_calling_config(root: &mut Map<String, Value>, fc: &FunctionCallingConfig) {
    let mut inner = Map::new();
    if !fc.mode.is_empty() {
        inner.insert("mode".into(), json!(fc.mode));
    }
    if !fc.allowed_function_names.is_empty() {
        inner.insert("allowedFunctionNames".into(), json!(fc.allowed_function_names));
    }
    if fc.stream_function_call_arguments {
        inner.insert("streamFunctionCallArguments".into(), json!(true));
    }
    if !inner.is_empty() {
        root.insert(
            "toolConfig".into(),
            json!({"functionCallingConfig": Value::Object(inner)}),
        );
    }
}

fn apply_messages(root: &mut Map<String, Value>, req: &UnifiedRequest) {
    let mut contents: Vec<Value> = Vec::new();
    let tool_names = build_tool_call_map(&req.messages);
    let tool_results = build_tool_results_map(&req.messages);

    // Thinking histories must open the last assistant turn with a
    // reasoning block; repair structurally, then close a broken tool loop
    // with a synthetic exchange when that is not enough.
    let mut messages = req.messages.clone();
    if req.thinking_enabled() {
        ensure_thinking_consistency(&mut messages);
        close_tool_loop_for_thinking(&mut messages);
    }

    let inject_hint = !req.tools.is_empty()
        && req.thinking.as_ref().map(|t| t.budget > 0).unwrap_or(false)
        && is_claude_thinking_model(&req.model);

    for msg in &messages {
        match msg.role {
            Role::System => apply_system_message(root, msg, inject_hint),
            Role::User => apply_user_message(&mut contents, msg),
            Role::Assistant => {
                apply_assistant_message(&mut contents, msg, req, &tool_names, &tool_results)
            }
            Role::Tool => {}
        }
    }

    if inject_hint && !root.contains_key("systemInstruction") {
        root.insert(
            "systemInstruction".into(),
            json!({"role": "user", "parts": [{"text": INTERLEAVED_THINKING_HINT}]}),
        );
    }

    if !contents.is_empty() {
        root.insert("contents".into(), Value::Array(contents));
    }
}

fn build_tool_call_map(messages: &[Message]) -> Map<String, Value> {
    let mut map = Map::new();
    for msg in messages {
        if msg.role == Role::Assistant {
            for tc in &msg.tool_calls {
                map.insert(tc.id.clone(), Value::String(tc.name.clone()));
            }
        }
    }
    map
}

fn build_tool_results_map(messages: &[Message]) -> std::collections::HashMap<String, ToolResultPart> {
    let mut map = std::collections::HashMap::new();
    for msg in messages {
        for part in &msg.content {
            if let ContentPart::ToolResult { tool_result } = part {
                map.insert(tool_result.tool_call_id.clone(), tool_result.clone());
            }
        }
    }
    map
}

fn apply_system_message(root: &mut Map<String, Value>, msg: &Message, inject_hint: bool) {
    let text = msg.combined_text();
    if text.is_empty() {
        return;
    }
    let mut parts = vec![json!({"text": text})];
    if inject_hint {
        parts.push(json!({"text": INTERLEAVED_THINKING_HINT}));
    }
    root.insert(
        "systemInstruction".into(),
        json!({"role": "user", "parts": parts}),
    );
}

fn apply_user_message(contents: &mut Vec<Value>, msg: &Message) {
    let mut parts: Vec<Value> = Vec::new();
    for part in &msg.content {
        match part {
            ContentPart::Text { text, .. } => parts.push(json!({"text": text})),
            ContentPart::Image { image, .. } => parts.push(json!({
                "inlineData": {"mimeType": image.mime_type, "data": image.data},
                "thoughtSignature": SKIP_THOUGHT_SIGNATURE_VALIDATOR,
            })),
            _ => {}
        }
    }
    if !parts.is_empty() {
        contents.push(json!({"role": "user", "parts": parts}));
    }
}

fn apply_assistant_message(
    contents: &mut Vec<Value>,
    msg: &Message,
    req: &UnifiedRequest,
    tool_names: &Map<String, Value>,
    tool_results: &std::collections::HashMap<String, ToolResultPart>,
) {
    if msg.tool_calls.is_empty() {
        apply_assistant_text(contents, msg, req);
    } else {
        apply_assistant_tool_calls(contents, msg, req, tool_names, tool_results);
    }
}

fn resolve_signature(session_id: &str, explicit: Option<&str>) -> String {
    if !session_id.is_empty() {
        let cached = get_session_thought_signature(session_id);
        if !cached.is_empty() {
            return cached;
        }
    }
    match explicit {
        Some(sig) if has_valid_signature("", sig) => sig.to_string(),
        _ => String::new(),
    }
}

fn apply_assistant_text(contents: &mut Vec<Value>, msg: &Message, req: &UnifiedRequest) {
    let session_id = req.meta_str("session_id");
    let mut parts: Vec<Value> = Vec::new();

    for part in &msg.content {
        match part {
            ContentPart::Reasoning {
                reasoning,
                thought_signature,
            } => {
                let sig = resolve_signature(session_id, thought_signature.as_deref());
                if !has_valid_signature(&req.model, &sig) {
                    continue;
                }
                parts.push(json!({"text": reasoning, "thought": true, "thoughtSignature": sig}));
            }
            ContentPart::Text {
                text,
                thought_signature,
            } => {
                let mut obj = json!({"text": text});
                if let Some(sig) = thought_signature.as_deref().filter(|s| !s.is_empty()) {
                    obj["thoughtSignature"] = json!(sig);
                }
                parts.push(obj);
            }
            ContentPart::Image { image, .. } => parts.push(json!({
                "inlineData": {"mimeType": image.mime_type, "data": image.data},
                "thoughtSignature": SKIP_THOUGHT_SIGNATURE_VALIDATOR,
            })),
            _ => {}
        }
    }

    if !parts.is_empty() {
        contents.push(json!({"role": "model", "parts": parts}));
    }
}

fn apply_assistant_tool_calls(
    contents: &mut Vec<Value>,
    msg: &Message,
    req: &UnifiedRequest,
    tool_names: &Map<String, Value>,
    tool_results: &std::collections::HashMap<String, ToolResultPart>,
) {
    let session_id = req.meta_str("session_id");
    let mut parts: Vec<Value> = Vec::new();
    let mut tool_call_ids: Vec<String> = Vec::new();
    let mut current_thinking_signature = String::new();

    for part in &msg.content {
        match part {
            ContentPart::Reasoning {
                reasoning,
                thought_signature,
            } => {
                let sig = resolve_signature(session_id, thought_signature.as_deref());
                if !has_valid_signature(&req.model, &sig) {
                    continue;
                }
                current_thinking_signature = sig.clone();
                parts.push(json!({"text": reasoning, "thought": true, "thoughtSignature": sig}));
            }
            ContentPart::Text {
                text,
                thought_signature,
            } if !text.is_empty() => {
                let mut obj = json!({"text": text});
                if let Some(sig) = thought_signature.as_deref().filter(|s| !s.is_empty()) {
                    obj["thoughtSignature"] = json!(sig);
                }
                parts.push(obj);
            }
            _ => {}
        }
    }

    for (i, tc) in msg.tool_calls.iter().enumerate() {
        let args = clean_tool_call_args(tc, req);
        let tool_id = if tc.id.is_empty() {
            crate::util::ids::gen_tool_call_id_with_name(&tc.name)
        } else {
            tc.id.clone()
        };
        let mut part = json!({
            "functionCall": {"name": tc.name, "args": args, "id": tool_id}
        });

        // Signature priority: the reasoning block of this message, then
        // the call's own signature, then the sentinel for the first call.
        let own_sig = tc.thought_signature.as_deref().unwrap_or("");
        if has_valid_signature(&req.model, &current_thinking_signature) {
            part["thoughtSignature"] = json!(current_thinking_signature);
        } else if has_valid_signature(&req.model, own_sig) {
            part["thoughtSignature"] = json!(own_sig);
        } else if i == 0 {
            part["thoughtSignature"] = json!(SKIP_THOUGHT_SIGNATURE_VALIDATOR);
        }

        parts.push(part);
        tool_call_ids.push(tool_id);
    }

    contents.push(json!({"role": "model", "parts": parts}));
    apply_tool_responses(contents, &tool_call_ids, tool_names, tool_results);
}

fn clean_tool_call_args(tc: &llm_relay_types::ToolCall, req: &UnifiedRequest) -> Value {
    let parsed: Value = match serde_json::from_str(&tc.args) {
        Ok(v) => v,
        Err(_) => json!({}),
    };
    let mut cleaned = remove_nulls_from_tool_input(parsed);
    if let Value::Object(args_map) = &mut cleaned {
        if let Some(schema) = req
            .tools
            .iter()
            .find(|t| t.name == tc.name)
            .and_then(|t| t.parameters.as_ref())
            .and_then(Value::as_object)
        {
            fix_tool_call_args(args_map, schema);
        }
    }
    cleaned
}

fn apply_tool_responses(
    contents: &mut Vec<Value>,
    tool_call_ids: &[String],
    tool_names: &Map<String, Value>,
    tool_results: &std::collections::HashMap<String, ToolResultPart>,
) {
    let mut parts: Vec<Value> = Vec::new();
    for id in tool_call_ids {
        let Some(name) = tool_names.get(id).and_then(Value::as_str) else {
            continue;
        };
        let Some(result) = tool_results.get(id) else {
            continue;
        };
        let mut part = json!({
            "functionResponse": {
                "name": name,
                "id": id,
                "response": parse_result_json(&result.result),
            }
        });
        if let Some(sig) = result.thought_signature.as_deref().filter(|s| !s.is_empty()) {
            part["thoughtSignature"] = json!(sig);
        }
        parts.push(part);
    }
    if !parts.is_empty() {
        contents.push(json!({"role": "user", "parts": parts}));
    }
}

fn parse_result_json(result: &str) -> Value {
    match serde_json::from_str::<Value>(result) {
        Ok(v @ Value::Object(_)) | Ok(v @ Value::Array(_)) => v,
        _ => json!({"content": result}),
    }
}

fn apply_tools(root: &mut Map<String, Value>, req: &UnifiedRequest) {
    let mut google_search = req.metadata.get("google_search").cloned();
    if google_search.is_none() && detects_networking_tool(&req.tools) {
        google_search = Some(json!({}));
    }

    // Networking tools ride on googleSearch, never as declarations.
    let mut funcs: Vec<Value> = Vec::new();
    for tool in &req.tools {
        if is_networking_tool_name(&tool.name) {
            continue;
        }
        let parameters = match tool.parameters.as_ref().and_then(Value::as_object) {
            Some(schema) if !schema.is_empty() => {
                let mut cleaned = schema.clone();
                clean_json_schema_enhanced(&mut cleaned);
                Value::Object(cleaned)
            }
            _ => json!({"type": "object", "properties": {}}),
        };
        funcs.push(json!({
            "name": tool.name,
            "description": tool.description,
            "parameters": parameters,
        }));
    }

    if funcs.is_empty() && google_search.is_none() {
        return;
    }

    // The v1internal endpoints reject mixed search + functions, so
    // googleSearch only goes out alone.
    let mut tools: Vec<Value> = Vec::new();
    if !funcs.is_empty() {
        tools.push(json!({"functionDeclarations": funcs}));
    } else if let Some(gs) = google_search {
        tools.push(json!({"googleSearch": gs}));
    }
    let has_funcs = tools
        .first()
        .map(|t| t.get("functionDeclarations").is_some())
        .unwrap_or(false);
    root.insert("tools".into(), Value::Array(tools));

    if has_funcs && !root.contains_key("toolConfig") {
        let mode = match req.tool_choice.as_str() {
            "none" => "NONE",
            "required" | "any" => "ANY",
            _ => "AUTO",
        };
        root.insert(
            "toolConfig".into(),
            json!({"functionCallingConfig": {"mode": mode}}),
        );
    }
}

fn apply_safety_settings(root: &mut Map<String, Value>, req: &UnifiedRequest) {
    if req.safety_settings.is_empty() {
        root.insert(
            "safetySettings".into(),
            json!([
                {"category": "HARM_CATEGORY_HARASSMENT", "threshold": "OFF"},
                {"category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "OFF"},
                {"category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "OFF"},
                {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "OFF"},
                {"category": "HARM_CATEGORY_CIVIC_INTEGRITY", "threshold": "BLOCK_NONE"}
            ]),
        );
        return;
    }
    let settings: Vec<Value> = req
        .safety_settings
        .iter()
        .map(|s| json!({"category": s.category, "threshold": s.threshold}))
        .collect();
    root.insert("safetySettings".into(), Value::Array(settings));
}

fn fix_image_aspect_ratio_for_preview(root: &mut Map<String, Value>, aspect_ratio: &str) {
    let Some(Value::Array(contents)) = root.get("contents") else {
        return;
    };
    if contents.is_empty() {
        return;
    }

    // An existing inline image means the request is an edit; leave it.
    let has_image = contents.iter().any(|content| {
        content
            .get("parts")
            .and_then(Value::as_array)
            .map(|parts| parts.iter().any(|p| p.get("inlineData").is_some()))
            .unwrap_or(false)
    });
    if has_image {
        return;
    }

    let Some(white) = white_image_base64(aspect_ratio) else {
        return;
    };

    if let Some(Value::Array(contents)) = root.get_mut("contents") {
        if let Some(first) = contents.first_mut() {
            if let Some(Value::Array(parts)) = first.get_mut("parts") {
                let mut new_parts = vec![
                    json!({"text": IMAGE_COVER_INSTRUCTION}),
                    json!({"inlineData": {"mime_type": "image/png", "data": white}}),
                ];
                new_parts.append(parts);
                *parts = new_parts;
            }
        }
    }

    if !matches!(root.get("generationConfig"), Some(Value::Object(_))) {
        root.insert(
            "generationConfig".into(),
            json!({"responseModalities": ["IMAGE", "TEXT"]}),
        );
        return;
    }
    if let Some(Value::Object(config)) = root.get_mut("generationConfig") {
        config.insert("responseModalities".into(), json!(["IMAGE", "TEXT"]));
        config.remove("imageConfig");
    }
}

// ---------------------------------------------------------------------------
// Responses and chunks
// ---------------------------------------------------------------------------

/// Build a complete Gemini response from IR messages.
pub fn to_gemini_response(
    messages: &[Message],
    usage: Option<&Usage>,
    model: &str,
) -> Result<Vec<u8>, Error> {
    let builder = ResponseBuilder::new(messages, usage);
    let mut response = json!({"candidates": [], "modelVersion": model});

    if builder.has_content() {
        let mut parts: Vec<Value> = Vec::new();
        if let Some(msg) = builder.last_assistant() {
            for part in &msg.content {
                match part {
                    ContentPart::Reasoning { reasoning, thought_signature } => {
                        let mut obj = json!({"text": reasoning, "thought": true});
                        if let Some(sig) = thought_signature.as_deref() {
                            obj["thoughtSignature"] = json!(sig);
                        }
                        parts.push(obj);
                    }
                    ContentPart::Text { text, .. } => parts.push(json!({"text": text})),
                    ContentPart::Image { image, .. } => parts.push(json!({
                        "inlineData": {"mimeType": image.mime_type, "data": image.data}
                    })),
                    _ => {}
                }
            }
            for tc in &msg.tool_calls {
                parts.push(json!({
                    "functionCall": {
                        "name": tc.name,
                        "args": parse_result_json(&tc.args),
                        "id": tc.id,
                    }
                }));
            }
        }
        response["candidates"] = json!([{
            "content": {"role": "model", "parts": parts},
            "finishReason": builder.finish_reason().to_gemini(),
        }]);
    }

    if let Some(usage) = usage {
        response["usageMetadata"] = gemini_usage_metadata(usage);
    }

    Ok(serde_json::to_vec(&response)?)
}

/// Build one Gemini streaming chunk from an IR event. Returns `None` for
/// event kinds Gemini does not stream.
pub fn to_gemini_chunk(event: &UnifiedEvent, model: &str) -> Result<Option<Vec<u8>>, Error> {
    let mut candidate = json!({"content": {"role": "model", "parts": []}});
    let mut chunk = json!({"modelVersion": model});

    match event.kind {
        EventKind::Token => {
            candidate["content"]["parts"] = json!([{"text": event.content}]);
        }
        EventKind::Reasoning => {
            candidate["content"]["parts"] = json!([{"text": event.reasoning, "thought": true}]);
        }
        EventKind::ToolCall => {
            let Some(tc) = event.tool_call.as_ref() else {
                return Ok(None);
            };
            candidate["content"]["parts"] = json!([{
                "functionCall": {"name": tc.name, "args": parse_result_json(&tc.args)}
            }]);
        }
        EventKind::Image => {
            let Some(image) = event.image.as_ref() else {
                return Ok(None);
            };
            candidate["content"]["parts"] = json!([{
                "inlineData": {"mimeType": image.mime_type, "data": image.data}
            }]);
        }
        EventKind::Finish => {
            candidate["finishReason"] =
                json!(event.finish_reason.unwrap_or(FinishReason::Stop).to_gemini());
            if let Some(usage) = event.usage.as_ref() {
                chunk["usageMetadata"] = gemini_usage_metadata(usage);
            }
        }
        EventKind::Error => {
            return Err(Error::upstream(format!("stream error: {}", event.error)));
        }
        _ => return Ok(None),
    }

    chunk["candidates"] = json!([candidate]);
    let mut bytes = serde_json::to_vec(&chunk)?;
    bytes.push(b'\n');
    Ok(Some(bytes))
}

fn gemini_usage_metadata(usage: &Usage) -> Value {
    json!({
        "promptTokenCount": usage.prompt_tokens,
        "candidatesTokenCount": usage.completion_tokens,
        "totalTokenCount": usage.total_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_relay_types::{ThinkingConfig, ToolCall, ToolDefinition};
    use serde_json::json;

    fn base_request() -> UnifiedRequest {
        UnifiedRequest {
            model: "gemini-2.5-pro".into(),
            messages: vec![Message::system("be terse"), Message::user("hi")],
            ..Default::default()
        }
    }

    #[test]
    fn test_request_system_instruction_and_contents() {
        let body = build_gemini_request(&base_request()).unwrap();
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "be terse"
        );
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        // Default safety settings attach when the client set none.
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_request_thinking_clears_stop_sequences() {
        let mut req = base_request();
        req.thinking = Some(ThinkingConfig {
            budget: 2048,
            include_thoughts: true,
            ..Default::default()
        });
        let body = build_gemini_request(&req).unwrap();
        let config = &body["generationConfig"];
        assert_eq!(config["thinkingConfig"]["thinkingBudget"], 2048);
        assert_eq!(config["stopSequences"], json!([]));
    }

    #[test]
    fn test_request_tool_declarations_cleaned() {
        let mut req = base_request();
        req.tools.push(ToolDefinition {
            name: "search".into(),
            description: "d".into(),
            parameters: Some(json!({
                "type": "object",
                "properties": {"q": {"anyOf": [{"type": "string"}, {"type": "null"}]}},
                "additionalProperties": false
            })),
            ..Default::default()
        });
        let body = build_gemini_request(&req).unwrap();
        let decl = &body["tools"][0]["functionDeclarations"][0];
        assert_eq!(decl["name"], "search");
        assert_eq!(decl["parameters"]["properties"]["q"]["type"], "string");
        assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "AUTO");
    }

    #[test]
    fn test_request_networking_tool_becomes_google_search() {
        let mut req = base_request();
        req.tools.push(ToolDefinition {
            name: "web_search".into(),
            ..Default::default()
        });
        let body = build_gemini_request(&req).unwrap();
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert!(tools[0].get("googleSearch").is_some());
    }

    #[test]
    fn test_assistant_tool_call_gets_sentinel_signature() {
        let mut req = base_request();
        let mut assistant = Message {
            role: Role::Assistant,
            ..Default::default()
        };
        assistant.tool_calls.push(ToolCall::new("run-1", "run", "{\"x\":null}"));
        req.messages.push(assistant);
        req.messages.push(Message::tool_result("run-1", "{\"ok\":true}"));

        let body = build_gemini_request(&req).unwrap();
        let contents = body["contents"].as_array().unwrap();
        // user, model(functionCall), user(functionResponse)
        assert_eq!(contents.len(), 3);
        let call_part = &contents[1]["parts"][0];
        assert_eq!(
            call_part["thoughtSignature"],
            SKIP_THOUGHT_SIGNATURE_VALIDATOR
        );
        // Nulls are stripped from args.
        assert_eq!(call_part["functionCall"]["args"], json!({}));
        let resp_part = &contents[2]["parts"][0];
        assert_eq!(resp_part["functionResponse"]["name"], "run");
        assert_eq!(resp_part["functionResponse"]["response"]["ok"], true);
    }

    #[test]
    fn test_unsigned_reasoning_filtered_from_history() {
        let mut req = base_request();
        let mut assistant = Message::assistant("answer");
        assistant
            .content
            .insert(0, ContentPart::reasoning("stripped", Some("short".into())));
        req.messages.push(assistant);
        let body = build_gemini_request(&req).unwrap();
        let parts = body["contents"][1]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["text"], "answer");
    }

    #[test]
    fn test_thinking_consistency_injects_placeholder() {
        let mut req = base_request();
        req.thinking = Some(ThinkingConfig {
            budget: 1024,
            include_thoughts: true,
            ..Default::default()
        });
        req.messages.push(Message::assistant("plain"));
        let body = build_gemini_request(&req).unwrap();
        let parts = body["contents"][1]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["thought"], true);
        assert_eq!(parts[0]["thoughtSignature"], SKIP_THOUGHT_SIGNATURE_VALIDATOR);
    }

    #[test]
    fn test_image_preview_placeholder_injected() {
        let mut req = base_request();
        req.model = IMAGE_PREVIEW_MODEL.into();
        req.image_config = Some(llm_relay_types::ImageConfig {
            aspect_ratio: "16:9".into(),
            ..Default::default()
        });
        let body = build_gemini_request(&req).unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["text"], IMAGE_COVER_INSTRUCTION);
        assert!(parts[1].get("inlineData").is_some());
        assert_eq!(
            body["generationConfig"]["responseModalities"],
            json!(["IMAGE", "TEXT"])
        );
    }

    #[test]
    fn test_cli_envelope() {
        let mut req = base_request();
        req.metadata
            .insert("project_id".into(), json!("proj-1"));
        let bytes = convert_gemini_cli_request(&req).unwrap();
        let envelope: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope["project"], "proj-1");
        assert_eq!(envelope["model"], "gemini-2.5-pro");
        assert!(envelope["request"].get("contents").is_some());
    }

    #[test]
    fn test_chunk_token_and_finish() {
        let bytes = to_gemini_chunk(&UnifiedEvent::token("hi"), "m")
            .unwrap()
            .unwrap();
        let chunk: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(chunk["candidates"][0]["content"]["parts"][0]["text"], "hi");

        let finish = UnifiedEvent::finish(
            FinishReason::ToolCalls,
            Some(Usage {
                prompt_tokens: 1,
                completion_tokens: 2,
                total_tokens: 3,
                ..Default::default()
            }),
        );
        let bytes = to_gemini_chunk(&finish, "m").unwrap().unwrap();
        let chunk: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(chunk["candidates"][0]["finishReason"], "STOP");
        assert_eq!(chunk["usageMetadata"]["totalTokenCount"], 3);
    }

    #[test]
    fn test_response_round() {
        let mut assistant = Message::assistant("out");
        assistant.tool_calls.push(ToolCall::new("f-1", "f", "{\"a\":1}"));
        let usage = Usage {
            prompt_tokens: 2,
            completion_tokens: 3,
            total_tokens: 5,
            ..Default::default()
        };
        let bytes = to_gemini_response(&[assistant], Some(&usage), "m").unwrap();
        let resp: Value = serde_json::from_slice(&bytes).unwrap();
        let parts = resp["candidates"][0]["content"]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "out");
        assert_eq!(parts[1]["functionCall"]["name"], "f");
        assert_eq!(resp["usageMetadata"]["totalTokenCount"], 5);
    }
}
