// Ollama request parsers: /api/chat and /api/generate.

use serde_json::Value;

use llm_relay_types::{
    ContentPart, Error, ImagePart, Message, Role, ToolCall, ToolDefinition, UnifiedRequest,
};

use super::openai::str_at;
use crate::util::ids::gen_tool_call_id_with_name;

/// Parse an Ollama request: `/api/chat` when `messages` is present,
/// `/api/generate` when only `prompt` is.
pub fn parse_ollama_request(raw: &[u8]) -> Result<UnifiedRequest, Error> {
    let root: Value = serde_json::from_slice(raw)?;
    if root.get("messages").is_some() {
        parse_chat(&root)
    } else {
        parse_generate(&root)
    }
}

fn parse_chat(root: &Value) -> Result<UnifiedRequest, Error> {
    let mut req = UnifiedRequest {
        model: str_at(root, "model").to_string(),
        ..Default::default()
    };
    apply_options(&mut req, root.get("options"));

    if let Some(Value::Array(tools)) = root.get("tools") {
        for tool in tools {
            let function = tool.get("function").unwrap_or(tool);
            let name = str_at(function, "name");
            if name.is_empty() {
                continue;
            }
            req.tools.push(ToolDefinition {
                name: name.to_string(),
                description: str_at(function, "description").to_string(),
                parameters: function.get("parameters").cloned(),
                ..Default::default()
            });
        }
    }

    if let Some(Value::Array(messages)) = root.get("messages") {
        for msg in messages {
            let role = Role::from_wire(str_at(msg, "role"));
            let mut message = Message {
                role,
                ..Default::default()
            };
            let content = str_at(msg, "content");
            if role == Role::Tool {
                message.content.push(ContentPart::tool_result(
                    str_at(msg, "tool_call_id"),
                    content,
                ));
                req.messages.push(message);
                continue;
            }
            if !content.is_empty() {
                message.content.push(ContentPart::text(content));
            }
            if let Some(Value::Array(images)) = msg.get("images") {
                for image in images.iter().filter_map(Value::as_str) {
                    message.content.push(ContentPart::Image {
                        image: ImagePart {
                            mime_type: "image/png".to_string(),
                            data: image.to_string(),
                            url: String::new(),
                        },
                        thought_signature: None,
                    });
                }
            }
            if let Some(Value::Array(calls)) = msg.get("tool_calls") {
                for call in calls {
                    let function = call.get("function").unwrap_or(call);
                    let name = str_at(function, "name");
                    if name.is_empty() {
                        continue;
                    }
                    let args = function
                        .get("arguments")
                        .map(|a| match a {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .unwrap_or_else(|| "{}".to_string());
                    message.tool_calls.push(ToolCall::new(
                        gen_tool_call_id_with_name(name),
                        name,
                        args,
                    ));
                }
            }
            if !message.content.is_empty() || !message.tool_calls.is_empty() {
                req.messages.push(message);
            }
        }
    }

    Ok(req)
}

fn parse_generate(root: &Value) -> Result<UnifiedRequest, Error> {
    let mut req = UnifiedRequest {
        model: str_at(root, "model").to_string(),
        ..Default::default()
    };
    apply_options(&mut req, root.get("options"));
    req.metadata
        .insert("request_type".into(), Value::String("generate".into()));

    let system = str_at(root, "system");
    if !system.is_empty() {
        req.messages.push(Message::system(system));
    }
    let prompt = str_at(root, "prompt");
    if !prompt.is_empty() {
        req.messages.push(Message::user(prompt));
    }
    Ok(req)
}

fn apply_options(req: &mut UnifiedRequest, options: Option<&Value>) {
    let Some(options) = options else { return };
    req.temperature = options.get("temperature").and_then(Value::as_f64);
    req.top_p = options.get("top_p").and_then(Value::as_f64);
    req.top_k = options.get("top_k").and_then(Value::as_i64);
    req.max_tokens = options.get("num_predict").and_then(Value::as_i64);
    match options.get("stop") {
        Some(Value::String(s)) => req.stop_sequences.push(s.clone()),
        Some(Value::Array(arr)) => req
            .stop_sequences
            .extend(arr.iter().filter_map(Value::as_str).map(str::to_string)),
        _ => {}
    }
}
