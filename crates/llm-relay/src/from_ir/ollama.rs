// Ollama emitters: /api/chat and /api/generate responses, streamed as
// NDJSON (one JSON object per line; the final object carries `done:true`
// plus usage counts).

use serde_json::{json, Value};

use llm_relay_types::{
    Error, EventKind, FinishReason, Message, UnifiedEvent, UnifiedRequest, Usage,
};

use super::ResponseBuilder;

fn created_at() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

fn done_reason(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Length => "length",
        _ => "stop",
    }
}

/// Whether the original request came from `/api/generate`.
pub fn is_generate_request(req: &UnifiedRequest) -> bool {
    req.meta_str("request_type") == "generate"
}

/// Build a non-streaming `/api/chat` response.
pub fn to_ollama_chat_response(
    messages: &[Message],
    usage: Option<&Usage>,
    model: &str,
) -> Result<Vec<u8>, Error> {
    let builder = ResponseBuilder::new(messages, usage);

    let mut message = json!({"role": "assistant", "content": builder.text_content()});
    let calls = builder.tool_calls();
    if !calls.is_empty() {
        let tool_calls: Vec<Value> = calls
            .iter()
            .map(|tc| {
                let args: Value =
                    serde_json::from_str(&tc.args).unwrap_or_else(|_| json!({}));
                json!({"function": {"name": tc.name, "arguments": args}})
            })
            .collect();
        message["tool_calls"] = Value::Array(tool_calls);
    }

    let mut response = json!({
        "model": model,
        "created_at": created_at(),
        "message": message,
        "done": true,
        "done_reason": done_reason(builder.finish_reason()),
    });
    if let Some(usage) = usage {
        response["prompt_eval_count"] = json!(usage.prompt_tokens);
        response["eval_count"] = json!(usage.completion_tokens);
    }

    Ok(serde_json::to_vec(&response)?)
}

/// Build a non-streaming `/api/generate` response.
pub fn to_ollama_generate_response(
    messages: &[Message],
    usage: Option<&Usage>,
    model: &str,
) -> Result<Vec<u8>, Error> {
    let builder = ResponseBuilder::new(messages, usage);
    let mut response = json!({
        "model": model,
        "created_at": created_at(),
        "response": builder.text_content(),
        "done": true,
        "done_reason": done_reason(builder.finish_reason()),
    });
    if let Some(usage) = usage {
        response["prompt_eval_count"] = json!(usage.prompt_tokens);
        response["eval_count"] = json!(usage.completion_tokens);
    }
    Ok(serde_json::to_vec(&response)?)
}

/// Build one `/api/chat` NDJSON chunk. Tool calls stream as complete
/// entries; Ollama has no delta framing for them, so fragments are held
/// upstream by the state machine and arrive here whole.
pub fn to_ollama_chat_chunk(
    event: &UnifiedEvent,
    model: &str,
) -> Result<Option<Vec<u8>>, Error> {
    let chunk = match event.kind {
        EventKind::Token => json!({
            "model": model,
            "created_at": created_at(),
            "message": {"role": "assistant", "content": event.content},
            "done": false,
        }),
        EventKind::Reasoning => json!({
            "model": model,
            "created_at": created_at(),
            "message": {"role": "assistant", "content": "", "thinking": event.reasoning},
            "done": false,
        }),
        EventKind::ToolCall => {
            let Some(tc) = event.tool_call.as_ref() else {
                return Ok(None);
            };
            if tc.name.is_empty() {
                return Ok(None);
            }
            let args: Value = serde_json::from_str(&tc.args).unwrap_or_else(|_| json!({}));
            json!({
                "model": model,
                "created_at": created_at(),
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [{"function": {"name": tc.name, "arguments": args}}],
                },
                "done": false,
            })
        }
        EventKind::Finish => {
            let mut chunk = json!({
                "model": model,
                "created_at": created_at(),
                "message": {"role": "assistant", "content": ""},
                "done": true,
                "done_reason": done_reason(event.finish_reason.unwrap_or(FinishReason::Stop)),
            });
            if let Some(usage) = event.usage.as_ref() {
                chunk["prompt_eval_count"] = json!(usage.prompt_tokens);
                chunk["eval_count"] = json!(usage.completion_tokens);
            }
            chunk
        }
        EventKind::Error => {
            return Err(Error::upstream(format!("stream error: {}", event.error)));
        }
        _ => return Ok(None),
    };

    let mut bytes = serde_json::to_vec(&chunk)?;
    bytes.push(b'\n');
    Ok(Some(bytes))
}

/// Build one `/api/generate` NDJSON chunk.
pub fn to_ollama_generate_chunk(
    event: &UnifiedEvent,
    model: &str,
) -> Result<Option<Vec<u8>>, Error> {
    let chunk = match event.kind {
        EventKind::Token => json!({
            "model": model,
            "created_at": created_at(),
            "response": event.content,
            "done": false,
        }),
        EventKind::Finish => {
            let mut chunk = json!({
                "model": model,
                "created_at": created_at(),
                "response": "",
                "done": true,
                "done_reason": done_reason(event.finish_reason.unwrap_or(FinishReason::Stop)),
            });
            if let Some(usage) = event.usage.as_ref() {
                chunk["prompt_eval_count"] = json!(usage.prompt_tokens);
                chunk["eval_count"] = json!(usage.completion_tokens);
            }
            chunk
        }
        EventKind::Error => {
            return Err(Error::upstream(format!("stream error: {}", event.error)));
        }
        _ => return Ok(None),
    };

    let mut bytes = serde_json::to_vec(&chunk)?;
    bytes.push(b'\n');
    Ok(Some(bytes))
}
