// Antigravity v1internal emitter: the Gemini payload wrapped in the
// envelope `{project, requestId, request, model, userAgent, requestType}`,
// plus the Antigravity-specific fixups.

use serde_json::{json, Map, Value};

use llm_relay_types::{Error, UnifiedRequest};

use super::gemini::build_gemini_request;
use crate::cache::get_session_thought_signature;
use crate::util::args::deep_clean_undefined;
use crate::util::ids::generate_uuid;

const ANTIGRAVITY_IDENTITY: &str = "You are Antigravity, a powerful agentic AI coding assistant \
designed by the Google Deepmind team working on Advanced Agentic Coding.\n\
You are pair programming with a USER to solve their coding task. The task may require creating a \
new codebase, modifying or debugging an existing codebase, or simply answering a question.\n\
**Absolute paths only**\n\
**Proactiveness**";

const MAX_SAFE_OUTPUT_TOKENS: i64 = 8192;

/// Convert a unified request to the Antigravity envelope.
pub fn convert_antigravity_request(req: &UnifiedRequest) -> Result<Vec<u8>, Error> {
    let mut inner = build_gemini_request(req)?;

    if let Some(map) = inner.as_object_mut() {
        // Cherry Studio injects "[undefined]" placeholders the endpoint
        // rejects.
        deep_clean_undefined(map);
    }

    let session_id = req.meta_str("session_id");
    if !session_id.is_empty() {
        inject_thought_signature(&mut inner, session_id);
    }

    let project_id = req.meta_str("project_id").to_string();
    let request_type = {
        let rt = req.meta_str("request_type");
        if rt.is_empty() { "agent" } else { rt }.to_string()
    };
    let request_id = {
        let explicit = req.meta_str("request_id");
        let idempotency = req.meta_str("idempotency_key");
        if !explicit.is_empty() {
            ensure_agent_prefix(explicit)
        } else if !idempotency.is_empty() {
            ensure_agent_prefix(idempotency)
        } else {
            format!("agent-{}", generate_uuid())
        }
    };
    let user_agent = {
        let ua = req.meta_str("user_agent");
        if ua.is_empty() { "antigravity" } else { ua }.to_string()
    };

    if request_type == "image_gen" {
        apply_image_gen_tweaks(&mut inner, req);
    } else {
        inject_antigravity_identity(&mut inner);
    }

    strip_oversized_max_tokens(&mut inner, &req.model);

    let envelope = json!({
        "project": project_id,
        "requestId": request_id,
        "request": inner,
        "model": req.model,
        "userAgent": user_agent,
        "requestType": request_type,
    });

    Ok(serde_json::to_vec(&envelope)?)
}

fn ensure_agent_prefix(id: &str) -> String {
    if id.starts_with("agent-") {
        id.to_string()
    } else {
        format!("agent-{id}")
    }
}

/// Reinstate the cached session signature on functionCall parts that lost
/// theirs to a client round trip.
fn inject_thought_signature(inner: &mut Value, session_id: &str) {
    let sig = get_session_thought_signature(session_id);
    if sig.is_empty() {
        return;
    }
    let Some(contents) = inner.get_mut("contents").and_then(Value::as_array_mut) else {
        return;
    };
    for content in contents {
        let Some(parts) = content.get_mut("parts").and_then(Value::as_array_mut) else {
            continue;
        };
        for part in parts {
            let Some(obj) = part.as_object_mut() else { continue };
            if !obj.contains_key("functionCall") {
                continue;
            }
            let missing = obj
                .get("thoughtSignature")
                .and_then(Value::as_str)
                .map(|s| s.trim().is_empty())
                .unwrap_or(true);
            if missing {
                obj.insert("thoughtSignature".into(), json!(sig));
            }
        }
    }
}

fn inject_antigravity_identity(inner: &mut Value) {
    let Some(root) = inner.as_object_mut() else { return };

    if !matches!(root.get("systemInstruction"), Some(Value::Object(_))) {
        root.insert(
            "systemInstruction".into(),
            json!({"role": "user", "parts": [{"text": ANTIGRAVITY_IDENTITY}]}),
        );
        return;
    }
    let Some(Value::Object(si)) = root.get_mut("systemInstruction") else {
        return;
    };

    si.entry("role".to_string()).or_insert_with(|| json!("user"));

    let has_parts = matches!(si.get("parts"), Some(Value::Array(arr)) if !arr.is_empty());
    if !has_parts {
        si.insert("parts".into(), json!([{"text": ANTIGRAVITY_IDENTITY}]));
        return;
    }
    let Some(Value::Array(parts)) = si.get_mut("parts") else {
        return;
    };
    let already_present = parts
        .first()
        .and_then(|p| p.get("text"))
        .and_then(Value::as_str)
        .map(|t| t.contains("You are Antigravity"))
        .unwrap_or(false);
    if !already_present {
        parts.insert(0, json!({"text": ANTIGRAVITY_IDENTITY}));
    }
}

fn apply_image_gen_tweaks(inner: &mut Value, req: &UnifiedRequest) {
    let Some(root) = inner.as_object_mut() else { return };

    // Image generation accepts neither tools nor system prompts.
    root.remove("tools");
    root.remove("toolConfig");
    root.remove("systemInstruction");

    if !root.contains_key("generationConfig") {
        root.insert("generationConfig".into(), Value::Object(Map::new()));
    }
    let Some(Value::Object(config)) = root.get_mut("generationConfig") else {
        return;
    };
    config.remove("thinkingConfig");
    config.remove("responseMimeType");
    config.remove("responseModalities");

    if let Some(image) = req.image_config.as_ref() {
        let mut img = Map::new();
        if !image.aspect_ratio.trim().is_empty() {
            img.insert("aspectRatio".into(), json!(image.aspect_ratio));
        }
        if !image.image_size.trim().is_empty() {
            img.insert("imageSize".into(), json!(image.image_size));
        }
        if !img.is_empty() {
            config.insert("imageConfig".into(), Value::Object(img));
        }
    }
}

/// Gemini models served via Antigravity reject large maxOutputTokens that
/// clients copy over from other providers; Claude models keep theirs.
fn strip_oversized_max_tokens(inner: &mut Value, model: &str) {
    if model.contains("claude") {
        return;
    }
    if let Some(Value::Object(config)) = inner.get_mut("generationConfig") {
        let oversized = config
            .get("maxOutputTokens")
            .and_then(Value::as_i64)
            .map(|m| m > MAX_SAFE_OUTPUT_TOKENS)
            .unwrap_or(false);
        if oversized {
            config.remove("maxOutputTokens");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_relay_types::{ImageConfig, Message};

    fn base_request() -> UnifiedRequest {
        UnifiedRequest {
            model: "gemini-3-pro-preview".into(),
            messages: vec![Message::user("hi")],
            ..Default::default()
        }
    }

    fn envelope_for(req: &UnifiedRequest) -> Value {
        serde_json::from_slice(&convert_antigravity_request(req).unwrap()).unwrap()
    }

    #[test]
    fn test_envelope_defaults() {
        let envelope = envelope_for(&base_request());
        assert!(envelope["requestId"]
            .as_str()
            .unwrap()
            .starts_with("agent-"));
        assert_eq!(envelope["userAgent"], "antigravity");
        assert_eq!(envelope["requestType"], "agent");
        assert!(envelope["request"].get("contents").is_some());
    }

    #[test]
    fn test_idempotency_key_becomes_request_id() {
        let mut req = base_request();
        req.metadata
            .insert("idempotency_key".into(), json!("abc123"));
        let envelope = envelope_for(&req);
        assert_eq!(envelope["requestId"], "agent-abc123");
    }

    #[test]
    fn test_identity_preamble_injected_once() {
        let mut req = base_request();
        req.messages.insert(0, Message::system("client prompt"));
        let envelope = envelope_for(&req);
        let parts = envelope["request"]["systemInstruction"]["parts"]
            .as_array()
            .unwrap();
        assert!(parts[0]["text"]
            .as_str()
            .unwrap()
            .starts_with("You are Antigravity"));
        assert_eq!(parts[1]["text"], "client prompt");

        // Re-wrapping an already-branded prompt does not duplicate it.
        let mut req2 = base_request();
        req2.messages
            .insert(0, Message::system(ANTIGRAVITY_IDENTITY));
        let envelope2 = envelope_for(&req2);
        let parts2 = envelope2["request"]["systemInstruction"]["parts"]
            .as_array()
            .unwrap();
        assert_eq!(parts2.len(), 1);
    }

    #[test]
    fn test_image_gen_strips_tools_and_system() {
        let mut req = base_request();
        req.metadata
            .insert("request_type".into(), json!("image_gen"));
        req.image_config = Some(ImageConfig {
            aspect_ratio: "16:9".into(),
            image_size: "2K".into(),
        });
        req.tools.push(llm_relay_types::ToolDefinition {
            name: "f".into(),
            parameters: Some(json!({"type": "object"})),
            ..Default::default()
        });
        let envelope = envelope_for(&req);
        let inner = &envelope["request"];
        assert!(inner.get("tools").is_none());
        assert!(inner.get("toolConfig").is_none());
        assert!(inner.get("systemInstruction").is_none());
        assert_eq!(
            inner["generationConfig"]["imageConfig"]["aspectRatio"],
            "16:9"
        );
    }

    #[test]
    fn test_oversized_max_tokens_stripped_for_gemini() {
        let mut req = base_request();
        req.max_tokens = Some(64000);
        let envelope = envelope_for(&req);
        assert!(envelope["request"]["generationConfig"]
            .get("maxOutputTokens")
            .is_none());

        let mut claude_req = base_request();
        claude_req.model = "claude-sonnet-4-5".into();
        claude_req.max_tokens = Some(64000);
        let envelope = envelope_for(&claude_req);
        assert_eq!(
            envelope["request"]["generationConfig"]["maxOutputTokens"],
            64000
        );
    }

    #[test]
    fn test_cached_signature_reinjected_on_unsigned_calls() {
        let sig = "g".repeat(64);
        crate::cache::cache_session_thought_signature("ag-sess-1", &sig);
        let mut req = base_request();
        req.metadata.insert("session_id".into(), json!("ag-sess-1"));
        let mut assistant = Message {
            role: llm_relay_types::Role::Assistant,
            ..Default::default()
        };
        // Two parallel calls: the first carries the sentinel from the
        // Gemini emitter, the second has nothing and gets the cached sig.
        assistant
            .tool_calls
            .push(llm_relay_types::ToolCall::new("f-1", "f", "{}"));
        assistant
            .tool_calls
            .push(llm_relay_types::ToolCall::new("g-1", "g", "{}"));
        req.messages.push(assistant);
        req.messages.push(Message::tool_result("f-1", "ok"));
        req.messages.push(Message::tool_result("g-1", "ok"));

        let envelope = envelope_for(&req);
        let contents = envelope["request"]["contents"].as_array().unwrap();
        let call_parts: Vec<&Value> = contents
            .iter()
            .flat_map(|c| c["parts"].as_array().unwrap())
            .filter(|p| p.get("functionCall").is_some())
            .collect();
        assert_eq!(call_parts.len(), 2);
        assert_eq!(
            call_parts[0]["thoughtSignature"],
            crate::cache::SKIP_THOUGHT_SIGNATURE_VALIDATOR
        );
        assert_eq!(call_parts[1]["thoughtSignature"], sig.as_str());
    }
}
