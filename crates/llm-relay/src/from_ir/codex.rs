// Codex request emitter: the Responses API surface with the stricter
// rules of the Codex upstream.

use serde_json::{json, Map, Value};

use llm_relay_types::{Error, Message, Role, UnifiedRequest};

use super::openai::{
    apply_prompt_config, apply_responses_thinking, build_responses_tools, custom_tool_names,
    convert_message_to_responses_input,
};

/// Convert a unified request to Codex Responses JSON.
///
/// The Codex endpoint rejects generic Responses requests: it requires
/// `store=false`, expects `parallel_tool_calls=true` and
/// `include=["reasoning.encrypted_content"]`, refuses role:system inside
/// `input[]` (system turns are downgraded to user), and rejects
/// temperature/top_p/max_output_tokens outright.
pub fn convert_codex_request(req: &UnifiedRequest) -> Result<Vec<u8>, Error> {
    let mut body = Map::new();
    body.insert("model".into(), json!(req.model));

    let custom_tools = custom_tool_names(req);
    let mut input: Vec<Value> = Vec::new();
    for msg in &req.messages {
        if msg.role == Role::System {
            let text = msg.combined_text();
            if !text.is_empty() {
                input.push(json!({
                    "type": "message",
                    "role": "user",
                    "content": [{"type": "input_text", "text": text}],
                }));
            }
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
        body.insert("tool_choice".into(), json!(req.tool_choice));
    }

    body.insert("include".into(), json!(["reasoning.encrypted_content"]));
    body.insert("parallel_tool_calls".into(), json!(true));

    if !req.previous_response_id.is_empty() {
        body.insert("previous_response_id".into(), json!(req.previous_response_id));
    }
    if !req.prompt_id.is_empty() {
        apply_prompt_config(&mut body, req);
    }
    if !req.prompt_cache_key.is_empty() {
        body.insert("prompt_cache_key".into(), json!(req.prompt_cache_key));
    }

    body.insert("store".into(), json!(false));

    Ok(serde_json::to_vec(&Value::Object(body))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codex_request_constraints() {
        let req = UnifiedRequest {
            model: "gpt-5-codex".into(),
            messages: vec![Message::system("rules"), Message::user("do it")],
            temperature: Some(0.7),
            top_p: Some(0.9),
            max_tokens: Some(4096),
            ..Default::default()
        };
        let body: Value =
            serde_json::from_slice(&convert_codex_request(&req).unwrap()).unwrap();
        assert_eq!(body["store"], false);
        assert_eq!(body["parallel_tool_calls"], true);
        assert_eq!(body["include"], json!(["reasoning.encrypted_content"]));
        // Sampling params are rejected upstream and must not be emitted.
        assert!(body.get("temperature").is_none());
        assert!(body.get("top_p").is_none());
        assert!(body.get("max_output_tokens").is_none());
        // System turned into a user input item.
        let input = body["input"].as_array().unwrap();
        assert_eq!(input[0]["role"], "user");
        assert_eq!(input[0]["content"][0]["text"], "rules");
        assert!(body.get("instructions").is_none());
    }
}
