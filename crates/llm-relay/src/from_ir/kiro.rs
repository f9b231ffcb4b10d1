// Kiro (Amazon Q) request emitter. Kiro has a fixed envelope shape, so
// this module uses typed wire structs instead of JSON trees: the
// conversationState nesting is deep enough that building it by hand is
// error-prone.

use serde::Serialize;
use serde_json::Value;

use llm_relay_types::{ContentPart, Error, Message, Role, ToolResultPart, UnifiedRequest};

use crate::util::ids::generate_uuid;
use crate::util::text::sanitize_text;

const KIRO_MAX_TOKENS: i64 = 32000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct KiroRequest {
    conversation_state: ConversationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inference_config: Option<InferenceConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversationState {
    chat_trigger_type: String,
    conversation_id: String,
    current_message: CurrentMessage,
    history: Vec<HistoryMessage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InferenceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CurrentMessage {
    user_input_message: UserInputMessage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_input_message: Option<UserInputMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assistant_response_message: Option<AssistantResponseMessage>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserInputMessage {
    content: String,
    model_id: String,
    origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_input_message_context: Option<UserInputMessageContext>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<ImageItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssistantResponseMessage {
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_uses: Vec<ToolUse>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserInputMessageContext {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpecification>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_results: Vec<ToolResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSpecification {
    tool_specification: ToolSpecDetails,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSpecDetails {
    name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    input_schema: ToolInputSchema,
}

#[derive(Debug, Clone, Serialize)]
struct ToolInputSchema {
    json: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolResult {
    tool_use_id: String,
    content: Vec<ToolResultContent>,
    status: String,
}

#[derive(Debug, Serialize)]
struct ToolResultContent {
    #[serde(skip_serializing_if = "String::is_empty")]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolUse {
    tool_use_id: String,
    name: String,
    input: Value,
}

#[derive(Debug, Serialize)]
struct ImageItem {
    format: String,
    source: ImageSource,
}

#[derive(Debug, Serialize)]
struct ImageSource {
    bytes: String,
}

/// Convert a unified request to the Kiro conversationState envelope.
pub fn convert_kiro_request(req: &UnifiedRequest) -> Result<Vec<u8>, Error> {
    let origin = {
        let o = req.meta_str("origin");
        if o.is_empty() { "AI_EDITOR" } else { o }.to_string()
    };
    let tools = extract_tools(req);
    let system_prompt = build_system_prompt(req);

    let (history, mut current) = process_messages(req, &tools, &origin);

    if !system_prompt.is_empty() {
        if current.user_input_message.content.is_empty() {
            current.user_input_message.content = system_prompt;
        } else {
            current.user_input_message.content =
                format!("{system_prompt}\n\n{}", current.user_input_message.content);
        }
    }

    let mut request = KiroRequest {
        conversation_state: ConversationState {
            chat_trigger_type: "MANUAL".to_string(),
            conversation_id: generate_uuid(),
            current_message: current,
            history,
        },
        profile_arn: None,
        inference_config: None,
    };

    let arn = req.meta_str("profileArn");
    if !arn.is_empty() {
        request.profile_arn = Some(arn.to_string());
    }

    let mut config = InferenceConfig {
        max_tokens: req.max_tokens.map(|m| if m == -1 { KIRO_MAX_TOKENS } else { m }),
        temperature: req.temperature,
        top_p: req.top_p,
    };
    if config.max_tokens.is_some() || config.temperature.is_some() || config.top_p.is_some() {
        if let Some(m) = config.max_tokens {
            config.max_tokens = Some(m.min(KIRO_MAX_TOKENS));
        }
        request.inference_config = Some(config);
    }

    let raw = serde_json::to_string(&request)?;
    Ok(sanitize_text(&raw).into_bytes())
}

fn extract_tools(req: &UnifiedRequest) -> Vec<ToolSpecification> {
    req.tools
        .iter()
        .map(|t| ToolSpecification {
            tool_specification: ToolSpecDetails {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: ToolInputSchema {
                    json: t
                        .parameters
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({"type": "object"})),
                },
            },
        })
        .collect()
}

/// System text becomes a preamble on the first user turn; thinking mode is
/// signalled inside it with literal tags.
fn build_system_prompt(req: &UnifiedRequest) -> String {
    let mut parts: Vec<String> = req
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(Message::combined_text)
        .filter(|t| !t.is_empty())
        .collect();

    if let Some(thinking) = req.thinking.as_ref() {
        if thinking.budget > 0 {
            parts.push(format!(
                "<thinking_mode>enabled</thinking_mode>\n<max_thinking_length>{}</max_thinking_length>",
                thinking.budget
            ));
        }
    }

    parts.join("\n")
}

fn process_messages(
    req: &UnifiedRequest,
    tools: &[ToolSpecification],
    origin: &str,
) -> (Vec<HistoryMessage>, CurrentMessage) {
    let mut messages: Vec<Message> = req
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();
    messages = merge_consecutive(messages);
    messages = remove_prefill(messages);
    messages = alternate_roles(messages);

    if messages.is_empty() {
        return (
            Vec::new(),
            CurrentMessage {
                user_input_message: continue_message(req, origin),
            },
        );
    }

    let Some(last) = messages.last() else {
        return (
            Vec::new(),
            CurrentMessage {
                user_input_message: continue_message(req, origin),
            },
        );
    };
    if last.role == Role::User {
        let history = build_history(&messages[..messages.len() - 1], req, origin);
        let current = build_user_message(last, tools, req, origin, true);
        return (history, CurrentMessage { user_input_message: current });
    }

    let trailing_start = find_trailing_tool_start(&messages);
    let history = build_history(&messages[..trailing_start], req, origin);

    let current = if trailing_start < messages.len() {
        build_merged_tool_result_message(&messages[trailing_start..], tools, req, origin)
    } else {
        continue_message(req, origin)
    };

    (history, CurrentMessage { user_input_message: current })
}

fn continue_message(req: &UnifiedRequest, origin: &str) -> UserInputMessage {
    UserInputMessage {
        content: "Continue".to_string(),
        model_id: req.model.clone(),
        origin: origin.to_string(),
        ..Default::default()
    }
}

fn build_history(messages: &[Message], req: &UnifiedRequest, origin: &str) -> Vec<HistoryMessage> {
    let mut history = Vec::with_capacity(messages.len());
    for msg in messages {
        match msg.role {
            Role::User => history.push(HistoryMessage {
                user_input_message: Some(build_user_message(msg, &[], req, origin, false)),
                assistant_response_message: None,
            }),
            Role::Assistant => history.push(HistoryMessage {
                user_input_message: None,
                assistant_response_message: Some(build_assistant_message(msg)),
            }),
            Role::Tool => {
                if let Some(user) = build_tool_result_message(msg, req, origin) {
                    history.push(HistoryMessage {
                        user_input_message: Some(user),
                        assistant_response_message: None,
                    });
                }
            }
            Role::System => {}
        }
    }
    history
}

fn build_user_message(
    msg: &Message,
    tools: &[ToolSpecification],
    req: &UnifiedRequest,
    origin: &str,
    is_current: bool,
) -> UserInputMessage {
    let mut content = msg.combined_text();
    let mut tool_results = Vec::new();
    let mut images = Vec::new();

    for part in &msg.content {
        match part {
            ContentPart::ToolResult { tool_result } => {
                tool_results.push(build_tool_result(tool_result));
            }
            ContentPart::Image { image, .. } => {
                let format = image
                    .mime_type
                    .split('/')
                    .nth(1)
                    .unwrap_or("png")
                    .to_string();
                images.push(ImageItem {
                    format,
                    source: ImageSource {
                        bytes: image.data.clone(),
                    },
                });
            }
            _ => {}
        }
    }

    if is_current && content.is_empty() && tool_results.is_empty() {
        content = "Continue".to_string();
    }

    let mut message = UserInputMessage {
        content,
        model_id: req.model.clone(),
        origin: origin.to_string(),
        images,
        ..Default::default()
    };

    let mut context = UserInputMessageContext::default();
    let mut has_context = false;
    if is_current && !tools.is_empty() {
        context.tools = tools.to_vec();
        has_context = true;
    }
    if !tool_results.is_empty() {
        context.tool_results = tool_results;
        has_context = true;
    }
    if has_context {
        message.user_input_message_context = Some(context);
    }

    message
}

fn build_assistant_message(msg: &Message) -> AssistantResponseMessage {
    let tool_uses = msg
        .tool_calls
        .iter()
        .map(|tc| ToolUse {
            tool_use_id: tc.id.clone(),
            name: tc.name.clone(),
            input: serde_json::from_str(&tc.args).unwrap_or_else(|_| serde_json::json!({})),
        })
        .collect();
    AssistantResponseMessage {
        content: msg.combined_text(),
        tool_uses,
    }
}

fn build_tool_result_message(
    msg: &Message,
    req: &UnifiedRequest,
    origin: &str,
) -> Option<UserInputMessage> {
    let tool_results: Vec<ToolResult> = msg
        .content
        .iter()
        .filter_map(|part| match part {
            ContentPart::ToolResult { tool_result } => Some(build_tool_result(tool_result)),
            _ => None,
        })
        .collect();
    if tool_results.is_empty() {
        return None;
    }
    Some(UserInputMessage {
        content: "Continue".to_string(),
        model_id: req.model.clone(),
        origin: origin.to_string(),
        user_input_message_context: Some(UserInputMessageContext {
            tools: Vec::new(),
            tool_results,
        }),
        ..Default::default()
    })
}

/// Trailing tool results merge into a single Continue message carrying all
/// toolResults plus the tools list.
fn build_merged_tool_result_message(
    messages: &[Message],
    tools: &[ToolSpecification],
    req: &UnifiedRequest,
    origin: &str,
) -> UserInputMessage {
    let mut tool_results = Vec::new();
    let mut text_parts: Vec<String> = Vec::new();

    for msg in messages {
        for part in &msg.content {
            match part {
                ContentPart::ToolResult { tool_result } => {
                    tool_results.push(build_tool_result(tool_result));
                }
                ContentPart::Text { text, .. } if !text.is_empty() => {
                    text_parts.push(text.clone());
                }
                _ => {}
            }
        }
    }

    let content = if text_parts.is_empty() {
        "Continue".to_string()
    } else {
        text_parts.join("\n")
    };

    UserInputMessage {
        content,
        model_id: req.model.clone(),
        origin: origin.to_string(),
        user_input_message_context: Some(UserInputMessageContext {
            tools: tools.to_vec(),
            tool_results,
        }),
        ..Default::default()
    }
}

fn build_tool_result(tr: &ToolResultPart) -> ToolResult {
    ToolResult {
        tool_use_id: tr.tool_call_id.clone(),
        status: "success".to_string(),
        content: vec![ToolResultContent {
            text: sanitize_text(&tr.result),
        }],
    }
}

/// Merge consecutive same-role messages (user turns excepted).
fn merge_consecutive(messages: Vec<Message>) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(messages.len());
    for msg in messages {
        if let Some(last) = merged.last_mut() {
            if last.role == msg.role && msg.role != Role::User {
                last.content.extend(msg.content);
                last.tool_calls.extend(msg.tool_calls);
                continue;
            }
        }
        merged.push(msg);
    }
    merged
}

/// Kiro rejects trailing assistant prefills without tool calls.
fn remove_prefill(mut messages: Vec<Message>) -> Vec<Message> {
    if let Some(last) = messages.last() {
        if last.role == Role::Assistant && last.tool_calls.is_empty() {
            messages.pop();
        }
    }
    messages
}

/// Enforce strict user/assistant alternation with synthetic bridges.
fn alternate_roles(messages: Vec<Message>) -> Vec<Message> {
    let is_user_like = |r: Role| r == Role::User || r == Role::Tool;
    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    for msg in messages {
        if let Some(prev) = out.last() {
            if is_user_like(prev.role) && is_user_like(msg.role) {
                out.push(Message::assistant("[Continued]"));
            } else if prev.role == Role::Assistant && msg.role == Role::Assistant {
                out.push(Message::user("Continue"));
            }
        }
        out.push(msg);
    }
    out
}

fn find_trailing_tool_start(messages: &[Message]) -> usize {
    let mut start = messages.len();
    for (i, msg) in messages.iter().enumerate().rev() {
        if msg.role == Role::Tool {
            start = i;
        } else {
            break;
        }
    }
    start
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_relay_types::{ThinkingConfig, ToolCall, ToolDefinition};
    use serde_json::json;

    fn envelope_for(req: &UnifiedRequest) -> Value {
        serde_json::from_slice(&convert_kiro_request(req).unwrap()).unwrap()
    }

    #[test]
    fn test_basic_request_shape() {
        let req = UnifiedRequest {
            model: "claude-sonnet-4".into(),
            messages: vec![Message::system("be terse"), Message::user("hi")],
            max_tokens: Some(-1),
            temperature: Some(0.2),
            ..Default::default()
        };
        let body = envelope_for(&req);
        let state = &body["conversationState"];
        assert_eq!(state["chatTriggerType"], "MANUAL");
        assert!(!state["conversationId"].as_str().unwrap().is_empty());
        assert_eq!(state["history"].as_array().unwrap().len(), 0);
        let current = &state["currentMessage"]["userInputMessage"];
        assert_eq!(current["content"], "be terse\n\nhi");
        assert_eq!(current["origin"], "AI_EDITOR");
        assert_eq!(body["inferenceConfig"]["maxTokens"], 32000);
        assert_eq!(body["inferenceConfig"]["temperature"], 0.2);
    }

    #[test]
    fn test_thinking_mode_tags_in_preamble() {
        let mut req = UnifiedRequest {
            model: "m".into(),
            messages: vec![Message::user("go")],
            ..Default::default()
        };
        req.thinking = Some(ThinkingConfig {
            budget: 4096,
            include_thoughts: true,
            ..Default::default()
        });
        let body = envelope_for(&req);
        let content = body["conversationState"]["currentMessage"]["userInputMessage"]["content"]
            .as_str()
            .unwrap();
        assert!(content.contains("<thinking_mode>enabled</thinking_mode>"));
        assert!(content.contains("<max_thinking_length>4096</max_thinking_length>"));
    }

    #[test]
    fn test_trailing_tool_results_become_current_message() {
        let mut assistant = Message {
            role: Role::Assistant,
            ..Default::default()
        };
        assistant.tool_calls.push(ToolCall::new("call_1", "f", "{\"a\":1}"));
        let req = UnifiedRequest {
            model: "m".into(),
            messages: vec![
                Message::user("run f"),
                assistant,
                Message::tool_result("call_1", "done"),
            ],
            tools: vec![ToolDefinition {
                name: "f".into(),
                parameters: Some(json!({"type": "object"})),
                ..Default::default()
            }],
            ..Default::default()
        };
        let body = envelope_for(&req);
        let state = &body["conversationState"];
        assert_eq!(state["history"].as_array().unwrap().len(), 2);
        let current = &state["currentMessage"]["userInputMessage"];
        assert_eq!(current["content"], "Continue");
        let context = &current["userInputMessageContext"];
        assert_eq!(context["toolResults"][0]["toolUseId"], "call_1");
        assert_eq!(context["tools"][0]["toolSpecification"]["name"], "f");
    }

    #[test]
    fn test_prefill_removed_and_roles_alternate() {
        let req = UnifiedRequest {
            model: "m".into(),
            messages: vec![
                Message::user("one"),
                Message::user("two"),
                Message::assistant("reply"),
                Message::assistant("prefill"),
            ],
            ..Default::default()
        };
        let body = envelope_for(&req);
        let history = body["conversationState"]["history"].as_array().unwrap();
        // user(one), [Continued] bridge, then the trailing prefill is
        // dropped and "two" becomes the current message... the bridge sits
        // between the two user turns.
        assert!(history
            .iter()
            .any(|h| h["assistantResponseMessage"]["content"] == "[Continued]"));
    }

    #[test]
    fn test_assistant_history_carries_tool_uses() {
        let mut assistant = Message::assistant("calling");
        assistant.tool_calls.push(ToolCall::new("call_2", "g", "{\"b\":2}"));
        let req = UnifiedRequest {
            model: "m".into(),
            messages: vec![
                Message::user("go"),
                assistant,
                Message::tool_result("call_2", "out"),
                Message::user("next"),
            ],
            ..Default::default()
        };
        let body = envelope_for(&req);
        let history = body["conversationState"]["history"].as_array().unwrap();
        let assistant_entry = history
            .iter()
            .find(|h| h.get("assistantResponseMessage").is_some())
            .unwrap();
        let tool_use = &assistant_entry["assistantResponseMessage"]["toolUses"][0];
        assert_eq!(tool_use["toolUseId"], "call_2");
        assert_eq!(tool_use["input"]["b"], 2);
    }
}
