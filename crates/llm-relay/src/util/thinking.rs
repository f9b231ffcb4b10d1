// Thinking-block consistency passes applied before Gemini-family emission.
//
// Thinking-enabled models reject histories whose last assistant turn does
// not open with a signed reasoning block, and clients routinely strip
// reasoning parts and signatures. These passes repair the history instead
// of failing the turn.

use llm_relay_types::{ContentPart, Message, Role};

use crate::cache::{has_valid_signature, SKIP_THOUGHT_SIGNATURE_VALIDATOR};

/// Ensure the last assistant message starts with a reasoning block,
/// prepending an empty sentinel-signed placeholder when it does not.
/// Returns whether a fix was applied.
pub fn ensure_thinking_consistency(messages: &mut [Message]) -> bool {
    if last_assistant_starts_with_reasoning(messages) {
        return false;
    }
    for msg in messages.iter_mut().rev() {
        if msg.role == Role::Assistant {
            msg.content.insert(
                0,
                ContentPart::reasoning("", Some(SKIP_THOUGHT_SIGNATURE_VALIDATOR.to_string())),
            );
            return true;
        }
    }
    false
}

fn last_assistant_starts_with_reasoning(messages: &[Message]) -> bool {
    for msg in messages.iter().rev() {
        if msg.role != Role::Assistant {
            continue;
        }
        return msg.starts_with_reasoning();
    }
    true
}

/// Close a broken tool loop: when the conversation ends in a tool result
/// and the last assistant message does not open with reasoning, append a
/// synthetic assistant+user pair so the model can start a fresh thinking
/// block. Returns whether the pair was appended.
pub fn close_tool_loop_for_thinking(messages: &mut Vec<Message>) -> bool {
    let Some(last) = messages.last() else {
        return false;
    };
    let in_tool_loop = (last.role == Role::User || last.role == Role::Tool)
        && last.has_tool_result();
    if !in_tool_loop {
        return false;
    }

    let Some(last_assistant) = messages.iter().rev().find(|m| m.role == Role::Assistant) else {
        return false;
    };
    if last_assistant.starts_with_reasoning() {
        return false;
    }

    messages.push(Message::assistant(
        "[System: Tool loop recovered. Previous tool execution accepted.]",
    ));
    messages.push(Message::user("Please continue with the next step."));
    true
}

/// Demote reasoning blocks with invalid signatures to plain text so their
/// content survives; empty invalid blocks are dropped. Messages left with
/// no content and no tool calls get an empty text part to stay valid.
pub fn filter_invalid_thinking_blocks(messages: Vec<Message>, model: &str) -> Vec<Message> {
    messages
        .into_iter()
        .map(|mut msg| {
            if msg.role != Role::Assistant {
                return msg;
            }
            let mut content = Vec::with_capacity(msg.content.len());
            for part in msg.content {
                match part {
                    ContentPart::Reasoning {
                        reasoning,
                        thought_signature,
                    } => {
                        let sig = thought_signature.as_deref().unwrap_or("");
                        if has_valid_signature(model, sig) {
                            content.push(ContentPart::Reasoning {
                                reasoning,
                                thought_signature,
                            });
                        } else if !reasoning.is_empty() {
                            content.push(ContentPart::text(reasoning));
                        }
                    }
                    other => content.push(other),
                }
            }
            if content.is_empty() && msg.tool_calls.is_empty() {
                content.push(ContentPart::text(""));
            }
            msg.content = content;
            msg
        })
        .collect()
}

/// Trim trailing reasoning blocks without a valid signature from assistant
/// messages so the provider does not reject the turn.
pub fn remove_trailing_unsigned_thinking(messages: Vec<Message>, model: &str) -> Vec<Message> {
    messages
        .into_iter()
        .map(|mut msg| {
            if msg.role != Role::Assistant {
                return msg;
            }
            while let Some(last) = msg.content.last() {
                match last {
                    ContentPart::Reasoning {
                        thought_signature, ..
                    } => {
                        let sig = thought_signature.as_deref().unwrap_or("");
                        if has_valid_signature(model, sig) {
                            break;
                        }
                        msg.content.pop();
                    }
                    _ => break,
                }
            }
            msg
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_sig() -> String {
        "x".repeat(64)
    }

    #[test]
    fn test_ensure_thinking_consistency_prepends_placeholder() {
        let mut messages = vec![Message::user("hi"), Message::assistant("answer")];
        assert!(ensure_thinking_consistency(&mut messages));
        assert!(messages[1].starts_with_reasoning());
        assert_eq!(
            messages[1].content[0].thought_signature(),
            Some(SKIP_THOUGHT_SIGNATURE_VALIDATOR)
        );
        // Already consistent: no second fix.
        assert!(!ensure_thinking_consistency(&mut messages));
    }

    #[test]
    fn test_ensure_thinking_no_assistant_is_noop() {
        let mut messages = vec![Message::user("hi")];
        assert!(!ensure_thinking_consistency(&mut messages));
    }

    #[test]
    fn test_close_tool_loop_appends_pair() {
        let mut assistant = Message::assistant("");
        assistant
            .tool_calls
            .push(llm_relay_types::ToolCall::new("call-1", "f", "{}"));
        let mut messages = vec![
            Message::user("do it"),
            assistant,
            Message::tool_result("call-1", "done"),
        ];
        assert!(close_tool_loop_for_thinking(&mut messages));
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[3].role, Role::Assistant);
        assert!(messages[3].combined_text().contains("Tool loop recovered"));
        assert_eq!(messages[4].role, Role::User);
    }

    #[test]
    fn test_close_tool_loop_skips_when_reasoning_present() {
        let mut assistant = Message::assistant("");
        assistant
            .content
            .insert(0, ContentPart::reasoning("t", Some(long_sig())));
        assistant
            .tool_calls
            .push(llm_relay_types::ToolCall::new("call-1", "f", "{}"));
        let mut messages = vec![assistant, Message::tool_result("call-1", "done")];
        assert!(!close_tool_loop_for_thinking(&mut messages));
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_filter_invalid_demotes_to_text() {
        let mut msg = Message::assistant("");
        msg.content = vec![
            ContentPart::reasoning("keep me", Some("short".into())),
            ContentPart::reasoning("", Some("short".into())),
            ContentPart::reasoning("signed", Some(long_sig())),
        ];
        let out = filter_invalid_thinking_blocks(vec![msg], "gemini-2.5-pro");
        let parts = &out[0].content;
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[0], ContentPart::Text { text, .. } if text == "keep me"));
        assert!(parts[1].is_reasoning());
    }

    #[test]
    fn test_remove_trailing_unsigned() {
        let mut msg = Message::assistant("body");
        msg.content.push(ContentPart::reasoning("tail", None));
        msg.content.push(ContentPart::reasoning("tail2", None));
        let out = remove_trailing_unsigned_thinking(vec![msg], "gemini-2.5-pro");
        assert_eq!(out[0].content.len(), 1);
        assert_eq!(out[0].combined_text(), "body");
    }
}
